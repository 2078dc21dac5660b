// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cmmt-pc-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Timing of press-and-hold jogging through the panel event loop
//!
//! These tests run on a paused clock: time only moves when every task is
//! waiting, so the number of jog requests sent while a control is held is
//! exact.

use std::time::Duration;

use cmmt_pc_control::config::Config;
use cmmt_pc_control::drive::{DriveCommand, MockConnector, MockDriveHandle};
use cmmt_pc_control::jog::JogDirection;
use cmmt_pc_control::{Panel, PanelError, PanelEvent};
use tokio::sync::mpsc;
use tokio::time;

use JogDirection::{Negative, Positive};

fn panel(config: &Config) -> (Panel, MockDriveHandle) {
    let connector = MockConnector::new();
    let handle = connector.handle();
    (Panel::new(Box::new(connector), config), handle)
}

fn jogs(handle: &MockDriveHandle, forward: bool) -> usize {
    handle.count(|c| {
        *c == DriveCommand::Jog {
            forward,
            backward: !forward,
            duration: Duration::ZERO,
        }
    })
}

fn stops(handle: &MockDriveHandle) -> usize {
    handle.count(|c| *c == DriveCommand::StopMotion)
}

/// Run the panel while `script` sends events over the channel
async fn run_script<F, Fut>(config: Config, script: F) -> (Result<(), PanelError>, MockDriveHandle)
where
    F: FnOnce(mpsc::Sender<PanelEvent>) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let (panel, handle) = panel(&config);
    let (tx, rx) = mpsc::channel(16);
    let (result, ()) = tokio::join!(panel.run(rx), script(tx));
    (result, handle)
}

async fn connect(tx: &mpsc::Sender<PanelEvent>) {
    tx.send(PanelEvent::Connect("192.168.0.1".into()))
        .await
        .unwrap();
}

async fn hold(tx: &mpsc::Sender<PanelEvent>, direction: JogDirection, millis: u64) {
    tx.send(PanelEvent::JogPressed(direction)).await.unwrap();
    time::sleep(Duration::from_millis(millis)).await;
    tx.send(PanelEvent::JogReleased(direction)).await.unwrap();
}

fn quiet_config() -> Config {
    let mut config = Config::default();
    config.drive.continuous_update = false;
    config
}

#[tokio::test(start_paused = true)]
async fn test_hold_sends_one_request_per_interval() {
    // floor(hold / 200 ms) + 1 requests
    for (millis, expected) in [(650, 4), (199, 1), (400, 3), (410, 3), (1_050, 6)] {
        let (result, handle) = run_script(quiet_config(), |tx| async move {
            connect(&tx).await;
            hold(&tx, Positive, millis).await;
            tx.send(PanelEvent::Quit).await.unwrap();
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(jogs(&handle, true), expected, "hold of {} ms", millis);
        assert_eq!(jogs(&handle, false), 0);
        assert_eq!(stops(&handle), 1);
        assert_eq!(handle.count(|c| *c == DriveCommand::DisablePowerstage), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_release_before_first_tick() {
    let (result, handle) = run_script(quiet_config(), |tx| async move {
        connect(&tx).await;
        hold(&tx, Negative, 100).await;
        time::sleep(Duration::from_millis(1_000)).await;
    })
    .await;

    assert!(result.is_ok());
    assert_eq!(
        handle.commands(),
        vec![
            DriveCommand::EnablePowerstage,
            DriveCommand::Jog {
                forward: false,
                backward: true,
                duration: Duration::ZERO,
            },
            DriveCommand::StopMotion,
            DriveCommand::DisablePowerstage,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_directions_have_independent_timers() {
    let (result, handle) = run_script(quiet_config(), |tx| async move {
        connect(&tx).await;
        tx.send(PanelEvent::JogPressed(Positive)).await.unwrap();
        time::sleep(Duration::from_millis(100)).await;
        // negative: pressed at 100 ms, released at 250 ms
        hold(&tx, Negative, 150).await;
        time::sleep(Duration::from_millis(400)).await;
        tx.send(PanelEvent::JogReleased(Positive)).await.unwrap();
    })
    .await;

    assert!(result.is_ok());
    // positive: 0, 200, 400, 600 ms
    assert_eq!(jogs(&handle, true), 4);
    assert_eq!(jogs(&handle, false), 1);
    assert_eq!(stops(&handle), 2);
}

#[tokio::test(start_paused = true)]
async fn test_press_without_readiness_never_ticks() {
    let connector = MockConnector::new();
    let handle = connector.handle();
    let panel = Panel::new(Box::new(connector), &quiet_config());
    let (tx, rx) = mpsc::channel(16);

    let drive = handle.clone();
    let script = async move {
        connect(&tx).await;
        drive.set_ready(false);
        tx.send(PanelEvent::JogPressed(Positive)).await.unwrap();
        time::sleep(Duration::from_millis(1_000)).await;
    };
    let (result, ()) = tokio::join!(panel.run(rx), script);

    assert!(result.is_ok());
    assert_eq!(handle.count(DriveCommand::is_motion), 0);
}

#[tokio::test(start_paused = true)]
async fn test_quit_releases_held_controls() {
    let (result, handle) = run_script(quiet_config(), |tx| async move {
        connect(&tx).await;
        tx.send(PanelEvent::JogPressed(Positive)).await.unwrap();
        time::sleep(Duration::from_millis(300)).await;
        tx.send(PanelEvent::Quit).await.unwrap();
    })
    .await;

    assert!(result.is_ok());
    assert_eq!(jogs(&handle, true), 2);
    assert_eq!(stops(&handle), 1);
    assert_eq!(
        handle.commands().last(),
        Some(&DriveCommand::DisablePowerstage)
    );
}

#[tokio::test(start_paused = true)]
async fn test_drive_error_stops_the_panel() {
    let connector = MockConnector::new();
    let handle = connector.handle();
    let panel = Panel::new(Box::new(connector), &quiet_config());
    let (tx, rx) = mpsc::channel(16);

    let drive = handle.clone();
    let script = async move {
        connect(&tx).await;
        tx.send(PanelEvent::JogPressed(Positive)).await.unwrap();
        time::sleep(Duration::from_millis(100)).await;
        drive.set_failing(true);
        // keep the channel open past the next tick
        time::sleep(Duration::from_millis(500)).await;
    };
    let (result, ()) = tokio::join!(panel.run(rx), script);

    assert!(matches!(result, Err(PanelError::Drive(_))));
    assert_eq!(jogs(&handle, true), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_press_leaves_power_stage_disabled() {
    let connector = MockConnector::new();
    let handle = connector.handle();
    let panel = Panel::new(Box::new(connector), &quiet_config());
    let (tx, rx) = mpsc::channel(16);

    handle.fail_when(|command| matches!(command, DriveCommand::Jog { .. }));
    let script = async move {
        connect(&tx).await;
        tx.send(PanelEvent::JogPressed(Positive)).await.unwrap();
        time::sleep(Duration::from_millis(500)).await;
    };
    let (result, ()) = tokio::join!(panel.run(rx), script);

    assert!(matches!(result, Err(PanelError::Drive(_))));
    let commands = handle.commands();
    assert_eq!(commands.first(), Some(&DriveCommand::EnablePowerstage));
    assert_eq!(commands.last(), Some(&DriveCommand::DisablePowerstage));
    assert_eq!(jogs(&handle, true), 0);
}

#[tokio::test(start_paused = true)]
async fn test_drive_error_can_be_logged_only() {
    let mut config = quiet_config();
    config.panel.stop_on_drive_error = false;

    let connector = MockConnector::new();
    let handle = connector.handle();
    let panel = Panel::new(Box::new(connector), &config);
    let (tx, rx) = mpsc::channel(16);

    let drive = handle.clone();
    let script = async move {
        connect(&tx).await;
        tx.send(PanelEvent::JogPressed(Positive)).await.unwrap();
        time::sleep(Duration::from_millis(100)).await;
        // the tick at 200 ms fails, the one at 400 ms goes through
        drive.set_failing(true);
        time::sleep(Duration::from_millis(200)).await;
        drive.set_failing(false);
        time::sleep(Duration::from_millis(150)).await;
        tx.send(PanelEvent::JogReleased(Positive)).await.unwrap();
    };
    let (result, ()) = tokio::join!(panel.run(rx), script);

    assert!(result.is_ok());
    assert_eq!(jogs(&handle, true), 2);
    assert_eq!(stops(&handle), 1);
}

#[tokio::test(start_paused = true)]
async fn test_continuous_update_refreshes_the_link() {
    let (result, handle) = run_script(Config::default(), |tx| async move {
        connect(&tx).await;
        // 50 ms update interval
        time::sleep(Duration::from_millis(1_010)).await;
    })
    .await;

    assert!(result.is_ok());
    assert!(handle.refreshes() >= 19, "{} refreshes", handle.refreshes());
    assert!(handle.commands().is_empty());
}
