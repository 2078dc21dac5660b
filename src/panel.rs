// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cmmt-pc-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Control panel event loop
//!
//! The [`Panel`] owns the drive session and both jog axes. Operator events,
//! jog timer ticks and process data refreshes are all handled one at a time
//! by [`Panel::run`], so no state is ever shared between tasks.
//!
//! Silent gate errors ([`PanelError::NotConnected`], [`PanelError::NotReady`])
//! are dropped. Operator input errors are logged. Drive errors stop the loop
//! unless `panel.stop_on_drive_error` is off.

use std::fmt;
use std::future;
use std::net::IpAddr;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::config::Config;
use crate::drive::DriveConnector;
use crate::error::{absorb_gate, PanelError};
use crate::jog::{JogAxis, JogDirection, JogState};
use crate::positioning::PositionCommand;
use crate::session::SessionManager;

/// Operator actions delivered to the panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEvent {
    Connect(String),
    AcknowledgeFaults,
    EnablePowerstage,
    DisablePowerstage,
    Reference,
    JogPressed(JogDirection),
    JogReleased(JogDirection),
    /// Absolute (`true`) or relative (`false`) position tasks from now on
    SetAbsolute(bool),
    /// Position task in operator units, `absolute` overrides the panel mode
    MoveToPosition {
        position: i64,
        velocity: i64,
        absolute: Option<bool>,
    },
    Status,
    Quit,
}

/// Snapshot of the panel for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelStatus {
    pub address: Option<IpAddr>,
    pub ready: bool,
    pub positive: JogState,
    pub negative: JogState,
    pub absolute: bool,
}

impl fmt::Display for PanelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            Some(address) => write!(f, "connected to {}", address)?,
            None => write!(f, "not connected")?,
        }
        write!(
            f,
            ", {}, jog+ {:?}, jog- {:?}, {} moves",
            if self.ready { "ready" } else { "not ready" },
            self.positive,
            self.negative,
            if self.absolute { "absolute" } else { "relative" }
        )
    }
}

/// Control panel state and event loop
pub struct Panel {
    session: SessionManager,
    positive: JogAxis,
    negative: JogAxis,
    absolute: bool,
    scale_factor: i64,
    update_interval: Option<Duration>,
    stop_on_drive_error: bool,
}

impl Panel {
    pub fn new(connector: Box<dyn DriveConnector + Send + Sync>, config: &Config) -> Self {
        let continuous_update = config.drive.continuous_update;
        let interval = config.jog.interval();
        Self {
            session: SessionManager::new(connector, continuous_update),
            positive: JogAxis::new(JogDirection::Positive, interval),
            negative: JogAxis::new(JogDirection::Negative, interval),
            absolute: config.positioning.absolute,
            scale_factor: config.positioning.scale_factor,
            update_interval: continuous_update.then(|| config.drive.update_interval()),
            stop_on_drive_error: config.panel.stop_on_drive_error,
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionManager {
        &mut self.session
    }

    pub fn axis(&self, direction: JogDirection) -> &JogAxis {
        match direction {
            JogDirection::Positive => &self.positive,
            JogDirection::Negative => &self.negative,
        }
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// Split borrow of the session and one axis
    fn axis_and_session(&mut self, direction: JogDirection) -> (&mut JogAxis, &mut SessionManager) {
        let axis = match direction {
            JogDirection::Positive => &mut self.positive,
            JogDirection::Negative => &mut self.negative,
        };
        (axis, &mut self.session)
    }

    /// Scale and send a position task, in operator units
    pub async fn move_to_position(
        &mut self,
        position: i64,
        velocity: i64,
        absolute: bool,
    ) -> Result<(), PanelError> {
        let command =
            PositionCommand::from_display_units(position, velocity, absolute, self.scale_factor)?;
        self.session.position_move(command).await
    }

    pub async fn status(&mut self) -> Result<PanelStatus, PanelError> {
        Ok(PanelStatus {
            address: self.session.address(),
            ready: self.session.is_ready().await?,
            positive: self.positive.state(),
            negative: self.negative.state(),
            absolute: self.absolute,
        })
    }

    /// Handle one operator event. Gate errors are swallowed here.
    pub async fn handle(&mut self, event: PanelEvent) -> Result<(), PanelError> {
        debug!("Handling {:?}", event);
        let result = match event {
            PanelEvent::Connect(address) => self.session.connect(&address).await.map(|_| ()),
            PanelEvent::AcknowledgeFaults => self.session.acknowledge_faults().await,
            PanelEvent::EnablePowerstage => self.session.enable_powerstage().await,
            PanelEvent::DisablePowerstage => self.session.disable_powerstage().await,
            PanelEvent::Reference => self.session.reference().await,
            PanelEvent::JogPressed(direction) => {
                let (axis, session) = self.axis_and_session(direction);
                axis.press(session).await
            }
            PanelEvent::JogReleased(direction) => {
                let (axis, session) = self.axis_and_session(direction);
                axis.release(session).await
            }
            PanelEvent::SetAbsolute(absolute) => {
                self.absolute = absolute;
                Ok(())
            }
            PanelEvent::MoveToPosition {
                position,
                velocity,
                absolute,
            } => {
                let absolute = absolute.unwrap_or(self.absolute);
                self.move_to_position(position, velocity, absolute).await
            }
            PanelEvent::Status => {
                let status = self.status().await?;
                println!("{}", status);
                Ok(())
            }
            PanelEvent::Quit => Ok(()),
        };
        absorb_gate(result, "operator action")
    }

    /// Jog timer of `direction` reached its deadline
    pub async fn tick(&mut self, direction: JogDirection) -> Result<(), PanelError> {
        let (axis, session) = self.axis_and_session(direction);
        absorb_gate(axis.tick(session).await, "jog tick")
    }

    /// Process events until [`PanelEvent::Quit`] or the sender is dropped.
    ///
    /// Held jog controls are released on the way out.
    pub async fn run(mut self, mut events: mpsc::Receiver<PanelEvent>) -> Result<(), PanelError> {
        let mut refresh = self.update_interval.map(|period| {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        info!("Control panel running");
        loop {
            let positive_due = self.positive.timer().deadline();
            let negative_due = self.negative.timer().deadline();

            // a tick due at the same instant as a release goes first
            let outcome = tokio::select! {
                biased;
                _ = wait_until(positive_due) => self.tick(JogDirection::Positive).await,
                _ = wait_until(negative_due) => self.tick(JogDirection::Negative).await,
                event = events.recv() => match event {
                    None | Some(PanelEvent::Quit) => break,
                    Some(event) => self.handle(event).await,
                },
                _ = next_refresh(&mut refresh) => self.session.refresh().await,
            };

            match outcome {
                Ok(()) => {}
                Err(PanelError::Drive(err)) if self.stop_on_drive_error => {
                    error!("Drive error, stopping control panel: {}", err);
                    self.release_all().await;
                    return Err(PanelError::Drive(err));
                }
                Err(PanelError::Drive(err)) => error!("Drive error: {}", err),
                Err(err) if err.is_reported() => {}
                Err(err) => warn!("{}", err),
            }
        }

        self.release_all().await;
        info!("Control panel stopped");
        Ok(())
    }

    /// Release every held jog control, logging failures
    async fn release_all(&mut self) {
        for direction in [JogDirection::Positive, JogDirection::Negative] {
            let (axis, session) = self.axis_and_session(direction);
            if axis.state() == JogState::Jogging {
                if let Err(err) = absorb_gate(axis.release(session).await, "jog release") {
                    error!("Failed to release jog {}: {}", direction, err);
                }
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

async fn next_refresh(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::{DriveCommand, MockConnector, MockDriveHandle};

    fn panel() -> (Panel, MockDriveHandle) {
        let connector = MockConnector::new();
        let handle = connector.handle();
        (Panel::new(Box::new(connector), &Config::default()), handle)
    }

    #[tokio::test]
    async fn test_actions_without_session_are_silent() {
        let (mut panel, handle) = panel();
        for event in [
            PanelEvent::AcknowledgeFaults,
            PanelEvent::DisablePowerstage,
            PanelEvent::EnablePowerstage,
            PanelEvent::Reference,
            PanelEvent::JogPressed(JogDirection::Positive),
            PanelEvent::JogReleased(JogDirection::Positive),
            PanelEvent::MoveToPosition {
                position: 200,
                velocity: 100,
                absolute: None,
            },
        ] {
            assert!(panel.handle(event).await.is_ok());
        }
        assert!(handle.commands().is_empty());
        assert_eq!(panel.axis(JogDirection::Positive).state(), JogState::Idle);
    }

    #[tokio::test]
    async fn test_invalid_address_is_reported() {
        let (mut panel, handle) = panel();
        let result = panel.handle(PanelEvent::Connect("192.168.0.".into())).await;
        assert!(matches!(result, Err(PanelError::InvalidAddress(_))));
        assert!(handle.opened().is_empty());
    }

    #[tokio::test]
    async fn test_move_uses_scale_and_mode() {
        let (mut panel, handle) = panel();
        panel
            .handle(PanelEvent::Connect("192.168.0.1".into()))
            .await
            .unwrap();
        panel.handle(PanelEvent::SetAbsolute(true)).await.unwrap();
        panel
            .handle(PanelEvent::MoveToPosition {
                position: 200,
                velocity: 100,
                absolute: None,
            })
            .await
            .unwrap();

        let moves: Vec<_> = handle
            .commands()
            .into_iter()
            .filter(|c| matches!(c, DriveCommand::MoveTo { .. }))
            .collect();
        assert_eq!(
            moves,
            vec![DriveCommand::MoveTo {
                position: 200_000,
                velocity: 100_000,
                absolute: true,
            }]
        );
    }

    #[tokio::test]
    async fn test_nothing_moves_while_not_ready() {
        let (mut panel, handle) = panel();
        panel
            .handle(PanelEvent::Connect("192.168.0.1".into()))
            .await
            .unwrap();
        handle.set_ready(false);

        for event in [
            PanelEvent::EnablePowerstage,
            PanelEvent::Reference,
            PanelEvent::JogPressed(JogDirection::Negative),
            PanelEvent::MoveToPosition {
                position: 1,
                velocity: 1,
                absolute: Some(false),
            },
        ] {
            panel.handle(event).await.unwrap();
        }
        panel.tick(JogDirection::Negative).await.unwrap();

        assert_eq!(handle.count(DriveCommand::is_motion), 0);
    }

    #[tokio::test]
    async fn test_status_reports_session_and_axes() {
        let (mut panel, _handle) = panel();
        let status = panel.status().await.unwrap();
        assert_eq!(status.address, None);
        assert!(!status.ready);

        panel
            .handle(PanelEvent::Connect("10.1.2.3".into()))
            .await
            .unwrap();
        panel
            .handle(PanelEvent::JogPressed(JogDirection::Positive))
            .await
            .unwrap();
        let status = panel.status().await.unwrap();
        assert_eq!(status.address, Some("10.1.2.3".parse().unwrap()));
        assert!(status.ready);
        assert_eq!(status.positive, JogState::Jogging);
        assert_eq!(status.negative, JogState::Idle);
        assert_eq!(
            status.to_string(),
            "connected to 10.1.2.3, ready, jog+ Jogging, jog- Idle, relative moves"
        );
    }
}
