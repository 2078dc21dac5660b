// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cmmt-pc-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Mock drive for tests and dry runs
//!
//! The mock drive performs no I/O. Every command it receives is appended to a
//! shared log that a [`MockDriveHandle`] can inspect, and its readiness can be
//! switched at any time from the handle. All links opened by the same
//! [`MockConnector`] share one handle.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::debug;

use super::{DriveConnector, DriveError, DriveLink};

/// A command received by the mock drive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveCommand {
    EnablePowerstage,
    DisablePowerstage,
    AcknowledgeFaults,
    ReferenceAxis,
    Jog {
        forward: bool,
        backward: bool,
        duration: Duration,
    },
    StopMotion,
    MoveTo {
        position: i32,
        velocity: i32,
        absolute: bool,
    },
}

impl DriveCommand {
    /// Commands that put the axis in motion or energize it
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            DriveCommand::EnablePowerstage
                | DriveCommand::ReferenceAxis
                | DriveCommand::Jog { .. }
                | DriveCommand::MoveTo { .. }
        )
    }
}

#[derive(Debug)]
struct MockState {
    commands: Mutex<Vec<DriveCommand>>,
    opened: Mutex<Vec<IpAddr>>,
    ready: AtomicBool,
    failing: AtomicBool,
    fail_when: Mutex<Option<fn(&DriveCommand) -> bool>>,
    refreshes: AtomicUsize,
}

/// Shared view on every mock link opened by one connector
#[derive(Debug, Clone)]
pub struct MockDriveHandle {
    state: Arc<MockState>,
}

impl Default for MockDriveHandle {
    fn default() -> Self {
        Self {
            state: Arc::new(MockState {
                commands: Mutex::new(Vec::new()),
                opened: Mutex::new(Vec::new()),
                ready: AtomicBool::new(true),
                failing: AtomicBool::new(false),
                fail_when: Mutex::new(None),
                refreshes: AtomicUsize::new(0),
            }),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockDriveHandle {
    /// Commands received so far, oldest first
    pub fn commands(&self) -> Vec<DriveCommand> {
        lock(&self.state.commands).clone()
    }

    /// Number of received commands matching `predicate`
    pub fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&DriveCommand) -> bool,
    {
        lock(&self.state.commands)
            .iter()
            .filter(|command| predicate(command))
            .count()
    }

    pub fn clear(&self) {
        lock(&self.state.commands).clear();
    }

    /// Addresses links were opened to, in order
    pub fn opened(&self) -> Vec<IpAddr> {
        lock(&self.state.opened).clone()
    }

    pub fn set_ready(&self, ready: bool) {
        self.state.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.state.ready.load(Ordering::SeqCst)
    }

    /// Make every following command fail with [`DriveError::Rejected`].
    /// `false` also clears [`fail_when`](Self::fail_when).
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
        if !failing {
            *lock(&self.state.fail_when) = None;
        }
    }

    /// Make the following commands matching `predicate` fail with
    /// [`DriveError::Rejected`]
    pub fn fail_when(&self, predicate: fn(&DriveCommand) -> bool) {
        *lock(&self.state.fail_when) = Some(predicate);
    }

    pub fn refreshes(&self) -> usize {
        self.state.refreshes.load(Ordering::SeqCst)
    }

    fn record(&self, command: DriveCommand) -> Result<(), DriveError> {
        let selected = matches!(*lock(&self.state.fail_when), Some(predicate) if predicate(&command));
        if self.state.failing.load(Ordering::SeqCst) || selected {
            return Err(DriveError::Rejected {
                command: format!("{:?}", command),
                reason: "mock drive set to fail".to_string(),
            });
        }
        debug!("Mock drive received {:?}", command);
        lock(&self.state.commands).push(command);
        Ok(())
    }
}

/// Connector producing [`MockDrive`] links
#[derive(Debug, Default)]
pub struct MockConnector {
    handle: MockDriveHandle,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> MockDriveHandle {
        self.handle.clone()
    }
}

#[async_trait::async_trait]
impl DriveConnector for MockConnector {
    async fn open(&self, address: IpAddr) -> Result<Box<dyn DriveLink + Send>, DriveError> {
        debug!("Mock drive opened for {}", address);
        lock(&self.handle.state.opened).push(address);
        Ok(Box::new(MockDrive {
            handle: self.handle.clone(),
            continuous_update: false,
        }))
    }
}

/// In-memory drive link
#[derive(Debug)]
pub struct MockDrive {
    handle: MockDriveHandle,
    continuous_update: bool,
}

#[async_trait::async_trait]
impl DriveLink for MockDrive {
    async fn is_ready_for_motion(&mut self) -> Result<bool, DriveError> {
        Ok(self.handle.is_ready())
    }

    async fn enable_powerstage(&mut self) -> Result<(), DriveError> {
        self.handle.record(DriveCommand::EnablePowerstage)
    }

    async fn disable_powerstage(&mut self) -> Result<(), DriveError> {
        self.handle.record(DriveCommand::DisablePowerstage)
    }

    async fn acknowledge_faults(&mut self) -> Result<(), DriveError> {
        self.handle.record(DriveCommand::AcknowledgeFaults)
    }

    async fn reference_axis(&mut self) -> Result<(), DriveError> {
        self.handle.record(DriveCommand::ReferenceAxis)
    }

    async fn jog(
        &mut self,
        forward: bool,
        backward: bool,
        duration: Duration,
    ) -> Result<(), DriveError> {
        self.handle.record(DriveCommand::Jog {
            forward,
            backward,
            duration,
        })
    }

    async fn stop_motion(&mut self) -> Result<(), DriveError> {
        self.handle.record(DriveCommand::StopMotion)
    }

    async fn move_to(
        &mut self,
        position: i32,
        velocity: i32,
        absolute: bool,
    ) -> Result<(), DriveError> {
        self.handle.record(DriveCommand::MoveTo {
            position,
            velocity,
            absolute,
        })
    }

    fn configure_continuous_update(&mut self, enabled: bool) {
        self.continuous_update = enabled;
    }

    async fn refresh(&mut self) -> Result<(), DriveError> {
        if self.continuous_update {
            self.handle.state.refreshes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
