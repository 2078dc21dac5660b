// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cmmt-pc-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Servo drive communication
//!
//! This module abstracts the servo drive behind two traits:
//! - [`DriveConnector`] opens a link to a drive at a given address
//! - [`DriveLink`] is an open link exposing the drive's motion capabilities
//!
//! Two implementations are provided:
//! - Modbus: PROFIdrive telegram 111 over Modbus TCP, for a real CMMT drive
//! - Mock: in-memory drive recording every command, for tests and dry runs

pub mod mock;
pub mod modbus;
pub mod telegram;

use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;

use crate::config::{DriveConfig, DriveType};

pub use mock::{DriveCommand, MockConnector, MockDriveHandle};
pub use modbus::{ModbusConnector, ModbusDrive};

/// Errors raised by a drive link
#[derive(Error, Debug)]
pub enum DriveError {
    #[error("Modbus communication failed: {0}")]
    Modbus(#[from] tokio_modbus::Error),

    #[error("Drive answered with Modbus exception: {0}")]
    Exception(#[from] tokio_modbus::ExceptionCode),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {timeout:?} waiting for {operation}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Drive returned {received} status words, expected {expected}")]
    ShortResponse { received: usize, expected: usize },

    #[error("Drive rejected {command}: {reason}")]
    Rejected { command: String, reason: String },
}

/// An open link to a servo drive.
///
/// Every method maps to one capability of the drive. Blocking procedures
/// (`reference_axis`, `move_to`, power stage changes) return once the drive
/// reports the requested state. `jog` with a zero duration returns as soon as
/// the jog setpoint is sent.
#[async_trait::async_trait]
pub trait DriveLink {
    /// Whether the drive currently accepts motion commands
    async fn is_ready_for_motion(&mut self) -> Result<bool, DriveError>;

    async fn enable_powerstage(&mut self) -> Result<(), DriveError>;

    async fn disable_powerstage(&mut self) -> Result<(), DriveError>;

    async fn acknowledge_faults(&mut self) -> Result<(), DriveError>;

    /// Run the homing procedure configured during commissioning
    async fn reference_axis(&mut self) -> Result<(), DriveError>;

    /// Jog in one direction. A zero `duration` only sends the setpoint,
    /// otherwise motion is stopped again once `duration` has elapsed.
    async fn jog(
        &mut self,
        forward: bool,
        backward: bool,
        duration: Duration,
    ) -> Result<(), DriveError>;

    async fn stop_motion(&mut self) -> Result<(), DriveError>;

    /// Position task in device units
    async fn move_to(
        &mut self,
        position: i32,
        velocity: i32,
        absolute: bool,
    ) -> Result<(), DriveError>;

    /// Turn periodic process data exchange on or off
    fn configure_continuous_update(&mut self, enabled: bool);

    /// Exchange process data once if continuous update is enabled
    async fn refresh(&mut self) -> Result<(), DriveError>;
}

/// Opens drive links
#[async_trait::async_trait]
pub trait DriveConnector {
    async fn open(&self, address: IpAddr) -> Result<Box<dyn DriveLink + Send>, DriveError>;
}

/// Create the connector matching the configured drive type
pub fn create_connector(config: &DriveConfig) -> Box<dyn DriveConnector + Send + Sync> {
    match config.kind {
        DriveType::Modbus => Box::new(ModbusConnector::new(config.clone())),
        DriveType::Mock => Box::new(MockConnector::new()),
    }
}
