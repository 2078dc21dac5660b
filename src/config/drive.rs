// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cmmt-pc-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Drive link configuration
//!
//! This module defines how the application reaches the servo drive: which
//! driver is used, the Modbus TCP endpoint, the register layout of the
//! process data and the timing of the exchanges.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Drive driver selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveType {
    /// CMMT drive over Modbus TCP
    Modbus,
    /// In-memory drive that only logs commands
    Mock,
}

/// Configuration of the drive link.
///
/// # Example
///
/// ```
/// use cmmt_pc_control::config::DriveConfig;
///
/// let drive = DriveConfig {
///     address: "192.168.0.10".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(drive.port, 502);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    /// Driver used to talk to the drive
    #[serde(default = "default_kind")]
    pub kind: DriveType,

    /// IP address proposed by the console `connect` command.
    ///
    /// Default is "192.168.0.1", the factory address of the CMMT.
    #[serde(default = "default_address")]
    pub address: String,

    /// Modbus TCP port of the drive, default 502
    #[serde(default = "default_port")]
    pub port: u16,

    /// Modbus unit identifier, default 1
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Upper bound for every single Modbus request and for power stage
    /// and fault acknowledge handshakes, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Upper bound for homing and position tasks, in milliseconds
    #[serde(default = "default_motion_timeout_ms")]
    pub motion_timeout_ms: u64,

    /// Period of the process data exchange while continuous update is on,
    /// also used as polling period while waiting for the drive
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    /// Keep exchanging process data between commands.
    ///
    /// The drive stops the axis when its Modbus watchdog expires, so this
    /// must stay on for smooth jogging.
    #[serde(default = "default_continuous_update")]
    pub continuous_update: bool,

    /// First holding register of the setpoint words
    #[serde(default)]
    pub output_register: u16,

    /// First input register of the status words
    #[serde(default)]
    pub input_register: u16,
}

fn default_kind() -> DriveType {
    DriveType::Modbus
}

fn default_address() -> String {
    "192.168.0.1".to_string()
}

fn default_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_motion_timeout_ms() -> u64 {
    30_000
}

fn default_update_interval_ms() -> u64 {
    50
}

fn default_continuous_update() -> bool {
    true
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            address: default_address(),
            port: default_port(),
            unit_id: default_unit_id(),
            timeout_ms: default_timeout_ms(),
            motion_timeout_ms: default_motion_timeout_ms(),
            update_interval_ms: default_update_interval_ms(),
            continuous_update: default_continuous_update(),
            output_register: 0,
            input_register: 0,
        }
    }
}

impl DriveConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn motion_timeout(&self) -> Duration {
        Duration::from_millis(self.motion_timeout_ms)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}
