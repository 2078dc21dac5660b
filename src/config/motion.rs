// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cmmt-pc-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Jog and positioning configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings of the press-and-hold jog controls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JogConfig {
    /// Period between two jog commands while a jog control is held, in
    /// milliseconds. Default is 200.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    200
}

impl Default for JogConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

impl JogConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Settings of the position task controls.
///
/// Operators enter positions in millimeters and velocities in mm/s. The
/// drive expects device units, which depend on the factor group chosen
/// during commissioning: with factor group -6 one millimeter is 1000 units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositioningConfig {
    /// Device units per millimeter
    #[serde(default = "default_scale_factor")]
    pub scale_factor: i64,

    /// Whether moves are absolute until the operator switches mode
    #[serde(default)]
    pub absolute: bool,

    /// Position proposed to the operator, in millimeters
    #[serde(default = "default_position")]
    pub default_position: i64,

    /// Velocity proposed to the operator, in mm/s
    #[serde(default = "default_velocity")]
    pub default_velocity: i64,
}

fn default_scale_factor() -> i64 {
    1000
}

fn default_position() -> i64 {
    200
}

fn default_velocity() -> i64 {
    100
}

impl Default for PositioningConfig {
    fn default() -> Self {
        Self {
            scale_factor: default_scale_factor(),
            absolute: false,
            default_position: default_position(),
            default_velocity: default_velocity(),
        }
    }
}

/// Behaviour of the panel event loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Stop the panel when the drive reports a communication or device
    /// error. When `false` the error is logged and the panel keeps running.
    #[serde(default = "default_stop_on_drive_error")]
    pub stop_on_drive_error: bool,
}

fn default_stop_on_drive_error() -> bool {
    true
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            stop_on_drive_error: default_stop_on_drive_error(),
        }
    }
}
