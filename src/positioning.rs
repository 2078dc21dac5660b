// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cmmt-pc-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Position tasks
//!
//! Operators enter positions in millimeters and velocities in mm/s. The drive
//! works in device units fixed by the factor group chosen at commissioning,
//! so every value is multiplied by the configured scale factor before it is
//! sent.

use crate::error::PanelError;

/// A position task in device units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionCommand {
    pub position: i32,
    pub velocity: i32,
    pub absolute: bool,
}

impl PositionCommand {
    /// Scale operator values to device units.
    ///
    /// ```
    /// use cmmt_pc_control::positioning::PositionCommand;
    ///
    /// let command = PositionCommand::from_display_units(200, 100, true, 1000).unwrap();
    /// assert_eq!(command.position, 200_000);
    /// assert_eq!(command.velocity, 100_000);
    /// ```
    pub fn from_display_units(
        position: i64,
        velocity: i64,
        absolute: bool,
        scale_factor: i64,
    ) -> Result<Self, PanelError> {
        Ok(Self {
            position: scale("Position", position, scale_factor)?,
            velocity: scale("Velocity", velocity, scale_factor)?,
            absolute,
        })
    }
}

fn scale(quantity: &'static str, value: i64, scale_factor: i64) -> Result<i32, PanelError> {
    value
        .checked_mul(scale_factor)
        .and_then(|scaled| i32::try_from(scaled).ok())
        .ok_or(PanelError::ValueOutOfRange {
            quantity,
            value,
            scale_factor,
        })
}
