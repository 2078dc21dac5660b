// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cmmt-pc-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Errors of the control panel core

use thiserror::Error;

use crate::drive::DriveError;

/// Errors raised while handling an operator action
#[derive(Error, Debug)]
pub enum PanelError {
    #[error("The IP address '{0}' is not valid")]
    InvalidAddress(String),

    #[error("No drive connected")]
    NotConnected,

    #[error("Drive is not ready for motion")]
    NotReady,

    #[error("{quantity} {value} exceeds the drive range once scaled by {scale_factor}")]
    ValueOutOfRange {
        quantity: &'static str,
        value: i64,
        scale_factor: i64,
    },

    #[error(transparent)]
    Drive(#[from] DriveError),
}

impl PanelError {
    /// Errors that abort the action silently instead of reaching the operator
    pub fn is_silent(&self) -> bool {
        matches!(self, PanelError::NotConnected | PanelError::NotReady)
    }

    /// Errors already logged where they were raised
    pub fn is_reported(&self) -> bool {
        matches!(self, PanelError::InvalidAddress(_))
    }
}

/// Swallow [`PanelError::NotConnected`] and [`PanelError::NotReady`].
///
/// Actions on a missing or busy drive are dropped without notice; every
/// other error is passed on.
pub(crate) fn absorb_gate(result: Result<(), PanelError>, action: &str) -> Result<(), PanelError> {
    match result {
        Err(err) if err.is_silent() => {
            log::debug!("Ignoring {}: {}", action, err);
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let invalid = PanelError::InvalidAddress("10.0.0".into());
        assert!(invalid.is_reported());
        assert!(!invalid.is_silent());

        let out_of_range = PanelError::ValueOutOfRange {
            quantity: "Position",
            value: i64::MAX,
            scale_factor: 1000,
        };
        assert!(!out_of_range.is_reported());
        assert!(!out_of_range.is_silent());

        assert!(PanelError::NotReady.is_silent());
        assert!(!PanelError::NotConnected.is_reported());
    }

    #[test]
    fn test_absorb_gate_keeps_other_errors() {
        assert!(absorb_gate(Err(PanelError::NotConnected), "test").is_ok());
        assert!(matches!(
            absorb_gate(Err(PanelError::InvalidAddress("x".into())), "test"),
            Err(PanelError::InvalidAddress(_))
        ));
    }
}
