// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cmmt-pc-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Press-and-hold jog control
//!
//! Each jog direction is an independent [`JogAxis`] state machine:
//!
//! ```text
//!            press (drive ready)             release
//!   Idle ─────────────────────────> Jogging ─────────> Idle
//!                                   │    ^
//!                                   └────┘ timer tick: jog again
//! ```
//!
//! Entering `Jogging` enables the power stage, sends one jog request and arms
//! the axis timer. Every tick sends another non-blocking jog request so the
//! drive keeps moving while the control is held. Release always disarms the
//! timer, stops motion and disables the power stage.

use std::fmt;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;

use crate::drive::{DriveError, DriveLink};
use crate::error::PanelError;
use crate::session::SessionManager;

/// Direction of a jog control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JogDirection {
    Positive,
    Negative,
}

impl JogDirection {
    pub fn is_forward(self) -> bool {
        self == JogDirection::Positive
    }
}

impl fmt::Display for JogDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JogDirection::Positive => write!(f, "positive"),
            JogDirection::Negative => write!(f, "negative"),
        }
    }
}

/// One jog command. Built and submitted once per tick, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JogRequest {
    pub direction: JogDirection,
    /// Zero: send the setpoint and return without waiting
    pub duration: Duration,
}

impl JogRequest {
    pub fn new(direction: JogDirection) -> Self {
        Self {
            direction,
            duration: Duration::ZERO,
        }
    }

    pub async fn submit(self, link: &mut (dyn DriveLink + Send)) -> Result<(), DriveError> {
        link.jog(
            self.direction.is_forward(),
            !self.direction.is_forward(),
            self.duration,
        )
        .await
    }
}

/// Fixed-period repeating timer
///
/// The timer does not sleep by itself: the owner waits for [`deadline`] and
/// calls [`fired`] when it is reached.
///
/// [`deadline`]: JogTimer::deadline
/// [`fired`]: JogTimer::fired
#[derive(Debug, Clone)]
pub struct JogTimer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl JogTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// First tick one interval from now. An interval beyond the clock range
    /// leaves the timer disarmed.
    pub fn arm(&mut self) {
        self.deadline = Instant::now().checked_add(self.interval);
    }

    /// Idempotent
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Schedule the next tick. Ticks missed while the owner was busy are
    /// dropped instead of fired in a burst.
    pub fn fired(&mut self) {
        if let Some(deadline) = self.deadline {
            let now = Instant::now();
            self.deadline = match deadline.checked_add(self.interval) {
                Some(next) if next > now => Some(next),
                _ => now.checked_add(self.interval),
            };
        }
    }
}

/// State of one jog direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JogState {
    Idle,
    Jogging,
}

/// Jog state machine of one direction
#[derive(Debug, Clone)]
pub struct JogAxis {
    direction: JogDirection,
    state: JogState,
    timer: JogTimer,
}

impl JogAxis {
    pub fn new(direction: JogDirection, interval: Duration) -> Self {
        Self {
            direction,
            state: JogState::Idle,
            timer: JogTimer::new(interval),
        }
    }

    pub fn direction(&self) -> JogDirection {
        self.direction
    }

    pub fn state(&self) -> JogState {
        self.state
    }

    pub fn timer(&self) -> &JogTimer {
        &self.timer
    }

    /// Jog control pressed.
    ///
    /// Fails with [`PanelError::NotConnected`] or [`PanelError::NotReady`]
    /// and stays `Idle` when the drive cannot move. Pressing an axis that is
    /// already jogging does nothing. When the drive fails during the press,
    /// stop and power stage disable are sent before the error is returned.
    pub async fn press(&mut self, session: &mut SessionManager) -> Result<(), PanelError> {
        if self.state == JogState::Jogging {
            debug!("Jog {} already held", self.direction);
            return Ok(());
        }
        if let Err(err) = session.start_jog(JogRequest::new(self.direction)).await {
            if let PanelError::Drive(_) = err {
                if let Err(stop_err) = session.stop_and_disable().await {
                    warn!("Failed to stop jog {} after {}: {}", self.direction, err, stop_err);
                }
            }
            return Err(err);
        }
        self.timer.arm();
        self.state = JogState::Jogging;
        debug!("Jog {} started", self.direction);
        Ok(())
    }

    /// Timer tick while held: send the next jog request.
    ///
    /// The readiness gate is checked on every tick; a tick on an idle axis
    /// is ignored.
    pub async fn tick(&mut self, session: &mut SessionManager) -> Result<(), PanelError> {
        if self.state != JogState::Jogging {
            return Ok(());
        }
        self.timer.fired();
        session.jog(JogRequest::new(self.direction)).await
    }

    /// Jog control released.
    ///
    /// The timer is disarmed and the axis returns to `Idle` before the drive
    /// is told to stop, so a failing stop command never leaves the timer
    /// running. Stop and power stage disable are sent whatever the readiness
    /// and the previous state.
    pub async fn release(&mut self, session: &mut SessionManager) -> Result<(), PanelError> {
        self.timer.disarm();
        if self.state == JogState::Jogging {
            debug!("Jog {} released", self.direction);
        }
        self.state = JogState::Idle;
        session.stop_and_disable().await
    }
}
