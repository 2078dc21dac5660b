// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cmmt-pc-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! CMMT control panel library
//!
//! Operator control of a Festo CMMT servo drive over Modbus TCP: session
//! management, press-and-hold jogging, homing and position tasks.

pub mod config;
pub mod console;
pub mod drive;
pub mod error;
pub mod jog;
pub mod modbus;
pub mod panel;
pub mod positioning;
pub mod session;

pub use error::PanelError;
pub use panel::{Panel, PanelEvent};
