// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cmmt-pc-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus server side
//!
//! A simulated CMMT drive answering telegram 111 process data over Modbus TCP,
//! used by the `drive_simulator` binary and the integration tests.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::{Arc, Mutex};
//! use cmmt_pc_control::modbus::{serve, DriveModel};
//!
//! # async fn run() -> std::io::Result<()> {
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:5502").await?;
//! let model = Arc::new(Mutex::new(DriveModel::default()));
//! serve(listener, model).await
//! # }
//! ```
//!
//! ## Register Map
//!
//! ### Holding Registers (Read/Write)
//!
//! - Registers `output_register` to `output_register + 11`: telegram 111 setpoint words
//!
//! ### Input Registers (Read-Only)
//!
//! - Registers `input_register` to `input_register + 11`: telegram 111 status words

pub mod drive_server;
pub use drive_server::{lock_model, serve, DriveModel, SharedDriveModel, SimulatedDrive};
