// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cmmt-pc-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP link to a CMMT drive
//!
//! The drive is the Modbus server, this link is the client. Each process data
//! exchange writes the twelve setpoint words of telegram 111 as holding
//! registers and reads back the twelve status words as input registers.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::{self, Instant};
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

use super::telegram::{stw1, zsw1, Setpoint, Status, TELEGRAM_111_WORDS};
use super::{DriveConnector, DriveError, DriveLink};
use crate::config::DriveConfig;

/// Opens [`ModbusDrive`] links with a shared configuration
pub struct ModbusConnector {
    config: DriveConfig,
}

impl ModbusConnector {
    pub fn new(config: DriveConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl DriveConnector for ModbusConnector {
    async fn open(&self, address: IpAddr) -> Result<Box<dyn DriveLink + Send>, DriveError> {
        let drive = ModbusDrive::connect(address, self.config.clone()).await?;
        Ok(Box::new(drive))
    }
}

/// Telegram 111 process data over a Modbus TCP connection
pub struct ModbusDrive {
    ctx: Context,
    config: DriveConfig,
    setpoint: Setpoint,
    status: Status,
    continuous_update: bool,
}

impl ModbusDrive {
    /// Connect to the drive and hand control to this client
    pub async fn connect(address: IpAddr, config: DriveConfig) -> Result<Self, DriveError> {
        let socket_addr = SocketAddr::new(address, config.port);
        info!(
            "Connecting to drive at {} (unit {})",
            socket_addr, config.unit_id
        );

        let timeout = config.request_timeout();
        let ctx = time::timeout(timeout, tcp::connect_slave(socket_addr, Slave(config.unit_id)))
            .await
            .map_err(|_| DriveError::Timeout {
                operation: "connection",
                timeout,
            })??;

        let mut drive = Self {
            ctx,
            config,
            setpoint: Setpoint::initial(),
            status: Status::default(),
            continuous_update: false,
        };
        let status = drive.exchange().await?;
        debug!("Drive connected, ZSW1 = {:#06x}", status.zsw1);
        Ok(drive)
    }

    /// Last status read from the drive
    pub fn status(&self) -> Status {
        self.status
    }

    /// Setpoint as last sent to the drive
    pub fn setpoint(&self) -> Setpoint {
        self.setpoint
    }

    /// Write the current setpoint and read the drive status back
    async fn exchange(&mut self) -> Result<Status, DriveError> {
        let timeout = self.config.request_timeout();
        let words = self.setpoint.to_words();

        time::timeout(
            timeout,
            self.ctx
                .write_multiple_registers(self.config.output_register, &words),
        )
        .await
        .map_err(|_| DriveError::Timeout {
            operation: "setpoint write",
            timeout,
        })???;

        let response = time::timeout(
            timeout,
            self.ctx
                .read_input_registers(self.config.input_register, TELEGRAM_111_WORDS),
        )
        .await
        .map_err(|_| DriveError::Timeout {
            operation: "status read",
            timeout,
        })???;

        self.status = Status::from_words(&response).ok_or(DriveError::ShortResponse {
            received: response.len(),
            expected: TELEGRAM_111_WORDS as usize,
        })?;
        Ok(self.status)
    }

    /// Exchange process data until `condition` holds or `timeout` elapses
    async fn wait_for<F>(
        &mut self,
        operation: &'static str,
        timeout: Duration,
        condition: F,
    ) -> Result<Status, DriveError>
    where
        F: Fn(&Status) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.exchange().await?;
            if condition(&status) {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                warn!(
                    "Drive did not reach {} (ZSW1 = {:#06x}, fault code {})",
                    operation, status.zsw1, status.fault_code
                );
                return Err(DriveError::Timeout { operation, timeout });
            }
            time::sleep(self.config.update_interval()).await;
        }
    }

    /// Produce a rising edge on a handshake bit of STW1
    async fn pulse_stw1(&mut self, bits: u16) -> Result<(), DriveError> {
        self.setpoint.set_stw1(bits, false);
        self.exchange().await?;
        self.setpoint.set_stw1(bits, true);
        self.exchange().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DriveLink for ModbusDrive {
    async fn is_ready_for_motion(&mut self) -> Result<bool, DriveError> {
        let status = self.exchange().await?;
        Ok(status.ready_for_motion())
    }

    async fn enable_powerstage(&mut self) -> Result<(), DriveError> {
        debug!("Enabling power stage");
        if !self.status.operation_enabled() {
            // the drive only switches on from a rising edge of ON
            self.setpoint
                .set_stw1(stw1::ON | stw1::ENABLE_OPERATION, false);
            self.exchange().await?;
        }
        self.setpoint
            .set_stw1(stw1::ON | stw1::ENABLE_OPERATION, true);
        let timeout = self.config.request_timeout();
        self.wait_for("power stage enable", timeout, Status::operation_enabled)
            .await?;
        Ok(())
    }

    async fn disable_powerstage(&mut self) -> Result<(), DriveError> {
        debug!("Disabling power stage");
        self.setpoint
            .set_stw1(stw1::ON | stw1::ENABLE_OPERATION, false);
        let timeout = self.config.request_timeout();
        self.wait_for("power stage disable", timeout, |status| {
            !status.operation_enabled()
        })
        .await?;
        Ok(())
    }

    async fn acknowledge_faults(&mut self) -> Result<(), DriveError> {
        let status = self.exchange().await?;
        if status.fault_present() {
            info!("Acknowledging drive fault {}", status.fault_code);
        }
        self.pulse_stw1(stw1::ACKNOWLEDGE_FAULT).await?;
        let timeout = self.config.request_timeout();
        let result = self
            .wait_for("fault acknowledge", timeout, |status| !status.fault_present())
            .await;
        self.setpoint.set_stw1(stw1::ACKNOWLEDGE_FAULT, false);
        let status = self.exchange().await?;
        if status.has_zsw1(zsw1::SWITCHING_ON_INHIBITED) && self.setpoint.has_stw1(stw1::ON) {
            debug!("Switching on inhibited after fault, clearing ON");
            self.setpoint
                .set_stw1(stw1::ON | stw1::ENABLE_OPERATION, false);
            self.exchange().await?;
        }
        result.map(|_| ())
    }

    async fn reference_axis(&mut self) -> Result<(), DriveError> {
        info!("Starting homing procedure");
        self.pulse_stw1(stw1::START_HOMING).await?;
        let timeout = self.config.motion_timeout();
        let result = self
            .wait_for("home position", timeout, |status| {
                status.home_position_set() && status.drive_stopped()
            })
            .await;
        self.setpoint.set_stw1(stw1::START_HOMING, false);
        self.exchange().await?;
        let status = result?;
        info!("Homing finished at {}", status.xist_a);
        Ok(())
    }

    async fn jog(
        &mut self,
        forward: bool,
        backward: bool,
        duration: Duration,
    ) -> Result<(), DriveError> {
        self.setpoint.set_stw1(stw1::JOG_1, forward);
        self.setpoint.set_stw1(stw1::JOG_2, backward);
        self.exchange().await?;

        if !duration.is_zero() {
            time::sleep(duration).await;
            self.stop_motion().await?;
        }
        Ok(())
    }

    async fn stop_motion(&mut self) -> Result<(), DriveError> {
        debug!("Stopping motion");
        self.setpoint.set_stw1(
            stw1::JOG_1 | stw1::JOG_2 | stw1::ACTIVATE_TRAVERSING_TASK | stw1::START_HOMING,
            false,
        );
        self.exchange().await?;
        Ok(())
    }

    async fn move_to(
        &mut self,
        position: i32,
        velocity: i32,
        absolute: bool,
    ) -> Result<(), DriveError> {
        info!(
            "Position task: {} at {} ({})",
            position,
            velocity,
            if absolute { "absolute" } else { "relative" }
        );
        self.setpoint.mdi_tarpos = position;
        self.setpoint.mdi_velocity = velocity;
        self.setpoint.set_absolute(absolute);
        self.pulse_stw1(stw1::ACTIVATE_TRAVERSING_TASK).await?;

        let timeout = self.config.motion_timeout();
        let result = self
            .wait_for("target position", timeout, Status::target_position_reached)
            .await;
        self.setpoint
            .set_stw1(stw1::ACTIVATE_TRAVERSING_TASK, false);
        self.exchange().await?;
        let status = result?;
        debug!("Target reached, actual position {}", status.xist_a);
        Ok(())
    }

    fn configure_continuous_update(&mut self, enabled: bool) {
        debug!("Continuous update {}", if enabled { "on" } else { "off" });
        self.continuous_update = enabled;
    }

    async fn refresh(&mut self) -> Result<(), DriveError> {
        if self.continuous_update {
            self.exchange().await?;
        }
        Ok(())
    }
}
