// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cmmt-pc-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated CMMT drive served over Modbus TCP
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module uses
//! the terms "server" and "client" instead. The simulated drive is the server, the
//! control panel is the client.
//!
//! The drive model reacts to every setpoint write the way the real drive reacts
//! to a telegram 111 cycle, but motion is instantaneous: a position task reaches
//! its target on the rising edge of `ACTIVATE_TRAVERSING_TASK`, homing sets the
//! position to zero, and each setpoint write while jogging moves the axis by one
//! jog step.

use std::{
    future, io,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use log::{debug, error, info};
use tokio::net::TcpListener;
use tokio_modbus::{
    prelude::*,
    server::tcp::{accept_tcp_connection, Server},
};

use crate::drive::telegram::{pos_stw1, stw1, zsw1, Setpoint, Status, TELEGRAM_111_WORDS};

/// Distance moved for each setpoint write received while jogging, in device units
pub const DEFAULT_JOG_STEP: i32 = 1_000;

/// Behaviour of the simulated drive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveModel {
    setpoint: Setpoint,
    position: i32,
    velocity: i32,
    fault_code: Option<u16>,
    /// Set by a fault, cleared once ON is released
    on_lockout: bool,
    homed: bool,
    target_reached: bool,
    jog_step: i32,
    output_register: u16,
    input_register: u16,
}

impl Default for DriveModel {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl DriveModel {
    /// Drive with setpoint words at `output_register` and status words at
    /// `input_register`
    pub fn new(output_register: u16, input_register: u16) -> Self {
        Self {
            setpoint: Setpoint::default(),
            position: 0,
            velocity: 0,
            fault_code: None,
            on_lockout: false,
            homed: false,
            target_reached: true,
            jog_step: DEFAULT_JOG_STEP,
            output_register,
            input_register,
        }
    }

    pub fn with_jog_step(mut self, jog_step: i32) -> Self {
        self.jog_step = jog_step;
        self
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn setpoint(&self) -> Setpoint {
        self.setpoint
    }

    pub fn is_homed(&self) -> bool {
        self.homed
    }

    /// Latch a fault, switching the power stage off. The drive stays in
    /// "switching on inhibited" until ON has been released, even after the
    /// fault is acknowledged.
    pub fn inject_fault(&mut self, code: u16) {
        info!("Simulated fault {}", code);
        self.fault_code = Some(code);
        self.on_lockout = true;
        self.velocity = 0;
    }

    /// Fault going away on the drive side, without any acknowledge from the
    /// controller
    pub fn clear_fault(&mut self) {
        if let Some(code) = self.fault_code.take() {
            info!("Simulated fault {} cleared", code);
        }
    }

    fn switching_on_inhibited(&self) -> bool {
        self.on_lockout
            || !self
                .setpoint
                .has_stw1(stw1::NO_COAST_STOP | stw1::NO_QUICK_STOP)
    }

    fn operation_enabled(&self) -> bool {
        self.fault_code.is_none()
            && !self.switching_on_inhibited()
            && self.setpoint.has_stw1(stw1::ON | stw1::ENABLE_OPERATION)
    }

    fn jog_direction(&self) -> i32 {
        match (
            self.setpoint.has_stw1(stw1::JOG_1),
            self.setpoint.has_stw1(stw1::JOG_2),
        ) {
            (true, false) => 1,
            (false, true) => -1,
            _ => 0,
        }
    }

    /// Apply a new setpoint, one cycle of the drive
    pub fn apply(&mut self, setpoint: Setpoint) {
        let previous = self.setpoint.stw1;
        let rising = |bits: u16| setpoint.stw1 & bits != 0 && previous & bits == 0;
        let acknowledge = rising(stw1::ACKNOWLEDGE_FAULT);
        let homing = rising(stw1::START_HOMING);
        let traversing = rising(stw1::ACTIVATE_TRAVERSING_TASK);
        self.setpoint = setpoint;

        if !setpoint.has_stw1(stw1::ON) {
            self.on_lockout = false;
        }

        if acknowledge {
            if let Some(code) = self.fault_code.take() {
                info!("Fault {} acknowledged", code);
            }
        }

        if !self.operation_enabled() {
            self.velocity = 0;
            return;
        }

        if homing {
            debug!("Homing from {}", self.position);
            self.position = 0;
            self.homed = true;
            self.target_reached = true;
        }

        if traversing {
            let target = self.setpoint.mdi_tarpos;
            self.position = if self.setpoint.pos_stw1 & pos_stw1::ABSOLUTE != 0 {
                target
            } else {
                self.position.saturating_add(target)
            };
            self.target_reached = true;
            debug!("Position task done at {}", self.position);
        }

        let direction = self.jog_direction();
        self.velocity = direction * self.jog_step;
        if direction != 0 {
            self.position = self.position.saturating_add(self.velocity);
            self.target_reached = false;
        }
    }

    /// Status words the drive currently reports
    pub fn status(&self) -> Status {
        let control = self.setpoint.stw1;
        let mut word = zsw1::NO_FOLLOWING_ERROR;
        let mut set = |bits: u16, value: bool| {
            if value {
                word |= bits;
            }
        };
        set(zsw1::READY_TO_SWITCH_ON, self.fault_code.is_none());
        set(
            zsw1::READY_TO_OPERATE,
            self.fault_code.is_none() && control & stw1::ON != 0,
        );
        set(zsw1::OPERATION_ENABLED, self.operation_enabled());
        set(zsw1::FAULT_PRESENT, self.fault_code.is_some());
        set(zsw1::NO_COAST_STOP, control & stw1::NO_COAST_STOP != 0);
        set(zsw1::NO_QUICK_STOP, control & stw1::NO_QUICK_STOP != 0);
        set(zsw1::SWITCHING_ON_INHIBITED, self.switching_on_inhibited());
        set(zsw1::CONTROL_REQUESTED, control & stw1::CONTROL_BY_PLC != 0);
        set(zsw1::TARGET_POSITION_REACHED, self.target_reached);
        set(zsw1::HOME_POSITION_SET, self.homed);
        set(
            zsw1::TRAVERSING_TASK_ACK,
            control & stw1::ACTIVATE_TRAVERSING_TASK != 0,
        );
        set(zsw1::DRIVE_STOPPED, self.velocity == 0);

        Status {
            zsw1: word,
            xist_a: self.position,
            nist_b: self.velocity,
            fault_code: self.fault_code.unwrap_or(0),
            ..Default::default()
        }
    }

    fn read_input_registers(&self, addr: u16, cnt: u16) -> Result<Vec<u16>, ExceptionCode> {
        register_read(&self.status().to_words(), self.input_register, addr, cnt)
    }

    fn read_holding_registers(&self, addr: u16, cnt: u16) -> Result<Vec<u16>, ExceptionCode> {
        register_read(&self.setpoint.to_words(), self.output_register, addr, cnt)
    }

    fn write_registers(&mut self, addr: u16, values: &[u16]) -> Result<(), ExceptionCode> {
        let mut words = self.setpoint.to_words();
        let start = block_offset(self.output_register, addr, values.len())?;
        words[start..start + values.len()].copy_from_slice(values);
        let setpoint = Setpoint::from_words(&words).ok_or(ExceptionCode::ServerDeviceFailure)?;
        self.apply(setpoint);
        Ok(())
    }
}

/// Offset of `addr..addr + len` inside the telegram block starting at `base`
fn block_offset(base: u16, addr: u16, len: usize) -> Result<usize, ExceptionCode> {
    let start = addr
        .checked_sub(base)
        .map(usize::from)
        .ok_or(ExceptionCode::IllegalDataAddress)?;
    if len == 0 || start + len > TELEGRAM_111_WORDS as usize {
        error!("SERVER: Exception::IllegalDataAddress");
        return Err(ExceptionCode::IllegalDataAddress);
    }
    Ok(start)
}

fn register_read(
    words: &[u16],
    base: u16,
    addr: u16,
    cnt: u16,
) -> Result<Vec<u16>, ExceptionCode> {
    let start = block_offset(base, addr, cnt.into())?;
    Ok(words[start..start + usize::from(cnt)].to_vec())
}

/// Drive model shared between the server connections and the owner
pub type SharedDriveModel = Arc<Mutex<DriveModel>>;

/// Lock the model, ignoring poisoning from a panicked connection
pub fn lock_model(model: &SharedDriveModel) -> MutexGuard<'_, DriveModel> {
    model.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Modbus service of one client connection
pub struct SimulatedDrive {
    model: SharedDriveModel,
}

impl SimulatedDrive {
    pub fn new(model: SharedDriveModel) -> Self {
        Self { model }
    }
}

impl tokio_modbus::server::Service for SimulatedDrive {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        let mut model = lock_model(&self.model);
        let res = match req {
            Request::ReadInputRegisters(addr, cnt) => model
                .read_input_registers(addr, cnt)
                .map(Response::ReadInputRegisters),
            Request::ReadHoldingRegisters(addr, cnt) => model
                .read_holding_registers(addr, cnt)
                .map(Response::ReadHoldingRegisters),
            Request::WriteMultipleRegisters(addr, values) => model
                .write_registers(addr, &values)
                .map(|_| Response::WriteMultipleRegisters(addr, values.len() as u16)),
            Request::WriteSingleRegister(addr, value) => model
                .write_registers(addr, std::slice::from_ref(&value))
                .map(|_| Response::WriteSingleRegister(addr, value)),
            _ => {
                error!("SERVER: Exception::IllegalFunction - Unimplemented function code in request: {req:?}");
                Err(ExceptionCode::IllegalFunction)
            }
        };
        future::ready(res)
    }
}

/// Serve `model` to every client connecting on `listener`
pub async fn serve(listener: TcpListener, model: SharedDriveModel) -> io::Result<()> {
    if let Ok(local) = listener.local_addr() {
        info!("Simulated drive listening on {}", local);
    }
    let server = Server::new(listener);

    let on_connected = move |stream, socket_addr: SocketAddr| {
        let model = model.clone();
        async move {
            info!("Client connected from {}", socket_addr);
            accept_tcp_connection(stream, socket_addr, move |_| {
                Ok(Some(SimulatedDrive::new(model.clone())))
            })
        }
    };
    let on_process_error = |err| {
        error!("SERVER: {}", err);
    };

    server.serve(&on_connected, on_process_error).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_model() -> DriveModel {
        let mut model = DriveModel::default();
        let mut setpoint = Setpoint::initial();
        setpoint.set_stw1(stw1::ON | stw1::ENABLE_OPERATION, true);
        model.apply(setpoint);
        model
    }

    fn with_stw1(model: &DriveModel, bits: u16, value: bool) -> Setpoint {
        let mut setpoint = model.setpoint();
        setpoint.set_stw1(bits, value);
        setpoint
    }

    #[test]
    fn test_initial_setpoint_makes_drive_ready() {
        let mut model = DriveModel::default();
        assert!(!model.status().ready_for_motion());

        model.apply(Setpoint::initial());
        let status = model.status();
        assert!(status.ready_for_motion());
        assert!(!status.operation_enabled());
        assert!(status.drive_stopped());
    }

    #[test]
    fn test_jog_moves_one_step_per_write() {
        let mut model = enabled_model();
        let jog = with_stw1(&model, stw1::JOG_2, true);
        model.apply(jog);
        model.apply(jog);
        assert_eq!(model.position(), -2 * DEFAULT_JOG_STEP);
        assert!(!model.status().drive_stopped());

        let stop = with_stw1(&model, stw1::JOG_2, false);
        model.apply(stop);
        assert!(model.status().drive_stopped());
    }

    #[test]
    fn test_traversing_task_on_rising_edge_only() {
        let mut model = enabled_model();
        let mut task = with_stw1(&model, stw1::ACTIVATE_TRAVERSING_TASK, true);
        task.mdi_tarpos = 5_000;
        task.set_absolute(false);
        model.apply(task);
        model.apply(task);
        assert_eq!(model.position(), 5_000);

        task.set_absolute(true);
        task.mdi_tarpos = -300;
        model.apply(with_stw1(&model, stw1::ACTIVATE_TRAVERSING_TASK, false));
        model.apply(task);
        assert_eq!(model.position(), -300);
        assert!(model.status().target_position_reached());
    }

    #[test]
    fn test_fault_blocks_motion_until_acknowledged() {
        let mut model = enabled_model();
        model.inject_fault(0x1234);
        let status = model.status();
        assert!(status.fault_present());
        assert!(!status.ready_for_motion());
        assert!(!status.operation_enabled());
        assert_eq!(status.fault_code, 0x1234);

        model.apply(with_stw1(&model, stw1::JOG_1, true));
        assert_eq!(model.position(), 0);

        model.apply(with_stw1(&model, stw1::ACKNOWLEDGE_FAULT, true));
        let status = model.status();
        assert!(!status.fault_present());
        // ON is still set from before the fault
        assert!(status.has_zsw1(zsw1::SWITCHING_ON_INHIBITED));
        assert!(!status.ready_for_motion());

        model.apply(with_stw1(
            &model,
            stw1::ON | stw1::ENABLE_OPERATION | stw1::JOG_1,
            false,
        ));
        assert!(model.status().ready_for_motion());
    }

    #[test]
    fn test_power_stage_needs_on_edge_after_fault() {
        let mut model = enabled_model();
        model.inject_fault(7);
        model.clear_fault();
        model.apply(model.setpoint());
        assert!(!model.status().operation_enabled());

        model.apply(with_stw1(&model, stw1::ON | stw1::ENABLE_OPERATION, false));
        model.apply(with_stw1(&model, stw1::ON | stw1::ENABLE_OPERATION, true));
        assert!(model.status().operation_enabled());
    }

    #[test]
    fn test_registers_outside_the_telegram_are_rejected() {
        let mut model = DriveModel::new(100, 200);
        assert_eq!(
            model.read_input_registers(0, 12),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(
            model.read_input_registers(205, 8),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(model.read_input_registers(200, 12).map(|w| w.len()), Ok(12));
        assert_eq!(
            model.write_registers(111, &[1, 2]),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert!(model.write_registers(100, &[stw1::CONTROL_BY_PLC]).is_ok());
        assert_eq!(model.read_holding_registers(100, 1), Ok(vec![stw1::CONTROL_BY_PLC]));
    }
}
