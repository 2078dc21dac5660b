// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cmmt-pc-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! PROFIdrive telegram 111 process data
//!
//! The CMMT drive exchanges its positioning (MDI) process data as telegram 111:
//! twelve 16-bit setpoint words written by the controller and twelve 16-bit
//! status words reported by the drive. Over Modbus TCP these map one to one on
//! registers, 32-bit values being transferred high word first.
//!
//! ## Setpoint words
//!
//! | Word  | Name          |
//! |-------|---------------|
//! | 0     | STW1          |
//! | 1     | POS_STW1      |
//! | 2     | POS_STW2      |
//! | 3     | STW2          |
//! | 4     | OVERRIDE      |
//! | 5-6   | MDI_TARPOS    |
//! | 7-8   | MDI_VELOCITY  |
//! | 9     | MDI_ACC       |
//! | 10    | MDI_DEC       |
//! | 11    | reserved      |
//!
//! ## Status words
//!
//! | Word  | Name          |
//! |-------|---------------|
//! | 0     | ZSW1          |
//! | 1     | POS_ZSW1      |
//! | 2     | POS_ZSW2      |
//! | 3     | ZSW2          |
//! | 4     | MELDW         |
//! | 5-6   | XIST_A        |
//! | 7-8   | NIST_B        |
//! | 9     | FAULT_CODE    |
//! | 10    | WARN_CODE     |
//! | 11    | reserved      |

/// Number of 16-bit words in each direction of telegram 111
pub const TELEGRAM_111_WORDS: u16 = 12;

/// Control word 1 (STW1) bits
pub mod stw1 {
    pub const ON: u16 = 1 << 0;
    pub const NO_COAST_STOP: u16 = 1 << 1;
    pub const NO_QUICK_STOP: u16 = 1 << 2;
    pub const ENABLE_OPERATION: u16 = 1 << 3;
    pub const DO_NOT_REJECT_TRAVERSING_TASK: u16 = 1 << 4;
    pub const NO_INTERMEDIATE_STOP: u16 = 1 << 5;
    pub const ACTIVATE_TRAVERSING_TASK: u16 = 1 << 6;
    pub const ACKNOWLEDGE_FAULT: u16 = 1 << 7;
    pub const JOG_1: u16 = 1 << 8;
    pub const JOG_2: u16 = 1 << 9;
    pub const CONTROL_BY_PLC: u16 = 1 << 10;
    pub const START_HOMING: u16 = 1 << 11;
}

/// Positioning control word 1 (POS_STW1) bits
pub mod pos_stw1 {
    /// Set for absolute positioning, cleared for relative
    pub const ABSOLUTE: u16 = 1 << 8;
    /// Selects MDI (direct setpoint) operation instead of record tables
    pub const ACTIVATE_MDI: u16 = 1 << 15;
}

/// Status word 1 (ZSW1) bits
pub mod zsw1 {
    pub const READY_TO_SWITCH_ON: u16 = 1 << 0;
    pub const READY_TO_OPERATE: u16 = 1 << 1;
    pub const OPERATION_ENABLED: u16 = 1 << 2;
    pub const FAULT_PRESENT: u16 = 1 << 3;
    pub const NO_COAST_STOP: u16 = 1 << 4;
    pub const NO_QUICK_STOP: u16 = 1 << 5;
    pub const SWITCHING_ON_INHIBITED: u16 = 1 << 6;
    pub const WARNING_PRESENT: u16 = 1 << 7;
    pub const NO_FOLLOWING_ERROR: u16 = 1 << 8;
    pub const CONTROL_REQUESTED: u16 = 1 << 9;
    pub const TARGET_POSITION_REACHED: u16 = 1 << 10;
    pub const HOME_POSITION_SET: u16 = 1 << 11;
    pub const TRAVERSING_TASK_ACK: u16 = 1 << 12;
    pub const DRIVE_STOPPED: u16 = 1 << 13;
}

/// Override word value meaning 100 %
pub const OVERRIDE_FULL: u16 = 0x4000;

/// Setpoint half of telegram 111, written by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Setpoint {
    pub stw1: u16,
    pub pos_stw1: u16,
    pub pos_stw2: u16,
    pub stw2: u16,
    pub override_: u16,
    pub mdi_tarpos: i32,
    pub mdi_velocity: i32,
    pub mdi_acc: u16,
    pub mdi_dec: u16,
}

impl Setpoint {
    /// Setpoint sent right after the link is opened: control handed to the
    /// controller, stops released, power stage still off.
    pub fn initial() -> Self {
        Self {
            stw1: stw1::CONTROL_BY_PLC
                | stw1::NO_COAST_STOP
                | stw1::NO_QUICK_STOP
                | stw1::DO_NOT_REJECT_TRAVERSING_TASK
                | stw1::NO_INTERMEDIATE_STOP,
            pos_stw1: pos_stw1::ACTIVATE_MDI,
            override_: OVERRIDE_FULL,
            mdi_acc: OVERRIDE_FULL,
            mdi_dec: OVERRIDE_FULL,
            ..Default::default()
        }
    }

    pub fn set_stw1(&mut self, bits: u16, value: bool) {
        if value {
            self.stw1 |= bits;
        } else {
            self.stw1 &= !bits;
        }
    }

    pub fn has_stw1(&self, bits: u16) -> bool {
        self.stw1 & bits == bits
    }

    pub fn set_absolute(&mut self, absolute: bool) {
        if absolute {
            self.pos_stw1 |= pos_stw1::ABSOLUTE;
        } else {
            self.pos_stw1 &= !pos_stw1::ABSOLUTE;
        }
    }

    pub fn is_absolute(&self) -> bool {
        self.pos_stw1 & pos_stw1::ABSOLUTE != 0
    }

    /// Encode into register words
    pub fn to_words(&self) -> [u16; TELEGRAM_111_WORDS as usize] {
        let (tarpos_hi, tarpos_lo) = split_i32(self.mdi_tarpos);
        let (velocity_hi, velocity_lo) = split_i32(self.mdi_velocity);
        [
            self.stw1,
            self.pos_stw1,
            self.pos_stw2,
            self.stw2,
            self.override_,
            tarpos_hi,
            tarpos_lo,
            velocity_hi,
            velocity_lo,
            self.mdi_acc,
            self.mdi_dec,
            0,
        ]
    }

    /// Decode from register words, `None` when fewer than twelve are given
    pub fn from_words(words: &[u16]) -> Option<Self> {
        if words.len() < TELEGRAM_111_WORDS as usize {
            return None;
        }
        Some(Self {
            stw1: words[0],
            pos_stw1: words[1],
            pos_stw2: words[2],
            stw2: words[3],
            override_: words[4],
            mdi_tarpos: join_i32(words[5], words[6]),
            mdi_velocity: join_i32(words[7], words[8]),
            mdi_acc: words[9],
            mdi_dec: words[10],
        })
    }
}

/// Status half of telegram 111, reported by the drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Status {
    pub zsw1: u16,
    pub pos_zsw1: u16,
    pub pos_zsw2: u16,
    pub zsw2: u16,
    pub meldw: u16,
    pub xist_a: i32,
    pub nist_b: i32,
    pub fault_code: u16,
    pub warn_code: u16,
}

impl Status {
    pub fn has_zsw1(&self, bits: u16) -> bool {
        self.zsw1 & bits == bits
    }

    pub fn fault_present(&self) -> bool {
        self.has_zsw1(zsw1::FAULT_PRESENT)
    }

    pub fn operation_enabled(&self) -> bool {
        self.has_zsw1(zsw1::OPERATION_ENABLED)
    }

    pub fn home_position_set(&self) -> bool {
        self.has_zsw1(zsw1::HOME_POSITION_SET)
    }

    pub fn target_position_reached(&self) -> bool {
        self.has_zsw1(zsw1::TARGET_POSITION_REACHED)
    }

    pub fn drive_stopped(&self) -> bool {
        self.has_zsw1(zsw1::DRIVE_STOPPED)
    }

    /// The drive accepts motion commands: control is granted to us, no fault
    /// is latched and switching on is not inhibited.
    pub fn ready_for_motion(&self) -> bool {
        self.has_zsw1(zsw1::CONTROL_REQUESTED)
            && !self.fault_present()
            && !self.has_zsw1(zsw1::SWITCHING_ON_INHIBITED)
    }

    /// Encode into register words
    pub fn to_words(&self) -> [u16; TELEGRAM_111_WORDS as usize] {
        let (position_hi, position_lo) = split_i32(self.xist_a);
        let (velocity_hi, velocity_lo) = split_i32(self.nist_b);
        [
            self.zsw1,
            self.pos_zsw1,
            self.pos_zsw2,
            self.zsw2,
            self.meldw,
            position_hi,
            position_lo,
            velocity_hi,
            velocity_lo,
            self.fault_code,
            self.warn_code,
            0,
        ]
    }

    /// Decode from register words, `None` when fewer than twelve are given
    pub fn from_words(words: &[u16]) -> Option<Self> {
        if words.len() < TELEGRAM_111_WORDS as usize {
            return None;
        }
        Some(Self {
            zsw1: words[0],
            pos_zsw1: words[1],
            pos_zsw2: words[2],
            zsw2: words[3],
            meldw: words[4],
            xist_a: join_i32(words[5], words[6]),
            nist_b: join_i32(words[7], words[8]),
            fault_code: words[9],
            warn_code: words[10],
        })
    }
}

fn split_i32(value: i32) -> (u16, u16) {
    let raw = value as u32;
    ((raw >> 16) as u16, (raw & 0xFFFF) as u16)
}

fn join_i32(high: u16, low: u16) -> i32 {
    (((high as u32) << 16) | low as u32) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_target_uses_high_word_first() {
        let setpoint = Setpoint {
            mdi_tarpos: -200_000,
            ..Setpoint::initial()
        };
        let words = setpoint.to_words();
        // -200000 == 0xFFFC_F2C0
        assert_eq!(words[5], 0xFFFC);
        assert_eq!(words[6], 0xF2C0);
        assert_eq!(Setpoint::from_words(&words), Some(setpoint));
    }

    #[test]
    fn test_short_register_block_is_rejected() {
        assert!(Status::from_words(&[0; 11]).is_none());
        assert!(Setpoint::from_words(&[]).is_none());
    }

    #[test]
    fn test_initial_setpoint_keeps_power_stage_off() {
        let setpoint = Setpoint::initial();
        assert!(setpoint.has_stw1(stw1::CONTROL_BY_PLC));
        assert!(setpoint.has_stw1(stw1::NO_COAST_STOP | stw1::NO_QUICK_STOP));
        assert!(!setpoint.has_stw1(stw1::ON));
        assert!(!setpoint.has_stw1(stw1::ENABLE_OPERATION));
        assert!(!setpoint.is_absolute());
    }

    #[test]
    fn test_readiness_requires_control_and_no_fault() {
        let mut status = Status {
            zsw1: zsw1::CONTROL_REQUESTED | zsw1::READY_TO_SWITCH_ON,
            ..Default::default()
        };
        assert!(status.ready_for_motion());

        status.zsw1 |= zsw1::FAULT_PRESENT;
        assert!(!status.ready_for_motion());

        status.zsw1 = zsw1::READY_TO_SWITCH_ON;
        assert!(!status.ready_for_motion());

        status.zsw1 = zsw1::CONTROL_REQUESTED | zsw1::SWITCHING_ON_INHIBITED;
        assert!(!status.ready_for_motion());
    }
}
