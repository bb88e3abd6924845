//! Outbound command frames
//!
//! Every command is `FF LEN OPCODE ARGS... CHK` where `LEN = len(ARGS) + 4`
//! (the full frame length) and `CHK` is [`checksum::compute`] over all
//! preceding bytes. Arguments are single bytes; wider fields are split by the
//! builders below before encoding. Argument ranges are not checked.

use crate::checksum;
use crate::clock::UtcClock;
use crate::records::UserInfo;
use chrono::TimeZone;
use std::fmt;

/// First byte of every frame
pub const PREAMBLE: u8 = 0xFF;

/// Header bytes plus trailing checksum
const FRAME_OVERHEAD: usize = 4;

/// Argument of the fetch-sleep command
const SLEEP_FETCH_ARG: i32 = 2;

/// Command opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    GetUserProfile = 0x03,
    SetUserProfile = 0x04,
    FetchSleep = 0x05,
    SetUtcTime = 0x08,
    FetchSportHistory = 0x16,
    FetchHeartRateRecords = 0x21,
    FetchHeartRateSeries = 0x22,
    FetchRespiratoryRecords = 0x24,
    FetchRespiratorySeries = 0x25,
    EnterFirmwareUpdate = 0x27,
    BloodOxygenMode = 0x37,
    DisableRadio = 0x3F,
    FetchIntervalSteps = 0x40,
    FetchSingleTapRecords = 0x42,
    HeartRateStatus = 0x46,
    FetchHistoryRecord = 0x49,
    SetHeartRateAlarm = 0x57,
    GetHeartRateAlarm = 0x5B,
    GetSixAxisFrequency = 0x61,
    SetSixAxisFrequency = 0x62,
    GetSetting = 0x74,
    SetSetting = 0x75,
    FetchAccelHistory = 0x77,
    FetchStepRecords = 0x90,
    FetchStepSeries = 0x91,
    Shutdown = 0xF1,
    RestoreDefaults = 0xF3,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x03 => Some(Opcode::GetUserProfile),
            0x04 => Some(Opcode::SetUserProfile),
            0x05 => Some(Opcode::FetchSleep),
            0x08 => Some(Opcode::SetUtcTime),
            0x16 => Some(Opcode::FetchSportHistory),
            0x21 => Some(Opcode::FetchHeartRateRecords),
            0x22 => Some(Opcode::FetchHeartRateSeries),
            0x24 => Some(Opcode::FetchRespiratoryRecords),
            0x25 => Some(Opcode::FetchRespiratorySeries),
            0x27 => Some(Opcode::EnterFirmwareUpdate),
            0x37 => Some(Opcode::BloodOxygenMode),
            0x3F => Some(Opcode::DisableRadio),
            0x40 => Some(Opcode::FetchIntervalSteps),
            0x42 => Some(Opcode::FetchSingleTapRecords),
            0x46 => Some(Opcode::HeartRateStatus),
            0x49 => Some(Opcode::FetchHistoryRecord),
            0x57 => Some(Opcode::SetHeartRateAlarm),
            0x5B => Some(Opcode::GetHeartRateAlarm),
            0x61 => Some(Opcode::GetSixAxisFrequency),
            0x62 => Some(Opcode::SetSixAxisFrequency),
            0x74 => Some(Opcode::GetSetting),
            0x75 => Some(Opcode::SetSetting),
            0x77 => Some(Opcode::FetchAccelHistory),
            0x90 => Some(Opcode::FetchStepRecords),
            0x91 => Some(Opcode::FetchStepSeries),
            0xF1 => Some(Opcode::Shutdown),
            0xF3 => Some(Opcode::RestoreDefaults),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (0x{:02X})", self, self.to_u8())
    }
}

/// Sub-ids of the generic get/set setting commands (0x74 / 0x75)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SettingId {
    HeartRateMax = 6,
    AccelFrequency = 11,
    AccelStreaming = 12,
}

impl SettingId {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            6 => Some(SettingId::HeartRateMax),
            11 => Some(SettingId::AccelFrequency),
            12 => Some(SettingId::AccelStreaming),
            _ => None,
        }
    }
}

/// Builds command frames
pub struct CommandEncoder;

impl CommandEncoder {
    /// Encode `opcode` with optional single-byte arguments
    ///
    /// Each argument is masked to its low 8 bits.
    pub fn encode(opcode: u8, args: Option<&[i32]>) -> Vec<u8> {
        let args = args.unwrap_or(&[]);
        let mut frame = Vec::with_capacity(args.len() + FRAME_OVERHEAD);

        frame.push(PREAMBLE);
        frame.push((args.len() + FRAME_OVERHEAD) as u8);
        frame.push(opcode);
        frame.extend(args.iter().map(|&a| (a & 0xFF) as u8));

        let chk = checksum::compute(&frame);
        frame.push(chk);
        frame
    }

    /// Encode a command that takes no arguments
    pub fn simple(opcode: Opcode) -> Vec<u8> {
        Self::encode(opcode.to_u8(), None)
    }

    /// Encode a command with arguments
    pub fn with_args(opcode: Opcode, args: &[i32]) -> Vec<u8> {
        Self::encode(opcode.to_u8(), Some(args))
    }

    /// Set the band clock to `utc_millis`, shifted to device wall-clock time
    pub fn set_utc_time<Tz: TimeZone>(clock: &UtcClock<Tz>, utc_millis: i64) -> Vec<u8> {
        let args: Vec<i32> = clock
            .to_device_wire(utc_millis)
            .iter()
            .map(|&b| b as i32)
            .collect();
        Self::with_args(Opcode::SetUtcTime, &args)
    }

    pub fn fetch_sleep() -> Vec<u8> {
        Self::with_args(Opcode::FetchSleep, &[SLEEP_FETCH_ARG])
    }

    pub fn set_user_profile(profile: &UserInfo) -> Vec<u8> {
        let mut args = vec![
            profile.age as i32,
            profile.sex as i32,
            profile.weight_kg as i32,
            profile.height_cm as i32,
        ];
        args.extend(user_id_bytes(profile.user_id).iter().map(|&b| b as i32));
        Self::with_args(Opcode::SetUserProfile, &args)
    }

    pub fn set_heart_rate_status(enabled: bool) -> Vec<u8> {
        Self::with_args(Opcode::HeartRateStatus, &[enabled as i32])
    }

    pub fn get_setting(setting: SettingId) -> Vec<u8> {
        Self::with_args(Opcode::GetSetting, &[setting as i32])
    }

    pub fn set_setting(setting: SettingId, value: u8) -> Vec<u8> {
        Self::with_args(Opcode::SetSetting, &[setting as i32, value as i32])
    }

    pub fn set_blood_oxygen_mode(mode: u8) -> Vec<u8> {
        Self::with_args(Opcode::BloodOxygenMode, &[mode as i32])
    }

    pub fn set_heart_rate_alarm(enabled: bool, low: u8, high: u8) -> Vec<u8> {
        Self::with_args(
            Opcode::SetHeartRateAlarm,
            &[enabled as i32, low as i32, high as i32],
        )
    }

    pub fn fetch_history_record(index: u8) -> Vec<u8> {
        Self::with_args(Opcode::FetchHistoryRecord, &[index as i32])
    }

    pub fn set_six_axis_frequency(hz: u8) -> Vec<u8> {
        Self::with_args(Opcode::SetSixAxisFrequency, &[hz as i32])
    }
}

/// Low 5 bytes of a user id, big-endian
pub fn user_id_bytes(user_id: u64) -> [u8; 5] {
    let full = user_id.to_be_bytes();
    [full[3], full[4], full[5], full[6], full[7]]
}
