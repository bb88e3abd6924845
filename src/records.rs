//! Typed records emitted by the band
//!
//! Every decoded response ends up as one [`Record`]; listeners subscribe by
//! [`RecordKind`].

use crate::command::Opcode;
use crate::types::RecordFamily;
use serde::{Deserialize, Serialize};

/// Common shape of all history decoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// UTC epoch milliseconds
    pub timestamp_ms: i64,
    pub value: u32,
}

/// One sport summary entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SportRecord {
    pub timestamp_ms: i64,
    pub steps: u32,
    /// Calories in tenths of a kcal as sent on the wire
    pub calorie_tenths: u32,
}

impl SportRecord {
    pub fn calories(&self) -> f64 {
        self.calorie_tenths as f64 / 10.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SleepStage {
    Awake,
    Light,
    Deep,
}

/// One 5-minute sleep epoch after classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepRecord {
    pub timestamp_ms: i64,
    pub stage: SleepStage,
    /// Raw epoch code (0..=255)
    pub code: u8,
}

/// User profile stored on the band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub age: u8,
    pub sex: u8,
    pub weight_kg: u8,
    pub height_cm: u8,
    /// 40-bit user id
    pub user_id: u64,
}

/// 3-axis accelerometer sample (raw counts)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Motion3d {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

/// Timestamp of a streamed sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleTime {
    /// The firmware does not stamp samples
    Unknown,
    At(i64),
}

/// 6-axis (accelerometer + gyroscope) sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Motion6d {
    pub time: SampleTime,
    /// Position of the sample within its frame
    pub index: usize,
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
}

/// Device setting or status value reported by a get command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    HeartRateMonitoring(bool),
    HeartRateMax(u8),
    AccelFrequency(u8),
    AccelStreaming(bool),
    BloodOxygenMode(u8),
    HeartRateAlarm { enabled: bool, low: u8, high: u8 },
    SixAxisFrequency(u8),
    Setting { sub_id: u8, value: u8 },
}

/// Acknowledgement of a set/control command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    pub opcode: u8,
    pub status: u8,
}

impl CommandAck {
    pub fn is_ok(&self) -> bool {
        self.status == 0
    }

    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_u8(self.opcode)
    }
}

/// Sensor contact reported by the standard heart-rate measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorContact {
    NotSupported,
    NotDetected,
    Detected,
}

/// Standard Heart Rate Measurement characteristic value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartRateMeasurement {
    pub bpm: u16,
    pub contact: SensorContact,
    pub energy_expended_kj: Option<u16>,
    pub rr_intervals_ms: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodySensorLocation {
    Other,
    Chest,
    Wrist,
    Finger,
    Hand,
    EarLobe,
    Foot,
    Reserved(u8),
}

impl BodySensorLocation {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => BodySensorLocation::Other,
            1 => BodySensorLocation::Chest,
            2 => BodySensorLocation::Wrist,
            3 => BodySensorLocation::Finger,
            4 => BodySensorLocation::Hand,
            5 => BodySensorLocation::EarLobe,
            6 => BodySensorLocation::Foot,
            other => BodySensorLocation::Reserved(other),
        }
    }
}

/// Unified record event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Record {
    UserInfo(UserInfo),
    Sleep(Vec<SleepRecord>),
    Sport(Vec<SportRecord>),
    HeartRateRecords(Vec<HistoryRecord>),
    HeartRateSeries(Vec<HistoryRecord>),
    RespiratoryRecords(Vec<HistoryRecord>),
    RespiratorySeries(Vec<HistoryRecord>),
    StepRecords(Vec<HistoryRecord>),
    StepSeries(Vec<HistoryRecord>),
    IntervalSteps(Vec<HistoryRecord>),
    SingleTaps(Vec<HistoryRecord>),
    HistoryRecord(HistoryRecord),
    Motion3dHistory(Vec<Motion3d>),
    Motion3dStream(Vec<Motion3d>),
    Motion6dStream(Vec<Motion6d>),
    DeviceStatus(DeviceStatus),
    CommandAck(CommandAck),
    HeartRateMeasurement(HeartRateMeasurement),
    BodySensorLocation(BodySensorLocation),
}

/// Subscription key, one per [`Record`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    UserInfo,
    Sleep,
    Sport,
    HeartRateRecords,
    HeartRateSeries,
    RespiratoryRecords,
    RespiratorySeries,
    StepRecords,
    StepSeries,
    IntervalSteps,
    SingleTaps,
    HistoryRecord,
    Motion3dHistory,
    Motion3dStream,
    Motion6dStream,
    DeviceStatus,
    CommandAck,
    HeartRateMeasurement,
    BodySensorLocation,
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::UserInfo(_) => RecordKind::UserInfo,
            Record::Sleep(_) => RecordKind::Sleep,
            Record::Sport(_) => RecordKind::Sport,
            Record::HeartRateRecords(_) => RecordKind::HeartRateRecords,
            Record::HeartRateSeries(_) => RecordKind::HeartRateSeries,
            Record::RespiratoryRecords(_) => RecordKind::RespiratoryRecords,
            Record::RespiratorySeries(_) => RecordKind::RespiratorySeries,
            Record::StepRecords(_) => RecordKind::StepRecords,
            Record::StepSeries(_) => RecordKind::StepSeries,
            Record::IntervalSteps(_) => RecordKind::IntervalSteps,
            Record::SingleTaps(_) => RecordKind::SingleTaps,
            Record::HistoryRecord(_) => RecordKind::HistoryRecord,
            Record::Motion3dHistory(_) => RecordKind::Motion3dHistory,
            Record::Motion3dStream(_) => RecordKind::Motion3dStream,
            Record::Motion6dStream(_) => RecordKind::Motion6dStream,
            Record::DeviceStatus(_) => RecordKind::DeviceStatus,
            Record::CommandAck(_) => RecordKind::CommandAck,
            Record::HeartRateMeasurement(_) => RecordKind::HeartRateMeasurement,
            Record::BodySensorLocation(_) => RecordKind::BodySensorLocation,
        }
    }

    /// Number of samples carried, 1 for single-value records
    pub fn len(&self) -> usize {
        match self {
            Record::Sleep(v) => v.len(),
            Record::Sport(v) => v.len(),
            Record::HeartRateRecords(v)
            | Record::HeartRateSeries(v)
            | Record::RespiratoryRecords(v)
            | Record::RespiratorySeries(v)
            | Record::StepRecords(v)
            | Record::StepSeries(v)
            | Record::IntervalSteps(v)
            | Record::SingleTaps(v) => v.len(),
            Record::Motion3dHistory(v) | Record::Motion3dStream(v) => v.len(),
            Record::Motion6dStream(v) => v.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the list record for a history family
    pub(crate) fn history(family: RecordFamily, records: Vec<HistoryRecord>) -> Option<Record> {
        match family {
            RecordFamily::HeartRateRecords => Some(Record::HeartRateRecords(records)),
            RecordFamily::HeartRateSeries => Some(Record::HeartRateSeries(records)),
            RecordFamily::RespiratoryRecords => Some(Record::RespiratoryRecords(records)),
            RecordFamily::RespiratorySeries => Some(Record::RespiratorySeries(records)),
            RecordFamily::StepRecords => Some(Record::StepRecords(records)),
            RecordFamily::StepSeries => Some(Record::StepSeries(records)),
            RecordFamily::IntervalSteps => Some(Record::IntervalSteps(records)),
            RecordFamily::SingleTap => Some(Record::SingleTaps(records)),
            _ => None,
        }
    }
}
