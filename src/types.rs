//! Common types, enums, and error definitions for the band protocol

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for band protocol operations
pub type Result<T> = std::result::Result<T, BandError>;

/// Error types for band communication
#[derive(Error, Debug)]
pub enum BandError {
    #[error("Frame too short: {0} bytes")]
    FrameTooShort(usize),

    #[error("{family} payload too short: need {needed} bytes, got {got}")]
    PayloadTooShort {
        family: RecordFamily,
        needed: usize,
        got: usize,
    },

    #[error("Decoding error: {0}")]
    DecodingError(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No session for device {0}")]
    UnknownDevice(String),

    #[error("Invalid hex input: {0}")]
    InvalidHex(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Record families that share one reassembly and decoding strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordFamily {
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
    SingleTap,
    HistoryRecord,
    Motion3dHistory,
    Motion3dStream,
    Motion6dStream,
    DeviceStatus,
    CommandAck,
}

impl fmt::Display for RecordFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordFamily::UserInfo => write!(f, "UserInfo"),
            RecordFamily::Sleep => write!(f, "Sleep"),
            RecordFamily::Sport => write!(f, "Sport"),
            RecordFamily::HeartRateRecords => write!(f, "HeartRateRecords"),
            RecordFamily::HeartRateSeries => write!(f, "HeartRateSeries"),
            RecordFamily::RespiratoryRecords => write!(f, "RespiratoryRecords"),
            RecordFamily::RespiratorySeries => write!(f, "RespiratorySeries"),
            RecordFamily::StepRecords => write!(f, "StepRecords"),
            RecordFamily::StepSeries => write!(f, "StepSeries"),
            RecordFamily::IntervalSteps => write!(f, "IntervalSteps"),
            RecordFamily::SingleTap => write!(f, "SingleTap"),
            RecordFamily::HistoryRecord => write!(f, "HistoryRecord"),
            RecordFamily::Motion3dHistory => write!(f, "Motion3dHistory"),
            RecordFamily::Motion3dStream => write!(f, "Motion3dStream"),
            RecordFamily::Motion6dStream => write!(f, "Motion6dStream"),
            RecordFamily::DeviceStatus => write!(f, "DeviceStatus"),
            RecordFamily::CommandAck => write!(f, "CommandAck"),
        }
    }
}

/// Which characteristic a notification arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    /// Vendor notify characteristic carrying tagged response frames
    Vendor,
    /// Standard Heart Rate Measurement (0x2A37)
    HeartRateMeasurement,
    /// Standard Body Sensor Location (0x2A38)
    BodySensorLocation,
}

impl Characteristic {
    /// Map a 16-bit assigned number to a characteristic
    pub fn from_uuid16(uuid: u16) -> Option<Self> {
        match uuid {
            0x2A37 => Some(Characteristic::HeartRateMeasurement),
            0x2A38 => Some(Characteristic::BodySensorLocation),
            _ => None,
        }
    }
}

/// Format bytes as hex for log output
pub fn hex_dump(data: &[u8], max_len: usize) -> String {
    let len = data.len().min(max_len);
    let hex: String = data[..len]
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ");
    if data.len() > max_len {
        format!("{} ... ({} bytes total)", hex, data.len())
    } else {
        format!("{} ({} bytes)", hex, data.len())
    }
}

/// Parse a hex string such as `FF 05 46 01 8C` or `ff05`
///
/// Whitespace, `:` and `,` separators and a leading `0x` are ignored.
pub fn parse_hex_frame(line: &str) -> Result<Vec<u8>> {
    let digits: String = line
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != ',')
        .collect();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(&digits);

    hex::decode(digits).map_err(|e| BandError::InvalidHex(format!("'{}': {}", line.trim(), e)))
}
