//! Record decoders for vendor response frames
//!
//! Response frames are `FF LEN TAG BODY... CHK`. Single and fixed-loop
//! decoders receive the whole raw frame; terminated-series decoders receive
//! the bodies of every frame of the fetch joined together (terminator
//! removed); counted-series decoders receive the joined samples and the
//! anchor timestamp of the first frame.
//!
//! All vendor integers are big-endian. Wire timestamps are device local
//! seconds and are corrected with the [`ZoneSnapshot`] taken for the frame.

use crate::clock::ZoneSnapshot;
use crate::command::SettingId;
use crate::config::SeriesPeriods;
use crate::records::{
    CommandAck, DeviceStatus, HistoryRecord, Motion3d, Motion6d, Record, SampleTime, SportRecord,
    UserInfo,
};
use crate::sleep;
use crate::types::{BandError, RecordFamily, Result};

/// Preamble, length and tag
pub const HEADER_LEN: usize = 3;

/// Length of a wire timestamp
pub const WIRE_TS_LEN: usize = 4;

/// Marks the last frame of a terminated series
pub const TERMINATOR: [u8; 4] = [0xFF; 4];

/// 6-axis wire timestamp sent by firmware without sample stamping
pub const UNKNOWN_WIRE_TIMESTAMP: u32 = 0xFF;

pub const SPORT_WIDTH: usize = 10;
pub const HISTORY_U8_WIDTH: usize = 5;
pub const HISTORY_U16_WIDTH: usize = 6;
pub const MOTION3D_WIDTH: usize = 6;
pub const MOTION6D_WIDTH: usize = 12;
const USER_INFO_LEN: usize = 9;

/// Per-frame decode inputs that do not come from the frame itself
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext {
    pub zone: ZoneSnapshot,
    pub periods: SeriesPeriods,
}

impl DecodeContext {
    fn timestamp(&self, wire: &[u8]) -> i64 {
        self.zone.from_device_wire(be_u32(wire))
    }
}

/// Decoder for a whole frame, or for the joined bodies of a terminated series
pub type FrameDecoder = fn(&DecodeContext, &[u8]) -> Result<Record>;

/// Decoder for a counted series: anchor timestamp and joined samples
pub type SeriesDecoder = fn(&DecodeContext, i64, &[u8]) -> Result<Record>;

/// Body of a frame: header and trailing checksum removed
pub fn frame_body(raw: &[u8]) -> Result<&[u8]> {
    if raw.len() < HEADER_LEN + 1 {
        return Err(BandError::FrameTooShort(raw.len()));
    }
    Ok(&raw[HEADER_LEN..raw.len() - 1])
}

fn require(family: RecordFamily, data: &[u8], needed: usize) -> Result<()> {
    if data.len() < needed {
        return Err(BandError::PayloadTooShort {
            family,
            needed,
            got: data.len(),
        });
    }
    Ok(())
}

fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

fn be_u24(b: &[u8]) -> u32 {
    u32::from_be_bytes([0, b[0], b[1], b[2]])
}

fn be_u16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

fn be_i16(b: &[u8]) -> i16 {
    i16::from_be_bytes([b[0], b[1]])
}

/// Record decoders, one per family
pub struct RecordDecoders;

impl RecordDecoders {
    // ------------------------------------------------------------------
    // Single frames
    // ------------------------------------------------------------------

    pub fn user_info(_ctx: &DecodeContext, raw: &[u8]) -> Result<Record> {
        let body = frame_body(raw)?;
        require(RecordFamily::UserInfo, body, USER_INFO_LEN)?;

        let user_id = body[4..9]
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64);

        Ok(Record::UserInfo(UserInfo {
            age: body[0],
            sex: body[1],
            weight_kg: body[2],
            height_cm: body[3],
            user_id,
        }))
    }

    /// Anchor timestamp followed by one code per 5-minute epoch
    pub fn sleep(ctx: &DecodeContext, raw: &[u8]) -> Result<Record> {
        let body = frame_body(raw)?;
        require(RecordFamily::Sleep, body, WIRE_TS_LEN)?;

        let anchor = ctx.timestamp(&body[..WIRE_TS_LEN]);
        Ok(Record::Sleep(sleep::classify(anchor, &body[WIRE_TS_LEN..])))
    }

    /// Compact sport framing: every record in one frame, newest first
    pub fn sport_compact(ctx: &DecodeContext, raw: &[u8]) -> Result<Record> {
        let body = frame_body(raw)?;
        let mut records: Vec<SportRecord> = body
            .chunks_exact(SPORT_WIDTH)
            .map(|chunk| Self::sport_record(ctx, chunk))
            .collect();
        records.reverse();
        Ok(Record::Sport(records))
    }

    pub fn history_record(ctx: &DecodeContext, raw: &[u8]) -> Result<Record> {
        let body = frame_body(raw)?;
        require(RecordFamily::HistoryRecord, body, WIRE_TS_LEN + 2)?;

        Ok(Record::HistoryRecord(HistoryRecord {
            timestamp_ms: ctx.timestamp(&body[..WIRE_TS_LEN]),
            value: be_u16(&body[WIRE_TS_LEN..]) as u32,
        }))
    }

    pub fn heart_rate_status(_ctx: &DecodeContext, raw: &[u8]) -> Result<Record> {
        let body = Self::status_body(raw, 1)?;
        Ok(Record::DeviceStatus(DeviceStatus::HeartRateMonitoring(
            body[0] != 0,
        )))
    }

    pub fn setting(_ctx: &DecodeContext, raw: &[u8]) -> Result<Record> {
        let body = Self::status_body(raw, 2)?;
        let (sub_id, value) = (body[0], body[1]);

        let status = match SettingId::from_u8(sub_id) {
            Some(SettingId::HeartRateMax) => DeviceStatus::HeartRateMax(value),
            Some(SettingId::AccelFrequency) => DeviceStatus::AccelFrequency(value),
            Some(SettingId::AccelStreaming) => DeviceStatus::AccelStreaming(value != 0),
            None => DeviceStatus::Setting { sub_id, value },
        };
        Ok(Record::DeviceStatus(status))
    }

    pub fn blood_oxygen_mode(_ctx: &DecodeContext, raw: &[u8]) -> Result<Record> {
        let body = Self::status_body(raw, 1)?;
        Ok(Record::DeviceStatus(DeviceStatus::BloodOxygenMode(body[0])))
    }

    pub fn heart_rate_alarm(_ctx: &DecodeContext, raw: &[u8]) -> Result<Record> {
        let body = Self::status_body(raw, 3)?;
        Ok(Record::DeviceStatus(DeviceStatus::HeartRateAlarm {
            enabled: body[0] != 0,
            low: body[1],
            high: body[2],
        }))
    }

    pub fn six_axis_frequency(_ctx: &DecodeContext, raw: &[u8]) -> Result<Record> {
        let body = Self::status_body(raw, 1)?;
        Ok(Record::DeviceStatus(DeviceStatus::SixAxisFrequency(body[0])))
    }

    /// Acknowledgement; a frame without a status byte counts as success
    pub fn command_ack(_ctx: &DecodeContext, raw: &[u8]) -> Result<Record> {
        let body = frame_body(raw)?;
        Ok(Record::CommandAck(CommandAck {
            opcode: raw[2],
            status: body.first().copied().unwrap_or(0),
        }))
    }

    fn status_body(raw: &[u8], needed: usize) -> Result<&[u8]> {
        let body = frame_body(raw)?;
        require(RecordFamily::DeviceStatus, body, needed)?;
        Ok(body)
    }

    // ------------------------------------------------------------------
    // Terminated series (joined bodies)
    // ------------------------------------------------------------------

    pub fn sport_series(ctx: &DecodeContext, joined: &[u8]) -> Result<Record> {
        Ok(Record::Sport(
            joined
                .chunks_exact(SPORT_WIDTH)
                .map(|chunk| Self::sport_record(ctx, chunk))
                .collect(),
        ))
    }

    pub fn heart_rate_records(ctx: &DecodeContext, joined: &[u8]) -> Result<Record> {
        Self::history(ctx, RecordFamily::HeartRateRecords, joined, 1)
    }

    pub fn respiratory_records(ctx: &DecodeContext, joined: &[u8]) -> Result<Record> {
        Self::history(ctx, RecordFamily::RespiratoryRecords, joined, 1)
    }

    pub fn single_taps(ctx: &DecodeContext, joined: &[u8]) -> Result<Record> {
        Self::history(ctx, RecordFamily::SingleTap, joined, 1)
    }

    pub fn step_records(ctx: &DecodeContext, joined: &[u8]) -> Result<Record> {
        Self::history(ctx, RecordFamily::StepRecords, joined, 2)
    }

    pub fn interval_steps(ctx: &DecodeContext, joined: &[u8]) -> Result<Record> {
        Self::history(ctx, RecordFamily::IntervalSteps, joined, 2)
    }

    pub fn motion3d_history(_ctx: &DecodeContext, joined: &[u8]) -> Result<Record> {
        Ok(Record::Motion3dHistory(Self::motion3d_samples(joined)))
    }

    fn sport_record(ctx: &DecodeContext, chunk: &[u8]) -> SportRecord {
        SportRecord {
            timestamp_ms: ctx.timestamp(&chunk[..WIRE_TS_LEN]),
            steps: be_u24(&chunk[4..7]),
            calorie_tenths: be_u24(&chunk[7..10]),
        }
    }

    /// `{ts:4, value:value_width}` records
    fn history(
        ctx: &DecodeContext,
        family: RecordFamily,
        joined: &[u8],
        value_width: usize,
    ) -> Result<Record> {
        let records = joined
            .chunks_exact(WIRE_TS_LEN + value_width)
            .map(|chunk| {
                let value = &chunk[WIRE_TS_LEN..];
                HistoryRecord {
                    timestamp_ms: ctx.timestamp(&chunk[..WIRE_TS_LEN]),
                    value: if value_width == 1 {
                        value[0] as u32
                    } else {
                        be_u16(value) as u32
                    },
                }
            })
            .collect();

        Record::history(family, records)
            .ok_or_else(|| BandError::DecodingError(format!("{} is not a history family", family)))
    }

    // ------------------------------------------------------------------
    // Counted series
    // ------------------------------------------------------------------

    /// Anchor timestamp of a counted-series "begin" frame
    pub fn series_anchor(ctx: &DecodeContext, family: RecordFamily, raw: &[u8]) -> Result<i64> {
        let body = frame_body(raw)?;
        require(family, body, WIRE_TS_LEN)?;
        Ok(ctx.timestamp(&body[..WIRE_TS_LEN]))
    }

    /// Samples of a counted-series "begin" frame
    pub fn series_samples(family: RecordFamily, raw: &[u8]) -> Result<&[u8]> {
        let body = frame_body(raw)?;
        require(family, body, WIRE_TS_LEN)?;
        Ok(&body[WIRE_TS_LEN..])
    }

    pub fn heart_rate_series(ctx: &DecodeContext, anchor: i64, samples: &[u8]) -> Result<Record> {
        let period = ctx.periods.heart_rate_ms;
        Self::series(RecordFamily::HeartRateSeries, anchor, period, samples, 1)
    }

    pub fn respiratory_series(ctx: &DecodeContext, anchor: i64, samples: &[u8]) -> Result<Record> {
        let period = ctx.periods.respiratory_ms;
        Self::series(RecordFamily::RespiratorySeries, anchor, period, samples, 1)
    }

    pub fn step_series(ctx: &DecodeContext, anchor: i64, samples: &[u8]) -> Result<Record> {
        let period = ctx.periods.steps_ms;
        Self::series(RecordFamily::StepSeries, anchor, period, samples, 2)
    }

    /// Sample `i` is stamped `anchor + i * period`
    fn series(
        family: RecordFamily,
        anchor: i64,
        period_ms: i64,
        samples: &[u8],
        sample_width: usize,
    ) -> Result<Record> {
        let records = samples
            .chunks_exact(sample_width)
            .enumerate()
            .map(|(i, sample)| HistoryRecord {
                timestamp_ms: anchor + i as i64 * period_ms,
                value: if sample_width == 1 {
                    sample[0] as u32
                } else {
                    be_u16(sample) as u32
                },
            })
            .collect();

        Record::history(family, records)
            .ok_or_else(|| BandError::DecodingError(format!("{} is not a series family", family)))
    }

    // ------------------------------------------------------------------
    // Fixed loops (streaming)
    // ------------------------------------------------------------------

    pub fn motion3d_stream(_ctx: &DecodeContext, raw: &[u8]) -> Result<Record> {
        let body = frame_body(raw)?;
        Ok(Record::Motion3dStream(Self::motion3d_samples(body)))
    }

    /// Frame timestamp followed by 12-byte accel + gyro samples
    pub fn motion6d_stream(ctx: &DecodeContext, raw: &[u8]) -> Result<Record> {
        let body = frame_body(raw)?;
        require(RecordFamily::Motion6dStream, body, WIRE_TS_LEN)?;

        let wire = be_u32(&body[..WIRE_TS_LEN]);
        let time = if wire == UNKNOWN_WIRE_TIMESTAMP {
            SampleTime::Unknown
        } else {
            SampleTime::At(ctx.zone.from_device_wire(wire))
        };

        let samples = body[WIRE_TS_LEN..]
            .chunks_exact(MOTION6D_WIDTH)
            .enumerate()
            .map(|(index, s)| Motion6d {
                time,
                index,
                accel: [be_i16(&s[0..2]), be_i16(&s[2..4]), be_i16(&s[4..6])],
                gyro: [be_i16(&s[6..8]), be_i16(&s[8..10]), be_i16(&s[10..12])],
            })
            .collect();

        Ok(Record::Motion6dStream(samples))
    }

    fn motion3d_samples(data: &[u8]) -> Vec<Motion3d> {
        data.chunks_exact(MOTION3D_WIDTH)
            .map(|s| Motion3d {
                x: be_i16(&s[0..2]),
                y: be_i16(&s[2..4]),
                z: be_i16(&s[4..6]),
            })
            .collect()
    }
}
