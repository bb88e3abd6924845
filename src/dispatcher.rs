//! Inbound frame dispatch
//!
//! Every vendor notification goes through [`FrameDispatcher::on_frame_received`].
//! The response tag at offset 2 selects a [`Descriptor`] from the table
//! built in [`descriptor_table`]; the descriptor's [`Shape`] decides whether
//! the frame is decoded on its own or collected into a per-family
//! [`ReassemblyBuffer`] session first.
//!
//! Decode failures never propagate out of the dispatcher. The frame is
//! logged and dropped and any session in progress is left as it was.
//!
//! The trailing checksum of inbound frames is not verified; a corrupted
//! frame of the right length is decoded like any other.

use crate::clock::UtcClock;
use crate::command::Opcode;
use crate::config::{EngineConfig, SeriesPeriods, SportFraming};
use crate::decoders::{
    frame_body, DecodeContext, FrameDecoder, RecordDecoders, SeriesDecoder, HEADER_LEN,
    HISTORY_U16_WIDTH, HISTORY_U8_WIDTH, MOTION3D_WIDTH, SPORT_WIDTH, TERMINATOR,
};
use crate::reassembly::ReassemblyBuffer;
use crate::records::Record;
use crate::types::{hex_dump, BandError, RecordFamily, Result};
use chrono::{Local, TimeZone};
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Response tags that are not echoes of an opcode
pub mod tags {
    /// 6-axis streaming samples
    pub const MOTION6D_STREAM: u8 = 0x63;
    /// 3-axis streaming samples
    pub const MOTION3D_STREAM: u8 = 0x78;
}

/// Set on the tag of the frame that closes a counted series
pub const SERIES_END_FLAG: u8 = 0x80;

/// Tag of the end frame paired with a counted-series begin tag
pub const fn series_end_tag(begin: u8) -> u8 {
    begin ^ SERIES_END_FLAG
}

/// How frames with a given tag are turned into records
#[derive(Clone, Copy)]
pub enum Shape {
    /// One frame, one record
    Single(FrameDecoder),
    /// Frames buffered until one holds the `FFFFFFFF` terminator
    TerminatedSeries {
        width: usize,
        sentinel: Sentinel,
        decode: FrameDecoder,
    },
    /// Frame of a counted series; the first one carries the anchor timestamp
    CountedBegin,
    /// Closes a counted series
    CountedEnd(SeriesDecoder),
    /// Streaming frame decoded on its own as a loop of samples
    FixedLoop(FrameDecoder),
}

/// Where a terminated series may carry its `FFFFFFFF` terminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    /// In the timestamp slot of any record; no real record has an all-ones
    /// timestamp
    TimestampSlot,
    /// Only as the last four bytes of a frame body, after whole samples.
    /// Used by families without a timestamp, whose samples may contain
    /// `FFFFFFFF`
    Trailing,
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Single(_) => write!(f, "Single"),
            Shape::TerminatedSeries {
                width, sentinel, ..
            } => write!(f, "TerminatedSeries({}, {:?})", width, sentinel),
            Shape::CountedBegin => write!(f, "CountedBegin"),
            Shape::CountedEnd(_) => write!(f, "CountedEnd"),
            Shape::FixedLoop(_) => write!(f, "FixedLoop"),
        }
    }
}

/// Descriptor table entry
#[derive(Debug, Clone, Copy)]
pub struct Descriptor {
    pub tag: u8,
    pub family: RecordFamily,
    pub shape: Shape,
}

impl Descriptor {
    fn new(tag: u8, family: RecordFamily, shape: Shape) -> Self {
        Self { tag, family, shape }
    }
}

fn sport_descriptor(framing: SportFraming) -> Descriptor {
    let shape = match framing {
        SportFraming::Terminated => Shape::TerminatedSeries {
            width: SPORT_WIDTH,
            sentinel: Sentinel::TimestampSlot,
            decode: RecordDecoders::sport_series,
        },
        SportFraming::Compact => Shape::Single(RecordDecoders::sport_compact),
    };
    Descriptor::new(Opcode::FetchSportHistory.to_u8(), RecordFamily::Sport, shape)
}

/// Build the tag → descriptor table
pub fn descriptor_table(framing: SportFraming) -> HashMap<u8, Descriptor> {
    use RecordFamily as F;

    let terminated = |width: usize, decode: FrameDecoder| Shape::TerminatedSeries {
        width,
        sentinel: Sentinel::TimestampSlot,
        decode,
    };
    let hr_series = Opcode::FetchHeartRateSeries.to_u8();
    let resp_series = Opcode::FetchRespiratorySeries.to_u8();
    let step_series = Opcode::FetchStepSeries.to_u8();

    let mut entries = vec![
        sport_descriptor(framing),
        Descriptor::new(
            Opcode::GetUserProfile.to_u8(),
            F::UserInfo,
            Shape::Single(RecordDecoders::user_info),
        ),
        Descriptor::new(
            Opcode::FetchSleep.to_u8(),
            F::Sleep,
            Shape::Single(RecordDecoders::sleep),
        ),
        Descriptor::new(
            Opcode::FetchHeartRateRecords.to_u8(),
            F::HeartRateRecords,
            terminated(HISTORY_U8_WIDTH, RecordDecoders::heart_rate_records),
        ),
        Descriptor::new(
            Opcode::FetchRespiratoryRecords.to_u8(),
            F::RespiratoryRecords,
            terminated(HISTORY_U8_WIDTH, RecordDecoders::respiratory_records),
        ),
        Descriptor::new(
            Opcode::FetchStepRecords.to_u8(),
            F::StepRecords,
            terminated(HISTORY_U16_WIDTH, RecordDecoders::step_records),
        ),
        Descriptor::new(
            Opcode::FetchIntervalSteps.to_u8(),
            F::IntervalSteps,
            terminated(HISTORY_U16_WIDTH, RecordDecoders::interval_steps),
        ),
        Descriptor::new(
            Opcode::FetchSingleTapRecords.to_u8(),
            F::SingleTap,
            terminated(HISTORY_U8_WIDTH, RecordDecoders::single_taps),
        ),
        Descriptor::new(
            Opcode::FetchAccelHistory.to_u8(),
            F::Motion3dHistory,
            Shape::TerminatedSeries {
                width: MOTION3D_WIDTH,
                sentinel: Sentinel::Trailing,
                decode: RecordDecoders::motion3d_history,
            },
        ),
        Descriptor::new(hr_series, F::HeartRateSeries, Shape::CountedBegin),
        Descriptor::new(
            series_end_tag(hr_series),
            F::HeartRateSeries,
            Shape::CountedEnd(RecordDecoders::heart_rate_series),
        ),
        Descriptor::new(resp_series, F::RespiratorySeries, Shape::CountedBegin),
        Descriptor::new(
            series_end_tag(resp_series),
            F::RespiratorySeries,
            Shape::CountedEnd(RecordDecoders::respiratory_series),
        ),
        Descriptor::new(step_series, F::StepSeries, Shape::CountedBegin),
        Descriptor::new(
            series_end_tag(step_series),
            F::StepSeries,
            Shape::CountedEnd(RecordDecoders::step_series),
        ),
        Descriptor::new(
            tags::MOTION3D_STREAM,
            F::Motion3dStream,
            Shape::FixedLoop(RecordDecoders::motion3d_stream),
        ),
        Descriptor::new(
            tags::MOTION6D_STREAM,
            F::Motion6dStream,
            Shape::FixedLoop(RecordDecoders::motion6d_stream),
        ),
        Descriptor::new(
            Opcode::FetchHistoryRecord.to_u8(),
            F::HistoryRecord,
            Shape::Single(RecordDecoders::history_record),
        ),
        Descriptor::new(
            Opcode::HeartRateStatus.to_u8(),
            F::DeviceStatus,
            Shape::Single(RecordDecoders::heart_rate_status),
        ),
        Descriptor::new(
            Opcode::GetSetting.to_u8(),
            F::DeviceStatus,
            Shape::Single(RecordDecoders::setting),
        ),
        Descriptor::new(
            Opcode::BloodOxygenMode.to_u8(),
            F::DeviceStatus,
            Shape::Single(RecordDecoders::blood_oxygen_mode),
        ),
        Descriptor::new(
            Opcode::GetHeartRateAlarm.to_u8(),
            F::DeviceStatus,
            Shape::Single(RecordDecoders::heart_rate_alarm),
        ),
        Descriptor::new(
            Opcode::GetSixAxisFrequency.to_u8(),
            F::DeviceStatus,
            Shape::Single(RecordDecoders::six_axis_frequency),
        ),
    ];

    let acked = [
        Opcode::SetUtcTime,
        Opcode::Shutdown,
        Opcode::RestoreDefaults,
        Opcode::DisableRadio,
        Opcode::SetUserProfile,
        Opcode::SetSetting,
        Opcode::SetHeartRateAlarm,
        Opcode::SetSixAxisFrequency,
        Opcode::EnterFirmwareUpdate,
    ];
    entries.extend(acked.iter().map(|op| {
        Descriptor::new(
            op.to_u8(),
            F::CommandAck,
            Shape::Single(RecordDecoders::command_ack),
        )
    }));

    entries.into_iter().map(|d| (d.tag, d)).collect()
}

/// Offset of the terminator in `body`, if this frame closes the series
fn find_terminator(body: &[u8], width: usize, sentinel: Sentinel) -> Option<usize> {
    match sentinel {
        Sentinel::TimestampSlot => (0..)
            .map(|i| i * width)
            .take_while(|&offset| offset + TERMINATOR.len() <= body.len())
            .find(|&offset| body[offset..offset + TERMINATOR.len()] == TERMINATOR),
        Sentinel::Trailing => {
            let end = body.len().checked_sub(TERMINATOR.len())?;
            (end % width == 0 && body[end..] == TERMINATOR).then_some(end)
        }
    }
}

/// Dispatcher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub frames_received: u64,
    pub length_mismatches: u64,
    pub decode_failures: u64,
    pub unknown_tags: u64,
    pub records_emitted: u64,
}

/// Routes inbound frames to decoders and reassembly sessions
pub struct FrameDispatcher<Tz: TimeZone = Local> {
    clock: UtcClock<Tz>,
    periods: SeriesPeriods,
    sport_framing: SportFraming,
    table: HashMap<u8, Descriptor>,
    sessions: ReassemblyBuffer,
    stats: DispatchStats,
    log_frame_bytes: usize,
}

impl<Tz: TimeZone> FrameDispatcher<Tz> {
    pub fn new(clock: UtcClock<Tz>, config: &EngineConfig, sport_framing: SportFraming) -> Self {
        Self {
            clock,
            periods: config.series_periods,
            sport_framing,
            table: descriptor_table(sport_framing),
            sessions: ReassemblyBuffer::new(),
            stats: DispatchStats::default(),
            log_frame_bytes: config.log_frame_bytes,
        }
    }

    pub fn clock(&self) -> &UtcClock<Tz> {
        &self.clock
    }

    pub fn sport_framing(&self) -> SportFraming {
        self.sport_framing
    }

    /// Switch sport framing; drops any partially collected sport fetch
    pub fn set_sport_framing(&mut self, framing: SportFraming) {
        if framing == self.sport_framing {
            return;
        }
        self.sport_framing = framing;
        let descriptor = sport_descriptor(framing);
        self.table.insert(descriptor.tag, descriptor);
        self.sessions.reset(RecordFamily::Sport);
    }

    pub fn descriptor(&self, tag: u8) -> Option<&Descriptor> {
        self.table.get(&tag)
    }

    pub fn sessions(&self) -> &ReassemblyBuffer {
        &self.sessions
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Drop a family's session before a new fetch of that family
    pub fn reset_family(&mut self, family: RecordFamily) -> bool {
        let existed = self.sessions.reset(family);
        if existed {
            debug!("Discarded partial {} session", family);
        }
        existed
    }

    pub fn reset_all(&mut self) {
        self.sessions.reset_all();
    }

    /// Handle one inbound vendor frame
    ///
    /// Returns the record completed by this frame, if any.
    pub fn on_frame_received(&mut self, raw: &[u8]) -> Option<Record> {
        self.stats.frames_received += 1;

        if raw.len() < HEADER_LEN {
            warn!("Invalid frame: {}", hex_dump(raw, self.log_frame_bytes));
            self.stats.decode_failures += 1;
            return None;
        }

        let tag = raw[2];
        if raw[1] as usize != raw.len() {
            warn!(
                "Invalid frame length for tag 0x{:02X}: declared {}, received {}",
                tag,
                raw[1],
                raw.len()
            );
            self.stats.length_mismatches += 1;
        }

        let Some(descriptor) = self.table.get(&tag).copied() else {
            debug!(
                "Unhandled response tag 0x{:02X}: {}",
                tag,
                hex_dump(raw, self.log_frame_bytes)
            );
            self.stats.unknown_tags += 1;
            return None;
        };

        let ctx = DecodeContext {
            zone: self.clock.snapshot(),
            periods: self.periods,
        };

        match self.dispatch(&descriptor, raw, &ctx) {
            Ok(Some(record)) => {
                debug!(
                    "{} complete: {} item(s) from tag 0x{:02X}",
                    descriptor.family,
                    record.len(),
                    tag
                );
                self.stats.records_emitted += 1;
                Some(record)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(
                    "Dropping {} frame (tag 0x{:02X}): {} [{}]",
                    descriptor.family,
                    tag,
                    e,
                    hex_dump(raw, self.log_frame_bytes)
                );
                self.stats.decode_failures += 1;
                None
            }
        }
    }

    fn dispatch(
        &mut self,
        descriptor: &Descriptor,
        raw: &[u8],
        ctx: &DecodeContext,
    ) -> Result<Option<Record>> {
        let family = descriptor.family;
        match descriptor.shape {
            Shape::Single(decode) | Shape::FixedLoop(decode) => decode(ctx, raw).map(Some),
            Shape::TerminatedSeries {
                width,
                sentinel,
                decode,
            } => self.terminated(family, width, sentinel, decode, raw, ctx),
            Shape::CountedBegin => {
                self.counted_begin(family, raw, ctx)?;
                Ok(None)
            }
            Shape::CountedEnd(decode) => self.counted_end(family, decode, ctx).map(Some),
        }
    }

    fn terminated(
        &mut self,
        family: RecordFamily,
        width: usize,
        sentinel: Sentinel,
        decode: FrameDecoder,
        raw: &[u8],
        ctx: &DecodeContext,
    ) -> Result<Option<Record>> {
        let body = frame_body(raw)?;

        let Some(end) = find_terminator(body, width, sentinel) else {
            self.sessions.push(family, raw);
            debug!(
                "{}: buffered frame {} ({} bytes)",
                family,
                self.sessions.pending_frames(family),
                body.len()
            );
            return Ok(None);
        };

        let mut joined = Vec::new();
        if let Some(session) = self.sessions.get(family) {
            for frame in session.frames() {
                joined.extend_from_slice(frame_body(frame)?);
            }
        }
        joined.extend_from_slice(&body[..end]);

        let record = decode(ctx, &joined)?;
        self.sessions.reset(family);
        Ok(Some(record))
    }

    fn counted_begin(
        &mut self,
        family: RecordFamily,
        raw: &[u8],
        ctx: &DecodeContext,
    ) -> Result<()> {
        let samples = RecordDecoders::series_samples(family, raw)?;
        if !self.sessions.has_anchor(family) {
            let anchor = RecordDecoders::series_anchor(ctx, family, raw)?;
            self.sessions.seed_anchor(family, anchor);
            debug!("{}: anchor {} ms", family, anchor);
        }
        debug!("{}: buffered {} sample bytes", family, samples.len());
        self.sessions.push(family, raw);
        Ok(())
    }

    fn counted_end(
        &mut self,
        family: RecordFamily,
        decode: SeriesDecoder,
        ctx: &DecodeContext,
    ) -> Result<Record> {
        let Some(session) = self.sessions.get(family) else {
            debug!("{}: end frame without buffered samples", family);
            return decode(ctx, 0, &[]);
        };

        let anchor = session.anchor_ms().ok_or_else(|| {
            BandError::DecodingError(format!("{} session has no anchor", family))
        })?;

        let mut samples = Vec::new();
        for frame in session.frames() {
            samples.extend_from_slice(RecordDecoders::series_samples(family, frame)?);
        }

        let record = decode(ctx, anchor, &samples)?;
        self.sessions.reset(family);
        Ok(record)
    }
}
