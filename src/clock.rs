//! Device wall-clock conversion
//!
//! The band keeps local wall-clock time, not UTC. Outbound timestamps are
//! shifted forward by the host's current zone offset (standard + DST) and
//! inbound timestamps are shifted back by the offset in force when they are
//! decoded. Both offsets are sampled at call time, so a round trip across a
//! DST transition or a zone change is off by the difference. That is a
//! property of the device protocol and is left as-is.

use chrono::{Local, Offset, TimeZone, Utc};
use log::warn;

/// Zone offset sampled at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneSnapshot {
    offset_seconds: i64,
}

impl ZoneSnapshot {
    pub fn from_offset_seconds(offset_seconds: i64) -> Self {
        Self { offset_seconds }
    }

    pub fn offset_seconds(&self) -> i64 {
        self.offset_seconds
    }

    /// Local wall-clock seconds for a UTC instant
    ///
    /// The wire field is an unsigned 32-bit count, so instants before 1970 or
    /// after early 2106 (local time) are clamped to the nearest end.
    pub fn device_seconds(&self, utc_millis: i64) -> u32 {
        let local = utc_millis.div_euclid(1000) + self.offset_seconds;
        u32::try_from(local).unwrap_or_else(|_| {
            let clamped = if local < 0 { 0 } else { u32::MAX };
            warn!(
                "Device time {} s outside the wire range, clamped to {}",
                local, clamped
            );
            clamped
        })
    }

    pub fn to_device_wire(&self, utc_millis: i64) -> [u8; 4] {
        self.device_seconds(utc_millis).to_be_bytes()
    }

    pub fn from_device_wire(&self, wire_seconds: u32) -> i64 {
        self.from_device_wire_millis(wire_seconds as i64 * 1000)
    }

    pub fn from_device_wire_millis(&self, wire_millis: i64) -> i64 {
        wire_millis - self.offset_seconds * 1000
    }
}

/// Converts between UTC epoch milliseconds and device wire seconds
#[derive(Debug, Clone)]
pub struct UtcClock<Tz: TimeZone = Local> {
    zone: Tz,
}

impl UtcClock<Local> {
    /// Clock following the host's local time zone rules
    pub fn local() -> Self {
        Self { zone: Local }
    }
}

impl Default for UtcClock<Local> {
    fn default() -> Self {
        Self::local()
    }
}

impl<Tz: TimeZone> UtcClock<Tz> {
    /// Clock following an explicit time zone rule
    pub fn with_zone(zone: Tz) -> Self {
        Self { zone }
    }

    /// Offset in force right now, DST included
    pub fn snapshot(&self) -> ZoneSnapshot {
        let now = Utc::now().naive_utc();
        let offset = self.zone.offset_from_utc_datetime(&now).fix();
        ZoneSnapshot::from_offset_seconds(offset.local_minus_utc() as i64)
    }

    pub fn offset_seconds(&self) -> i64 {
        self.snapshot().offset_seconds()
    }

    /// Local wall-clock seconds for a UTC instant
    pub fn device_seconds(&self, utc_millis: i64) -> u32 {
        self.snapshot().device_seconds(utc_millis)
    }

    /// Encode a UTC instant as the 4 big-endian bytes the band expects
    pub fn to_device_wire(&self, utc_millis: i64) -> [u8; 4] {
        self.snapshot().to_device_wire(utc_millis)
    }

    /// Convert wire seconds from the band back to UTC epoch milliseconds
    pub fn from_device_wire(&self, wire_seconds: u32) -> i64 {
        self.snapshot().from_device_wire(wire_seconds)
    }

    /// Same as [`from_device_wire`](Self::from_device_wire) for wire values
    /// already expressed in milliseconds
    pub fn from_device_wire_millis(&self, wire_millis: i64) -> i64 {
        self.snapshot().from_device_wire_millis(wire_millis)
    }
}
