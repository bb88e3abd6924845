//! Per-family reassembly of multi-frame responses
//!
//! A fetch that spans several notifications is collected here until its
//! terminator or its paired end frame arrives. Sessions have no timeout: an
//! unanswered fetch keeps its frames until the family is reset, which the
//! communicator does before every new fetch of that family.

use crate::types::RecordFamily;
use std::collections::HashMap;

/// Frames collected for one family since the last reset
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReassemblySession {
    frames: Vec<Vec<u8>>,
    anchor_ms: Option<i64>,
}

impl ReassemblySession {
    /// Raw frames in arrival order
    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    /// Anchor timestamp of a counted series, set by its first frame
    pub fn anchor_ms(&self) -> Option<i64> {
        self.anchor_ms
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Reassembly sessions keyed by record family
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    sessions: HashMap<RecordFamily, ReassemblySession>,
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw frame, creating the session on first use
    pub fn push(&mut self, family: RecordFamily, raw: &[u8]) {
        self.sessions
            .entry(family)
            .or_default()
            .frames
            .push(raw.to_vec());
    }

    /// Record the anchor timestamp unless the session already has one
    ///
    /// Returns the anchor in force afterwards.
    pub fn seed_anchor(&mut self, family: RecordFamily, anchor_ms: i64) -> i64 {
        *self
            .sessions
            .entry(family)
            .or_default()
            .anchor_ms
            .get_or_insert(anchor_ms)
    }

    pub fn has_anchor(&self, family: RecordFamily) -> bool {
        self.get(family).and_then(|s| s.anchor_ms).is_some()
    }

    pub fn get(&self, family: RecordFamily) -> Option<&ReassemblySession> {
        self.sessions.get(&family)
    }

    /// Number of frames buffered for `family`
    pub fn pending_frames(&self, family: RecordFamily) -> usize {
        self.get(family).map_or(0, |s| s.frames.len())
    }

    /// Drop the session for `family`; returns whether one existed
    pub fn reset(&mut self, family: RecordFamily) -> bool {
        self.sessions.remove(&family).is_some()
    }

    pub fn reset_all(&mut self) {
        self.sessions.clear();
    }

    /// Families with a session in progress
    pub fn active_families(&self) -> Vec<RecordFamily> {
        self.sessions.keys().copied().collect()
    }
}
