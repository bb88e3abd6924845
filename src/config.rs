//! Engine configuration

use crate::types::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How sport history arrives from a given band model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SportFraming {
    /// Multi-frame series closed by an `FFFFFFFF` terminator, oldest first
    #[default]
    Terminated,
    /// One frame holding every record, newest first
    Compact,
}

/// Sample spacing for counted series, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPeriods {
    pub heart_rate_ms: i64,
    pub respiratory_ms: i64,
    pub steps_ms: i64,
}

impl Default for SeriesPeriods {
    fn default() -> Self {
        Self {
            heart_rate_ms: 60_000,
            respiratory_ms: 60_000,
            steps_ms: 300_000,
        }
    }
}

/// Configuration for a band connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Model names that send sport history in compact framing
    pub compact_sport_models: Vec<String>,

    /// Sample spacing of heart-rate, respiratory and step series
    pub series_periods: SeriesPeriods,

    /// Longest frame prefix rendered in debug logs
    pub log_frame_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            compact_sport_models: Vec::new(),
            series_periods: SeriesPeriods::default(),
            log_frame_bytes: 32,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file; missing fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Sport framing for a detected model name
    ///
    /// Matching is exact after trimming and ignores ASCII case.
    pub fn sport_framing_for(&self, model_name: &str) -> SportFraming {
        let model = model_name.trim();
        if self
            .compact_sport_models
            .iter()
            .any(|m| m.trim().eq_ignore_ascii_case(model))
        {
            SportFraming::Compact
        } else {
            SportFraming::Terminated
        }
    }
}
