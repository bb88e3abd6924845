//! Sleep staging from per-epoch activity codes
//!
//! The band reports one code per 5-minute epoch. Codes 1..=20 are
//! asleep-class, 0 and anything above 20 mean the wearer was awake. A run of
//! consecutive asleep epochs is deep sleep when it spans at least
//! [`DEEP_SLEEP_MIN_EPOCHS`] epochs and light sleep otherwise.

use crate::records::{SleepRecord, SleepStage};

/// Length of one epoch
pub const EPOCH_MS: i64 = 300_000;

/// Shortest run classified as deep sleep
pub const DEEP_SLEEP_MIN_EPOCHS: usize = 3;

const MAX_ASLEEP_CODE: u8 = 20;

fn is_asleep(code: u8) -> bool {
    (1..=MAX_ASLEEP_CODE).contains(&code)
}

/// Pending run of asleep epochs
struct Run {
    start_ms: i64,
    codes: Vec<u8>,
}

impl Run {
    fn flush(self, out: &mut Vec<SleepRecord>) {
        let stage = if self.codes.len() >= DEEP_SLEEP_MIN_EPOCHS {
            SleepStage::Deep
        } else {
            SleepStage::Light
        };

        out.extend(self.codes.iter().enumerate().map(|(i, &code)| SleepRecord {
            timestamp_ms: self.start_ms + i as i64 * EPOCH_MS,
            stage,
            code,
        }));
    }
}

/// Classify `codes`, the first epoch starting at `anchor_ms` (UTC)
pub fn classify(anchor_ms: i64, codes: &[u8]) -> Vec<SleepRecord> {
    let mut records = Vec::with_capacity(codes.len());
    let mut run: Option<Run> = None;

    for (i, &code) in codes.iter().enumerate() {
        let epoch_ms = anchor_ms + i as i64 * EPOCH_MS;

        if is_asleep(code) {
            run.get_or_insert_with(|| Run {
                start_ms: epoch_ms,
                codes: Vec::new(),
            })
            .codes
            .push(code);
            continue;
        }

        if let Some(finished) = run.take() {
            finished.flush(&mut records);
        }
        records.push(SleepRecord {
            timestamp_ms: epoch_ms,
            stage: SleepStage::Awake,
            code,
        });
    }

    if let Some(finished) = run.take() {
        finished.flush(&mut records);
    }

    records
}
