//! Live progress and ETA projection for the item in flight.
//!
//! Elapsed time is measured from the item's own stage history, so the
//! projection needs no state beyond the record itself.

use chrono::{DateTime, Utc};

use crate::queue::StageRecord;

/// Progress is capped here until the terminal transition is persisted.
pub const MAX_LIVE_PROGRESS: u8 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    pub elapsed_ms: u64,
    pub progress: u8,
    pub eta_seconds: u64,
}

/// Time spent in the stages recorded in `history`.
///
/// Closed entries count up to `finished_at`; the open entry of the current
/// stage counts up to `now`; any other open entry counts nothing.
pub fn elapsed_ms(history: &[StageRecord], current_stage: Option<&str>, now: DateTime<Utc>) -> u64 {
    history
        .iter()
        .map(|record| {
            let end = match record.finished_at {
                Some(finished) => finished,
                None if current_stage == Some(record.stage.as_str()) => now,
                None => return 0,
            };
            (end - record.started_at).num_milliseconds().max(0) as u64
        })
        .sum()
}

pub fn project(
    history: &[StageRecord],
    current_stage: Option<&str>,
    total_ms: u64,
    now: DateTime<Utc>,
) -> Projection {
    let elapsed = elapsed_ms(history, current_stage, now);
    let progress = if total_ms == 0 {
        0
    } else {
        let pct = u128::from(elapsed) * 100 / u128::from(total_ms);
        pct.min(u128::from(MAX_LIVE_PROGRESS)) as u8
    };
    let remaining = total_ms.saturating_sub(elapsed);

    Projection {
        elapsed_ms: elapsed,
        progress,
        eta_seconds: (remaining + 500) / 1000,
    }
}
