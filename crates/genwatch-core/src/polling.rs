use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{PollingConfig, PollingIntervals};
use crate::models::CoreError;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalBucket {
    Single,
    Few,
    Many,
}

impl IntervalBucket {
    /// `None` when nothing is generating.
    pub const fn for_count(generating: usize) -> Option<Self> {
        match generating {
            0 => None,
            1 => Some(IntervalBucket::Single),
            2 | 3 => Some(IntervalBucket::Few),
            _ => Some(IntervalBucket::Many),
        }
    }

    pub const fn interval_ms(self, intervals: &PollingIntervals) -> u64 {
        match self {
            IntervalBucket::Single => intervals.single_ms,
            IntervalBucket::Few => intervals.few_ms,
            IntervalBucket::Many => intervals.many_ms,
        }
    }
}

pub fn interval_for_count(intervals: &PollingIntervals, generating: usize) -> Option<Duration> {
    IntervalBucket::for_count(generating)
        .map(|bucket| Duration::from_millis(bucket.interval_ms(intervals)))
}

/// Re-poll interval for a signed in-flight count. `Ok(None)` means stop
/// polling; a negative count is rejected.
pub fn polling_interval(
    config: &PollingConfig,
    generating_count: i64,
) -> Result<Option<Duration>, CoreError> {
    let count = usize::try_from(generating_count).map_err(|_| {
        CoreError::invalid_input(format!(
            "generating task count must not be negative, got {generating_count}"
        ))
    })?;
    Ok(interval_for_count(&config.intervals, count))
}

/// Backoff before retry number `attempt + 1` of a failed status fetch.
pub fn retry_delay(config: &PollingConfig, attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(config.retry_delay_base_ms.saturating_mul(factor))
}
