//! Reconnect backoff
//!
//! The delay before the next attempt is looked up in a fixed interval list
//! by the number of consecutive failures. The last interval is the ceiling
//! and repeats for every further failure.

use crate::config::DEFAULT_RETRY_INTERVALS_SECS;
use std::time::Duration;

/// Delay before the next attempt after `consecutive_failures` failures.
///
/// Zero failures (or no intervals) means retry immediately.
pub fn next_delay(intervals: &[Duration], consecutive_failures: u32) -> Duration {
    if consecutive_failures == 0 {
        return Duration::ZERO;
    }
    match intervals.len() {
        0 => Duration::ZERO,
        len => {
            let idx = (consecutive_failures as usize - 1).min(len - 1);
            intervals[idx]
        }
    }
}

/// Non-empty list of reconnect intervals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySchedule {
    intervals: Vec<Duration>,
}

impl RetrySchedule {
    /// Build a schedule; an empty list falls back to the defaults
    pub fn new(intervals: Vec<Duration>) -> Self {
        if intervals.is_empty() {
            return Self::default();
        }
        RetrySchedule { intervals }
    }

    /// Configured intervals
    pub fn intervals(&self) -> &[Duration] {
        &self.intervals
    }

    /// Delay after `consecutive_failures` failures
    pub fn delay_after(&self, consecutive_failures: u32) -> Duration {
        next_delay(&self.intervals, consecutive_failures)
    }

    /// How long a link must stay up before its close is not a failure
    ///
    /// Equal to the first interval.
    pub fn stable_after(&self) -> Duration {
        self.intervals.first().copied().unwrap_or(Duration::ZERO)
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        RetrySchedule {
            intervals: DEFAULT_RETRY_INTERVALS_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        }
    }
}
