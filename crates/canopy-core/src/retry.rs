//! Retry policy for upstream calls: bounded exponential backoff with jitter.

use std::time::Duration;

use crate::source::SourceError;

/// Backoff schedule applied between attempts of one work item.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling on any single delay.
    pub max_delay: Duration,
    /// Multiplicative growth per retry.
    pub multiplier: f64,
    /// Maximum retries; total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// Apply +/- 50% random jitter to each delay.
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_retries: 3,
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// Fixed-delay schedule, mostly for tests.
    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            max_retries,
            jitter: false,
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Whether a failed attempt should be retried. `attempt` is 0-based.
    pub fn should_retry(&self, error: &SourceError, attempt: u32) -> bool {
        error.retryable() && attempt < self.max_retries
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scale = self.multiplier.powi(attempt as i32);
        let seconds = self.initial_delay.as_secs_f64() * scale;
        let capped = seconds.min(self.max_delay.as_secs_f64());
        let mut delay = Duration::from_secs_f64(capped);

        if self.jitter {
            let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
            if jitter_ms > 0 {
                let offset = fastrand::u64(0..=(jitter_ms * 2));
                let total_ms = delay.as_millis() as i64 + (offset as i64 - jitter_ms as i64);
                delay = Duration::from_millis(total_ms.max(0) as u64);
            }
        }

        delay
    }
}
