//! Quota gate for upstream query calls.
//!
//! The alerts API enforces a global request budget; when configuring a
//! deployment, `quota_limit * instances` should stay under the upstream
//! allowance. Exhausted budget surfaces as a retryable rate-limit error so
//! the coordinator's backoff absorbs it.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

use crate::source::SourceError;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// In-memory rate gate shared by all calls of one adapter.
#[derive(Clone)]
pub struct QueryThrottle {
    limiter: Arc<DirectRateLimiter>,
    suggested_delay: Duration,
}

impl QueryThrottle {
    pub fn new(quota_window: Duration, quota_limit: u32) -> Self {
        let quota = quota_from_window(quota_window, quota_limit);
        let suggested_delay = Duration::from_secs_f64(
            (quota_window.as_secs_f64() / f64::from(quota_limit.max(1))).max(0.001),
        );
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            suggested_delay,
        }
    }

    /// Consumes one unit of budget, or fails with a retryable rate-limit
    /// error carrying the suggested wait.
    pub fn acquire(&self) -> Result<(), SourceError> {
        if self.limiter.check().is_ok() {
            return Ok(());
        }
        Err(SourceError::rate_limited(format!(
            "local query budget exhausted, retry in ~{}ms",
            self.suggested_delay.as_millis()
        )))
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let safe_limit = quota_limit.max(1);
    let burst = NonZeroU32::new(safe_limit).expect("safe limit must be non-zero");

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(safe_limit)).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .expect("period is always greater than zero")
        .allow_burst(burst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceErrorKind;

    #[test]
    fn exhausted_budget_surfaces_as_retryable_rate_limit() {
        let throttle = QueryThrottle::new(Duration::from_secs(60), 2);

        assert!(throttle.acquire().is_ok());
        assert!(throttle.acquire().is_ok());

        let error = throttle.acquire().expect_err("third call should be throttled");
        assert_eq!(error.kind(), SourceErrorKind::RateLimited);
        assert!(error.retryable());
    }
}
