//! Retry budget and backoff for remote calls.
//!
//! Both the credential exchange and the flag fetch make one initial attempt
//! plus up to `max_retries` further attempts. Where a path waits between
//! attempts, the wait grows linearly with the number of attempts already
//! made and is never capped.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,

    /// Base delay; the wait after attempt `n` is `retry_delay * n`.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    /// Total number of attempts this policy allows, first attempt included.
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay to wait after the `attempt`-th attempt (1-based) failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.retry_delay.saturating_mul(attempt)
    }

    /// Whether another attempt remains after `attempt` (1-based).
    pub fn has_remaining(&self, attempt: u32) -> bool {
        attempt < self.attempts()
    }
}
