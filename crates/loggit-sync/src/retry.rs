//! Retry policy for failed replication cycles.

use std::time::Duration;

/// Capped exponential backoff.
///
/// Attempt `n` (starting at 1) waits `initial_backoff * multiplier^(n-1)`,
/// never more than `max_backoff`. With `max_attempts = None` the session
/// retries until stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            multiplier: 2,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after `attempt` consecutive failures.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Returns `true` if another attempt may follow `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}
