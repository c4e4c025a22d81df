//! Retry policy for remote calls.
//!
//! Linear backoff: the wait after failed attempt `n` is `n × base_delay`.
//! Some HTTP statuses can never succeed on a retry and abort at once.

use std::time::Duration;

/// Default number of attempts (including the first).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff unit.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// How many times, and how patiently, to retry a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Backoff unit; the n-th retry waits `n × base_delay`.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// A policy with the given attempts and backoff unit.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Total attempts allowed.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before the attempt following failed attempt `attempt` (1-based),
    /// or `None` when no attempts remain.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.attempts() {
            None
        } else {
            Some(self.base_delay.saturating_mul(attempt))
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

/// HTTP statuses that abort immediately: authentication rejected, forbidden,
/// not found, payload too large.
pub fn is_terminal_status(status: u16) -> bool {
    matches!(status, 401 | 403 | 404 | 413)
}
