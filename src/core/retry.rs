//! Reconnect policy

use std::time::Duration;

/// How often, and how patiently, a session retries a refused connection.
/// Backoff is linear: the n-th failed attempt waits `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after the given failed attempt (1-indexed)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Attempt numbers, 1-indexed
    pub fn attempts(&self) -> impl Iterator<Item = u32> {
        1..=self.max_attempts
    }
}
