//! Retry Policy
//!
//! Exponential backoff with jitter. Only transport errors, 5xx and 429
//! responses are retried; other 4xx statuses are terminal.

use rand::Rng;
use std::time::Duration;

use crate::config::RetrySettings;

/// Decide whether an upstream HTTP status warrants a retry.
pub fn status_is_retryable(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// Backoff schedule for one logical request.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    settings: RetrySettings,
}

impl Backoff {
    pub fn new(settings: RetrySettings) -> Self {
        Self { settings }
    }

    pub fn max_retries(&self) -> u32 {
        self.settings.max_retries
    }

    /// Delay before retry attempt `attempt` (1-based), with up to 25%
    /// additive jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self
            .settings
            .min_wait_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
            .min(self.settings.max_wait_ms);
        let jitter = rand::thread_rng().gen_range(0..=base / 4);
        Duration::from_millis(base + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(status_is_retryable(429));
        assert!(status_is_retryable(500));
        assert!(status_is_retryable(503));
        assert!(status_is_retryable(599));
        assert!(!status_is_retryable(400));
        assert!(!status_is_retryable(404));
        assert!(!status_is_retryable(200));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let backoff = Backoff::new(RetrySettings {
            max_retries: 5,
            min_wait_ms: 500,
            max_wait_ms: 10_000,
        });

        // Jitter adds at most base/4, so bounds are deterministic.
        let d1 = backoff.delay(1).as_millis() as u64;
        assert!((500..=625).contains(&d1), "d1={}", d1);

        let d3 = backoff.delay(3).as_millis() as u64;
        assert!((2000..=2500).contains(&d3), "d3={}", d3);

        let d10 = backoff.delay(10).as_millis() as u64;
        assert!((10_000..=12_500).contains(&d10), "d10={}", d10);
    }
}
