//! Bounded exponential backoff

use databricks_mcp_shared::HttpConfig;
use std::time::Duration;

/// Attempt budget and delay schedule for one logical request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(4),
            max_wait: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &HttpConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base: Duration::from_secs(config.backoff_base_secs),
            max_wait: Duration::from_secs(config.backoff_max_secs),
        }
    }

    /// Delay after the given failed attempt (1-based):
    /// `min(max_wait, base * 2^(attempt-1))`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_wait)
            .min(self.max_wait)
    }

    pub fn has_attempts_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(4));
        assert_eq!(policy.backoff(2), Duration::from_secs(8));
        assert_eq!(policy.backoff(3), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_is_monotonic_and_bounded() {
        let policy = RetryPolicy::default();
        let mut previous = Duration::ZERO;

        for attempt in 1..=200 {
            let delay = policy.backoff(attempt);
            assert!(delay >= previous, "attempt {attempt} went backwards");
            assert!(delay <= policy.max_wait);
            previous = delay;
        }
    }

    #[test]
    fn test_from_config_never_allows_zero_attempts() {
        let config = HttpConfig {
            max_retries: 0,
            ..HttpConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.has_attempts_after(1));
    }
}
