//! Retry policy for submissions to a full pool
//!
//! The delay before retry `n` (0-indexed) is uniformly random in
//! `[0, max_jitter × backoff_factor^n]`. With the defaults (one retry,
//! 500ms bound, factor 1.0) a full pool is retried exactly once after a
//! sub-second jitter.

use std::time::Duration;

use contracts::RetrySettings;
use rand::Rng;

/// Retry policy applied when a backend's pool has no idle worker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Extra attempts after the first submit
    pub retries: u32,
    /// Jitter bound for the first retry
    pub max_jitter: Duration,
    /// Growth of the jitter bound per further retry
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            retries: settings.retries,
            max_jitter: Duration::from_millis(settings.max_jitter_ms),
            backoff_factor: settings.backoff_factor.max(1.0),
        }
    }
}

impl RetryPolicy {
    /// Fail on the first full-pool rejection
    pub fn none() -> Self {
        Self {
            retries: 0,
            max_jitter: Duration::ZERO,
            backoff_factor: 1.0,
        }
    }

    /// Total submit attempts, including the first
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Upper bound of the delay before retry `retry` (0-indexed)
    pub fn bound(&self, retry: u32) -> Duration {
        let factor = self.backoff_factor.powi(retry.min(i32::MAX as u32) as i32);
        let ms = self.max_jitter.as_millis() as f64 * factor;
        Duration::from_millis(ms.min(u64::MAX as f64) as u64)
    }

    /// Random delay before retry `retry` (0-indexed)
    pub fn delay(&self, retry: u32) -> Duration {
        let bound_ms = u64::try_from(self.bound(retry).as_millis()).unwrap_or(u64::MAX);
        if bound_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=bound_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_single_sub_second_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts(), 2);
        for _ in 0..100 {
            assert!(policy.delay(0) <= Duration::from_millis(500));
        }
    }

    #[test]
    fn test_none_has_single_attempt() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.attempts(), 1);
        assert_eq!(policy.delay(0), Duration::ZERO);
    }

    #[test]
    fn test_bound_grows_with_factor() {
        let policy = RetryPolicy {
            retries: 3,
            max_jitter: Duration::from_millis(100),
            backoff_factor: 2.0,
        };
        assert_eq!(policy.bound(0), Duration::from_millis(100));
        assert_eq!(policy.bound(1), Duration::from_millis(200));
        assert_eq!(policy.bound(2), Duration::from_millis(400));
    }

    #[test]
    fn test_factor_below_one_is_clamped() {
        let settings = RetrySettings {
            retries: 1,
            max_jitter_ms: 50,
            backoff_factor: 0.1,
        };
        let policy = RetryPolicy::from(&settings);
        assert_eq!(policy.backoff_factor, 1.0);
        assert_eq!(policy.bound(3), Duration::from_millis(50));
    }
}
