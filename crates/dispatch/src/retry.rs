//! Optional same-provider retry with exponential backoff and jitter.
//!
//! The envelope wraps a single (provider, key) upstream call; it is
//! independent of the cross-provider cascade.

use std::time::Duration;

use {finmux_config::RetrySettings, rand::Rng};

const JITTER_FRACTION: f64 = 0.25;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    enabled: bool,
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(settings: &RetrySettings) -> Self {
        Self {
            enabled: settings.enabled,
            max_attempts: settings.max_attempts.max(1),
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }

    /// Whether another physical call may follow `completed_attempts` on the
    /// same provider and key.
    #[must_use]
    pub fn should_retry(&self, completed_attempts: u32) -> bool {
        self.enabled && completed_attempts < self.max_attempts
    }

    /// Backoff before retry number `retry` (1-based), jittered upward by as
    /// much as 25%.
    #[must_use]
    pub fn delay_before(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let base = self
            .initial_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay);
        let jitter = base.mul_f64(rand::rng().random_range(0.0..=JITTER_FRACTION));
        base + jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(enabled: bool) -> RetryPolicy {
        RetryPolicy::new(&RetrySettings {
            enabled,
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 400,
        })
    }

    #[test]
    fn disabled_policy_never_retries() {
        assert!(!policy(false).should_retry(1));
    }

    #[test]
    fn retries_are_bounded_by_max_attempts() {
        let p = policy(true);
        assert!(p.should_retry(1));
        assert!(p.should_retry(2));
        assert!(!p.should_retry(3));
    }

    #[test]
    fn delay_doubles_then_caps() {
        let p = policy(true);
        for (retry, base_ms) in [(1_u32, 100_u64), (2, 200), (3, 400), (4, 400)] {
            let delay = p.delay_before(retry);
            assert!(delay >= Duration::from_millis(base_ms), "retry {retry}");
            assert!(
                delay <= Duration::from_millis(base_ms + base_ms / 4),
                "retry {retry}"
            );
        }
    }
}
