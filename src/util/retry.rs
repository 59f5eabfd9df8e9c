//! Bounded retry with multiplicative backoff.

use std::time::Duration;

/// Retry budget for an operation that may hit contention.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound on a single delay.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            retries: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(30),
            multiplier: 1.2,
        }
    }
}

impl BackoffPolicy {
    /// Total attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.retries + 1
    }

    /// Delay to wait after the given failed attempt (0-based), or `None`
    /// once the retry budget is exhausted.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.retries {
            return None;
        }
        let factor = self.multiplier.powi(attempt as i32);
        let millis = (self.initial_backoff.as_millis() as f64 * factor).round();
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Some(Duration::from_millis(capped as u64))
    }

    /// Every delay the policy will use, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.retries).filter_map(move |attempt| self.delay_after(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_grows_by_factor() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u128> = policy.delays().map(|d| d.as_millis()).collect();
        assert_eq!(delays, vec![200, 240, 288, 346, 415]);
        assert_eq!(policy.max_attempts(), 6);
    }

    #[test]
    fn delay_is_capped() {
        let policy = BackoffPolicy {
            retries: 3,
            initial_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(15),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_after(2), Some(Duration::from_secs(15)));
        assert_eq!(policy.delay_after(3), None);
    }

    #[test]
    fn zero_retries_never_waits() {
        let policy = BackoffPolicy {
            retries: 0,
            ..BackoffPolicy::default()
        };
        assert_eq!(policy.delays().count(), 0);
        assert_eq!(policy.max_attempts(), 1);
    }
}
