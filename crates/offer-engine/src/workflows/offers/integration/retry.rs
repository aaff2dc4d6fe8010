use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};

/// Backoff schedule for pending contract pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Total attempts, the first push included.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Delay before the next attempt once `attempts` have failed, or `None`
    /// when the budget is spent.
    pub fn delay_after(&self, attempts: u32) -> Option<Duration> {
        if attempts == 0 {
            return Some(Duration::ZERO);
        }
        if attempts >= self.max_attempts {
            return None;
        }

        let retries = (self.max_attempts - 1) as usize;
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(retries)
            .build()
            .nth((attempts - 1) as usize)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(300_000),
            max_attempts: 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_until_capped() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3),
            max_attempts: 5,
        };
        assert_eq!(policy.delay_after(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_after(3), Some(Duration::from_secs(3)));
        assert_eq!(policy.delay_after(4), Some(Duration::from_secs(3)));
        assert_eq!(policy.delay_after(5), None);
    }

    #[test]
    fn single_attempt_budget_never_retries() {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_after(1), None);
    }
}
