//! Per-key retry tracking with exponential backoff.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

/// Default delay after the first failure.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default upper bound on the delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5 * 60);

/// Retry tracker for failed allocations.
///
/// Counts consecutive failures per key; the delay doubles with each failure
/// up to `max_delay`. A success clears the key.
#[derive(Debug, Clone)]
pub struct RetryTracker<K> {
    base_delay: Duration,
    max_delay: Duration,
    failures: HashMap<K, u32>,
}

impl<K: Eq + Hash> Default for RetryTracker<K> {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl<K: Eq + Hash> RetryTracker<K> {
    /// Create a new retry tracker.
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            failures: HashMap::new(),
        }
    }

    /// Record a failure and return how long to wait before the next attempt.
    pub fn record_failure(&mut self, key: K) -> Duration {
        let failures = {
            let count = self.failures.entry(key).or_insert(0);
            *count = count.saturating_add(1);
            *count
        };
        self.delay_for(failures)
    }

    /// Consecutive failures recorded for a key.
    pub fn failures(&self, key: &K) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }

    /// Clear failure tracking for a key (on success or drop).
    pub fn clear(&mut self, key: &K) {
        self.failures.remove(key);
    }

    /// Number of keys with outstanding failures.
    pub fn tracked(&self) -> usize {
        self.failures.len()
    }

    fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_then_caps() {
        let mut tracker = RetryTracker::new(Duration::from_secs(1), Duration::from_secs(5));

        assert_eq!(tracker.record_failure("pod-1"), Duration::from_secs(1));
        assert_eq!(tracker.record_failure("pod-1"), Duration::from_secs(2));
        assert_eq!(tracker.record_failure("pod-1"), Duration::from_secs(4));
        assert_eq!(tracker.record_failure("pod-1"), Duration::from_secs(5));
        assert_eq!(tracker.record_failure("pod-1"), Duration::from_secs(5));
        assert_eq!(tracker.failures(&"pod-1"), 5);
        assert_eq!(tracker.failures(&"pod-2"), 0);
    }

    #[test]
    fn test_clear_resets() {
        let mut tracker = RetryTracker::default();
        tracker.record_failure("pod-1");
        tracker.record_failure("pod-1");
        tracker.clear(&"pod-1");
        assert_eq!(tracker.tracked(), 0);
        assert_eq!(tracker.record_failure("pod-1"), DEFAULT_BASE_DELAY);
    }

    #[test]
    fn test_many_failures_do_not_overflow() {
        let mut tracker = RetryTracker::default();
        let mut last = Duration::ZERO;
        for _ in 0..100 {
            last = tracker.record_failure(1u8);
        }
        assert_eq!(last, DEFAULT_MAX_DELAY);
    }
}
