//! Claimed-cost set and the descending free-slot search.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::error::{AllocationError, AllocationResult};

/// Highest deletion cost. The annotation is an int32.
pub const MAX_COST: i32 = i32::MAX;

/// Lowest deletion cost handed out.
pub const MIN_COST: i32 = 1;

/// A cost range with `min > max`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("cost range is empty: [{min}, {max}]")]
pub struct EmptyRange {
    pub min: i32,
    pub max: i32,
}

/// Deletion costs already claimed in one zone of one replica set.
///
/// Built fresh for each allocation and discarded afterwards. Values outside
/// the search range may be added (a user can annotate a pod with anything);
/// they are remembered but never affect the search.
#[derive(Debug, Clone)]
pub struct CostPool {
    claimed: BTreeSet<i32>,
    min: i32,
    max: i32,
}

impl Default for CostPool {
    fn default() -> Self {
        Self::new()
    }
}

impl CostPool {
    /// Create an empty pool over `[MIN_COST, MAX_COST]`.
    pub fn new() -> Self {
        Self::with_range(MIN_COST, MAX_COST)
    }

    /// Create an empty pool over `[min, max]`.
    ///
    /// # Panics
    ///
    /// Panics if `min > max`.
    pub fn with_range(min: i32, max: i32) -> Self {
        assert!(min <= max, "cost range is empty: [{min}, {max}]");
        Self {
            claimed: BTreeSet::new(),
            min,
            max,
        }
    }

    /// Create an empty pool over `[min, max]`, rejecting an empty range.
    pub fn try_with_range(min: i32, max: i32) -> Result<Self, EmptyRange> {
        if min > max {
            return Err(EmptyRange { min, max });
        }
        Ok(Self::with_range(min, max))
    }

    /// Mark a value as claimed.
    pub fn add(&mut self, value: i32) {
        self.claimed.insert(value);
    }

    /// Mark every value as claimed.
    pub fn add_all<I>(&mut self, values: I)
    where
        I: IntoIterator<Item = i32>,
    {
        self.claimed.extend(values);
    }

    pub fn contains(&self, value: i32) -> bool {
        self.claimed.contains(&value)
    }

    /// Number of claimed values, including out-of-range ones.
    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }

    /// Claim and return the highest unclaimed value in range.
    ///
    /// Walks the claimed set downward from `max`; the first gap is the answer.
    /// Cost is proportional to the number of claimed values at the top of the
    /// range, not to the size of the range.
    pub fn find_next_free(&mut self) -> AllocationResult<i32> {
        let mut candidate = self.max;
        for &taken in self.claimed.range(self.min..=self.max).rev() {
            if taken < candidate {
                break;
            }
            // taken == candidate
            if candidate == self.min {
                return Err(AllocationError::Exhausted {
                    min: self.min,
                    max: self.max,
                });
            }
            candidate -= 1;
        }
        self.claimed.insert(candidate);
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_try_with_range_rejects_empty_range() {
        assert_eq!(
            CostPool::try_with_range(5, 4).unwrap_err(),
            EmptyRange { min: 5, max: 4 }
        );
        let mut single = CostPool::try_with_range(7, 7).unwrap();
        assert_eq!(single.find_next_free().unwrap(), 7);
    }

    #[test]
    fn test_empty_pool_returns_max() {
        let mut pool = CostPool::new();
        assert_eq!(pool.find_next_free().unwrap(), MAX_COST);
    }

    #[test]
    fn test_skips_claimed_top_values() {
        let mut pool = CostPool::new();
        pool.add_all([MAX_COST, MAX_COST - 1]);
        assert_eq!(pool.find_next_free().unwrap(), MAX_COST - 2);
    }

    #[test]
    fn test_fills_gap_below_max() {
        let mut pool = CostPool::new();
        pool.add_all([MAX_COST, MAX_COST - 2]);
        assert_eq!(pool.find_next_free().unwrap(), MAX_COST - 1);
        assert_eq!(pool.find_next_free().unwrap(), MAX_COST - 3);
    }

    #[test]
    fn test_low_values_do_not_block_top() {
        let mut pool = CostPool::new();
        pool.add(42);
        assert_eq!(pool.find_next_free().unwrap(), MAX_COST);
    }

    #[test]
    fn test_successive_calls_never_repeat() {
        let mut pool = CostPool::new();
        let first = pool.find_next_free().unwrap();
        let second = pool.find_next_free().unwrap();
        let third = pool.find_next_free().unwrap();
        assert_eq!(
            vec![first, second, third],
            vec![MAX_COST, MAX_COST - 1, MAX_COST - 2]
        );
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_out_of_range_values_are_ignored_by_search() {
        let mut pool = CostPool::with_range(10, 12);
        pool.add_all([-5, 0, 100]);
        assert_eq!(pool.find_next_free().unwrap(), 12);
    }

    #[test]
    fn test_exhausted_range() {
        let mut pool = CostPool::with_range(1, 3);
        pool.add_all([1, 2, 3]);
        let err = pool.find_next_free().unwrap_err();
        assert_eq!(err, AllocationError::Exhausted { min: 1, max: 3 });
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_last_free_slot_is_min() {
        let mut pool = CostPool::with_range(1, 3);
        pool.add_all([2, 3]);
        assert_eq!(pool.find_next_free().unwrap(), 1);
        assert!(pool.find_next_free().is_err());
    }

    #[test]
    #[should_panic(expected = "cost range is empty")]
    fn test_inverted_range_panics() {
        let _ = CostPool::with_range(5, 4);
    }

    proptest! {
        #[test]
        fn prop_allocations_are_unique_and_unclaimed(
            claimed in proptest::collection::btree_set(0i32..64, 0..40),
            draws in 1usize..20,
        ) {
            let mut pool = CostPool::with_range(0, 63);
            pool.add_all(claimed.iter().copied());
            let mut seen = std::collections::BTreeSet::new();
            for _ in 0..draws {
                match pool.find_next_free() {
                    Ok(v) => {
                        prop_assert!(!claimed.contains(&v));
                        prop_assert!(seen.insert(v));
                        prop_assert!((0..=63).contains(&v));
                    }
                    Err(AllocationError::Exhausted { .. }) => {
                        prop_assert_eq!(claimed.len() + seen.len(), 64);
                        break;
                    }
                    Err(other) => prop_assert!(false, "unexpected error {other:?}"),
                }
            }
        }

        #[test]
        fn prop_result_is_highest_free(claimed in proptest::collection::btree_set(0i32..32, 0..31)) {
            let mut pool = CostPool::with_range(0, 31);
            pool.add_all(claimed.iter().copied());
            let expected = (0..=31).rev().find(|v| !claimed.contains(v)).unwrap();
            prop_assert_eq!(pool.find_next_free().unwrap(), expected);
        }
    }
}
