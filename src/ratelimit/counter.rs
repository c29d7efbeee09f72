//! Per-key claim counters.

use std::collections::HashMap;
use std::hash::Hash;

/// Outstanding claim counts indexed by key.
///
/// A key present in the table always has a count greater than zero. Keys are
/// removed as soon as their count drops to zero or below, so idle keys do not
/// accumulate. An absent key reads as zero.
///
/// The table does no locking of its own; callers hold the owning limiter's
/// lock for every access.
#[derive(Debug)]
pub struct CounterTable<K> {
    /// Maximum count any single key may reach
    limit: i64,
    /// Claim counts for keys with outstanding claims
    counts: HashMap<K, i64>,
}

impl<K: Eq + Hash + Clone> CounterTable<K> {
    /// Create an empty table with the given per-key limit.
    pub fn new(limit: i64) -> Self {
        Self {
            limit,
            counts: HashMap::new(),
        }
    }

    /// Get the current count for a key, zero if absent.
    pub fn count(&self, key: &K) -> i64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Get the remaining quota for a key.
    pub fn remaining(&self, key: &K) -> i64 {
        self.limit - self.count(key)
    }

    /// Add `amount` claims to a key if the limit allows it.
    ///
    /// Returns the count held before the increase when admitted, or `None` if
    /// the new count would exceed the limit. A rejected increase leaves the
    /// table untouched.
    pub fn try_increase(&mut self, key: &K, amount: i64) -> Option<i64> {
        let current = self.count(key);
        let updated = current.checked_add(amount).filter(|n| *n <= self.limit)?;

        if updated > 0 {
            self.counts.insert(key.clone(), updated);
        }
        Some(current)
    }

    /// Remove `amount` claims from a key.
    ///
    /// Returns the count left afterwards. Decreasing an absent key is a no-op.
    pub fn decrease(&mut self, key: &K, amount: i64) -> i64 {
        let Some(count) = self.counts.get_mut(key) else {
            return 0;
        };

        *count = count.saturating_sub(amount);
        let left = *count;

        // Free memory
        if left <= 0 {
            self.counts.remove(key);
            return 0;
        }
        left
    }

    /// Check whether a key has outstanding claims.
    pub fn contains(&self, key: &K) -> bool {
        self.counts.contains_key(key)
    }
}

impl<K> CounterTable<K> {
    /// Get the per-key limit.
    pub fn limit(&self) -> i64 {
        self.limit
    }

    /// Get the number of keys with outstanding claims.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Check whether no key has outstanding claims.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Remove every counter.
    pub fn clear(&mut self) {
        self.counts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increase_within_limit() {
        let mut table = CounterTable::new(10);

        assert_eq!(table.try_increase(&"a", 4), Some(0));
        assert_eq!(table.count(&"a"), 4);
        assert_eq!(table.remaining(&"a"), 6);
    }

    #[test]
    fn test_increase_exceeding_limit_is_rejected() {
        let mut table = CounterTable::new(5);

        assert_eq!(table.try_increase(&"a", 3), Some(0));
        assert_eq!(table.try_increase(&"a", 3), None);
        assert_eq!(table.count(&"a"), 3);

        // Exactly reaching the limit is allowed
        assert_eq!(table.try_increase(&"a", 2), Some(3));
        assert_eq!(table.remaining(&"a"), 0);
    }

    #[test]
    fn test_increase_overflow_is_rejected() {
        let mut table = CounterTable::new(i64::MAX);

        assert_eq!(table.try_increase(&"a", i64::MAX), Some(0));
        assert_eq!(table.try_increase(&"a", 1), None);
        assert_eq!(table.count(&"a"), i64::MAX);
    }

    #[test]
    fn test_zero_increase_on_absent_key_stores_nothing() {
        let mut table = CounterTable::new(3);

        assert_eq!(table.try_increase(&"a", 0), Some(0));
        assert!(!table.contains(&"a"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_decrease_removes_drained_keys() {
        let mut table = CounterTable::new(10);
        table.try_increase(&"a", 3);

        assert_eq!(table.decrease(&"a", 1), 2);
        assert!(table.contains(&"a"));

        // Decreasing past zero removes the key rather than going negative
        assert_eq!(table.decrease(&"a", 5), 0);
        assert!(!table.contains(&"a"));
        assert_eq!(table.count(&"a"), 0);
    }

    #[test]
    fn test_decrease_absent_key_is_noop() {
        let mut table: CounterTable<&str> = CounterTable::new(10);

        for _ in 0..3 {
            assert_eq!(table.decrease(&"missing", 1), 0);
        }
        assert!(table.is_empty());
    }

    #[test]
    fn test_keys_are_independent() {
        let mut table = CounterTable::new(2);
        table.try_increase(&"a", 2);

        assert_eq!(table.try_increase(&"b", 2), Some(0));
        assert_eq!(table.try_increase(&"a", 1), None);
        assert_eq!(table.len(), 2);

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.remaining(&"a"), 2);
    }
}
