//! Keyed limiter whose claims are only released by the caller.

use super::engine::Engine;
use super::{Key, KeyedRateLimiter};
use crate::error::Result;

/// A keyed rate limiter that increments a counter per key.
///
/// Claims never expire; every admitted claim stays outstanding until the
/// caller releases it with [`KeyedRateLimiter::decrease`].
#[derive(Debug)]
pub struct ManualKeyedRateLimiter<K> {
    engine: Engine<K>,
}

impl<K: Key> ManualKeyedRateLimiter<K> {
    /// Create a manual limiter.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` if `limit` is zero or exceeds `i64::MAX`.
    pub fn new(limit: u64) -> Result<Self> {
        Ok(Self {
            engine: Engine::new("manual", limit)?,
        })
    }

    /// Get the outstanding claim count for a key.
    pub fn count(&self, key: &K) -> i64 {
        self.engine.count(key)
    }

    /// Get the number of keys with outstanding claims.
    pub fn active_keys(&self) -> usize {
        self.engine.active_keys()
    }

    /// Check whether the limiter has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.engine.is_disposed()
    }
}

impl<K: Key> KeyedRateLimiter<K> for ManualKeyedRateLimiter<K> {
    fn limit(&self) -> u64 {
        self.engine.limit()
    }

    fn remaining(&self, key: &K) -> i64 {
        self.engine.remaining(key)
    }

    fn try_increase(&self, key: K, amount: i64) -> Result<bool> {
        self.engine.try_increase(key, amount, |_, _, _, _| {})
    }

    fn decrease(&self, key: &K, amount: i64) -> Result<()> {
        self.engine.decrease(key, amount)
    }

    fn reset(&self) {
        self.engine.reset();
    }

    fn dispose(&self) {
        self.engine.dispose();
    }
}
