//! Keyed rate limiters and their replenishment policies.
//!
//! Every limiter tracks outstanding claims per key against a fixed limit. The
//! policies differ only in how claims are released:
//!
//! - [`ManualKeyedRateLimiter`] never releases claims on its own.
//! - [`TokenBucketKeyedRateLimiter`] releases each admission one interval
//!   after it was made, so bursts come back in bursts.
//! - [`IncrementalKeyedRateLimiter`] releases one claim per cadence tick until
//!   the key is drained.
//!
//! [`SingleKey`] turns any of them into a non-keyed [`RateLimiter`].

use std::fmt::Debug;
use std::hash::Hash;

use crate::error::Result;

mod counter;
mod engine;
mod incremental;
mod lifecycle;
mod manual;
mod single;
mod token_bucket;

pub use counter::CounterTable;
pub use incremental::IncrementalKeyedRateLimiter;
pub use lifecycle::Lifecycle;
pub use manual::ManualKeyedRateLimiter;
pub use single::SingleKey;
pub use token_bucket::TokenBucketKeyedRateLimiter;

/// Bounds required of a limiter key.
///
/// Keys are stored in the counter table, moved into spawned release tasks and
/// recorded in log events.
pub trait Key: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> Key for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// A rate limiter with an independent claim counter per key.
pub trait KeyedRateLimiter<K: Key>: Send + Sync {
    /// The maximum number of claims per key.
    fn limit(&self) -> u64;

    /// Returns the remaining number of claims for the key.
    fn remaining(&self, key: &K) -> i64;

    /// Adds `amount` claims for the key if the limit allows it.
    ///
    /// Returns `Ok(false)` when admission is refused; the counter is left
    /// unchanged in that case.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` if `amount` is negative and with `Disposed`
    /// once the limiter has been disposed.
    fn try_increase(&self, key: K, amount: i64) -> Result<bool>;

    /// Removes `amount` claims from the key.
    ///
    /// Removing more claims than are outstanding is tolerated and simply
    /// drops the key.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` if `amount` is negative and with `Disposed`
    /// once the limiter has been disposed.
    fn decrease(&self, key: &K, amount: i64) -> Result<()>;

    /// Clears the claims of every key and cancels all scheduled releases.
    fn reset(&self);

    /// Cancels all scheduled releases permanently.
    fn dispose(&self);

    /// Adds a single claim for the key, returning whether it was admitted.
    ///
    /// # Errors
    ///
    /// Fails with `Disposed` once the limiter has been disposed.
    fn try_acquire(&self, key: K) -> Result<bool> {
        self.try_increase(key, 1)
    }

    /// Removes a single claim from the key.
    ///
    /// # Errors
    ///
    /// Fails with `Disposed` once the limiter has been disposed.
    fn release(&self, key: &K) -> Result<()> {
        self.decrease(key, 1)
    }
}

/// A rate limiter with a single global claim counter.
pub trait RateLimiter: Send + Sync {
    /// The maximum number of claims.
    fn limit(&self) -> u64;

    /// Returns the remaining number of claims.
    fn remaining(&self) -> i64;

    /// Adds `amount` claims if the limit allows it.
    fn try_acquire(&self, amount: i64) -> Result<bool>;

    /// Removes `amount` claims.
    fn release(&self, amount: i64) -> Result<()>;

    /// Clears all claims and cancels all scheduled releases.
    fn reset(&self);

    /// Cancels all scheduled releases permanently.
    fn dispose(&self);
}
