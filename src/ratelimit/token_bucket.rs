//! Keyed token bucket that returns each admission after a fixed delay.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::engine::Engine;
use super::{Key, KeyedRateLimiter};
use crate::error::{LimiterError, Result};

/// A keyed rate limiter that increments a counter and decrements it after a
/// fixed interval.
///
/// Every successful admission schedules its own release, so claims taken in a
/// burst are all returned at once roughly one interval later. Compare
/// [`IncrementalKeyedRateLimiter`](super::IncrementalKeyedRateLimiter), which
/// returns claims one at a time.
///
/// Releases run on the tokio runtime the limiter was created in. Dropping the
/// limiter cancels every pending release.
#[derive(Debug)]
pub struct TokenBucketKeyedRateLimiter<K> {
    /// Counters and lifecycle, shared with release tasks
    engine: Arc<Engine<K>>,
    /// Delay before an admission is released
    interval: Duration,
    /// Runtime release tasks are spawned on
    runtime: Handle,
}

impl<K: Key> TokenBucketKeyedRateLimiter<K> {
    /// Create a token bucket limiter.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` for a zero limit or interval, and with
    /// `NoRuntime` when called outside of a tokio runtime.
    pub fn new(limit: u64, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(LimiterError::invalid("interval", "must be greater than zero"));
        }
        let runtime = Handle::try_current().map_err(|_| LimiterError::NoRuntime)?;

        Ok(Self {
            engine: Arc::new(Engine::new("token_bucket", limit)?),
            interval,
            runtime,
        })
    }

    /// Get the delay before an admission is released.
    pub fn interval(&self) -> Duration {
        self.interval
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

    fn schedule_release(&self, key: K, amount: i64, signal: CancellationToken) {
        let engine = Arc::clone(&self.engine);
        let interval = self.interval;

        self.runtime.spawn(async move {
            tokio::select! {
                _ = signal.cancelled() => {
                    trace!(key = ?key, amount = amount, "Release abandoned");
                }
                _ = tokio::time::sleep(interval) => {
                    engine.release_scheduled(&mut engine.lock(), &key, amount, &signal);
                }
            }
        });
    }
}

impl<K: Key> KeyedRateLimiter<K> for TokenBucketKeyedRateLimiter<K> {
    fn limit(&self) -> u64 {
        self.engine.limit()
    }

    fn remaining(&self, key: &K) -> i64 {
        self.engine.remaining(key)
    }

    fn try_increase(&self, key: K, amount: i64) -> Result<bool> {
        self.engine.try_increase(key, amount, |_, key, _, signal| {
            if amount > 0 {
                self.schedule_release(key, amount, signal);
            }
        })
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

impl<K> Drop for TokenBucketKeyedRateLimiter<K> {
    fn drop(&mut self) {
        self.engine.dispose();
    }
}
