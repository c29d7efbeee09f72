//! Keyed leaky bucket that returns claims one at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::engine::Engine;
use super::{Key, KeyedRateLimiter};
use crate::error::{LimiterError, Result};

/// A keyed rate limiter that increments a counter and decrements it one claim
/// at a time at a steady cadence.
///
/// Unlike [`TokenBucketKeyedRateLimiter`](super::TokenBucketKeyedRateLimiter),
/// claims trickle back instead of returning in bursts. At most one release
/// loop runs per key: it starts when the key goes from zero to a positive
/// count and stops once the key is drained.
///
/// The cadence is either derived from a total window with [`new`](Self::new)
/// (`window / limit`) or given directly with
/// [`with_cadence`](Self::with_cadence).
#[derive(Debug)]
pub struct IncrementalKeyedRateLimiter<K> {
    /// Counters, loop registry and lifecycle, shared with release loops
    engine: Arc<Engine<K>>,
    /// Delay between two single-claim releases
    cadence: Duration,
    /// Time a full bucket takes to drain
    window: Duration,
    /// Runtime release loops are spawned on
    runtime: Handle,
}

impl<K: Key> IncrementalKeyedRateLimiter<K> {
    /// Create a limiter that drains a full bucket over `window`.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` for a zero limit or a window too short to
    /// give a non-zero cadence, and with `NoRuntime` outside of a tokio runtime.
    pub fn new(limit: u64, window: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(LimiterError::invalid("limit", "must be greater than zero"));
        }
        let nanos = window.as_nanos() / u128::from(limit);
        let cadence = Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX));
        Self::build(limit, cadence, window)
    }

    /// Create a limiter that releases one claim per `cadence`.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` for a zero limit or cadence, and with
    /// `NoRuntime` outside of a tokio runtime.
    pub fn with_cadence(limit: u64, cadence: Duration) -> Result<Self> {
        let nanos = cadence.as_nanos().saturating_mul(u128::from(limit));
        let window = Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX));
        Self::build(limit, cadence, window)
    }

    fn build(limit: u64, cadence: Duration, window: Duration) -> Result<Self> {
        if cadence.is_zero() {
            return Err(LimiterError::invalid("cadence", "must be greater than zero"));
        }
        let runtime = Handle::try_current().map_err(|_| LimiterError::NoRuntime)?;

        Ok(Self {
            engine: Arc::new(Engine::new("incremental", limit)?),
            cadence,
            window,
            runtime,
        })
    }

    /// Get the delay between two single-claim releases.
    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    /// Get the time a full bucket takes to drain.
    pub fn interval(&self) -> Duration {
        self.window
    }

    /// Get the outstanding claim count for a key.
    pub fn count(&self, key: &K) -> i64 {
        self.engine.count(key)
    }

    /// Get the number of keys with outstanding claims.
    pub fn active_keys(&self) -> usize {
        self.engine.active_keys()
    }

    /// Get the number of keys with a running release loop.
    pub fn draining_keys(&self) -> usize {
        self.engine.lock().scheduled.len()
    }

    /// Check whether the limiter has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.engine.is_disposed()
    }

    fn spawn_release_loop(&self, key: K, signal: CancellationToken) {
        let engine = Arc::clone(&self.engine);
        let cadence = self.cadence;

        debug!(key = ?key, cadence = ?cadence, "Starting release loop");
        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = signal.cancelled() => {
                        trace!(key = ?key, "Release loop cancelled");
                        return;
                    }
                    _ = tokio::time::sleep(cadence) => {}
                }

                if !release_one(&engine, &key, &signal) {
                    return;
                }
            }
        });
    }
}

/// Release a single claim, returning whether the loop should keep going.
fn release_one<K: Key>(engine: &Engine<K>, key: &K, signal: &CancellationToken) -> bool {
    let mut state = engine.lock();
    match engine.release_scheduled(&mut state, key, 1, signal) {
        Some(true) => true,
        Some(false) => {
            state.scheduled.remove(key);
            debug!(key = ?key, "Release loop finished");
            false
        }
        // Reset already cleared the registry; a newer loop may own the key
        None => false,
    }
}

impl<K: Key> KeyedRateLimiter<K> for IncrementalKeyedRateLimiter<K> {
    fn limit(&self) -> u64 {
        self.engine.limit()
    }

    fn remaining(&self, key: &K) -> i64 {
        self.engine.remaining(key)
    }

    fn try_increase(&self, key: K, amount: i64) -> Result<bool> {
        self.engine.try_increase(key, amount, |state, key, previous, signal| {
            if previous == 0 && amount > 0 && state.scheduled.insert(key.clone()) {
                self.spawn_release_loop(key, signal);
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

impl<K> Drop for IncrementalKeyedRateLimiter<K> {
    fn drop(&mut self) {
        self.engine.dispose();
    }
}
