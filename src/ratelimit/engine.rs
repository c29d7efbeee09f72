//! Admission engine shared by every replenishment policy.

use std::collections::HashSet;
use std::fmt;

use parking_lot::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::counter::CounterTable;
use super::lifecycle::Lifecycle;
use super::Key;
use crate::error::{LimiterError, Result};

/// State guarded by the engine lock.
///
/// The counters, the scheduled-release set and the cancellation signal live
/// behind one lock so that a reset is atomic across all of them.
pub(crate) struct EngineState<K> {
    /// Outstanding claims per key
    pub counters: CounterTable<K>,
    /// Keys with a running release loop (incremental policy only)
    pub scheduled: HashSet<K>,
    /// Cancellation signal for scheduled releases
    pub lifecycle: Lifecycle,
}

/// Lock-guarded counter table with atomic check-and-set admission.
pub(crate) struct Engine<K> {
    /// Policy name used in log events
    policy: &'static str,
    /// Configured per-key limit
    limit: u64,
    /// Shared mutable state
    state: Mutex<EngineState<K>>,
}

impl<K: Key> Engine<K> {
    /// Create an engine for a positive limit.
    pub fn new(policy: &'static str, limit: u64) -> Result<Self> {
        if limit == 0 {
            return Err(LimiterError::invalid("limit", "must be greater than zero"));
        }
        let stored = i64::try_from(limit)
            .map_err(|_| LimiterError::invalid("limit", format!("must not exceed {}", i64::MAX)))?;

        Ok(Self {
            policy,
            limit,
            state: Mutex::new(EngineState {
                counters: CounterTable::new(stored),
                scheduled: HashSet::new(),
                lifecycle: Lifecycle::new(),
            }),
        })
    }

    /// Admit `amount` claims for `key` if the limit allows it.
    ///
    /// On admission `on_admit` runs while the lock is still held, receiving the
    /// state, the key, the count held before the increase and the current
    /// cancellation signal. Policies use it to schedule releases.
    pub fn try_increase<F>(&self, key: K, amount: i64, on_admit: F) -> Result<bool>
    where
        F: FnOnce(&mut EngineState<K>, K, i64, CancellationToken),
    {
        validate_amount(amount)?;

        let mut state = self.lock();
        if state.lifecycle.is_disposed() {
            warn!(policy = self.policy, key = ?key, "Increase attempted on disposed limiter");
            return Err(LimiterError::Disposed);
        }

        let Some(previous) = state.counters.try_increase(&key, amount) else {
            debug!(
                policy = self.policy,
                key = ?key,
                amount = amount,
                count = state.counters.count(&key),
                limit = self.limit,
                "Rate limit exceeded"
            );
            return Ok(false);
        };

        trace!(
            policy = self.policy,
            key = ?key,
            amount = amount,
            count = previous + amount,
            "Claims admitted"
        );

        let signal = state.lifecycle.signal();
        on_admit(&mut *state, key, previous, signal);
        Ok(true)
    }

    /// Release `amount` claims for `key`.
    pub fn decrease(&self, key: &K, amount: i64) -> Result<()> {
        validate_amount(amount)?;

        let mut state = self.lock();
        if state.lifecycle.is_disposed() {
            warn!(policy = self.policy, key = ?key, "Decrease attempted on disposed limiter");
            return Err(LimiterError::Disposed);
        }

        let left = state.counters.decrease(key, amount);
        trace!(policy = self.policy, key = ?key, amount = amount, count = left, "Claims released");
        Ok(())
    }

    /// Apply a scheduled release unless its signal has fired.
    ///
    /// The signal is checked under the lock, so a release racing with a reset
    /// or dispose never lands after it. Returns whether the key still has
    /// outstanding claims, or `None` when the release was cancelled.
    pub fn release_scheduled(
        &self,
        state: &mut EngineState<K>,
        key: &K,
        amount: i64,
        signal: &CancellationToken,
    ) -> Option<bool> {
        if signal.is_cancelled() {
            trace!(policy = self.policy, key = ?key, "Scheduled release cancelled");
            return None;
        }

        let left = state.counters.decrease(key, amount);
        trace!(
            policy = self.policy,
            key = ?key,
            amount = amount,
            count = left,
            "Scheduled release applied"
        );
        Some(left > 0)
    }

    /// Get the remaining quota for a key.
    pub fn remaining(&self, key: &K) -> i64 {
        self.lock().counters.remaining(key)
    }

    /// Get the outstanding claim count for a key.
    pub fn count(&self, key: &K) -> i64 {
        self.lock().counters.count(key)
    }

    /// Get the number of keys with outstanding claims.
    pub fn active_keys(&self) -> usize {
        self.lock().counters.len()
    }

    /// Clear every counter and cancel all scheduled releases.
    pub fn reset(&self) {
        let mut state = self.lock();
        if state.lifecycle.is_disposed() {
            warn!(policy = self.policy, "Reset attempted on disposed limiter");
            return;
        }

        let cleared = state.counters.len();
        state.counters.clear();
        state.lifecycle.reset();
        state.scheduled.clear();

        debug!(policy = self.policy, cleared_keys = cleared, "Limiter reset");
    }
}

impl<K> Engine<K> {
    /// Get the configured limit.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Acquire the engine lock.
    pub fn lock(&self) -> MutexGuard<'_, EngineState<K>> {
        self.state.lock()
    }

    /// Cancel all scheduled releases permanently.
    pub fn dispose(&self) {
        let mut state = self.lock();
        if state.lifecycle.dispose() {
            debug!(
                policy = self.policy,
                active_keys = state.counters.len(),
                "Limiter disposed"
            );
        }
    }

    /// Check whether the engine has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.lock().lifecycle.is_disposed()
    }
}

impl<K> fmt::Debug for Engine<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("policy", &self.policy)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

fn validate_amount(amount: i64) -> Result<()> {
    if amount < 0 {
        return Err(LimiterError::invalid(
            "amount",
            format!("must be non-negative, got {}", amount),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_zero_limit_rejected() {
        let result = Engine::<&str>::new("test", 0);
        assert!(matches!(
            result,
            Err(LimiterError::InvalidArgument { name: "limit", .. })
        ));
    }

    #[test]
    fn test_oversized_limit_rejected() {
        assert_err!(Engine::<&str>::new("test", u64::MAX));
        assert_ok!(Engine::<&str>::new("test", i64::MAX as u64));
    }

    #[test]
    fn test_negative_amount_rejected_without_mutation() {
        let engine = Engine::new("test", 5).unwrap();
        engine.try_increase("k", 2, |_, _, _, _| {}).unwrap();

        let err = engine.try_increase("k", -1, |_, _, _, _| {}).unwrap_err();
        assert!(matches!(err, LimiterError::InvalidArgument { name: "amount", .. }));

        assert_err!(engine.decrease(&"k", -1));
        assert_eq!(engine.count(&"k"), 2);
    }

    #[test]
    fn test_on_admit_sees_previous_count() {
        let engine = Engine::new("test", 5).unwrap();
        let mut seen = Vec::new();

        engine
            .try_increase("k", 2, |_, _, previous, _| seen.push(previous))
            .unwrap();
        engine
            .try_increase("k", 1, |_, _, previous, _| seen.push(previous))
            .unwrap();
        // Rejected admissions never invoke the hook
        let admitted = engine
            .try_increase("k", 3, |_, _, previous, _| seen.push(previous))
            .unwrap();

        assert!(!admitted);
        assert_eq!(seen, vec![0, 2]);
    }

    #[test]
    fn test_release_scheduled_respects_signal() {
        let engine = Engine::new("test", 5).unwrap();
        engine.try_increase("k", 2, |_, _, _, _| {}).unwrap();

        let signal = engine.lock().lifecycle.signal();
        {
            let mut state = engine.lock();
            assert_eq!(engine.release_scheduled(&mut state, &"k", 1, &signal), Some(true));
        }

        engine.reset();
        engine.try_increase("k", 2, |_, _, _, _| {}).unwrap();

        let mut state = engine.lock();
        assert_eq!(engine.release_scheduled(&mut state, &"k", 1, &signal), None);
        assert_eq!(state.counters.count(&"k"), 2);
    }

    #[test]
    fn test_disposed_engine_fails_fast() {
        let engine = Engine::new("test", 5).unwrap();
        engine.try_increase("k", 1, |_, _, _, _| {}).unwrap();

        engine.dispose();
        assert!(engine.is_disposed());

        assert!(matches!(
            engine.try_increase("k", 1, |_, _, _, _| {}),
            Err(LimiterError::Disposed)
        ));
        assert!(matches!(engine.decrease(&"k", 1), Err(LimiterError::Disposed)));

        // Reads still work and reset is ignored
        engine.reset();
        assert_eq!(engine.remaining(&"k"), 4);
    }
}
