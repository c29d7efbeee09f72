//! Non-keyed limiters built on the keyed ones.

use std::time::Duration;

use super::{
    IncrementalKeyedRateLimiter, KeyedRateLimiter, ManualKeyedRateLimiter, RateLimiter,
    TokenBucketKeyedRateLimiter,
};
use crate::error::Result;

/// A single global limit backed by a keyed limiter that always sees the key
/// `()`.
#[derive(Debug)]
pub struct SingleKey<L> {
    inner: L,
}

impl<L: KeyedRateLimiter<()>> SingleKey<L> {
    /// Wrap a keyed limiter.
    pub fn new(inner: L) -> Self {
        Self { inner }
    }

    /// Get the wrapped keyed limiter.
    pub fn inner(&self) -> &L {
        &self.inner
    }
}

impl SingleKey<ManualKeyedRateLimiter<()>> {
    /// Create a global limit whose claims are released by the caller.
    pub fn manual(limit: u64) -> Result<Self> {
        ManualKeyedRateLimiter::new(limit).map(Self::new)
    }
}

impl SingleKey<TokenBucketKeyedRateLimiter<()>> {
    /// Create a global limit whose claims return `interval` after admission.
    pub fn token_bucket(limit: u64, interval: Duration) -> Result<Self> {
        TokenBucketKeyedRateLimiter::new(limit, interval).map(Self::new)
    }
}

impl SingleKey<IncrementalKeyedRateLimiter<()>> {
    /// Create a global limit that drains a full bucket over `window`.
    pub fn incremental(limit: u64, window: Duration) -> Result<Self> {
        IncrementalKeyedRateLimiter::new(limit, window).map(Self::new)
    }

    /// Create a global limit that releases one claim per `cadence`.
    pub fn incremental_with_cadence(limit: u64, cadence: Duration) -> Result<Self> {
        IncrementalKeyedRateLimiter::with_cadence(limit, cadence).map(Self::new)
    }
}

impl<L: KeyedRateLimiter<()>> RateLimiter for SingleKey<L> {
    fn limit(&self) -> u64 {
        self.inner.limit()
    }

    fn remaining(&self) -> i64 {
        self.inner.remaining(&())
    }

    fn try_acquire(&self, amount: i64) -> Result<bool> {
        self.inner.try_increase((), amount)
    }

    fn release(&self, amount: i64) -> Result<()> {
        self.inner.decrease(&(), amount)
    }

    fn reset(&self) {
        self.inner.reset();
    }

    fn dispose(&self) {
        self.inner.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_manual_single_limit() {
        let limiter = SingleKey::manual(2).unwrap();

        assert!(limiter.try_acquire(1).unwrap());
        assert!(limiter.try_acquire(1).unwrap());
        assert!(!limiter.try_acquire(1).unwrap());
        assert_eq!(limiter.remaining(), 0);

        assert_ok!(limiter.release(1));
        assert_eq!(limiter.remaining(), 1);
        assert_err!(limiter.release(-1));

        limiter.reset();
        assert_eq!(limiter.remaining(), limiter.limit() as i64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_single_limit() {
        let limiter = SingleKey::token_bucket(3, Duration::from_secs(1)).unwrap();

        assert!(limiter.try_acquire(3).unwrap());
        assert!(!limiter.try_acquire(1).unwrap());

        sleep(Duration::from_millis(1100)).await;
        assert_eq!(limiter.remaining(), 3);
        assert_eq!(limiter.inner().active_keys(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incremental_single_limit() {
        let limiter =
            SingleKey::incremental_with_cadence(2, Duration::from_millis(100)).unwrap();

        assert!(limiter.try_acquire(2).unwrap());
        sleep(Duration::from_millis(150)).await;
        assert_eq!(limiter.remaining(), 1);

        limiter.dispose();
        sleep(Duration::from_millis(200)).await;
        assert_eq!(limiter.remaining(), 1);
    }

    #[tokio::test]
    async fn test_incremental_window_constructor() {
        let limiter = SingleKey::incremental(4, Duration::from_secs(2)).unwrap();
        assert_eq!(limiter.inner().cadence(), Duration::from_millis(500));
    }
}
