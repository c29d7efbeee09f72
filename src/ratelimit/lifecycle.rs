//! Cancellation of scheduled releases.

use tokio_util::sync::CancellationToken;

/// Owns the cancellation signal shared by every scheduled release of one
/// limiter instance.
///
/// Release tasks clone the current token when they are spawned. Resetting
/// cancels that token and installs a fresh one, so only work scheduled after
/// the reset observes the new signal. Disposing cancels the token for good.
#[derive(Debug)]
pub struct Lifecycle {
    /// Signal observed by in-flight releases
    signal: CancellationToken,
    /// Set once the owning limiter has been disposed
    disposed: bool,
}

impl Lifecycle {
    /// Create a live lifecycle with a fresh signal.
    pub fn new() -> Self {
        Self {
            signal: CancellationToken::new(),
            disposed: false,
        }
    }

    /// Get a handle to the current signal for a newly scheduled release.
    pub fn signal(&self) -> CancellationToken {
        self.signal.clone()
    }

    /// Cancel all in-flight releases and start a new generation.
    ///
    /// A disposed lifecycle stays cancelled.
    pub fn reset(&mut self) {
        self.signal.cancel();
        if !self.disposed {
            self.signal = CancellationToken::new();
        }
    }

    /// Cancel all in-flight releases permanently.
    ///
    /// Returns `false` if the lifecycle was already disposed.
    pub fn dispose(&mut self) -> bool {
        self.signal.cancel();
        !std::mem::replace(&mut self.disposed, true)
    }

    /// Check whether the lifecycle has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_cancels_previous_signal() {
        let mut lifecycle = Lifecycle::new();
        let before = lifecycle.signal();

        lifecycle.reset();

        assert!(before.is_cancelled());
        assert!(!lifecycle.signal().is_cancelled());
        assert!(!lifecycle.is_disposed());
    }

    #[test]
    fn test_dispose_is_permanent() {
        let mut lifecycle = Lifecycle::new();
        let before = lifecycle.signal();

        assert!(lifecycle.dispose());
        assert!(before.is_cancelled());
        assert!(lifecycle.signal().is_cancelled());

        // Neither a second dispose nor a reset revives the signal
        assert!(!lifecycle.dispose());
        lifecycle.reset();
        assert!(lifecycle.signal().is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let mut lifecycle = Lifecycle::new();
        let signal = lifecycle.signal();

        let waiter = tokio::spawn(async move { signal.cancelled().await });
        lifecycle.reset();

        tokio_test::assert_ok!(waiter.await);
    }
}
