//! Keyed Limiter - in-process keyed rate limiting
//!
//! This crate tracks outstanding claims per caller-supplied key against a fixed
//! limit and decides whether new claims may be admitted. Claims are released
//! manually, after a fixed delay, or gradually at a steady cadence, depending on
//! the chosen limiter. Timed limiters schedule their releases on tokio and can
//! cancel every pending release at once through reset or disposal.

pub mod config;
pub mod error;
pub mod ratelimit;

pub use error::{LimiterError, Result};
pub use ratelimit::{
    IncrementalKeyedRateLimiter, Key, KeyedRateLimiter, ManualKeyedRateLimiter, RateLimiter,
    SingleKey, TokenBucketKeyedRateLimiter,
};
