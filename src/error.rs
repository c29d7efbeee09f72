//! Error types for the keyed limiters.

use thiserror::Error;

/// Main error type for limiter operations.
#[derive(Error, Debug)]
pub enum LimiterError {
    /// A caller-supplied argument was out of range
    #[error("Invalid argument `{name}`: {reason}")]
    InvalidArgument {
        name: &'static str,
        reason: String,
    },

    /// A timed limiter was created outside of a tokio runtime
    #[error("No tokio runtime available to schedule releases")]
    NoRuntime,

    /// The limiter was used after being disposed
    #[error("Limiter has been disposed")]
    Disposed,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LimiterError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        LimiterError::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }
}

/// Result type alias for limiter operations.
pub type Result<T> = std::result::Result<T, LimiterError>;
