//! Error types for the permissions module.

use thiserror::Error;

/// Errors that can occur during key wrapping and grant operations.
#[derive(Debug, Error)]
pub enum PermsError {
    /// Encryption error.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Tag verification failed: wrong key, wrong context, or tampered data.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Key material has the wrong shape.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Adding the subscription period overflowed the calendar.
    #[error("grant period overflows")]
    PeriodOverflow,
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;
