//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.
//!
//! Kernel misuse (duplicate registration, wrong-thread calls, occupied names)
//! is reported through sentinel return values plus a log line, never through
//! this enum. `Error` covers the genuinely fallible surface: loading and
//! parsing configuration.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the Axon kernel.
#[derive(Error, Debug)]
pub enum Error {
    /// Validation errors (malformed configuration values).
    #[error("validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
