//! Error types for coordination operations

use thiserror::Error;

/// Errors raised by coordination primitives
#[derive(Error, Debug)]
pub enum Error {
    /// The backing store failed or is unreachable
    #[error("Coordination backend error: {0}")]
    Backend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Backend(err.to_string())
    }
}

/// Result type for coordination operations
pub type Result<T> = std::result::Result<T, Error>;
