//! Error types for the payment core

use crate::types::PaymentStatus;
use thiserror::Error;
use uuid::Uuid;

/// Result type for payment core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Payment core errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Transition not permitted by the state machine
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// Status before the attempted change
        from: PaymentStatus,
        /// Rejected target status
        to: PaymentStatus,
    },

    /// Payment not found
    #[error("Payment not found: {0}")]
    PaymentNotFound(Uuid),

    /// Dispute not found
    #[error("Dispute not found: {0}")]
    DisputeNotFound(Uuid),

    /// Stored version differs from the expected one (lost update)
    #[error("Version conflict: expected {expected}, found {found}")]
    VersionConflict {
        /// Version the caller loaded
        expected: u64,
        /// Version currently stored
        found: u64,
    },

    /// Another payment already holds this idempotency key
    #[error("Duplicate idempotency key: {0}")]
    DuplicateIdempotencyKey(String),

    /// A dispute already exists for this payment
    #[error("Dispute already exists for payment {0}")]
    DuplicateDispute(Uuid),

    /// Invariant violation (refund overflow, escrow bookkeeping, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Input failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
