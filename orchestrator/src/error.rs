//! Error types for orchestrated payment operations

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while orchestrating payment operations
#[derive(Error, Debug)]
pub enum Error {
    /// State machine, storage, or ledger error
    #[error(transparent)]
    Core(#[from] payment_core::Error),

    /// Coordination store error; financial mutations fail closed
    #[error(transparent)]
    Coordination(#[from] coordination::Error),

    /// The payment gateway rejected or failed an operation
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Signature verification failed; nothing was mutated
    #[error("Invalid gateway signature")]
    InvalidSignature,

    /// Another process holds the lock for this resource
    #[error("Lock contention on {key}")]
    LockContention {
        /// Contended lock key
        key: String,
    },

    /// The same operation is still running elsewhere
    #[error("Operation in flight for {key}")]
    OperationInFlight {
        /// Claimed idempotency key
        key: String,
    },

    /// Requested refund exceeds the remaining refundable balance
    #[error("Refund of {requested} exceeds refundable balance {refundable}")]
    OverRefund {
        /// Amount the caller asked for
        requested: Decimal,
        /// Balance still refundable
        refundable: Decimal,
    },

    /// Payment is not eligible for auto-release right now
    #[error("Payment {0} is not eligible for release")]
    NotEligible(Uuid),

    /// Request failed validation before any mutation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Snapshot serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// True when the caller should retry later rather than give up
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::LockContention { .. } | Error::OperationInFlight { .. } | Error::Coordination(_)
        )
    }
}

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, Error>;
