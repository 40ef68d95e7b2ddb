//! Dispute engine errors

use thiserror::Error;

/// Dispute engine error type
#[derive(Error, Debug)]
pub enum Error {
    /// Payment store or domain failure
    #[error(transparent)]
    Core(#[from] payment_core::Error),

    /// Orchestrator operation failure
    #[error(transparent)]
    Orchestrator(#[from] orchestrator::Error),

    /// Request rejected before touching any state
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Dispute engine result type
pub type Result<T> = std::result::Result<T, Error>;
