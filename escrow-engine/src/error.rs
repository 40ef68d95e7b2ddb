//! Escrow engine errors

use thiserror::Error;

/// Escrow engine error type
#[derive(Error, Debug)]
pub enum Error {
    /// Payment store or domain failure
    #[error(transparent)]
    Core(#[from] payment_core::Error),

    /// Orchestrator operation failure
    #[error(transparent)]
    Orchestrator(#[from] orchestrator::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Escrow engine result type
pub type Result<T> = std::result::Result<T, Error>;
