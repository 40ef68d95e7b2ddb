//! PatronPay Escrow Engine
//!
//! Background worker that releases escrowed payments once their hold
//! window elapses. The engine scans, the orchestrator releases; multiple
//! worker instances coexist because every release is serialized by the
//! per-payment distributed lock.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod engine;
pub mod error;
pub mod scheduler;

pub use config::EscrowEngineConfig;
pub use engine::{EscrowEngine, ReleasePassReport};
pub use error::{Error, Result};
pub use scheduler::EscrowScheduler;
