//! PatronPay Dispute Engine
//!
//! Dispute lifecycle over escrowed payments: a party raises a claim, the
//! escrow release freezes, evidence accumulates, and an admin decision or
//! the auto-resolve deadline settles who gets the funds. The payment-side
//! effects always go through the orchestrator so the payment and the
//! dispute record commit together.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod engine;
pub mod error;
pub mod scheduler;

pub use config::DisputeEngineConfig;
pub use engine::{DisputeEngine, DisputeOutcome, NewEvidence, OpenDisputeRequest};
pub use error::{Error, Result};
pub use scheduler::DisputeScheduler;
