//! PatronPay Payment Core
//!
//! Lifecycle engine for escrow-mediated sponsorship payments.
//!
//! # Architecture
//!
//! - **State Machine**: One data-driven table governs every status change
//! - **Append-Only Ledger**: Every financial movement is an immutable entry
//! - **Atomic Commits**: Payment, ledger entries, and dispute land in one batch

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]
//!
//! # Invariants
//!
//! - Commission + payout == amount, exactly, once computed
//! - Refunds never exceed the gross amount
//! - Status history is append-only; its last entry matches the status
//! - One escrow window per payment; `release_eligible_at` never moves
//! - Ledger entries are never updated or deleted

pub mod commission;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod state_machine;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::{reconcile, EntryDraft, LedgerWriter};
pub use metrics::Metrics;
pub use state_machine::{allowed_targets, can_transition, ChangeContext, ALL_STATUSES};
pub use storage::PaymentStore;
pub use types::{
    ActorRole, Currency, Dispute, DisputeCategory, DisputeStatus, EntryType, EscrowDetails,
    Evidence, NewDispute, NewPayment, Payment, PaymentSnapshot, PaymentStatus, StatusChange,
    Transaction,
};
