//! PatronPay Coordination
//!
//! Locks, idempotent admission, and rate gating shared by every payment
//! worker. All three layers sit on one small key-value trait with two
//! backends: in-process memory for single-instance deployments and tests,
//! Redis for fleets.
//!
//! # Architecture
//!
//! - **CoordinationStore**: conditional create/read/write/delete with TTLs
//! - **LockManager**: per-payment leases with owner-checked release
//! - **IdempotencyGuard**: claim-before-side-effect, replay after completion
//! - **RateGate**: in-memory fixed-window counters, swept when idle

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod admission;
pub mod config;
pub mod error;
pub mod idempotency;
pub mod lock;
pub mod redis_store;
pub mod store;

// Re-exports
pub use admission::{Decision, RateGate};
pub use config::{BackendKind, CoordinationConfig};
pub use error::{Error, Result};
pub use idempotency::{Admission, AdmissionToken, IdempotencyGuard};
pub use lock::{keys, LockGuard, LockManager};
pub use redis_store::RedisStore;
pub use store::{CoordinationStore, MemoryStore};
