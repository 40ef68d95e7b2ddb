//! PatronPay Orchestrator
//!
//! Drives payments through their lifecycle against the gateway and the
//! ledger. Every external trigger (API call, webhook, scheduled engine)
//! enters through [`PaymentOrchestrator`], which serializes work per
//! payment, deduplicates retried requests, and commits each step's
//! payment mutation and ledger entries as one atomic batch.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod error;
pub mod gateway;
pub mod orchestrator;

pub use config::{CommissionReversalPolicy, GatewayConfig, OrchestratorConfig};
pub use error::{Error, Result};
pub use gateway::{
    gateway_from_config, GatewayOrder, GatewayRefund, MockGateway, PaymentGateway,
};
pub use orchestrator::{CreateOrderRequest, PaymentOrchestrator, WebhookEvent, WebhookKind};
