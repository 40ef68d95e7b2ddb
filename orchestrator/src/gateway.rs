//! Payment gateway boundary
//!
//! The gateway is an opaque capability: it registers orders, checks
//! callback signatures, and executes refunds. External reference ids it
//! returns are recorded on the payment and in ledger entries. `MockGateway`
//! is the only built-in provider; it behaves deterministically enough for
//! tests while still simulating latency and injected failures.

use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use payment_core::Currency;
use rand::Rng;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Order registered with the gateway before the payer is charged
#[derive(Debug, Clone)]
pub struct GatewayOrder {
    /// Gateway-assigned order reference
    pub order_ref: String,
    /// Amount the order was registered for
    pub amount: Decimal,
    /// Order currency
    pub currency: Currency,
}

/// Refund issued by the gateway
#[derive(Debug, Clone)]
pub struct GatewayRefund {
    /// Gateway-assigned refund reference
    pub refund_ref: String,
    /// Refunded amount
    pub amount: Decimal,
}

/// Operations consumed from the payment gateway
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Register an order for `amount`; the payer is charged against it
    async fn create_order(
        &self,
        amount: Decimal,
        currency: Currency,
        receipt: &str,
    ) -> Result<GatewayOrder>;

    /// Check a client-callback signature over (order_ref, payment_ref)
    async fn verify_signature(
        &self,
        order_ref: &str,
        payment_ref: &str,
        signature: &str,
    ) -> Result<bool>;

    /// Execute a refund against a captured payment
    async fn execute_refund(&self, payment_ref: &str, amount: Decimal) -> Result<GatewayRefund>;
}

/// In-process gateway with simulated latency and failure injection
pub struct MockGateway {
    latency_ms: u64,
    fail_rate: f64,
    orders: Arc<RwLock<HashMap<String, GatewayOrder>>>,
}

impl MockGateway {
    /// Create a mock with the given latency and failure rate
    pub fn new(latency_ms: u64, fail_rate: f64) -> Self {
        Self {
            latency_ms,
            fail_rate,
            orders: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Zero latency, zero failures
    pub fn reliable() -> Self {
        Self::new(0, 0.0)
    }

    /// The signature `verify_signature` accepts for a given pair
    pub fn valid_signature(order_ref: &str, payment_ref: &str) -> String {
        format!("{}|{}|mock-secret", order_ref, payment_ref)
    }

    fn should_fail(&self) -> bool {
        self.fail_rate > 0.0 && rand::thread_rng().gen::<f64>() < self.fail_rate
    }

    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_order(
        &self,
        amount: Decimal,
        currency: Currency,
        receipt: &str,
    ) -> Result<GatewayOrder> {
        self.simulate_latency().await;

        if self.should_fail() {
            warn!(receipt, "mock gateway: simulated order failure");
            return Err(Error::Gateway("Simulated order creation failure".to_string()));
        }

        let order = GatewayOrder {
            order_ref: format!("order_{}", Uuid::new_v4().simple()),
            amount,
            currency,
        };
        self.orders
            .write()
            .await
            .insert(order.order_ref.clone(), order.clone());

        info!(
            order_ref = %order.order_ref,
            %amount,
            currency = currency.code(),
            "mock gateway: order created"
        );
        Ok(order)
    }

    async fn verify_signature(
        &self,
        order_ref: &str,
        payment_ref: &str,
        signature: &str,
    ) -> Result<bool> {
        self.simulate_latency().await;
        Ok(signature == Self::valid_signature(order_ref, payment_ref))
    }

    async fn execute_refund(&self, payment_ref: &str, amount: Decimal) -> Result<GatewayRefund> {
        self.simulate_latency().await;

        if self.should_fail() {
            warn!(payment_ref, "mock gateway: simulated refund failure");
            return Err(Error::Gateway("Simulated refund failure".to_string()));
        }

        let refund = GatewayRefund {
            refund_ref: format!("rfnd_{}", Uuid::new_v4().simple()),
            amount,
        };
        info!(
            payment_ref,
            refund_ref = %refund.refund_ref,
            %amount,
            "mock gateway: refund executed"
        );
        Ok(refund)
    }
}

/// Build the configured gateway provider
pub fn gateway_from_config(config: &GatewayConfig) -> Result<Arc<dyn PaymentGateway>> {
    match config.provider.as_str() {
        "mock" => Ok(Arc::new(MockGateway::new(
            config.mock.latency_ms,
            config.mock.fail_rate,
        ))),
        other => Err(Error::Config(format!("Unknown gateway provider: {}", other))),
    }
}
