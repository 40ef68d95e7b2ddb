//! Configuration for the payment orchestrator

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// When a COMMISSION_REVERSAL entry accompanies a completed full refund
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionReversalPolicy {
    /// Never write a reversal entry
    Never,
    /// Only when the payment had reached RELEASED/SETTLED before the refund
    AfterRelease,
    /// On every full-refund completion
    Always,
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Escrow hold window applied at capture (days)
    pub escrow_hold_days: u16,

    /// Commission rate in percent when the request carries none
    pub default_commission_rate_percent: Decimal,

    /// Commission floor per payment
    pub minimum_commission: Decimal,

    /// Commission-reversal policy on full refunds
    pub commission_reversal_policy: CommissionReversalPolicy,

    /// Gateway selection
    pub gateway: GatewayConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            escrow_hold_days: 7,
            default_commission_rate_percent: Decimal::from(10),
            minimum_commission: Decimal::ONE,
            commission_reversal_policy: CommissionReversalPolicy::AfterRelease,
            gateway: GatewayConfig::default(),
        }
    }
}

/// Payment gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Provider name; `mock` is the only built-in provider
    pub provider: String,

    /// Mock provider settings
    pub mock: MockGatewayConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            mock: MockGatewayConfig::default(),
        }
    }
}

/// Mock gateway behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockGatewayConfig {
    /// Simulated network latency per call (milliseconds)
    pub latency_ms: u64,

    /// Fraction of calls that fail, 0.0 to 1.0
    pub fail_rate: f64,
}

impl Default for MockGatewayConfig {
    fn default() -> Self {
        Self {
            latency_ms: 10,
            fail_rate: 0.0,
        }
    }
}

impl OrchestratorConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;
        let config: OrchestratorConfig = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = OrchestratorConfig::default();

        if let Ok(days) = std::env::var("PAYMENT_ESCROW_HOLD_DAYS") {
            config.escrow_hold_days = days
                .parse()
                .map_err(|_| crate::Error::Config(format!("Bad hold days: {}", days)))?;
        }

        if let Ok(rate) = std::env::var("PAYMENT_COMMISSION_RATE_PERCENT") {
            config.default_commission_rate_percent = rate
                .parse()
                .map_err(|_| crate::Error::Config(format!("Bad commission rate: {}", rate)))?;
        }

        if let Ok(policy) = std::env::var("PAYMENT_COMMISSION_REVERSAL_POLICY") {
            config.commission_reversal_policy = match policy.as_str() {
                "never" => CommissionReversalPolicy::Never,
                "after_release" => CommissionReversalPolicy::AfterRelease,
                "always" => CommissionReversalPolicy::Always,
                other => {
                    return Err(crate::Error::Config(format!(
                        "Unknown reversal policy: {}",
                        other
                    )))
                }
            };
        }

        if let Ok(provider) = std::env::var("PAYMENT_GATEWAY_PROVIDER") {
            config.gateway.provider = provider;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.escrow_hold_days, 7);
        assert_eq!(
            config.commission_reversal_policy,
            CommissionReversalPolicy::AfterRelease
        );
        assert_eq!(config.gateway.provider, "mock");
    }

    #[test]
    fn test_policy_parses_snake_case() {
        let parsed: OrchestratorConfig = toml::from_str(
            r#"
            escrow_hold_days = 3
            default_commission_rate_percent = "12.5"
            minimum_commission = "1.00"
            commission_reversal_policy = "always"

            [gateway]
            provider = "mock"

            [gateway.mock]
            latency_ms = 0
            fail_rate = 0.0
            "#,
        )
        .unwrap();
        assert_eq!(parsed.escrow_hold_days, 3);
        assert_eq!(
            parsed.commission_reversal_policy,
            CommissionReversalPolicy::Always
        );
    }
}
