//! Dispute engine configuration

use serde::{Deserialize, Serialize};

/// Dispute engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeEngineConfig {
    /// Days a dispute may stay open before auto-resolution
    pub dispute_window_days: u16,

    /// Seconds between auto-resolve passes
    pub pass_interval_secs: u64,

    /// Evidence items accepted per dispute
    pub max_evidence_items: usize,
}

impl Default for DisputeEngineConfig {
    fn default() -> Self {
        Self {
            dispute_window_days: 14,
            pass_interval_secs: 14_400,
            max_evidence_items: 20,
        }
    }
}

impl DisputeEngineConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;
        let config: DisputeEngineConfig = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = DisputeEngineConfig::default();

        if let Ok(days) = std::env::var("DISPUTE_WINDOW_DAYS") {
            config.dispute_window_days = days
                .parse()
                .map_err(|_| crate::Error::Config(format!("Bad dispute window: {}", days)))?;
        }

        if let Ok(interval) = std::env::var("DISPUTE_PASS_INTERVAL_SECS") {
            config.pass_interval_secs = interval
                .parse()
                .map_err(|_| crate::Error::Config(format!("Bad pass interval: {}", interval)))?;
        }

        Ok(config)
    }
}
