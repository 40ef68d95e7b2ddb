//! Escrow engine configuration

use serde::{Deserialize, Serialize};

/// Escrow engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowEngineConfig {
    /// Seconds between release passes
    pub pass_interval_secs: u64,
}

impl Default for EscrowEngineConfig {
    fn default() -> Self {
        Self {
            pass_interval_secs: 3600,
        }
    }
}

impl EscrowEngineConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;
        let config: EscrowEngineConfig = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = EscrowEngineConfig::default();

        if let Ok(interval) = std::env::var("ESCROW_PASS_INTERVAL_SECS") {
            config.pass_interval_secs = interval
                .parse()
                .map_err(|_| crate::Error::Config(format!("Bad pass interval: {}", interval)))?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        assert_eq!(EscrowEngineConfig::default().pass_interval_secs, 3600);
    }

    #[test]
    fn test_toml_parse() {
        let config: EscrowEngineConfig = toml::from_str("pass_interval_secs = 600").unwrap();
        assert_eq!(config.pass_interval_secs, 600);
    }
}
