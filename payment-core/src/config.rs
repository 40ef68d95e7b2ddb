//! Configuration for the payment core

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Payment core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,

    /// Escrow configuration
    pub escrow: EscrowConfig,

    /// Commission configuration
    pub commission: CommissionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/payments"),
            service_name: "payment-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            rocksdb: RocksDbConfig::default(),
            escrow: EscrowConfig::default(),
            commission: CommissionConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 128,
            max_write_buffer_number: 4,
            target_file_size_mb: 128,
            max_background_jobs: 4,
            enable_statistics: false,
        }
    }
}

/// Escrow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// Hold window applied when funds enter escrow (days)
    pub hold_days: u16,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self { hold_days: 7 }
    }
}

/// Commission configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionConfig {
    /// Default rate in percent, used when a request does not carry one
    pub default_rate_percent: Decimal,

    /// Commission floor per payment
    pub minimum_commission: Decimal,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            default_rate_percent: Decimal::from(10),
            minimum_commission: Decimal::ONE,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("PAYMENT_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(days) = std::env::var("PAYMENT_ESCROW_HOLD_DAYS") {
            config.escrow.hold_days = days
                .parse()
                .map_err(|_| crate::Error::Config(format!("Bad hold days: {}", days)))?;
        }

        if let Ok(rate) = std::env::var("PAYMENT_COMMISSION_RATE_PERCENT") {
            config.commission.default_rate_percent = rate
                .parse()
                .map_err(|_| crate::Error::Config(format!("Bad commission rate: {}", rate)))?;
        }

        if let Ok(min) = std::env::var("PAYMENT_MINIMUM_COMMISSION") {
            config.commission.minimum_commission = min
                .parse()
                .map_err(|_| crate::Error::Config(format!("Bad minimum commission: {}", min)))?;
        }

        Ok(config)
    }
}
