//! Configuration for coordination primitives

use serde::{Deserialize, Serialize};

/// Which store backs locks and idempotency records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process store, single-instance deployments and tests
    Memory,
    /// Redis, shared across worker instances
    Redis,
}

/// Coordination configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Store backend
    pub backend: BackendKind,

    /// Redis connection, used when backend is `redis`
    pub redis: RedisConfig,

    /// Lock settings
    pub lock: LockConfig,

    /// Idempotency settings
    pub idempotency: IdempotencyConfig,

    /// Rate gate settings
    pub rate: RateGateConfig,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            redis: RedisConfig::default(),
            lock: LockConfig::default(),
            idempotency: IdempotencyConfig::default(),
            rate: RateGateConfig::default(),
        }
    }
}

/// Redis connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

/// Lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Lock lease duration (seconds); a crashed holder frees the lock after this
    pub ttl_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { ttl_secs: 30 }
    }
}

/// Idempotency configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    /// How long an in-flight marker blocks duplicate callers (seconds)
    pub pending_ttl_secs: u64,

    /// How long completed responses are replayed (seconds)
    pub done_ttl_secs: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            pending_ttl_secs: 60,
            done_ttl_secs: 86_400,
        }
    }
}

/// Rate gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateGateConfig {
    /// Requests admitted per key per window
    pub max_requests: u32,

    /// Window length (seconds)
    pub window_secs: u64,

    /// Idle keys are dropped after this (seconds)
    pub idle_retention_secs: u64,

    /// Interval between sweeps of idle keys (seconds)
    pub sweep_interval_secs: u64,
}

impl Default for RateGateConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_secs: 60,
            idle_retention_secs: 600,
            sweep_interval_secs: 120,
        }
    }
}

impl CoordinationConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;
        let config: CoordinationConfig = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = CoordinationConfig::default();

        if let Ok(backend) = std::env::var("COORDINATION_BACKEND") {
            config.backend = match backend.as_str() {
                "memory" => BackendKind::Memory,
                "redis" => BackendKind::Redis,
                other => {
                    return Err(crate::Error::Config(format!(
                        "Unknown coordination backend: {}",
                        other
                    )))
                }
            };
        }

        if let Ok(url) = std::env::var("REDIS_URL") {
            config.redis.url = url;
        }

        if let Ok(ttl) = std::env::var("COORDINATION_LOCK_TTL_SECS") {
            config.lock.ttl_secs = ttl
                .parse()
                .map_err(|_| crate::Error::Config(format!("Bad lock TTL: {}", ttl)))?;
        }

        if let Ok(max) = std::env::var("COORDINATION_RATE_MAX_REQUESTS") {
            config.rate.max_requests = max
                .parse()
                .map_err(|_| crate::Error::Config(format!("Bad rate limit: {}", max)))?;
        }

        Ok(config)
    }
}
