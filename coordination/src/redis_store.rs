//! Redis-backed coordination store
//!
//! Conditional create maps to `SET NX EX`; conditional delete runs a small
//! Lua script so the value check and the delete are a single atomic step.
//! The connection manager reconnects on its own, so each call clones it.

use crate::error::Result;
use crate::store::CoordinationStore;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;

const DELETE_IF_VALUE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Coordination store shared across worker instances through Redis
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    delete_if_value: Arc<redis::Script>,
}

impl RedisStore {
    /// Connect to Redis at `url`
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            delete_if_value: Arc::new(redis::Script::new(DELETE_IF_VALUE_SCRIPT)),
        })
    }

    /// Wrap an existing connection manager
    pub fn with_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            delete_if_value: Arc::new(redis::Script::new(DELETE_IF_VALUE_SCRIPT)),
        }
    }

    fn ttl_secs(ttl: Duration) -> u64 {
        // Redis rejects EX 0; everything below a second rounds up
        ttl.as_secs().max(1)
    }
}

#[async_trait]
impl CoordinationStore for RedisStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let created: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(Self::ttl_secs(ttl))
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(created.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = self.conn.clone().get(key).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let _: () = self
            .conn
            .clone()
            .set_ex(key, value, Self::ttl_secs(ttl))
            .await?;
        Ok(())
    }

    async fn delete_if_value(&self, key: &str, expected: &str) -> Result<bool> {
        let deleted: i64 = self
            .delete_if_value
            .key(key)
            .arg(expected)
            .invoke_async(&mut self.conn.clone())
            .await?;
        Ok(deleted == 1)
    }
}
