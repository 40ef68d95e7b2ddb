//! Key-value store behind locks and idempotency records
//!
//! Four primitives are enough for every coordination pattern in this
//! workspace: conditional create, read, overwrite, and conditional delete.
//! All values carry a TTL so crashed holders cannot wedge a key forever.

use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Storage primitives shared by lock and idempotency layers
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Store `value` under `key` only when the key is absent.
    /// Returns true when this call created the entry.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Read the current value, if any
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` unconditionally, replacing any previous value
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Delete `key` only when it still holds `expected`.
    /// Returns true when the entry was deleted.
    async fn delete_if_value(&self, key: &str, expected: &str) -> Result<bool>;
}

struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process store for single-instance deployments and tests
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, StoredValue>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|v| !v.is_expired(now))
            .count()
    }

    /// True when no live entries remain
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        // An expired entry counts as absent
        if let Some(existing) = entries.get(key) {
            if !existing.is_expired(now) {
                return Ok(false);
            }
        }

        entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.get(key) {
            Some(existing) if existing.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(existing) => Ok(Some(existing.value.clone())),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        self.entries.lock().insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete_if_value(&self, key: &str, expected: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.get(key) {
            Some(existing) if existing.is_expired(now) => {
                entries.remove(key);
                Ok(false)
            }
            Some(existing) if existing.value == expected => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent_wins_once() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(10);

        assert!(store.set_if_absent("k", "first", ttl).await.unwrap());
        assert!(!store.set_if_absent("k", "second", ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("first".to_string()));
    }

    #[tokio::test]
    async fn test_expired_entry_counts_as_absent() {
        let store = MemoryStore::new();

        assert!(store
            .set_if_absent("k", "old", Duration::from_millis(20))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store
            .set_if_absent("k", "new", Duration::from_secs(10))
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("new".to_string()));
    }

    #[tokio::test]
    async fn test_delete_if_value_checks_value() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(10);

        store.put("k", "mine", ttl).await.unwrap();
        assert!(!store.delete_if_value("k", "theirs").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("mine".to_string()));

        assert!(store.delete_if_value("k", "mine").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(10);

        store.put("k", "v1", ttl).await.unwrap();
        store.put("k", "v2", ttl).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v2".to_string()));
        assert_eq!(store.len(), 1);
    }
}
