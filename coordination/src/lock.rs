//! Per-resource advisory locks
//!
//! A lock is a store entry whose value is the holder's owner token. Release
//! and refresh check the token, so a lock that expired and was re-acquired
//! by someone else cannot be freed by the old holder.

use crate::error::Result;
use crate::store::CoordinationStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Lock key naming
pub mod keys {
    use uuid::Uuid;

    /// Lock covering every state change of one payment
    pub fn payment_lock(payment_id: Uuid) -> String {
        format!("lock:payment:{}", payment_id)
    }

    /// Lock covering dispute mutations
    pub fn dispute_lock(dispute_id: Uuid) -> String {
        format!("lock:dispute:{}", dispute_id)
    }
}

/// Proof of lock ownership, consumed on release
#[derive(Debug)]
pub struct LockGuard {
    key: String,
    owner: String,
}

impl LockGuard {
    /// Locked key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Owner token held in the store
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

/// Acquires and releases per-resource locks with a lease TTL
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn CoordinationStore>,
    ttl: Duration,
}

impl LockManager {
    /// Create a manager leasing locks for `ttl`
    pub fn new(store: Arc<dyn CoordinationStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Try to take the lock. Returns None when another holder has it.
    pub async fn try_acquire(&self, key: &str) -> Result<Option<LockGuard>> {
        let owner = Uuid::new_v4().to_string();
        if self.store.set_if_absent(key, &owner, self.ttl).await? {
            debug!(key, "lock acquired");
            Ok(Some(LockGuard {
                key: key.to_string(),
                owner,
            }))
        } else {
            debug!(key, "lock contended");
            Ok(None)
        }
    }

    /// Release the lock. Returns false when the lease already expired
    /// and someone else holds the key.
    pub async fn release(&self, guard: LockGuard) -> Result<bool> {
        let released = self
            .store
            .delete_if_value(&guard.key, &guard.owner)
            .await?;
        if !released {
            debug!(key = %guard.key, "lock lease expired before release");
        }
        Ok(released)
    }

    /// Refresh the lease for a long-running holder. Returns false when
    /// the lock was lost; the caller must stop mutating the resource.
    pub async fn extend(&self, guard: &LockGuard) -> Result<bool> {
        match self.store.get(&guard.key).await? {
            Some(current) if current == guard.owner => {
                self.store.put(&guard.key, &guard.owner, self.ttl).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
