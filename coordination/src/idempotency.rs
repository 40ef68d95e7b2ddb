//! Two-phase idempotent admission
//!
//! `begin` claims a key with a pending marker before any side effect runs.
//! Exactly one caller is admitted; concurrent duplicates see `InFlight` and
//! retries after completion see `Done` with the recorded response. Callers
//! that fail before completing call `abandon` so the key frees immediately
//! instead of waiting out the pending TTL.

use crate::error::Result;
use crate::store::CoordinationStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const PENDING_PREFIX: &str = "pending:";
const DONE_PREFIX: &str = "done:";

/// Outcome of claiming an idempotency key
#[derive(Debug)]
pub enum Admission {
    /// This caller owns the key; the token authorizes complete/abandon
    Admitted(AdmissionToken),
    /// Another caller claimed the key and has not finished
    InFlight,
    /// A previous caller finished; the recorded response payload
    Done(String),
}

/// Claim on an idempotency key, consumed by complete or abandon
#[derive(Debug)]
pub struct AdmissionToken {
    key: String,
    marker: String,
}

impl AdmissionToken {
    /// Claimed key
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Replays completed operations instead of re-running them
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn CoordinationStore>,
    pending_ttl: Duration,
    done_ttl: Duration,
}

impl IdempotencyGuard {
    /// Create a guard with the given marker lifetimes
    pub fn new(store: Arc<dyn CoordinationStore>, pending_ttl: Duration, done_ttl: Duration) -> Self {
        Self {
            store,
            pending_ttl,
            done_ttl,
        }
    }

    /// Claim `key` before running the operation it protects
    pub async fn begin(&self, key: &str) -> Result<Admission> {
        let marker = format!("{}{}", PENDING_PREFIX, Uuid::new_v4());
        if self.store.set_if_absent(key, &marker, self.pending_ttl).await? {
            debug!(key, "idempotency key claimed");
            return Ok(Admission::Admitted(AdmissionToken {
                key: key.to_string(),
                marker,
            }));
        }

        match self.store.get(key).await? {
            Some(value) => match value.strip_prefix(DONE_PREFIX) {
                Some(response) => Ok(Admission::Done(response.to_string())),
                None => Ok(Admission::InFlight),
            },
            // Pending marker expired between the two reads; the next
            // attempt will be admitted
            None => Ok(Admission::InFlight),
        }
    }

    /// Record the response for replay. Overwrites the pending marker;
    /// only the admitted caller may complete.
    pub async fn complete(&self, token: AdmissionToken, response: &str) -> Result<()> {
        let value = format!("{}{}", DONE_PREFIX, response);
        self.store.put(&token.key, &value, self.done_ttl).await
    }

    /// Free the key after a failed attempt so a retry is admitted at once.
    /// Returns false when the pending marker already expired.
    pub async fn abandon(&self, token: AdmissionToken) -> Result<bool> {
        self.store.delete_if_value(&token.key, &token.marker).await
    }
}
