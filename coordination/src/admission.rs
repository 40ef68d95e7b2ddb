//! Fixed-window rate gate
//!
//! Counters live in process memory, one slot per key. A slot admits up to
//! `max_requests` calls per window and resets when the window rolls over.
//! Keys idle past the retention period are dropped by a background sweep.

use crate::config::RateGateConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of a rate check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Under the limit; proceed
    Admitted,
    /// Over the limit until the window rolls over
    Throttled {
        /// Time until the current window ends
        retry_after: Duration,
    },
}

struct WindowSlot {
    window_started: Instant,
    count: u32,
    last_seen: Instant,
}

/// Per-key fixed-window request limiter
pub struct RateGate {
    slots: Mutex<HashMap<String, WindowSlot>>,
    max_requests: u32,
    window: Duration,
    idle_retention: Duration,
}

impl RateGate {
    /// Create a gate admitting `max_requests` per key per `window`
    pub fn new(max_requests: u32, window: Duration, idle_retention: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            max_requests,
            window,
            idle_retention,
        }
    }

    /// Create a gate from configuration
    pub fn from_config(config: &RateGateConfig) -> Self {
        Self::new(
            config.max_requests,
            Duration::from_secs(config.window_secs),
            Duration::from_secs(config.idle_retention_secs),
        )
    }

    /// Check and count one request for `key`
    pub fn check(&self, key: &str) -> Decision {
        let now = Instant::now();
        let mut slots = self.slots.lock();

        let slot = slots.entry(key.to_string()).or_insert(WindowSlot {
            window_started: now,
            count: 0,
            last_seen: now,
        });

        if now.duration_since(slot.window_started) >= self.window {
            slot.window_started = now;
            slot.count = 0;
        }
        slot.last_seen = now;

        if slot.count < self.max_requests {
            slot.count += 1;
            Decision::Admitted
        } else {
            let elapsed = now.duration_since(slot.window_started);
            Decision::Throttled {
                retry_after: self.window.saturating_sub(elapsed),
            }
        }
    }

    /// Drop slots idle past the retention period. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| now.duration_since(slot.last_seen) < self.idle_retention);
        before - slots.len()
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.slots.lock().len()
    }

    /// Spawn a background task sweeping idle keys every `interval`
    pub fn start_sweeper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let removed = self.sweep();
                if removed > 0 {
                    debug!(removed, "rate gate swept idle keys");
                }
            }
        })
    }
}
