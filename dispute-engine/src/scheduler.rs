//! Recurring auto-resolve schedule

use crate::engine::DisputeEngine;
use chrono::Utc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::warn;

/// Runs the auto-resolve pass on a fixed interval
pub struct DisputeScheduler {
    engine: DisputeEngine,
    interval: Duration,
}

impl DisputeScheduler {
    /// Scheduler ticking every `interval`
    pub fn new(engine: DisputeEngine, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Spawn the schedule loop; the first pass runs immediately so
    /// disputes that timed out while the worker was down resolve promptly
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = self.engine.run_auto_resolve_pass(Utc::now()).await {
                    warn!(error = %e, "dispute auto-resolve pass aborted");
                }
            }
        })
    }
}
