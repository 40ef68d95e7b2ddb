//! Recurring release schedule

use crate::engine::EscrowEngine;
use chrono::Utc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::warn;

/// Runs the release pass on a fixed interval
pub struct EscrowScheduler {
    engine: EscrowEngine,
    interval: Duration,
}

impl EscrowScheduler {
    /// Scheduler ticking every `interval`
    pub fn new(engine: EscrowEngine, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Spawn the schedule loop; the first pass runs immediately, which
    /// catches up on holds that elapsed while the worker was down
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = self.engine.run_release_pass(Utc::now()).await {
                    warn!(error = %e, "escrow release pass aborted");
                }
            }
        })
    }
}
