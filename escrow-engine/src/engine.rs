//! Escrow release pass
//!
//! Scans payments sitting in escrow and releases the ones whose hold
//! window has elapsed. The scan itself runs without locks; every actual
//! release goes through the orchestrator, which re-checks eligibility
//! under the payment lock. Losing that race to another instance is
//! normal and counts as a skip, not a failure.

use crate::Result;
use chrono::{DateTime, Utc};
use orchestrator::PaymentOrchestrator;
use payment_core::{PaymentStatus, PaymentStore};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Outcome counts of one release pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleasePassReport {
    /// Payments released this pass
    pub released: usize,
    /// Candidates skipped: lock contention or lost eligibility races
    pub skipped: usize,
    /// Candidates that errored; left for the next pass or manual review
    pub failed: usize,
}

/// Runs release passes over the payment store
#[derive(Clone)]
pub struct EscrowEngine {
    orchestrator: Arc<PaymentOrchestrator>,
    store: Arc<PaymentStore>,
}

impl EscrowEngine {
    /// Engine over a shared orchestrator and store
    pub fn new(orchestrator: Arc<PaymentOrchestrator>, store: Arc<PaymentStore>) -> Self {
        Self {
            orchestrator,
            store,
        }
    }

    /// Release every payment whose hold window elapsed before `now`.
    ///
    /// Per-payment errors are counted and logged, never propagated; one
    /// stuck payment must not stall the rest of the batch.
    pub async fn run_release_pass(&self, now: DateTime<Utc>) -> Result<ReleasePassReport> {
        let mut report = ReleasePassReport::default();

        for payment_id in self.store.payments_with_status(PaymentStatus::InEscrow)? {
            match self.store.get_payment(payment_id) {
                Ok(payment) if payment.is_eligible_for_auto_release(now) => {}
                Ok(_) => continue,
                Err(e) => {
                    report.failed += 1;
                    error!(%payment_id, error = %e, "failed to load escrow candidate");
                    continue;
                }
            }

            self.release_one(payment_id, &mut report).await;
        }

        if report != ReleasePassReport::default() {
            info!(
                released = report.released,
                skipped = report.skipped,
                failed = report.failed,
                "escrow release pass finished"
            );
        }
        Ok(report)
    }

    async fn release_one(&self, payment_id: Uuid, report: &mut ReleasePassReport) {
        match self.orchestrator.release_escrow(payment_id).await {
            Ok(_) => report.released += 1,
            Err(orchestrator::Error::LockContention { .. }) => {
                report.skipped += 1;
                debug!(%payment_id, "release skipped, another instance holds the lock");
            }
            Err(orchestrator::Error::NotEligible(_)) => {
                // Eligibility changed between the scan and the lock
                report.skipped += 1;
                debug!(%payment_id, "release skipped, no longer eligible");
            }
            Err(e) => {
                report.failed += 1;
                error!(%payment_id, error = %e, "escrow release failed");
            }
        }
    }
}
