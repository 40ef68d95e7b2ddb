//! Metrics collection for observability
//!
//! Prometheus metrics for the payment lifecycle.
//!
//! # Metrics
//!
//! - `payments_created_total` - Payments created
//! - `payment_transitions_total` - Applied transitions, labeled from/to
//! - `payment_transition_rejections_total` - Transitions rejected by the table
//! - `ledger_entries_total` - Ledger entries written, labeled by type
//! - `escrow_releases_total` - Escrow releases (auto and dispute-driven)
//! - `refunds_total` - Refunds executed
//! - `disputes_opened_total` / `disputes_auto_resolved_total`
//! - `commit_duration_seconds` - Storage commit latencies
//!
//! Everything registers into the collector's own [`Registry`] so multiple
//! instances can coexist in one process.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Payments created
    pub payments_created_total: IntCounter,

    /// Applied transitions, labeled by from/to status
    pub transitions_total: IntCounterVec,

    /// Transitions rejected by the table
    pub transition_rejections_total: IntCounter,

    /// Ledger entries written, labeled by entry type
    pub ledger_entries_total: IntCounterVec,

    /// Escrow releases
    pub escrow_releases_total: IntCounter,

    /// Refunds executed
    pub refunds_total: IntCounter,

    /// Disputes opened
    pub disputes_opened_total: IntCounter,

    /// Disputes closed by the auto-resolve pass
    pub disputes_auto_resolved_total: IntCounter,

    /// Storage commit latencies
    pub commit_duration: Histogram,

    /// Prometheus registry holding everything above
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create a collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let payments_created_total = IntCounter::with_opts(Opts::new(
            "payments_created_total",
            "Payments created",
        ))?;
        registry.register(Box::new(payments_created_total.clone()))?;

        let transitions_total = IntCounterVec::new(
            Opts::new("payment_transitions_total", "Applied status transitions"),
            &["from", "to"],
        )?;
        registry.register(Box::new(transitions_total.clone()))?;

        let transition_rejections_total = IntCounter::with_opts(Opts::new(
            "payment_transition_rejections_total",
            "Transitions rejected by the state machine",
        ))?;
        registry.register(Box::new(transition_rejections_total.clone()))?;

        let ledger_entries_total = IntCounterVec::new(
            Opts::new("ledger_entries_total", "Ledger entries written"),
            &["entry_type"],
        )?;
        registry.register(Box::new(ledger_entries_total.clone()))?;

        let escrow_releases_total = IntCounter::with_opts(Opts::new(
            "escrow_releases_total",
            "Escrow releases, auto and dispute-driven",
        ))?;
        registry.register(Box::new(escrow_releases_total.clone()))?;

        let refunds_total = IntCounter::with_opts(Opts::new(
            "refunds_total",
            "Refunds executed against the gateway",
        ))?;
        registry.register(Box::new(refunds_total.clone()))?;

        let disputes_opened_total = IntCounter::with_opts(Opts::new(
            "disputes_opened_total",
            "Disputes opened",
        ))?;
        registry.register(Box::new(disputes_opened_total.clone()))?;

        let disputes_auto_resolved_total = IntCounter::with_opts(Opts::new(
            "disputes_auto_resolved_total",
            "Disputes closed by the auto-resolve pass",
        ))?;
        registry.register(Box::new(disputes_auto_resolved_total.clone()))?;

        let commit_duration = Histogram::with_opts(
            HistogramOpts::new("commit_duration_seconds", "Storage commit latencies").buckets(
                vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0],
            ),
        )?;
        registry.register(Box::new(commit_duration.clone()))?;

        Ok(Self {
            payments_created_total,
            transitions_total,
            transition_rejections_total,
            ledger_entries_total,
            escrow_releases_total,
            refunds_total,
            disputes_opened_total,
            disputes_auto_resolved_total,
            commit_duration,
            registry,
        })
    }

    /// Record one applied transition
    pub fn record_transition(&self, from: &str, to: &str) {
        self.transitions_total.with_label_values(&[from, to]).inc();
    }

    /// Record written ledger entries
    pub fn record_entries(&self, entries: &[crate::types::Transaction]) {
        for entry in entries {
            self.ledger_entries_total
                .with_label_values(&[entry.entry_type.as_str()])
                .inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_collectors_in_one_process() {
        // Each collector owns its registry, so this must not collide
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();

        a.payments_created_total.inc();
        a.record_transition("CREATED", "AUTHORIZED");
        assert_eq!(a.payments_created_total.get(), 1);
        assert_eq!(b.payments_created_total.get(), 0);
    }

    #[test]
    fn test_gather_exposes_families() {
        let metrics = Metrics::new().unwrap();
        metrics.escrow_releases_total.inc();

        let families = metrics.registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "escrow_releases_total"));
    }
}
