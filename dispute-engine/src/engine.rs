//! Dispute lifecycle operations
//!
//! Validates dispute requests against the payment and the existing dispute
//! record, then hands the payment-side transition to the orchestrator,
//! which commits payment and dispute in one atomic batch under the payment
//! lock. Evidence and review-state changes touch only the dispute record;
//! its version check rejects concurrent writers.

use crate::config::DisputeEngineConfig;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use orchestrator::PaymentOrchestrator;
use payment_core::{
    ActorRole, Dispute, DisputeCategory, DisputeStatus, Evidence, NewDispute, PaymentStatus,
    PaymentStore,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Inputs for raising a dispute; payment-derived fields are filled from
/// the stored payment
#[derive(Debug, Clone)]
pub struct OpenDisputeRequest {
    /// Disputed payment
    pub payment_id: Uuid,
    /// Party raising the dispute
    pub raised_by: Uuid,
    /// Role of the raiser; company or organizer
    pub raised_by_role: ActorRole,
    /// Why the dispute is raised
    pub reason: String,
    /// Dispute category
    pub category: DisputeCategory,
    /// Amount under dispute; the full payment amount when absent
    pub disputed_amount: Option<Decimal>,
}

/// Evidence submitted to an unresolved dispute
#[derive(Debug, Clone)]
pub struct NewEvidence {
    /// Submitting party
    pub submitted_by: Uuid,
    /// Role of the submitting party
    pub role: ActorRole,
    /// Free-form description
    pub description: String,
    /// Reference to an uploaded attachment, if any
    pub attachment_ref: Option<String>,
}

/// Admin decision on a dispute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisputeOutcome {
    /// Company prevails; the payment heads toward refund
    CompanyFavor,
    /// Organizer prevails; escrow releases
    OrganizerFavor,
}

/// Runs the dispute lifecycle over the payment store
#[derive(Clone)]
pub struct DisputeEngine {
    orchestrator: Arc<PaymentOrchestrator>,
    store: Arc<PaymentStore>,
    config: DisputeEngineConfig,
}

impl DisputeEngine {
    /// Engine over a shared orchestrator and store
    pub fn new(
        orchestrator: Arc<PaymentOrchestrator>,
        store: Arc<PaymentStore>,
        config: DisputeEngineConfig,
    ) -> Self {
        Self {
            orchestrator,
            store,
            config,
        }
    }

    /// Raise a dispute against an escrowed payment.
    ///
    /// One dispute per payment, ever. The raiser must be the paying
    /// company or the receiving organizer of that payment.
    pub async fn open_dispute(&self, request: OpenDisputeRequest) -> Result<Dispute> {
        if request.reason.trim().is_empty() {
            return Err(Error::Validation("dispute reason is required".to_string()));
        }

        let payment = self.store.get_payment(request.payment_id)?;
        if payment.status != PaymentStatus::InEscrow {
            return Err(Error::Validation(format!(
                "payment is {}, only escrowed payments can be disputed",
                payment.status
            )));
        }
        if self.store.dispute_for_payment(payment.id)?.is_some() {
            return Err(Error::Validation(
                "payment already has a dispute".to_string(),
            ));
        }

        let expected_party = match request.raised_by_role {
            ActorRole::Company => payment.company_id,
            ActorRole::Organizer => payment.organizer_id,
            _ => {
                return Err(Error::Validation(
                    "disputes are raised by the company or the organizer".to_string(),
                ))
            }
        };
        if request.raised_by != expected_party {
            return Err(Error::Validation(
                "raiser is not a party to this payment".to_string(),
            ));
        }

        let disputed_amount = request.disputed_amount.unwrap_or(payment.amount);
        if disputed_amount <= Decimal::ZERO || disputed_amount > payment.amount {
            return Err(Error::Validation(format!(
                "disputed amount {} must be positive and at most {}",
                disputed_amount, payment.amount
            )));
        }

        let auto_resolve_at =
            Utc::now() + chrono::Duration::days(i64::from(self.config.dispute_window_days));
        let mut dispute = Dispute::new(
            NewDispute {
                payment_id: payment.id,
                request_id: payment.request_id,
                raised_by: request.raised_by,
                raised_by_role: request.raised_by_role,
                company_id: payment.company_id,
                organizer_id: payment.organizer_id,
                reason: request.reason,
                category: request.category,
                disputed_amount,
            },
            auto_resolve_at,
        );
        self.orchestrator.open_dispute_txn(&mut dispute).await?;
        Ok(dispute)
    }

    /// Attach evidence to an unresolved dispute
    pub fn submit_evidence(&self, dispute_id: Uuid, evidence: NewEvidence) -> Result<Dispute> {
        if evidence.description.trim().is_empty() {
            return Err(Error::Validation(
                "evidence description is required".to_string(),
            ));
        }

        let mut dispute = self.store.get_dispute(dispute_id)?;
        if dispute.status.is_resolved() {
            return Err(Error::Validation(
                "dispute is resolved and immutable".to_string(),
            ));
        }
        if dispute.evidence.len() >= self.config.max_evidence_items {
            return Err(Error::Validation(format!(
                "evidence list is full at {} items",
                self.config.max_evidence_items
            )));
        }

        dispute.evidence.push(Evidence {
            submitted_by: evidence.submitted_by,
            role: evidence.role,
            description: evidence.description,
            attachment_ref: evidence.attachment_ref,
            submitted_at: Utc::now(),
        });
        self.store.commit_dispute(&mut dispute)?;

        debug!(%dispute_id, items = dispute.evidence.len(), "evidence submitted");
        Ok(dispute)
    }

    /// Take an open dispute into admin review; the payment is untouched
    pub fn mark_under_review(&self, dispute_id: Uuid, admin: Uuid) -> Result<Dispute> {
        let mut dispute = self.store.get_dispute(dispute_id)?;
        if dispute.status != DisputeStatus::Open {
            return Err(Error::Validation(format!(
                "dispute is {}, only open disputes move to review",
                dispute.status
            )));
        }

        dispute.status = DisputeStatus::UnderReview;
        self.store.commit_dispute(&mut dispute)?;

        info!(%dispute_id, %admin, "dispute under review");
        Ok(dispute)
    }

    /// Decide a dispute. Company favor routes the payment toward refund;
    /// organizer favor releases escrow.
    pub async fn resolve(
        &self,
        dispute_id: Uuid,
        outcome: DisputeOutcome,
        admin: Uuid,
        notes: Option<String>,
    ) -> Result<Dispute> {
        let mut dispute = self.store.get_dispute(dispute_id)?;
        if dispute.status.is_resolved() {
            return Err(Error::Validation(
                "dispute is already resolved".to_string(),
            ));
        }

        dispute.status = match outcome {
            DisputeOutcome::CompanyFavor => DisputeStatus::ResolvedCompanyFavor,
            DisputeOutcome::OrganizerFavor => DisputeStatus::ResolvedOrganizerFavor,
        };
        dispute.resolved_by = Some(admin);
        dispute.resolved_at = Some(Utc::now());
        dispute.resolution_notes = notes;

        self.orchestrator.resolve_dispute_txn(&mut dispute).await?;
        Ok(dispute)
    }

    /// Withdraw an open dispute; only the raiser may do this. The claim
    /// is abandoned, so escrow releases as if the dispute never happened.
    pub async fn cancel(&self, dispute_id: Uuid, caller: Uuid) -> Result<Dispute> {
        let mut dispute = self.store.get_dispute(dispute_id)?;
        if dispute.status != DisputeStatus::Open {
            return Err(Error::Validation(
                "only open disputes can be cancelled".to_string(),
            ));
        }
        if caller != dispute.raised_by {
            return Err(Error::Validation(
                "only the raiser may cancel a dispute".to_string(),
            ));
        }

        dispute.status = DisputeStatus::Cancelled;
        dispute.resolved_at = Some(Utc::now());

        self.orchestrator.resolve_dispute_txn(&mut dispute).await?;
        Ok(dispute)
    }

    /// Auto-resolve open disputes whose window elapsed before `now`.
    ///
    /// Silence favors the party holding the payout claim: the dispute
    /// resolves as if won by the organizer. Disputes under admin review
    /// are exempt. Returns the number resolved.
    pub async fn run_auto_resolve_pass(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut resolved = 0;

        for dispute_id in self.store.disputes_with_status(DisputeStatus::Open)? {
            let mut dispute = match self.store.get_dispute(dispute_id) {
                Ok(d) => d,
                Err(e) => {
                    error!(%dispute_id, error = %e, "failed to load dispute");
                    continue;
                }
            };
            if dispute.auto_resolve_at > now {
                continue;
            }

            dispute.status = DisputeStatus::AutoResolved;
            dispute.resolved_at = Some(now);
            dispute.resolution_notes =
                Some("auto-resolved after dispute window elapsed".to_string());

            match self.orchestrator.resolve_dispute_txn(&mut dispute).await {
                Ok(_) => resolved += 1,
                Err(orchestrator::Error::LockContention { .. }) => {
                    debug!(%dispute_id, "auto-resolve skipped, another instance holds the lock");
                }
                Err(orchestrator::Error::Core(payment_core::Error::VersionConflict {
                    ..
                })) => {
                    debug!(%dispute_id, "auto-resolve skipped, dispute changed concurrently");
                }
                Err(e) => {
                    error!(%dispute_id, error = %e, "auto-resolve failed");
                }
            }
        }

        if resolved > 0 {
            info!(resolved, "dispute auto-resolve pass finished");
        }
        Ok(resolved)
    }
}
