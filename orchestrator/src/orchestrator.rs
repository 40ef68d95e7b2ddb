//! Payment orchestrator
//!
//! The façade every external trigger goes through: API calls, gateway
//! webhooks, and the scheduled engines. Each mutating operation runs the
//! same shape: claim an idempotency key or the per-payment lock, load the
//! payment, apply state-machine transitions in memory, persist the payment
//! and its ledger entries in one atomic batch, release the claim. A
//! duplicate operation gets the recorded result instead of re-executing.

use crate::config::{CommissionReversalPolicy, OrchestratorConfig};
use crate::error::{Error, Result};
use crate::gateway::PaymentGateway;
use chrono::Utc;
use coordination::{keys, Admission, AdmissionToken, IdempotencyGuard, LockGuard, LockManager};
use payment_core::{
    commission, ActorRole, ChangeContext, Currency, Dispute, DisputeStatus, EntryDraft, EntryType,
    LedgerWriter, Metrics, NewPayment, Payment, PaymentSnapshot, PaymentStatus, PaymentStore,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const GATEWAY_ACTOR: &str = "gateway";
const ESCROW_ENGINE_ACTOR: &str = "escrow-engine";
const DISPUTE_ENGINE_ACTOR: &str = "dispute-engine";
const SETTLEMENT_ACTOR: &str = "settlement-recorder";

fn order_guard_key(idempotency_key: &str) -> String {
    format!("order:{}", idempotency_key)
}

fn webhook_guard_key(event_id: &str) -> String {
    format!("webhook:{}", event_id)
}

/// Inputs for creating a payment order
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    /// Sponsorship request being funded
    pub request_id: Uuid,
    /// Paying company
    pub company_id: Uuid,
    /// Receiving organizer
    pub organizer_id: Uuid,
    /// Gross amount
    pub amount: Decimal,
    /// Currency
    pub currency: Currency,
    /// Commission rate in percent; the configured default applies when absent
    pub commission_rate_percent: Option<Decimal>,
    /// Caller-supplied idempotency key, unique per funding attempt
    pub idempotency_key: String,
}

/// What a gateway webhook reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookKind {
    /// Payer authorized the charge
    Authorized,
    /// Charge captured; funds are with the gateway
    Captured,
    /// Charge failed
    Failed,
    /// A refund finished on the gateway side
    RefundProcessed,
}

/// A gateway webhook, already parsed by the transport layer
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// Gateway-unique event id; processing is idempotent per id
    pub event_id: String,
    /// Event kind
    pub kind: WebhookKind,
    /// Gateway order reference, resolves the payment
    pub order_ref: String,
    /// Gateway payment reference, when the event carries one
    pub payment_ref: Option<String>,
    /// Movement amount; refund events carry it
    pub amount: Option<Decimal>,
    /// Failure or refund reason
    pub reason: Option<String>,
    /// Gateway refund reference, refund events only
    pub refund_ref: Option<String>,
}

/// Sequences idempotency, locking, transitions, and ledger writes
pub struct PaymentOrchestrator {
    store: Arc<PaymentStore>,
    ledger: LedgerWriter,
    locks: LockManager,
    guard: IdempotencyGuard,
    gateway: Arc<dyn PaymentGateway>,
    metrics: Arc<Metrics>,
    config: OrchestratorConfig,
}

impl PaymentOrchestrator {
    /// Wire up an orchestrator over shared stores and a gateway
    pub fn new(
        store: Arc<PaymentStore>,
        locks: LockManager,
        guard: IdempotencyGuard,
        gateway: Arc<dyn PaymentGateway>,
        metrics: Arc<Metrics>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            ledger: LedgerWriter::new(store.clone()),
            store,
            locks,
            guard,
            gateway,
            metrics,
            config,
        }
    }

    /// Read-only snapshot of a payment
    pub fn snapshot(&self, payment_id: Uuid) -> Result<PaymentSnapshot> {
        Ok(PaymentSnapshot::from(&self.store.get_payment(payment_id)?))
    }

    /// Register an order with the gateway and persist the CREATED payment.
    ///
    /// The idempotency key is claimed before the gateway sees the order, so
    /// a duplicate submission can never register two gateway orders. A
    /// repeat call with the same key returns the recorded snapshot.
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<PaymentSnapshot> {
        if request.amount <= Decimal::ZERO {
            return Err(Error::Validation("amount must be positive".to_string()));
        }
        if request.amount < self.config.minimum_commission {
            return Err(Error::Validation(format!(
                "amount {} is below the commission floor {}",
                request.amount, self.config.minimum_commission
            )));
        }
        if request.idempotency_key.trim().is_empty() {
            return Err(Error::Validation("idempotency key is required".to_string()));
        }
        let rate_percent = request
            .commission_rate_percent
            .unwrap_or(self.config.default_commission_rate_percent);
        let rate = commission::rate_fraction(rate_percent)?;

        let guard_key = order_guard_key(&request.idempotency_key);
        let token = match self.guard.begin(&guard_key).await? {
            Admission::Admitted(token) => token,
            Admission::InFlight => return Err(Error::OperationInFlight { key: guard_key }),
            Admission::Done(recorded) => {
                debug!(key = %guard_key, "order creation replayed from recorded result");
                return Ok(serde_json::from_str(&recorded)?);
            }
        };

        match self.create_order_admitted(&request, rate).await {
            Ok(snapshot) => {
                self.record_result(token, &snapshot).await;
                Ok(snapshot)
            }
            Err(e) => {
                self.abandon_quietly(token).await;
                Err(e)
            }
        }
    }

    async fn create_order_admitted(
        &self,
        request: &CreateOrderRequest,
        commission_rate: Decimal,
    ) -> Result<PaymentSnapshot> {
        let order = self
            .gateway
            .create_order(
                request.amount,
                request.currency,
                &request.request_id.to_string(),
            )
            .await?;

        let mut payment = Payment::new(NewPayment {
            request_id: request.request_id,
            company_id: request.company_id,
            organizer_id: request.organizer_id,
            amount: request.amount,
            currency: request.currency,
            commission_rate,
            idempotency_key: request.idempotency_key.clone(),
        });
        payment.gateway_order_ref = Some(order.order_ref.clone());

        self.ledger.commit(&mut payment, Vec::new())?;
        self.metrics.payments_created_total.inc();

        info!(
            payment_id = %payment.id,
            order_ref = %order.order_ref,
            amount = %payment.amount,
            "payment created"
        );
        Ok(PaymentSnapshot::from(&payment))
    }

    /// Secondary check after a client callback; the webhook remains the
    /// source of truth. An invalid signature mutates nothing.
    pub async fn verify_payment(
        &self,
        payment_id: Uuid,
        payment_ref: &str,
        signature: &str,
    ) -> Result<PaymentSnapshot> {
        let order_ref = self
            .store
            .get_payment(payment_id)?
            .gateway_order_ref
            .ok_or_else(|| Error::Validation("payment has no gateway order".to_string()))?;

        if !self
            .gateway
            .verify_signature(&order_ref, payment_ref, signature)
            .await?
        {
            warn!(%payment_id, "rejected client callback with bad signature");
            return Err(Error::InvalidSignature);
        }

        let guard = self.lock_payment(payment_id).await?;
        let result = self.verify_payment_locked(payment_id, payment_ref);
        self.unlock_quietly(guard).await;
        result
    }

    fn verify_payment_locked(
        &self,
        payment_id: Uuid,
        payment_ref: &str,
    ) -> Result<PaymentSnapshot> {
        let mut payment = self.store.get_payment(payment_id)?;

        if payment.status != PaymentStatus::Created {
            // The webhook already advanced this payment; nothing to add
            return Ok(PaymentSnapshot::from(&payment));
        }

        let mark = payment.status_history.len();
        payment.gateway_payment_ref = Some(payment_ref.to_string());
        let ctx = ChangeContext::new(payment.company_id.to_string(), ActorRole::Company)
            .with_reason("client callback signature verified");
        payment.apply_transition(PaymentStatus::Authorized, &ctx)?;
        self.ledger.commit(&mut payment, Vec::new())?;
        self.note_history(&payment, mark);

        info!(%payment_id, payment_ref, "payment authorized via client callback");
        Ok(PaymentSnapshot::from(&payment))
    }

    /// Apply a gateway webhook, the primary source of truth.
    ///
    /// Idempotent per event id. Stale events (a kind the payment has
    /// already moved past) are acknowledged without mutation so the
    /// gateway stops redelivering them.
    pub async fn process_webhook(&self, event: WebhookEvent) -> Result<PaymentSnapshot> {
        let guard_key = webhook_guard_key(&event.event_id);
        let token = match self.guard.begin(&guard_key).await? {
            Admission::Admitted(token) => token,
            Admission::InFlight => return Err(Error::OperationInFlight { key: guard_key }),
            Admission::Done(recorded) => {
                debug!(event_id = %event.event_id, "webhook replayed from recorded result");
                return Ok(serde_json::from_str(&recorded)?);
            }
        };

        match self.process_webhook_admitted(&event).await {
            Ok(snapshot) => {
                self.record_result(token, &snapshot).await;
                Ok(snapshot)
            }
            Err(e) => {
                self.abandon_quietly(token).await;
                Err(e)
            }
        }
    }

    async fn process_webhook_admitted(&self, event: &WebhookEvent) -> Result<PaymentSnapshot> {
        let payment_id = self
            .store
            .payment_by_order_ref(&event.order_ref)?
            .ok_or_else(|| {
                Error::Validation(format!("no payment for gateway order {}", event.order_ref))
            })?;

        let guard = self.lock_payment(payment_id).await?;
        let result = self.apply_webhook_locked(payment_id, event);
        self.unlock_quietly(guard).await;
        result
    }

    fn apply_webhook_locked(&self, payment_id: Uuid, event: &WebhookEvent) -> Result<PaymentSnapshot> {
        let mut payment = self.store.get_payment(payment_id)?;

        match event.kind {
            WebhookKind::Authorized => self.webhook_authorized(&mut payment, event),
            WebhookKind::Captured => self.webhook_captured(&mut payment, event),
            WebhookKind::Failed => self.webhook_failed(&mut payment, event),
            WebhookKind::RefundProcessed => self.webhook_refund_processed(&mut payment, event),
        }
    }

    fn webhook_authorized(
        &self,
        payment: &mut Payment,
        event: &WebhookEvent,
    ) -> Result<PaymentSnapshot> {
        if payment.status != PaymentStatus::Created {
            debug!(payment_id = %payment.id, status = %payment.status, "authorization webhook is stale");
            return Ok(PaymentSnapshot::from(&*payment));
        }

        let mark = payment.status_history.len();
        if payment.gateway_payment_ref.is_none() {
            payment.gateway_payment_ref = event.payment_ref.clone();
        }
        payment.apply_transition(PaymentStatus::Authorized, &webhook_ctx(event))?;
        self.ledger.commit(payment, Vec::new())?;
        self.note_history(payment, mark);

        info!(payment_id = %payment.id, "payment authorized");
        Ok(PaymentSnapshot::from(&*payment))
    }

    fn webhook_captured(
        &self,
        payment: &mut Payment,
        event: &WebhookEvent,
    ) -> Result<PaymentSnapshot> {
        if !matches!(
            payment.status,
            PaymentStatus::Created | PaymentStatus::Authorized
        ) {
            debug!(payment_id = %payment.id, status = %payment.status, "capture webhook is stale");
            return Ok(PaymentSnapshot::from(&*payment));
        }

        let mark = payment.status_history.len();
        let ctx = webhook_ctx(event);
        if payment.gateway_payment_ref.is_none() {
            payment.gateway_payment_ref = event.payment_ref.clone();
        }
        // Some gateways deliver capture before (or instead of) the
        // authorization event
        if payment.status == PaymentStatus::Created {
            payment.apply_transition(PaymentStatus::Authorized, &ctx)?;
        }
        payment.apply_transition(PaymentStatus::Captured, &ctx)?;

        let split = commission::compute(
            payment.amount,
            payment.commission_rate,
            self.config.minimum_commission,
        )?;
        payment.set_commission(split.platform_commission, split.organizer_payout);
        payment.enter_escrow(self.config.escrow_hold_days, &ctx)?;

        let mut capture = EntryDraft::new(EntryType::Capture, payment.amount);
        if let Some(payment_ref) = &payment.gateway_payment_ref {
            capture = capture.with_external_ref(payment_ref.clone());
        }
        let drafts = vec![
            capture,
            EntryDraft::new(EntryType::EscrowHold, payment.amount)
                .with_escrow_delta(payment.amount),
            EntryDraft::new(EntryType::CommissionDeduction, split.platform_commission)
                .with_escrow_delta(-split.platform_commission),
        ];
        let entries = self.ledger.commit(payment, drafts)?;
        self.metrics.record_entries(&entries);
        self.note_history(payment, mark);

        info!(
            payment_id = %payment.id,
            amount = %payment.amount,
            commission = %split.platform_commission,
            "payment captured into escrow"
        );
        Ok(PaymentSnapshot::from(&*payment))
    }

    fn webhook_failed(
        &self,
        payment: &mut Payment,
        event: &WebhookEvent,
    ) -> Result<PaymentSnapshot> {
        if !payment_core::can_transition(payment.status, PaymentStatus::Failed) {
            warn!(
                payment_id = %payment.id,
                status = %payment.status,
                "failure webhook ignored in current status"
            );
            return Ok(PaymentSnapshot::from(&*payment));
        }

        let mark = payment.status_history.len();
        let reason = event
            .reason
            .clone()
            .unwrap_or_else(|| "gateway reported failure".to_string());
        let ctx = ChangeContext::new(GATEWAY_ACTOR, ActorRole::System).with_reason(reason);
        payment.apply_transition(PaymentStatus::Failed, &ctx)?;
        self.ledger.commit(payment, Vec::new())?;
        self.note_history(payment, mark);

        info!(payment_id = %payment.id, "payment failed");
        Ok(PaymentSnapshot::from(&*payment))
    }

    // Completes a refund that initiate_refund parked in REFUND_REQUESTED but
    // could not finish, e.g. a crash between the gateway call and the commit.
    fn webhook_refund_processed(
        &self,
        payment: &mut Payment,
        event: &WebhookEvent,
    ) -> Result<PaymentSnapshot> {
        if payment.status != PaymentStatus::RefundRequested {
            debug!(payment_id = %payment.id, "refund webhook arrived after local completion");
            return Ok(PaymentSnapshot::from(&*payment));
        }

        let amount = event
            .amount
            .ok_or_else(|| Error::Validation("refund webhook missing amount".to_string()))?;
        if amount <= Decimal::ZERO {
            return Err(Error::Validation("refund amount must be positive".to_string()));
        }
        let refundable = payment.refundable_amount();
        if amount > refundable {
            return Err(Error::OverRefund {
                requested: amount,
                refundable,
            });
        }

        let mark = payment.status_history.len();
        let ctx = webhook_ctx(event);
        let drafts = self.refund_completion(payment, amount, event.refund_ref.clone(), &ctx)?;
        let entries = self.ledger.commit(payment, drafts)?;
        self.metrics.record_entries(&entries);
        self.metrics.refunds_total.inc();
        self.note_history(payment, mark);

        info!(payment_id = %payment.id, %amount, "refund completed from webhook");
        Ok(PaymentSnapshot::from(&*payment))
    }

    /// Auto-release a payment whose hold window elapsed.
    ///
    /// Eligibility is re-checked under the lock, and the attempt flag is
    /// persisted before the release itself: a failure past that point takes
    /// the payment out of the scheduler's reach for manual follow-up rather
    /// than being retried blindly.
    pub async fn release_escrow(&self, payment_id: Uuid) -> Result<PaymentSnapshot> {
        let guard = self.lock_payment(payment_id).await?;
        let result = self.release_escrow_locked(payment_id);
        self.unlock_quietly(guard).await;
        result
    }

    fn release_escrow_locked(&self, payment_id: Uuid) -> Result<PaymentSnapshot> {
        let mut payment = self.store.get_payment(payment_id)?;
        if !payment.is_eligible_for_auto_release(Utc::now()) {
            return Err(Error::NotEligible(payment_id));
        }

        payment.mark_auto_release_attempted()?;
        self.ledger.commit(&mut payment, Vec::new())?;

        let mark = payment.status_history.len();
        let ctx = ChangeContext::new(ESCROW_ENGINE_ACTOR, ActorRole::System)
            .with_reason("escrow hold window elapsed");
        payment.apply_transition(PaymentStatus::Released, &ctx)?;

        let entries = self
            .ledger
            .commit(&mut payment, release_drafts(&payment))?;
        self.metrics.record_entries(&entries);
        self.metrics.escrow_releases_total.inc();
        self.note_history(&payment, mark);

        info!(%payment_id, payout = %payment.organizer_payout, "escrow released");
        Ok(PaymentSnapshot::from(&payment))
    }

    /// Record that the released payout reached the organizer's account
    pub async fn record_settlement(
        &self,
        payment_id: Uuid,
        external_ref: Option<String>,
    ) -> Result<PaymentSnapshot> {
        let guard = self.lock_payment(payment_id).await?;
        let result = self.record_settlement_locked(payment_id, external_ref);
        self.unlock_quietly(guard).await;
        result
    }

    fn record_settlement_locked(
        &self,
        payment_id: Uuid,
        external_ref: Option<String>,
    ) -> Result<PaymentSnapshot> {
        let mut payment = self.store.get_payment(payment_id)?;

        let mark = payment.status_history.len();
        let ctx = ChangeContext::new(SETTLEMENT_ACTOR, ActorRole::System)
            .with_reason("payout settled to organizer account");
        payment.apply_transition(PaymentStatus::Settled, &ctx)?;

        let drafts = if payment.organizer_payout > Decimal::ZERO {
            let mut draft = EntryDraft::new(EntryType::Settlement, payment.organizer_payout);
            if let Some(external_ref) = external_ref {
                draft = draft.with_external_ref(external_ref);
            }
            vec![draft]
        } else {
            Vec::new()
        };
        let entries = self.ledger.commit(&mut payment, drafts)?;
        self.metrics.record_entries(&entries);
        self.note_history(&payment, mark);

        info!(%payment_id, "settlement recorded");
        Ok(PaymentSnapshot::from(&payment))
    }

    /// Refund a payment, fully when `amount` is absent.
    ///
    /// The payment is parked in REFUND_REQUESTED before the gateway call;
    /// if the gateway fails, a retry resumes from there, and a gateway
    /// refund webhook can complete it independently.
    pub async fn initiate_refund(
        &self,
        payment_id: Uuid,
        amount: Option<Decimal>,
        actor: &str,
        actor_role: ActorRole,
    ) -> Result<PaymentSnapshot> {
        let guard = self.lock_payment(payment_id).await?;
        let result = self
            .initiate_refund_locked(payment_id, amount, actor, actor_role)
            .await;
        self.unlock_quietly(guard).await;
        result
    }

    async fn initiate_refund_locked(
        &self,
        payment_id: Uuid,
        amount: Option<Decimal>,
        actor: &str,
        actor_role: ActorRole,
    ) -> Result<PaymentSnapshot> {
        let mut payment = self.store.get_payment(payment_id)?;

        let refundable = payment.refundable_amount();
        let requested = amount.unwrap_or(refundable);
        if requested <= Decimal::ZERO {
            return Err(Error::Validation("nothing left to refund".to_string()));
        }
        if requested > refundable {
            return Err(Error::OverRefund {
                requested,
                refundable,
            });
        }
        let payment_ref = payment
            .gateway_payment_ref
            .clone()
            .ok_or_else(|| Error::Validation("payment has no gateway payment reference".to_string()))?;

        let ctx = ChangeContext::new(actor, actor_role).with_reason("refund requested");
        if payment.status != PaymentStatus::RefundRequested {
            let mark = payment.status_history.len();
            payment.apply_transition(PaymentStatus::RefundRequested, &ctx)?;
            self.ledger.commit(&mut payment, Vec::new())?;
            self.note_history(&payment, mark);
        }

        let refund = self.gateway.execute_refund(&payment_ref, requested).await?;

        let mark = payment.status_history.len();
        let drafts =
            self.refund_completion(&mut payment, requested, Some(refund.refund_ref), &ctx)?;
        let entries = self.ledger.commit(&mut payment, drafts)?;
        self.metrics.record_entries(&entries);
        self.metrics.refunds_total.inc();
        self.note_history(&payment, mark);

        info!(
            %payment_id,
            amount = %requested,
            status = %payment.status,
            "refund processed"
        );
        Ok(PaymentSnapshot::from(&payment))
    }

    /// Cancel an order the payer never completed
    pub async fn cancel_order(
        &self,
        payment_id: Uuid,
        actor: &str,
        actor_role: ActorRole,
        reason: Option<String>,
    ) -> Result<PaymentSnapshot> {
        let guard = self.lock_payment(payment_id).await?;
        let result = self.finish_unpaid_order(
            payment_id,
            PaymentStatus::Cancelled,
            ChangeContext::new(actor, actor_role)
                .with_reason(reason.unwrap_or_else(|| "order cancelled".to_string())),
        );
        self.unlock_quietly(guard).await;
        result
    }

    /// Expire an order that sat unpaid past its window
    pub async fn expire_order(&self, payment_id: Uuid) -> Result<PaymentSnapshot> {
        let guard = self.lock_payment(payment_id).await?;
        let result = self.finish_unpaid_order(
            payment_id,
            PaymentStatus::Expired,
            ChangeContext::new("order-expiry", ActorRole::System)
                .with_reason("order expired unpaid"),
        );
        self.unlock_quietly(guard).await;
        result
    }

    fn finish_unpaid_order(
        &self,
        payment_id: Uuid,
        to: PaymentStatus,
        ctx: ChangeContext,
    ) -> Result<PaymentSnapshot> {
        let mut payment = self.store.get_payment(payment_id)?;
        let mark = payment.status_history.len();
        payment.apply_transition(to, &ctx)?;
        self.ledger.commit(&mut payment, Vec::new())?;
        self.note_history(&payment, mark);

        info!(%payment_id, status = %payment.status, "order closed unpaid");
        Ok(PaymentSnapshot::from(&payment))
    }

    /// Move the payment into DISPUTE_OPEN and persist the dispute record
    /// atomically with it. The dispute engine validates the dispute itself;
    /// this enforces the payment-side rules under the payment lock.
    pub async fn open_dispute_txn(&self, dispute: &mut Dispute) -> Result<PaymentSnapshot> {
        let guard = self.lock_payment(dispute.payment_id).await?;
        let result = self.open_dispute_locked(dispute);
        self.unlock_quietly(guard).await;
        result
    }

    fn open_dispute_locked(&self, dispute: &mut Dispute) -> Result<PaymentSnapshot> {
        let mut payment = self.store.get_payment(dispute.payment_id)?;

        let mark = payment.status_history.len();
        let ctx = ChangeContext::new(dispute.raised_by.to_string(), dispute.raised_by_role)
            .with_reason(dispute.reason.clone());
        payment.apply_transition(PaymentStatus::DisputeOpen, &ctx)?;

        let drafts = vec![
            EntryDraft::new(EntryType::DisputeAdjustment, dispute.disputed_amount)
                .with_metadata("dispute_id", dispute.id.to_string()),
        ];
        let entries = self.ledger.commit_with_dispute(&mut payment, dispute, drafts)?;
        self.metrics.record_entries(&entries);
        self.metrics.disputes_opened_total.inc();
        self.note_history(&payment, mark);

        info!(
            payment_id = %payment.id,
            dispute_id = %dispute.id,
            "dispute opened; escrow release blocked"
        );
        Ok(PaymentSnapshot::from(&payment))
    }

    /// Apply the payment-side effect of a resolved dispute, atomically with
    /// the dispute record. The dispute arrives already carrying its final
    /// status and resolution fields.
    pub async fn resolve_dispute_txn(&self, dispute: &mut Dispute) -> Result<PaymentSnapshot> {
        let guard = self.lock_payment(dispute.payment_id).await?;
        let result = self.resolve_dispute_locked(dispute);
        self.unlock_quietly(guard).await;
        result
    }

    fn resolve_dispute_locked(&self, dispute: &mut Dispute) -> Result<PaymentSnapshot> {
        let mut payment = self.store.get_payment(dispute.payment_id)?;
        let mark = payment.status_history.len();

        let drafts = match dispute.status {
            DisputeStatus::ResolvedCompanyFavor => {
                let ctx = resolution_ctx(dispute, "dispute resolved in company favor");
                payment.apply_transition(PaymentStatus::DisputeLost, &ctx)?;
                Vec::new()
            }
            DisputeStatus::ResolvedOrganizerFavor => {
                let ctx = resolution_ctx(dispute, "dispute resolved in organizer favor");
                win_and_release(&mut payment, &ctx)?
            }
            DisputeStatus::AutoResolved => {
                let ctx = ChangeContext::new(DISPUTE_ENGINE_ACTOR, ActorRole::System)
                    .with_reason("dispute window elapsed without decision");
                win_and_release(&mut payment, &ctx)?
            }
            DisputeStatus::Cancelled => {
                let ctx = ChangeContext::new(dispute.raised_by.to_string(), dispute.raised_by_role)
                    .with_reason("dispute withdrawn by raiser");
                win_and_release(&mut payment, &ctx)?
            }
            DisputeStatus::Open | DisputeStatus::UnderReview => {
                return Err(Error::Validation("dispute is not resolved".to_string()));
            }
        };

        let entries = self.ledger.commit_with_dispute(&mut payment, dispute, drafts)?;
        self.metrics.record_entries(&entries);
        if dispute.status == DisputeStatus::AutoResolved {
            self.metrics.disputes_auto_resolved_total.inc();
        }
        self.note_history(&payment, mark);

        info!(
            payment_id = %payment.id,
            dispute_id = %dispute.id,
            dispute_status = %dispute.status,
            payment_status = %payment.status,
            "dispute resolution applied"
        );
        Ok(PaymentSnapshot::from(&payment))
    }

    // Refund accumulation, completion transition, and ledger drafts shared
    // by initiate_refund and the refund webhook. Escrow funds its share:
    // delta = -min(amount, balance); any commission portion of the refund
    // is platform-funded outside escrow.
    fn refund_completion(
        &self,
        payment: &mut Payment,
        amount: Decimal,
        refund_ref: Option<String>,
        ctx: &ChangeContext,
    ) -> Result<Vec<EntryDraft>> {
        let remaining = payment.add_refund_amount(amount)?;
        let target = if remaining == Decimal::ZERO {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartiallyRefunded
        };
        payment.apply_transition(target, ctx)?;
        if let Some(refund_ref) = &refund_ref {
            payment.gateway_refund_refs.push(refund_ref.clone());
        }

        let balance = self.ledger.current_escrow_balance(payment.id)?;
        let escrow_funded = amount.min(balance);
        let entry_type = if target == PaymentStatus::Refunded {
            EntryType::Refund
        } else {
            EntryType::PartialRefund
        };
        let mut draft = EntryDraft::new(entry_type, amount).with_escrow_delta(-escrow_funded);
        if let Some(refund_ref) = refund_ref {
            draft = draft.with_external_ref(refund_ref);
        }
        let mut drafts = vec![draft];

        if target == PaymentStatus::Refunded && self.reversal_applies(payment) {
            drafts.push(EntryDraft::new(
                EntryType::CommissionReversal,
                payment.platform_commission,
            ));
        }
        Ok(drafts)
    }

    fn reversal_applies(&self, payment: &Payment) -> bool {
        payment.platform_commission > Decimal::ZERO
            && match self.config.commission_reversal_policy {
                CommissionReversalPolicy::Never => false,
                CommissionReversalPolicy::AfterRelease => payment.released_at.is_some(),
                CommissionReversalPolicy::Always => true,
            }
    }

    async fn lock_payment(&self, payment_id: Uuid) -> Result<LockGuard> {
        let key = keys::payment_lock(payment_id);
        match self.locks.try_acquire(&key).await? {
            Some(guard) => Ok(guard),
            None => Err(Error::LockContention { key }),
        }
    }

    async fn unlock_quietly(&self, guard: LockGuard) {
        if let Err(e) = self.locks.release(guard).await {
            warn!(error = %e, "failed to release payment lock");
        }
    }

    async fn record_result(&self, token: AdmissionToken, snapshot: &PaymentSnapshot) {
        match serde_json::to_string(snapshot) {
            Ok(json) => {
                if let Err(e) = self.guard.complete(token, &json).await {
                    warn!(error = %e, "failed to record idempotent result");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize snapshot for replay"),
        }
    }

    async fn abandon_quietly(&self, token: AdmissionToken) {
        if let Err(e) = self.guard.abandon(token).await {
            warn!(error = %e, "failed to abandon idempotency claim");
        }
    }

    fn note_history(&self, payment: &Payment, from_len: usize) {
        for change in &payment.status_history[from_len..] {
            if let Some(from) = change.from {
                self.metrics
                    .record_transition(from.as_str(), change.to.as_str());
            }
        }
    }
}

fn webhook_ctx(event: &WebhookEvent) -> ChangeContext {
    let ctx = ChangeContext::new(GATEWAY_ACTOR, ActorRole::System);
    match &event.reason {
        Some(reason) => ctx.with_reason(reason.clone()),
        None => ctx.with_reason(format!("gateway event {}", event.event_id)),
    }
}

fn resolution_ctx(dispute: &Dispute, reason: &str) -> ChangeContext {
    let actor = dispute
        .resolved_by
        .map(|id| id.to_string())
        .unwrap_or_else(|| "admin".to_string());
    ChangeContext::new(actor, ActorRole::Admin).with_reason(reason)
}

fn win_and_release(payment: &mut Payment, ctx: &ChangeContext) -> Result<Vec<EntryDraft>> {
    payment.apply_transition(PaymentStatus::DisputeWon, ctx)?;
    payment.apply_transition(PaymentStatus::Released, ctx)?;
    Ok(release_drafts(payment))
}

// Zero-payout payments (amount exactly at the commission floor) release
// nothing from escrow; the balance is already zero.
fn release_drafts(payment: &Payment) -> Vec<EntryDraft> {
    if payment.organizer_payout > Decimal::ZERO {
        vec![
            EntryDraft::new(EntryType::EscrowRelease, payment.organizer_payout)
                .with_escrow_delta(-payment.organizer_payout),
        ]
    } else {
        Vec::new()
    }
}
