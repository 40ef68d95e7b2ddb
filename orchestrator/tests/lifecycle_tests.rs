//! End-to-end lifecycle tests over a real store, in-memory coordination,
//! and the mock gateway.

use coordination::{keys, IdempotencyGuard, LockManager, MemoryStore};
use orchestrator::{
    CreateOrderRequest, Error, MockGateway, OrchestratorConfig, PaymentGateway,
    PaymentOrchestrator, WebhookEvent, WebhookKind,
};
use payment_core::{
    reconcile, ActorRole, Config, Currency, DisputeCategory, DisputeStatus, EntryType, Metrics,
    NewDispute, PaymentStatus, PaymentStore,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

fn money(units: i64, cents: i64) -> Decimal {
    Decimal::new(units * 100 + cents, 2)
}

struct Harness {
    orchestrator: PaymentOrchestrator,
    store: Arc<PaymentStore>,
    coordination: Arc<MemoryStore>,
    _temp_dir: TempDir,
}

fn build_orchestrator(
    store: Arc<PaymentStore>,
    coordination: Arc<MemoryStore>,
    gateway: Arc<dyn PaymentGateway>,
    config: OrchestratorConfig,
) -> PaymentOrchestrator {
    PaymentOrchestrator::new(
        store,
        LockManager::new(coordination.clone(), Duration::from_secs(30)),
        IdempotencyGuard::new(
            coordination,
            Duration::from_secs(60),
            Duration::from_secs(3600),
        ),
        gateway,
        Arc::new(Metrics::new().unwrap()),
        config,
    )
}

fn harness(escrow_hold_days: u16) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let mut store_config = Config::default();
    store_config.data_dir = temp_dir.path().to_path_buf();
    let store = Arc::new(PaymentStore::open(&store_config).unwrap());
    let coordination = Arc::new(MemoryStore::new());

    let mut config = OrchestratorConfig::default();
    config.escrow_hold_days = escrow_hold_days;
    let orchestrator = build_orchestrator(
        store.clone(),
        coordination.clone(),
        Arc::new(MockGateway::reliable()),
        config,
    );

    Harness {
        orchestrator,
        store,
        coordination,
        _temp_dir: temp_dir,
    }
}

fn order_request(amount: Decimal) -> CreateOrderRequest {
    CreateOrderRequest {
        request_id: Uuid::new_v4(),
        company_id: Uuid::new_v4(),
        organizer_id: Uuid::new_v4(),
        amount,
        currency: Currency::INR,
        commission_rate_percent: None,
        idempotency_key: Uuid::new_v4().to_string(),
    }
}

fn capture_event(order_ref: &str) -> WebhookEvent {
    WebhookEvent {
        event_id: format!("evt_{}", Uuid::new_v4().simple()),
        kind: WebhookKind::Captured,
        order_ref: order_ref.to_string(),
        payment_ref: Some(format!("pay_{}", Uuid::new_v4().simple())),
        amount: None,
        reason: None,
        refund_ref: None,
    }
}

/// Create a 10000.00 INR order and capture it into escrow
async fn captured_payment(h: &Harness) -> Uuid {
    let created = h
        .orchestrator
        .create_order(order_request(money(10_000, 0)))
        .await
        .unwrap();
    let order_ref = created.gateway_order_ref.unwrap();
    let captured = h
        .orchestrator
        .process_webhook(capture_event(&order_ref))
        .await
        .unwrap();
    assert_eq!(captured.status, PaymentStatus::InEscrow);
    created.id
}

#[tokio::test]
async fn test_create_order_replays_idempotently() {
    let h = harness(7);
    let request = order_request(money(10_000, 0));

    let first = h.orchestrator.create_order(request.clone()).await.unwrap();
    let second = h.orchestrator.create_order(request).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.status, PaymentStatus::Created);
    assert_eq!(
        h.store
            .payments_with_status(PaymentStatus::Created)
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_gateway_failure_frees_idempotency_key() {
    let h = harness(7);
    let request = order_request(money(10_000, 0));

    let failing = build_orchestrator(
        h.store.clone(),
        h.coordination.clone(),
        Arc::new(MockGateway::new(0, 1.0)),
        OrchestratorConfig::default(),
    );
    let err = failing.create_order(request.clone()).await.unwrap_err();
    assert!(matches!(err, Error::Gateway(_)));

    // Same key retried against a healthy gateway must go through
    let snapshot = h.orchestrator.create_order(request).await.unwrap();
    assert_eq!(snapshot.status, PaymentStatus::Created);
}

#[tokio::test]
async fn test_create_order_rejects_bad_amounts() {
    let h = harness(7);

    assert!(matches!(
        h.orchestrator.create_order(order_request(Decimal::ZERO)).await,
        Err(Error::Validation(_))
    ));

    // Below the commission floor the split could never balance
    let sub_floor = order_request(money(0, 50));
    assert!(matches!(
        h.orchestrator.create_order(sub_floor).await,
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn test_capture_webhook_funds_escrow() {
    let h = harness(7);
    let payment_id = captured_payment(&h).await;

    let payment = h.store.get_payment(payment_id).unwrap();
    assert_eq!(payment.status, PaymentStatus::InEscrow);
    assert_eq!(payment.platform_commission, money(1_000, 0));
    assert_eq!(payment.organizer_payout, money(9_000, 0));
    assert!(payment.gateway_payment_ref.is_some());

    let entries = h.store.entries_for_payment(payment_id).unwrap();
    let kinds: Vec<EntryType> = entries.iter().map(|e| e.entry_type).collect();
    assert_eq!(
        kinds,
        vec![
            EntryType::Capture,
            EntryType::EscrowHold,
            EntryType::CommissionDeduction
        ]
    );
    assert_eq!(entries.last().unwrap().escrow_balance_after, money(9_000, 0));
    reconcile(&payment, &entries).unwrap();
}

#[tokio::test]
async fn test_capture_from_created_authorizes_first() {
    // Gateways deliver capture before authorization often enough that the
    // capture handler must backfill the authorization edge itself.
    let h = harness(7);
    let payment_id = captured_payment(&h).await;

    let payment = h.store.get_payment(payment_id).unwrap();
    let path: Vec<PaymentStatus> = payment.status_history.iter().map(|c| c.to).collect();
    assert_eq!(
        path,
        vec![
            PaymentStatus::Created,
            PaymentStatus::Authorized,
            PaymentStatus::Captured,
            PaymentStatus::InEscrow
        ]
    );
}

#[tokio::test]
async fn test_duplicate_webhook_replays_without_new_entries() {
    let h = harness(7);
    let created = h
        .orchestrator
        .create_order(order_request(money(10_000, 0)))
        .await
        .unwrap();
    let event = capture_event(&created.gateway_order_ref.unwrap());

    let first = h.orchestrator.process_webhook(event.clone()).await.unwrap();
    let second = h.orchestrator.process_webhook(event).await.unwrap();

    assert_eq!(first.status, second.status);
    assert_eq!(first.version, second.version);
    assert_eq!(h.store.entries_for_payment(created.id).unwrap().len(), 3);
}

#[tokio::test]
async fn test_verify_payment_signature() {
    let h = harness(7);
    let created = h
        .orchestrator
        .create_order(order_request(money(10_000, 0)))
        .await
        .unwrap();
    let order_ref = created.gateway_order_ref.unwrap();

    let err = h
        .orchestrator
        .verify_payment(created.id, "pay_abc", "forged")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidSignature));
    assert_eq!(
        h.store.get_payment(created.id).unwrap().status,
        PaymentStatus::Created
    );

    let signature = MockGateway::valid_signature(&order_ref, "pay_abc");
    let verified = h
        .orchestrator
        .verify_payment(created.id, "pay_abc", &signature)
        .await
        .unwrap();
    assert_eq!(verified.status, PaymentStatus::Authorized);
    assert_eq!(verified.gateway_payment_ref.as_deref(), Some("pay_abc"));
}

#[tokio::test]
async fn test_failed_webhook_records_reason() {
    let h = harness(7);
    let created = h
        .orchestrator
        .create_order(order_request(money(10_000, 0)))
        .await
        .unwrap();

    let event = WebhookEvent {
        event_id: format!("evt_{}", Uuid::new_v4().simple()),
        kind: WebhookKind::Failed,
        order_ref: created.gateway_order_ref.unwrap(),
        payment_ref: None,
        amount: None,
        reason: Some("card declined".to_string()),
        refund_ref: None,
    };
    let snapshot = h.orchestrator.process_webhook(event).await.unwrap();
    assert_eq!(snapshot.status, PaymentStatus::Failed);

    let payment = h.store.get_payment(created.id).unwrap();
    assert_eq!(payment.failure_reason.as_deref(), Some("card declined"));
    assert!(payment.failed_at.is_some());
}

#[tokio::test]
async fn test_release_before_window_not_eligible() {
    let h = harness(7);
    let payment_id = captured_payment(&h).await;

    let err = h.orchestrator.release_escrow(payment_id).await.unwrap_err();
    assert!(matches!(err, Error::NotEligible(id) if id == payment_id));
    assert_eq!(
        h.store.get_payment(payment_id).unwrap().status,
        PaymentStatus::InEscrow
    );
}

#[tokio::test]
async fn test_release_after_window_pays_out() {
    let h = harness(0);
    let payment_id = captured_payment(&h).await;

    let released = h.orchestrator.release_escrow(payment_id).await.unwrap();
    assert_eq!(released.status, PaymentStatus::Released);

    let entries = h.store.entries_for_payment(payment_id).unwrap();
    let release = entries.last().unwrap();
    assert_eq!(release.entry_type, EntryType::EscrowRelease);
    assert_eq!(release.amount, money(9_000, 0));
    assert_eq!(release.escrow_balance_after, Decimal::ZERO);

    // The attempt flag keeps a released payment out of later passes
    let err = h.orchestrator.release_escrow(payment_id).await.unwrap_err();
    assert!(matches!(err, Error::NotEligible(_)));
}

#[tokio::test]
async fn test_settlement_after_release() {
    let h = harness(0);
    let payment_id = captured_payment(&h).await;
    h.orchestrator.release_escrow(payment_id).await.unwrap();

    let settled = h
        .orchestrator
        .record_settlement(payment_id, Some("utr_1234".to_string()))
        .await
        .unwrap();
    assert_eq!(settled.status, PaymentStatus::Settled);

    let entries = h.store.entries_for_payment(payment_id).unwrap();
    let settlement = entries.last().unwrap();
    assert_eq!(settlement.entry_type, EntryType::Settlement);
    assert_eq!(settlement.external_ref.as_deref(), Some("utr_1234"));
    assert_eq!(settlement.escrow_balance_after, Decimal::ZERO);
}

#[tokio::test]
async fn test_full_refund_after_settlement_reverses_commission() {
    let h = harness(0);
    let payment_id = captured_payment(&h).await;
    h.orchestrator.release_escrow(payment_id).await.unwrap();
    h.orchestrator
        .record_settlement(payment_id, None)
        .await
        .unwrap();

    let refunded = h
        .orchestrator
        .initiate_refund(payment_id, None, "admin-7", ActorRole::Admin)
        .await
        .unwrap();
    assert_eq!(refunded.status, PaymentStatus::Refunded);
    assert_eq!(refunded.refunded_amount, money(10_000, 0));

    let payment = h.store.get_payment(payment_id).unwrap();
    let entries = h.store.entries_for_payment(payment_id).unwrap();
    let refund = entries
        .iter()
        .find(|e| e.entry_type == EntryType::Refund)
        .unwrap();
    // Escrow was already empty, so the refund moves nothing out of it
    assert_eq!(refund.amount, money(10_000, 0));
    assert_eq!(refund.escrow_balance_after, Decimal::ZERO);

    let reversal = entries
        .iter()
        .find(|e| e.entry_type == EntryType::CommissionReversal)
        .unwrap();
    assert_eq!(reversal.amount, money(1_000, 0));
    assert_eq!(reversal.escrow_balance_after, Decimal::ZERO);

    assert_eq!(payment.gateway_refund_refs.len(), 1);
    reconcile(&payment, &entries).unwrap();
}

#[tokio::test]
async fn test_partial_then_full_refund_before_release() {
    let h = harness(7);
    let payment_id = captured_payment(&h).await;

    let partial = h
        .orchestrator
        .initiate_refund(
            payment_id,
            Some(money(3_000, 0)),
            "company-ops",
            ActorRole::Company,
        )
        .await
        .unwrap();
    assert_eq!(partial.status, PaymentStatus::PartiallyRefunded);
    assert_eq!(partial.refunded_amount, money(3_000, 0));

    let entries = h.store.entries_for_payment(payment_id).unwrap();
    let partial_entry = entries.last().unwrap();
    assert_eq!(partial_entry.entry_type, EntryType::PartialRefund);
    assert_eq!(partial_entry.escrow_balance_after, money(6_000, 0));

    let refunded = h
        .orchestrator
        .initiate_refund(payment_id, None, "company-ops", ActorRole::Company)
        .await
        .unwrap();
    assert_eq!(refunded.status, PaymentStatus::Refunded);
    assert_eq!(refunded.refunded_amount, money(10_000, 0));

    let payment = h.store.get_payment(payment_id).unwrap();
    let entries = h.store.entries_for_payment(payment_id).unwrap();
    // The 7000 completion drains the remaining 6000 of escrow; the
    // commission slice was never in escrow to begin with
    let full_entry = entries
        .iter()
        .find(|e| e.entry_type == EntryType::Refund)
        .unwrap();
    assert_eq!(full_entry.amount, money(7_000, 0));
    assert_eq!(full_entry.escrow_balance_after, Decimal::ZERO);

    // Policy is after_release and this payment never released
    assert!(entries
        .iter()
        .all(|e| e.entry_type != EntryType::CommissionReversal));
    reconcile(&payment, &entries).unwrap();
}

#[tokio::test]
async fn test_over_refund_rejected_without_mutation() {
    let h = harness(7);
    let payment_id = captured_payment(&h).await;

    let err = h
        .orchestrator
        .initiate_refund(
            payment_id,
            Some(money(20_000, 0)),
            "company-ops",
            ActorRole::Company,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::OverRefund { requested, refundable }
            if requested == money(20_000, 0) && refundable == money(10_000, 0)
    ));

    let payment = h.store.get_payment(payment_id).unwrap();
    assert_eq!(payment.status, PaymentStatus::InEscrow);
    assert_eq!(payment.refunded_amount, Decimal::ZERO);
    assert_eq!(h.store.entries_for_payment(payment_id).unwrap().len(), 3);
}

#[tokio::test]
async fn test_refund_webhook_completes_parked_refund() {
    // A crash between the gateway refund call and the local commit leaves
    // the payment in REFUND_REQUESTED; the gateway's refund webhook must
    // be able to finish it.
    let h = harness(7);
    let payment_id = captured_payment(&h).await;

    let mut payment = h.store.get_payment(payment_id).unwrap();
    let ctx = payment_core::ChangeContext::new("company-ops", ActorRole::Company);
    payment
        .apply_transition(PaymentStatus::RefundRequested, &ctx)
        .unwrap();
    h.store.commit_payment(&mut payment, &[]).unwrap();

    let order_ref = payment.gateway_order_ref.clone().unwrap();
    let event = WebhookEvent {
        event_id: format!("evt_{}", Uuid::new_v4().simple()),
        kind: WebhookKind::RefundProcessed,
        order_ref,
        payment_ref: payment.gateway_payment_ref.clone(),
        amount: Some(money(10_000, 0)),
        reason: None,
        refund_ref: Some("rfnd_webhook".to_string()),
    };
    let snapshot = h.orchestrator.process_webhook(event).await.unwrap();
    assert_eq!(snapshot.status, PaymentStatus::Refunded);

    let payment = h.store.get_payment(payment_id).unwrap();
    assert_eq!(
        payment.gateway_refund_refs,
        vec!["rfnd_webhook".to_string()]
    );
    let entries = h.store.entries_for_payment(payment_id).unwrap();
    reconcile(&payment, &entries).unwrap();
}

#[tokio::test]
async fn test_cancel_unpaid_order() {
    let h = harness(7);
    let created = h
        .orchestrator
        .create_order(order_request(money(10_000, 0)))
        .await
        .unwrap();

    let cancelled = h
        .orchestrator
        .cancel_order(
            created.id,
            "company-ops",
            ActorRole::Company,
            Some("sponsorship withdrawn".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(cancelled.status, PaymentStatus::Cancelled);

    // Terminal; a late capture webhook must not revive it
    let event = capture_event(cancelled.gateway_order_ref.as_deref().unwrap());
    let replay = h.orchestrator.process_webhook(event).await.unwrap();
    assert_eq!(replay.status, PaymentStatus::Cancelled);
}

#[tokio::test]
async fn test_lock_contention_is_retryable() {
    let h = harness(7);
    let payment_id = captured_payment(&h).await;

    let external = LockManager::new(h.coordination.clone(), Duration::from_secs(30));
    let held = external
        .try_acquire(&keys::payment_lock(payment_id))
        .await
        .unwrap()
        .unwrap();

    let err = h
        .orchestrator
        .initiate_refund(payment_id, None, "company-ops", ActorRole::Company)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::LockContention { .. }));
    assert!(err.is_retryable());

    external.release(held).await.unwrap();
    let refunded = h
        .orchestrator
        .initiate_refund(payment_id, None, "company-ops", ActorRole::Company)
        .await
        .unwrap();
    assert_eq!(refunded.status, PaymentStatus::Refunded);
}

#[tokio::test]
async fn test_dispute_blocks_release_until_resolution() {
    let h = harness(0);
    let payment_id = captured_payment(&h).await;
    let payment = h.store.get_payment(payment_id).unwrap();

    let mut dispute = payment_core::Dispute::new(
        NewDispute {
            payment_id,
            request_id: payment.request_id,
            raised_by: payment.company_id,
            raised_by_role: ActorRole::Company,
            company_id: payment.company_id,
            organizer_id: payment.organizer_id,
            reason: "deliverables missing".to_string(),
            category: DisputeCategory::ServiceNotDelivered,
            disputed_amount: payment.amount,
        },
        chrono::Utc::now() + chrono::Duration::days(14),
    );
    let opened = h.orchestrator.open_dispute_txn(&mut dispute).await.unwrap();
    assert_eq!(opened.status, PaymentStatus::DisputeOpen);

    // Hold window elapsed, but the dispute holds the funds
    let err = h.orchestrator.release_escrow(payment_id).await.unwrap_err();
    assert!(matches!(err, Error::NotEligible(_)));

    dispute.status = DisputeStatus::ResolvedOrganizerFavor;
    dispute.resolved_by = Some(Uuid::new_v4());
    dispute.resolved_at = Some(chrono::Utc::now());
    let resolved = h
        .orchestrator
        .resolve_dispute_txn(&mut dispute)
        .await
        .unwrap();
    assert_eq!(resolved.status, PaymentStatus::Released);

    let entries = h.store.entries_for_payment(payment_id).unwrap();
    let kinds: Vec<EntryType> = entries.iter().map(|e| e.entry_type).collect();
    assert_eq!(
        kinds,
        vec![
            EntryType::Capture,
            EntryType::EscrowHold,
            EntryType::CommissionDeduction,
            EntryType::DisputeAdjustment,
            EntryType::EscrowRelease
        ]
    );
    assert_eq!(entries.last().unwrap().escrow_balance_after, Decimal::ZERO);

    let stored = h.store.get_dispute(dispute.id).unwrap();
    assert_eq!(stored.status, DisputeStatus::ResolvedOrganizerFavor);
}

#[tokio::test]
async fn test_dispute_lost_routes_to_refund() {
    let h = harness(7);
    let payment_id = captured_payment(&h).await;
    let payment = h.store.get_payment(payment_id).unwrap();

    let mut dispute = payment_core::Dispute::new(
        NewDispute {
            payment_id,
            request_id: payment.request_id,
            raised_by: payment.company_id,
            raised_by_role: ActorRole::Company,
            company_id: payment.company_id,
            organizer_id: payment.organizer_id,
            reason: "event never happened".to_string(),
            category: DisputeCategory::Fraud,
            disputed_amount: payment.amount,
        },
        chrono::Utc::now() + chrono::Duration::days(14),
    );
    h.orchestrator.open_dispute_txn(&mut dispute).await.unwrap();

    dispute.status = DisputeStatus::ResolvedCompanyFavor;
    dispute.resolved_by = Some(Uuid::new_v4());
    dispute.resolved_at = Some(chrono::Utc::now());
    let resolved = h
        .orchestrator
        .resolve_dispute_txn(&mut dispute)
        .await
        .unwrap();
    assert_eq!(resolved.status, PaymentStatus::DisputeLost);

    let refunded = h
        .orchestrator
        .initiate_refund(payment_id, None, "admin-7", ActorRole::Admin)
        .await
        .unwrap();
    assert_eq!(refunded.status, PaymentStatus::Refunded);

    let payment = h.store.get_payment(payment_id).unwrap();
    let entries = h.store.entries_for_payment(payment_id).unwrap();
    assert_eq!(entries.last().unwrap().escrow_balance_after, Decimal::ZERO);
    reconcile(&payment, &entries).unwrap();
}
