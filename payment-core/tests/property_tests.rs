//! Property-based tests for payment lifecycle invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Transition table: exactly the listed edges are reachable
//! - Rejected transitions leave the payment untouched
//! - Commission + payout == amount, for any amount and rate
//! - Refunds accumulate exactly and never exceed the amount
//! - Auto-release eligibility matches the escrow window

use payment_core::{
    can_transition, commission,
    state_machine::{ChangeContext, ALL_STATUSES},
    types::{ActorRole, Currency, NewPayment, Payment, PaymentStatus},
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Strategy for generating valid amounts (positive decimals, >= 1.00)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (100u64..1_000_000_00u64).prop_map(|cents| Decimal::new(cents as i64, 2))
}

/// Strategy for generating commission rates in percent (0..=30)
fn rate_percent_strategy() -> impl Strategy<Value = Decimal> {
    (0u64..=3000u64).prop_map(|basis_points| Decimal::new(basis_points as i64, 2))
}

/// Strategy for picking any payment status
fn status_strategy() -> impl Strategy<Value = PaymentStatus> {
    (0usize..ALL_STATUSES.len()).prop_map(|i| ALL_STATUSES[i])
}

fn ctx() -> ChangeContext {
    ChangeContext::new("prop-test", ActorRole::System)
}

fn new_payment(amount: Decimal) -> Payment {
    Payment::new(NewPayment {
        request_id: Uuid::new_v4(),
        company_id: Uuid::new_v4(),
        organizer_id: Uuid::new_v4(),
        amount,
        currency: Currency::INR,
        commission_rate: Decimal::new(1000, 4),
        idempotency_key: Uuid::new_v4().to_string(),
    })
}

/// Build a payment sitting in `status` by walking a legal path to it
fn payment_at(status: PaymentStatus) -> Payment {
    use PaymentStatus::*;

    let mut p = new_payment(Decimal::new(100000, 2));
    let c = ctx();

    let path: &[PaymentStatus] = match status {
        Created => &[],
        Authorized => &[Authorized],
        Captured => &[Authorized, Captured],
        InEscrow => &[Authorized, Captured, InEscrow],
        Released => &[Authorized, Captured, InEscrow, Released],
        Settled => &[Authorized, Captured, InEscrow, Released, Settled],
        DisputeOpen => &[Authorized, Captured, InEscrow, DisputeOpen],
        DisputeWon => &[Authorized, Captured, InEscrow, DisputeOpen, DisputeWon],
        DisputeLost => &[Authorized, Captured, InEscrow, DisputeOpen, DisputeLost],
        RefundRequested => &[Authorized, Captured, InEscrow, RefundRequested],
        PartiallyRefunded => &[Authorized, Captured, InEscrow, RefundRequested, PartiallyRefunded],
        Refunded => &[Authorized, Captured, InEscrow, RefundRequested, Refunded],
        Failed => &[Failed],
        Cancelled => &[Cancelled],
        Expired => &[Expired],
    };

    for step in path {
        if *step == InEscrow {
            p.enter_escrow(7, &c).expect("legal path step");
        } else {
            p.apply_transition(*step, &c).expect("legal path step");
        }
    }
    assert_eq!(p.status, status);
    p
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_transition_table_is_exhaustive(from in status_strategy(), to in status_strategy()) {
        let mut p = payment_at(from);
        let history_before = p.status_history.len();
        let allowed = can_transition(from, to);

        let result = if to == PaymentStatus::InEscrow {
            p.enter_escrow(7, &ctx())
        } else {
            p.apply_transition(to, &ctx())
        };

        if allowed {
            prop_assert!(result.is_ok(), "{} -> {} should be legal", from, to);
            prop_assert_eq!(p.status, to);
            prop_assert_eq!(p.status_history.len(), history_before + 1);
            prop_assert_eq!(p.status_history.last().unwrap().to, to);
        } else {
            prop_assert!(result.is_err(), "{} -> {} should be rejected", from, to);
            prop_assert_eq!(p.status, from);
            prop_assert_eq!(p.status_history.len(), history_before);
        }
    }

    #[test]
    fn prop_terminal_states_admit_nothing(to in status_strategy()) {
        for terminal in [
            PaymentStatus::Refunded,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
            PaymentStatus::Expired,
        ] {
            prop_assert!(!can_transition(terminal, to));
        }
    }

    #[test]
    fn prop_commission_split_sums_exactly(
        amount in amount_strategy(),
        rate_percent in rate_percent_strategy(),
    ) {
        let rate = commission::rate_fraction(rate_percent).unwrap();
        let split = commission::compute(amount, rate, Decimal::ONE).unwrap();

        prop_assert_eq!(split.platform_commission + split.organizer_payout, amount);
        prop_assert!(split.platform_commission >= Decimal::ONE);
        prop_assert!(split.organizer_payout >= Decimal::ZERO);
        // Two decimal places, always
        prop_assert!(split.platform_commission.scale() <= 2);
    }

    #[test]
    fn prop_refunds_accumulate_exactly(
        amount in amount_strategy(),
        fractions in proptest::collection::vec(1u32..=100, 1..6),
    ) {
        let mut p = new_payment(amount);
        let mut refunded = Decimal::ZERO;

        for fraction in fractions {
            let remaining = p.refundable_amount();
            if remaining == Decimal::ZERO {
                break;
            }
            let step = (remaining * Decimal::new(fraction as i64, 2))
                .round_dp(2)
                .min(remaining)
                .max(Decimal::new(1, 2));

            let left = p.add_refund_amount(step).unwrap();
            refunded += step;

            prop_assert_eq!(p.refunded_amount, refunded);
            prop_assert_eq!(left, amount - refunded);
            prop_assert!(p.refunded_amount <= p.amount);
        }

        prop_assert_eq!(p.is_fully_refunded(), p.refunded_amount == p.amount);
    }

    #[test]
    fn prop_over_refund_always_rejected(amount in amount_strategy()) {
        let mut p = new_payment(amount);
        let too_much = amount + Decimal::new(1, 2);
        prop_assert!(p.add_refund_amount(too_much).is_err());
        prop_assert_eq!(p.refunded_amount, Decimal::ZERO);
    }

    #[test]
    fn prop_eligibility_matches_window(hold_days in 1u16..=60, offset_hours in -48i64..=48) {
        let mut p = payment_at(PaymentStatus::Captured);
        p.enter_escrow(hold_days, &ctx()).unwrap();

        let eligible_at = p.escrow.as_ref().unwrap().release_eligible_at;
        let now = eligible_at + chrono::Duration::hours(offset_hours);

        prop_assert_eq!(p.is_eligible_for_auto_release(now), offset_hours >= 0);
    }

    #[test]
    fn prop_random_legal_walks_keep_history_consistent(
        choices in proptest::collection::vec(0usize..4, 0..12),
    ) {
        let mut p = new_payment(Decimal::new(100000, 2));

        for choice in choices {
            let targets = payment_core::allowed_targets(p.status);
            if targets.is_empty() {
                break;
            }
            let to = targets[choice % targets.len()];
            if to == PaymentStatus::InEscrow {
                p.enter_escrow(7, &ctx()).unwrap();
            } else {
                p.apply_transition(to, &ctx()).unwrap();
            }

            prop_assert_eq!(p.status_history.last().unwrap().to, p.status);
        }

        // Creation entry + one per applied transition
        let mut replayed = PaymentStatus::Created;
        for change in &p.status_history[1..] {
            prop_assert_eq!(change.from, Some(replayed));
            replayed = change.to;
        }
        prop_assert_eq!(replayed, p.status);
    }
}

mod integration_tests {
    use super::*;
    use payment_core::{reconcile, Config, EntryDraft, EntryType, LedgerWriter, PaymentStore};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_store() -> (Arc<PaymentStore>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Arc::new(PaymentStore::open(&config).unwrap()), temp_dir)
    }

    #[test]
    fn test_full_lifecycle_reconciles() {
        let (store, _temp) = test_store();
        let writer = LedgerWriter::new(store.clone());

        let amount = Decimal::new(1000000, 2); // 10000.00
        let mut payment = new_payment(amount);
        writer.commit(&mut payment, vec![]).unwrap();

        let c = ctx();
        payment.apply_transition(PaymentStatus::Authorized, &c).unwrap();
        payment.apply_transition(PaymentStatus::Captured, &c).unwrap();

        let rate = commission::rate_fraction(Decimal::from(10)).unwrap();
        let split = commission::compute(amount, rate, Decimal::ONE).unwrap();
        payment.set_commission(split.platform_commission, split.organizer_payout);
        payment.enter_escrow(7, &c).unwrap();

        writer
            .commit(
                &mut payment,
                vec![
                    EntryDraft::new(EntryType::Capture, amount),
                    EntryDraft::new(EntryType::EscrowHold, amount).with_escrow_delta(amount),
                    EntryDraft::new(EntryType::CommissionDeduction, split.platform_commission)
                        .with_escrow_delta(-split.platform_commission),
                ],
            )
            .unwrap();

        payment.apply_transition(PaymentStatus::Released, &c).unwrap();
        writer
            .commit(
                &mut payment,
                vec![EntryDraft::new(EntryType::EscrowRelease, split.organizer_payout)
                    .with_escrow_delta(-split.organizer_payout)],
            )
            .unwrap();

        payment.apply_transition(PaymentStatus::Settled, &c).unwrap();
        writer
            .commit(
                &mut payment,
                vec![EntryDraft::new(EntryType::Settlement, split.organizer_payout)],
            )
            .unwrap();

        let loaded = store.get_payment(payment.id).unwrap();
        assert_eq!(loaded.status, PaymentStatus::Settled);
        assert_eq!(loaded.platform_commission, Decimal::new(100000, 2));
        assert_eq!(loaded.organizer_payout, Decimal::new(900000, 2));

        let entries = store.entries_for_payment(payment.id).unwrap();
        assert_eq!(entries.len(), 5);
        reconcile(&loaded, &entries).unwrap();

        // Escrow fully drained
        assert_eq!(
            writer.current_escrow_balance(payment.id).unwrap(),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_status_scan_tracks_lifecycle() {
        let (store, _temp) = test_store();
        let writer = LedgerWriter::new(store.clone());

        let mut payment = new_payment(Decimal::new(50000, 2));
        writer.commit(&mut payment, vec![]).unwrap();

        let c = ctx();
        payment.apply_transition(PaymentStatus::Authorized, &c).unwrap();
        payment.apply_transition(PaymentStatus::Captured, &c).unwrap();
        payment.enter_escrow(7, &c).unwrap();
        writer.commit(&mut payment, vec![]).unwrap();

        assert_eq!(
            store.payments_with_status(PaymentStatus::InEscrow).unwrap(),
            vec![payment.id]
        );
        assert!(store
            .payments_with_status(PaymentStatus::Created)
            .unwrap()
            .is_empty());
    }
}
