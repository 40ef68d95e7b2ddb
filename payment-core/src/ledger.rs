//! Append-only transaction ledger
//!
//! [`LedgerWriter`] is the one component that appends ledger entries; nothing
//! mutates them afterward. Every commit carries the payment record in the
//! same write batch, so the ledger and the payment can never disagree about
//! what landed.
//!
//! Each entry snapshots the escrow balance after itself. Drafts carry a
//! signed escrow delta (hold `+amount`, deduction/release/refund negative,
//! bookkeeping-only entries zero) and the writer folds the running balance.

use crate::error::{Error, Result};
use crate::storage::PaymentStore;
use crate::types::{Dispute, EntryType, Payment, Transaction};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A ledger entry about to be written
#[derive(Debug, Clone)]
pub struct EntryDraft {
    /// Movement type
    pub entry_type: EntryType,
    /// Movement amount (always positive)
    pub amount: Decimal,
    /// Signed effect on the escrow balance
    pub escrow_delta: Decimal,
    /// External reference (gateway payment/refund id)
    pub external_ref: Option<String>,
    /// Additional metadata
    pub metadata: HashMap<String, String>,
}

impl EntryDraft {
    /// Draft with no escrow effect and no references
    pub fn new(entry_type: EntryType, amount: Decimal) -> Self {
        Self {
            entry_type,
            amount,
            escrow_delta: Decimal::ZERO,
            external_ref: None,
            metadata: HashMap::new(),
        }
    }

    /// Set the signed escrow delta
    pub fn with_escrow_delta(mut self, delta: Decimal) -> Self {
        self.escrow_delta = delta;
        self
    }

    /// Attach an external reference
    pub fn with_external_ref(mut self, external_ref: impl Into<String>) -> Self {
        self.external_ref = Some(external_ref.into());
        self
    }

    /// Attach one metadata pair
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Sole appender of ledger entries
#[derive(Clone)]
pub struct LedgerWriter {
    store: Arc<PaymentStore>,
}

impl LedgerWriter {
    /// Create a writer over the given store
    pub fn new(store: Arc<PaymentStore>) -> Self {
        Self { store }
    }

    /// Commit the payment with new ledger entries, atomically.
    ///
    /// An empty draft list commits just the payment; status-only changes go
    /// through here too so there is a single commit path.
    pub fn commit(
        &self,
        payment: &mut Payment,
        drafts: Vec<EntryDraft>,
    ) -> Result<Vec<Transaction>> {
        let entries = self.build_entries(payment, drafts)?;
        self.store.commit_payment(payment, &entries)?;
        Ok(entries)
    }

    /// Commit the payment, its dispute, and new ledger entries, atomically
    pub fn commit_with_dispute(
        &self,
        payment: &mut Payment,
        dispute: &mut Dispute,
        drafts: Vec<EntryDraft>,
    ) -> Result<Vec<Transaction>> {
        let entries = self.build_entries(payment, drafts)?;
        self.store
            .commit_payment_with_dispute(payment, dispute, &entries)?;
        Ok(entries)
    }

    /// Escrow balance after the latest entry, zero before any entry
    pub fn current_escrow_balance(&self, payment_id: Uuid) -> Result<Decimal> {
        let entries = self.store.entries_for_payment(payment_id)?;
        Ok(entries
            .last()
            .map(|e| e.escrow_balance_after)
            .unwrap_or(Decimal::ZERO))
    }

    fn build_entries(
        &self,
        payment: &Payment,
        drafts: Vec<EntryDraft>,
    ) -> Result<Vec<Transaction>> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let mut balance = self.current_escrow_balance(payment.id)?;
        let now = Utc::now();

        let mut entries = Vec::with_capacity(drafts.len());
        for draft in drafts {
            if draft.amount <= Decimal::ZERO {
                return Err(Error::InvariantViolation(format!(
                    "ledger entry {} must have a positive amount, got {}",
                    draft.entry_type, draft.amount
                )));
            }

            balance += draft.escrow_delta;
            if balance < Decimal::ZERO {
                return Err(Error::InvariantViolation(format!(
                    "escrow balance would go negative ({}) after {}",
                    balance, draft.entry_type
                )));
            }

            entries.push(Transaction {
                id: Uuid::now_v7(),
                payment_id: payment.id,
                entry_type: draft.entry_type,
                amount: draft.amount,
                currency: payment.currency,
                escrow_balance_after: balance,
                external_ref: draft.external_ref,
                metadata: draft.metadata,
                created_at: now,
            });
        }

        Ok(entries)
    }
}

/// Check a payment's ledger against its monetary fields.
///
/// Verifies that escrow holds sum to the gross amount once escrow was
/// entered, commission deductions to the computed commission, and refund
/// entries to the accumulated refunded amount.
pub fn reconcile(payment: &Payment, entries: &[Transaction]) -> Result<()> {
    let mut holds = Decimal::ZERO;
    let mut commissions = Decimal::ZERO;
    let mut refunds = Decimal::ZERO;

    for entry in entries {
        if entry.payment_id != payment.id {
            return Err(Error::InvariantViolation(format!(
                "entry {} belongs to a different payment",
                entry.id
            )));
        }
        if entry.amount <= Decimal::ZERO {
            return Err(Error::InvariantViolation(format!(
                "entry {} has non-positive amount {}",
                entry.id, entry.amount
            )));
        }

        match entry.entry_type {
            EntryType::EscrowHold => holds += entry.amount,
            EntryType::CommissionDeduction => commissions += entry.amount,
            EntryType::Refund | EntryType::PartialRefund => refunds += entry.amount,
            _ => {}
        }
    }

    if payment.escrow.is_some() && holds != payment.amount {
        return Err(Error::InvariantViolation(format!(
            "escrow holds {} do not match amount {}",
            holds, payment.amount
        )));
    }

    if commissions != payment.platform_commission {
        return Err(Error::InvariantViolation(format!(
            "commission deductions {} do not match commission {}",
            commissions, payment.platform_commission
        )));
    }

    if refunds != payment.refunded_amount {
        return Err(Error::InvariantViolation(format!(
            "refund entries {} do not match refunded amount {}",
            refunds, payment.refunded_amount
        )));
    }

    Ok(())
}
