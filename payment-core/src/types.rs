//! Core types for the payment lifecycle
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money)
//! - Append-only audit trails (status history, ledger entries)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// ISO 4217 currency code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Currency {
    /// Indian Rupee
    INR,
    /// US Dollar
    USD,
    /// Euro
    EUR,
    /// British Pound
    GBP,
    /// UAE Dirham
    AED,
    /// Singapore Dollar
    SGD,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::INR => "INR",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::AED => "AED",
            Currency::SGD => "SGD",
        }
    }

    /// Parse from string
    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "INR" => Some(Currency::INR),
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "GBP" => Some(Currency::GBP),
            "AED" => Some(Currency::AED),
            "SGD" => Some(Currency::SGD),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Payment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PaymentStatus {
    /// Gateway order created, awaiting payment
    Created = 1,
    /// Payment authorized by the gateway
    Authorized = 2,
    /// Funds captured from the company
    Captured = 3,
    /// Funds held in escrow pending delivery
    InEscrow = 4,
    /// Escrow released toward the organizer
    Released = 5,
    /// Organizer payout confirmed
    Settled = 6,
    /// Dispute open, escrow frozen
    DisputeOpen = 7,
    /// Dispute resolved in organizer favor
    DisputeWon = 8,
    /// Dispute resolved in company favor
    DisputeLost = 9,
    /// Refund initiated, awaiting gateway
    RefundRequested = 10,
    /// Part of the amount refunded
    PartiallyRefunded = 11,
    /// Fully refunded (terminal)
    Refunded = 12,
    /// Payment failed (terminal)
    Failed = 13,
    /// Cancelled before authorization (terminal)
    Cancelled = 14,
    /// Gateway order expired unpaid (terminal)
    Expired = 15,
}

impl PaymentStatus {
    /// True for states with no outgoing transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Refunded
                | PaymentStatus::Failed
                | PaymentStatus::Cancelled
                | PaymentStatus::Expired
        )
    }

    /// True while a dispute governs the payment
    pub fn is_disputed(&self) -> bool {
        matches!(
            self,
            PaymentStatus::DisputeOpen | PaymentStatus::DisputeWon | PaymentStatus::DisputeLost
        )
    }

    /// True for states from which held or paid-out funds can still come back
    pub fn is_refundable(&self) -> bool {
        matches!(
            self,
            PaymentStatus::InEscrow
                | PaymentStatus::Released
                | PaymentStatus::Settled
                | PaymentStatus::DisputeLost
        )
    }

    /// Upper-case wire name, used in logs and index keys
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Created => "CREATED",
            PaymentStatus::Authorized => "AUTHORIZED",
            PaymentStatus::Captured => "CAPTURED",
            PaymentStatus::InEscrow => "IN_ESCROW",
            PaymentStatus::Released => "RELEASED",
            PaymentStatus::Settled => "SETTLED",
            PaymentStatus::DisputeOpen => "DISPUTE_OPEN",
            PaymentStatus::DisputeWon => "DISPUTE_WON",
            PaymentStatus::DisputeLost => "DISPUTE_LOST",
            PaymentStatus::RefundRequested => "REFUND_REQUESTED",
            PaymentStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role of the party performing an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActorRole {
    /// Paying company
    Company = 1,
    /// Receiving organizer
    Organizer = 2,
    /// Platform administrator
    Admin = 3,
    /// Automated component (webhook handler, schedulers)
    System = 4,
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActorRole::Company => "COMPANY",
            ActorRole::Organizer => "ORGANIZER",
            ActorRole::Admin => "ADMIN",
            ActorRole::System => "SYSTEM",
        };
        write!(f, "{}", s)
    }
}

/// One entry in a payment's append-only status history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    /// Status before the change (None for the creation entry)
    pub from: Option<PaymentStatus>,

    /// Status after the change
    pub to: PaymentStatus,

    /// Human-readable reason, if any
    pub reason: Option<String>,

    /// Identifier of the acting party
    pub actor: String,

    /// Role of the acting party
    pub actor_role: ActorRole,

    /// When the change happened
    pub at: DateTime<Utc>,
}

/// Escrow window details, populated on entering IN_ESCROW
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowDetails {
    /// When funds entered escrow
    pub escrow_started_at: DateTime<Utc>,

    /// Earliest time auto-release may fire
    pub release_eligible_at: DateTime<Utc>,

    /// Hold window length in days, fixed at escrow entry
    pub escrow_hold_days: u16,

    /// Whether the auto-release scheduler has already claimed this payment
    pub auto_release_attempted: bool,
}

impl EscrowDetails {
    /// Start a new escrow window at `started_at`
    pub fn new(started_at: DateTime<Utc>, hold_days: u16) -> Self {
        Self {
            escrow_started_at: started_at,
            release_eligible_at: started_at + chrono::Duration::days(i64::from(hold_days)),
            escrow_hold_days: hold_days,
            auto_release_attempted: false,
        }
    }
}

/// Inputs for creating a payment record
#[derive(Debug, Clone)]
pub struct NewPayment {
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
    /// Commission rate as a fraction (4 decimal places, e.g. 0.1000)
    pub commission_rate: Decimal,
    /// Caller-supplied idempotency key, unique per funding attempt
    pub idempotency_key: String,
}

/// A monetary transaction through its full lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Unique payment ID
    pub id: Uuid,

    /// Sponsorship request being funded
    pub request_id: Uuid,

    /// Paying company
    pub company_id: Uuid,

    /// Receiving organizer
    pub organizer_id: Uuid,

    /// Gross amount (exact decimal)
    pub amount: Decimal,

    /// Currency
    pub currency: Currency,

    /// Current lifecycle status
    pub status: PaymentStatus,

    /// Commission rate as a fraction (4 decimal places)
    pub commission_rate: Decimal,

    /// Platform commission, zero until computed at capture
    pub platform_commission: Decimal,

    /// Organizer payout (amount minus commission), zero until capture
    pub organizer_payout: Decimal,

    /// Total refunded so far
    pub refunded_amount: Decimal,

    /// Escrow window, present from IN_ESCROW onward
    pub escrow: Option<EscrowDetails>,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Authorization time
    pub authorized_at: Option<DateTime<Utc>>,

    /// Capture time
    pub captured_at: Option<DateTime<Utc>>,

    /// Failure time
    pub failed_at: Option<DateTime<Utc>>,

    /// Escrow release time
    pub released_at: Option<DateTime<Utc>>,

    /// Settlement time
    pub settled_at: Option<DateTime<Utc>>,

    /// Why the payment failed, if it did
    pub failure_reason: Option<String>,

    /// Caller-supplied idempotency key (unique across payments)
    pub idempotency_key: String,

    /// Gateway order reference
    pub gateway_order_ref: Option<String>,

    /// Gateway payment reference, set at authorization
    pub gateway_payment_ref: Option<String>,

    /// Gateway refund references, in issue order
    pub gateway_refund_refs: Vec<String>,

    /// Append-only status history; the last entry matches `status`
    pub status_history: Vec<StatusChange>,

    /// Optimistic-concurrency version, bumped by storage on every commit
    pub version: u64,
}

impl Payment {
    /// Create a payment in CREATED with its initial history entry
    pub fn new(input: NewPayment) -> Self {
        let now = Utc::now();
        let creation = StatusChange {
            from: None,
            to: PaymentStatus::Created,
            reason: None,
            actor: input.company_id.to_string(),
            actor_role: ActorRole::Company,
            at: now,
        };

        Self {
            id: Uuid::new_v4(),
            request_id: input.request_id,
            company_id: input.company_id,
            organizer_id: input.organizer_id,
            amount: input.amount,
            currency: input.currency,
            status: PaymentStatus::Created,
            commission_rate: input.commission_rate,
            platform_commission: Decimal::ZERO,
            organizer_payout: Decimal::ZERO,
            refunded_amount: Decimal::ZERO,
            escrow: None,
            created_at: now,
            authorized_at: None,
            captured_at: None,
            failed_at: None,
            released_at: None,
            settled_at: None,
            failure_reason: None,
            idempotency_key: input.idempotency_key,
            gateway_order_ref: None,
            gateway_payment_ref: None,
            gateway_refund_refs: Vec::new(),
            status_history: vec![creation],
            version: 0,
        }
    }
}

/// Ledger entry type; direction is implied by the type, amounts stay positive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryType {
    /// Funds captured from the company
    Capture = 1,
    /// Funds placed in escrow
    EscrowHold = 2,
    /// Platform commission deducted from escrow
    CommissionDeduction = 3,
    /// Net payout released from escrow
    EscrowRelease = 4,
    /// Organizer payout confirmed on the rails
    Settlement = 5,
    /// Full refund issued
    Refund = 6,
    /// Partial refund issued
    PartialRefund = 7,
    /// Commission clawed back alongside a refund
    CommissionReversal = 8,
    /// Escrow frozen or adjusted by a dispute
    DisputeAdjustment = 9,
}

impl EntryType {
    /// Upper-case wire name, used in logs and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Capture => "CAPTURE",
            EntryType::EscrowHold => "ESCROW_HOLD",
            EntryType::CommissionDeduction => "COMMISSION_DEDUCTION",
            EntryType::EscrowRelease => "ESCROW_RELEASE",
            EntryType::Settlement => "SETTLEMENT",
            EntryType::Refund => "REFUND",
            EntryType::PartialRefund => "PARTIAL_REFUND",
            EntryType::CommissionReversal => "COMMISSION_REVERSAL",
            EntryType::DisputeAdjustment => "DISPUTE_ADJUSTMENT",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only ledger entry recording one financial movement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique entry ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Payment this entry belongs to
    pub payment_id: Uuid,

    /// Movement type
    pub entry_type: EntryType,

    /// Movement amount (always positive)
    pub amount: Decimal,

    /// Currency
    pub currency: Currency,

    /// Escrow balance snapshot after this entry
    pub escrow_balance_after: Decimal,

    /// External reference (gateway payment/refund id, payout rail ref)
    pub external_ref: Option<String>,

    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Entry creation time
    pub created_at: DateTime<Utc>,
}

/// Dispute lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DisputeStatus {
    /// Awaiting evidence and review
    Open = 1,
    /// An administrator is actively reviewing
    UnderReview = 2,
    /// Resolved for the company; escrow goes back toward refund
    ResolvedCompanyFavor = 3,
    /// Resolved for the organizer; escrow released
    ResolvedOrganizerFavor = 4,
    /// Response window elapsed without resolution
    AutoResolved = 5,
    /// Withdrawn by the raiser
    Cancelled = 6,
}

impl DisputeStatus {
    /// True once the dispute can no longer change
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            DisputeStatus::ResolvedCompanyFavor
                | DisputeStatus::ResolvedOrganizerFavor
                | DisputeStatus::AutoResolved
                | DisputeStatus::Cancelled
        )
    }

    /// Upper-case wire name, used in logs and index keys
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeStatus::Open => "OPEN",
            DisputeStatus::UnderReview => "UNDER_REVIEW",
            DisputeStatus::ResolvedCompanyFavor => "RESOLVED_COMPANY_FAVOR",
            DisputeStatus::ResolvedOrganizerFavor => "RESOLVED_ORGANIZER_FAVOR",
            DisputeStatus::AutoResolved => "AUTO_RESOLVED",
            DisputeStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Dispute category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DisputeCategory {
    /// Sponsored service never delivered
    ServiceNotDelivered = 1,
    /// Delivered but below the agreed standard
    QualityIssue = 2,
    /// Amount charged differs from the agreement
    AmountMismatch = 3,
    /// Suspected fraud
    Fraud = 4,
    /// Anything else
    Other = 5,
}

/// One piece of evidence attached to a dispute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    /// Submitting party
    pub submitted_by: Uuid,

    /// Role of the submitting party
    pub role: ActorRole,

    /// Free-form description
    pub description: String,

    /// Reference to an uploaded attachment, if any
    pub attachment_ref: Option<String>,

    /// Submission time
    pub submitted_at: DateTime<Utc>,
}

/// Inputs for opening a dispute
#[derive(Debug, Clone)]
pub struct NewDispute {
    /// Disputed payment
    pub payment_id: Uuid,
    /// Sponsorship request of the payment
    pub request_id: Uuid,
    /// Party raising the dispute
    pub raised_by: Uuid,
    /// Role of the raiser
    pub raised_by_role: ActorRole,
    /// Paying company
    pub company_id: Uuid,
    /// Receiving organizer
    pub organizer_id: Uuid,
    /// Why the dispute was raised
    pub reason: String,
    /// Dispute category
    pub category: DisputeCategory,
    /// Amount under dispute
    pub disputed_amount: Decimal,
}

/// A dispute over an escrowed payment (at most one per payment)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    /// Unique dispute ID
    pub id: Uuid,

    /// Disputed payment
    pub payment_id: Uuid,

    /// Sponsorship request of the payment
    pub request_id: Uuid,

    /// Party that raised the dispute
    pub raised_by: Uuid,

    /// Role of the raiser
    pub raised_by_role: ActorRole,

    /// Paying company
    pub company_id: Uuid,

    /// Receiving organizer
    pub organizer_id: Uuid,

    /// Current status
    pub status: DisputeStatus,

    /// Why the dispute was raised
    pub reason: String,

    /// Dispute category
    pub category: DisputeCategory,

    /// Amount under dispute
    pub disputed_amount: Decimal,

    /// Resolution notes from the resolver
    pub resolution_notes: Option<String>,

    /// Administrator who resolved, if resolved manually
    pub resolved_by: Option<Uuid>,

    /// Resolution time
    pub resolved_at: Option<DateTime<Utc>>,

    /// Deadline after which the dispute auto-resolves
    pub auto_resolve_at: DateTime<Utc>,

    /// Submitted evidence, bounded by configuration
    pub evidence: Vec<Evidence>,

    /// Raise time
    pub created_at: DateTime<Utc>,

    /// Optimistic-concurrency version, bumped by storage on every commit
    pub version: u64,
}

impl Dispute {
    /// Open a new dispute with an auto-resolution deadline
    pub fn new(input: NewDispute, auto_resolve_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_id: input.payment_id,
            request_id: input.request_id,
            raised_by: input.raised_by,
            raised_by_role: input.raised_by_role,
            company_id: input.company_id,
            organizer_id: input.organizer_id,
            status: DisputeStatus::Open,
            reason: input.reason,
            category: input.category,
            disputed_amount: input.disputed_amount,
            resolution_notes: None,
            resolved_by: None,
            resolved_at: None,
            auto_resolve_at,
            evidence: Vec::new(),
            created_at: Utc::now(),
            version: 0,
        }
    }

    /// True once the dispute can no longer change
    pub fn is_resolved(&self) -> bool {
        self.status.is_resolved()
    }
}

/// Read-only view of a payment returned by orchestrator operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSnapshot {
    /// Payment ID
    pub id: Uuid,

    /// Sponsorship request
    pub request_id: Uuid,

    /// Current status
    pub status: PaymentStatus,

    /// Gross amount
    pub amount: Decimal,

    /// Currency
    pub currency: Currency,

    /// Platform commission (zero until capture)
    pub platform_commission: Decimal,

    /// Organizer payout (zero until capture)
    pub organizer_payout: Decimal,

    /// Total refunded so far
    pub refunded_amount: Decimal,

    /// Gateway order reference
    pub gateway_order_ref: Option<String>,

    /// Gateway payment reference
    pub gateway_payment_ref: Option<String>,

    /// Earliest auto-release time, when escrowed
    pub release_eligible_at: Option<DateTime<Utc>>,

    /// Version at snapshot time
    pub version: u64,
}

impl From<&Payment> for PaymentSnapshot {
    fn from(p: &Payment) -> Self {
        Self {
            id: p.id,
            request_id: p.request_id,
            status: p.status,
            amount: p.amount,
            currency: p.currency,
            platform_commission: p.platform_commission,
            organizer_payout: p.organizer_payout,
            refunded_amount: p.refunded_amount,
            gateway_order_ref: p.gateway_order_ref.clone(),
            gateway_payment_ref: p.gateway_payment_ref.clone(),
            release_eligible_at: p.escrow.as_ref().map(|e| e.release_eligible_at),
            version: p.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_from_code() {
        assert_eq!(Currency::from_code("INR"), Some(Currency::INR));
        assert_eq!(Currency::from_code("USD"), Some(Currency::USD));
        assert_eq!(Currency::from_code("XYZ"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(PaymentStatus::Refunded.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Cancelled.is_terminal());
        assert!(PaymentStatus::Expired.is_terminal());
        assert!(!PaymentStatus::InEscrow.is_terminal());
        assert!(!PaymentStatus::Settled.is_terminal());
    }

    #[test]
    fn test_refundable_statuses() {
        assert!(PaymentStatus::InEscrow.is_refundable());
        assert!(PaymentStatus::Released.is_refundable());
        assert!(PaymentStatus::Settled.is_refundable());
        assert!(PaymentStatus::DisputeLost.is_refundable());
        assert!(!PaymentStatus::Created.is_refundable());
        assert!(!PaymentStatus::DisputeOpen.is_refundable());
    }

    #[test]
    fn test_new_payment_initial_history() {
        let payment = Payment::new(NewPayment {
            request_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            organizer_id: Uuid::new_v4(),
            amount: Decimal::new(1000000, 2), // 10000.00
            currency: Currency::INR,
            commission_rate: Decimal::new(1000, 4), // 0.1000
            idempotency_key: "key-1".to_string(),
        });

        assert_eq!(payment.status, PaymentStatus::Created);
        assert_eq!(payment.status_history.len(), 1);
        assert_eq!(payment.status_history[0].from, None);
        assert_eq!(payment.status_history[0].to, PaymentStatus::Created);
        assert_eq!(payment.version, 0);
        assert_eq!(payment.refunded_amount, Decimal::ZERO);
    }

    #[test]
    fn test_escrow_details_window() {
        let start = Utc::now();
        let escrow = EscrowDetails::new(start, 7);
        assert_eq!(escrow.release_eligible_at, start + chrono::Duration::days(7));
        assert_eq!(escrow.escrow_hold_days, 7);
        assert!(!escrow.auto_release_attempted);
    }

    #[test]
    fn test_dispute_resolution_predicate() {
        assert!(!DisputeStatus::Open.is_resolved());
        assert!(!DisputeStatus::UnderReview.is_resolved());
        assert!(DisputeStatus::ResolvedCompanyFavor.is_resolved());
        assert!(DisputeStatus::AutoResolved.is_resolved());
        assert!(DisputeStatus::Cancelled.is_resolved());
    }
}
