//! Payment state machine
//!
//! A single data-driven transition table governs every status change. Illegal
//! transitions are rejected before any mutation, so a failed call leaves the
//! payment untouched. Applying a legal transition updates the status, appends
//! to the audit history, and stamps the milestone timestamp of the target
//! state.
//!
//! Entering escrow carries extra state (the release window) and goes through
//! [`Payment::enter_escrow`] rather than the generic apply.

use crate::error::{Error, Result};
use crate::types::{ActorRole, EscrowDetails, Payment, PaymentStatus, StatusChange};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use PaymentStatus::*;

/// Legal targets for each status. Terminal states map to an empty slice.
pub fn allowed_targets(from: PaymentStatus) -> &'static [PaymentStatus] {
    match from {
        Created => &[Authorized, Failed, Cancelled, Expired],
        Authorized => &[Captured, Failed],
        Captured => &[InEscrow, Failed],
        InEscrow => &[Released, DisputeOpen, RefundRequested],
        Released => &[Settled],
        Settled => &[RefundRequested],
        DisputeOpen => &[DisputeWon, DisputeLost],
        DisputeWon => &[Released],
        DisputeLost => &[RefundRequested, Refunded],
        RefundRequested => &[PartiallyRefunded, Refunded],
        PartiallyRefunded => &[RefundRequested, Refunded],
        Refunded | Failed | Cancelled | Expired => &[],
    }
}

/// Whether `from -> to` is a legal edge
pub fn can_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
    allowed_targets(from).contains(&to)
}

/// Who changed the status, why, and when
#[derive(Debug, Clone)]
pub struct ChangeContext {
    /// Identifier of the acting party
    pub actor: String,
    /// Role of the acting party
    pub actor_role: ActorRole,
    /// Optional human-readable reason
    pub reason: Option<String>,
    /// Effective time of the change
    pub at: DateTime<Utc>,
}

impl ChangeContext {
    /// Context acting now, without a reason
    pub fn new(actor: impl Into<String>, actor_role: ActorRole) -> Self {
        Self {
            actor: actor.into(),
            actor_role,
            reason: None,
            at: Utc::now(),
        }
    }

    /// Attach a reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl Payment {
    /// Apply a legal transition, appending history and stamping milestones.
    ///
    /// Rejects illegal edges with [`Error::InvalidTransition`] without
    /// mutating anything. `IN_ESCROW` is not reachable through this method;
    /// use [`Payment::enter_escrow`], which also initializes the release
    /// window.
    pub fn apply_transition(&mut self, to: PaymentStatus, ctx: &ChangeContext) -> Result<()> {
        if !can_transition(self.status, to) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to,
            });
        }

        if to == InEscrow {
            return Err(Error::InvariantViolation(
                "IN_ESCROW requires a hold window; use enter_escrow".to_string(),
            ));
        }

        self.record_change(to, ctx);
        Ok(())
    }

    /// Move the payment into escrow and start its release window.
    ///
    /// `release_eligible_at` is fixed here and never changes afterward; a
    /// payment gets exactly one escrow window.
    pub fn enter_escrow(&mut self, hold_days: u16, ctx: &ChangeContext) -> Result<()> {
        if !can_transition(self.status, InEscrow) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: InEscrow,
            });
        }
        if self.escrow.is_some() {
            return Err(Error::InvariantViolation(
                "escrow window already started".to_string(),
            ));
        }

        self.escrow = Some(EscrowDetails::new(ctx.at, hold_days));
        self.record_change(InEscrow, ctx);
        Ok(())
    }

    // Shared mutation path: status, history, milestones. Callers have already
    // validated the edge.
    fn record_change(&mut self, to: PaymentStatus, ctx: &ChangeContext) {
        let from = self.status;
        self.status = to;
        self.status_history.push(StatusChange {
            from: Some(from),
            to,
            reason: ctx.reason.clone(),
            actor: ctx.actor.clone(),
            actor_role: ctx.actor_role,
            at: ctx.at,
        });

        match to {
            Authorized => self.authorized_at = Some(ctx.at),
            Captured => self.captured_at = Some(ctx.at),
            Released => self.released_at = Some(ctx.at),
            Settled => self.settled_at = Some(ctx.at),
            Failed => {
                self.failed_at = Some(ctx.at);
                self.failure_reason = ctx.reason.clone();
            }
            _ => {}
        }
    }

    /// Record the computed commission split. Called once, at capture.
    pub fn set_commission(&mut self, platform_commission: Decimal, organizer_payout: Decimal) {
        self.platform_commission = platform_commission;
        self.organizer_payout = organizer_payout;
    }

    /// Accumulate a refund and return the remaining refundable balance.
    ///
    /// Does not clamp: callers validate `amount <= refundable_amount()`
    /// first. An over-refund reaching this method is an invariant violation.
    pub fn add_refund_amount(&mut self, amount: Decimal) -> Result<Decimal> {
        let new_total = self.refunded_amount + amount;
        if new_total > self.amount {
            return Err(Error::InvariantViolation(format!(
                "refund total {} exceeds amount {}",
                new_total, self.amount
            )));
        }
        self.refunded_amount = new_total;
        Ok(self.amount - self.refunded_amount)
    }

    /// Remaining amount that can still be refunded
    pub fn refundable_amount(&self) -> Decimal {
        self.amount - self.refunded_amount
    }

    /// True once the full amount has come back
    pub fn is_fully_refunded(&self) -> bool {
        self.refunded_amount >= self.amount
    }

    /// Whether the auto-release scheduler should pick this payment up at `now`
    pub fn is_eligible_for_auto_release(&self, now: DateTime<Utc>) -> bool {
        if self.status != InEscrow {
            return false;
        }
        match &self.escrow {
            Some(escrow) => !escrow.auto_release_attempted && now >= escrow.release_eligible_at,
            None => false,
        }
    }

    /// Claim this payment for an auto-release attempt.
    ///
    /// The flag is persisted before the release itself runs, so a crashed or
    /// failed attempt is never silently retried by the scheduler.
    pub fn mark_auto_release_attempted(&mut self) -> Result<()> {
        match &mut self.escrow {
            Some(escrow) => {
                escrow.auto_release_attempted = true;
                Ok(())
            }
            None => Err(Error::InvariantViolation(
                "no escrow window to mark".to_string(),
            )),
        }
    }
}

/// All statuses, for exhaustive table checks
pub const ALL_STATUSES: [PaymentStatus; 15] = [
    Created,
    Authorized,
    Captured,
    InEscrow,
    Released,
    Settled,
    DisputeOpen,
    DisputeWon,
    DisputeLost,
    RefundRequested,
    PartiallyRefunded,
    Refunded,
    Failed,
    Cancelled,
    Expired,
];
