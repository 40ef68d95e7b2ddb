//! Commission arithmetic
//!
//! Splits are computed with exact decimals, rounding half away from zero at
//! 2 decimal places. The organizer payout is derived by subtraction, so
//! commission plus payout reproduces the gross amount exactly.

use crate::error::{Error, Result};
use rust_decimal::{Decimal, RoundingStrategy};

/// Scale used for stored commission rates (fraction, e.g. 0.1000)
pub const RATE_SCALE: u32 = 4;

/// Scale used for money amounts
pub const MONEY_SCALE: u32 = 2;

/// A computed commission split
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionBreakdown {
    /// Rate as a fraction, 4 decimal places
    pub rate: Decimal,
    /// Platform commission, 2 decimal places
    pub platform_commission: Decimal,
    /// Organizer payout, `amount - platform_commission`
    pub organizer_payout: Decimal,
}

/// Convert a percentage (e.g. 10) into a stored rate fraction (0.1000).
///
/// Rates outside `0..=100` are rejected.
pub fn rate_fraction(rate_percent: Decimal) -> Result<Decimal> {
    if rate_percent < Decimal::ZERO || rate_percent > Decimal::ONE_HUNDRED {
        return Err(Error::Validation(format!(
            "commission rate {} out of range 0..=100",
            rate_percent
        )));
    }
    Ok((rate_percent / Decimal::ONE_HUNDRED).round_dp(RATE_SCALE))
}

/// Compute the commission split for `amount` at `rate` (a fraction).
///
/// The commission is `amount * rate` rounded half-away-from-zero to 2
/// decimal places, floored at `minimum_commission`. Amounts too small to
/// carry the minimum commission are rejected rather than producing a
/// negative payout.
pub fn compute(
    amount: Decimal,
    rate: Decimal,
    minimum_commission: Decimal,
) -> Result<CommissionBreakdown> {
    if amount <= Decimal::ZERO {
        return Err(Error::Validation(format!(
            "amount {} must be positive",
            amount
        )));
    }

    let raw = (amount * rate)
        .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);

    let platform_commission = if raw < minimum_commission {
        minimum_commission
    } else {
        raw
    };

    if platform_commission > amount {
        return Err(Error::Validation(format!(
            "amount {} cannot carry minimum commission {}",
            amount, minimum_commission
        )));
    }

    Ok(CommissionBreakdown {
        rate,
        platform_commission,
        organizer_payout: amount - platform_commission,
    })
}
