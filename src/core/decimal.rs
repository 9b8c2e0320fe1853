//! Fixed-point helpers for money math.
//!
//! All amounts are [`Decimal`]; nothing in the engine touches binary floats.

use rust_decimal::{Decimal, RoundingStrategy};

/// Residual amounts at or below this are treated as zero (1e-7).
pub const EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 7);

/// Decimal places kept on a lot's remaining amount after a drain.
pub const LOT_SCALE: u32 = 7;

/// Decimal places of realized profit in fiat terms.
pub const FIAT_PROFIT_SCALE: u32 = 2;

/// Decimal places of realized profit and cost basis in settlement terms.
pub const SETTLEMENT_SCALE: u32 = 4;

/// Round half-up to a whole unit.
pub fn round_whole(value: Decimal) -> Decimal {
    round_to(value, 0)
}

/// Round half-up (away from zero) to `dp` decimal places.
pub fn round_to(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// `1 + percent / 100`.
pub fn percent_factor(percent: Decimal) -> Decimal {
    Decimal::ONE + percent / Decimal::ONE_HUNDRED
}

/// True when `value` is within `epsilon` of zero.
pub fn is_negligible(value: Decimal, epsilon: Decimal) -> bool {
    value.abs() <= epsilon
}
