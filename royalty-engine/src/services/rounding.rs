//! Smart rounding for aggregated money amounts
//!
//! Applied only to per-writer and statement totals, never to individual
//! ledger entries.

use rust_decimal::{Decimal, RoundingStrategy};

/// Standard display precision
pub const STANDARD_DP: u32 = 2;
/// Fallback precision for micro-amounts
pub const MICRO_DP: u32 = 4;

/// Round to 2 places; if a strictly positive amount would become 0.00,
/// round to 4 places instead. Midpoints round away from zero.
pub fn smart_round(amount: Decimal) -> Decimal {
    let standard = amount.round_dp_with_strategy(STANDARD_DP, RoundingStrategy::MidpointAwayFromZero);
    if amount > Decimal::ZERO && standard.is_zero() {
        amount.round_dp_with_strategy(MICRO_DP, RoundingStrategy::MidpointAwayFromZero)
    } else {
        standard
    }
}
