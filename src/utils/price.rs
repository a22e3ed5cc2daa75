//! Reserve-based pool pricing.
//!
//! DeFiChain pools are constant-product pools; a swap is reported as the
//! pool's reserves before and after. Price is read straight off the
//! post-swap reserves, volume off the reserve deltas.

use crate::db::models::ReserveChange;

// ============================================
// Price
// ============================================

/// Spot price of token A in units of token B after the swap, and its reciprocal.
///
/// Returned as `(price, price_reverse)` where
/// `price = newReserveA / newReserveB`.
pub fn reserve_prices(change: &ReserveChange) -> (f64, f64) {
    let price = change.new_reserve_a / change.new_reserve_b;
    let price_reverse = change.new_reserve_b / change.new_reserve_a;
    (price, price_reverse)
}

// ============================================
// Volume
// ============================================

/// Traded volume on each side, as absolute reserve deltas `(volume_a, volume_b)`.
pub fn reserve_volumes(change: &ReserveChange) -> (f64, f64) {
    (
        (change.new_reserve_a - change.old_reserve_a).abs(),
        (change.new_reserve_b - change.old_reserve_b).abs(),
    )
}
