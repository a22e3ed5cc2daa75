//! Utility functions for the indexer.
//!
//! - [`conversion`] - Lenient decoding of node ids and amounts
//! - [`price`] - Reserve-based price and volume math

mod conversion;
mod price;

// ============================================
// Common Constants
// ============================================

/// Transaction id given to the synthesized per-block "specials" transaction.
pub const NULL_TXID: &str = "0000000000000000000000000000000000000000000000000000000000000000";

// ============================================
// Re-exports
// ============================================

pub use conversion::{f64_lenient, f64_lenient_opt, parse_amount, u32_lenient};

pub use price::{reserve_prices, reserve_volumes};
