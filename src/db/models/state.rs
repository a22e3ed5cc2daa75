use serde::{Deserialize, Serialize};

use super::DexPriceSample;
use crate::utils::{f64_lenient, f64_lenient_opt, u32_lenient};

/// Structured state diff of a transaction (`getundo`), plus the pool prices
/// attached during enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDiff {
    #[serde(default)]
    pub balance_changes: Vec<BalanceChange>,
    #[serde(default)]
    pub reserve_changes: Vec<ReserveChange>,
    /// Latest price of every pool relevant to this transaction
    #[serde(default)]
    pub main_pools: Vec<DexPriceSample>,
}

/// Token balance change of one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub owner: String,
    #[serde(deserialize_with = "u32_lenient")]
    pub token: u32,
    #[serde(
        default,
        deserialize_with = "f64_lenient_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub old_amount: Option<f64>,
    #[serde(deserialize_with = "f64_lenient")]
    pub new_amount: f64,
}

/// Pool reserves before and after a swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveChange {
    #[serde(rename = "poolId", deserialize_with = "u32_lenient")]
    pub pool_id: u32,
    #[serde(rename = "oldReserveA", deserialize_with = "f64_lenient")]
    pub old_reserve_a: f64,
    #[serde(rename = "newReserveA", deserialize_with = "f64_lenient")]
    pub new_reserve_a: f64,
    #[serde(rename = "oldReserveB", deserialize_with = "f64_lenient")]
    pub old_reserve_b: f64,
    #[serde(rename = "newReserveB", deserialize_with = "f64_lenient")]
    pub new_reserve_b: f64,
}
