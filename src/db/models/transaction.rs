use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{SpecialRecord, StateDiff};

/// Custom transaction type that produces reserve changes.
pub const POOL_SWAP: &str = "PoolSwap";

fn is_false(b: &bool) -> bool {
    !*b
}

/// Indexed transaction input.
///
/// `sender` and `value` are resolved from the spent output of the previous
/// transaction; coinbase inputs spend nothing and carry neither.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vout: Option<u32>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub coinbase: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// The spent output had no standard address
    #[serde(default, skip_serializing_if = "is_false")]
    pub data: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub txinwitness: Vec<String>,
}

/// Indexed transaction output with its script reduced to the recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub value: f64,
    pub n: u32,
    #[serde(rename = "tokenId", default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    /// Non-standard output (OP_RETURN payload or unknown script)
    #[serde(default, skip_serializing_if = "is_false")]
    pub data: bool,
}

/// Decoded custom operation, stripped of chain context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomTx {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub results: Value,
}

impl CustomTx {
    pub fn is_pool_swap(&self) -> bool {
        self.kind == POOL_SWAP
    }
}

/// Indexed transaction (PostgreSQL `txs`).
///
/// Primary Key: (block_height, n)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub txid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locktime: Option<u32>,
    pub vin: Vec<InputRecord>,
    pub vout: Vec<OutputRecord>,
    #[serde(rename = "blockHash")]
    pub block_hash: String,
    #[serde(rename = "blockHeight")]
    pub block_height: u64,
    pub time: u64,
    /// Position within the block
    pub n: u32,
    #[serde(rename = "customTx", default, skip_serializing_if = "Option::is_none")]
    pub custom_tx: Option<CustomTx>,
    #[serde(default)]
    pub state: StateDiff,
    pub fee: f64,
    #[serde(rename = "specialType", default, skip_serializing_if = "Option::is_none")]
    pub special_type: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specials: Option<Vec<SpecialRecord>>,
}

impl TransactionRecord {
    pub fn is_pool_swap(&self) -> bool {
        self.custom_tx.as_ref().is_some_and(CustomTx::is_pool_swap)
    }

    /// Sum of the resolved values of all inputs.
    pub fn input_total(&self) -> f64 {
        self.vin.iter().filter_map(|input| input.value).sum()
    }

    pub fn output_total(&self) -> f64 {
        self.vout.iter().map(|output| output.value).sum()
    }

    /// `inputs - outputs`, unchecked: coinbase and partially resolved
    /// transactions yield whatever the arithmetic gives.
    pub fn compute_fee(&self) -> f64 {
        self.input_total() - self.output_total()
    }
}
