use serde::{Deserialize, Serialize};

/// Indexed block header (PostgreSQL `blocks`).
///
/// Only chain-linkage and minting fields survive; difficulty, chainwork,
/// merkle root, size/weight, version and the embedded transaction list are
/// dropped before staging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub hash: String,
    pub height: u64,
    pub time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minter: Option<String>,
    #[serde(rename = "nTx", default, skip_serializing_if = "Option::is_none")]
    pub n_tx: Option<u32>,
    #[serde(
        rename = "previousblockhash",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub previous_block_hash: Option<String>,
}
