use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::{f64_lenient, u32_lenient};

/// Account-update entry of one block (`getaccountsforblock`), stored as-is
/// and tagged with the block height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    #[serde(rename = "blockHeight")]
    pub block_height: u64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl AccountRecord {
    pub fn new(block_height: u64, fields: Map<String, Value>) -> Self {
        Self {
            block_height,
            fields,
        }
    }
}

/// Vault-update entry of one block (`getvaultsforblock`), stored as-is and
/// tagged with the block height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultRecord {
    #[serde(rename = "blockHeight")]
    pub block_height: u64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl VaultRecord {
    pub fn new(block_height: u64, fields: Map<String, Value>) -> Self {
        Self {
            block_height,
            fields,
        }
    }
}

/// Block-level special operation (`getspecialsforblock`): a balance set
/// outside of any transaction, e.g. by a consensus-driven payout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialRecord {
    pub owner: String,
    #[serde(deserialize_with = "u32_lenient")]
    pub token: u32,
    #[serde(deserialize_with = "f64_lenient")]
    pub new_value: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
