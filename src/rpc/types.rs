//! Node response shapes.
//!
//! Only the fields the indexer keeps are modelled; everything else in the
//! node's JSON (difficulty, chainwork, script hex, sequence numbers, ...)
//! is ignored during decoding.

use serde::Deserialize;
use serde_json::Value;

use crate::db::models::{BlockRecord, CustomTx, InputRecord, OutputRecord};
use crate::utils::{f64_lenient, u32_lenient};

/// `getblock <hash> 2`
#[derive(Debug, Clone, Deserialize)]
pub struct RawBlock {
    pub hash: String,
    pub height: u64,
    pub time: u64,
    #[serde(default)]
    pub minter: Option<String>,
    #[serde(rename = "nTx", default)]
    pub n_tx: Option<u32>,
    #[serde(rename = "previousblockhash", default)]
    pub previous_block_hash: Option<String>,
    #[serde(default)]
    pub tx: Vec<RawTransaction>,
}

impl RawBlock {
    /// Split into the stored header and the embedded transactions.
    pub fn into_parts(self) -> (BlockRecord, Vec<RawTransaction>) {
        let record = BlockRecord {
            hash: self.hash,
            height: self.height,
            time: self.time,
            minter: self.minter,
            n_tx: self.n_tx,
            previous_block_hash: self.previous_block_hash,
        };
        (record, self.tx)
    }
}

/// Transaction as embedded in `getblock` or returned by `getrawtransaction`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTransaction {
    pub txid: String,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub locktime: Option<u32>,
    #[serde(default)]
    pub vin: Vec<RawInput>,
    #[serde(default)]
    pub vout: Vec<RawOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInput {
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub vout: Option<u32>,
    #[serde(default)]
    pub coinbase: Option<String>,
    #[serde(default)]
    pub txinwitness: Vec<String>,
}

impl RawInput {
    /// The previous output this input spends, if any.
    pub fn spent_output(&self) -> Option<(&str, u32)> {
        match (&self.txid, self.vout) {
            (Some(txid), Some(vout)) if self.coinbase.is_none() => Some((txid.as_str(), vout)),
            _ => None,
        }
    }

    pub fn to_record(&self) -> InputRecord {
        InputRecord {
            txid: self.txid.clone(),
            vout: self.vout,
            coinbase: self.coinbase.is_some(),
            txinwitness: self.txinwitness.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOutput {
    #[serde(deserialize_with = "f64_lenient")]
    pub value: f64,
    pub n: u32,
    #[serde(rename = "scriptPubKey", default)]
    pub script_pub_key: ScriptPubKey,
    #[serde(rename = "tokenId", default)]
    pub token_id: Option<u32>,
}

impl RawOutput {
    /// First standard address paid by this output.
    pub fn recipient(&self) -> Option<&str> {
        self.script_pub_key.first_address()
    }

    pub fn to_record(&self) -> OutputRecord {
        let recipient = self.recipient().map(str::to_string);
        OutputRecord {
            value: self.value,
            n: self.n,
            token_id: self.token_id,
            data: recipient.is_none(),
            recipient,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptPubKey {
    #[serde(default)]
    pub addresses: Vec<String>,
    /// Single-address form reported by newer nodes
    #[serde(default)]
    pub address: Option<String>,
}

impl ScriptPubKey {
    pub fn first_address(&self) -> Option<&str> {
        self.addresses
            .first()
            .or(self.address.as_ref())
            .map(String::as_str)
    }
}

/// `getcustomtx <txid> <blockhash>`
#[derive(Debug, Clone, Deserialize)]
pub struct RawCustomTx {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub results: Value,
}

impl RawCustomTx {
    /// Strip the chain context; invalid operations decode to nothing.
    pub fn into_custom_tx(self) -> Option<CustomTx> {
        self.valid.then_some(CustomTx {
            kind: self.kind,
            results: self.results,
        })
    }
}

/// One entry of `listpoolpairs`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PoolPair {
    #[serde(rename = "idTokenA", deserialize_with = "u32_lenient")]
    pub id_token_a: u32,
    #[serde(rename = "idTokenB", deserialize_with = "u32_lenient")]
    pub id_token_b: u32,
    #[serde(default)]
    pub symbol: Option<String>,
}
