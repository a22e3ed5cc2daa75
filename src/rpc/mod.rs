//! Chain data source.
//!
//! [`ChainSource`] is everything the indexer asks of the node. [`RpcClient`]
//! implements it over the node's JSON-RPC interface; tests use an in-memory
//! double.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

mod client;
mod error;
mod types;

pub use client::RpcClient;
pub use error::RpcError;
pub use types::{PoolPair, RawBlock, RawCustomTx, RawInput, RawOutput, RawTransaction, ScriptPubKey};

use crate::db::models::{SpecialRecord, StateDiff};

#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Height of the current chain tip.
    async fn tip_height(&self) -> anyhow::Result<u64>;

    async fn block_hash(&self, height: u64) -> anyhow::Result<String>;

    /// Full block with its transactions embedded.
    async fn block(&self, hash: &str) -> anyhow::Result<RawBlock>;

    /// Decoded custom operation, `None` when the transaction carries none.
    async fn custom_tx(&self, txid: &str, block_hash: &str) -> anyhow::Result<Option<RawCustomTx>>;

    /// Structured state diff a transaction produced at `height`.
    async fn state_diff(&self, txid: &str, height: u64) -> anyhow::Result<Option<StateDiff>>;

    /// A previously confirmed transaction, for resolving spent outputs.
    async fn raw_transaction(&self, txid: &str) -> anyhow::Result<Arc<RawTransaction>>;

    /// Every trading pair, as `(pool id, pair)` sorted by pool id.
    async fn pool_pairs(&self) -> anyhow::Result<Vec<(u32, PoolPair)>>;

    async fn specials_for_block(&self, height: u64) -> anyhow::Result<Vec<SpecialRecord>>;

    async fn accounts_for_block(&self, height: u64) -> anyhow::Result<Vec<Map<String, Value>>>;

    async fn vaults_for_block(&self, height: u64) -> anyhow::Result<Vec<Map<String, Value>>>;
}
