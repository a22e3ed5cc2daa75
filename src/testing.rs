//! In-memory chain double for the worker tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use crate::db::models::{SpecialRecord, StateDiff};
use crate::rpc::{ChainSource, PoolPair, RawBlock, RawCustomTx, RawTransaction};

pub const BLOCK_TIME_BASE: u64 = 1_600_000_000;

pub fn block_hash(height: u64) -> String {
    format!("{:064x}", height + 0xb10c)
}

pub fn block_time(height: u64) -> u64 {
    BLOCK_TIME_BASE + height * 30
}

/// Coinbase transaction paying `value` to `address`.
pub fn coinbase_tx(txid: &str, address: &str, value: f64) -> Value {
    json!({
        "txid": txid,
        "version": 4,
        "size": 120,
        "vin": [{"coinbase": "03abcdef", "sequence": 4294967295u64}],
        "vout": [{
            "value": value,
            "n": 0,
            "scriptPubKey": {"hex": "0014", "addresses": [address]},
            "tokenId": 0
        }]
    })
}

/// Transaction spending `inputs` into outputs `(address, value)`; a `None`
/// address makes an OP_RETURN output.
pub fn spend_tx(txid: &str, inputs: &[(&str, u32)], outputs: &[(Option<&str>, f64)]) -> Value {
    let vin: Vec<Value> = inputs
        .iter()
        .map(|(prev, vout)| {
            json!({"txid": prev, "vout": vout, "scriptSig": {"hex": "00"}, "sequence": 0})
        })
        .collect();
    let vout: Vec<Value> = outputs
        .iter()
        .enumerate()
        .map(|(n, (address, value))| match address {
            Some(address) => json!({
                "value": value,
                "n": n,
                "scriptPubKey": {"hex": "0014", "addresses": [address]},
                "tokenId": 0
            }),
            None => json!({
                "value": value,
                "n": n,
                "scriptPubKey": {"hex": "6a", "type": "nulldata"},
                "tokenId": 0
            }),
        })
        .collect();

    json!({"txid": txid, "hex": "0400", "vin": vin, "vout": vout})
}

#[derive(Default)]
struct MockState {
    blocks: BTreeMap<u64, Value>,
    prev_txs: HashMap<String, Value>,
    custom_txs: HashMap<String, Value>,
    diffs: HashMap<String, StateDiff>,
    specials: HashMap<u64, Vec<SpecialRecord>>,
    accounts: HashMap<u64, Vec<Map<String, Value>>>,
    vaults: HashMap<u64, Vec<Map<String, Value>>>,
    pool_pairs: Vec<(u32, PoolPair)>,
    failing_prev_lookups: usize,
    failing_tip_reads: usize,
    pool_pair_calls: usize,
    prev_lookups: usize,
    state_diff_calls: usize,
    cancel_at: Option<(u64, CancellationToken)>,
}

/// Scriptable [`ChainSource`]. Every setter takes `&self` so a test can
/// keep adjusting the chain while a walker holds it.
#[derive(Default)]
pub struct MockChain {
    inner: Mutex<MockState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a block at `height` holding `txs` (raw `getblock` transaction JSON).
    pub fn add_block(&self, height: u64, txs: Vec<Value>) {
        let block = json!({
            "hash": block_hash(height),
            "height": height,
            "time": block_time(height),
            "difficulty": 1.0,
            "chainwork": "00",
            "minter": "dMinter",
            "nTx": txs.len(),
            "previousblockhash": height.checked_sub(1).map(block_hash),
            "tx": txs
        });
        self.lock().blocks.insert(height, block);
    }

    /// Empty blocks (coinbase only) for every height in the range.
    pub fn add_empty_blocks(&self, heights: std::ops::RangeInclusive<u64>) {
        for height in heights {
            let txid = format!("cb{}", height);
            self.add_block(height, vec![coinbase_tx(&txid, "dMiner", 200.0)]);
        }
    }

    /// Register a confirmed transaction whose outputs can be spent.
    pub fn add_prev_tx(&self, txid: &str, outputs: &[(Option<&str>, f64)]) {
        let tx = spend_tx(txid, &[], outputs);
        self.lock().prev_txs.insert(txid.to_string(), tx);
    }

    pub fn set_custom_tx(&self, txid: &str, kind: &str, valid: bool) {
        let custom = json!({
            "type": kind,
            "valid": valid,
            "results": {"txid": txid},
            "blockHeight": 1,
            "blockHash": "ff",
            "blockTime": 0,
            "confirmations": 1
        });
        self.lock().custom_txs.insert(txid.to_string(), custom);
    }

    pub fn set_state_diff(&self, txid: &str, diff: StateDiff) {
        self.lock().diffs.insert(txid.to_string(), diff);
    }

    pub fn set_specials(&self, height: u64, specials: Vec<SpecialRecord>) {
        self.lock().specials.insert(height, specials);
    }

    pub fn set_accounts(&self, height: u64, accounts: Vec<Map<String, Value>>) {
        self.lock().accounts.insert(height, accounts);
    }

    pub fn set_vaults(&self, height: u64, vaults: Vec<Map<String, Value>>) {
        self.lock().vaults.insert(height, vaults);
    }

    pub fn set_pool_pairs(&self, pairs: Vec<(u32, PoolPair)>) {
        self.lock().pool_pairs = pairs;
    }

    /// Make the next `n` previous-output lookups fail.
    pub fn fail_prev_lookups(&self, n: usize) {
        self.lock().failing_prev_lookups = n;
    }

    pub fn fail_tip_reads(&self, n: usize) {
        self.lock().failing_tip_reads = n;
    }

    /// Cancel `token` when the block at `height` is fetched.
    pub fn cancel_at(&self, height: u64, token: CancellationToken) {
        self.lock().cancel_at = Some((height, token));
    }

    pub fn pool_pair_calls(&self) -> usize {
        self.lock().pool_pair_calls
    }

    pub fn prev_lookups(&self) -> usize {
        self.lock().prev_lookups
    }

    pub fn state_diff_calls(&self) -> usize {
        self.lock().state_diff_calls
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn tip_height(&self) -> anyhow::Result<u64> {
        let mut state = self.lock();
        if state.failing_tip_reads > 0 {
            state.failing_tip_reads -= 1;
            bail!("injected tip failure");
        }
        state
            .blocks
            .keys()
            .next_back()
            .copied()
            .ok_or_else(|| anyhow!("empty chain"))
    }

    async fn block_hash(&self, height: u64) -> anyhow::Result<String> {
        if self.lock().blocks.contains_key(&height) {
            Ok(block_hash(height))
        } else {
            bail!("Block height {} out of range", height)
        }
    }

    async fn block(&self, hash: &str) -> anyhow::Result<RawBlock> {
        let state = self.lock();
        let block = state
            .blocks
            .values()
            .find(|b| b["hash"] == hash)
            .cloned()
            .ok_or_else(|| anyhow!("Block {} not found", hash))?;
        if let Some((height, token)) = &state.cancel_at {
            if block["height"] == *height {
                token.cancel();
            }
        }
        Ok(serde_json::from_value(block)?)
    }

    async fn custom_tx(&self, txid: &str, _block_hash: &str) -> anyhow::Result<Option<RawCustomTx>> {
        match self.lock().custom_txs.get(txid) {
            Some(custom) => Ok(Some(serde_json::from_value(custom.clone())?)),
            None => bail!("Not a custom transaction"),
        }
    }

    async fn state_diff(&self, txid: &str, _height: u64) -> anyhow::Result<Option<StateDiff>> {
        let mut state = self.lock();
        state.state_diff_calls += 1;
        Ok(state.diffs.get(txid).cloned())
    }

    async fn raw_transaction(&self, txid: &str) -> anyhow::Result<Arc<RawTransaction>> {
        let mut state = self.lock();
        state.prev_lookups += 1;
        if state.failing_prev_lookups > 0 {
            state.failing_prev_lookups -= 1;
            bail!("injected lookup failure for {}", txid);
        }
        let tx = state
            .prev_txs
            .get(txid)
            .cloned()
            .ok_or_else(|| anyhow!("No such mempool or blockchain transaction {}", txid))?;
        Ok(Arc::new(serde_json::from_value(tx)?))
    }

    async fn pool_pairs(&self) -> anyhow::Result<Vec<(u32, PoolPair)>> {
        let mut state = self.lock();
        state.pool_pair_calls += 1;
        Ok(state.pool_pairs.clone())
    }

    async fn specials_for_block(&self, height: u64) -> anyhow::Result<Vec<SpecialRecord>> {
        Ok(self.lock().specials.get(&height).cloned().unwrap_or_default())
    }

    async fn accounts_for_block(&self, height: u64) -> anyhow::Result<Vec<Map<String, Value>>> {
        Ok(self.lock().accounts.get(&height).cloned().unwrap_or_default())
    }

    async fn vaults_for_block(&self, height: u64) -> anyhow::Result<Vec<Map<String, Value>>> {
        Ok(self.lock().vaults.get(&height).cloned().unwrap_or_default())
    }
}
