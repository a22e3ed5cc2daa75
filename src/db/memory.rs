//! In-memory storage backend.
//!
//! Keeps every collection in RAM behind one mutex, so a batch is applied
//! atomically with respect to readers. All data is lost when the process
//! exits. Used by the tests and for dry runs against a live node.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::bail;
use async_trait::async_trait;

use super::models::{
    AccountRecord, BlockRecord, ChainCursor, DexPriceSample, TransactionRecord, VaultRecord,
};
use super::{BatchWrite, Store};

#[derive(Debug, Default)]
struct Collections {
    cursor: Option<ChainCursor>,
    blocks: Vec<BlockRecord>,
    transactions: Vec<TransactionRecord>,
    accounts: Vec<AccountRecord>,
    vaults: Vec<VaultRecord>,
    dex_prices: Vec<DexPriceSample>,
    committed_cursors: Vec<ChainCursor>,
    #[cfg(test)]
    failing_writes: usize,
}

/// In-memory indexer storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collections> {
        // Batches are validated before any mutation, so a poisoned lock still guards consistent data.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn cursor(&self) -> Option<ChainCursor> {
        self.lock().cursor.clone()
    }

    pub fn blocks(&self) -> Vec<BlockRecord> {
        self.lock().blocks.clone()
    }

    pub fn transactions(&self) -> Vec<TransactionRecord> {
        self.lock().transactions.clone()
    }

    pub fn accounts(&self) -> Vec<AccountRecord> {
        self.lock().accounts.clone()
    }

    pub fn vaults(&self) -> Vec<VaultRecord> {
        self.lock().vaults.clone()
    }

    pub fn dex_prices(&self) -> Vec<DexPriceSample> {
        self.lock().dex_prices.clone()
    }

    /// Number of successful batch writes.
    pub fn commit_count(&self) -> usize {
        self.lock().committed_cursors.len()
    }

    /// Cursor written by each successful batch, oldest first.
    pub fn committed_cursors(&self) -> Vec<ChainCursor> {
        self.lock().committed_cursors.clone()
    }

    /// Seed a committed price sample, as if written by an earlier run.
    pub fn insert_dex_price(&self, sample: DexPriceSample) {
        self.lock().dex_prices.push(sample);
    }

    /// Make the next `n` batch writes fail.
    #[cfg(test)]
    pub fn fail_next_writes(&self, n: usize) {
        self.lock().failing_writes = n;
    }
}

/// Reject batches that would break a primary key, before touching anything.
fn check_unique(data: &Collections, batch: &BatchWrite<'_>) -> anyhow::Result<()> {
    let mut heights: HashSet<u64> = data.blocks.iter().map(|b| b.height).collect();
    for block in batch.blocks {
        if !heights.insert(block.height) {
            bail!("duplicate key in blocks: height {}", block.height);
        }
    }

    let mut tx_keys: HashSet<(u64, u32)> = data
        .transactions
        .iter()
        .map(|t| (t.block_height, t.n))
        .collect();
    for tx in batch.transactions {
        if !tx_keys.insert((tx.block_height, tx.n)) {
            bail!("duplicate key in txs: ({}, {})", tx.block_height, tx.n);
        }
    }

    let mut price_keys: HashSet<(u32, u64)> = data.dex_prices.iter().map(|p| p.key()).collect();
    for price in batch.dex_prices {
        if !price_keys.insert(price.key()) {
            bail!(
                "duplicate key in dexprices: ({}, {})",
                price.pool_id,
                price.block_height
            );
        }
    }

    Ok(())
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_cursor(&self) -> anyhow::Result<Option<ChainCursor>> {
        Ok(self.lock().cursor.clone())
    }

    async fn latest_dex_price(&self, pool_id: u32) -> anyhow::Result<Option<DexPriceSample>> {
        Ok(self
            .lock()
            .dex_prices
            .iter()
            .filter(|p| p.pool_id == pool_id)
            .max_by_key(|p| p.block_height)
            .cloned())
    }

    async fn write_batch(&self, batch: BatchWrite<'_>) -> anyhow::Result<()> {
        let mut data = self.lock();

        #[cfg(test)]
        if data.failing_writes > 0 {
            data.failing_writes -= 1;
            bail!("injected write failure");
        }

        check_unique(&data, &batch)?;

        data.cursor = Some(batch.cursor.clone());
        data.blocks.extend_from_slice(batch.blocks);
        data.transactions.extend_from_slice(batch.transactions);
        data.accounts.extend_from_slice(batch.accounts);
        data.vaults.extend_from_slice(batch.vaults);
        data.dex_prices.extend_from_slice(batch.dex_prices);
        data.committed_cursors.push(batch.cursor.clone());

        Ok(())
    }
}
