use std::sync::Arc;

use anyhow::ensure;
use log::{info, warn};

use crate::db::models::{
    AccountRecord, BlockRecord, ChainCursor, DexPriceBook, TransactionRecord, VaultRecord,
};
use crate::db::{BatchWrite, Store};

/// Records staged for the open batch.
#[derive(Debug, Default)]
pub struct WriteBuffer {
    pub blocks: Vec<BlockRecord>,
    pub transactions: Vec<TransactionRecord>,
    pub accounts: Vec<AccountRecord>,
    pub vaults: Vec<VaultRecord>,
    pub dex_prices: DexPriceBook,
    pub pending_cursor: Option<ChainCursor>,
}

impl WriteBuffer {
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.transactions.clear();
        self.accounts.clear();
        self.vaults.clear();
        self.dex_prices.clear();
        self.pending_cursor = None;
    }

    /// Nothing staged, not even a cursor move.
    pub fn is_empty(&self) -> bool {
        self.pending_cursor.is_none()
            && self.blocks.is_empty()
            && self.transactions.is_empty()
            && self.accounts.is_empty()
            && self.vaults.is_empty()
            && self.dex_prices.is_empty()
    }
}

/// Owns the write buffer and the cached cursor; the only writer to storage.
///
/// Staged records stay in memory until [`commit`](Self::commit) hands them
/// to the store as one atomic batch together with the pending cursor.
pub struct BatchCoordinator<S> {
    store: Arc<S>,
    buffer: WriteBuffer,
    cursor: Option<ChainCursor>,
}

impl<S: Store> BatchCoordinator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            buffer: WriteBuffer::default(),
            cursor: None,
        }
    }

    /// Open a new batch, dropping anything still staged.
    pub fn start_batch(&mut self) {
        self.buffer.clear();
    }

    pub fn stage_block(&mut self, block: BlockRecord) {
        self.buffer.blocks.push(block);
    }

    pub fn stage_transaction(&mut self, tx: TransactionRecord) {
        self.buffer.transactions.push(tx);
    }

    pub fn stage_account(&mut self, account: AccountRecord) {
        self.buffer.accounts.push(account);
    }

    pub fn stage_vault(&mut self, vault: VaultRecord) {
        self.buffer.vaults.push(vault);
    }

    /// Merge a block's price samples into the batch.
    pub fn stage_dex_prices(&mut self, prices: DexPriceBook) {
        self.buffer.dex_prices.absorb_book(prices);
    }

    pub fn set_pending_cursor(&mut self, cursor: ChainCursor) {
        self.buffer.pending_cursor = Some(cursor);
    }

    pub fn staged_prices(&self) -> &DexPriceBook {
        &self.buffer.dex_prices
    }

    pub fn buffer(&self) -> &WriteBuffer {
        &self.buffer
    }

    /// Write the staged batch. Returns the new cursor, or `None` when there
    /// was nothing to write. On failure the batch is aborted.
    pub async fn commit(&mut self) -> anyhow::Result<Option<ChainCursor>> {
        let Some(cursor) = self.buffer.pending_cursor.clone() else {
            return Ok(None);
        };

        if let Err(e) = self.write(&cursor).await {
            self.abort();
            return Err(e);
        }

        info!(
            "#{}: {} blk, {} tx, {} vaults, {} acc, {} pri",
            cursor.last_height,
            self.buffer.blocks.len(),
            self.buffer.transactions.len(),
            self.buffer.vaults.len(),
            self.buffer.accounts.len(),
            self.buffer.dex_prices.len()
        );

        self.cursor = Some(cursor.clone());
        self.buffer.clear();
        Ok(Some(cursor))
    }

    async fn write(&mut self, cursor: &ChainCursor) -> anyhow::Result<()> {
        // Checked against storage when the cache is cold (fresh start or after an abort).
        let committed = self.indexed_cursor().await?;
        if !committed.is_empty() {
            ensure!(
                cursor.last_height > committed.last_height,
                "cursor would regress from {} to {}",
                committed.last_height,
                cursor.last_height
            );
        }

        let dex_prices = self.buffer.dex_prices.to_vec();
        self.store
            .write_batch(BatchWrite {
                cursor,
                blocks: &self.buffer.blocks,
                transactions: &self.buffer.transactions,
                accounts: &self.buffer.accounts,
                vaults: &self.buffer.vaults,
                dex_prices: &dex_prices,
            })
            .await
    }

    /// Discard the open batch and forget the cached cursor.
    pub fn abort(&mut self) {
        if !self.buffer.is_empty() {
            warn!(
                "Discarding {} staged blocks up to {:?}",
                self.buffer.blocks.len(),
                self.buffer.pending_cursor.as_ref().map(|c| c.last_height)
            );
        }
        self.buffer.clear();
        self.cursor = None;
    }

    /// Last committed cursor, read through to storage when not cached.
    /// The placeholder cursor (height 0, hash "none") stands in for none.
    pub async fn indexed_cursor(&mut self) -> anyhow::Result<ChainCursor> {
        if let Some(cursor) = &self.cursor {
            return Ok(cursor.clone());
        }

        match self.store.load_cursor().await? {
            Some(cursor) => {
                self.cursor = Some(cursor.clone());
                Ok(cursor)
            },
            None => Ok(ChainCursor::empty()),
        }
    }

    pub async fn indexed_height(&mut self) -> anyhow::Result<u64> {
        Ok(self.indexed_cursor().await?.last_height)
    }

    pub async fn indexed_hash(&mut self) -> anyhow::Result<String> {
        Ok(self.indexed_cursor().await?.last_hash)
    }
}
