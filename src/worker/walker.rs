use std::sync::Arc;

use anyhow::Context;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::config::IndexSettings;
use crate::db::models::{
    AccountRecord, BlockRecord, ChainCursor, DexPriceBook, TransactionRecord, VaultRecord,
};
use crate::db::Store;
use crate::rpc::ChainSource;
use crate::worker::buffer::BatchCoordinator;
use crate::worker::enrich::{BlockContext, Enricher, PriceState};
use crate::worker::pool_cache::PoolPriceCache;

/// Everything one block contributes to a batch.
///
/// Assembled completely before it is staged, so a failed attempt leaves
/// nothing behind in the write buffer.
#[derive(Debug)]
pub struct IndexedBlock {
    pub block: BlockRecord,
    pub transactions: Vec<TransactionRecord>,
    pub accounts: Vec<AccountRecord>,
    pub vaults: Vec<VaultRecord>,
    pub dex_prices: DexPriceBook,
    pub cursor: ChainCursor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    /// Every height was indexed and committed.
    Completed,
    /// Stopped early on cancellation after committing what was staged.
    Cancelled,
}

/// Walks heights in chain order and groups them into committed batches.
pub struct BlockWalker<C, S> {
    chain: Arc<C>,
    store: Arc<S>,
    coordinator: BatchCoordinator<S>,
    prices: PoolPriceCache,
    block_grouping: u64,
    base_tokens: Vec<u32>,
    index_vaults: bool,
}

impl<C: ChainSource, S: Store> BlockWalker<C, S> {
    pub fn new(chain: Arc<C>, store: Arc<S>, settings: &IndexSettings) -> Self {
        Self {
            coordinator: BatchCoordinator::new(store.clone()),
            chain,
            store,
            prices: PoolPriceCache::new(settings.main_pools),
            block_grouping: settings.block_grouping.max(1),
            base_tokens: settings.base_tokens.clone(),
            index_vaults: settings.index_vaults,
        }
    }

    pub async fn indexed_cursor(&mut self) -> anyhow::Result<ChainCursor> {
        self.coordinator.indexed_cursor().await
    }

    /// Index `start..=end`, committing every `block_grouping` heights and
    /// once more for the remainder.
    ///
    /// Cancellation is checked before each height and after each block; when
    /// seen, the staged blocks are committed and the walk stops. A block that
    /// fails twice aborts the whole open batch.
    pub async fn index_range(
        &mut self,
        start: u64,
        end: u64,
        cancellation_token: &CancellationToken,
    ) -> anyhow::Result<RangeOutcome> {
        info!("Syncing blocks {} to {}", start, end);
        self.coordinator.start_batch();
        let mut pending: u64 = 0;

        for height in start..=end {
            if cancellation_token.is_cancelled() {
                info!("Cancellation requested before block {}", height);
                self.commit().await?;
                return Ok(RangeOutcome::Cancelled);
            }

            match self.index_block_with_retry(height, cancellation_token).await {
                Ok(block) => self.stage(block),
                Err(e) => {
                    error!("Aborting batch at block {}: {:#}", height, e);
                    self.coordinator.abort();
                    self.prices.forget_uncommitted();
                    return Err(e);
                },
            }
            pending += 1;

            if cancellation_token.is_cancelled() {
                info!("Cancellation requested after block {}", height);
                self.commit().await?;
                return Ok(RangeOutcome::Cancelled);
            }

            if pending >= self.block_grouping {
                self.commit().await?;
                pending = 0;
                self.coordinator.start_batch();
            }
        }

        self.commit().await?;
        Ok(RangeOutcome::Completed)
    }

    async fn commit(&mut self) -> anyhow::Result<Option<ChainCursor>> {
        match self.coordinator.commit().await {
            Ok(cursor) => Ok(cursor),
            Err(e) => {
                error!("Fatal error during batch commit: {:#}", e);
                self.prices.forget_uncommitted();
                Err(e)
            },
        }
    }

    /// One retry per block. No retry once shutdown was requested.
    async fn index_block_with_retry(
        &mut self,
        height: u64,
        cancellation_token: &CancellationToken,
    ) -> anyhow::Result<IndexedBlock> {
        match self.index_block(height).await {
            Ok(block) => Ok(block),
            Err(e) => {
                self.prices.forget_uncommitted();
                if cancellation_token.is_cancelled() {
                    return Err(e.context("Shutdown requested, not retrying"));
                }

                warn!("Failed to index block {}: {:#}. Retrying", height, e);
                self.index_block(height)
                    .await
                    .with_context(|| format!("Failed to index block {} after retry", height))
            },
        }
    }

    /// Fetch and enrich one block without staging it.
    pub async fn index_block(&mut self, height: u64) -> anyhow::Result<IndexedBlock> {
        let hash = self
            .chain
            .block_hash(height)
            .await
            .with_context(|| format!("Failed to get hash of block {}", height))?;
        let raw = self
            .chain
            .block(&hash)
            .await
            .with_context(|| format!("Failed to get block {}", hash))?;
        let (block, raw_txs) = raw.into_parts();

        // Main pool prices as of the end of the previous block
        self.prices
            .bootstrap_main_pools(self.store.as_ref(), self.coordinator.staged_prices())
            .await
            .context("Failed to load main pool prices")?;

        let context = BlockContext {
            hash: &block.hash,
            height,
            time: block.time,
        };
        let enricher = Enricher::new(self.chain.as_ref(), self.store.as_ref(), &self.base_tokens);
        let mut dex_prices = DexPriceBook::new();
        let mut prices = PriceState {
            cache: &mut self.prices,
            staged: self.coordinator.staged_prices(),
            block: &mut dex_prices,
        };

        let mut transactions = Vec::with_capacity(raw_txs.len() + 1);
        for (n, raw_tx) in raw_txs.into_iter().enumerate() {
            let txid = raw_tx.txid.clone();
            let tx = enricher
                .enrich(raw_tx, u32::try_from(n)?, &context, &mut prices)
                .await
                .with_context(|| format!("Failed to index tx {}", txid))?;
            transactions.push(tx);
        }

        let specials = self
            .chain
            .specials_for_block(height)
            .await
            .with_context(|| format!("Failed to index specials for block {}", height))?;
        if !specials.is_empty() {
            let n = u32::try_from(transactions.len())?;
            let tx = enricher
                .special_transaction(specials, n, &context, &mut prices)
                .await?;
            transactions.push(tx);
        }

        let accounts = self
            .chain
            .accounts_for_block(height)
            .await
            .with_context(|| format!("Failed to index accounts for block {}", height))?
            .into_iter()
            .map(|fields| AccountRecord::new(height, fields))
            .collect();

        let vaults = if self.index_vaults {
            self.chain
                .vaults_for_block(height)
                .await
                .with_context(|| format!("Failed to index vaults for block {}", height))?
                .into_iter()
                .map(|fields| VaultRecord::new(height, fields))
                .collect()
        } else {
            Vec::new()
        };

        let cursor = ChainCursor::new(block.hash.clone(), height);
        Ok(IndexedBlock {
            block,
            transactions,
            accounts,
            vaults,
            dex_prices,
            cursor,
        })
    }

    fn stage(&mut self, indexed: IndexedBlock) {
        self.coordinator.stage_block(indexed.block);
        for tx in indexed.transactions {
            self.coordinator.stage_transaction(tx);
        }
        for account in indexed.accounts {
            self.coordinator.stage_account(account);
        }
        for vault in indexed.vaults {
            self.coordinator.stage_vault(vault);
        }
        self.coordinator.stage_dex_prices(indexed.dex_prices);
        self.coordinator.set_pending_cursor(indexed.cursor);
    }
}
