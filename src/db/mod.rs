use async_trait::async_trait;

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresClient;

use models::{
    AccountRecord, BlockRecord, ChainCursor, DexPriceSample, TransactionRecord, VaultRecord,
};

/// One batch of staged records, handed to storage at commit time.
///
/// Written as a single atomic unit: the cursor upsert and every collection
/// insert become visible together or not at all.
#[derive(Debug, Clone, Copy)]
pub struct BatchWrite<'a> {
    pub cursor: &'a ChainCursor,
    pub blocks: &'a [BlockRecord],
    pub transactions: &'a [TransactionRecord],
    pub accounts: &'a [AccountRecord],
    pub vaults: &'a [VaultRecord],
    pub dex_prices: &'a [DexPriceSample],
}

/// Durable storage used by the indexer.
///
/// Implementations: [`PostgresClient`] for production and [`MemoryStore`]
/// for tests and dry runs.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read the committed progress cursor, `None` before the first commit.
    async fn load_cursor(&self) -> anyhow::Result<Option<ChainCursor>>;

    /// Latest committed price sample of a pool (highest block height).
    async fn latest_dex_price(&self, pool_id: u32) -> anyhow::Result<Option<DexPriceSample>>;

    /// Persist a batch atomically. On error nothing of the batch is visible.
    async fn write_batch(&self, batch: BatchWrite<'_>) -> anyhow::Result<()>;
}
