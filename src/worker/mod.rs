//! Indexing pipeline.
//!
//! - [`monitor`] - Poll loop comparing indexed height with the chain tip
//! - [`walker`] - Height-ordered block walk with batching and retry
//! - [`enrich`] - Per-transaction enrichment
//! - [`pool_cache`] - Latest pool prices attached to transactions
//! - [`buffer`] - Staged records and atomic batch commits

pub mod buffer;
pub mod enrich;
pub mod monitor;
pub mod pool_cache;
pub mod walker;

pub use buffer::{BatchCoordinator, WriteBuffer};
pub use enrich::{BlockContext, Enricher, PriceState};
pub use monitor::{effective_start, CycleOutcome, Monitor, MonitorState};
pub use pool_cache::PoolPriceCache;
pub use walker::{BlockWalker, IndexedBlock, RangeOutcome};
