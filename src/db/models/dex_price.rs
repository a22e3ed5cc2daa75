use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ReserveChange;
use crate::utils::{reserve_prices, reserve_volumes};

/// Per-block pool price and volume (PostgreSQL `dexprices`).
///
/// Primary Key: (pool_id, block_height)
///
/// When several swaps hit the same pool in the same block they are folded
/// into one sample: volumes add up, price and time come from the last swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DexPriceSample {
    #[serde(rename = "poolId")]
    pub pool_id: u32,
    #[serde(rename = "blockHeight")]
    pub block_height: u64,
    pub time: u64,
    pub price: f64,
    pub price_reverse: f64,
    pub volume_a: f64,
    pub volume_b: f64,
}

impl DexPriceSample {
    /// Derive a sample from one reserve change of a pool swap.
    pub fn from_reserve_change(change: &ReserveChange, block_height: u64, time: u64) -> Self {
        let (price, price_reverse) = reserve_prices(change);
        let (volume_a, volume_b) = reserve_volumes(change);

        Self {
            pool_id: change.pool_id,
            block_height,
            time,
            price,
            price_reverse,
            volume_a,
            volume_b,
        }
    }

    pub fn key(&self) -> (u32, u64) {
        (self.pool_id, self.block_height)
    }

    /// Fold a later swap on the same pool and block into this sample.
    pub fn absorb(&mut self, later: &DexPriceSample) {
        debug_assert_eq!(self.key(), later.key());
        self.time = later.time;
        self.price = later.price;
        self.price_reverse = later.price_reverse;
        self.volume_a += later.volume_a;
        self.volume_b += later.volume_b;
    }
}

/// Price samples keyed by `(pool_id, block_height)`.
///
/// Keys are unique by construction, so flushing the book never produces two
/// rows for the same pool and block.
#[derive(Debug, Clone, Default)]
pub struct DexPriceBook {
    samples: BTreeMap<(u32, u64), DexPriceSample>,
}

impl DexPriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample, merging it into an existing one with the same key.
    /// Returns the merged sample.
    pub fn record(&mut self, sample: DexPriceSample) -> &DexPriceSample {
        use std::collections::btree_map::Entry;

        match self.samples.entry(sample.key()) {
            Entry::Occupied(entry) => {
                let merged = entry.into_mut();
                merged.absorb(&sample);
                merged
            },
            Entry::Vacant(entry) => entry.insert(sample),
        }
    }

    /// Move every sample of `other` into this book.
    pub fn absorb_book(&mut self, other: DexPriceBook) {
        for (_, sample) in other.samples {
            self.record(sample);
        }
    }

    /// Most recent sample of a pool (highest block height).
    pub fn latest(&self, pool_id: u32) -> Option<&DexPriceSample> {
        self.samples
            .range((pool_id, 0)..=(pool_id, u64::MAX))
            .next_back()
            .map(|(_, sample)| sample)
    }

    pub fn get(&self, pool_id: u32, block_height: u64) -> Option<&DexPriceSample> {
        self.samples.get(&(pool_id, block_height))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DexPriceSample> {
        self.samples.values()
    }

    pub fn to_vec(&self) -> Vec<DexPriceSample> {
        self.samples.values().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
