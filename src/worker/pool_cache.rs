use log::debug;
use rustc_hash::FxHashMap;

use crate::db::models::{DexPriceBook, DexPriceSample};
use crate::db::Store;
use crate::rpc::ChainSource;

/// Latest known price of every pool the indexer has touched.
///
/// Three main pools are always tracked and attached to every transaction;
/// they are reloaded before each block. Any other pool is resolved on demand
/// (memo, then open batch, then storage) and memoized.
pub struct PoolPriceCache {
    main_ids: [u32; 3],
    main: [Option<DexPriceSample>; 3],
    /// On-demand pools, keyed by pool id
    others: FxHashMap<u32, DexPriceSample>,
    /// token id -> non-main pool holding it, built once from `listpoolpairs`
    token_pools: Option<FxHashMap<u32, u32>>,
}

impl PoolPriceCache {
    pub fn new(main_ids: [u32; 3]) -> Self {
        Self {
            main_ids,
            main: [None, None, None],
            others: FxHashMap::default(),
            token_pools: None,
        }
    }

    fn main_slot(&self, pool_id: u32) -> Option<usize> {
        self.main_ids.iter().position(|id| *id == pool_id)
    }

    pub fn is_main_pool(&self, pool_id: u32) -> bool {
        self.main_slot(pool_id).is_some()
    }

    pub fn get(&self, pool_id: u32) -> Option<&DexPriceSample> {
        match self.main_slot(pool_id) {
            Some(slot) => self.main[slot].as_ref(),
            None => self.others.get(&pool_id),
        }
    }

    pub fn set(&mut self, sample: DexPriceSample) {
        match self.main_slot(sample.pool_id) {
            Some(slot) => self.main[slot] = Some(sample),
            None => {
                self.others.insert(sample.pool_id, sample);
            },
        }
    }

    /// Reload the main pools, discarding what the slots held before.
    ///
    /// Samples staged in the open batch win over storage: they are newer
    /// and not yet visible there.
    pub async fn bootstrap_main_pools<S: Store + ?Sized>(
        &mut self,
        store: &S,
        staged: &DexPriceBook,
    ) -> anyhow::Result<()> {
        for (slot, pool_id) in self.main_ids.into_iter().enumerate() {
            self.main[slot] = match staged.latest(pool_id) {
                Some(sample) => Some(sample.clone()),
                None => store.latest_dex_price(pool_id).await?,
            };
        }
        Ok(())
    }

    /// Known main pool prices, in configured order.
    pub fn main_pool_prices(&self) -> impl Iterator<Item = &DexPriceSample> {
        self.main.iter().flatten()
    }

    /// Pool that prices `token`, if any non-main pool trades it.
    ///
    /// The first call fetches the full pair list; the index is kept for the
    /// lifetime of the cache. When several pools trade a token, the one with
    /// the highest pool id wins.
    pub async fn pool_for_token<C: ChainSource + ?Sized>(
        &mut self,
        chain: &C,
        token: u32,
    ) -> anyhow::Result<Option<u32>> {
        if self.token_pools.is_none() {
            let pairs = chain.pool_pairs().await?;
            let mut index = FxHashMap::default();
            for (pool_id, pair) in pairs {
                if self.is_main_pool(pool_id) {
                    continue;
                }
                index.insert(pair.id_token_a, pool_id);
                index.insert(pair.id_token_b, pool_id);
            }
            debug!("Built token to pool index with {} tokens", index.len());
            self.token_pools = Some(index);
        }

        Ok(self
            .token_pools
            .as_ref()
            .and_then(|index| index.get(&token).copied()))
    }

    /// Latest price of a non-main pool. Hits are memoized, misses are not.
    pub async fn resolve<S: Store + ?Sized>(
        &mut self,
        store: &S,
        staged: &DexPriceBook,
        pool_id: u32,
    ) -> anyhow::Result<Option<DexPriceSample>> {
        if let Some(sample) = self.get(pool_id) {
            return Ok(Some(sample.clone()));
        }

        let found = match staged.latest(pool_id) {
            Some(sample) => Some(sample.clone()),
            None => store.latest_dex_price(pool_id).await?,
        };

        if let Some(sample) = &found {
            self.set(sample.clone());
        }
        Ok(found)
    }

    /// Drop on-demand prices that may come from discarded work.
    pub fn forget_uncommitted(&mut self) {
        self.others.clear();
    }
}
