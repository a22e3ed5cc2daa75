use anyhow::{anyhow, Context};
use log::debug;

use crate::db::models::{
    BalanceChange, DexPriceBook, DexPriceSample, SpecialRecord, StateDiff, TransactionRecord,
};
use crate::db::Store;
use crate::rpc::{ChainSource, RawTransaction};
use crate::utils::NULL_TXID;
use crate::worker::pool_cache::PoolPriceCache;

/// `specialType` of the per-block pseudo-transaction.
pub const SPECIAL_TYPE_BALANCES: u32 = 1;

/// Block a transaction belongs to.
#[derive(Debug, Clone, Copy)]
pub struct BlockContext<'a> {
    pub hash: &'a str,
    pub height: u64,
    pub time: u64,
}

/// Price state shared by the transactions of one block.
pub struct PriceState<'a> {
    pub cache: &'a mut PoolPriceCache,
    /// Samples of earlier blocks in the open batch
    pub staged: &'a DexPriceBook,
    /// Samples produced by this block so far
    pub block: &'a mut DexPriceBook,
}

/// Turns node transactions into stored records.
pub struct Enricher<'a, C, S> {
    chain: &'a C,
    store: &'a S,
    base_tokens: &'a [u32],
}

impl<'a, C: ChainSource, S: Store> Enricher<'a, C, S> {
    pub fn new(chain: &'a C, store: &'a S, base_tokens: &'a [u32]) -> Self {
        Self {
            chain,
            store,
            base_tokens,
        }
    }

    /// Enrich the `n`-th transaction of a block.
    ///
    /// Custom payload and state diff are best effort. Resolving the outputs
    /// spent by the inputs is not: any failure there fails the transaction.
    pub async fn enrich(
        &self,
        raw: RawTransaction,
        n: u32,
        block: &BlockContext<'_>,
        prices: &mut PriceState<'_>,
    ) -> anyhow::Result<TransactionRecord> {
        let mut record = TransactionRecord {
            txid: raw.txid.clone(),
            hash: raw.hash.clone(),
            locktime: raw.locktime,
            vin: raw.vin.iter().map(|input| input.to_record()).collect(),
            vout: raw.vout.iter().map(|output| output.to_record()).collect(),
            block_hash: block.hash.to_string(),
            block_height: block.height,
            time: block.time,
            n,
            custom_tx: None,
            state: StateDiff::default(),
            fee: 0.0,
            special_type: None,
            specials: None,
        };

        record.custom_tx = match self.chain.custom_tx(&raw.txid, block.hash).await {
            Ok(custom) => custom.and_then(|c| c.into_custom_tx()),
            Err(e) => {
                debug!("No custom tx for {}: {:#}", raw.txid, e);
                None
            },
        };

        if record.custom_tx.is_some() {
            match self.chain.state_diff(&raw.txid, block.height).await {
                Ok(Some(diff)) => record.state = diff,
                Ok(None) => {},
                Err(e) => debug!("No state diff for {}: {:#}", raw.txid, e),
            }
        }

        for (i, input) in raw.vin.iter().enumerate() {
            let Some((prev_txid, vout)) = input.spent_output() else {
                continue;
            };

            let prev = self
                .chain
                .raw_transaction(prev_txid)
                .await
                .with_context(|| format!("Failed to fetch previous tx {}", prev_txid))?;
            let spent = prev.vout.get(vout as usize).ok_or_else(|| {
                anyhow!(
                    "Output {} of {} does not exist ({} outputs)",
                    vout,
                    prev_txid,
                    prev.vout.len()
                )
            })?;

            let resolved = &mut record.vin[i];
            resolved.sender = spent.recipient().map(str::to_string);
            resolved.data = resolved.sender.is_none();
            resolved.value = Some(spent.value);
        }

        if record.is_pool_swap() {
            for change in &record.state.reserve_changes {
                let sample = DexPriceSample::from_reserve_change(change, block.height, block.time);
                let merged = prices.block.record(sample).clone();
                prices.cache.set(merged);
            }
        }

        self.attach_prices(&mut record.state, prices).await?;
        record.fee = record.compute_fee();

        Ok(record)
    }

    /// Build the pseudo-transaction carrying a block's special operations.
    pub async fn special_transaction(
        &self,
        specials: Vec<SpecialRecord>,
        n: u32,
        block: &BlockContext<'_>,
        prices: &mut PriceState<'_>,
    ) -> anyhow::Result<TransactionRecord> {
        let mut state = StateDiff {
            balance_changes: specials
                .iter()
                .map(|special| BalanceChange {
                    owner: special.owner.clone(),
                    token: special.token,
                    old_amount: None,
                    new_amount: special.new_value,
                })
                .collect(),
            ..Default::default()
        };

        self.attach_prices(&mut state, prices).await?;

        let mut record = TransactionRecord {
            txid: NULL_TXID.to_string(),
            hash: None,
            locktime: None,
            vin: Vec::new(),
            vout: Vec::new(),
            block_hash: block.hash.to_string(),
            block_height: block.height,
            time: block.time,
            n,
            custom_tx: None,
            state,
            fee: 0.0,
            special_type: Some(SPECIAL_TYPE_BALANCES),
            specials: Some(specials),
        };
        record.fee = record.compute_fee();

        Ok(record)
    }

    /// Attach the main pool prices, then the price of every other pool
    /// trading a token whose balance changed. Each pool at most once.
    async fn attach_prices(
        &self,
        state: &mut StateDiff,
        prices: &mut PriceState<'_>,
    ) -> anyhow::Result<()> {
        let mut attached: Vec<u32> = Vec::new();
        for sample in prices.cache.main_pool_prices() {
            attached.push(sample.pool_id);
            state.main_pools.push(sample.clone());
        }

        let tokens: Vec<u32> = state
            .balance_changes
            .iter()
            .map(|change| change.token)
            .filter(|token| !self.base_tokens.contains(token))
            .collect();

        for token in tokens {
            let Some(pool_id) = prices
                .cache
                .pool_for_token(self.chain, token)
                .await
                .context("Failed to build token to pool index")?
            else {
                continue;
            };
            if attached.contains(&pool_id) {
                continue;
            }

            if let Some(sample) = prices.cache.resolve(self.store, prices.staged, pool_id).await? {
                attached.push(pool_id);
                state.main_pools.push(sample);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ReserveChange;
    use crate::db::MemoryStore;
    use crate::rpc::PoolPair;
    use crate::testing::{coinbase_tx, spend_tx, MockChain};
    use serde_json::Map;

    const MAIN: [u32; 3] = [6, 17, 101];
    const BASE: [u32; 4] = [0, 3, 13, 15];

    fn ctx() -> BlockContext<'static> {
        BlockContext {
            hash: "blockhash",
            height: 50,
            time: 1_600_001_500,
        }
    }

    fn raw(value: serde_json::Value) -> RawTransaction {
        serde_json::from_value(value).unwrap()
    }

    fn reserve(pool_id: u32, old_a: f64, new_a: f64, old_b: f64, new_b: f64) -> ReserveChange {
        ReserveChange {
            pool_id,
            old_reserve_a: old_a,
            new_reserve_a: new_a,
            old_reserve_b: old_b,
            new_reserve_b: new_b,
        }
    }

    fn balance(owner: &str, token: u32, amount: f64) -> BalanceChange {
        BalanceChange {
            owner: owner.to_string(),
            token,
            old_amount: None,
            new_amount: amount,
        }
    }

    struct Fixture {
        chain: MockChain,
        store: MemoryStore,
        cache: PoolPriceCache,
        staged: DexPriceBook,
        block: DexPriceBook,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                chain: MockChain::new(),
                store: MemoryStore::new(),
                cache: PoolPriceCache::new(MAIN),
                staged: DexPriceBook::new(),
                block: DexPriceBook::new(),
            }
        }

        async fn enrich(&mut self, tx: serde_json::Value, n: u32) -> anyhow::Result<TransactionRecord> {
            let enricher = Enricher::new(&self.chain, &self.store, &BASE);
            let mut prices = PriceState {
                cache: &mut self.cache,
                staged: &self.staged,
                block: &mut self.block,
            };
            enricher.enrich(raw(tx), n, &ctx(), &mut prices).await
        }
    }

    #[tokio::test]
    async fn test_fee_and_sender_resolution() {
        let mut fx = Fixture::new();
        fx.chain.add_prev_tx("p1", &[(Some("dAlice"), 5.0), (None, 0.0), (Some("dBob"), 2.5)]);
        let tx = spend_tx("t1", &[("p1", 0), ("p1", 2)], &[(Some("dCarol"), 7.0), (None, 0.0)]);

        let record = fx.enrich(tx, 3).await.unwrap();

        assert_eq!(record.n, 3);
        assert_eq!(record.block_height, 50);
        assert_eq!(record.vin[0].sender.as_deref(), Some("dAlice"));
        assert_eq!(record.vin[1].value, Some(2.5));
        assert_eq!(record.vout[0].recipient.as_deref(), Some("dCarol"));
        assert!(record.vout[1].data);
        assert!((record.fee - 0.5).abs() < 1e-12);
        assert!(record.custom_tx.is_none());
        // No custom payload, so no diff lookup
        assert_eq!(fx.chain.state_diff_calls(), 0);
    }

    #[tokio::test]
    async fn test_spent_output_to_data_script() {
        let mut fx = Fixture::new();
        fx.chain.add_prev_tx("p1", &[(None, 1.0)]);
        let record = fx
            .enrich(spend_tx("t1", &[("p1", 0)], &[(Some("dX"), 1.0)]), 0)
            .await
            .unwrap();
        assert!(record.vin[0].sender.is_none());
        assert!(record.vin[0].data);
        assert_eq!(record.fee, 0.0);
    }

    #[tokio::test]
    async fn test_coinbase_fee_is_negative_reward() {
        let mut fx = Fixture::new();
        let record = fx.enrich(coinbase_tx("cb", "dMiner", 200.0), 0).await.unwrap();
        assert!(record.vin[0].coinbase);
        assert_eq!(record.fee, -200.0);
        assert_eq!(fx.chain.prev_lookups(), 0);
    }

    #[tokio::test]
    async fn test_missing_previous_output_is_fatal() {
        let mut fx = Fixture::new();
        fx.chain.add_prev_tx("p1", &[(Some("dAlice"), 5.0)]);
        let err = fx
            .enrich(spend_tx("t1", &[("p1", 4)], &[(Some("dX"), 1.0)]), 0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Output 4 of p1"));

        fx.chain.fail_prev_lookups(1);
        assert!(fx
            .enrich(spend_tx("t2", &[("p1", 0)], &[(Some("dX"), 1.0)]), 0)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_invalid_custom_tx_is_ignored() {
        let mut fx = Fixture::new();
        fx.chain.set_custom_tx("cb", "PoolSwap", false);
        let record = fx.enrich(coinbase_tx("cb", "dMiner", 1.0), 0).await.unwrap();
        assert!(record.custom_tx.is_none());
        assert_eq!(fx.chain.state_diff_calls(), 0);
    }

    #[tokio::test]
    async fn test_pool_swaps_merge_within_block() {
        let mut fx = Fixture::new();
        fx.chain.add_prev_tx("p1", &[(Some("dAlice"), 1.0), (Some("dAlice"), 1.0)]);

        for (txid, vout, change) in [
            ("s1", 0, reserve(6, 100.0, 110.0, 50.0, 40.0)),
            ("s2", 1, reserve(6, 110.0, 100.0, 40.0, 50.0)),
        ] {
            fx.chain.set_custom_tx(txid, "PoolSwap", true);
            fx.chain.set_state_diff(
                txid,
                StateDiff {
                    reserve_changes: vec![change],
                    ..Default::default()
                },
            );
            fx.enrich(spend_tx(txid, &[("p1", vout)], &[(Some("dAlice"), 1.0)]), vout)
                .await
                .unwrap();
        }

        assert_eq!(fx.block.len(), 1);
        let merged = fx.block.get(6, 50).unwrap();
        assert_eq!(merged.volume_a, 20.0);
        assert_eq!(merged.volume_b, 20.0);
        assert_eq!(merged.price, 2.0);
        assert_eq!(fx.cache.get(6), Some(merged));
    }

    #[tokio::test]
    async fn test_swap_price_visible_to_later_transactions() {
        let mut fx = Fixture::new();
        fx.chain.set_custom_tx("s1", "PoolSwap", true);
        fx.chain.set_state_diff(
            "s1",
            StateDiff {
                reserve_changes: vec![reserve(6, 10.0, 12.0, 6.0, 4.0)],
                ..Default::default()
            },
        );

        let swap = fx.enrich(coinbase_tx("s1", "dA", 0.0), 0).await.unwrap();
        assert_eq!(swap.state.main_pools.len(), 1);
        assert_eq!(swap.state.main_pools[0].price, 3.0);

        let next = fx.enrich(coinbase_tx("t2", "dB", 0.0), 1).await.unwrap();
        assert_eq!(next.state.main_pools[0].pool_id, 6);
        assert_eq!(next.state.main_pools[0].price, 3.0);
    }

    #[tokio::test]
    async fn test_balance_tokens_attach_their_pool_once() {
        let mut fx = Fixture::new();
        fx.chain.set_pool_pairs(vec![
            (
                9,
                PoolPair {
                    id_token_a: 2,
                    id_token_b: 0,
                    symbol: Some("BTC-DFI".into()),
                },
            ),
            (
                12,
                PoolPair {
                    id_token_a: 44,
                    id_token_b: 0,
                    symbol: None,
                },
            ),
        ]);
        fx.store.insert_dex_price(DexPriceSample {
            pool_id: 9,
            block_height: 40,
            time: 0,
            price: 25_000.0,
            price_reverse: 0.00004,
            volume_a: 0.0,
            volume_b: 0.0,
        });
        fx.chain.set_custom_tx("t1", "AccountToAccount", true);
        fx.chain.set_state_diff(
            "t1",
            StateDiff {
                balance_changes: vec![
                    balance("dA", 0, 1.0),
                    balance("dA", 2, 0.5),
                    balance("dB", 2, 0.7),
                    balance("dB", 44, 1.0),
                    balance("dB", 77, 1.0),
                ],
                ..Default::default()
            },
        );

        let record = fx.enrich(coinbase_tx("t1", "dA", 0.0), 0).await.unwrap();

        // Pool 12 has no recorded price; token 77 has no pool
        let pools: Vec<u32> = record.state.main_pools.iter().map(|p| p.pool_id).collect();
        assert_eq!(pools, vec![9]);
        assert_eq!(record.custom_tx.unwrap().kind, "AccountToAccount");
        assert_eq!(fx.chain.pool_pair_calls(), 1);
    }

    #[tokio::test]
    async fn test_special_transaction() {
        let mut fx = Fixture::new();
        let specials = vec![
            SpecialRecord {
                owner: "dA".into(),
                token: 0,
                new_value: 10.0,
                extra: Map::new(),
            },
            SpecialRecord {
                owner: "dB".into(),
                token: 15,
                new_value: 3.5,
                extra: Map::new(),
            },
        ];

        let enricher = Enricher::new(&fx.chain, &fx.store, &BASE);
        let mut prices = PriceState {
            cache: &mut fx.cache,
            staged: &fx.staged,
            block: &mut fx.block,
        };
        let record = enricher
            .special_transaction(specials, 4, &ctx(), &mut prices)
            .await
            .unwrap();

        assert_eq!(record.txid, NULL_TXID);
        assert_eq!(record.n, 4);
        assert_eq!(record.special_type, Some(SPECIAL_TYPE_BALANCES));
        assert_eq!(record.specials.as_ref().map(Vec::len), Some(2));
        assert_eq!(record.state.balance_changes[1].owner, "dB");
        assert_eq!(record.state.balance_changes[1].new_amount, 3.5);
        assert!(record.vin.is_empty() && record.vout.is_empty());
        assert_eq!(record.fee, 0.0);
    }
}
