use anyhow::Context;
use async_trait::async_trait;
use deadpool_postgres::Transaction;
use log::{debug, error};
use serde::Serialize;
use serde_json::Value;
use tokio_postgres::types::ToSql;

use crate::db::models::{
    AccountRecord, BlockRecord, ChainCursor, DexPriceSample, TransactionRecord, VaultRecord,
    CURSOR_KEY,
};
use crate::db::postgres::PostgresClient;
use crate::db::{BatchWrite, Store};

type Param = Box<dyn ToSql + Sync + Send>;

/// Remove null bytes (0x00) from every string in a document,
/// PostgreSQL rejects them in text and jsonb values
fn sanitize_json(value: &mut Value) {
    match value {
        Value::String(s) if s.contains('\0') => *s = s.replace('\0', ""),
        Value::Array(items) => items.iter_mut().for_each(sanitize_json),
        Value::Object(map) => map.values_mut().for_each(sanitize_json),
        _ => {},
    }
}

fn to_document<T: Serialize>(record: &T) -> anyhow::Result<Value> {
    let mut doc = serde_json::to_value(record)?;
    sanitize_json(&mut doc);
    Ok(doc)
}

fn to_i64(value: u64) -> anyhow::Result<i64> {
    i64::try_from(value).with_context(|| format!("value {} out of range for BIGINT", value))
}

/// Build VALUES placeholders: ($1,$2,...,$n), ($n+1,...), ...
fn values_clause(rows: usize, cols: usize) -> String {
    (0..rows)
        .map(|i| {
            let start = i * cols + 1;
            let placeholders: Vec<String> =
                (start..start + cols).map(|n| format!("${}", n)).collect();
            format!("({})", placeholders.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Multi-row insert of pre-built rows, chunked to stay under the
/// protocol's parameter limit.
async fn insert_rows(
    tx: &Transaction<'_>,
    table: &str,
    columns: &[&str],
    rows: Vec<Vec<Param>>,
) -> anyhow::Result<()> {
    const MAX_PARAMS: usize = 30_000;

    if rows.is_empty() {
        return Ok(());
    }

    let batch_size = (MAX_PARAMS / columns.len()).max(1);

    for chunk in rows.chunks(batch_size) {
        let query = format!(
            "INSERT INTO defichain.{} ({}) VALUES {}",
            table,
            columns.join(", "),
            values_clause(chunk.len(), columns.len())
        );

        let params: Vec<&(dyn ToSql + Sync)> = chunk
            .iter()
            .flatten()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        tx.execute(query.as_str(), &params).await.map_err(|e| {
            error!("Failed to batch insert {} rows into {}: {:?}", chunk.len(), table, e);
            e
        })?;
    }

    debug!("Inserted {} rows into defichain.{}", rows.len(), table);
    Ok(())
}

fn block_rows(blocks: &[BlockRecord]) -> anyhow::Result<Vec<Vec<Param>>> {
    blocks
        .iter()
        .map(|block| {
            Ok(vec![
                Box::new(to_i64(block.height)?) as Param,
                Box::new(block.hash.clone()),
                Box::new(to_i64(block.time)?),
                Box::new(to_document(block)?),
            ])
        })
        .collect()
}

fn transaction_rows(transactions: &[TransactionRecord]) -> anyhow::Result<Vec<Vec<Param>>> {
    transactions
        .iter()
        .map(|tx| {
            Ok(vec![
                Box::new(to_i64(tx.block_height)?) as Param,
                Box::new(i64::from(tx.n)),
                Box::new(tx.txid.clone()),
                Box::new(tx.block_hash.clone()),
                Box::new(tx.fee),
                Box::new(tx.custom_tx.as_ref().map(|c| c.kind.clone())),
                Box::new(to_document(tx)?),
            ])
        })
        .collect()
}

fn snapshot_rows<T: Serialize>(
    records: &[T],
    height: impl Fn(&T) -> u64,
) -> anyhow::Result<Vec<Vec<Param>>> {
    records
        .iter()
        .map(|record| {
            Ok(vec![
                Box::new(to_i64(height(record))?) as Param,
                Box::new(to_document(record)?),
            ])
        })
        .collect()
}

fn dex_price_rows(samples: &[DexPriceSample]) -> anyhow::Result<Vec<Vec<Param>>> {
    samples
        .iter()
        .map(|sample| {
            Ok(vec![
                Box::new(i64::from(sample.pool_id)) as Param,
                Box::new(to_i64(sample.block_height)?),
                Box::new(to_i64(sample.time)?),
                Box::new(sample.price),
                Box::new(sample.price_reverse),
                Box::new(sample.volume_a),
                Box::new(sample.volume_b),
            ])
        })
        .collect()
}

#[async_trait]
impl Store for PostgresClient {
    async fn load_cursor(&self) -> anyhow::Result<Option<ChainCursor>> {
        let client = self.pool.get().await?;
        let query = "SELECT last_hash, last_height FROM defichain.stats WHERE id = $1";

        let row = client.query_opt(query, &[&CURSOR_KEY]).await?;

        match row {
            Some(r) => {
                let last_height: i64 = r.try_get("last_height")?;
                Ok(Some(ChainCursor::new(
                    r.try_get::<_, String>("last_hash")?,
                    u64::try_from(last_height).context("negative cursor height")?,
                )))
            },
            None => Ok(None),
        }
    }

    async fn latest_dex_price(&self, pool_id: u32) -> anyhow::Result<Option<DexPriceSample>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT pool_id, block_height, time, price, price_reverse, volume_a, volume_b
            FROM defichain.dexprices
            WHERE pool_id = $1
            ORDER BY block_height DESC
            LIMIT 1
        "#;

        let row = client.query_opt(query, &[&i64::from(pool_id)]).await?;

        row.map(|r| -> anyhow::Result<DexPriceSample> {
            Ok(DexPriceSample {
                pool_id: u32::try_from(r.try_get::<_, i64>("pool_id")?)?,
                block_height: u64::try_from(r.try_get::<_, i64>("block_height")?)?,
                time: u64::try_from(r.try_get::<_, i64>("time")?)?,
                price: r.try_get("price")?,
                price_reverse: r.try_get("price_reverse")?,
                volume_a: r.try_get("volume_a")?,
                volume_b: r.try_get("volume_b")?,
            })
        })
        .transpose()
    }

    async fn write_batch(&self, batch: BatchWrite<'_>) -> anyhow::Result<()> {
        let blocks = block_rows(batch.blocks)?;
        let transactions = transaction_rows(batch.transactions)?;
        let accounts = snapshot_rows(batch.accounts, |a: &AccountRecord| a.block_height)?;
        let vaults = snapshot_rows(batch.vaults, |v: &VaultRecord| v.block_height)?;
        let dex_prices = dex_price_rows(batch.dex_prices)?;
        let last_height = to_i64(batch.cursor.last_height)?;

        let mut client = self.pool.get().await?;
        // Dropping the transaction without commit rolls everything back.
        let tx = client.transaction().await?;

        tx.execute(
            r#"
            INSERT INTO defichain.stats (id, last_hash, last_height, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (id) DO UPDATE SET
                last_hash = EXCLUDED.last_hash,
                last_height = EXCLUDED.last_height,
                updated_at = NOW()
            "#,
            &[&CURSOR_KEY, &batch.cursor.last_hash, &last_height],
        )
        .await
        .map_err(|e| {
            error!("Failed to update cursor to {}: {:?}", batch.cursor.last_height, e);
            e
        })?;

        insert_rows(&tx, "blocks", &["height", "hash", "time", "doc"], blocks).await?;
        insert_rows(
            &tx,
            "txs",
            &["block_height", "n", "txid", "block_hash", "fee", "custom_type", "doc"],
            transactions,
        )
        .await?;
        insert_rows(&tx, "accounts", &["block_height", "doc"], accounts).await?;
        insert_rows(&tx, "vaults", &["block_height", "doc"], vaults).await?;
        insert_rows(
            &tx,
            "dexprices",
            &[
                "pool_id",
                "block_height",
                "time",
                "price",
                "price_reverse",
                "volume_a",
                "volume_b",
            ],
            dex_prices,
        )
        .await?;

        tx.commit().await.context("Failed to commit batch")?;
        Ok(())
    }
}
