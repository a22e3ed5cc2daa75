use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, info};
use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use url::Url;

use super::{ChainSource, PoolPair, RawBlock, RawCustomTx, RawTransaction, RpcError};
use crate::config::RpcSettings;
use crate::db::models::{SpecialRecord, StateDiff};

/// Upper bound on pairs returned by one `listpoolpairs` call.
const POOL_PAIRS_LIMIT: u32 = 100_000;

#[derive(Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a Value,
}

#[derive(Deserialize)]
struct BlockchainInfo {
    blocks: u64,
}

/// JSON-RPC 1.0 client for a DeFiChain node.
///
/// Previous transactions fetched for sender resolution are kept in a bounded
/// cache; the same funding transaction is typically spent by many inputs.
pub struct RpcClient {
    url: Url,
    http: reqwest::Client,
    user: Option<String>,
    password: Option<String>,
    next_id: AtomicU64,
    tx_cache: Cache<String, Arc<RawTransaction>>,
}

impl RpcClient {
    pub fn new(settings: &RpcSettings) -> anyhow::Result<Self> {
        let url = Url::parse(&settings.url)
            .with_context(|| format!("Invalid RPC URL: {}", settings.url))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let tx_cache = Cache::builder()
            .max_capacity(settings.tx_cache_capacity)
            .build();

        info!("Using DeFiChain node at {}", url);

        Ok(Self {
            url,
            http,
            user: settings.user.clone(),
            password: settings.password.clone(),
            next_id: AtomicU64::new(1),
            tx_cache,
        })
    }

    /// Send one request and return its raw `result`.
    pub async fn call_value(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        debug!("[{}] {}", method, params.get(0).unwrap_or(&Value::Null));

        let request = Request {
            jsonrpc: "1.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params: &params,
        };

        let mut builder = self.http.post(self.url.clone()).json(&request);
        if let Some(user) = &self.user {
            builder = builder.basic_auth(user, self.password.as_ref());
        }

        let http_err = |e: reqwest::Error| RpcError::Http {
            method: method.to_string(),
            message: e.to_string(),
        };

        let resp = builder.send().await.map_err(http_err)?;
        let status = resp.status();
        let text = resp.text().await.map_err(http_err)?;

        // The node reports call errors with HTTP 500 and a JSON body
        let body: Map<String, Value> = match serde_json::from_str(&text) {
            Ok(body) => body,
            Err(e) if status.is_success() => {
                return Err(RpcError::Malformed {
                    method: method.to_string(),
                    message: e.to_string(),
                })
            },
            Err(_) => {
                return Err(RpcError::Http {
                    method: method.to_string(),
                    message: format!("HTTP {}: {}", status.as_u16(), text),
                })
            },
        };

        parse_response(method, body)
    }

    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let result = self.call_value(method, params).await?;
        decode(method, result)
    }

    /// Call a method whose result must be a JSON array.
    async fn call_list<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Vec<T>, RpcError> {
        let result = self.call_value(method, params).await?;
        if !result.is_array() {
            return Err(RpcError::Malformed {
                method: method.to_string(),
                message: "expected an array".to_string(),
            });
        }
        decode(method, result)
    }
}

fn parse_response(method: &str, mut body: Map<String, Value>) -> Result<Value, RpcError> {
    if let Some(err) = body.get("error").filter(|e| !e.is_null()) {
        return Err(RpcError::Node {
            method: method.to_string(),
            code: err.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }

    body.remove("result").ok_or_else(|| RpcError::MissingResult {
        method: method.to_string(),
    })
}

fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, RpcError> {
    serde_json::from_value(value).map_err(|e| RpcError::Malformed {
        method: method.to_string(),
        message: e.to_string(),
    })
}

/// `listpoolpairs` answers with an object keyed by pool id.
fn parse_pool_pairs(value: Value) -> Result<Vec<(u32, PoolPair)>, RpcError> {
    let malformed = |message: String| RpcError::Malformed {
        method: "listpoolpairs".to_string(),
        message,
    };

    let Value::Object(map) = value else {
        return Err(malformed("expected an object keyed by pool id".to_string()));
    };

    let mut pairs = map
        .into_iter()
        .map(|(key, pair)| {
            let id = key
                .parse::<u32>()
                .map_err(|_| malformed(format!("invalid pool id {:?}", key)))?;
            let pair = decode::<PoolPair>("listpoolpairs", pair)?;
            Ok((id, pair))
        })
        .collect::<Result<Vec<_>, RpcError>>()?;

    pairs.sort_by_key(|(id, _)| *id);
    Ok(pairs)
}

#[async_trait]
impl ChainSource for RpcClient {
    async fn tip_height(&self) -> anyhow::Result<u64> {
        let info: BlockchainInfo = self.call("getblockchaininfo", json!([])).await?;
        Ok(info.blocks)
    }

    async fn block_hash(&self, height: u64) -> anyhow::Result<String> {
        Ok(self.call("getblockhash", json!([height])).await?)
    }

    async fn block(&self, hash: &str) -> anyhow::Result<RawBlock> {
        Ok(self.call("getblock", json!([hash, 2])).await?)
    }

    async fn custom_tx(&self, txid: &str, block_hash: &str) -> anyhow::Result<Option<RawCustomTx>> {
        Ok(self.call("getcustomtx", json!([txid, block_hash])).await?)
    }

    async fn state_diff(&self, txid: &str, height: u64) -> anyhow::Result<Option<StateDiff>> {
        Ok(self
            .call("getundo", json!([txid, height.to_string()]))
            .await?)
    }

    async fn raw_transaction(&self, txid: &str) -> anyhow::Result<Arc<RawTransaction>> {
        if let Some(tx) = self.tx_cache.get(txid).await {
            return Ok(tx);
        }

        let tx: RawTransaction = self
            .call("getrawtransaction", json!([txid, true]))
            .await?;
        let tx = Arc::new(tx);
        self.tx_cache.insert(txid.to_string(), tx.clone()).await;

        Ok(tx)
    }

    async fn pool_pairs(&self) -> anyhow::Result<Vec<(u32, PoolPair)>> {
        let params = json!([
            {"start": 0, "including_start": true, "limit": POOL_PAIRS_LIMIT},
            true
        ]);
        let result = self.call_value("listpoolpairs", params).await?;
        Ok(parse_pool_pairs(result)?)
    }

    async fn specials_for_block(&self, height: u64) -> anyhow::Result<Vec<SpecialRecord>> {
        Ok(self
            .call_list("getspecialsforblock", json!([height.to_string()]))
            .await?)
    }

    async fn accounts_for_block(&self, height: u64) -> anyhow::Result<Vec<Map<String, Value>>> {
        Ok(self
            .call_list("getaccountsforblock", json!([height.to_string()]))
            .await?)
    }

    async fn vaults_for_block(&self, height: u64) -> anyhow::Result<Vec<Map<String, Value>>> {
        Ok(self
            .call_list("getvaultsforblock", json!([height.to_string()]))
            .await?)
    }
}
