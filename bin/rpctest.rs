use anyhow::{bail, Context};
use log::{info, LevelFilter};
use serde_json::json;
use simple_logger::SimpleLogger;

use defichain_indexer::{RpcClient, Settings};

/// Decode one custom transaction: `rpctest <txid> <blockhash>`.
#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Debug)
        .init()
        .context("Failed to initialize logger")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [txid, block_hash] = args.as_slice() else {
        bail!("usage: rpctest <txid> <blockhash>");
    };

    let settings = Settings::new().context("Failed to load config.yaml")?;
    let client = RpcClient::new(&settings.rpc)?;

    let custom = client
        .call_value("getcustomtx", json!([txid, block_hash]))
        .await?;
    info!("{}", serde_json::to_string_pretty(&custom)?);

    Ok(())
}
