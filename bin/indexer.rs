use std::sync::Arc;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use defichain_indexer::{Monitor, PostgresClient, RpcClient, Settings};

/// Set to any value to log at debug level.
const DEBUG_ENV: &str = "INDEXER_DEBUG";

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    let level = if std::env::var_os(DEBUG_ENV).is_some() {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new()
        .with_level(level)
        .init()
        .context("Failed to initialize logger")?;

    // Load configuration
    let settings =
        Settings::new().context("Failed to load config.yaml. Please ensure it exists and is valid")?;

    let store = PostgresClient::new(settings.postgres.clone())
        .await
        .context("Failed to initialize database connection")?;
    store.migrate().await?;
    let store = Arc::new(store);

    let chain = Arc::new(RpcClient::new(&settings.rpc)?);

    let cancellation_token = CancellationToken::new();

    let mut monitor = Monitor::new(chain, store, &settings.index);
    let monitor_token = cancellation_token.child_token();
    let monitor_handle = tokio::spawn(async move {
        monitor.run(monitor_token).await;
    });

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Indexer running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    cancellation_token.cancel();

    // The monitor commits whatever is staged before it returns
    info!("Waiting for monitor to stop...");
    let _ = monitor_handle.await;

    info!("Indexer stopped");
    Ok(())
}
