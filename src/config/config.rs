use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// PostgreSQL database connection configuration.
///
/// Holds every indexed collection:
/// - Progress cursor (`stats`)
/// - Blocks and transactions
/// - Account / vault snapshots
/// - DEX price samples
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// DeFiChain node JSON-RPC configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct RpcSettings {
    #[serde(default = "default_rpc_url")]
    pub url: String,
    /// Optional, only if the node requires basic auth
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Capacity of the previous-transaction cache used for sender resolution
    #[serde(default = "default_tx_cache_capacity")]
    pub tx_cache_capacity: u64,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            user: None,
            password: None,
            request_timeout_secs: default_request_timeout_secs(),
            tx_cache_capacity: default_tx_cache_capacity(),
        }
    }
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8554".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_tx_cache_capacity() -> u64 {
    50_000
}

/// Indexing behaviour.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexSettings {
    /// The starting block height when monitoring.
    #[serde(default)]
    pub starting_block_height: u64,
    /// Blocks between database commits
    #[serde(default = "default_block_grouping")]
    pub block_grouping: u64,
    /// Idle time between monitor cycles
    #[serde(default = "default_monitor_idle_time_ms")]
    pub monitor_idle_time_ms: u64,
    /// Pools whose latest price is attached to every transaction,
    /// in attachment order (DFI-USDT, DUSD-DFI, DUSD-USDT).
    #[serde(default = "default_main_pools")]
    pub main_pools: [u32; 3],
    /// Tokens already priced through the main pools.
    #[serde(default = "default_base_tokens")]
    pub base_tokens: Vec<u32>,
    /// Also fetch `getvaultsforblock` snapshots.
    #[serde(default)]
    pub index_vaults: bool,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            starting_block_height: 0,
            block_grouping: default_block_grouping(),
            monitor_idle_time_ms: default_monitor_idle_time_ms(),
            main_pools: default_main_pools(),
            base_tokens: default_base_tokens(),
            index_vaults: false,
        }
    }
}

fn default_block_grouping() -> u64 {
    250
}

fn default_monitor_idle_time_ms() -> u64 {
    5_000
}

fn default_main_pools() -> [u32; 3] {
    [6, 17, 101]
}

fn default_base_tokens() -> Vec<u32> {
    vec![0, 3, 13, 15]
}

/// Root application configuration.
///
/// Loaded from `config.yaml` (or `.toml` / `.json`) at startup, with
/// `INDEXER__<SECTION>__<KEY>` environment overrides.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub postgres: PostgresSettings,
    #[serde(default)]
    pub rpc: RpcSettings,
    #[serde(default)]
    pub index: IndexSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .add_source(Environment::with_prefix("INDEXER").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.index.block_grouping == 0 {
            return Err(ConfigError::Message(
                "index.block_grouping must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
