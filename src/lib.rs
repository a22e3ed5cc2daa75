pub mod config;
pub mod db;
pub mod rpc;
pub mod utils;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::Settings;
pub use db::{MemoryStore, PostgresClient, Store};
pub use rpc::{ChainSource, RpcClient};
pub use worker::{BlockWalker, Monitor};
