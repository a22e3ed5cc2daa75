#[allow(clippy::module_inception)]
mod config;

pub use config::{IndexSettings, PostgresSettings, RpcSettings, Settings};
