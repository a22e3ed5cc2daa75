use serde::{Deserialize, Serialize};

/// Well-known key of the singleton cursor row, `md5("stats")`.
pub const CURSOR_KEY: &str = "446501053769c06c565094b26d26e8ef";

/// Hash reported when nothing has been committed yet.
pub const NO_HASH: &str = "none";

/// Indexer progress cursor (PostgreSQL `stats`).
///
/// Tracks the last block whose batch was committed. Used to resume indexing
/// after restarts without missing or duplicating data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCursor {
    #[serde(rename = "lastHash")]
    pub last_hash: String,
    #[serde(rename = "lastHeight")]
    pub last_height: u64,
}

impl ChainCursor {
    pub fn new(last_hash: impl Into<String>, last_height: u64) -> Self {
        Self {
            last_hash: last_hash.into(),
            last_height,
        }
    }

    /// Placeholder returned when storage holds no cursor.
    pub fn empty() -> Self {
        Self::new(NO_HASH, 0)
    }

    /// `true` for the placeholder, `false` once any batch was committed.
    pub fn is_empty(&self) -> bool {
        self.last_hash == NO_HASH
    }
}
