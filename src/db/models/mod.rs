mod block;
mod cursor;
mod dex_price;
mod snapshot;
mod state;
mod transaction;

pub use block::BlockRecord;
pub use cursor::{ChainCursor, CURSOR_KEY, NO_HASH};
pub use dex_price::{DexPriceBook, DexPriceSample};
pub use snapshot::{AccountRecord, SpecialRecord, VaultRecord};
pub use state::{BalanceChange, ReserveChange, StateDiff};
pub use transaction::{CustomTx, InputRecord, OutputRecord, TransactionRecord, POOL_SWAP};
