// Trade and order persistence
pub mod ledger;

pub use ledger::{MemoryLedger, SqliteLedger, TradeLedger};
