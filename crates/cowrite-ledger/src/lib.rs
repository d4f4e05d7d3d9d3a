pub mod error;
pub mod ledger;

pub use error::LedgerError;
pub use ledger::{CreateRoundParams, LedgerSnapshot, RoundLedger};
