//! SQLite storage implementation for the balance change ledger.

mod model;
mod repository;

pub use model::{AccountBalanceChangeDB, NewAccountBalanceChangeDB};
pub use repository::LedgerRepository;
