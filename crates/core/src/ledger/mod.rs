//! Ledger module - balance change history.

mod ledger_model;
mod ledger_traits;
mod memory;

pub use ledger_model::{total_by_reason, AccountBalanceChange, BalanceChangeFilter, BalanceChangeReasonType};
pub use ledger_traits::LedgerRepositoryTrait;
pub use memory::InMemoryLedgerRepository;
