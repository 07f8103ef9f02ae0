//! Accounts module - domain models, services, and traits.

mod accounts_constants;
mod accounts_model;
mod accounts_service;
mod accounts_traits;
mod memory;



// Re-export the public interface
pub use accounts_constants::*;
pub use accounts_model::{
    update_temporary_capital, Account, AccountCapital, AccountUpdate, AccountUpdateOutcome,
    NewAccount, TemporaryCapital, TemporaryCapitalChange, TemporaryCapitalChangeKind,
};
pub use accounts_service::{ensure_account_valid, AccountManagementService};
pub use accounts_traits::{AccountManagementServiceTrait, AccountRepositoryTrait};
pub use memory::InMemoryAccountRepository;
