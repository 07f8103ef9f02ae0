//! Account repository and service traits.
//!
//! These traits define the contract for account operations without any
//! database-specific types, allowing for different storage implementations.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::accounts_model::{
    Account, AccountCapital, AccountUpdate, AccountUpdateOutcome, NewAccount, TemporaryCapitalChange,
};
use crate::errors::Result;
use crate::statistics::AccountStat;

/// Trait defining the contract for Account repository operations.
///
/// Every mutation is atomic per account. Balance and temporary capital
/// mutations are idempotent per dedupe key.
#[async_trait]
pub trait AccountRepositoryTrait: Send + Sync {
    /// Persists a new account. Fails with `DatabaseError::UniqueViolation`
    /// when the id is taken.
    async fn add(&self, account: Account) -> Result<Account>;

    fn get(&self, account_id: &str) -> Result<Option<Account>>;

    /// Lists accounts ordered by id.
    ///
    /// # Arguments
    /// * `client_id` - If Some, only this client's accounts
    /// * `search` - If Some, substring match on account id or name
    /// * `show_deleted` - Include soft-deleted accounts
    fn list(
        &self,
        client_id: Option<&str>,
        search: Option<&str>,
        show_deleted: bool,
    ) -> Result<Vec<Account>>;

    async fn update_account(&self, account_id: &str, update: AccountUpdate) -> Result<Account>;

    /// Adds `amount_delta` to the balance unless `operation_id` was already applied.
    async fn update_balance(
        &self,
        operation_id: &str,
        account_id: &str,
        amount_delta: Decimal,
        change_transfer_limit: bool,
    ) -> Result<AccountUpdateOutcome>;

    async fn update_temporary_capital(
        &self,
        operation_key: &str,
        account_id: &str,
        change: TemporaryCapitalChange,
    ) -> Result<AccountUpdateOutcome>;

    /// Clears temporary capital and the transfer limit and re-enables the account.
    async fn erase(&self, account_id: &str) -> Result<Account>;

    async fn set_deleted(&self, account_id: &str, is_deleted: bool) -> Result<Account>;
}

/// Trait defining the contract for account management operations.
#[async_trait]
pub trait AccountManagementServiceTrait: Send + Sync {
    async fn create_account(&self, new_account: NewAccount) -> Result<Account>;

    /// Opens one account per base asset of the trading condition for a new client.
    async fn create_default_accounts(&self, client_id: &str, trading_condition_id: &str)
        -> Result<Vec<Account>>;

    /// Opens an account in `base_asset_id` for every client that has one in the trading condition.
    async fn create_accounts_for_new_base_asset(
        &self,
        trading_condition_id: &str,
        base_asset_id: &str,
    ) -> Result<Vec<Account>>;

    fn list_accounts(&self, search: Option<&str>, show_deleted: bool) -> Result<Vec<Account>>;

    fn get_by_client(&self, client_id: &str, show_deleted: bool) -> Result<Vec<Account>>;

    fn get_by_id(&self, account_id: &str) -> Result<Option<Account>>;

    /// Returns the account when it exists and, unless skipped, is not deleted.
    fn ensure_account_valid(&self, account_id: &str, skip_delete_validation: bool) -> Result<Account>;

    async fn update_account(&self, account_id: &str, update: AccountUpdate) -> Result<Account>;

    async fn set_trading_condition(&self, account_id: &str, trading_condition_id: &str) -> Result<Account>;

    async fn set_disabled(&self, account_id: &str, is_disabled: bool) -> Result<Account>;

    async fn set_withdrawal_disabled(&self, account_id: &str, is_withdrawal_disabled: bool) -> Result<Account>;

    /// Charges the balance back to the configured default and erases the account extras.
    async fn reset_account(&self, account_id: &str) -> Result<Account>;

    async fn delete_account(&self, account_id: &str) -> Result<Account>;

    async fn restore_account(&self, account_id: &str) -> Result<Account>;

    async fn get_account_capital(&self, account: &Account) -> Result<AccountCapital>;

    async fn get_cached_account_statistics(&self, account_id: &str) -> Result<Option<AccountStat>>;

    fn clear_stats_cache(&self, account_id: &str);
}
