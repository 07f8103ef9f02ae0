//! DashMap-backed account repository.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;

use super::accounts_model::{Account, AccountUpdate, AccountUpdateOutcome, TemporaryCapitalChange};
use super::accounts_traits::AccountRepositoryTrait;
use crate::errors::{DatabaseError, Result, ValidationError};
use crate::utils::Clock;

/// Keeps accounts in process memory. Each mutation holds the account's
/// shard lock for its whole read-modify-write.
pub struct InMemoryAccountRepository {
    accounts: DashMap<String, Account>,
    clock: Arc<dyn Clock>,
}

impl InMemoryAccountRepository {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            accounts: DashMap::new(),
            clock,
        }
    }

    fn mutate<F>(&self, account_id: &str, f: F) -> Result<Account>
    where
        F: FnOnce(&mut Account),
    {
        let mut entry = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| ValidationError::AccountNotFound(account_id.to_string()))?;
        f(entry.value_mut());
        Ok(entry.value().clone())
    }
}

#[async_trait]
impl AccountRepositoryTrait for InMemoryAccountRepository {
    async fn add(&self, account: Account) -> Result<Account> {
        match self.accounts.entry(account.id.clone()) {
            Entry::Occupied(_) => Err(DatabaseError::UniqueViolation(format!(
                "accounts.id = {}",
                account.id
            ))
            .into()),
            Entry::Vacant(vacant) => {
                vacant.insert(account.clone());
                Ok(account)
            }
        }
    }

    fn get(&self, account_id: &str) -> Result<Option<Account>> {
        Ok(self.accounts.get(account_id).map(|a| a.value().clone()))
    }

    fn list(
        &self,
        client_id: Option<&str>,
        search: Option<&str>,
        show_deleted: bool,
    ) -> Result<Vec<Account>> {
        let mut accounts: Vec<Account> = self
            .accounts
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|a| show_deleted || !a.is_deleted)
            .filter(|a| client_id.map_or(true, |c| a.client_id == c))
            .filter(|a| {
                search.map_or(true, |s| {
                    a.id.contains(s)
                        || a.account_name.as_deref().is_some_and(|name| name.contains(s))
                })
            })
            .collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(accounts)
    }

    async fn update_account(&self, account_id: &str, update: AccountUpdate) -> Result<Account> {
        let now = self.clock.now();
        self.mutate(account_id, |account| {
            if let Some(trading_condition_id) = update.trading_condition_id {
                account.trading_condition_id = trading_condition_id;
            }
            if let Some(is_disabled) = update.is_disabled {
                account.is_disabled = is_disabled;
            }
            if let Some(is_withdrawal_disabled) = update.is_withdrawal_disabled {
                account.is_withdrawal_disabled = is_withdrawal_disabled;
            }
            account.modification_timestamp = now;
        })
    }

    async fn update_balance(
        &self,
        operation_id: &str,
        account_id: &str,
        amount_delta: Decimal,
        change_transfer_limit: bool,
    ) -> Result<AccountUpdateOutcome> {
        let now = self.clock.now();
        let mut entry = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| ValidationError::AccountNotFound(account_id.to_string()))?;
        let account = entry.value_mut();
        if account.apply_balance_change(operation_id, amount_delta, change_transfer_limit, now) {
            Ok(AccountUpdateOutcome::Applied(account.clone()))
        } else {
            Ok(AccountUpdateOutcome::AlreadyApplied(account.clone()))
        }
    }

    async fn update_temporary_capital(
        &self,
        operation_key: &str,
        account_id: &str,
        change: TemporaryCapitalChange,
    ) -> Result<AccountUpdateOutcome> {
        let now = self.clock.now();
        let mut entry = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| ValidationError::AccountNotFound(account_id.to_string()))?;
        let account = entry.value_mut();
        if account.apply_temporary_capital_change(operation_key, &change, now)? {
            Ok(AccountUpdateOutcome::Applied(account.clone()))
        } else {
            Ok(AccountUpdateOutcome::AlreadyApplied(account.clone()))
        }
    }

    async fn erase(&self, account_id: &str) -> Result<Account> {
        let now = self.clock.now();
        self.mutate(account_id, |account| account.erase(now))
    }

    async fn set_deleted(&self, account_id: &str, is_deleted: bool) -> Result<Account> {
        let now = self.clock.now();
        self.mutate(account_id, |account| {
            account.is_deleted = is_deleted;
            account.modification_timestamp = now;
        })
    }
}
