use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use rust_decimal::Decimal;

use margin_accounts_core::accounts::{
    Account, AccountRepositoryTrait, AccountUpdate, AccountUpdateOutcome, TemporaryCapitalChange,
};
use margin_accounts_core::errors::{Result, ValidationError};
use margin_accounts_core::utils::Clock;

use super::model::AccountDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::accounts;
use crate::schema::accounts::dsl::*;

/// Repository for managing account data in the database.
///
/// Every mutation is a read-modify-write inside one writer job, so it runs in
/// a single immediate transaction.
pub struct AccountRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
    clock: Arc<dyn Clock>,
}

impl AccountRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            writer,
            clock,
        }
    }

    async fn mutate<F, T>(&self, account_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Account) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let account_id = account_id.to_string();
        self.writer
            .exec(move |conn| {
                let mut account = load_account(conn, &account_id)?;
                let result = f(&mut account)?;
                save_account(conn, &account)?;
                Ok(result)
            })
            .await
    }
}

fn load_account(conn: &mut SqliteConnection, account_id: &str) -> Result<Account> {
    let row = accounts
        .select(AccountDB::as_select())
        .find(account_id)
        .first::<AccountDB>(conn)
        .optional()
        .into_core()?
        .ok_or_else(|| ValidationError::AccountNotFound(account_id.to_string()))?;
    Account::try_from(row).map_err(Into::into)
}

fn save_account(conn: &mut SqliteConnection, account: &Account) -> Result<()> {
    let row = AccountDB::try_from(account)?;
    diesel::update(accounts.find(&row.id))
        .set(&row)
        .execute(conn)
        .into_core()?;
    Ok(())
}

#[async_trait]
impl AccountRepositoryTrait for AccountRepository {
    async fn add(&self, account: Account) -> Result<Account> {
        let row = AccountDB::try_from(&account)?;
        self.writer
            .exec(move |conn| {
                diesel::insert_into(accounts::table)
                    .values(&row)
                    .execute(conn)
                    .into_core()?;
                Ok(account)
            })
            .await
    }

    fn get(&self, account_id: &str) -> Result<Option<Account>> {
        let mut conn = get_connection(&self.pool)?;

        let row = accounts
            .select(AccountDB::as_select())
            .find(account_id)
            .first::<AccountDB>(&mut conn)
            .optional()
            .into_core()?;

        row.map(|r| Account::try_from(r).map_err(Into::into))
            .transpose()
    }

    fn list(
        &self,
        client_id_filter: Option<&str>,
        search: Option<&str>,
        show_deleted: bool,
    ) -> Result<Vec<Account>> {
        let mut conn = get_connection(&self.pool)?;

        let mut query = accounts::table.into_boxed();

        if !show_deleted {
            query = query.filter(is_deleted.eq(false));
        }

        if let Some(client) = client_id_filter {
            query = query.filter(client_id.eq(client.to_string()));
        }

        if let Some(term) = search {
            let pattern = format!("%{}%", term);
            query = query.filter(id.like(pattern.clone()).or(account_name.like(pattern)));
        }

        let results = query
            .select(AccountDB::as_select())
            .order(id.asc())
            .load::<AccountDB>(&mut conn)
            .into_core()?;

        results
            .into_iter()
            .map(|r| Account::try_from(r).map_err(Into::into))
            .collect()
    }

    async fn update_account(&self, account_id: &str, update: AccountUpdate) -> Result<Account> {
        let now = self.clock.now();
        self.mutate(account_id, move |account| {
            if let Some(condition) = update.trading_condition_id {
                account.trading_condition_id = condition;
            }
            if let Some(disabled) = update.is_disabled {
                account.is_disabled = disabled;
            }
            if let Some(withdrawal_disabled) = update.is_withdrawal_disabled {
                account.is_withdrawal_disabled = withdrawal_disabled;
            }
            account.modification_timestamp = now;
            Ok(account.clone())
        })
        .await
    }

    async fn update_balance(
        &self,
        operation_id: &str,
        account_id: &str,
        amount_delta: Decimal,
        change_transfer_limit: bool,
    ) -> Result<AccountUpdateOutcome> {
        let now = self.clock.now();
        let operation_id = operation_id.to_string();
        self.mutate(account_id, move |account| {
            if account.apply_balance_change(&operation_id, amount_delta, change_transfer_limit, now) {
                Ok(AccountUpdateOutcome::Applied(account.clone()))
            } else {
                Ok(AccountUpdateOutcome::AlreadyApplied(account.clone()))
            }
        })
        .await
    }

    async fn update_temporary_capital(
        &self,
        operation_key: &str,
        account_id: &str,
        change: TemporaryCapitalChange,
    ) -> Result<AccountUpdateOutcome> {
        let now = self.clock.now();
        let operation_key = operation_key.to_string();
        self.mutate(account_id, move |account| {
            if account.apply_temporary_capital_change(&operation_key, &change, now)? {
                Ok(AccountUpdateOutcome::Applied(account.clone()))
            } else {
                Ok(AccountUpdateOutcome::AlreadyApplied(account.clone()))
            }
        })
        .await
    }

    async fn erase(&self, account_id: &str) -> Result<Account> {
        let now = self.clock.now();
        self.mutate(account_id, move |account| {
            account.erase(now);
            Ok(account.clone())
        })
        .await
    }

    async fn set_deleted(&self, account_id: &str, deleted: bool) -> Result<Account> {
        let now = self.clock.now();
        self.mutate(account_id, move |account| {
            account.is_deleted = deleted;
            account.modification_timestamp = now;
            Ok(account.clone())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::{TimeZone, Utc};
    use margin_accounts_core::accounts::TemporaryCapital;
    use margin_accounts_core::errors::{DatabaseError, Error};
    use margin_accounts_core::utils::FixedClock;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn setup() -> (TempDir, AccountRepository) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.db");
        let (pool, writer) = db::open(path.to_str().unwrap()).unwrap();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        ));
        (dir, AccountRepository::new(pool, writer, clock))
    }

    fn account(account_id: &str, client: &str) -> Account {
        Account {
            id: account_id.to_string(),
            client_id: client.to_string(),
            trading_condition_id: "tc-1".to_string(),
            base_asset_id: "EUR".to_string(),
            balance: dec!(0),
            withdraw_transfer_limit: dec!(0),
            legal_entity: "LE-1".to_string(),
            is_disabled: false,
            is_withdrawal_disabled: false,
            is_deleted: false,
            modification_timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            temporary_capital: Vec::new(),
            last_executed_operations: Vec::new(),
            account_name: Some(format!("{} main", account_id)),
        }
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let (_dir, repo) = setup();
        repo.add(account("A", "c1")).await.unwrap();

        let loaded = repo.get("A").unwrap().unwrap();

        assert_eq!(loaded, account("A", "c1"));
        assert!(repo.get("missing").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_add_is_unique_violation() {
        let (_dir, repo) = setup();
        repo.add(account("A", "c1")).await.unwrap();

        let err = repo.add(account("A", "c2")).await.unwrap_err();

        assert!(matches!(err, Error::Database(DatabaseError::UniqueViolation(_))));
    }

    #[tokio::test]
    async fn test_update_balance_is_idempotent_per_operation() {
        let (_dir, repo) = setup();
        repo.add(account("A", "c1")).await.unwrap();

        let first = repo.update_balance("op-1", "A", dec!(12.5), true).await.unwrap();
        let second = repo.update_balance("op-1", "A", dec!(12.5), true).await.unwrap();

        assert!(first.is_applied());
        assert!(!second.is_applied());
        let stored = repo.get("A").unwrap().unwrap();
        assert_eq!(stored.balance, dec!(12.5));
        assert_eq!(stored.withdraw_transfer_limit, dec!(12.5));
        assert_eq!(stored.last_executed_operations, vec!["op-1".to_string()]);
    }

    #[tokio::test]
    async fn test_update_balance_of_missing_account_fails() {
        let (_dir, repo) = setup();

        let err = repo.update_balance("op-1", "nope", dec!(1), false).await.unwrap_err();

        assert!(matches!(err, Error::Validation(ValidationError::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn test_temporary_capital_validation_error_rolls_back() {
        let (_dir, repo) = setup();
        repo.add(account("A", "c1")).await.unwrap();
        let record = TemporaryCapital {
            id: "tc-1".to_string(),
            amount: dec!(10),
            reason: "Promo".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        };
        repo.update_temporary_capital("k1", "A", TemporaryCapitalChange::Add { record: record.clone() })
            .await
            .unwrap();

        let err = repo
            .update_temporary_capital("k2", "A", TemporaryCapitalChange::Add { record })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        let stored = repo.get("A").unwrap().unwrap();
        assert_eq!(stored.temporary_capital.len(), 1);
        assert!(!stored.has_executed("k2"));
    }

    #[tokio::test]
    async fn test_list_filters_and_orders_by_id() {
        let (_dir, repo) = setup();
        repo.add(account("B", "c1")).await.unwrap();
        repo.add(account("A", "c1")).await.unwrap();
        repo.add(account("C", "c2")).await.unwrap();
        repo.set_deleted("B", true).await.unwrap();

        let visible: Vec<String> = repo.list(None, None, false).unwrap().into_iter().map(|a| a.id).collect();
        let client: Vec<String> = repo.list(Some("c1"), None, true).unwrap().into_iter().map(|a| a.id).collect();
        let searched: Vec<String> = repo.list(None, Some("C m"), false).unwrap().into_iter().map(|a| a.id).collect();

        assert_eq!(visible, vec!["A", "C"]);
        assert_eq!(client, vec!["A", "B"]);
        assert_eq!(searched, vec!["C"]);
    }

    #[tokio::test]
    async fn test_erase_clears_temporary_state() {
        let (_dir, repo) = setup();
        let mut seeded = account("A", "c1");
        seeded.is_disabled = true;
        seeded.withdraw_transfer_limit = dec!(40);
        repo.add(seeded).await.unwrap();

        let erased = repo.erase("A").await.unwrap();

        assert!(!erased.is_disabled);
        assert_eq!(erased.withdraw_transfer_limit, dec!(0));
        assert_eq!(repo.get("A").unwrap().unwrap(), erased);
    }
}
