//! Database model for accounts.

use diesel::prelude::*;

use margin_accounts_core::accounts::{Account, TemporaryCapital};

use crate::errors::StorageError;
use crate::utils::{format_timestamp, parse_decimal, parse_timestamp};

/// Database model for accounts
#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::accounts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct AccountDB {
    pub id: String,
    pub client_id: String,
    pub trading_condition_id: String,
    pub base_asset_id: String,
    pub balance: String,
    pub withdraw_transfer_limit: String,
    pub legal_entity: String,
    pub is_disabled: bool,
    pub is_withdrawal_disabled: bool,
    pub is_deleted: bool,
    pub modification_timestamp: String,
    /// JSON array of temporary capital records.
    pub temporary_capital: String,
    /// JSON array of recent dedupe keys, oldest first.
    pub last_executed_operations: String,
    pub account_name: Option<String>,
}

impl TryFrom<AccountDB> for Account {
    type Error = StorageError;

    fn try_from(db: AccountDB) -> Result<Self, Self::Error> {
        let temporary_capital: Vec<TemporaryCapital> = serde_json::from_str(&db.temporary_capital)?;
        let last_executed_operations: Vec<String> =
            serde_json::from_str(&db.last_executed_operations)?;
        Ok(Self {
            balance: parse_decimal(&db.balance)?,
            withdraw_transfer_limit: parse_decimal(&db.withdraw_transfer_limit)?,
            modification_timestamp: parse_timestamp(&db.modification_timestamp)?,
            id: db.id,
            client_id: db.client_id,
            trading_condition_id: db.trading_condition_id,
            base_asset_id: db.base_asset_id,
            legal_entity: db.legal_entity,
            is_disabled: db.is_disabled,
            is_withdrawal_disabled: db.is_withdrawal_disabled,
            is_deleted: db.is_deleted,
            temporary_capital,
            last_executed_operations,
            account_name: db.account_name,
        })
    }
}

impl TryFrom<&Account> for AccountDB {
    type Error = StorageError;

    fn try_from(domain: &Account) -> Result<Self, Self::Error> {
        Ok(Self {
            id: domain.id.clone(),
            client_id: domain.client_id.clone(),
            trading_condition_id: domain.trading_condition_id.clone(),
            base_asset_id: domain.base_asset_id.clone(),
            balance: domain.balance.to_string(),
            withdraw_transfer_limit: domain.withdraw_transfer_limit.to_string(),
            legal_entity: domain.legal_entity.clone(),
            is_disabled: domain.is_disabled,
            is_withdrawal_disabled: domain.is_withdrawal_disabled,
            is_deleted: domain.is_deleted,
            modification_timestamp: format_timestamp(domain.modification_timestamp),
            temporary_capital: serde_json::to_string(&domain.temporary_capital)?,
            last_executed_operations: serde_json::to_string(&domain.last_executed_operations)?,
            account_name: domain.account_name.clone(),
        })
    }
}
