//! Database models for ledger rows.

use std::str::FromStr;

use diesel::prelude::*;

use margin_accounts_core::ledger::{AccountBalanceChange, BalanceChangeReasonType};

use crate::errors::StorageError;
use crate::utils::{format_date, format_timestamp, parse_date, parse_decimal, parse_timestamp};

/// Ledger row as read back. `seq` breaks ties between equal timestamps.
#[derive(Queryable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::account_balance_changes)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AccountBalanceChangeDB {
    pub seq: i64,
    pub id: String,
    pub change_timestamp: String,
    pub account_id: String,
    pub client_id: String,
    pub change_amount: String,
    pub balance: String,
    pub withdraw_transfer_limit: String,
    pub comment: Option<String>,
    pub reason_type: String,
    pub event_source_id: Option<String>,
    pub legal_entity: Option<String>,
    pub audit_log: Option<String>,
    pub instrument: Option<String>,
    pub trading_date: Option<String>,
}

/// Insert and overwrite form; `seq` is assigned by SQLite.
#[derive(Insertable, AsChangeset, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::account_balance_changes)]
#[diesel(treat_none_as_null = true)]
pub struct NewAccountBalanceChangeDB {
    pub id: String,
    pub change_timestamp: String,
    pub account_id: String,
    pub client_id: String,
    pub change_amount: String,
    pub balance: String,
    pub withdraw_transfer_limit: String,
    pub comment: Option<String>,
    pub reason_type: String,
    pub event_source_id: Option<String>,
    pub legal_entity: Option<String>,
    pub audit_log: Option<String>,
    pub instrument: Option<String>,
    pub trading_date: Option<String>,
}

impl TryFrom<AccountBalanceChangeDB> for AccountBalanceChange {
    type Error = StorageError;

    fn try_from(db: AccountBalanceChangeDB) -> Result<Self, Self::Error> {
        let reason_type = BalanceChangeReasonType::from_str(&db.reason_type)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        Ok(Self {
            change_timestamp: parse_timestamp(&db.change_timestamp)?,
            change_amount: parse_decimal(&db.change_amount)?,
            balance: parse_decimal(&db.balance)?,
            withdraw_transfer_limit: parse_decimal(&db.withdraw_transfer_limit)?,
            trading_date: db.trading_date.as_deref().map(parse_date).transpose()?,
            reason_type,
            id: db.id,
            account_id: db.account_id,
            client_id: db.client_id,
            comment: db.comment,
            event_source_id: db.event_source_id,
            legal_entity: db.legal_entity,
            audit_log: db.audit_log,
            instrument: db.instrument,
        })
    }
}

impl From<&AccountBalanceChange> for NewAccountBalanceChangeDB {
    fn from(domain: &AccountBalanceChange) -> Self {
        Self {
            id: domain.id.clone(),
            change_timestamp: format_timestamp(domain.change_timestamp),
            account_id: domain.account_id.clone(),
            client_id: domain.client_id.clone(),
            change_amount: domain.change_amount.to_string(),
            balance: domain.balance.to_string(),
            withdraw_transfer_limit: domain.withdraw_transfer_limit.to_string(),
            comment: domain.comment.clone(),
            reason_type: domain.reason_type.as_str().to_string(),
            event_source_id: domain.event_source_id.clone(),
            legal_entity: domain.legal_entity.clone(),
            audit_log: domain.audit_log.clone(),
            instrument: domain.instrument.clone(),
            trading_date: domain.trading_date.map(format_date),
        }
    }
}
