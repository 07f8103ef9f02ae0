//! Account domain models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::accounts_constants::LAST_EXECUTED_OPERATIONS_LIMIT;
use crate::errors::{Result, ValidationError};

/// A temporary capital grant held on an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryCapital {
    pub id: String,
    pub amount: Decimal,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Domain model representing a margin trading account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub client_id: String,
    pub trading_condition_id: String,
    pub base_asset_id: String,
    pub balance: Decimal,
    pub withdraw_transfer_limit: Decimal,
    pub legal_entity: String,
    pub is_disabled: bool,
    pub is_withdrawal_disabled: bool,
    pub is_deleted: bool,
    pub modification_timestamp: DateTime<Utc>,
    pub temporary_capital: Vec<TemporaryCapital>,
    /// Dedupe keys of the most recent mutations, oldest first.
    pub last_executed_operations: Vec<String>,
    pub account_name: Option<String>,
}

impl Account {
    pub fn temporary_capital_total(&self) -> Decimal {
        self.temporary_capital.iter().map(|tc| tc.amount).sum()
    }

    pub fn has_executed(&self, operation_key: &str) -> bool {
        self.last_executed_operations
            .iter()
            .any(|key| key == operation_key)
    }

    fn remember_operation(&mut self, operation_key: &str) {
        self.last_executed_operations.push(operation_key.to_string());
        let overflow = self
            .last_executed_operations
            .len()
            .saturating_sub(LAST_EXECUTED_OPERATIONS_LIMIT);
        if overflow > 0 {
            self.last_executed_operations.drain(..overflow);
        }
    }

    /// Applies a balance delta once per `operation_id`.
    ///
    /// Returns `false` without touching the account when the operation is
    /// already in the recent-operation window.
    pub fn apply_balance_change(
        &mut self,
        operation_id: &str,
        amount_delta: Decimal,
        change_transfer_limit: bool,
        now: DateTime<Utc>,
    ) -> bool {
        if self.has_executed(operation_id) {
            return false;
        }
        self.balance += amount_delta;
        if change_transfer_limit {
            self.withdraw_transfer_limit =
                (self.withdraw_transfer_limit + amount_delta).max(Decimal::ZERO);
        }
        self.modification_timestamp = now;
        self.remember_operation(operation_id);
        true
    }

    /// Applies a temporary capital change once per `operation_key`.
    pub fn apply_temporary_capital_change(
        &mut self,
        operation_key: &str,
        change: &TemporaryCapitalChange,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if self.has_executed(operation_key) {
            return Ok(false);
        }
        self.temporary_capital = update_temporary_capital(&self.id, &self.temporary_capital, change)?;
        self.modification_timestamp = now;
        self.remember_operation(operation_key);
        Ok(true)
    }

    /// Drops temporary capital, clears the transfer limit and re-enables the account.
    pub fn erase(&mut self, now: DateTime<Utc>) {
        self.temporary_capital.clear();
        self.withdraw_transfer_limit = Decimal::ZERO;
        self.is_disabled = false;
        self.modification_timestamp = now;
    }
}

/// Change applied to an account's temporary capital list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TemporaryCapitalChange {
    /// Adds a record; its id must not already be present.
    Add { record: TemporaryCapital },
    /// Removes the record with `id`, or every record when `id` is `None`.
    Remove { id: Option<String> },
    /// Puts previously removed records back, skipping ids that are present.
    Restore { records: Vec<TemporaryCapital> },
}

impl TemporaryCapitalChange {
    pub fn kind(&self) -> TemporaryCapitalChangeKind {
        match self {
            TemporaryCapitalChange::Add { .. } => TemporaryCapitalChangeKind::Add,
            TemporaryCapitalChange::Remove { .. } => TemporaryCapitalChangeKind::Remove,
            TemporaryCapitalChange::Restore { .. } => TemporaryCapitalChangeKind::Restore,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemporaryCapitalChangeKind {
    Add,
    Remove,
    Restore,
}

impl TemporaryCapitalChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemporaryCapitalChangeKind::Add => "add",
            TemporaryCapitalChangeKind::Remove => "remove",
            TemporaryCapitalChangeKind::Restore => "restore",
        }
    }
}

/// Computes the temporary capital list after `change`.
pub fn update_temporary_capital(
    account_id: &str,
    current: &[TemporaryCapital],
    change: &TemporaryCapitalChange,
) -> Result<Vec<TemporaryCapital>> {
    let mut result = current.to_vec();
    match change {
        TemporaryCapitalChange::Add { record } => {
            if result.iter().any(|tc| tc.id == record.id) {
                return Err(ValidationError::InvalidInput(format!(
                    "Temporary capital record with id {} is already set on account {}",
                    record.id, account_id
                ))
                .into());
            }
            result.push(record.clone());
        }
        TemporaryCapitalChange::Remove { id: Some(id) } => result.retain(|tc| &tc.id != id),
        TemporaryCapitalChange::Remove { id: None } => result.clear(),
        TemporaryCapitalChange::Restore { records } => {
            for record in records {
                if !result.iter().any(|tc| tc.id == record.id) {
                    result.push(record.clone());
                }
            }
        }
    }
    Ok(result)
}

/// Result of an idempotent account mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountUpdateOutcome {
    Applied(Account),
    /// The dedupe key was already recorded; the account is returned unchanged.
    AlreadyApplied(Account),
}

impl AccountUpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, AccountUpdateOutcome::Applied(_))
    }

    pub fn account(&self) -> &Account {
        match self {
            AccountUpdateOutcome::Applied(account) | AccountUpdateOutcome::AlreadyApplied(account) => account,
        }
    }

    pub fn into_account(self) -> Account {
        match self {
            AccountUpdateOutcome::Applied(account) | AccountUpdateOutcome::AlreadyApplied(account) => account,
        }
    }
}

/// Input model for opening an account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    /// Generated from the configured prefix when absent.
    pub id: Option<String>,
    pub client_id: String,
    /// The default trading condition is used when empty.
    #[serde(default)]
    pub trading_condition_id: String,
    pub base_asset_id: String,
    pub account_name: Option<String>,
}

impl NewAccount {
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(ValidationError::MissingField("clientId".to_string()).into());
        }
        if self.base_asset_id.trim().is_empty() {
            return Err(ValidationError::MissingField("baseAssetId".to_string()).into());
        }
        if let Some(id) = &self.id {
            if id.trim().is_empty() {
                return Err(ValidationError::InvalidInput("Account id must not be blank".to_string()).into());
            }
        }
        Ok(())
    }
}

/// Partial update of account settings; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdate {
    pub trading_condition_id: Option<String>,
    pub is_disabled: Option<bool>,
    pub is_withdrawal_disabled: Option<bool>,
}

impl AccountUpdate {
    pub fn is_empty(&self) -> bool {
        self.trading_condition_id.is_none()
            && self.is_disabled.is_none()
            && self.is_withdrawal_disabled.is_none()
    }
}

/// Derived capital figures for an account. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountCapital {
    pub balance: Decimal,
    pub total_realised_pnl: Decimal,
    pub unrealised_pnl: Decimal,
    pub temporary_capital: Decimal,
    pub compensations: Decimal,
    pub asset_id: String,
    pub disposable: Decimal,
}

impl AccountCapital {
    pub fn new(
        balance: Decimal,
        total_realised_pnl: Decimal,
        unrealised_pnl: Decimal,
        temporary_capital: Decimal,
        compensations: Decimal,
        asset_id: String,
    ) -> Self {
        // Temporary capital and compensations are already part of the balance.
        let disposable = (balance - temporary_capital - compensations
            + unrealised_pnl.min(Decimal::ZERO))
        .max(Decimal::ZERO);
        Self {
            balance,
            total_realised_pnl,
            unrealised_pnl,
            temporary_capital,
            compensations,
            asset_id,
            disposable,
        }
    }
}
