//! Commands and events exchanged over the message bus.
//!
//! Variant names are the versioned message names. Several messages share a
//! body type when their payloads are identical.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::accounts::{Account, TemporaryCapital, TemporaryCapitalChange, TemporaryCapitalChangeKind};
use crate::ledger::{AccountBalanceChange, BalanceChangeReasonType};

// ==================== Message Bodies ====================

/// Body of `DepositStarted` and `WithdrawalStarted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceOperationStarted {
    pub operation_id: String,
    pub timestamp: DateTime<Utc>,
    pub client_id: String,
    pub account_id: String,
    pub amount: Decimal,
    pub comment: Option<String>,
    pub audit_log: Option<String>,
}

/// A step acknowledgement that carries nothing but the operation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStepCompleted {
    pub operation_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationFailed {
    pub operation_id: String,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Body of freeze/unfreeze margin requests sent to the trading core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginRequest {
    pub operation_id: String,
    pub timestamp: DateTime<Utc>,
    pub client_id: String,
    pub account_id: String,
    pub amount: Decimal,
}

/// Body of deposit/withdrawal completion commands and success events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceOperationSucceeded {
    pub operation_id: String,
    pub timestamp: DateTime<Utc>,
    pub client_id: String,
    pub account_id: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBalance {
    pub operation_id: String,
    pub timestamp: DateTime<Utc>,
    pub client_id: String,
    pub account_id: String,
    pub amount_delta: Decimal,
    pub comment: Option<String>,
    pub audit_log: Option<String>,
    /// Name of the workflow that issued the command; echoed on the outcome event.
    pub source: String,
    pub reason_type: BalanceChangeReasonType,
    pub event_source_id: Option<String>,
    pub instrument: Option<String>,
    pub trading_date: Option<NaiveDate>,
    pub change_transfer_limit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountChangedEventType {
    Created,
    Updated,
    BalanceUpdated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountChanged {
    pub operation_id: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub account: Account,
    pub event_type: AccountChangedEventType,
    pub balance_change: Option<AccountBalanceChange>,
    pub previous_snapshot: Option<Account>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalanceChangeFailed {
    pub operation_id: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub account_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiveTemporaryCapitalStarted {
    pub operation_id: String,
    pub timestamp: DateTime<Utc>,
    /// Becomes the id of the granted temporary capital record.
    pub event_source_id: String,
    pub client_id: String,
    pub account_id: String,
    pub amount: Decimal,
    pub reason: String,
    pub comment: Option<String>,
    pub additional_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeTemporaryCapitalStarted {
    pub operation_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_source_id: String,
    pub client_id: String,
    pub account_id: String,
    /// Record to revoke; `None` revokes every record on the account.
    pub revoke_event_source_id: Option<String>,
    pub comment: Option<String>,
    pub additional_info: Option<String>,
    /// Records that are being revoked, kept to restore them on failure.
    pub revoked: Vec<TemporaryCapital>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTemporaryCapital {
    pub operation_id: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub account_id: String,
    pub change: TemporaryCapitalChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryCapitalUpdated {
    pub operation_id: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub account_id: String,
    pub change_kind: TemporaryCapitalChangeKind,
    /// False when the command was a duplicate and the account was left as is.
    #[serde(default = "default_applied")]
    pub applied: bool,
    /// Records removed by this change. Empty when `applied` is false.
    pub removed: Vec<TemporaryCapital>,
}

fn default_applied() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryCapitalUpdateFailed {
    pub operation_id: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub account_id: String,
    pub change_kind: TemporaryCapitalChangeKind,
    pub reason: String,
}

/// Body of `FinishGiveTemporaryCapital` and `FinishRevokeTemporaryCapital`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishTemporaryCapitalOperation {
    pub operation_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_source_id: String,
    pub account_id: String,
    pub amount: Decimal,
    pub fail_reason: Option<String>,
}

impl FinishTemporaryCapitalOperation {
    pub fn is_success(&self) -> bool {
        self.fail_reason.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryCapitalOperationSucceeded {
    pub operation_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_source_id: String,
    pub account_id: String,
    pub amount: Decimal,
}

/// Body of `LiquidationFinished` and `LiquidationFailed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidationCompleted {
    pub operation_id: String,
    pub timestamp: DateTime<Utc>,
    pub account_id: String,
    pub open_positions_remaining: u32,
    pub current_total_capital: Decimal,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyNegativeProtection {
    pub id: String,
    pub correlation_id: String,
    pub causation_id: String,
    pub timestamp: DateTime<Utc>,
    pub client_id: String,
    pub account_id: String,
    pub amount: Decimal,
    pub open_positions_remaining: u32,
    pub current_total_capital: Decimal,
}

// ==================== Envelopes ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    FreezeAmountForDeposit(MarginRequest),
    FreezeAmountForWithdrawal(MarginRequest),
    UnfreezeMarginOnFailWithdrawal(MarginRequest),
    UpdateBalance(UpdateBalance),
    UpdateTemporaryCapital(UpdateTemporaryCapital),
    CompleteDeposit(BalanceOperationSucceeded),
    FailDeposit(OperationFailed),
    CompleteWithdrawal(BalanceOperationSucceeded),
    FailWithdrawal(OperationFailed),
    FinishGiveTemporaryCapital(FinishTemporaryCapitalOperation),
    FinishRevokeTemporaryCapital(FinishTemporaryCapitalOperation),
    NotifyNegativeProtection(NotifyNegativeProtection),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::FreezeAmountForDeposit(_) => "FreezeAmountForDeposit",
            Command::FreezeAmountForWithdrawal(_) => "FreezeAmountForWithdrawal",
            Command::UnfreezeMarginOnFailWithdrawal(_) => "UnfreezeMarginOnFailWithdrawal",
            Command::UpdateBalance(_) => "UpdateBalance",
            Command::UpdateTemporaryCapital(_) => "UpdateTemporaryCapital",
            Command::CompleteDeposit(_) => "CompleteDeposit",
            Command::FailDeposit(_) => "FailDeposit",
            Command::CompleteWithdrawal(_) => "CompleteWithdrawal",
            Command::FailWithdrawal(_) => "FailWithdrawal",
            Command::FinishGiveTemporaryCapital(_) => "FinishGiveTemporaryCapital",
            Command::FinishRevokeTemporaryCapital(_) => "FinishRevokeTemporaryCapital",
            Command::NotifyNegativeProtection(_) => "NotifyNegativeProtection",
        }
    }

    pub fn operation_id(&self) -> &str {
        match self {
            Command::FreezeAmountForDeposit(c)
            | Command::FreezeAmountForWithdrawal(c)
            | Command::UnfreezeMarginOnFailWithdrawal(c) => &c.operation_id,
            Command::UpdateBalance(c) => &c.operation_id,
            Command::UpdateTemporaryCapital(c) => &c.operation_id,
            Command::CompleteDeposit(c) | Command::CompleteWithdrawal(c) => &c.operation_id,
            Command::FailDeposit(c) | Command::FailWithdrawal(c) => &c.operation_id,
            Command::FinishGiveTemporaryCapital(c) | Command::FinishRevokeTemporaryCapital(c) => {
                &c.operation_id
            }
            Command::NotifyNegativeProtection(c) => &c.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    DepositStarted(BalanceOperationStarted),
    AmountForDepositFrozen(OperationStepCompleted),
    AmountForDepositFreezeFailed(OperationFailed),
    DepositSucceeded(BalanceOperationSucceeded),
    DepositFailed(OperationFailed),
    WithdrawalStarted(BalanceOperationStarted),
    AmountForWithdrawalFrozen(OperationStepCompleted),
    AmountForWithdrawalFreezeFailed(OperationFailed),
    UnfreezeMarginOnFailSucceeded(OperationStepCompleted),
    WithdrawalSucceeded(BalanceOperationSucceeded),
    WithdrawalFailed(OperationFailed),
    AccountChanged(AccountChanged),
    AccountBalanceChangeFailed(AccountBalanceChangeFailed),
    GiveTemporaryCapitalStarted(GiveTemporaryCapitalStarted),
    RevokeTemporaryCapitalStarted(RevokeTemporaryCapitalStarted),
    TemporaryCapitalUpdated(TemporaryCapitalUpdated),
    TemporaryCapitalUpdateFailed(TemporaryCapitalUpdateFailed),
    GiveTemporaryCapitalSucceeded(TemporaryCapitalOperationSucceeded),
    GiveTemporaryCapitalFailed(OperationFailed),
    RevokeTemporaryCapitalSucceeded(TemporaryCapitalOperationSucceeded),
    RevokeTemporaryCapitalFailed(OperationFailed),
    LiquidationFinished(LiquidationCompleted),
    LiquidationFailed(LiquidationCompleted),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::DepositStarted(_) => "DepositStarted",
            Event::AmountForDepositFrozen(_) => "AmountForDepositFrozen",
            Event::AmountForDepositFreezeFailed(_) => "AmountForDepositFreezeFailed",
            Event::DepositSucceeded(_) => "DepositSucceeded",
            Event::DepositFailed(_) => "DepositFailed",
            Event::WithdrawalStarted(_) => "WithdrawalStarted",
            Event::AmountForWithdrawalFrozen(_) => "AmountForWithdrawalFrozen",
            Event::AmountForWithdrawalFreezeFailed(_) => "AmountForWithdrawalFreezeFailed",
            Event::UnfreezeMarginOnFailSucceeded(_) => "UnfreezeMarginOnFailSucceeded",
            Event::WithdrawalSucceeded(_) => "WithdrawalSucceeded",
            Event::WithdrawalFailed(_) => "WithdrawalFailed",
            Event::AccountChanged(_) => "AccountChanged",
            Event::AccountBalanceChangeFailed(_) => "AccountBalanceChangeFailed",
            Event::GiveTemporaryCapitalStarted(_) => "GiveTemporaryCapitalStarted",
            Event::RevokeTemporaryCapitalStarted(_) => "RevokeTemporaryCapitalStarted",
            Event::TemporaryCapitalUpdated(_) => "TemporaryCapitalUpdated",
            Event::TemporaryCapitalUpdateFailed(_) => "TemporaryCapitalUpdateFailed",
            Event::GiveTemporaryCapitalSucceeded(_) => "GiveTemporaryCapitalSucceeded",
            Event::GiveTemporaryCapitalFailed(_) => "GiveTemporaryCapitalFailed",
            Event::RevokeTemporaryCapitalSucceeded(_) => "RevokeTemporaryCapitalSucceeded",
            Event::RevokeTemporaryCapitalFailed(_) => "RevokeTemporaryCapitalFailed",
            Event::LiquidationFinished(_) => "LiquidationFinished",
            Event::LiquidationFailed(_) => "LiquidationFailed",
        }
    }

    pub fn operation_id(&self) -> &str {
        match self {
            Event::DepositStarted(e) | Event::WithdrawalStarted(e) => &e.operation_id,
            Event::AmountForDepositFrozen(e)
            | Event::AmountForWithdrawalFrozen(e)
            | Event::UnfreezeMarginOnFailSucceeded(e) => &e.operation_id,
            Event::AmountForDepositFreezeFailed(e)
            | Event::DepositFailed(e)
            | Event::AmountForWithdrawalFreezeFailed(e)
            | Event::WithdrawalFailed(e)
            | Event::GiveTemporaryCapitalFailed(e)
            | Event::RevokeTemporaryCapitalFailed(e) => &e.operation_id,
            Event::DepositSucceeded(e) | Event::WithdrawalSucceeded(e) => &e.operation_id,
            Event::AccountChanged(e) => &e.operation_id,
            Event::AccountBalanceChangeFailed(e) => &e.operation_id,
            Event::GiveTemporaryCapitalStarted(e) => &e.operation_id,
            Event::RevokeTemporaryCapitalStarted(e) => &e.operation_id,
            Event::TemporaryCapitalUpdated(e) => &e.operation_id,
            Event::TemporaryCapitalUpdateFailed(e) => &e.operation_id,
            Event::GiveTemporaryCapitalSucceeded(e) | Event::RevokeTemporaryCapitalSucceeded(e) => {
                &e.operation_id
            }
            Event::LiquidationFinished(e) | Event::LiquidationFailed(e) => &e.operation_id,
        }
    }
}
