//! Balance change ledger models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, ValidationError};

/// Why an account balance moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BalanceChangeReasonType {
    Deposit,
    Withdraw,
    RealizedPnL,
    UnrealizedDailyPnL,
    Commission,
    Manual,
    Reset,
    Create,
    Compensation,
    Dividend,
    OnBehalf,
    Tax,
    TemporaryCashAdjustment,
}

impl BalanceChangeReasonType {
    pub const ALL: [BalanceChangeReasonType; 13] = [
        BalanceChangeReasonType::Deposit,
        BalanceChangeReasonType::Withdraw,
        BalanceChangeReasonType::RealizedPnL,
        BalanceChangeReasonType::UnrealizedDailyPnL,
        BalanceChangeReasonType::Commission,
        BalanceChangeReasonType::Manual,
        BalanceChangeReasonType::Reset,
        BalanceChangeReasonType::Create,
        BalanceChangeReasonType::Compensation,
        BalanceChangeReasonType::Dividend,
        BalanceChangeReasonType::OnBehalf,
        BalanceChangeReasonType::Tax,
        BalanceChangeReasonType::TemporaryCashAdjustment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceChangeReasonType::Deposit => "Deposit",
            BalanceChangeReasonType::Withdraw => "Withdraw",
            BalanceChangeReasonType::RealizedPnL => "RealizedPnL",
            BalanceChangeReasonType::UnrealizedDailyPnL => "UnrealizedDailyPnL",
            BalanceChangeReasonType::Commission => "Commission",
            BalanceChangeReasonType::Manual => "Manual",
            BalanceChangeReasonType::Reset => "Reset",
            BalanceChangeReasonType::Create => "Create",
            BalanceChangeReasonType::Compensation => "Compensation",
            BalanceChangeReasonType::Dividend => "Dividend",
            BalanceChangeReasonType::OnBehalf => "OnBehalf",
            BalanceChangeReasonType::Tax => "Tax",
            BalanceChangeReasonType::TemporaryCashAdjustment => "TemporaryCashAdjustment",
        }
    }
}

impl fmt::Display for BalanceChangeReasonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BalanceChangeReasonType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BalanceChangeReasonType::ALL
            .iter()
            .copied()
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| {
                ValidationError::InvalidInput(format!("Unknown balance change reason type: {}", s)).into()
            })
    }
}

/// One ledger row. `id` is the operation id that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalanceChange {
    pub id: String,
    pub change_timestamp: DateTime<Utc>,
    pub account_id: String,
    pub client_id: String,
    pub change_amount: Decimal,
    /// Balance after this change.
    pub balance: Decimal,
    /// Withdraw transfer limit after this change.
    pub withdraw_transfer_limit: Decimal,
    pub comment: Option<String>,
    pub reason_type: BalanceChangeReasonType,
    pub event_source_id: Option<String>,
    pub legal_entity: Option<String>,
    pub audit_log: Option<String>,
    pub instrument: Option<String>,
    pub trading_date: Option<NaiveDate>,
}

/// Ledger query. `since` is inclusive, `until` exclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalanceChangeFilter {
    pub account_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub reason_type: Option<BalanceChangeReasonType>,
}

impl BalanceChangeFilter {
    pub fn for_account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: Some(account_id.into()),
            ..Self::default()
        }
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_reason(mut self, reason_type: BalanceChangeReasonType) -> Self {
        self.reason_type = Some(reason_type);
        self
    }

    pub fn matches(&self, change: &AccountBalanceChange) -> bool {
        self.account_id
            .as_deref()
            .map_or(true, |id| change.account_id == id)
            && self.since.map_or(true, |since| change.change_timestamp >= since)
            && self.until.map_or(true, |until| change.change_timestamp < until)
            && self.reason_type.map_or(true, |r| change.reason_type == r)
    }
}

/// Sums `change_amount` of rows with the given reason.
pub fn total_by_reason(changes: &[AccountBalanceChange], reason_type: BalanceChangeReasonType) -> Decimal {
    changes
        .iter()
        .filter(|c| c.reason_type == reason_type)
        .map(|c| c.change_amount)
        .sum()
}
