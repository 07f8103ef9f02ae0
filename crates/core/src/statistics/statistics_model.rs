use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::accounts::{Account, AccountCapital};
use crate::ledger::{total_by_reason, AccountBalanceChange, BalanceChangeReasonType};

/// Statistics of one account for the current trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStat {
    pub account_id: String,
    pub created: DateTime<Utc>,
    pub realised_pnl: Decimal,
    pub unrealised_pnl: Decimal,
    pub deposit_amount: Decimal,
    pub withdrawal_amount: Decimal,
    pub commission_amount: Decimal,
    pub other_amount: Decimal,
    pub account_balance: Decimal,
    /// Balance before the first change of the day.
    pub prev_eod_account_balance: Decimal,
    pub disposable_capital: Decimal,
    pub account_name: Option<String>,
}

const ITEMISED_REASONS: [BalanceChangeReasonType; 4] = [
    BalanceChangeReasonType::RealizedPnL,
    BalanceChangeReasonType::Deposit,
    BalanceChangeReasonType::Withdraw,
    BalanceChangeReasonType::Commission,
];

impl AccountStat {
    /// Builds the statistics from today's ledger rows, oldest first.
    pub fn from_history(
        account: &Account,
        history: &[AccountBalanceChange],
        capital: &AccountCapital,
        created: DateTime<Utc>,
    ) -> Self {
        let first = history.iter().min_by_key(|c| c.change_timestamp);
        let prev_eod_account_balance = first
            .map(|c| c.balance - c.change_amount)
            .unwrap_or(account.balance);

        let other_amount = history
            .iter()
            .filter(|c| !ITEMISED_REASONS.contains(&c.reason_type))
            .map(|c| c.change_amount)
            .sum();

        Self {
            account_id: account.id.clone(),
            created,
            realised_pnl: total_by_reason(history, BalanceChangeReasonType::RealizedPnL),
            unrealised_pnl: total_by_reason(history, BalanceChangeReasonType::UnrealizedDailyPnL),
            deposit_amount: total_by_reason(history, BalanceChangeReasonType::Deposit),
            withdrawal_amount: total_by_reason(history, BalanceChangeReasonType::Withdraw),
            commission_amount: total_by_reason(history, BalanceChangeReasonType::Commission),
            other_amount,
            account_balance: account.balance,
            prev_eod_account_balance,
            disposable_capital: capital.disposable,
            account_name: account.account_name.clone(),
        }
    }
}
