//! Ledger repository trait.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;

use super::ledger_model::{AccountBalanceChange, BalanceChangeFilter, BalanceChangeReasonType};
use crate::errors::Result;
use crate::utils::time_utils::start_of_day;

/// Append-oriented store of balance changes.
///
/// Query results are ordered by `change_timestamp` ascending, ties in
/// insertion order.
#[async_trait]
pub trait LedgerRepositoryTrait: Send + Sync {
    /// Idempotent append keyed by `change.id`. A second append with the same
    /// id overwrites the row with the given values and reports success.
    async fn append(&self, change: AccountBalanceChange) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<AccountBalanceChange>>;

    fn query(&self, filter: &BalanceChangeFilter) -> Result<Vec<AccountBalanceChange>>;

    /// Rows of `account_id` with the given event source; `None` matches rows without one.
    fn query_by_event_source(
        &self,
        account_id: &str,
        event_source_id: Option<&str>,
    ) -> Result<Vec<AccountBalanceChange>>;

    /// Most recent row of `account_id`.
    fn latest(&self, account_id: &str) -> Result<Option<AccountBalanceChange>> {
        Ok(self.query(&BalanceChangeFilter::for_account(account_id))?.pop())
    }

    /// Rows of `account_id` on the UTC day `date`.
    fn query_for_day(&self, account_id: &str, date: NaiveDate) -> Result<Vec<AccountBalanceChange>> {
        let since = start_of_day(date);
        self.query(
            &BalanceChangeFilter::for_account(account_id)
                .since(since)
                .until(since + Duration::days(1)),
        )
    }

    /// Sum of `change_amount` for `reason_type` on the UTC day `date`.
    fn sum_by_reason(
        &self,
        account_id: &str,
        reason_type: BalanceChangeReasonType,
        date: NaiveDate,
    ) -> Result<Decimal> {
        let since = start_of_day(date);
        let rows = self.query(
            &BalanceChangeFilter::for_account(account_id)
                .since(since)
                .until(since + Duration::days(1))
                .with_reason(reason_type),
        )?;
        Ok(rows.iter().map(|c| c.change_amount).sum())
    }

    fn compensations_for_day(&self, account_id: &str, date: NaiveDate) -> Result<Decimal> {
        self.sum_by_reason(account_id, BalanceChangeReasonType::Compensation, date)
    }
}
