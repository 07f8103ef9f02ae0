//! Traits for the trading platform services the account service depends on.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::trading_model::{AccountTradingStats, TradingCondition};
use crate::errors::Result;

/// Read access to trading condition settings.
pub trait TradingConditionsServiceTrait: Send + Sync {
    fn get_trading_condition(&self, trading_condition_id: &str) -> Result<Option<TradingCondition>>;

    fn default_trading_condition_id(&self) -> Result<Option<String>>;
}

#[async_trait]
pub trait TradingStatsProviderTrait: Send + Sync {
    /// Open positions, active orders and unrealised PnL of the account.
    async fn get_account_stats(&self, account_id: &str) -> Result<AccountTradingStats>;
}

#[async_trait]
pub trait RealizedPnlProviderTrait: Send + Sync {
    /// Days whose end-of-day tax file has not been received yet.
    async fn tax_file_missing_days(&self) -> Result<Vec<NaiveDate>>;

    /// Sum of realised profit on the given days.
    async fn total_profit_on_days(&self, account_id: &str, days: &[NaiveDate]) -> Result<Decimal>;
}
