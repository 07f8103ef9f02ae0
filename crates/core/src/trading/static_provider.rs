//! Configuration-backed implementations of the trading collaborators.
//!
//! Used by the worker when no trading core is attached, and by tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use rust_decimal::Decimal;

use super::trading_model::{AccountTradingStats, TradingCondition};
use super::trading_traits::{
    RealizedPnlProviderTrait, TradingConditionsServiceTrait, TradingStatsProviderTrait,
};
use crate::errors::Result;

pub struct StaticTradingConditionsService {
    conditions: HashMap<String, TradingCondition>,
}

impl StaticTradingConditionsService {
    pub fn new(conditions: Vec<TradingCondition>) -> Self {
        Self {
            conditions: conditions.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }
}

impl TradingConditionsServiceTrait for StaticTradingConditionsService {
    fn get_trading_condition(&self, trading_condition_id: &str) -> Result<Option<TradingCondition>> {
        Ok(self.conditions.get(trading_condition_id).cloned())
    }

    fn default_trading_condition_id(&self) -> Result<Option<String>> {
        let mut defaults: Vec<&TradingCondition> =
            self.conditions.values().filter(|c| c.is_default).collect();
        defaults.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(defaults.first().map(|c| c.id.clone()))
    }
}

/// Settable per-account statistics and realised PnL.
#[derive(Default)]
pub struct StaticTradingStatsProvider {
    stats: DashMap<String, AccountTradingStats>,
    missing_days: DashMap<NaiveDate, ()>,
    profit: DashMap<(String, NaiveDate), Decimal>,
}

impl StaticTradingStatsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stats(&self, account_id: &str, stats: AccountTradingStats) {
        self.stats.insert(account_id.to_string(), stats);
    }

    pub fn set_tax_file_missing(&self, day: NaiveDate) {
        self.missing_days.insert(day, ());
    }

    pub fn set_profit(&self, account_id: &str, day: NaiveDate, profit: Decimal) {
        self.profit.insert((account_id.to_string(), day), profit);
    }
}

#[async_trait]
impl TradingStatsProviderTrait for StaticTradingStatsProvider {
    async fn get_account_stats(&self, account_id: &str) -> Result<AccountTradingStats> {
        Ok(self
            .stats
            .get(account_id)
            .map(|s| s.value().clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl RealizedPnlProviderTrait for StaticTradingStatsProvider {
    async fn tax_file_missing_days(&self) -> Result<Vec<NaiveDate>> {
        let mut days: Vec<NaiveDate> = self.missing_days.iter().map(|d| *d.key()).collect();
        days.sort();
        Ok(days)
    }

    async fn total_profit_on_days(&self, account_id: &str, days: &[NaiveDate]) -> Result<Decimal> {
        Ok(days
            .iter()
            .filter_map(|day| self.profit.get(&(account_id.to_string(), *day)).map(|p| *p.value()))
            .sum())
    }
}
