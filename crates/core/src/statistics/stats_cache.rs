//! Per-day statistics cache with time-based expiry.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use log::debug;

use super::statistics_model::AccountStat;
use crate::utils::time_utils::day_key;
use crate::utils::Clock;

/// Cache key of an account's statistics for a trading day.
pub fn stats_cache_key(account_id: &str, date: NaiveDate) -> String {
    format!("{}:{}", account_id, day_key(date))
}

struct CachedStat {
    stat: AccountStat,
    expires_at: DateTime<Utc>,
}

pub struct AccountStatsCache {
    entries: DashMap<String, CachedStat>,
    expiration_period: Duration,
    clock: Arc<dyn Clock>,
}

impl AccountStatsCache {
    pub fn new(expiration_period: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            expiration_period,
            clock,
        }
    }

    /// Today's statistics for the account, if cached and not expired.
    pub fn get(&self, account_id: &str) -> Option<AccountStat> {
        let now = self.clock.now();
        let key = stats_cache_key(account_id, now.date_naive());
        let expired = match self.entries.get(&key) {
            Some(entry) if entry.expires_at > now => return Some(entry.stat.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(&key);
        }
        None
    }

    /// Caches statistics under today's key.
    pub fn insert(&self, stat: AccountStat) {
        let now = self.clock.now();
        let key = stats_cache_key(&stat.account_id, now.date_naive());
        self.entries.insert(
            key,
            CachedStat {
                stat,
                expires_at: now + self.expiration_period,
            },
        );
    }

    /// Drops today's entry of the account. Returns the removed key, if any.
    pub fn invalidate(&self, account_id: &str) -> Option<String> {
        let key = stats_cache_key(account_id, self.clock.today());
        self.entries.remove(&key).map(|(key, _)| key)
    }

    /// Removes every expired entry, including those of past days.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!("Purged {} expired account statistics", purged);
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::FixedClock;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn stat(account_id: &str, created: DateTime<Utc>) -> AccountStat {
        AccountStat {
            account_id: account_id.to_string(),
            created,
            realised_pnl: Decimal::ZERO,
            unrealised_pnl: Decimal::ZERO,
            deposit_amount: Decimal::ZERO,
            withdrawal_amount: Decimal::ZERO,
            commission_amount: Decimal::ZERO,
            other_amount: Decimal::ZERO,
            account_balance: Decimal::ONE_HUNDRED,
            prev_eod_account_balance: Decimal::ONE_HUNDRED,
            disposable_capital: Decimal::ONE_HUNDRED,
            account_name: None,
        }
    }

    fn setup() -> (AccountStatsCache, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        ));
        (
            AccountStatsCache::new(Duration::minutes(5), clock.clone()),
            clock,
        )
    }

    #[test]
    fn test_key_format() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(stats_cache_key("A", date), "A:2024-05-01");
    }

    #[test]
    fn test_entry_expires_after_period() {
        let (cache, clock) = setup();
        cache.insert(stat("A", clock.now()));

        clock.advance(Duration::minutes(4));
        assert!(cache.get("A").is_some());

        clock.advance(Duration::minutes(1));
        assert!(cache.get("A").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_new_day_misses_previous_entry() {
        let (cache, clock) = setup();
        clock.set(Utc.with_ymd_and_hms(2024, 5, 1, 23, 58, 0).unwrap());
        cache.insert(stat("A", clock.now()));

        clock.advance(Duration::minutes(3));

        assert!(cache.get("A").is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge_expired(), 0);
        clock.advance(Duration::minutes(5));
        assert_eq!(cache.purge_expired(), 1);
    }

    #[test]
    fn test_invalidate_removes_today_entry() {
        let (cache, clock) = setup();
        cache.insert(stat("A", clock.now()));
        cache.insert(stat("B", clock.now()));

        assert_eq!(cache.invalidate("A").as_deref(), Some("A:2024-05-01"));
        assert!(cache.invalidate("A").is_none());
        assert!(cache.get("B").is_some());
    }
}
