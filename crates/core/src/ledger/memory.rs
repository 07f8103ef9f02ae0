//! DashMap-backed ledger.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;

use super::ledger_model::{AccountBalanceChange, BalanceChangeFilter};
use super::ledger_traits::LedgerRepositoryTrait;
use crate::errors::Result;

struct StoredChange {
    seq: u64,
    change: AccountBalanceChange,
}

#[derive(Default)]
pub struct InMemoryLedgerRepository {
    rows: DashMap<String, StoredChange>,
    next_seq: AtomicU64,
}

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn collect<P>(&self, predicate: P) -> Vec<AccountBalanceChange>
    where
        P: Fn(&AccountBalanceChange) -> bool,
    {
        let mut rows: Vec<(u64, AccountBalanceChange)> = self
            .rows
            .iter()
            .filter(|entry| predicate(&entry.value().change))
            .map(|entry| (entry.value().seq, entry.value().change.clone()))
            .collect();
        rows.sort_by(|(seq_a, a), (seq_b, b)| {
            a.change_timestamp
                .cmp(&b.change_timestamp)
                .then(seq_a.cmp(seq_b))
        });
        rows.into_iter().map(|(_, change)| change).collect()
    }
}

#[async_trait]
impl LedgerRepositoryTrait for InMemoryLedgerRepository {
    async fn append(&self, change: AccountBalanceChange) -> Result<()> {
        match self.rows.entry(change.id.clone()) {
            Entry::Occupied(mut occupied) => {
                debug!("Ledger row {} already exists, overwriting", change.id);
                occupied.get_mut().change = change;
            }
            Entry::Vacant(vacant) => {
                let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
                vacant.insert(StoredChange { seq, change });
            }
        }
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<AccountBalanceChange>> {
        Ok(self.rows.get(id).map(|entry| entry.value().change.clone()))
    }

    fn query(&self, filter: &BalanceChangeFilter) -> Result<Vec<AccountBalanceChange>> {
        Ok(self.collect(|change| filter.matches(change)))
    }

    fn query_by_event_source(
        &self,
        account_id: &str,
        event_source_id: Option<&str>,
    ) -> Result<Vec<AccountBalanceChange>> {
        Ok(self.collect(|change| {
            change.account_id == account_id && change.event_source_id.as_deref() == event_source_id
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::BalanceChangeReasonType;
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn change(
        id: &str,
        ts: DateTime<Utc>,
        amount: Decimal,
        reason_type: BalanceChangeReasonType,
    ) -> AccountBalanceChange {
        AccountBalanceChange {
            id: id.to_string(),
            change_timestamp: ts,
            account_id: "A".to_string(),
            client_id: "client-1".to_string(),
            change_amount: amount,
            balance: amount,
            withdraw_transfer_limit: dec!(0),
            comment: None,
            reason_type,
            event_source_id: None,
            legal_entity: Some("LE-1".to_string()),
            audit_log: None,
            instrument: None,
            trading_date: None,
        }
    }

    #[tokio::test]
    async fn test_append_same_id_keeps_one_row() {
        let ledger = InMemoryLedgerRepository::new();
        let row = change("op-1", at(10), dec!(100), BalanceChangeReasonType::Deposit);

        ledger.append(row.clone()).await.unwrap();
        ledger.append(row.clone()).await.unwrap();

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get("op-1").unwrap(), Some(row));
    }

    #[tokio::test]
    async fn test_query_orders_by_timestamp_then_insertion() {
        let ledger = InMemoryLedgerRepository::new();
        ledger
            .append(change("late", at(12), dec!(1), BalanceChangeReasonType::Manual))
            .await
            .unwrap();
        ledger
            .append(change("early-b", at(9), dec!(1), BalanceChangeReasonType::Manual))
            .await
            .unwrap();
        ledger
            .append(change("early-a", at(9), dec!(1), BalanceChangeReasonType::Manual))
            .await
            .unwrap();

        let ids: Vec<String> = ledger
            .query(&BalanceChangeFilter::for_account("A"))
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();

        assert_eq!(ids, vec!["early-b", "early-a", "late"]);
    }

    #[tokio::test]
    async fn test_range_is_inclusive_start_exclusive_end() {
        let ledger = InMemoryLedgerRepository::new();
        ledger
            .append(change("a", at(9), dec!(1), BalanceChangeReasonType::Manual))
            .await
            .unwrap();
        ledger
            .append(change("b", at(10), dec!(1), BalanceChangeReasonType::Manual))
            .await
            .unwrap();

        let rows = ledger
            .query(&BalanceChangeFilter::for_account("A").since(at(9)).until(at(10)))
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "a");
    }

    #[tokio::test]
    async fn test_sum_by_reason_covers_one_day() {
        let ledger = InMemoryLedgerRepository::new();
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        ledger
            .append(change("d1", at(9), dec!(100), BalanceChangeReasonType::Deposit))
            .await
            .unwrap();
        ledger
            .append(change("d2", at(15), dec!(50), BalanceChangeReasonType::Deposit))
            .await
            .unwrap();
        ledger
            .append(change("w1", at(16), dec!(-20), BalanceChangeReasonType::Withdraw))
            .await
            .unwrap();
        ledger
            .append(change(
                "d3",
                at(9) + Duration::days(1),
                dec!(70),
                BalanceChangeReasonType::Deposit,
            ))
            .await
            .unwrap();

        let total = ledger
            .sum_by_reason("A", BalanceChangeReasonType::Deposit, day)
            .unwrap();

        assert_eq!(total, dec!(150));
        assert_eq!(ledger.compensations_for_day("A", day).unwrap(), dec!(0));
    }

    #[tokio::test]
    async fn test_query_by_event_source() {
        let ledger = InMemoryLedgerRepository::new();
        let mut sourced = change("tc-op", at(9), dec!(30), BalanceChangeReasonType::TemporaryCashAdjustment);
        sourced.event_source_id = Some("grant-1".to_string());
        ledger.append(sourced).await.unwrap();
        ledger
            .append(change("plain", at(10), dec!(5), BalanceChangeReasonType::Manual))
            .await
            .unwrap();

        let with_source = ledger.query_by_event_source("A", Some("grant-1")).unwrap();
        let without_source = ledger.query_by_event_source("A", None).unwrap();

        assert_eq!(with_source.len(), 1);
        assert_eq!(with_source[0].id, "tc-op");
        assert_eq!(without_source.len(), 1);
        assert_eq!(without_source[0].id, "plain");
    }

    #[test]
    fn test_reason_type_round_trips_through_str() {
        for reason in BalanceChangeReasonType::ALL {
            assert_eq!(reason.as_str().parse::<BalanceChangeReasonType>().unwrap(), reason);
        }
        assert!("Bonus".parse::<BalanceChangeReasonType>().is_err());
    }
}
