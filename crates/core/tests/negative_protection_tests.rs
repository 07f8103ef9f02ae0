//! Negative balance protection after liquidations and balance updates.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use common::Harness;
use margin_accounts_core::accounts::{AccountManagementServiceTrait, AccountRepositoryTrait};
use margin_accounts_core::errors::{DatabaseError, Error, Result};
use margin_accounts_core::ledger::BalanceChangeReasonType;
use margin_accounts_core::settings::{AccountManagementSettings, NegativeProtectionSettings};
use margin_accounts_core::trading::{
    AccountTradingStats, StaticTradingStatsProvider, TradingStatsProviderTrait,
};
use margin_accounts_core::workflow::{
    AccountChanged, AccountChangedEventType, ChargeManuallyRequest, Command, Event, EventHandler,
    LiquidationCompleted, NegativeProtectionSaga, NegativeProtectionService,
    CHARGE_MANUALLY_SOURCE,
};

/// Stats source that is unreachable for the first `failures` calls.
struct FlakyStats {
    failures: AtomicU32,
    inner: StaticTradingStatsProvider,
}

#[async_trait]
impl TradingStatsProviderTrait for FlakyStats {
    async fn get_account_stats(&self, account_id: &str) -> Result<AccountTradingStats> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::Database(DatabaseError::ConnectionFailed(
                "stats backend unavailable".to_string(),
            )));
        }
        self.inner.get_account_stats(account_id).await
    }
}

fn liquidation(account_id: &str, operation_id: &str) -> Event {
    Event::LiquidationFinished(LiquidationCompleted {
        operation_id: operation_id.to_string(),
        timestamp: Utc::now(),
        account_id: account_id.to_string(),
        open_positions_remaining: 2,
        current_total_capital: dec!(-30),
        reason: None,
    })
}

fn notifications(h: &Harness) -> Vec<(String, Decimal, u32)> {
    h.commands_named("NotifyNegativeProtection")
        .into_iter()
        .filter_map(|c| match c {
            Command::NotifyNegativeProtection(n) => {
                Some((n.account_id, n.amount, n.open_positions_remaining))
            }
            _ => None,
        })
        .collect()
}

fn auto_compensating() -> Harness {
    let mut settings = AccountManagementSettings::default();
    settings.negative_protection.delay_ms = 0;
    settings.negative_protection.auto_compensation = true;
    Harness::with_settings(settings)
}

async fn drive_negative(h: &Harness, account_id: &str, delta: Decimal) {
    h.accounts
        .update_balance("loss-1", account_id, delta, false)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_liquidation_with_deficit_notifies_once() {
    let h = Harness::new();
    h.open_account("A", dec!(20)).await;
    drive_negative(&h, "A", dec!(-50)).await;

    h.run(liquidation("A", "liq-1")).await;
    h.run(liquidation("A", "liq-1")).await;
    h.run(Event::LiquidationFailed(LiquidationCompleted {
        operation_id: "liq-2".to_string(),
        timestamp: Utc::now(),
        account_id: "A".to_string(),
        open_positions_remaining: 0,
        current_total_capital: dec!(-30),
        reason: Some("market closed".to_string()),
    }))
    .await;

    assert_eq!(notifications(&h), vec![("A".to_string(), dec!(30), 2)]);
    assert_eq!(h.account("A").balance, dec!(-30));
    assert!(h.commands_named("UpdateBalance").is_empty());
}

#[tokio::test]
async fn test_positive_account_is_left_alone() {
    let h = Harness::new();
    h.open_account("A", dec!(20)).await;

    h.run(liquidation("A", "liq-1")).await;

    assert!(notifications(&h).is_empty());
}

#[tokio::test]
async fn test_auto_compensation_restores_zero_balance() {
    let h = auto_compensating();
    h.open_account("A", dec!(10)).await;
    drive_negative(&h, "A", dec!(-25)).await;

    h.run(liquidation("A", "liq-1")).await;

    assert_eq!(h.account("A").balance, dec!(0));
    assert_eq!(notifications(&h).len(), 1);

    let rows = h.ledger_rows("A");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].reason_type, BalanceChangeReasonType::Compensation);
    assert_eq!(rows[0].change_amount, dec!(15));
    assert_eq!(rows[0].event_source_id.as_deref(), Some("liq-1"));

    // The compensating balance update does not trigger another round.
    assert_eq!(h.commands_named("UpdateBalance").len(), 1);
}

#[tokio::test]
async fn test_negative_balance_update_triggers_protection() {
    let h = Harness::new();
    h.open_account("A", dec!(100)).await;
    h.stats.set_stats(
        "A",
        AccountTradingStats {
            open_positions_count: 3,
            active_orders_count: 1,
            pnl: dec!(0),
        },
    );

    h.balance_commands
        .charge_manually(ChargeManuallyRequest {
            operation_id: Some("fee-1".to_string()),
            account_id: "A".to_string(),
            amount_delta: dec!(-140),
            reason_type: BalanceChangeReasonType::Commission,
            comment: None,
            audit_log: None,
            source: CHARGE_MANUALLY_SOURCE.to_string(),
            event_source_id: None,
            instrument: None,
            trading_date: None,
            change_transfer_limit: false,
        })
        .unwrap();
    assert!(h.pump().await.is_empty());

    assert_eq!(notifications(&h), vec![("A".to_string(), dec!(40), 3)]);
}

#[tokio::test]
async fn test_stats_outage_does_not_swallow_notification() {
    let h = Harness::new();
    h.open_account("A", dec!(20)).await;
    let account = h
        .accounts
        .update_balance("fee-1", "A", dec!(-70), false)
        .await
        .unwrap()
        .into_account();
    assert_eq!(account.balance, dec!(-50));

    let saga = NegativeProtectionSaga::new(
        Arc::new(NegativeProtectionService::new(h.store.clone(), h.ledger.clone())),
        h.accounts.clone(),
        Arc::new(FlakyStats {
            failures: AtomicU32::new(1),
            inner: StaticTradingStatsProvider::new(),
        }),
        h.sink.clone(),
        h.clock.clone(),
        NegativeProtectionSettings {
            delay_ms: 0,
            auto_compensation: false,
        },
    );
    let changed = Event::AccountChanged(AccountChanged {
        operation_id: "fee-1".to_string(),
        timestamp: Utc::now(),
        source: CHARGE_MANUALLY_SOURCE.to_string(),
        account,
        event_type: AccountChangedEventType::BalanceUpdated,
        balance_change: None,
        previous_snapshot: None,
    });

    let err = saga.handle_event(&changed).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(h.sink.commands().is_empty());

    saga.handle_event(&changed).await.unwrap();
    saga.handle_event(&changed).await.unwrap();

    let sent: Vec<Decimal> = h
        .sink
        .commands()
        .into_iter()
        .filter_map(|c| match c {
            Command::NotifyNegativeProtection(n) => Some(n.amount),
            _ => None,
        })
        .collect();
    assert_eq!(sent, vec![dec!(50)]);
}

#[tokio::test]
async fn test_settings_change_on_negative_account_does_not_notify_again() {
    let h = Harness::new();
    h.open_account("A", dec!(20)).await;
    drive_negative(&h, "A", dec!(-50)).await;
    h.run(liquidation("A", "liq-1")).await;
    assert_eq!(notifications(&h).len(), 1);

    h.clock.advance(Duration::minutes(5));
    h.service.set_disabled("A", true).await.unwrap();
    assert!(h.pump().await.is_empty());
    h.run(liquidation("A", "liq-2")).await;

    assert_eq!(notifications(&h).len(), 1);
}

#[tokio::test]
async fn test_new_loss_at_same_balance_notifies_again() {
    let h = auto_compensating();
    h.open_account("A", dec!(10)).await;
    drive_negative(&h, "A", dec!(-25)).await;
    h.run(liquidation("A", "liq-1")).await;
    assert_eq!(h.account("A").balance, dec!(0));

    h.accounts
        .update_balance("loss-2", "A", dec!(-15), false)
        .await
        .unwrap();
    h.run(liquidation("A", "liq-2")).await;

    let amounts: Vec<Decimal> = notifications(&h).into_iter().map(|(_, a, _)| a).collect();
    assert_eq!(amounts, vec![dec!(15), dec!(15)]);
}
