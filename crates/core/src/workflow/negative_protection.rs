//! Negative balance protection.
//!
//! After a liquidation (or any balance update that leaves the account below
//! zero) the saga waits for downstream figures to settle, re-reads the
//! account and notifies the platform of the deficit once per account state.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::handler::EventHandler;
use super::messages::{
    AccountChangedEventType, Command, Event, NotifyNegativeProtection, UpdateBalance,
};
use super::sink::MessageSink;
use crate::accounts::{Account, AccountRepositoryTrait};
use crate::errors::Result;
use crate::ledger::{BalanceChangeReasonType, LedgerRepositoryTrait};
use crate::operations::OperationExecutionStore;
use crate::settings::NegativeProtectionSettings;
use crate::trading::TradingStatsProviderTrait;
use crate::utils::Clock;

pub const NEGATIVE_PROTECTION_OPERATION_NAME: &str = "NegativeProtection";

/// Evaluates whether an account is owed compensation.
#[async_trait]
pub trait NegativeProtectionServiceTrait: Send + Sync {
    /// Returns the deficit of a negative account the first time this exact
    /// account state is checked, `None` otherwise.
    async fn check(&self, operation_id: &str, account: &Account) -> Result<Option<Decimal>>;
}

/// Marker persisted for every deficit already reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegativeProtectionRecord {
    pub account_id: String,
    pub amount: Decimal,
    pub operation_id: String,
}

pub struct NegativeProtectionService {
    store: Arc<OperationExecutionStore>,
    ledger: Arc<dyn LedgerRepositoryTrait>,
}

impl NegativeProtectionService {
    pub fn new(
        store: Arc<OperationExecutionStore>,
        ledger: Arc<dyn LedgerRepositoryTrait>,
    ) -> Self {
        Self { store, ledger }
    }
}

/// Identifies one deficit: account id, balance and the id of the latest
/// ledger row. Changes that do not move money keep the fingerprint.
pub fn deficit_fingerprint(account: &Account, last_change_id: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(account.id.as_bytes());
    hasher.update(b"|");
    hasher.update(account.balance.normalize().to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(last_change_id.unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl NegativeProtectionServiceTrait for NegativeProtectionService {
    async fn check(&self, operation_id: &str, account: &Account) -> Result<Option<Decimal>> {
        if account.balance >= Decimal::ZERO {
            return Ok(None);
        }

        let amount = -account.balance;
        let last_change_id = self.ledger.latest(&account.id)?.map(|c| c.id);
        let fingerprint = deficit_fingerprint(account, last_change_id.as_deref());
        let (record, created) = self
            .store
            .get_or_add(NEGATIVE_PROTECTION_OPERATION_NAME, &fingerprint, || {
                NegativeProtectionRecord {
                    account_id: account.id.clone(),
                    amount,
                    operation_id: operation_id.to_string(),
                }
            })
            .await?;

        if !created {
            debug!(
                "Deficit of account {} was already reported by operation {}",
                account.id, record.data.operation_id
            );
            return Ok(None);
        }
        Ok(Some(amount))
    }
}

pub struct NegativeProtectionSaga {
    service: Arc<dyn NegativeProtectionServiceTrait>,
    accounts: Arc<dyn AccountRepositoryTrait>,
    stats: Arc<dyn TradingStatsProviderTrait>,
    sink: Arc<dyn MessageSink>,
    clock: Arc<dyn Clock>,
    settings: NegativeProtectionSettings,
}

impl NegativeProtectionSaga {
    pub fn new(
        service: Arc<dyn NegativeProtectionServiceTrait>,
        accounts: Arc<dyn AccountRepositoryTrait>,
        stats: Arc<dyn TradingStatsProviderTrait>,
        sink: Arc<dyn MessageSink>,
        clock: Arc<dyn Clock>,
        settings: NegativeProtectionSettings,
    ) -> Self {
        Self {
            service,
            accounts,
            stats,
            sink,
            clock,
            settings,
        }
    }

    async fn protect(
        &self,
        operation_id: &str,
        account_id: &str,
        open_positions_remaining: Option<u32>,
        current_total_capital: Option<Decimal>,
    ) -> Result<()> {
        let delay = self.settings.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let Some(account) = self.accounts.get(account_id)? else {
            warn!(
                "Negative protection for operation {}: account {} not found",
                operation_id, account_id
            );
            return Ok(());
        };

        if account.balance >= Decimal::ZERO {
            debug!(
                "Negative protection for operation {}: account {} is back to {}",
                operation_id, account.id, account.balance
            );
            return Ok(());
        }

        // Everything that can fail goes before the deficit is marked as
        // reported, so a redelivery can still notify.
        let open_positions_remaining = match open_positions_remaining {
            Some(count) => count,
            None => self.stats.get_account_stats(&account.id).await?.open_positions_count,
        };

        let Some(amount) = self.service.check(operation_id, &account).await? else {
            return Ok(());
        };
        let current_total_capital = current_total_capital.unwrap_or(account.balance);

        let id = Uuid::new_v4().simple().to_string();
        info!(
            "Negative protection triggered for account {} by operation {}: deficit {}",
            account.id, operation_id, amount
        );

        self.sink
            .send_command(Command::NotifyNegativeProtection(NotifyNegativeProtection {
                id: id.clone(),
                correlation_id: operation_id.to_string(),
                causation_id: operation_id.to_string(),
                timestamp: self.clock.now(),
                client_id: account.client_id.clone(),
                account_id: account.id.clone(),
                amount,
                open_positions_remaining,
                current_total_capital,
            }));

        if self.settings.auto_compensation {
            self.sink.send_command(Command::UpdateBalance(UpdateBalance {
                operation_id: id.clone(),
                timestamp: self.clock.now(),
                client_id: account.client_id.clone(),
                account_id: account.id.clone(),
                amount_delta: amount,
                comment: Some("Negative protection compensation".to_string()),
                audit_log: None,
                source: NEGATIVE_PROTECTION_OPERATION_NAME.to_string(),
                reason_type: BalanceChangeReasonType::Compensation,
                event_source_id: Some(operation_id.to_string()),
                instrument: None,
                trading_date: None,
                change_transfer_limit: false,
            }));
        }
        Ok(())
    }
}

fn is_negative_balance_update(
    source: &str,
    event_type: AccountChangedEventType,
    balance: Decimal,
) -> bool {
    source != NEGATIVE_PROTECTION_OPERATION_NAME
        && event_type == AccountChangedEventType::BalanceUpdated
        && balance < Decimal::ZERO
}

#[async_trait]
impl EventHandler for NegativeProtectionSaga {
    fn name(&self) -> &'static str {
        "NegativeProtectionSaga"
    }

    async fn handle_event(&self, event: &Event) -> Result<()> {
        match event {
            Event::LiquidationFinished(e) | Event::LiquidationFailed(e) => {
                self.protect(
                    &e.operation_id,
                    &e.account_id,
                    Some(e.open_positions_remaining),
                    Some(e.current_total_capital),
                )
                .await
            }
            Event::AccountChanged(e)
                if is_negative_balance_update(&e.source, e.event_type, e.account.balance) =>
            {
                self.protect(&e.operation_id, &e.account.id, None, None).await
            }
            _ => Ok(()),
        }
    }
}
