//! Applies `UpdateBalance` commands: the single path that moves money.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};

use super::handler::CommandHandler;
use super::messages::{
    AccountBalanceChangeFailed, AccountChanged, AccountChangedEventType, Command, Event,
    UpdateBalance,
};
use super::sink::MessageSink;
use crate::accounts::{Account, AccountRepositoryTrait};
use crate::errors::{Error, Result};
use crate::ledger::{AccountBalanceChange, BalanceChangeReasonType, LedgerRepositoryTrait};
use crate::utils::Clock;

pub struct BalanceCommandsHandler {
    accounts: Arc<dyn AccountRepositoryTrait>,
    ledger: Arc<dyn LedgerRepositoryTrait>,
    sink: Arc<dyn MessageSink>,
    clock: Arc<dyn Clock>,
}

impl BalanceCommandsHandler {
    pub fn new(
        accounts: Arc<dyn AccountRepositoryTrait>,
        ledger: Arc<dyn LedgerRepositoryTrait>,
        sink: Arc<dyn MessageSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts,
            ledger,
            sink,
            clock,
        }
    }

    /// Updates the account and the ledger, then publishes the outcome.
    ///
    /// Redelivery is safe: a ledger row keyed by the operation id means the
    /// change is done, however old it is. The account's own short list of
    /// recent operation ids covers the gap between its update and the ledger
    /// append. Validation failures are reported as
    /// `AccountBalanceChangeFailed`, never as handler errors.
    pub async fn update_balance(&self, command: &UpdateBalance) -> Result<()> {
        let Some(before) = self.accounts.get(&command.account_id)? else {
            self.reject(command, format!("Account {} does not exist", command.account_id));
            return Ok(());
        };

        if let Some(recorded) = self.ledger.get(&command.operation_id)? {
            debug!(
                "Balance change {} is already in the ledger of account {}",
                command.operation_id, recorded.account_id
            );
            self.sink.publish_event(Event::AccountChanged(AccountChanged {
                operation_id: command.operation_id.clone(),
                timestamp: self.clock.now(),
                source: command.source.clone(),
                account: before,
                event_type: AccountChangedEventType::BalanceUpdated,
                balance_change: Some(recorded),
                previous_snapshot: None,
            }));
            return Ok(());
        }

        if !before.has_executed(&command.operation_id) {
            if let Err(reason) = validate(&before, command) {
                self.reject(command, reason);
                return Ok(());
            }
        }

        let outcome = match self
            .accounts
            .update_balance(
                &command.operation_id,
                &command.account_id,
                command.amount_delta,
                command.change_transfer_limit,
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(Error::Validation(e)) => {
                self.reject(command, e.to_string());
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let existing = self.ledger.get(&command.operation_id)?;
        let change = match existing {
            Some(existing) if !outcome.is_applied() => {
                debug!(
                    "Balance change {} was already applied to account {}",
                    command.operation_id, command.account_id
                );
                existing
            }
            _ => {
                let change = self.build_change(command, outcome.account());
                self.ledger.append(change.clone()).await?;
                change
            }
        };

        if outcome.is_applied() {
            info!(
                "Account {} balance changed by {} ({}), now {}",
                command.account_id,
                command.amount_delta,
                command.reason_type,
                outcome.account().balance
            );
        }

        self.sink.publish_event(Event::AccountChanged(AccountChanged {
            operation_id: command.operation_id.clone(),
            timestamp: self.clock.now(),
            source: command.source.clone(),
            account: outcome.into_account(),
            event_type: AccountChangedEventType::BalanceUpdated,
            balance_change: Some(change),
            previous_snapshot: Some(before),
        }));
        Ok(())
    }

    fn build_change(&self, command: &UpdateBalance, account: &Account) -> AccountBalanceChange {
        let now = self.clock.now();
        AccountBalanceChange {
            id: command.operation_id.clone(),
            change_timestamp: now,
            account_id: account.id.clone(),
            client_id: account.client_id.clone(),
            change_amount: command.amount_delta,
            balance: account.balance,
            withdraw_transfer_limit: account.withdraw_transfer_limit,
            comment: command.comment.clone(),
            reason_type: command.reason_type,
            event_source_id: command.event_source_id.clone(),
            legal_entity: Some(account.legal_entity.clone()),
            audit_log: command.audit_log.clone(),
            instrument: command.instrument.clone(),
            trading_date: Some(command.trading_date.unwrap_or_else(|| now.date_naive())),
        }
    }

    fn reject(&self, command: &UpdateBalance, reason: String) {
        warn!(
            "Balance change {} on account {} rejected: {}",
            command.operation_id, command.account_id, reason
        );
        self.sink
            .publish_event(Event::AccountBalanceChangeFailed(AccountBalanceChangeFailed {
                operation_id: command.operation_id.clone(),
                timestamp: self.clock.now(),
                source: command.source.clone(),
                account_id: command.account_id.clone(),
                reason,
            }));
    }
}

fn validate(account: &Account, command: &UpdateBalance) -> std::result::Result<(), String> {
    if account.is_deleted {
        return Err(format!(
            "Account {} is deleted. No operations are permitted.",
            account.id
        ));
    }
    if command.reason_type == BalanceChangeReasonType::Withdraw {
        if account.is_withdrawal_disabled {
            return Err(format!("Withdrawals are disabled for account {}", account.id));
        }
        if account.balance + command.amount_delta < rust_decimal::Decimal::ZERO {
            return Err(format!(
                "Insufficient balance on account {}: {} available, {} requested",
                account.id,
                account.balance,
                -command.amount_delta
            ));
        }
    }
    Ok(())
}

#[async_trait]
impl CommandHandler for BalanceCommandsHandler {
    fn name(&self) -> &'static str {
        "BalanceCommandsHandler"
    }

    async fn handle_command(&self, command: &Command) -> Result<()> {
        match command {
            Command::UpdateBalance(c) => self.update_balance(c).await,
            _ => Ok(()),
        }
    }
}
