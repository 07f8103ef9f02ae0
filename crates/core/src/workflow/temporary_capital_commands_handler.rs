//! Applies `UpdateTemporaryCapital` commands.

use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};

use super::handler::CommandHandler;
use super::messages::{
    AccountChanged, AccountChangedEventType, Command, Event, TemporaryCapitalUpdateFailed,
    TemporaryCapitalUpdated, UpdateTemporaryCapital,
};
use super::sink::MessageSink;
use crate::accounts::{AccountRepositoryTrait, TemporaryCapital, TemporaryCapitalChangeKind};
use crate::errors::{Error, Result};
use crate::utils::Clock;

pub struct TemporaryCapitalCommandsHandler {
    accounts: Arc<dyn AccountRepositoryTrait>,
    sink: Arc<dyn MessageSink>,
    clock: Arc<dyn Clock>,
}

/// Dedupe key of one temporary capital step of an operation.
pub fn temporary_capital_operation_key(operation_id: &str, kind: TemporaryCapitalChangeKind) -> String {
    format!("{}:tc-{}", operation_id, kind.as_str())
}

impl TemporaryCapitalCommandsHandler {
    pub fn new(
        accounts: Arc<dyn AccountRepositoryTrait>,
        sink: Arc<dyn MessageSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts,
            sink,
            clock,
        }
    }

    pub async fn update_temporary_capital(&self, command: &UpdateTemporaryCapital) -> Result<()> {
        let kind = command.change.kind();
        let key = temporary_capital_operation_key(&command.operation_id, kind);

        let Some(before) = self.accounts.get(&command.account_id)? else {
            self.reject(command, format!("Account {} does not exist", command.account_id));
            return Ok(());
        };
        if before.is_deleted && kind == TemporaryCapitalChangeKind::Add && !before.has_executed(&key) {
            self.reject(
                command,
                format!("Account {} is deleted. No operations are permitted.", before.id),
            );
            return Ok(());
        }

        let outcome = match self
            .accounts
            .update_temporary_capital(&key, &command.account_id, command.change.clone())
            .await
        {
            Ok(outcome) => outcome,
            Err(Error::Validation(e)) => {
                self.reject(command, e.to_string());
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let removed: Vec<TemporaryCapital> = if outcome.is_applied() {
            before
                .temporary_capital
                .iter()
                .filter(|tc| !outcome.account().temporary_capital.iter().any(|a| a.id == tc.id))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        let now = self.clock.now();
        if outcome.is_applied() {
            info!(
                "Temporary capital of account {} updated ({}), total now {}",
                command.account_id,
                kind.as_str(),
                outcome.account().temporary_capital_total()
            );
            self.sink.publish_event(Event::AccountChanged(AccountChanged {
                operation_id: command.operation_id.clone(),
                timestamp: now,
                source: command.source.clone(),
                account: outcome.account().clone(),
                event_type: AccountChangedEventType::Updated,
                balance_change: None,
                previous_snapshot: Some(before),
            }));
        }

        self.sink
            .publish_event(Event::TemporaryCapitalUpdated(TemporaryCapitalUpdated {
                operation_id: command.operation_id.clone(),
                timestamp: now,
                source: command.source.clone(),
                account_id: command.account_id.clone(),
                change_kind: kind,
                applied: outcome.is_applied(),
                removed,
            }));
        Ok(())
    }

    fn reject(&self, command: &UpdateTemporaryCapital, reason: String) {
        warn!(
            "Temporary capital change {} on account {} rejected: {}",
            command.operation_id, command.account_id, reason
        );
        self.sink
            .publish_event(Event::TemporaryCapitalUpdateFailed(TemporaryCapitalUpdateFailed {
                operation_id: command.operation_id.clone(),
                timestamp: self.clock.now(),
                source: command.source.clone(),
                account_id: command.account_id.clone(),
                change_kind: command.change.kind(),
                reason,
            }));
    }
}

#[async_trait]
impl CommandHandler for TemporaryCapitalCommandsHandler {
    fn name(&self) -> &'static str {
        "TemporaryCapitalCommandsHandler"
    }

    async fn handle_command(&self, command: &Command) -> Result<()> {
        match command {
            Command::UpdateTemporaryCapital(c) => self.update_temporary_capital(c).await,
            _ => Ok(()),
        }
    }
}
