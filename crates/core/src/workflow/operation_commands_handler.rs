//! Turns terminal saga commands into public outcome events.

use std::sync::Arc;

use async_trait::async_trait;
use log::info;

use super::handler::CommandHandler;
use super::messages::{
    BalanceOperationSucceeded, Command, Event, FinishTemporaryCapitalOperation, OperationFailed,
    TemporaryCapitalOperationSucceeded,
};
use super::sink::MessageSink;
use crate::errors::Result;
use crate::utils::Clock;

pub struct OperationCommandsHandler {
    sink: Arc<dyn MessageSink>,
    clock: Arc<dyn Clock>,
}

impl OperationCommandsHandler {
    pub fn new(sink: Arc<dyn MessageSink>, clock: Arc<dyn Clock>) -> Self {
        Self { sink, clock }
    }

    fn succeeded(&self, c: &BalanceOperationSucceeded) -> BalanceOperationSucceeded {
        BalanceOperationSucceeded {
            timestamp: self.clock.now(),
            ..c.clone()
        }
    }

    fn failed(&self, c: &OperationFailed) -> OperationFailed {
        OperationFailed {
            timestamp: self.clock.now(),
            ..c.clone()
        }
    }

    fn finished(
        &self,
        c: &FinishTemporaryCapitalOperation,
        on_success: fn(TemporaryCapitalOperationSucceeded) -> Event,
        on_failure: fn(OperationFailed) -> Event,
    ) -> Event {
        let timestamp = self.clock.now();
        match &c.fail_reason {
            None => on_success(TemporaryCapitalOperationSucceeded {
                operation_id: c.operation_id.clone(),
                timestamp,
                event_source_id: c.event_source_id.clone(),
                account_id: c.account_id.clone(),
                amount: c.amount,
            }),
            Some(reason) => on_failure(OperationFailed {
                operation_id: c.operation_id.clone(),
                timestamp,
                reason: reason.clone(),
            }),
        }
    }
}

#[async_trait]
impl CommandHandler for OperationCommandsHandler {
    fn name(&self) -> &'static str {
        "OperationCommandsHandler"
    }

    async fn handle_command(&self, command: &Command) -> Result<()> {
        let event = match command {
            Command::CompleteDeposit(c) => Event::DepositSucceeded(self.succeeded(c)),
            Command::FailDeposit(c) => Event::DepositFailed(self.failed(c)),
            Command::CompleteWithdrawal(c) => Event::WithdrawalSucceeded(self.succeeded(c)),
            Command::FailWithdrawal(c) => Event::WithdrawalFailed(self.failed(c)),
            Command::FinishGiveTemporaryCapital(c) => self.finished(
                c,
                Event::GiveTemporaryCapitalSucceeded,
                Event::GiveTemporaryCapitalFailed,
            ),
            Command::FinishRevokeTemporaryCapital(c) => self.finished(
                c,
                Event::RevokeTemporaryCapitalSucceeded,
                Event::RevokeTemporaryCapitalFailed,
            ),
            _ => return Ok(()),
        };
        info!("Operation {} finished: {}", event.operation_id(), event.name());
        self.sink.publish_event(event);
        Ok(())
    }
}
