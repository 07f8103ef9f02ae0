//! Stand-in for the trading core when the worker runs on its own.
//!
//! Every freeze request is approved and every unfreeze confirmed, so deposit
//! and withdrawal sagas can run to completion without the real margin engine.

use std::sync::Arc;

use async_trait::async_trait;
use margin_accounts_core::errors::Result;
use margin_accounts_core::utils::Clock;
use margin_accounts_core::workflow::{
    Command, CommandHandler, Event, MessageSink, OperationStepCompleted,
};

pub struct TradingCoreSimulator {
    sink: Arc<dyn MessageSink>,
    clock: Arc<dyn Clock>,
}

impl TradingCoreSimulator {
    pub fn new(sink: Arc<dyn MessageSink>, clock: Arc<dyn Clock>) -> Self {
        Self { sink, clock }
    }

    fn completed(&self, operation_id: &str) -> OperationStepCompleted {
        OperationStepCompleted {
            operation_id: operation_id.to_string(),
            timestamp: self.clock.now(),
        }
    }
}

#[async_trait]
impl CommandHandler for TradingCoreSimulator {
    fn name(&self) -> &'static str {
        "TradingCoreSimulator"
    }

    async fn handle_command(&self, command: &Command) -> Result<()> {
        let reply = match command {
            Command::FreezeAmountForDeposit(c) => {
                Event::AmountForDepositFrozen(self.completed(&c.operation_id))
            }
            Command::FreezeAmountForWithdrawal(c) => {
                Event::AmountForWithdrawalFrozen(self.completed(&c.operation_id))
            }
            Command::UnfreezeMarginOnFailWithdrawal(c) => {
                Event::UnfreezeMarginOnFailSucceeded(self.completed(&c.operation_id))
            }
            _ => return Ok(()),
        };
        tracing::debug!("Simulated trading core reply {}", reply.name());
        self.sink.publish_event(reply);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use margin_accounts_core::utils::FixedClock;
    use margin_accounts_core::workflow::{MarginRequest, MockMessageSink, OperationFailed};
    use rust_decimal_macros::dec;

    fn request() -> MarginRequest {
        MarginRequest {
            operation_id: "op-1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
            client_id: "client-1".to_string(),
            account_id: "A".to_string(),
            amount: dec!(25),
        }
    }

    #[tokio::test]
    async fn test_replies_to_margin_requests_only() {
        let sink = Arc::new(MockMessageSink::new());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()));
        let simulator = TradingCoreSimulator::new(sink.clone(), clock);

        simulator
            .handle_command(&Command::FreezeAmountForWithdrawal(request()))
            .await
            .unwrap();
        simulator
            .handle_command(&Command::FailDeposit(OperationFailed {
                operation_id: "op-2".to_string(),
                timestamp: Utc::now(),
                reason: "nope".to_string(),
            }))
            .await
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "AmountForWithdrawalFrozen");
        assert_eq!(events[0].operation_id(), "op-1");
    }
}
