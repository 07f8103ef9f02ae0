//! Withdrawal saga: freeze margin, debit the balance, release margin on failure.

use async_trait::async_trait;
use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::handler::EventHandler;
use super::messages::{
    AccountChangedEventType, BalanceOperationStarted, BalanceOperationSucceeded, Command, Event,
    MarginRequest, OperationFailed, UpdateBalance,
};
use super::saga_context::SagaContext;
use super::state::{OperationData, OperationState};
use crate::errors::Result;
use crate::ledger::BalanceChangeReasonType;
use crate::operations::OperationExecutionInfo;

pub const WITHDRAWAL_OPERATION_NAME: &str = "Withdrawal";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawalState {
    FreezingAmount = 1,
    UpdatingBalance = 2,
    UnfreezingAmount = 3,
    Succeeded = 4,
    Failed = 5,
}

impl OperationState for WithdrawalState {
    fn rank(self) -> u8 {
        self as u8
    }

    fn is_terminal(self) -> bool {
        matches!(self, WithdrawalState::Succeeded | WithdrawalState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalData {
    pub client_id: String,
    pub account_id: String,
    pub amount: Decimal,
    pub comment: Option<String>,
    pub audit_log: Option<String>,
    pub state: WithdrawalState,
    pub fail_reason: Option<String>,
    /// Set when the checkpoint moved but its command is not out yet.
    #[serde(default)]
    pub dispatch_pending: bool,
}

impl OperationData for WithdrawalData {
    type State = WithdrawalState;

    fn state(&self) -> WithdrawalState {
        self.state
    }

    fn set_state(&mut self, state: WithdrawalState) {
        self.state = state;
    }

    fn is_dispatch_pending(&self) -> bool {
        self.dispatch_pending
    }

    fn set_dispatch_pending(&mut self, pending: bool) {
        self.dispatch_pending = pending;
    }
}

type WithdrawalInfo = OperationExecutionInfo<WithdrawalData>;

pub struct WithdrawalSaga {
    ctx: SagaContext,
}

impl WithdrawalSaga {
    pub fn new(ctx: SagaContext) -> Self {
        Self { ctx }
    }

    async fn on_started(&self, e: &BalanceOperationStarted) -> Result<()> {
        let (info, created) = self
            .ctx
            .store
            .get_or_add(WITHDRAWAL_OPERATION_NAME, &e.operation_id, || WithdrawalData {
                client_id: e.client_id.clone(),
                account_id: e.account_id.clone(),
                amount: e.amount,
                comment: e.comment.clone(),
                audit_log: e.audit_log.clone(),
                state: WithdrawalState::FreezingAmount,
                fail_reason: None,
                dispatch_pending: false,
            })
            .await?;

        if created {
            info!(
                "Withdrawal {} started: {} from account {}",
                e.operation_id, e.amount, e.account_id
            );
        }

        if info.data.state != WithdrawalState::FreezingAmount {
            debug!(
                "Withdrawal {} is already {:?}, ignoring WithdrawalStarted",
                e.operation_id, info.data.state
            );
            return Ok(());
        }

        self.ctx.faults.checkpoint(&e.operation_id)?;
        self.emit_for_state(&info);
        Ok(())
    }

    async fn transition(
        &self,
        operation_id: &str,
        expected: WithdrawalState,
        next: WithdrawalState,
        fail_reason: Option<&str>,
    ) -> Result<()> {
        let fail_reason = fail_reason.map(str::to_string);
        if let Some(info) = self
            .ctx
            .advance::<WithdrawalData, _>(
                WITHDRAWAL_OPERATION_NAME,
                operation_id,
                expected,
                next,
                move |data| {
                    if fail_reason.is_some() {
                        data.fail_reason = fail_reason;
                    }
                },
            )
            .await?
        {
            self.emit_for_state(&info);
        }
        Ok(())
    }

    /// Re-sends the message implied by the persisted state.
    pub fn resume(&self, operation_id: &str) -> Result<()> {
        let info = self
            .ctx
            .load::<WithdrawalData>(WITHDRAWAL_OPERATION_NAME, operation_id)?;
        info!(
            "Resuming withdrawal {} in state {:?}",
            operation_id, info.data.state
        );
        self.emit_for_state(&info);
        Ok(())
    }

    fn margin_request(&self, info: &WithdrawalInfo) -> MarginRequest {
        MarginRequest {
            operation_id: info.id.clone(),
            timestamp: self.ctx.clock.now(),
            client_id: info.data.client_id.clone(),
            account_id: info.data.account_id.clone(),
            amount: info.data.amount,
        }
    }

    fn emit_for_state(&self, info: &WithdrawalInfo) {
        let data = &info.data;
        let timestamp = self.ctx.clock.now();
        let command = match data.state {
            WithdrawalState::FreezingAmount => {
                Command::FreezeAmountForWithdrawal(self.margin_request(info))
            }
            WithdrawalState::UpdatingBalance => Command::UpdateBalance(UpdateBalance {
                operation_id: info.id.clone(),
                timestamp,
                client_id: data.client_id.clone(),
                account_id: data.account_id.clone(),
                amount_delta: -data.amount,
                comment: data.comment.clone(),
                audit_log: data.audit_log.clone(),
                source: WITHDRAWAL_OPERATION_NAME.to_string(),
                reason_type: BalanceChangeReasonType::Withdraw,
                event_source_id: None,
                instrument: None,
                trading_date: None,
                change_transfer_limit: false,
            }),
            WithdrawalState::UnfreezingAmount => {
                Command::UnfreezeMarginOnFailWithdrawal(self.margin_request(info))
            }
            WithdrawalState::Succeeded => Command::CompleteWithdrawal(BalanceOperationSucceeded {
                operation_id: info.id.clone(),
                timestamp,
                client_id: data.client_id.clone(),
                account_id: data.account_id.clone(),
                amount: data.amount,
            }),
            WithdrawalState::Failed => Command::FailWithdrawal(OperationFailed {
                operation_id: info.id.clone(),
                timestamp,
                reason: data.fail_reason.clone().unwrap_or_default(),
            }),
        };
        self.ctx.sink.send_command(command);
    }
}

#[async_trait]
impl EventHandler for WithdrawalSaga {
    fn name(&self) -> &'static str {
        "WithdrawalSaga"
    }

    async fn handle_event(&self, event: &Event) -> Result<()> {
        use WithdrawalState::*;

        match event {
            Event::WithdrawalStarted(e) => self.on_started(e).await,
            Event::AmountForWithdrawalFrozen(e) => {
                self.transition(&e.operation_id, FreezingAmount, UpdatingBalance, None)
                    .await
            }
            Event::AmountForWithdrawalFreezeFailed(e) => {
                self.transition(&e.operation_id, FreezingAmount, Failed, Some(&e.reason))
                    .await
            }
            Event::AccountChanged(e)
                if e.source == WITHDRAWAL_OPERATION_NAME
                    && e.event_type == AccountChangedEventType::BalanceUpdated =>
            {
                self.transition(&e.operation_id, UpdatingBalance, Succeeded, None)
                    .await
            }
            Event::AccountBalanceChangeFailed(e) if e.source == WITHDRAWAL_OPERATION_NAME => {
                self.transition(
                    &e.operation_id,
                    UpdatingBalance,
                    UnfreezingAmount,
                    Some(&e.reason),
                )
                .await
            }
            Event::UnfreezeMarginOnFailSucceeded(e) => {
                self.transition(&e.operation_id, UnfreezingAmount, Failed, None)
                    .await
            }
            _ => Ok(()),
        }
    }
}
