//! Deposit saga: freeze margin, credit the balance, report the outcome.

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

pub const DEPOSIT_OPERATION_NAME: &str = "Deposit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositState {
    FreezingAmount = 1,
    UpdatingBalance = 2,
    Succeeded = 3,
    Failed = 4,
}

impl OperationState for DepositState {
    fn rank(self) -> u8 {
        self as u8
    }

    fn is_terminal(self) -> bool {
        matches!(self, DepositState::Succeeded | DepositState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositData {
    pub client_id: String,
    pub account_id: String,
    pub amount: Decimal,
    pub comment: Option<String>,
    pub audit_log: Option<String>,
    pub state: DepositState,
    pub fail_reason: Option<String>,
    /// Set when the checkpoint moved but its command is not out yet.
    #[serde(default)]
    pub dispatch_pending: bool,
}

impl OperationData for DepositData {
    type State = DepositState;

    fn state(&self) -> DepositState {
        self.state
    }

    fn set_state(&mut self, state: DepositState) {
        self.state = state;
    }

    fn is_dispatch_pending(&self) -> bool {
        self.dispatch_pending
    }

    fn set_dispatch_pending(&mut self, pending: bool) {
        self.dispatch_pending = pending;
    }
}

type DepositInfo = OperationExecutionInfo<DepositData>;

pub struct DepositSaga {
    ctx: SagaContext,
}

impl DepositSaga {
    pub fn new(ctx: SagaContext) -> Self {
        Self { ctx }
    }

    async fn on_started(&self, e: &BalanceOperationStarted) -> Result<()> {
        let (info, created) = self
            .ctx
            .store
            .get_or_add(DEPOSIT_OPERATION_NAME, &e.operation_id, || DepositData {
                client_id: e.client_id.clone(),
                account_id: e.account_id.clone(),
                amount: e.amount,
                comment: e.comment.clone(),
                audit_log: e.audit_log.clone(),
                state: DepositState::FreezingAmount,
                fail_reason: None,
                dispatch_pending: false,
            })
            .await?;

        if created {
            info!(
                "Deposit {} started: {} to account {}",
                e.operation_id, e.amount, e.account_id
            );
        }

        if info.data.state != DepositState::FreezingAmount {
            debug!(
                "Deposit {} is already {:?}, ignoring DepositStarted",
                e.operation_id, info.data.state
            );
            return Ok(());
        }

        self.ctx.faults.checkpoint(&e.operation_id)?;
        self.emit_for_state(&info);
        Ok(())
    }

    async fn on_amount_frozen(&self, operation_id: &str) -> Result<()> {
        if let Some(info) = self
            .ctx
            .advance::<DepositData, _>(
                DEPOSIT_OPERATION_NAME,
                operation_id,
                DepositState::FreezingAmount,
                DepositState::UpdatingBalance,
                |_| {},
            )
            .await?
        {
            self.emit_for_state(&info);
        }
        Ok(())
    }

    async fn on_balance_updated(&self, operation_id: &str) -> Result<()> {
        if let Some(info) = self
            .ctx
            .advance::<DepositData, _>(
                DEPOSIT_OPERATION_NAME,
                operation_id,
                DepositState::UpdatingBalance,
                DepositState::Succeeded,
                |_| {},
            )
            .await?
        {
            self.emit_for_state(&info);
        }
        Ok(())
    }

    async fn on_failed(&self, operation_id: &str, expected: DepositState, reason: &str) -> Result<()> {
        let reason = reason.to_string();
        if let Some(info) = self
            .ctx
            .advance::<DepositData, _>(
                DEPOSIT_OPERATION_NAME,
                operation_id,
                expected,
                DepositState::Failed,
                move |data| data.fail_reason = Some(reason),
            )
            .await?
        {
            self.emit_for_state(&info);
        }
        Ok(())
    }

    /// Re-sends the message implied by the persisted state.
    pub fn resume(&self, operation_id: &str) -> Result<()> {
        let info = self.ctx.load::<DepositData>(DEPOSIT_OPERATION_NAME, operation_id)?;
        info!("Resuming deposit {} in state {:?}", operation_id, info.data.state);
        self.emit_for_state(&info);
        Ok(())
    }

    fn emit_for_state(&self, info: &DepositInfo) {
        let data = &info.data;
        let timestamp = self.ctx.clock.now();
        let command = match data.state {
            DepositState::FreezingAmount => Command::FreezeAmountForDeposit(MarginRequest {
                operation_id: info.id.clone(),
                timestamp,
                client_id: data.client_id.clone(),
                account_id: data.account_id.clone(),
                amount: data.amount,
            }),
            DepositState::UpdatingBalance => Command::UpdateBalance(UpdateBalance {
                operation_id: info.id.clone(),
                timestamp,
                client_id: data.client_id.clone(),
                account_id: data.account_id.clone(),
                amount_delta: data.amount,
                comment: data.comment.clone(),
                audit_log: data.audit_log.clone(),
                source: DEPOSIT_OPERATION_NAME.to_string(),
                reason_type: BalanceChangeReasonType::Deposit,
                event_source_id: None,
                instrument: None,
                trading_date: None,
                change_transfer_limit: false,
            }),
            DepositState::Succeeded => Command::CompleteDeposit(BalanceOperationSucceeded {
                operation_id: info.id.clone(),
                timestamp,
                client_id: data.client_id.clone(),
                account_id: data.account_id.clone(),
                amount: data.amount,
            }),
            DepositState::Failed => Command::FailDeposit(OperationFailed {
                operation_id: info.id.clone(),
                timestamp,
                reason: data.fail_reason.clone().unwrap_or_default(),
            }),
        };
        self.ctx.sink.send_command(command);
    }
}

#[async_trait]
impl EventHandler for DepositSaga {
    fn name(&self) -> &'static str {
        "DepositSaga"
    }

    async fn handle_event(&self, event: &Event) -> Result<()> {
        match event {
            Event::DepositStarted(e) => self.on_started(e).await,
            Event::AmountForDepositFrozen(e) => self.on_amount_frozen(&e.operation_id).await,
            Event::AmountForDepositFreezeFailed(e) => {
                self.on_failed(&e.operation_id, DepositState::FreezingAmount, &e.reason)
                    .await
            }
            Event::AccountChanged(e)
                if e.source == DEPOSIT_OPERATION_NAME
                    && e.event_type == AccountChangedEventType::BalanceUpdated =>
            {
                self.on_balance_updated(&e.operation_id).await
            }
            Event::AccountBalanceChangeFailed(e) if e.source == DEPOSIT_OPERATION_NAME => {
                self.on_failed(&e.operation_id, DepositState::UpdatingBalance, &e.reason)
                    .await
            }
            _ => Ok(()),
        }
    }
}
