//! Give temporary capital saga: add the record, credit the balance, revert the
//! record if the balance update fails.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::handler::EventHandler;
use super::messages::{
    AccountChangedEventType, Command, Event, FinishTemporaryCapitalOperation,
    GiveTemporaryCapitalStarted, UpdateBalance, UpdateTemporaryCapital,
};
use super::saga_context::SagaContext;
use super::state::{OperationData, OperationState};
use crate::accounts::{TemporaryCapital, TemporaryCapitalChange, TemporaryCapitalChangeKind};
use crate::errors::Result;
use crate::ledger::BalanceChangeReasonType;
use crate::operations::OperationExecutionInfo;

pub const GIVE_TEMPORARY_CAPITAL_OPERATION_NAME: &str = "GiveTemporaryCapital";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GiveTemporaryCapitalState {
    UpdatingTemporaryCapital = 1,
    UpdatingBalance = 2,
    RevertingTemporaryCapital = 3,
    Succeeded = 4,
    Failed = 5,
}

impl OperationState for GiveTemporaryCapitalState {
    fn rank(self) -> u8 {
        self as u8
    }

    fn is_terminal(self) -> bool {
        matches!(
            self,
            GiveTemporaryCapitalState::Succeeded | GiveTemporaryCapitalState::Failed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiveTemporaryCapitalData {
    pub event_source_id: String,
    pub client_id: String,
    pub account_id: String,
    pub amount: Decimal,
    pub reason: String,
    pub comment: Option<String>,
    pub additional_info: Option<String>,
    pub started_at: DateTime<Utc>,
    pub state: GiveTemporaryCapitalState,
    pub fail_reason: Option<String>,
    /// Set when the checkpoint moved but its command is not out yet.
    #[serde(default)]
    pub dispatch_pending: bool,
}

impl OperationData for GiveTemporaryCapitalData {
    type State = GiveTemporaryCapitalState;

    fn state(&self) -> GiveTemporaryCapitalState {
        self.state
    }

    fn set_state(&mut self, state: GiveTemporaryCapitalState) {
        self.state = state;
    }

    fn is_dispatch_pending(&self) -> bool {
        self.dispatch_pending
    }

    fn set_dispatch_pending(&mut self, pending: bool) {
        self.dispatch_pending = pending;
    }
}

type GiveInfo = OperationExecutionInfo<GiveTemporaryCapitalData>;

pub struct GiveTemporaryCapitalSaga {
    ctx: SagaContext,
}

impl GiveTemporaryCapitalSaga {
    pub fn new(ctx: SagaContext) -> Self {
        Self { ctx }
    }

    async fn on_started(&self, e: &GiveTemporaryCapitalStarted) -> Result<()> {
        let (info, created) = self
            .ctx
            .store
            .get_or_add(
                GIVE_TEMPORARY_CAPITAL_OPERATION_NAME,
                &e.operation_id,
                || GiveTemporaryCapitalData {
                    event_source_id: e.event_source_id.clone(),
                    client_id: e.client_id.clone(),
                    account_id: e.account_id.clone(),
                    amount: e.amount,
                    reason: e.reason.clone(),
                    comment: e.comment.clone(),
                    additional_info: e.additional_info.clone(),
                    started_at: e.timestamp,
                    state: GiveTemporaryCapitalState::UpdatingTemporaryCapital,
                    fail_reason: None,
                    dispatch_pending: false,
                },
            )
            .await?;

        if created {
            info!(
                "Temporary capital grant {} started: {} to account {}",
                e.operation_id, e.amount, e.account_id
            );
        }

        if info.data.state != GiveTemporaryCapitalState::UpdatingTemporaryCapital {
            debug!(
                "Temporary capital grant {} is already {:?}, ignoring start event",
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
        expected: GiveTemporaryCapitalState,
        next: GiveTemporaryCapitalState,
        fail_reason: Option<&str>,
    ) -> Result<()> {
        let fail_reason = fail_reason.map(str::to_string);
        if let Some(info) = self
            .ctx
            .advance::<GiveTemporaryCapitalData, _>(
                GIVE_TEMPORARY_CAPITAL_OPERATION_NAME,
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
            .load::<GiveTemporaryCapitalData>(GIVE_TEMPORARY_CAPITAL_OPERATION_NAME, operation_id)?;
        info!(
            "Resuming temporary capital grant {} in state {:?}",
            operation_id, info.data.state
        );
        self.emit_for_state(&info);
        Ok(())
    }

    fn emit_for_state(&self, info: &GiveInfo) {
        let data = &info.data;
        let timestamp = self.ctx.clock.now();
        let command = match data.state {
            GiveTemporaryCapitalState::UpdatingTemporaryCapital => {
                Command::UpdateTemporaryCapital(UpdateTemporaryCapital {
                    operation_id: info.id.clone(),
                    timestamp,
                    source: GIVE_TEMPORARY_CAPITAL_OPERATION_NAME.to_string(),
                    account_id: data.account_id.clone(),
                    change: TemporaryCapitalChange::Add {
                        record: TemporaryCapital {
                            id: data.event_source_id.clone(),
                            amount: data.amount,
                            reason: data.reason.clone(),
                            timestamp: data.started_at,
                        },
                    },
                })
            }
            GiveTemporaryCapitalState::UpdatingBalance => Command::UpdateBalance(UpdateBalance {
                operation_id: info.id.clone(),
                timestamp,
                client_id: data.client_id.clone(),
                account_id: data.account_id.clone(),
                amount_delta: data.amount,
                comment: data.comment.clone(),
                audit_log: data.additional_info.clone(),
                source: GIVE_TEMPORARY_CAPITAL_OPERATION_NAME.to_string(),
                reason_type: BalanceChangeReasonType::TemporaryCashAdjustment,
                event_source_id: Some(data.event_source_id.clone()),
                instrument: None,
                trading_date: None,
                change_transfer_limit: false,
            }),
            GiveTemporaryCapitalState::RevertingTemporaryCapital => {
                Command::UpdateTemporaryCapital(UpdateTemporaryCapital {
                    operation_id: info.id.clone(),
                    timestamp,
                    source: GIVE_TEMPORARY_CAPITAL_OPERATION_NAME.to_string(),
                    account_id: data.account_id.clone(),
                    change: TemporaryCapitalChange::Remove {
                        id: Some(data.event_source_id.clone()),
                    },
                })
            }
            GiveTemporaryCapitalState::Succeeded | GiveTemporaryCapitalState::Failed => {
                Command::FinishGiveTemporaryCapital(FinishTemporaryCapitalOperation {
                    operation_id: info.id.clone(),
                    timestamp,
                    event_source_id: data.event_source_id.clone(),
                    account_id: data.account_id.clone(),
                    amount: data.amount,
                    fail_reason: match data.state {
                        GiveTemporaryCapitalState::Failed => {
                            Some(data.fail_reason.clone().unwrap_or_default())
                        }
                        _ => None,
                    },
                })
            }
        };
        self.ctx.sink.send_command(command);
    }
}

#[async_trait]
impl EventHandler for GiveTemporaryCapitalSaga {
    fn name(&self) -> &'static str {
        "GiveTemporaryCapitalSaga"
    }

    async fn handle_event(&self, event: &Event) -> Result<()> {
        use GiveTemporaryCapitalState::*;

        match event {
            Event::GiveTemporaryCapitalStarted(e) => self.on_started(e).await,
            Event::TemporaryCapitalUpdated(e) if e.source == GIVE_TEMPORARY_CAPITAL_OPERATION_NAME => {
                match e.change_kind {
                    TemporaryCapitalChangeKind::Add => {
                        self.transition(&e.operation_id, UpdatingTemporaryCapital, UpdatingBalance, None)
                            .await
                    }
                    TemporaryCapitalChangeKind::Remove => {
                        self.transition(&e.operation_id, RevertingTemporaryCapital, Failed, None)
                            .await
                    }
                    TemporaryCapitalChangeKind::Restore => Ok(()),
                }
            }
            Event::TemporaryCapitalUpdateFailed(e)
                if e.source == GIVE_TEMPORARY_CAPITAL_OPERATION_NAME =>
            {
                let expected = match e.change_kind {
                    TemporaryCapitalChangeKind::Remove => RevertingTemporaryCapital,
                    _ => UpdatingTemporaryCapital,
                };
                self.transition(&e.operation_id, expected, Failed, Some(&e.reason))
                    .await
            }
            Event::AccountChanged(e)
                if e.source == GIVE_TEMPORARY_CAPITAL_OPERATION_NAME
                    && e.event_type == AccountChangedEventType::BalanceUpdated =>
            {
                self.transition(&e.operation_id, UpdatingBalance, Succeeded, None)
                    .await
            }
            Event::AccountBalanceChangeFailed(e)
                if e.source == GIVE_TEMPORARY_CAPITAL_OPERATION_NAME =>
            {
                self.transition(
                    &e.operation_id,
                    UpdatingBalance,
                    RevertingTemporaryCapital,
                    Some(&e.reason),
                )
                .await
            }
            _ => Ok(()),
        }
    }
}
