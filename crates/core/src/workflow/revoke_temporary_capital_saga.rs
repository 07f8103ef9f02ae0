//! Revoke temporary capital saga: remove the records, debit the balance,
//! restore the records if the balance update fails.

use async_trait::async_trait;
use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::handler::EventHandler;
use super::messages::{
    AccountChangedEventType, Command, Event, FinishTemporaryCapitalOperation,
    RevokeTemporaryCapitalStarted, TemporaryCapitalUpdated, UpdateBalance,
    UpdateTemporaryCapital,
};
use super::saga_context::SagaContext;
use super::state::{OperationData, OperationState};
use crate::accounts::{TemporaryCapital, TemporaryCapitalChange, TemporaryCapitalChangeKind};
use crate::errors::Result;
use crate::ledger::BalanceChangeReasonType;
use crate::operations::OperationExecutionInfo;

pub const REVOKE_TEMPORARY_CAPITAL_OPERATION_NAME: &str = "RevokeTemporaryCapital";

const NOTHING_TO_REVOKE: &str = "No temporary capital left to revoke";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevokeTemporaryCapitalState {
    RevokingTemporaryCapital = 1,
    UpdatingBalance = 2,
    RestoringTemporaryCapital = 3,
    Succeeded = 4,
    Failed = 5,
}

impl OperationState for RevokeTemporaryCapitalState {
    fn rank(self) -> u8 {
        self as u8
    }

    fn is_terminal(self) -> bool {
        matches!(
            self,
            RevokeTemporaryCapitalState::Succeeded | RevokeTemporaryCapitalState::Failed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeTemporaryCapitalData {
    pub event_source_id: String,
    pub client_id: String,
    pub account_id: String,
    pub revoke_event_source_id: Option<String>,
    pub revoked: Vec<TemporaryCapital>,
    pub comment: Option<String>,
    pub additional_info: Option<String>,
    pub state: RevokeTemporaryCapitalState,
    pub fail_reason: Option<String>,
    /// Set when the checkpoint moved but its command is not out yet.
    #[serde(default)]
    pub dispatch_pending: bool,
}

impl RevokeTemporaryCapitalData {
    pub fn amount(&self) -> Decimal {
        self.revoked.iter().map(|tc| tc.amount).sum()
    }
}

impl OperationData for RevokeTemporaryCapitalData {
    type State = RevokeTemporaryCapitalState;

    fn state(&self) -> RevokeTemporaryCapitalState {
        self.state
    }

    fn set_state(&mut self, state: RevokeTemporaryCapitalState) {
        self.state = state;
    }

    fn is_dispatch_pending(&self) -> bool {
        self.dispatch_pending
    }

    fn set_dispatch_pending(&mut self, pending: bool) {
        self.dispatch_pending = pending;
    }
}

type RevokeInfo = OperationExecutionInfo<RevokeTemporaryCapitalData>;

pub struct RevokeTemporaryCapitalSaga {
    ctx: SagaContext,
}

impl RevokeTemporaryCapitalSaga {
    pub fn new(ctx: SagaContext) -> Self {
        Self { ctx }
    }

    async fn on_started(&self, e: &RevokeTemporaryCapitalStarted) -> Result<()> {
        let (info, created) = self
            .ctx
            .store
            .get_or_add(
                REVOKE_TEMPORARY_CAPITAL_OPERATION_NAME,
                &e.operation_id,
                || RevokeTemporaryCapitalData {
                    event_source_id: e.event_source_id.clone(),
                    client_id: e.client_id.clone(),
                    account_id: e.account_id.clone(),
                    revoke_event_source_id: e.revoke_event_source_id.clone(),
                    revoked: e.revoked.clone(),
                    comment: e.comment.clone(),
                    additional_info: e.additional_info.clone(),
                    state: RevokeTemporaryCapitalState::RevokingTemporaryCapital,
                    fail_reason: None,
                    dispatch_pending: false,
                },
            )
            .await?;

        if created {
            info!(
                "Temporary capital revocation {} started on account {} ({} records)",
                e.operation_id,
                e.account_id,
                e.revoked.len()
            );
        }

        if info.data.state != RevokeTemporaryCapitalState::RevokingTemporaryCapital {
            debug!(
                "Temporary capital revocation {} is already {:?}, ignoring start event",
                e.operation_id, info.data.state
            );
            return Ok(());
        }

        self.ctx.faults.checkpoint(&e.operation_id)?;
        self.emit_for_state(&info);
        Ok(())
    }

    /// The debit follows what the account actually dropped, which can be
    /// less than the start snapshot when another revocation got there first.
    async fn on_removed(&self, e: &TemporaryCapitalUpdated) -> Result<()> {
        use RevokeTemporaryCapitalState::*;

        if !e.applied {
            debug!(
                "Temporary capital revocation {}: duplicate removal report, ignoring",
                e.operation_id
            );
            return Ok(());
        }

        let removed = e.removed.clone();
        let next = if removed.is_empty() {
            Failed
        } else {
            UpdatingBalance
        };
        if let Some(info) = self
            .ctx
            .advance::<RevokeTemporaryCapitalData, _>(
                REVOKE_TEMPORARY_CAPITAL_OPERATION_NAME,
                &e.operation_id,
                RevokingTemporaryCapital,
                next,
                move |data| {
                    if removed.is_empty() {
                        data.fail_reason = Some(NOTHING_TO_REVOKE.to_string());
                    }
                    data.revoked = removed;
                },
            )
            .await?
        {
            self.emit_for_state(&info);
        }
        Ok(())
    }

    async fn transition(
        &self,
        operation_id: &str,
        expected: RevokeTemporaryCapitalState,
        next: RevokeTemporaryCapitalState,
        fail_reason: Option<&str>,
    ) -> Result<()> {
        let fail_reason = fail_reason.map(str::to_string);
        if let Some(info) = self
            .ctx
            .advance::<RevokeTemporaryCapitalData, _>(
                REVOKE_TEMPORARY_CAPITAL_OPERATION_NAME,
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
        let info = self.ctx.load::<RevokeTemporaryCapitalData>(
            REVOKE_TEMPORARY_CAPITAL_OPERATION_NAME,
            operation_id,
        )?;
        info!(
            "Resuming temporary capital revocation {} in state {:?}",
            operation_id, info.data.state
        );
        self.emit_for_state(&info);
        Ok(())
    }

    fn temporary_capital_command(&self, info: &RevokeInfo, change: TemporaryCapitalChange) -> Command {
        Command::UpdateTemporaryCapital(UpdateTemporaryCapital {
            operation_id: info.id.clone(),
            timestamp: self.ctx.clock.now(),
            source: REVOKE_TEMPORARY_CAPITAL_OPERATION_NAME.to_string(),
            account_id: info.data.account_id.clone(),
            change,
        })
    }

    fn emit_for_state(&self, info: &RevokeInfo) {
        let data = &info.data;
        let timestamp = self.ctx.clock.now();
        let command = match data.state {
            RevokeTemporaryCapitalState::RevokingTemporaryCapital => self.temporary_capital_command(
                info,
                TemporaryCapitalChange::Remove {
                    id: data.revoke_event_source_id.clone(),
                },
            ),
            RevokeTemporaryCapitalState::UpdatingBalance => Command::UpdateBalance(UpdateBalance {
                operation_id: info.id.clone(),
                timestamp,
                client_id: data.client_id.clone(),
                account_id: data.account_id.clone(),
                amount_delta: -data.amount(),
                comment: data.comment.clone(),
                audit_log: data.additional_info.clone(),
                source: REVOKE_TEMPORARY_CAPITAL_OPERATION_NAME.to_string(),
                reason_type: BalanceChangeReasonType::TemporaryCashAdjustment,
                event_source_id: Some(data.event_source_id.clone()),
                instrument: None,
                trading_date: None,
                change_transfer_limit: false,
            }),
            RevokeTemporaryCapitalState::RestoringTemporaryCapital => self.temporary_capital_command(
                info,
                TemporaryCapitalChange::Restore {
                    records: data.revoked.clone(),
                },
            ),
            RevokeTemporaryCapitalState::Succeeded | RevokeTemporaryCapitalState::Failed => {
                Command::FinishRevokeTemporaryCapital(FinishTemporaryCapitalOperation {
                    operation_id: info.id.clone(),
                    timestamp,
                    event_source_id: data.event_source_id.clone(),
                    account_id: data.account_id.clone(),
                    amount: data.amount(),
                    fail_reason: match data.state {
                        RevokeTemporaryCapitalState::Failed => {
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
impl EventHandler for RevokeTemporaryCapitalSaga {
    fn name(&self) -> &'static str {
        "RevokeTemporaryCapitalSaga"
    }

    async fn handle_event(&self, event: &Event) -> Result<()> {
        use RevokeTemporaryCapitalState::*;

        match event {
            Event::RevokeTemporaryCapitalStarted(e) => self.on_started(e).await,
            Event::TemporaryCapitalUpdated(e)
                if e.source == REVOKE_TEMPORARY_CAPITAL_OPERATION_NAME =>
            {
                match e.change_kind {
                    TemporaryCapitalChangeKind::Remove => self.on_removed(e).await,
                    TemporaryCapitalChangeKind::Restore => {
                        self.transition(&e.operation_id, RestoringTemporaryCapital, Failed, None)
                            .await
                    }
                    TemporaryCapitalChangeKind::Add => Ok(()),
                }
            }
            Event::TemporaryCapitalUpdateFailed(e)
                if e.source == REVOKE_TEMPORARY_CAPITAL_OPERATION_NAME =>
            {
                let expected = match e.change_kind {
                    TemporaryCapitalChangeKind::Restore => RestoringTemporaryCapital,
                    _ => RevokingTemporaryCapital,
                };
                self.transition(&e.operation_id, expected, Failed, Some(&e.reason))
                    .await
            }
            Event::AccountChanged(e)
                if e.source == REVOKE_TEMPORARY_CAPITAL_OPERATION_NAME
                    && e.event_type == AccountChangedEventType::BalanceUpdated =>
            {
                self.transition(&e.operation_id, UpdatingBalance, Succeeded, None)
                    .await
            }
            Event::AccountBalanceChangeFailed(e)
                if e.source == REVOKE_TEMPORARY_CAPITAL_OPERATION_NAME =>
            {
                self.transition(
                    &e.operation_id,
                    UpdatingBalance,
                    RestoringTemporaryCapital,
                    Some(&e.reason),
                )
                .await
            }
            _ => Ok(()),
        }
    }
}
