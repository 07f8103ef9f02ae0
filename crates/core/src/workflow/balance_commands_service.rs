//! Entry points that start balance operations.
//!
//! Requests are validated synchronously against the current account; a
//! valid request becomes a started event (or, for manual charges, an
//! `UpdateBalance` command) and the caller gets the operation id back.

use std::sync::Arc;

use chrono::NaiveDate;
use log::info;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::messages::{
    BalanceOperationStarted, Command, Event, GiveTemporaryCapitalStarted,
    RevokeTemporaryCapitalStarted, UpdateBalance,
};
use super::sink::MessageSink;
use crate::accounts::{
    ensure_account_valid, AccountRepositoryTrait, TemporaryCapital,
    DEFAULT_TEMPORARY_CAPITAL_REASON,
};
use crate::errors::{Error, Result, ValidationError};
use crate::ledger::BalanceChangeReasonType;
use crate::utils::Clock;

/// Deposit or withdrawal request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceOperationRequest {
    #[serde(default)]
    pub operation_id: Option<String>,
    pub account_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub audit_log: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeManuallyRequest {
    #[serde(default)]
    pub operation_id: Option<String>,
    pub account_id: String,
    pub amount_delta: Decimal,
    pub reason_type: BalanceChangeReasonType,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub audit_log: Option<String>,
    /// Name of the caller, echoed back in the resulting events.
    #[serde(default = "default_charge_source")]
    pub source: String,
    #[serde(default)]
    pub event_source_id: Option<String>,
    #[serde(default)]
    pub instrument: Option<String>,
    #[serde(default)]
    pub trading_date: Option<NaiveDate>,
    #[serde(default)]
    pub change_transfer_limit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiveTemporaryCapitalRequest {
    pub event_source_id: String,
    pub account_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub additional_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeTemporaryCapitalRequest {
    pub event_source_id: String,
    pub account_id: String,
    /// Record to revoke; all records when omitted.
    #[serde(default)]
    pub revoke_event_source_id: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub additional_info: Option<String>,
}

pub const CHARGE_MANUALLY_SOURCE: &str = "ChargeManually";

fn default_charge_source() -> String {
    CHARGE_MANUALLY_SOURCE.to_string()
}

pub struct BalanceCommandsService {
    accounts: Arc<dyn AccountRepositoryTrait>,
    sink: Arc<dyn MessageSink>,
    clock: Arc<dyn Clock>,
}

fn operation_id_or_new(operation_id: Option<String>) -> String {
    match operation_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => Uuid::new_v4().simple().to_string(),
    }
}

fn ensure_positive(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(ValidationError::InvalidInput(format!(
            "Amount must be greater than zero, got {}",
            amount
        ))
        .into());
    }
    Ok(())
}

impl BalanceCommandsService {
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

    pub fn start_deposit(&self, request: BalanceOperationRequest) -> Result<String> {
        ensure_positive(request.amount)?;
        let account = ensure_account_valid(self.accounts.as_ref(), &request.account_id, false)?;

        let operation_id = operation_id_or_new(request.operation_id);
        info!(
            "Starting deposit {} of {} to account {}",
            operation_id, request.amount, account.id
        );
        self.sink
            .publish_event(Event::DepositStarted(BalanceOperationStarted {
                operation_id: operation_id.clone(),
                timestamp: self.clock.now(),
                client_id: account.client_id,
                account_id: account.id,
                amount: request.amount,
                comment: request.comment,
                audit_log: request.audit_log,
            }));
        Ok(operation_id)
    }

    pub fn start_withdrawal(&self, request: BalanceOperationRequest) -> Result<String> {
        ensure_positive(request.amount)?;
        let account = ensure_account_valid(self.accounts.as_ref(), &request.account_id, false)?;

        if account.is_withdrawal_disabled {
            return Err(Error::BusinessRule(format!(
                "Withdrawals are disabled for account {}",
                account.id
            )));
        }
        if request.amount > account.balance {
            return Err(Error::BusinessRule(format!(
                "Insufficient balance on account {}: {} available, {} requested",
                account.id, account.balance, request.amount
            )));
        }

        let operation_id = operation_id_or_new(request.operation_id);
        info!(
            "Starting withdrawal {} of {} from account {}",
            operation_id, request.amount, account.id
        );
        self.sink
            .publish_event(Event::WithdrawalStarted(BalanceOperationStarted {
                operation_id: operation_id.clone(),
                timestamp: self.clock.now(),
                client_id: account.client_id,
                account_id: account.id,
                amount: request.amount,
                comment: request.comment,
                audit_log: request.audit_log,
            }));
        Ok(operation_id)
    }

    /// Sends a single-step balance change straight to the balance handler.
    pub fn charge_manually(&self, request: ChargeManuallyRequest) -> Result<String> {
        if request.amount_delta.is_zero() {
            return Err(ValidationError::InvalidInput("Amount delta must not be zero".to_string()).into());
        }
        let account = ensure_account_valid(self.accounts.as_ref(), &request.account_id, false)?;

        let operation_id = operation_id_or_new(request.operation_id);
        info!(
            "Charging account {} manually by {} ({}), operation {}",
            account.id, request.amount_delta, request.reason_type, operation_id
        );
        self.sink.send_command(Command::UpdateBalance(UpdateBalance {
            operation_id: operation_id.clone(),
            timestamp: self.clock.now(),
            client_id: account.client_id,
            account_id: account.id,
            amount_delta: request.amount_delta,
            comment: request.comment,
            audit_log: request.audit_log,
            source: request.source,
            reason_type: request.reason_type,
            event_source_id: request.event_source_id,
            instrument: request.instrument,
            trading_date: request.trading_date,
            change_transfer_limit: request.change_transfer_limit,
        }));
        Ok(operation_id)
    }

    pub fn start_give_temporary_capital(&self, request: GiveTemporaryCapitalRequest) -> Result<String> {
        ensure_positive(request.amount)?;
        if request.event_source_id.trim().is_empty() {
            return Err(ValidationError::MissingField("eventSourceId".to_string()).into());
        }
        let account = ensure_account_valid(self.accounts.as_ref(), &request.account_id, false)?;
        if account
            .temporary_capital
            .iter()
            .any(|tc| tc.id == request.event_source_id)
        {
            return Err(ValidationError::InvalidInput(format!(
                "Temporary capital record with id {} is already set on account {}",
                request.event_source_id, account.id
            ))
            .into());
        }

        let operation_id = Uuid::new_v4().simple().to_string();
        info!(
            "Starting temporary capital grant {} of {} to account {}",
            operation_id, request.amount, account.id
        );
        self.sink
            .publish_event(Event::GiveTemporaryCapitalStarted(GiveTemporaryCapitalStarted {
                operation_id: operation_id.clone(),
                timestamp: self.clock.now(),
                event_source_id: request.event_source_id,
                client_id: account.client_id,
                account_id: account.id,
                amount: request.amount,
                reason: request
                    .reason
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_TEMPORARY_CAPITAL_REASON.to_string()),
                comment: request.comment,
                additional_info: request.additional_info,
            }));
        Ok(operation_id)
    }

    pub fn start_revoke_temporary_capital(
        &self,
        request: RevokeTemporaryCapitalRequest,
    ) -> Result<String> {
        if request.event_source_id.trim().is_empty() {
            return Err(ValidationError::MissingField("eventSourceId".to_string()).into());
        }
        let account = ensure_account_valid(self.accounts.as_ref(), &request.account_id, false)?;

        let revoked: Vec<TemporaryCapital> = match &request.revoke_event_source_id {
            Some(id) => account
                .temporary_capital
                .iter()
                .filter(|tc| &tc.id == id)
                .cloned()
                .collect(),
            None => account.temporary_capital.clone(),
        };
        if revoked.is_empty() {
            return Err(ValidationError::InvalidInput(match &request.revoke_event_source_id {
                Some(id) => format!(
                    "Temporary capital record with id {} is not set on account {}",
                    id, account.id
                ),
                None => format!("Account {} has no temporary capital", account.id),
            })
            .into());
        }

        let operation_id = Uuid::new_v4().simple().to_string();
        info!(
            "Starting temporary capital revocation {} on account {} ({} records)",
            operation_id,
            account.id,
            revoked.len()
        );
        self.sink
            .publish_event(Event::RevokeTemporaryCapitalStarted(RevokeTemporaryCapitalStarted {
                operation_id: operation_id.clone(),
                timestamp: self.clock.now(),
                event_source_id: request.event_source_id,
                client_id: account.client_id,
                account_id: account.id,
                revoke_event_source_id: request.revoke_event_source_id,
                comment: request.comment,
                additional_info: request.additional_info,
                revoked,
            }));
        Ok(operation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{Account, InMemoryAccountRepository};
    use crate::utils::FixedClock;
    use crate::workflow::MockMessageSink;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn account(balance: Decimal) -> Account {
        Account {
            id: "A".to_string(),
            client_id: "client-1".to_string(),
            trading_condition_id: "tc-1".to_string(),
            base_asset_id: "EUR".to_string(),
            balance,
            withdraw_transfer_limit: dec!(0),
            legal_entity: "LE-1".to_string(),
            is_disabled: false,
            is_withdrawal_disabled: false,
            is_deleted: false,
            modification_timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            temporary_capital: Vec::new(),
            last_executed_operations: Vec::new(),
            account_name: None,
        }
    }

    async fn setup(balance: Decimal) -> (BalanceCommandsService, Arc<MockMessageSink>) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        ));
        let repo = Arc::new(InMemoryAccountRepository::new(clock.clone()));
        repo.add(account(balance)).await.unwrap();
        let sink = Arc::new(MockMessageSink::new());
        (
            BalanceCommandsService::new(repo, sink.clone(), clock),
            sink,
        )
    }

    fn request(amount: Decimal) -> BalanceOperationRequest {
        BalanceOperationRequest {
            operation_id: Some("op-1".to_string()),
            account_id: "A".to_string(),
            amount,
            comment: None,
            audit_log: None,
        }
    }

    #[tokio::test]
    async fn test_start_deposit_publishes_started_event() {
        let (service, sink) = setup(dec!(0)).await;

        let id = service.start_deposit(request(dec!(100))).unwrap();

        assert_eq!(id, "op-1");
        match sink.events().as_slice() {
            [Event::DepositStarted(e)] => {
                assert_eq!(e.client_id, "client-1");
                assert_eq!(e.amount, dec!(100));
            }
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_positive_amount_is_rejected() {
        let (service, sink) = setup(dec!(0)).await;

        let result = service.start_deposit(request(dec!(0)));

        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::InvalidInput(_)))
        ));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_withdrawal_above_balance_is_rejected() {
        let (service, sink) = setup(dec!(50)).await;

        let result = service.start_withdrawal(request(dec!(80)));

        assert!(matches!(result, Err(Error::BusinessRule(_))));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_account_is_rejected() {
        let (service, _) = setup(dec!(0)).await;
        let mut req = request(dec!(10));
        req.account_id = "missing".to_string();

        let result = service.start_deposit(req);

        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::AccountNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_revoke_without_records_is_rejected() {
        let (service, _) = setup(dec!(0)).await;

        let result = service.start_revoke_temporary_capital(RevokeTemporaryCapitalRequest {
            event_source_id: "rev-1".to_string(),
            account_id: "A".to_string(),
            revoke_event_source_id: None,
            comment: None,
            additional_info: None,
        });

        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::InvalidInput(_)))
        ));
    }
}
