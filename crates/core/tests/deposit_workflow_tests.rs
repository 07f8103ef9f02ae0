//! End-to-end deposit flows over the in-memory harness.

mod common;

use chrono::Utc;
use rust_decimal_macros::dec;

use common::{FreezePolicy, Harness};
use margin_accounts_core::accounts::AccountManagementServiceTrait;
use margin_accounts_core::ledger::BalanceChangeReasonType;
use margin_accounts_core::workflow::{
    AccountChanged, AccountChangedEventType, BalanceOperationRequest, Command, DepositData,
    DepositState, Event, MessageSink, OperationStepCompleted, DEPOSIT_OPERATION_NAME,
};

fn deposit_request(account_id: &str, amount: rust_decimal::Decimal) -> BalanceOperationRequest {
    BalanceOperationRequest {
        operation_id: None,
        account_id: account_id.to_string(),
        amount,
        comment: Some("top up".to_string()),
        audit_log: None,
    }
}

fn deposit_state(h: &Harness, operation_id: &str) -> DepositState {
    h.store
        .get::<DepositData>(DEPOSIT_OPERATION_NAME, operation_id)
        .unwrap()
        .unwrap()
        .data
        .state
}

#[tokio::test]
async fn test_deposit_credits_balance_and_writes_one_ledger_row() {
    let h = Harness::new();
    h.open_account("A", dec!(0)).await;

    let operation_id = h
        .balance_commands
        .start_deposit(deposit_request("A", dec!(100)))
        .unwrap();
    let errors = h.pump().await;

    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(h.account("A").balance, dec!(100));
    assert_eq!(deposit_state(&h, &operation_id), DepositState::Succeeded);

    let rows = h.ledger_rows("A");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, operation_id);
    assert_eq!(rows[0].change_amount, dec!(100));
    assert_eq!(rows[0].balance, dec!(100));
    assert_eq!(rows[0].reason_type, BalanceChangeReasonType::Deposit);

    assert_eq!(h.commands_named("FreezeAmountForDeposit").len(), 1);
    assert_eq!(h.commands_named("UpdateBalance").len(), 1);
    assert_eq!(h.events_named("DepositSucceeded").len(), 1);
}

#[tokio::test]
async fn test_redelivered_started_event_after_success_is_ignored() {
    let h = Harness::new();
    h.open_account("A", dec!(0)).await;
    h.balance_commands
        .start_deposit(deposit_request("A", dec!(100)))
        .unwrap();
    let started = h.sink.events().into_iter().next().unwrap();
    assert!(h.pump().await.is_empty());
    let commands_before = h.commands().len();

    h.run(started).await;

    assert_eq!(h.commands().len(), commands_before);
    assert_eq!(h.account("A").balance, dec!(100));
}

#[tokio::test]
async fn test_rejected_freeze_fails_deposit_without_touching_balance() {
    let h = Harness::new();
    h.open_account("A", dec!(10)).await;
    h.set_freeze_policy(FreezePolicy::Reject("margin call".to_string()));

    let operation_id = h
        .balance_commands
        .start_deposit(deposit_request("A", dec!(100)))
        .unwrap();
    assert!(h.pump().await.is_empty());

    assert_eq!(deposit_state(&h, &operation_id), DepositState::Failed);
    assert_eq!(h.account("A").balance, dec!(10));
    assert!(h.ledger_rows("A").is_empty());
    assert!(h.commands_named("UpdateBalance").is_empty());

    match h.events_named("DepositFailed").as_slice() {
        [Event::DepositFailed(e)] => assert_eq!(e.reason, "margin call"),
        other => panic!("unexpected failure events: {:?}", other),
    }
}

#[tokio::test]
async fn test_duplicate_update_balance_applies_once() {
    let h = Harness::new();
    h.open_account("A", dec!(0)).await;
    h.set_freeze_policy(FreezePolicy::Silent);

    let operation_id = h
        .balance_commands
        .start_deposit(deposit_request("A", dec!(40)))
        .unwrap();
    assert!(h.pump().await.is_empty());
    h.set_freeze_policy(FreezePolicy::Approve);
    h.deliver_event(&Event::AmountForDepositFrozen(OperationStepCompleted {
        operation_id: operation_id.clone(),
        timestamp: Utc::now(),
    }))
    .await
    .unwrap();

    let update = h.sink.commands().into_iter().next().unwrap();
    assert!(matches!(update, Command::UpdateBalance(_)));
    h.sink.send_command(update);
    assert!(h.pump().await.is_empty());

    assert_eq!(h.commands_named("UpdateBalance").len(), 2);
    assert_eq!(h.account("A").balance, dec!(40));
    assert_eq!(h.ledger_rows("A").len(), 1);
    assert_eq!(h.commands_named("CompleteDeposit").len(), 1);
    assert_eq!(deposit_state(&h, &operation_id), DepositState::Succeeded);
}

#[tokio::test]
async fn test_early_balance_event_is_retryable() {
    let h = Harness::new();
    let account = h.open_account("A", dec!(5)).await;
    h.set_freeze_policy(FreezePolicy::Silent);

    let operation_id = h
        .balance_commands
        .start_deposit(deposit_request("A", dec!(40)))
        .unwrap();
    assert!(h.pump().await.is_empty());

    let early = Event::AccountChanged(AccountChanged {
        operation_id: operation_id.clone(),
        timestamp: Utc::now(),
        source: DEPOSIT_OPERATION_NAME.to_string(),
        account,
        event_type: AccountChangedEventType::BalanceUpdated,
        balance_change: None,
        previous_snapshot: None,
    });
    let err = h.deliver_event(&early).await.unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(deposit_state(&h, &operation_id), DepositState::FreezingAmount);
}

#[tokio::test]
async fn test_step_for_unknown_operation_is_retryable() {
    let h = Harness::new();

    let err = h
        .deliver_event(&Event::AmountForDepositFrozen(OperationStepCompleted {
            operation_id: "missing".to_string(),
            timestamp: Utc::now(),
        }))
        .await
        .unwrap_err();

    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_deposit_to_deleted_account_is_rejected_up_front() {
    let h = Harness::new();
    h.open_account("A", dec!(0)).await;
    h.service.delete_account("A").await.unwrap();

    let result = h.balance_commands.start_deposit(deposit_request("A", dec!(10)));

    assert!(result.is_err());
    assert!(h
        .sink
        .events()
        .iter()
        .all(|e| e.name() != "DepositStarted"));
}

#[tokio::test]
async fn test_balance_command_redelivered_long_after_is_not_reapplied() {
    let h = Harness::new();
    h.open_account("A", dec!(0)).await;
    let first = h
        .balance_commands
        .start_deposit(deposit_request("A", dec!(100)))
        .unwrap();
    assert!(h.pump().await.is_empty());
    let update = h
        .commands_named("UpdateBalance")
        .into_iter()
        .find(|c| c.operation_id() == first)
        .unwrap();

    // Push the first operation id out of the account's recent-operations list.
    for _ in 0..20 {
        h.balance_commands
            .start_deposit(deposit_request("A", dec!(100)))
            .unwrap();
        assert!(h.pump().await.is_empty());
    }
    assert_eq!(h.account("A").balance, dec!(2100));
    assert!(!h.account("A").has_executed(&first));

    h.sink.take_events();
    h.deliver_command(&update).await.unwrap();

    assert_eq!(h.account("A").balance, dec!(2100));
    assert_eq!(h.ledger_rows("A").len(), 21);
    match h.sink.events().as_slice() {
        [Event::AccountChanged(e)] => {
            assert_eq!(e.operation_id, first);
            assert_eq!(e.account.balance, dec!(2100));
            assert_eq!(e.balance_change.as_ref().map(|c| c.change_amount), Some(dec!(100)));
        }
        other => panic!("unexpected events: {:?}", other),
    }
    assert!(h.pump().await.is_empty());
    assert_eq!(h.account("A").balance, dec!(2100));
}
