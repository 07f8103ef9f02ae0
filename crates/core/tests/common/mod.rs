//! Shared harness for workflow integration tests.
//!
//! Wires every saga and command handler over in-memory repositories and a
//! [`MockMessageSink`]. `pump` drains the sink and delivers each message to
//! every handler, standing in for the bus. The trading core's replies to
//! freeze and unfreeze requests are simulated according to `FreezePolicy`.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;

use margin_accounts_core::accounts::{
    Account, AccountManagementService, AccountManagementServiceTrait, AccountRepositoryTrait,
    InMemoryAccountRepository, NewAccount,
};
use margin_accounts_core::errors::{Error, Result};
use margin_accounts_core::ledger::{
    AccountBalanceChange, BalanceChangeFilter, InMemoryLedgerRepository, LedgerRepositoryTrait,
};
use margin_accounts_core::operations::{
    InMemoryOperationExecutionRepository, OperationExecutionStore,
};
use margin_accounts_core::settings::AccountManagementSettings;
use margin_accounts_core::statistics::StatisticsProjection;
use margin_accounts_core::trading::{
    StaticTradingConditionsService, StaticTradingStatsProvider, TradingCondition,
};
use margin_accounts_core::utils::FixedClock;
use margin_accounts_core::workflow::{
    BalanceCommandsHandler, BalanceCommandsService, Command, CommandHandler, DepositSaga, Event,
    EventHandler, GiveTemporaryCapitalSaga, MessageSink, MockMessageSink, NegativeProtectionSaga,
    NegativeProtectionService, OperationCommandsHandler, OperationFailed, OperationStepCompleted,
    RevokeTemporaryCapitalSaga, SagaContext, ScriptedFaults, TemporaryCapitalCommandsHandler,
    WithdrawalSaga,
};

pub const TRADING_CONDITION: &str = "tc-1";
pub const LEGAL_ENTITY: &str = "LE-1";

/// How the simulated trading core answers freeze requests.
#[derive(Debug, Clone, PartialEq)]
pub enum FreezePolicy {
    Approve,
    Reject(String),
    /// Freeze requests are recorded but never answered.
    Silent,
}

pub struct Harness {
    pub clock: Arc<FixedClock>,
    pub accounts: Arc<InMemoryAccountRepository>,
    pub ledger: Arc<InMemoryLedgerRepository>,
    pub store: Arc<OperationExecutionStore>,
    pub sink: Arc<MockMessageSink>,
    pub faults: Arc<ScriptedFaults>,
    pub stats: Arc<StaticTradingStatsProvider>,
    pub balance_commands: Arc<BalanceCommandsService>,
    pub service: Arc<AccountManagementService>,
    pub deposit: Arc<DepositSaga>,
    pub withdrawal: Arc<WithdrawalSaga>,
    pub give: Arc<GiveTemporaryCapitalSaga>,
    pub revoke: Arc<RevokeTemporaryCapitalSaga>,
    event_handlers: Vec<Arc<dyn EventHandler>>,
    command_handlers: Vec<Arc<dyn CommandHandler>>,
    freeze_policy: Mutex<FreezePolicy>,
    observed_events: Mutex<Vec<Event>>,
    observed_commands: Mutex<Vec<Command>>,
}

impl Harness {
    pub fn new() -> Self {
        let mut settings = AccountManagementSettings::default();
        settings.negative_protection.delay_ms = 0;
        Self::with_settings(settings)
    }

    pub fn with_settings(settings: AccountManagementSettings) -> Self {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        ));
        let accounts = Arc::new(InMemoryAccountRepository::new(clock.clone()));
        let ledger = Arc::new(InMemoryLedgerRepository::new());
        let store = Arc::new(OperationExecutionStore::new(
            Arc::new(InMemoryOperationExecutionRepository::new()),
            clock.clone(),
        ));
        let sink = Arc::new(MockMessageSink::new());
        let faults = Arc::new(ScriptedFaults::new());
        let stats = Arc::new(StaticTradingStatsProvider::new());
        let conditions = Arc::new(StaticTradingConditionsService::new(vec![TradingCondition {
            id: TRADING_CONDITION.to_string(),
            name: "Default".to_string(),
            legal_entity: LEGAL_ENTITY.to_string(),
            base_assets: vec!["EUR".to_string()],
            is_default: true,
        }]));

        let balance_commands = Arc::new(BalanceCommandsService::new(
            accounts.clone(),
            sink.clone(),
            clock.clone(),
        ));
        let service = Arc::new(AccountManagementService::new(
            accounts.clone(),
            ledger.clone(),
            conditions,
            stats.clone(),
            stats.clone(),
            balance_commands.clone(),
            sink.clone(),
            clock.clone(),
            settings.clone(),
        ));

        let ctx = SagaContext::new(store.clone(), sink.clone(), faults.clone(), clock.clone());
        let deposit = Arc::new(DepositSaga::new(ctx.clone()));
        let withdrawal = Arc::new(WithdrawalSaga::new(ctx.clone()));
        let give = Arc::new(GiveTemporaryCapitalSaga::new(ctx.clone()));
        let revoke = Arc::new(RevokeTemporaryCapitalSaga::new(ctx));
        let negative_protection = Arc::new(NegativeProtectionSaga::new(
            Arc::new(NegativeProtectionService::new(store.clone(), ledger.clone())),
            accounts.clone(),
            stats.clone(),
            sink.clone(),
            clock.clone(),
            settings.negative_protection.clone(),
        ));

        let event_handlers: Vec<Arc<dyn EventHandler>> = vec![
            deposit.clone(),
            withdrawal.clone(),
            give.clone(),
            revoke.clone(),
            negative_protection,
            Arc::new(StatisticsProjection::new(service.clone())),
        ];
        let command_handlers: Vec<Arc<dyn CommandHandler>> = vec![
            Arc::new(BalanceCommandsHandler::new(
                accounts.clone(),
                ledger.clone(),
                sink.clone(),
                clock.clone(),
            )),
            Arc::new(TemporaryCapitalCommandsHandler::new(
                accounts.clone(),
                sink.clone(),
                clock.clone(),
            )),
            Arc::new(OperationCommandsHandler::new(sink.clone(), clock.clone())),
        ];

        Self {
            clock,
            accounts,
            ledger,
            store,
            sink,
            faults,
            stats,
            balance_commands,
            service,
            deposit,
            withdrawal,
            give,
            revoke,
            event_handlers,
            command_handlers,
            freeze_policy: Mutex::new(FreezePolicy::Approve),
            observed_events: Mutex::new(Vec::new()),
            observed_commands: Mutex::new(Vec::new()),
        }
    }

    pub fn set_freeze_policy(&self, policy: FreezePolicy) {
        *self.freeze_policy.lock().unwrap() = policy;
    }

    /// Opens an account on the default trading condition and credits `balance`.
    pub async fn open_account(&self, account_id: &str, balance: Decimal) -> Account {
        self.service
            .create_account(NewAccount {
                id: Some(account_id.to_string()),
                client_id: format!("client-{}", account_id),
                trading_condition_id: TRADING_CONDITION.to_string(),
                base_asset_id: "EUR".to_string(),
                account_name: None,
            })
            .await
            .unwrap();
        if !balance.is_zero() {
            self.accounts
                .update_balance(&format!("seed-{}", account_id), account_id, balance, false)
                .await
                .unwrap();
        }
        self.sink.clear();
        self.account(account_id)
    }

    pub fn account(&self, account_id: &str) -> Account {
        self.accounts.get(account_id).unwrap().unwrap()
    }

    pub fn ledger_rows(&self, account_id: &str) -> Vec<AccountBalanceChange> {
        self.ledger
            .query(&BalanceChangeFilter::for_account(account_id))
            .unwrap()
    }

    /// Delivers one event to every handler. Returns the first handler error.
    pub async fn deliver_event(&self, event: &Event) -> Result<()> {
        self.observed_events.lock().unwrap().push(event.clone());
        let mut first_error: Option<Error> = None;
        for handler in &self.event_handlers {
            if let Err(e) = handler.handle_event(event).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Delivers one command to every handler and simulates trading core replies.
    pub async fn deliver_command(&self, command: &Command) -> Result<()> {
        self.observed_commands.lock().unwrap().push(command.clone());
        self.simulate_trading_core(command);
        let mut first_error: Option<Error> = None;
        for handler in &self.command_handlers {
            if let Err(e) = handler.handle_command(command).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Delivers the messages queued right now, commands first. Messages they
    /// produce stay queued for the next step.
    pub async fn step(&self) -> Vec<Error> {
        let commands = self.sink.take_commands();
        let events = self.sink.take_events();
        let mut errors = Vec::new();
        for command in &commands {
            if let Err(e) = self.deliver_command(command).await {
                errors.push(e);
            }
        }
        for event in &events {
            if let Err(e) = self.deliver_event(event).await {
                errors.push(e);
            }
        }
        errors
    }

    /// Delivers queued messages until the sink stays empty. Handler errors
    /// are collected, not retried.
    pub async fn pump(&self) -> Vec<Error> {
        let mut errors = Vec::new();
        for _ in 0..100 {
            if self.sink.is_empty() {
                break;
            }
            errors.extend(self.step().await);
        }
        errors
    }

    /// Publishes `event` and pumps, asserting that no handler failed.
    pub async fn run(&self, event: Event) {
        self.sink.publish_event(event);
        let errors = self.pump().await;
        assert!(errors.is_empty(), "handler errors: {:?}", errors);
    }

    pub fn events(&self) -> Vec<Event> {
        self.observed_events.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.observed_commands.lock().unwrap().clone()
    }

    pub fn events_named(&self, name: &str) -> Vec<Event> {
        self.events().into_iter().filter(|e| e.name() == name).collect()
    }

    pub fn commands_named(&self, name: &str) -> Vec<Command> {
        self.commands().into_iter().filter(|c| c.name() == name).collect()
    }

    fn simulate_trading_core(&self, command: &Command) {
        let policy = self.freeze_policy.lock().unwrap().clone();
        let now = Utc::now();
        let reply = match (command, policy) {
            (_, FreezePolicy::Silent) => None,
            (Command::FreezeAmountForDeposit(c), FreezePolicy::Approve) => {
                Some(Event::AmountForDepositFrozen(OperationStepCompleted {
                    operation_id: c.operation_id.clone(),
                    timestamp: now,
                }))
            }
            (Command::FreezeAmountForDeposit(c), FreezePolicy::Reject(reason)) => {
                Some(Event::AmountForDepositFreezeFailed(OperationFailed {
                    operation_id: c.operation_id.clone(),
                    timestamp: now,
                    reason,
                }))
            }
            (Command::FreezeAmountForWithdrawal(c), FreezePolicy::Approve) => {
                Some(Event::AmountForWithdrawalFrozen(OperationStepCompleted {
                    operation_id: c.operation_id.clone(),
                    timestamp: now,
                }))
            }
            (Command::FreezeAmountForWithdrawal(c), FreezePolicy::Reject(reason)) => {
                Some(Event::AmountForWithdrawalFreezeFailed(OperationFailed {
                    operation_id: c.operation_id.clone(),
                    timestamp: now,
                    reason,
                }))
            }
            (Command::UnfreezeMarginOnFailWithdrawal(c), _) => {
                Some(Event::UnfreezeMarginOnFailSucceeded(OperationStepCompleted {
                    operation_id: c.operation_id.clone(),
                    timestamp: now,
                }))
            }
            _ => None,
        };
        if let Some(event) = reply {
            self.sink.publish_event(event);
        }
    }
}
