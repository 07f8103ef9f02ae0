use std::sync::Arc;

use margin_accounts_core::accounts::{AccountManagementService, AccountRepositoryTrait};
use margin_accounts_core::ledger::LedgerRepositoryTrait;
use margin_accounts_core::operations::OperationExecutionStore;
use margin_accounts_core::statistics::StatisticsProjection;
use margin_accounts_core::trading::{
    StaticTradingConditionsService, StaticTradingStatsProvider, TradingCondition,
};
use margin_accounts_core::utils::{Clock, SystemClock};
use margin_accounts_core::workflow::{
    BalanceCommandsHandler, BalanceCommandsService, DepositSaga, FaultInjector,
    GiveTemporaryCapitalSaga, MessageSink, NegativeProtectionSaga, NegativeProtectionService,
    NoFaults, OperationCommandsHandler, RandomFaults, RevokeTemporaryCapitalSaga, SagaContext,
    TemporaryCapitalCommandsHandler, WithdrawalSaga,
};
use margin_accounts_storage_sqlite::{
    db, AccountRepository, LedgerRepository, OperationExecutionRepository,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::dispatcher::{self, Delivery, Dispatcher, RedeliveryPolicy};
use crate::trading_core::TradingCoreSimulator;

/// Installs the global subscriber. `log` records from the library crates are
/// bridged in through `tracing-log`.
pub fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

/// Entry points other components call into.
#[derive(Clone)]
pub struct Services {
    pub accounts: Arc<dyn AccountRepositoryTrait>,
    pub ledger: Arc<dyn LedgerRepositoryTrait>,
    pub service: Arc<AccountManagementService>,
    pub balance_commands: Arc<BalanceCommandsService>,
}

pub struct Worker {
    services: Services,
    dispatcher: Dispatcher,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Worker {
    /// Starts consuming messages. Abort the handle to stop.
    pub fn start(self) -> (Services, JoinHandle<()>) {
        let handle = self.dispatcher.spawn(self.rx);
        (self.services, handle)
    }
}

pub async fn build_worker(config: &Config) -> anyhow::Result<Worker> {
    let (pool, writer) = db::open(&config.db_path)?;
    tracing::info!("Database path in use: {}", config.db_path);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (channel_sink, rx) = dispatcher::channel();
    let sink: Arc<dyn MessageSink> = Arc::new(channel_sink.clone());

    let accounts: Arc<dyn AccountRepositoryTrait> = Arc::new(AccountRepository::new(
        pool.clone(),
        writer.clone(),
        clock.clone(),
    ));
    let ledger: Arc<dyn LedgerRepositoryTrait> =
        Arc::new(LedgerRepository::new(pool.clone(), writer.clone()));
    let store = Arc::new(OperationExecutionStore::new(
        Arc::new(OperationExecutionRepository::new(pool, writer)),
        clock.clone(),
    ));

    let conditions = Arc::new(StaticTradingConditionsService::new(vec![TradingCondition {
        id: config.trading_condition.clone(),
        name: config.trading_condition.clone(),
        legal_entity: config.legal_entity.clone(),
        base_assets: config.base_assets.clone(),
        is_default: true,
    }]));
    let trading_stats = Arc::new(StaticTradingStatsProvider::new());

    let faults: Arc<dyn FaultInjector> = if config.chaos_probability > 0.0 {
        tracing::warn!(
            "Chaos mode on: saga checkpoints fail with probability {}",
            config.chaos_probability
        );
        Arc::new(RandomFaults::new(config.chaos_probability))
    } else {
        Arc::new(NoFaults)
    };

    let balance_commands = Arc::new(BalanceCommandsService::new(
        accounts.clone(),
        sink.clone(),
        clock.clone(),
    ));
    let service = Arc::new(AccountManagementService::new(
        accounts.clone(),
        ledger.clone(),
        conditions,
        trading_stats.clone(),
        trading_stats.clone(),
        balance_commands.clone(),
        sink.clone(),
        clock.clone(),
        config.settings.clone(),
    ));

    let ctx = SagaContext::new(store.clone(), sink.clone(), faults, clock.clone());
    let dispatcher = Dispatcher::new(
        channel_sink,
        RedeliveryPolicy {
            max_attempts: config.max_delivery_attempts,
            delay: config.redelivery_delay,
        },
    )
    .with_event_handler(Arc::new(DepositSaga::new(ctx.clone())))
    .with_event_handler(Arc::new(WithdrawalSaga::new(ctx.clone())))
    .with_event_handler(Arc::new(GiveTemporaryCapitalSaga::new(ctx.clone())))
    .with_event_handler(Arc::new(RevokeTemporaryCapitalSaga::new(ctx)))
    .with_event_handler(Arc::new(NegativeProtectionSaga::new(
        Arc::new(NegativeProtectionService::new(store, ledger.clone())),
        accounts.clone(),
        trading_stats,
        sink.clone(),
        clock.clone(),
        config.settings.negative_protection.clone(),
    )))
    .with_event_handler(Arc::new(StatisticsProjection::new(service.clone())))
    .with_command_handler(Arc::new(BalanceCommandsHandler::new(
        accounts.clone(),
        ledger.clone(),
        sink.clone(),
        clock.clone(),
    )))
    .with_command_handler(Arc::new(TemporaryCapitalCommandsHandler::new(
        accounts.clone(),
        sink.clone(),
        clock.clone(),
    )))
    .with_command_handler(Arc::new(OperationCommandsHandler::new(
        sink.clone(),
        clock.clone(),
    )))
    .with_command_handler(Arc::new(TradingCoreSimulator::new(sink, clock)));

    Ok(Worker {
        services: Services {
            accounts,
            ledger,
            service,
            balance_commands,
        },
        dispatcher,
        rx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use margin_accounts_core::accounts::{AccountManagementServiceTrait, NewAccount};
    use margin_accounts_core::ledger::{BalanceChangeFilter, BalanceChangeReasonType};
    use margin_accounts_core::workflow::BalanceOperationRequest;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::time::Duration;

    fn test_config(db_path: &str) -> Config {
        let vars: HashMap<&str, String> = HashMap::from([
            ("ACCOUNTS_DB_PATH", db_path.to_string()),
            ("ACCOUNTS_NEGATIVE_PROTECTION_DELAY_MS", "0".to_string()),
            ("ACCOUNTS_REDELIVERY_DELAY_MS", "5".to_string()),
        ]);
        Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    async fn wait_for_balance(services: &Services, account_id: &str, expected: Decimal) {
        for _ in 0..200 {
            let account = services.accounts.get(account_id).unwrap().unwrap();
            if account.balance == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("balance of {} never reached {}", account_id, expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deposit_and_withdrawal_over_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.db");
        let config = test_config(path.to_str().unwrap());

        let (services, handle) = build_worker(&config).await.unwrap().start();
        services
            .service
            .create_account(NewAccount {
                id: Some("A".to_string()),
                client_id: "client-1".to_string(),
                trading_condition_id: config.trading_condition.clone(),
                base_asset_id: "EUR".to_string(),
                account_name: None,
            })
            .await
            .unwrap();

        services
            .balance_commands
            .start_deposit(BalanceOperationRequest {
                operation_id: Some("dep-1".to_string()),
                account_id: "A".to_string(),
                amount: dec!(100),
                comment: None,
                audit_log: None,
            })
            .unwrap();
        wait_for_balance(&services, "A", dec!(100)).await;

        services
            .balance_commands
            .start_withdrawal(BalanceOperationRequest {
                operation_id: Some("wd-1".to_string()),
                account_id: "A".to_string(),
                amount: dec!(40),
                comment: None,
                audit_log: None,
            })
            .unwrap();
        wait_for_balance(&services, "A", dec!(60)).await;

        let rows = services
            .ledger
            .query(&BalanceChangeFilter::for_account("A"))
            .unwrap();
        let reasons: Vec<BalanceChangeReasonType> = rows.iter().map(|r| r.reason_type).collect();
        assert_eq!(
            reasons,
            vec![BalanceChangeReasonType::Deposit, BalanceChangeReasonType::Withdraw]
        );
        handle.abort();
    }
}
