use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::accounts_model::{Account, AccountCapital, AccountUpdate, NewAccount};
use super::accounts_traits::{AccountManagementServiceTrait, AccountRepositoryTrait};
use crate::errors::{DatabaseError, Error, Result, ValidationError};
use crate::ledger::{BalanceChangeReasonType, LedgerRepositoryTrait};
use crate::settings::AccountManagementSettings;
use crate::statistics::{AccountStat, AccountStatsCache};
use crate::trading::{
    RealizedPnlProviderTrait, TradingCondition, TradingConditionsServiceTrait,
    TradingStatsProviderTrait,
};
use crate::utils::Clock;
use crate::workflow::{
    AccountChanged, AccountChangedEventType, BalanceCommandsService, ChargeManuallyRequest, Event,
    MessageSink,
};

const CREATE_ACCOUNT_SOURCE: &str = "CreateAccount";
const UPDATE_ACCOUNT_SOURCE: &str = "UpdateAccount";
const RESET_ACCOUNT_SOURCE: &str = "ResetAccount";

/// Returns the account when it exists and, unless `skip_delete_validation`
/// is set, has not been deleted.
pub fn ensure_account_valid(
    repository: &dyn AccountRepositoryTrait,
    account_id: &str,
    skip_delete_validation: bool,
) -> Result<Account> {
    let account = repository
        .get(account_id)?
        .ok_or_else(|| ValidationError::AccountNotFound(account_id.to_string()))?;
    if !skip_delete_validation && account.is_deleted {
        return Err(ValidationError::AccountDeleted(account.id).into());
    }
    Ok(account)
}

/// Service for opening, configuring and inspecting margin accounts.
pub struct AccountManagementService {
    repository: Arc<dyn AccountRepositoryTrait>,
    ledger: Arc<dyn LedgerRepositoryTrait>,
    trading_conditions: Arc<dyn TradingConditionsServiceTrait>,
    trading_stats: Arc<dyn TradingStatsProviderTrait>,
    realized_pnl: Arc<dyn RealizedPnlProviderTrait>,
    balance_commands: Arc<BalanceCommandsService>,
    sink: Arc<dyn MessageSink>,
    clock: Arc<dyn Clock>,
    settings: AccountManagementSettings,
    stats_cache: AccountStatsCache,
}

impl AccountManagementService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repository: Arc<dyn AccountRepositoryTrait>,
        ledger: Arc<dyn LedgerRepositoryTrait>,
        trading_conditions: Arc<dyn TradingConditionsServiceTrait>,
        trading_stats: Arc<dyn TradingStatsProviderTrait>,
        realized_pnl: Arc<dyn RealizedPnlProviderTrait>,
        balance_commands: Arc<BalanceCommandsService>,
        sink: Arc<dyn MessageSink>,
        clock: Arc<dyn Clock>,
        settings: AccountManagementSettings,
    ) -> Self {
        let stats_cache =
            AccountStatsCache::new(settings.cache.expiration_period(), clock.clone());
        Self {
            repository,
            ledger,
            trading_conditions,
            trading_stats,
            realized_pnl,
            balance_commands,
            sink,
            clock,
            settings,
            stats_cache,
        }
    }

    fn trading_condition(&self, trading_condition_id: &str) -> Result<TradingCondition> {
        self.trading_conditions
            .get_trading_condition(trading_condition_id)?
            .ok_or_else(|| ValidationError::UnknownTradingCondition(trading_condition_id.to_string()).into())
    }

    fn publish_changed(
        &self,
        source: &str,
        operation_id: String,
        account: &Account,
        event_type: AccountChangedEventType,
        previous_snapshot: Option<Account>,
    ) {
        self.sink.publish_event(Event::AccountChanged(AccountChanged {
            operation_id,
            timestamp: self.clock.now(),
            source: source.to_string(),
            account: account.clone(),
            event_type,
            balance_change: None,
            previous_snapshot,
        }));
    }

    fn charge(
        &self,
        account_id: &str,
        amount_delta: Decimal,
        reason_type: BalanceChangeReasonType,
        source: &str,
    ) -> Result<String> {
        self.balance_commands.charge_manually(ChargeManuallyRequest {
            operation_id: None,
            account_id: account_id.to_string(),
            amount_delta,
            reason_type,
            comment: Some(format!("{} API", source)),
            audit_log: None,
            source: source.to_string(),
            event_source_id: None,
            instrument: None,
            trading_date: Some(self.clock.today()),
            change_transfer_limit: false,
        })
    }

    async fn open_account(
        &self,
        client_id: &str,
        base_asset_id: &str,
        trading_condition: &TradingCondition,
        account_id: Option<String>,
        account_name: Option<String>,
    ) -> Result<Account> {
        let id = account_id.unwrap_or_else(|| {
            format!(
                "{}{}",
                self.settings.behavior.account_id_prefix,
                Uuid::new_v4().simple()
            )
        });

        let account = Account {
            id: id.clone(),
            client_id: client_id.to_string(),
            trading_condition_id: trading_condition.id.clone(),
            base_asset_id: base_asset_id.to_string(),
            balance: Decimal::ZERO,
            withdraw_transfer_limit: Decimal::ZERO,
            legal_entity: trading_condition.legal_entity.clone(),
            is_disabled: false,
            is_withdrawal_disabled: !self.settings.behavior.default_withdrawal_is_enabled,
            is_deleted: false,
            modification_timestamp: self.clock.now(),
            temporary_capital: Vec::new(),
            last_executed_operations: Vec::new(),
            account_name,
        };

        let account = match self.repository.add(account).await {
            Ok(account) => account,
            Err(Error::Database(DatabaseError::UniqueViolation(_))) => {
                return Err(ValidationError::DuplicateAccount {
                    client_id: client_id.to_string(),
                    account_id: id,
                }
                .into())
            }
            Err(e) => return Err(e),
        };

        self.publish_changed(
            CREATE_ACCOUNT_SOURCE,
            id.clone(),
            &account,
            AccountChangedEventType::Created,
            None,
        );

        if let Some(default_balance) = self.settings.behavior.default_balance {
            if !default_balance.is_zero() {
                self.charge(
                    &account.id,
                    default_balance,
                    BalanceChangeReasonType::Create,
                    CREATE_ACCOUNT_SOURCE,
                )?;
            }
        }

        info!(
            "{} account {} created for client {} on trading condition {}",
            base_asset_id, account.id, client_id, trading_condition.id
        );
        Ok(account)
    }

    fn validate_trading_condition(&self, account: &Account, trading_condition_id: &str) -> Result<()> {
        let trading_condition = self.trading_condition(trading_condition_id)?;
        if trading_condition.legal_entity != account.legal_entity {
            return Err(ValidationError::LegalEntityMismatch {
                account_id: account.id.clone(),
                account_legal_entity: account.legal_entity.clone(),
                trading_condition_id: trading_condition_id.to_string(),
                legal_entity: trading_condition.legal_entity,
            }
            .into());
        }
        Ok(())
    }

    async fn validate_no_open_positions(&self, account_id: &str) -> Result<()> {
        let stats = self.trading_stats.get_account_stats(account_id).await?;
        if stats.open_positions_count > 0 || stats.active_orders_count > 0 {
            return Err(Error::BusinessRule(format!(
                "Account {} has {} open positions and {} active orders",
                account_id, stats.open_positions_count, stats.active_orders_count
            )));
        }
        Ok(())
    }

    async fn total_realised_pnl(&self, account_id: &str) -> Result<Decimal> {
        let missing_days: Vec<NaiveDate> = self.realized_pnl.tax_file_missing_days().await?;
        if missing_days.len() > 1 {
            warn!(
                "Account {}: no tax file for {:?}, PnL of these days is excluded from the total",
                account_id, missing_days
            );
        }
        self.realized_pnl
            .total_profit_on_days(account_id, &missing_days)
            .await
    }

    async fn set_deleted(&self, account_id: &str, is_deleted: bool) -> Result<Account> {
        let previous = ensure_account_valid(self.repository.as_ref(), account_id, !is_deleted)?;
        if previous.is_deleted == is_deleted {
            return Ok(previous);
        }
        if is_deleted {
            self.validate_no_open_positions(account_id).await?;
        }

        let updated = self.repository.set_deleted(account_id, is_deleted).await?;
        self.publish_changed(
            UPDATE_ACCOUNT_SOURCE,
            Uuid::new_v4().simple().to_string(),
            &updated,
            AccountChangedEventType::Updated,
            Some(previous),
        );
        info!(
            "Account {} {}",
            account_id,
            if is_deleted { "deleted" } else { "restored" }
        );
        Ok(updated)
    }
}

#[async_trait]
impl AccountManagementServiceTrait for AccountManagementService {
    async fn create_account(&self, new_account: NewAccount) -> Result<Account> {
        new_account.validate()?;

        let trading_condition_id = if new_account.trading_condition_id.trim().is_empty() {
            self.trading_conditions
                .default_trading_condition_id()?
                .ok_or_else(|| ValidationError::UnknownTradingCondition("default".to_string()))?
        } else {
            new_account.trading_condition_id.clone()
        };
        let trading_condition = self.trading_condition(&trading_condition_id)?;

        if !trading_condition.has_base_asset(&new_account.base_asset_id) {
            return Err(ValidationError::BaseAssetNotConfigured {
                base_asset_id: new_account.base_asset_id,
                trading_condition_id,
            }
            .into());
        }

        if let Some(id) = &new_account.id {
            if self.repository.get(id)?.is_some() {
                return Err(ValidationError::DuplicateAccount {
                    client_id: new_account.client_id,
                    account_id: id.clone(),
                }
                .into());
            }
        }

        self.open_account(
            &new_account.client_id,
            &new_account.base_asset_id,
            &trading_condition,
            new_account.id,
            new_account.account_name,
        )
        .await
    }

    async fn create_default_accounts(
        &self,
        client_id: &str,
        trading_condition_id: &str,
    ) -> Result<Vec<Account>> {
        let existing = self.repository.list(Some(client_id), None, false)?;
        if !existing.is_empty() {
            return Ok(existing);
        }
        if trading_condition_id.trim().is_empty() {
            return Err(ValidationError::MissingField("tradingConditionId".to_string()).into());
        }

        let trading_condition = self.trading_condition(trading_condition_id)?;
        let mut created = Vec::new();
        for base_asset_id in &trading_condition.base_assets {
            match self
                .open_account(client_id, base_asset_id, &trading_condition, None, None)
                .await
            {
                Ok(account) => created.push(account),
                Err(e) => error!(
                    "Failed to create default {} account for client {}: {}",
                    base_asset_id, client_id, e
                ),
            }
        }

        info!(
            "{} default accounts created for client {}",
            created.len(),
            client_id
        );
        Ok(created)
    }

    async fn create_accounts_for_new_base_asset(
        &self,
        trading_condition_id: &str,
        base_asset_id: &str,
    ) -> Result<Vec<Account>> {
        let trading_condition = self.trading_condition(trading_condition_id)?;

        let mut by_client: BTreeMap<String, Vec<Account>> = BTreeMap::new();
        for account in self.repository.list(None, None, false)? {
            by_client
                .entry(account.client_id.clone())
                .or_default()
                .push(account);
        }

        let mut created = Vec::new();
        for (client_id, accounts) in by_client {
            let in_condition = accounts
                .iter()
                .any(|a| a.trading_condition_id == trading_condition_id);
            let has_asset = accounts.iter().any(|a| a.base_asset_id == base_asset_id);
            if !in_condition || has_asset {
                continue;
            }
            match self
                .open_account(&client_id, base_asset_id, &trading_condition, None, None)
                .await
            {
                Ok(account) => created.push(account),
                Err(e) => error!(
                    "Failed to create {} account for client {} on trading condition {}: {}",
                    base_asset_id, client_id, trading_condition_id, e
                ),
            }
        }

        info!(
            "{} accounts created for the new base asset {} in trading condition {}",
            created.len(),
            base_asset_id,
            trading_condition_id
        );
        Ok(created)
    }

    fn list_accounts(&self, search: Option<&str>, show_deleted: bool) -> Result<Vec<Account>> {
        self.repository.list(None, search, show_deleted)
    }

    fn get_by_client(&self, client_id: &str, show_deleted: bool) -> Result<Vec<Account>> {
        self.repository.list(Some(client_id), None, show_deleted)
    }

    fn get_by_id(&self, account_id: &str) -> Result<Option<Account>> {
        self.repository.get(account_id)
    }

    fn ensure_account_valid(&self, account_id: &str, skip_delete_validation: bool) -> Result<Account> {
        ensure_account_valid(self.repository.as_ref(), account_id, skip_delete_validation)
    }

    async fn update_account(&self, account_id: &str, update: AccountUpdate) -> Result<Account> {
        let previous = ensure_account_valid(self.repository.as_ref(), account_id, false)?;

        if let Some(trading_condition_id) = &update.trading_condition_id {
            self.validate_trading_condition(&previous, trading_condition_id)?;
        }
        if update.is_disabled == Some(true) {
            self.validate_no_open_positions(account_id).await?;
        }
        if update.is_empty() {
            return Ok(previous);
        }

        let updated = self.repository.update_account(account_id, update).await?;
        self.publish_changed(
            UPDATE_ACCOUNT_SOURCE,
            Uuid::new_v4().simple().to_string(),
            &updated,
            AccountChangedEventType::Updated,
            Some(previous),
        );
        debug!("Account {} updated", account_id);
        Ok(updated)
    }

    async fn set_trading_condition(
        &self,
        account_id: &str,
        trading_condition_id: &str,
    ) -> Result<Account> {
        self.update_account(
            account_id,
            AccountUpdate {
                trading_condition_id: Some(trading_condition_id.to_string()),
                ..Default::default()
            },
        )
        .await
    }

    async fn set_disabled(&self, account_id: &str, is_disabled: bool) -> Result<Account> {
        self.update_account(
            account_id,
            AccountUpdate {
                is_disabled: Some(is_disabled),
                ..Default::default()
            },
        )
        .await
    }

    async fn set_withdrawal_disabled(
        &self,
        account_id: &str,
        is_withdrawal_disabled: bool,
    ) -> Result<Account> {
        self.update_account(
            account_id,
            AccountUpdate {
                is_withdrawal_disabled: Some(is_withdrawal_disabled),
                ..Default::default()
            },
        )
        .await
    }

    async fn reset_account(&self, account_id: &str) -> Result<Account> {
        if !self.settings.behavior.balance_reset_is_enabled {
            return Err(Error::BusinessRule("Account reset is not supported".to_string()));
        }
        let previous = ensure_account_valid(self.repository.as_ref(), account_id, false)?;

        let target = self.settings.behavior.default_balance.unwrap_or(Decimal::ZERO);
        let delta = target - previous.balance;
        if !delta.is_zero() {
            self.charge(
                account_id,
                delta,
                BalanceChangeReasonType::Reset,
                RESET_ACCOUNT_SOURCE,
            )?;
        }

        let erased = self.repository.erase(account_id).await?;
        self.publish_changed(
            RESET_ACCOUNT_SOURCE,
            Uuid::new_v4().simple().to_string(),
            &erased,
            AccountChangedEventType::Updated,
            Some(previous),
        );
        self.clear_stats_cache(account_id);
        info!("Account {} reset to {}", account_id, target);
        Ok(erased)
    }

    async fn delete_account(&self, account_id: &str) -> Result<Account> {
        self.set_deleted(account_id, true).await
    }

    async fn restore_account(&self, account_id: &str) -> Result<Account> {
        self.set_deleted(account_id, false).await
    }

    async fn get_account_capital(&self, account: &Account) -> Result<AccountCapital> {
        let compensations = self
            .ledger
            .compensations_for_day(&account.id, self.clock.today())?;
        let total_realised_pnl = self.total_realised_pnl(&account.id).await?;
        let stats = self.trading_stats.get_account_stats(&account.id).await?;

        Ok(AccountCapital::new(
            account.balance,
            total_realised_pnl,
            stats.pnl,
            account.temporary_capital_total(),
            compensations,
            account.base_asset_id.clone(),
        ))
    }

    async fn get_cached_account_statistics(&self, account_id: &str) -> Result<Option<AccountStat>> {
        if account_id.trim().is_empty() {
            return Err(ValidationError::MissingField("accountId".to_string()).into());
        }
        if let Some(stat) = self.stats_cache.get(account_id) {
            return Ok(Some(stat));
        }

        let Some(account) = self.repository.get(account_id)? else {
            return Ok(None);
        };
        let history = self.ledger.query_for_day(account_id, self.clock.today())?;
        let capital = self.get_account_capital(&account).await?;

        let stat = AccountStat::from_history(&account, &history, &capital, self.clock.now());
        self.stats_cache.insert(stat.clone());
        Ok(Some(stat))
    }

    fn clear_stats_cache(&self, account_id: &str) {
        match self.stats_cache.invalidate(account_id) {
            Some(key) => info!("The account statistics cache has been wiped for key = {}", key),
            None => debug!("No cached statistics for account {}", account_id),
        }
    }
}
