//! Worker configuration read from the environment.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use margin_accounts_core::settings::AccountManagementSettings;
use rust_decimal::Decimal;

const DEFAULT_DB_PATH: &str = "./data/accounts.db";
const DEFAULT_MAX_DELIVERY_ATTEMPTS: u32 = 10;
const DEFAULT_REDELIVERY_DELAY_MS: u64 = 500;
const DEFAULT_TRADING_CONDITION: &str = "default";
const DEFAULT_LEGAL_ENTITY: &str = "default";
const DEFAULT_BASE_ASSETS: &str = "EUR,USD";

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub log_format: String,
    pub settings: AccountManagementSettings,
    /// Probability of an injected fault at each saga checkpoint. Zero disables.
    pub chaos_probability: f64,
    pub max_delivery_attempts: u32,
    pub redelivery_delay: Duration,
    pub trading_condition: String,
    pub legal_entity: String,
    pub base_assets: Vec<String>,
}

impl Config {
    /// Loads `.env` if present, then reads `ACCOUNTS_*` variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = AccountManagementSettings::default();
        if let Some(v) = parse(&get, "ACCOUNTS_RESET_ENABLED")? {
            settings.behavior.balance_reset_is_enabled = v;
        }
        settings.behavior.default_balance = parse::<Decimal, _>(&get, "ACCOUNTS_DEFAULT_BALANCE")?;
        if let Some(prefix) = get("ACCOUNTS_ID_PREFIX") {
            settings.behavior.account_id_prefix = prefix;
        }
        if let Some(v) = parse(&get, "ACCOUNTS_WITHDRAWAL_ENABLED")? {
            settings.behavior.default_withdrawal_is_enabled = v;
        }
        if let Some(v) = parse(&get, "ACCOUNTS_NEGATIVE_PROTECTION_DELAY_MS")? {
            settings.negative_protection.delay_ms = v;
        }
        if let Some(v) = parse(&get, "ACCOUNTS_AUTO_COMPENSATION")? {
            settings.negative_protection.auto_compensation = v;
        }
        if let Some(v) = parse(&get, "ACCOUNTS_STATS_CACHE_TTL_SECS")? {
            settings.cache.expiration_period_secs = v;
        }
        settings
            .validate()
            .context("invalid account management settings")?;

        let chaos_probability: f64 = parse(&get, "ACCOUNTS_CHAOS_PROBABILITY")?.unwrap_or(0.0);
        if !(0.0..=1.0).contains(&chaos_probability) {
            return Err(anyhow!(
                "ACCOUNTS_CHAOS_PROBABILITY must be within [0, 1], got {}",
                chaos_probability
            ));
        }

        let max_delivery_attempts = parse(&get, "ACCOUNTS_MAX_DELIVERY_ATTEMPTS")?
            .unwrap_or(DEFAULT_MAX_DELIVERY_ATTEMPTS)
            .max(1);
        let redelivery_delay = Duration::from_millis(
            parse(&get, "ACCOUNTS_REDELIVERY_DELAY_MS")?.unwrap_or(DEFAULT_REDELIVERY_DELAY_MS),
        );

        let base_assets: Vec<String> = get("ACCOUNTS_BASE_ASSETS")
            .unwrap_or_else(|| DEFAULT_BASE_ASSETS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if base_assets.is_empty() {
            return Err(anyhow!("ACCOUNTS_BASE_ASSETS lists no assets"));
        }

        Ok(Self {
            db_path: get("ACCOUNTS_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            log_format: get("ACCOUNTS_LOG_FORMAT").unwrap_or_else(|| "text".to_string()),
            settings,
            chaos_probability,
            max_delivery_attempts,
            redelivery_delay,
            trading_condition: get("ACCOUNTS_TRADING_CONDITION")
                .unwrap_or_else(|| DEFAULT_TRADING_CONDITION.to_string()),
            legal_entity: get("ACCOUNTS_LEGAL_ENTITY")
                .unwrap_or_else(|| DEFAULT_LEGAL_ENTITY.to_string()),
            base_assets,
        })
    }
}

fn parse<T, F>(get: &F, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("{} has invalid value '{}': {}", key, raw, e)),
    }
}
