//! Account management configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Default prefix prepended to generated account ids.
pub const DEFAULT_ACCOUNT_ID_PREFIX: &str = "";

/// Default pause between a liquidation and the negative balance check.
pub const DEFAULT_NEGATIVE_PROTECTION_DELAY_MS: u64 = 2_000;

/// Default lifetime of cached per-day account statistics.
pub const DEFAULT_STATS_CACHE_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountManagementSettings {
    pub behavior: BehaviorSettings,
    pub negative_protection: NegativeProtectionSettings,
    pub cache: CacheSettings,
}

impl AccountManagementSettings {
    pub fn validate(&self) -> Result<()> {
        if let Some(balance) = self.behavior.default_balance {
            if balance.is_sign_negative() {
                return Err(Error::InvalidConfigValue(format!(
                    "defaultBalance must not be negative, got {}",
                    balance
                )));
            }
        }
        if self
            .behavior
            .account_id_prefix
            .chars()
            .any(char::is_whitespace)
        {
            return Err(Error::InvalidConfigValue(
                "accountIdPrefix must not contain whitespace".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BehaviorSettings {
    pub balance_reset_is_enabled: bool,
    pub default_balance: Option<Decimal>,
    pub account_id_prefix: String,
    pub default_withdrawal_is_enabled: bool,
}

impl Default for BehaviorSettings {
    fn default() -> Self {
        Self {
            balance_reset_is_enabled: false,
            default_balance: None,
            account_id_prefix: DEFAULT_ACCOUNT_ID_PREFIX.to_string(),
            default_withdrawal_is_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NegativeProtectionSettings {
    /// How long to wait after a liquidation before re-reading the account.
    pub delay_ms: u64,
    /// Also credit the deficit back with a `Compensation` balance change.
    pub auto_compensation: bool,
}

impl Default for NegativeProtectionSettings {
    fn default() -> Self {
        Self {
            delay_ms: DEFAULT_NEGATIVE_PROTECTION_DELAY_MS,
            auto_compensation: false,
        }
    }
}

impl NegativeProtectionSettings {
    pub fn delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    pub expiration_period_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            expiration_period_secs: DEFAULT_STATS_CACHE_TTL_SECS,
        }
    }
}

impl CacheSettings {
    pub fn expiration_period(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.expiration_period_secs).unwrap_or(i64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_are_valid() {
        let settings = AccountManagementSettings::default();
        assert!(settings.validate().is_ok());
        assert!(settings.behavior.default_withdrawal_is_enabled);
        assert!(!settings.behavior.balance_reset_is_enabled);
        assert_eq!(settings.cache.expiration_period_secs, DEFAULT_STATS_CACHE_TTL_SECS);
    }

    #[test]
    fn negative_default_balance_is_rejected() {
        let mut settings = AccountManagementSettings::default();
        settings.behavior.default_balance = Some(dec!(-1));
        assert!(matches!(
            settings.validate(),
            Err(Error::InvalidConfigValue(_))
        ));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let settings: AccountManagementSettings = serde_json::from_str(
            r#"{"behavior":{"balanceResetIsEnabled":true,"defaultBalance":"1000"}}"#,
        )
        .unwrap();
        assert!(settings.behavior.balance_reset_is_enabled);
        assert_eq!(settings.behavior.default_balance, Some(dec!(1000)));
        assert!(settings.behavior.default_withdrawal_is_enabled);
        assert_eq!(
            settings.negative_protection.delay_ms,
            DEFAULT_NEGATIVE_PROTECTION_DELAY_MS
        );
    }
}
