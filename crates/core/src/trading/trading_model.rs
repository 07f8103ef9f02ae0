use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingCondition {
    pub id: String,
    pub name: String,
    pub legal_entity: String,
    pub base_assets: Vec<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl TradingCondition {
    pub fn has_base_asset(&self, asset_id: &str) -> bool {
        self.base_assets.iter().any(|a| a == asset_id)
    }
}

/// Live figures for one account as reported by the trading core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountTradingStats {
    pub open_positions_count: u32,
    pub active_orders_count: u32,
    pub pnl: Decimal,
}
