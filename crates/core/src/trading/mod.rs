//! Collaborators owned by the trading platform: trading conditions, live
//! position statistics and realised PnL figures.

mod static_provider;
mod trading_model;
mod trading_traits;

pub use static_provider::{StaticTradingConditionsService, StaticTradingStatsProvider};
pub use trading_model::{AccountTradingStats, TradingCondition};
pub use trading_traits::{
    RealizedPnlProviderTrait, TradingConditionsServiceTrait, TradingStatsProviderTrait,
};
