//! Same-day account statistics and their cache.

mod projection;
mod stats_cache;
mod statistics_model;

pub use projection::StatisticsProjection;
pub use stats_cache::{stats_cache_key, AccountStatsCache};
pub use statistics_model::AccountStat;
