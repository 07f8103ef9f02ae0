//! Keeps cached statistics in step with balance updates.

use std::sync::Arc;

use async_trait::async_trait;

use crate::accounts::AccountManagementServiceTrait;
use crate::errors::Result;
use crate::workflow::{AccountChangedEventType, Event, EventHandler};

pub struct StatisticsProjection {
    accounts: Arc<dyn AccountManagementServiceTrait>,
}

impl StatisticsProjection {
    pub fn new(accounts: Arc<dyn AccountManagementServiceTrait>) -> Self {
        Self { accounts }
    }
}

#[async_trait]
impl EventHandler for StatisticsProjection {
    fn name(&self) -> &'static str {
        "StatisticsProjection"
    }

    async fn handle_event(&self, event: &Event) -> Result<()> {
        if let Event::AccountChanged(e) = event {
            if e.event_type == AccountChangedEventType::BalanceUpdated {
                self.accounts.clear_stats_cache(&e.account.id);
            }
        }
        Ok(())
    }
}
