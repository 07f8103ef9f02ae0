//! Handler traits the transport dispatches messages to.

use async_trait::async_trait;

use super::messages::{Command, Event};
use crate::errors::Result;

/// Receives every published event; ignores the ones it has no interest in.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle_event(&self, event: &Event) -> Result<()>;
}

/// Receives every sent command; ignores the ones it has no interest in.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle_command(&self, command: &Command) -> Result<()>;
}
