//! In-process message bus.
//!
//! Commands and events handed to [`ChannelMessageSink`] go through an
//! unbounded mpsc channel. The [`Dispatcher`] fans every message out to all
//! registered handlers, each delivery on its own task. A handler that fails
//! with a retryable error gets the same message again, alone, after
//! `redelivery_delay`, until `max_attempts` is reached.

use std::sync::Arc;
use std::time::Duration;

use margin_accounts_core::workflow::{Command, CommandHandler, Event, EventHandler, MessageSink};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub enum Message {
    Command(Command),
    Event(Event),
}

impl Message {
    fn name(&self) -> &'static str {
        match self {
            Message::Command(c) => c.name(),
            Message::Event(e) => e.name(),
        }
    }

    fn operation_id(&self) -> &str {
        match self {
            Message::Command(c) => c.operation_id(),
            Message::Event(e) => e.operation_id(),
        }
    }
}

/// One message on the channel. `target` is set on redeliveries and names the
/// index of the single handler that failed.
#[derive(Debug)]
pub struct Delivery {
    message: Message,
    target: Option<usize>,
    attempt: u32,
}

impl Delivery {
    fn first(message: Message) -> Self {
        Self {
            message,
            target: None,
            attempt: 1,
        }
    }
}

#[derive(Clone)]
pub struct ChannelMessageSink {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl ChannelMessageSink {
    fn enqueue(&self, delivery: Delivery) {
        if self.tx.send(delivery).is_err() {
            tracing::warn!("Dispatcher stopped, message dropped");
        }
    }
}

impl MessageSink for ChannelMessageSink {
    fn send_command(&self, command: Command) {
        self.enqueue(Delivery::first(Message::Command(command)));
    }

    fn publish_event(&self, event: Event) {
        self.enqueue(Delivery::first(Message::Event(event)));
    }
}

pub fn channel() -> (ChannelMessageSink, mpsc::UnboundedReceiver<Delivery>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelMessageSink { tx }, rx)
}

#[derive(Debug, Clone, Copy)]
pub struct RedeliveryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

pub struct Dispatcher {
    sink: ChannelMessageSink,
    event_handlers: Vec<Arc<dyn EventHandler>>,
    command_handlers: Vec<Arc<dyn CommandHandler>>,
    policy: RedeliveryPolicy,
}

impl Dispatcher {
    pub fn new(sink: ChannelMessageSink, policy: RedeliveryPolicy) -> Self {
        Self {
            sink,
            event_handlers: Vec::new(),
            command_handlers: Vec::new(),
            policy,
        }
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handlers.push(handler);
        self
    }

    pub fn with_command_handler(mut self, handler: Arc<dyn CommandHandler>) -> Self {
        self.command_handlers.push(handler);
        self
    }

    /// Consumes the channel until every sender is gone.
    pub fn spawn(self, mut rx: mpsc::UnboundedReceiver<Delivery>) -> JoinHandle<()> {
        let dispatcher = Arc::new(self);
        tokio::spawn(async move {
            tracing::info!(
                "Dispatcher started with {} event and {} command handler(s)",
                dispatcher.event_handlers.len(),
                dispatcher.command_handlers.len()
            );
            while let Some(delivery) = rx.recv().await {
                dispatcher.dispatch(delivery);
            }
            tracing::info!("Dispatcher shutting down");
        })
    }

    fn dispatch(self: &Arc<Self>, delivery: Delivery) {
        let count = match &delivery.message {
            Message::Command(_) => self.command_handlers.len(),
            Message::Event(_) => self.event_handlers.len(),
        };
        let targets: Vec<usize> = match delivery.target {
            Some(index) => vec![index],
            None => (0..count).collect(),
        };
        for index in targets {
            let this = Arc::clone(self);
            let message = delivery.message.clone();
            let attempt = delivery.attempt;
            tokio::spawn(async move { this.deliver(index, message, attempt).await });
        }
    }

    async fn deliver(&self, index: usize, message: Message, attempt: u32) {
        let (handler_name, result) = match &message {
            Message::Command(command) => match self.command_handlers.get(index) {
                Some(h) => (h.name(), h.handle_command(command).await),
                None => return,
            },
            Message::Event(event) => match self.event_handlers.get(index) {
                Some(h) => (h.name(), h.handle_event(event).await),
                None => return,
            },
        };

        let Err(err) = result else {
            return;
        };

        if !err.is_retryable() {
            tracing::error!(
                "{} rejected {} for operation {}: {}",
                handler_name,
                message.name(),
                message.operation_id(),
                err
            );
            return;
        }
        if attempt >= self.policy.max_attempts {
            tracing::error!(
                "{} gave up on {} for operation {} after {} attempt(s): {}",
                handler_name,
                message.name(),
                message.operation_id(),
                attempt,
                err
            );
            return;
        }

        tracing::warn!(
            "{} failed {} for operation {} (attempt {}), redelivering: {}",
            handler_name,
            message.name(),
            message.operation_id(),
            attempt,
            err
        );
        let sink = self.sink.clone();
        let delay = self.policy.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            sink.enqueue(Delivery {
                message,
                target: Some(index),
                attempt: attempt + 1,
            });
        });
    }
}
