//! Message sink trait and implementations.

use std::sync::{Arc, Mutex};

use super::messages::{Command, Event};

/// Outbound side of the message bus.
///
/// Handlers and sagas hand every command and event to this trait and never
/// talk to a transport directly.
///
/// # Design Rules
///
/// - Sending must not block on the receiver
/// - Delivery is at-least-once; receivers deduplicate by operation id
pub trait MessageSink: Send + Sync {
    fn send_command(&self, command: Command);

    fn publish_event(&self, event: Event);
}

/// No-op implementation for contexts that don't need messages.
#[derive(Clone, Default)]
pub struct NoOpMessageSink;

impl MessageSink for NoOpMessageSink {
    fn send_command(&self, _command: Command) {}

    fn publish_event(&self, _event: Event) {}
}

/// Mock sink for testing - records sent commands and published events.
#[derive(Clone, Default)]
pub struct MockMessageSink {
    commands: Arc<Mutex<Vec<Command>>>,
    events: Arc<Mutex<Vec<Event>>>,
}

impl MockMessageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Drains recorded commands.
    pub fn take_commands(&self) -> Vec<Command> {
        std::mem::take(&mut *self.commands.lock().unwrap())
    }

    /// Drains recorded events.
    pub fn take_events(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    pub fn clear(&self) {
        self.commands.lock().unwrap().clear();
        self.events.lock().unwrap().clear();
    }

    /// Total number of recorded messages.
    pub fn len(&self) -> usize {
        self.commands.lock().unwrap().len() + self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageSink for MockMessageSink {
    fn send_command(&self, command: Command) {
        self.commands.lock().unwrap().push(command);
    }

    fn publish_event(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}
