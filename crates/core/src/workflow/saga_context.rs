//! Checkpoint bookkeeping shared by every saga.

use std::sync::Arc;

use log::{debug, info, warn};

use super::faults::FaultInjector;
use super::sink::MessageSink;
use super::state::{switch_state, OperationData, OperationState, Transition};
use super::workflow_errors::WorkflowError;
use crate::errors::{Error, Result};
use crate::operations::{OperationExecutionInfo, OperationExecutionStore};
use crate::utils::Clock;

/// Collaborators every saga needs.
#[derive(Clone)]
pub struct SagaContext {
    pub store: Arc<OperationExecutionStore>,
    pub sink: Arc<dyn MessageSink>,
    pub faults: Arc<dyn FaultInjector>,
    pub clock: Arc<dyn Clock>,
}

impl SagaContext {
    pub fn new(
        store: Arc<OperationExecutionStore>,
        sink: Arc<dyn MessageSink>,
        faults: Arc<dyn FaultInjector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            sink,
            faults,
            clock,
        }
    }

    pub(crate) fn load<T: OperationData>(
        &self,
        operation_name: &str,
        operation_id: &str,
    ) -> Result<OperationExecutionInfo<T>> {
        self.store
            .get::<T>(operation_name, operation_id)?
            .ok_or_else(|| {
                WorkflowError::OperationNotFound {
                    operation_name: operation_name.to_string(),
                    operation_id: operation_id.to_string(),
                }
                .into()
            })
    }

    /// Moves the checkpoint from `expected` to `next` and persists it.
    ///
    /// Returns the saved checkpoint when the caller should emit the next
    /// message, or `None` when the event is stale. `update` runs on the
    /// payload after the state switch and before the save.
    ///
    /// The new state is saved with its command marked pending, and the mark
    /// is cleared by a second compare-and-swap save before the caller sends.
    /// A fault between the two saves leaves the mark set, so a redelivered
    /// event finding the checkpoint already in `next` claims and sends it.
    /// Only the delivery whose claim wins gets `Some`.
    pub(crate) async fn advance<T, F>(
        &self,
        operation_name: &str,
        operation_id: &str,
        expected: T::State,
        next: T::State,
        update: F,
    ) -> Result<Option<OperationExecutionInfo<T>>>
    where
        T: OperationData,
        F: FnOnce(&mut T) + Send,
    {
        let mut info = self.load::<T>(operation_name, operation_id)?;
        let current = info.data.state();

        match switch_state(current, expected, next) {
            Ok(Transition::Advanced(state)) => {
                info.data.set_state(state);
                update(&mut info.data);
                info.data.set_dispatch_pending(true);
            }
            Ok(Transition::Ignored) if current == next && info.data.is_dispatch_pending() => {
                warn!(
                    "{} {}: checkpoint {:?} was saved but its command never went out, resending",
                    operation_name, operation_id, current
                );
                return self.claim(info).await;
            }
            Ok(Transition::Ignored) => {
                debug!(
                    "{} {}: ignoring stale event expecting {:?}, checkpoint is {:?}",
                    operation_name, operation_id, expected, current
                );
                return Ok(None);
            }
            Err(e) => {
                debug!("{} {}: {}", operation_name, operation_id, e);
                return Err(e.into());
            }
        }

        match self.store.save(&mut info).await {
            Ok(()) => {}
            Err(Error::ConcurrencyViolation {
                operation_name: name,
                operation_id: id,
            }) => {
                let reloaded = self.load::<T>(operation_name, operation_id)?;
                if reloaded.data.state().rank() > expected.rank() {
                    info!(
                        "{} {}: lost checkpoint race, now {:?}; event is stale",
                        operation_name,
                        operation_id,
                        reloaded.data.state()
                    );
                    return Ok(None);
                }
                warn!(
                    "{} {}: checkpoint changed concurrently but is still {:?}",
                    operation_name,
                    operation_id,
                    reloaded.data.state()
                );
                return Err(Error::ConcurrencyViolation {
                    operation_name: name,
                    operation_id: id,
                });
            }
            Err(e) => return Err(e),
        }

        info!(
            "{} {}: {:?} -> {:?}",
            operation_name,
            operation_id,
            current,
            info.data.state()
        );
        self.faults.checkpoint(operation_id)?;
        self.claim(info).await
    }

    /// Clears the pending mark. Losing the swap means another delivery either
    /// claimed the command or already moved the checkpoint on.
    async fn claim<T: OperationData>(
        &self,
        mut info: OperationExecutionInfo<T>,
    ) -> Result<Option<OperationExecutionInfo<T>>> {
        let state = info.data.state();
        info.data.set_dispatch_pending(false);
        match self.store.save(&mut info).await {
            Ok(()) => Ok(Some(info)),
            Err(Error::ConcurrencyViolation { .. }) => {
                debug!(
                    "{} {}: command for {:?} claimed by another delivery",
                    info.operation_name, info.id, state
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
