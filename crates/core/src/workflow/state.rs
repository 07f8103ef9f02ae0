//! Forward-only saga state machines.

use std::cmp::Ordering;
use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::workflow_errors::WorkflowError;

/// A saga state with a fixed rank. States only ever move to a higher rank.
pub trait OperationState:
    Copy + Eq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn rank(self) -> u8;

    fn is_terminal(self) -> bool;
}

/// Saga payload that carries its current state.
pub trait OperationData: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    type State: OperationState;

    fn state(&self) -> Self::State;

    fn set_state(&mut self, state: Self::State);

    /// True between persisting a new state and claiming its command.
    fn is_dispatch_pending(&self) -> bool;

    fn set_dispatch_pending(&mut self, pending: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<S> {
    Advanced(S),
    /// The checkpoint already moved past the expected state.
    Ignored,
}

/// Decides what an event expecting `expected` does to a checkpoint in `current`.
pub fn switch_state<S: OperationState>(
    current: S,
    expected: S,
    next: S,
) -> Result<Transition<S>, WorkflowError> {
    match current.rank().cmp(&expected.rank()) {
        Ordering::Less => Err(WorkflowError::StateNotYetReached {
            current: format!("{:?}", current),
            expected: format!("{:?}", expected),
            next: format!("{:?}", next),
        }),
        Ordering::Greater => Ok(Transition::Ignored),
        Ordering::Equal => Ok(Transition::Advanced(next)),
    }
}
