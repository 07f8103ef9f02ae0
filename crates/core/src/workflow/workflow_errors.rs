use thiserror::Error;

/// Saga ordering and checkpoint errors.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// The event assumes a step the checkpoint has not completed yet.
    #[error("Checkpoint is in state {current}, waiting for {expected} before switching to {next}")]
    StateNotYetReached {
        current: String,
        expected: String,
        next: String,
    },

    #[error("Operation {operation_name}:{operation_id} not found")]
    OperationNotFound {
        operation_name: String,
        operation_id: String,
    },

    #[error("Payload of operation {operation_name}:{operation_id} could not be encoded: {reason}")]
    PayloadEncoding {
        operation_name: String,
        operation_id: String,
        reason: String,
    },
}

impl WorkflowError {
    /// Ordering errors clear up once the earlier message has been processed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::StateNotYetReached { .. } | WorkflowError::OperationNotFound { .. }
        )
    }
}
