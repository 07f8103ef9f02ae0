//! Checkpoint repository trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::operations_model::StoredOperation;
use crate::errors::Result;

/// Raw checkpoint storage keyed by `(operation_name, id)`.
///
/// Backends only provide the primitives; the typed get-or-add and
/// compare-and-swap protocol lives in `OperationExecutionStore`.
#[async_trait]
pub trait OperationExecutionRepositoryTrait: Send + Sync {
    fn get(&self, operation_name: &str, id: &str) -> Result<Option<StoredOperation>>;

    /// Inserts a new checkpoint. Fails with `DatabaseError::UniqueViolation`
    /// when the key already exists.
    async fn insert(&self, operation: StoredOperation) -> Result<()>;

    /// Replaces payload and token when the stored token equals `expected_last_modified`.
    ///
    /// Returns `false` when nothing was updated (token mismatch or missing row).
    async fn update_if_unmodified(
        &self,
        operation: StoredOperation,
        expected_last_modified: DateTime<Utc>,
    ) -> Result<bool>;

    /// Returns the number of deleted rows.
    async fn delete(&self, operation_name: &str, id: &str) -> Result<usize>;
}
