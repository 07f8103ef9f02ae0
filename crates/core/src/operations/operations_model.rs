//! Operation execution checkpoint models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A saga instance checkpoint with a typed payload.
///
/// `last_modified` is the optimistic concurrency token; it changes on every
/// successful save and must match on the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationExecutionInfo<T> {
    pub operation_name: String,
    pub id: String,
    pub data: T,
    pub last_modified: DateTime<Utc>,
}

impl<T> OperationExecutionInfo<T> {
    pub fn new(
        operation_name: impl Into<String>,
        id: impl Into<String>,
        data: T,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            operation_name: operation_name.into(),
            id: id.into(),
            data,
            last_modified,
        }
    }
}

/// Storage form of a checkpoint; `data` is the serialized payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOperation {
    pub operation_name: String,
    pub id: String,
    pub data: String,
    pub last_modified: DateTime<Utc>,
}
