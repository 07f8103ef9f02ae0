//! DashMap-backed checkpoint repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::operations_model::StoredOperation;
use super::operations_traits::OperationExecutionRepositoryTrait;
use crate::errors::{DatabaseError, Result};

/// Partitioned key-value checkpoint storage keyed by `(operation_name, id)`.
#[derive(Default)]
pub struct InMemoryOperationExecutionRepository {
    rows: DashMap<(String, String), StoredOperation>,
}

impl InMemoryOperationExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(operation_name: &str, id: &str) -> (String, String) {
        (operation_name.to_string(), id.to_string())
    }
}

#[async_trait]
impl OperationExecutionRepositoryTrait for InMemoryOperationExecutionRepository {
    fn get(&self, operation_name: &str, id: &str) -> Result<Option<StoredOperation>> {
        Ok(self
            .rows
            .get(&Self::key(operation_name, id))
            .map(|entry| entry.value().clone()))
    }

    async fn insert(&self, operation: StoredOperation) -> Result<()> {
        match self
            .rows
            .entry(Self::key(&operation.operation_name, &operation.id))
        {
            Entry::Occupied(_) => Err(DatabaseError::UniqueViolation(format!(
                "operation_execution_info ({}, {})",
                operation.operation_name, operation.id
            ))
            .into()),
            Entry::Vacant(vacant) => {
                vacant.insert(operation);
                Ok(())
            }
        }
    }

    async fn update_if_unmodified(
        &self,
        operation: StoredOperation,
        expected_last_modified: DateTime<Utc>,
    ) -> Result<bool> {
        let key = Self::key(&operation.operation_name, &operation.id);
        match self.rows.get_mut(&key) {
            Some(mut current) if current.last_modified == expected_last_modified => {
                *current = operation;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, operation_name: &str, id: &str) -> Result<usize> {
        Ok(self
            .rows
            .remove(&Self::key(operation_name, id))
            .map_or(0, |_| 1))
    }
}
