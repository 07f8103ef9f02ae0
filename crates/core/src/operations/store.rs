//! Typed checkpoint store with get-or-add and compare-and-swap saves.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::operations_model::{OperationExecutionInfo, StoredOperation};
use super::operations_traits::OperationExecutionRepositoryTrait;
use crate::errors::{DatabaseError, Error, Result};
use crate::utils::time_utils::truncate_to_micros;
use crate::utils::Clock;
use crate::workflow::WorkflowError;

/// Serializes saga payloads into a raw repository and enforces the
/// optimistic concurrency protocol on top of it.
pub struct OperationExecutionStore {
    repository: Arc<dyn OperationExecutionRepositoryTrait>,
    clock: Arc<dyn Clock>,
}

impl OperationExecutionStore {
    pub fn new(repository: Arc<dyn OperationExecutionRepositoryTrait>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Returns the existing checkpoint, or persists the one built by `factory`.
    ///
    /// The flag is `true` only for the caller whose insert created the row.
    /// Concurrent callers with the same key all end up with the same
    /// checkpoint: a duplicate insert falls back to reading the winner's row.
    pub async fn get_or_add<T, F>(
        &self,
        operation_name: &str,
        id: &str,
        factory: F,
    ) -> Result<(OperationExecutionInfo<T>, bool)>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> T + Send,
    {
        if let Some(existing) = self.get::<T>(operation_name, id)? {
            return Ok((existing, false));
        }

        let info = OperationExecutionInfo::new(
            operation_name,
            id,
            factory(),
            truncate_to_micros(self.clock.now()),
        );
        let stored = encode(&info)?;

        match self.repository.insert(stored).await {
            Ok(()) => {
                debug!("Created checkpoint {}:{}", operation_name, id);
                Ok((info, true))
            }
            Err(Error::Database(DatabaseError::UniqueViolation(_))) => {
                debug!(
                    "Checkpoint {}:{} was created concurrently, reading it back",
                    operation_name, id
                );
                let existing = self
                    .get::<T>(operation_name, id)?
                    .ok_or_else(|| WorkflowError::OperationNotFound {
                        operation_name: operation_name.to_string(),
                        operation_id: id.to_string(),
                    })?;
                Ok((existing, false))
            }
            Err(e) => {
                error!("Failed to create checkpoint {}:{}: {}", operation_name, id, e);
                Err(e)
            }
        }
    }

    pub fn get<T>(&self, operation_name: &str, id: &str) -> Result<Option<OperationExecutionInfo<T>>>
    where
        T: DeserializeOwned,
    {
        self.repository
            .get(operation_name, id)?
            .map(decode)
            .transpose()
    }

    /// Persists `info` if nobody saved the checkpoint since it was read.
    ///
    /// On success `info.last_modified` holds the new token. A token mismatch
    /// yields `Error::ConcurrencyViolation`; a missing row yields
    /// `WorkflowError::OperationNotFound`.
    pub async fn save<T>(&self, info: &mut OperationExecutionInfo<T>) -> Result<()>
    where
        T: Serialize + Send + Sync,
    {
        let next_token = next_token(info.last_modified, self.clock.now());
        let stored = StoredOperation {
            operation_name: info.operation_name.clone(),
            id: info.id.clone(),
            data: serialize_payload(info)?,
            last_modified: next_token,
        };

        if self
            .repository
            .update_if_unmodified(stored, info.last_modified)
            .await?
        {
            info.last_modified = next_token;
            return Ok(());
        }

        if self.repository.get(&info.operation_name, &info.id)?.is_none() {
            return Err(WorkflowError::OperationNotFound {
                operation_name: info.operation_name.clone(),
                operation_id: info.id.clone(),
            }
            .into());
        }

        warn!(
            "Concurrency violation saving checkpoint {}:{}",
            info.operation_name, info.id
        );
        Err(Error::ConcurrencyViolation {
            operation_name: info.operation_name.clone(),
            operation_id: info.id.clone(),
        })
    }

    pub async fn delete<T: Sync>(&self, info: &OperationExecutionInfo<T>) -> Result<()> {
        let deleted = self.repository.delete(&info.operation_name, &info.id).await?;
        debug!(
            "Deleted checkpoint {}:{} ({} rows)",
            info.operation_name, info.id, deleted
        );
        Ok(())
    }
}

/// Strictly increasing token at storage precision.
fn next_token(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = truncate_to_micros(now);
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

fn serialize_payload<T: Serialize>(info: &OperationExecutionInfo<T>) -> Result<String> {
    serde_json::to_string(&info.data).map_err(|e| {
        WorkflowError::PayloadEncoding {
            operation_name: info.operation_name.clone(),
            operation_id: info.id.clone(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn encode<T: Serialize>(info: &OperationExecutionInfo<T>) -> Result<StoredOperation> {
    Ok(StoredOperation {
        operation_name: info.operation_name.clone(),
        id: info.id.clone(),
        data: serialize_payload(info)?,
        last_modified: info.last_modified,
    })
}

fn decode<T: DeserializeOwned>(stored: StoredOperation) -> Result<OperationExecutionInfo<T>> {
    let data = serde_json::from_str(&stored.data).map_err(|e| WorkflowError::PayloadEncoding {
        operation_name: stored.operation_name.clone(),
        operation_id: stored.id.clone(),
        reason: e.to_string(),
    })?;
    Ok(OperationExecutionInfo {
        operation_name: stored.operation_name,
        id: stored.id,
        data,
        last_modified: stored.last_modified,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::InMemoryOperationExecutionRepository;
    use crate::utils::FixedClock;
    use chrono::TimeZone;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        step: u8,
    }

    fn create_store(clock: Arc<FixedClock>) -> OperationExecutionStore {
        OperationExecutionStore::new(Arc::new(InMemoryOperationExecutionRepository::new()), clock)
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_get_or_add_creates_once() {
        let store = create_store(Arc::new(FixedClock::new(start())));

        let (first, created) = store
            .get_or_add("Deposit", "op-1", || Payload { step: 1 })
            .await
            .unwrap();
        let (second, created_again) = store
            .get_or_add("Deposit", "op-1", || Payload { step: 9 })
            .await
            .unwrap();

        assert!(created);
        assert!(!created_again);
        assert_eq!(first, second);
        assert_eq!(second.data.step, 1);
    }

    #[tokio::test]
    async fn test_same_id_under_different_names_are_independent() {
        let store = create_store(Arc::new(FixedClock::new(start())));

        store
            .get_or_add("Deposit", "op-1", || Payload { step: 1 })
            .await
            .unwrap();
        let (_, created) = store
            .get_or_add("Withdrawal", "op-1", || Payload { step: 2 })
            .await
            .unwrap();

        assert!(created);
    }

    #[tokio::test]
    async fn test_concurrent_get_or_add_creates_single_checkpoint() {
        let store = Arc::new(create_store(Arc::new(FixedClock::new(start()))));

        let tasks: Vec<_> = (0..8u8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .get_or_add("Deposit", "op-1", move || Payload { step: i })
                        .await
                        .unwrap()
                })
            })
            .collect();

        let results = futures::future::join_all(tasks).await;
        let outcomes: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();

        assert_eq!(outcomes.iter().filter(|(_, created)| *created).count(), 1);
        let winner = &outcomes[0].0.data;
        assert!(outcomes.iter().all(|(info, _)| &info.data == winner));
    }

    #[tokio::test]
    async fn test_save_from_same_read_only_one_wins() {
        let clock = Arc::new(FixedClock::new(start()));
        let store = create_store(clock.clone());
        store
            .get_or_add("Deposit", "op-1", || Payload { step: 1 })
            .await
            .unwrap();

        let mut first: OperationExecutionInfo<Payload> = store.get("Deposit", "op-1").unwrap().unwrap();
        let mut second = first.clone();
        first.data.step = 2;
        second.data.step = 3;

        store.save(&mut first).await.unwrap();
        let err = store.save(&mut second).await.unwrap_err();

        assert!(matches!(err, Error::ConcurrencyViolation { .. }));
        let stored: OperationExecutionInfo<Payload> = store.get("Deposit", "op-1").unwrap().unwrap();
        assert_eq!(stored.data.step, 2);
    }

    #[tokio::test]
    async fn test_token_advances_even_when_clock_stands_still() {
        let store = create_store(Arc::new(FixedClock::new(start())));
        let (mut info, _) = store
            .get_or_add("Deposit", "op-1", || Payload { step: 1 })
            .await
            .unwrap();
        let created_token = info.last_modified;

        store.save(&mut info).await.unwrap();
        let first_save = info.last_modified;
        store.save(&mut info).await.unwrap();

        assert!(first_save > created_token);
        assert!(info.last_modified > first_save);
    }

    #[tokio::test]
    async fn test_save_missing_checkpoint_reports_not_found() {
        let store = create_store(Arc::new(FixedClock::new(start())));
        let mut info = OperationExecutionInfo::new("Deposit", "ghost", Payload { step: 1 }, start());

        let err = store.save(&mut info).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Workflow(WorkflowError::OperationNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_checkpoint() {
        let store = create_store(Arc::new(FixedClock::new(start())));
        let (info, _) = store
            .get_or_add("Deposit", "op-1", || Payload { step: 1 })
            .await
            .unwrap();

        store.delete(&info).await.unwrap();

        assert!(store.get::<Payload>("Deposit", "op-1").unwrap().is_none());
    }

    #[test]
    fn test_next_token_is_strictly_increasing() {
        let previous = start();
        assert_eq!(next_token(previous, previous), previous + Duration::microseconds(1));
        assert_eq!(
            next_token(previous, previous + Duration::seconds(1)),
            previous + Duration::seconds(1)
        );
    }
}
