use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

use margin_accounts_core::errors::Result;
use margin_accounts_core::operations::{OperationExecutionRepositoryTrait, StoredOperation};

use super::model::OperationExecutionInfoDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::operation_execution_info;
use crate::schema::operation_execution_info::dsl;
use crate::utils::format_timestamp;

/// Checkpoints keyed by `(operation_name, id)`.
///
/// The compare-and-swap is a single conditional `UPDATE` on the token column.
pub struct OperationExecutionRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl OperationExecutionRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl OperationExecutionRepositoryTrait for OperationExecutionRepository {
    fn get(&self, operation_name: &str, operation_id: &str) -> Result<Option<StoredOperation>> {
        let mut conn = get_connection(&self.pool)?;
        let row = dsl::operation_execution_info
            .find((operation_name, operation_id))
            .select(OperationExecutionInfoDB::as_select())
            .first::<OperationExecutionInfoDB>(&mut conn)
            .optional()
            .into_core()?;
        row.map(|r| StoredOperation::try_from(r).map_err(Into::into))
            .transpose()
    }

    async fn insert(&self, operation: StoredOperation) -> Result<()> {
        let row = OperationExecutionInfoDB::from(operation);
        self.writer
            .exec(move |conn| {
                diesel::insert_into(operation_execution_info::table)
                    .values(&row)
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }

    async fn update_if_unmodified(
        &self,
        operation: StoredOperation,
        expected_last_modified: DateTime<Utc>,
    ) -> Result<bool> {
        let row = OperationExecutionInfoDB::from(operation);
        let expected = format_timestamp(expected_last_modified);
        self.writer
            .exec(move |conn| {
                let updated = diesel::update(
                    dsl::operation_execution_info
                        .filter(dsl::operation_name.eq(&row.operation_name))
                        .filter(dsl::id.eq(&row.id))
                        .filter(dsl::last_modified.eq(&expected)),
                )
                .set((dsl::data.eq(&row.data), dsl::last_modified.eq(&row.last_modified)))
                .execute(conn)
                .into_core()?;
                Ok(updated == 1)
            })
            .await
    }

    async fn delete(&self, operation_name: &str, operation_id: &str) -> Result<usize> {
        let name = operation_name.to_string();
        let key = operation_id.to_string();
        self.writer
            .exec(move |conn| {
                diesel::delete(dsl::operation_execution_info.find((name, key)))
                    .execute(conn)
                    .into_core()
            })
            .await
    }
}
