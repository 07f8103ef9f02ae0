use diesel::prelude::*;

use margin_accounts_core::operations::StoredOperation;

use crate::errors::StorageError;
use crate::utils::{format_timestamp, parse_timestamp};

#[derive(Queryable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::operation_execution_info)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct OperationExecutionInfoDB {
    pub operation_name: String,
    pub id: String,
    /// Serialized saga payload.
    pub data: String,
    /// Concurrency token, compared as text.
    pub last_modified: String,
}

impl TryFrom<OperationExecutionInfoDB> for StoredOperation {
    type Error = StorageError;

    fn try_from(db: OperationExecutionInfoDB) -> Result<Self, Self::Error> {
        Ok(Self {
            last_modified: parse_timestamp(&db.last_modified)?,
            operation_name: db.operation_name,
            id: db.id,
            data: db.data,
        })
    }
}

impl From<StoredOperation> for OperationExecutionInfoDB {
    fn from(domain: StoredOperation) -> Self {
        Self {
            last_modified: format_timestamp(domain.last_modified),
            operation_name: domain.operation_name,
            id: domain.id,
            data: domain.data,
        }
    }
}
