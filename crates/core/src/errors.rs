//! Core error types for the account management service.
//!
//! This module defines database-agnostic error types. Storage-specific errors
//! (from Diesel, SQLite, etc.) are converted to these types by the storage layer.

use chrono::ParseError as ChronoParseError;
use thiserror::Error;

use crate::workflow::WorkflowError;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the account management service.
///
/// Message handlers use [`Error::is_retryable`] to decide whether a failed
/// delivery should be retried by the transport or dropped.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Business rule violated: {0}")]
    BusinessRule(String),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Optimistic concurrency violation on operation {operation_name}:{operation_id}")]
    ConcurrencyViolation {
        operation_name: String,
        operation_id: String,
    },

    #[error("Fault injected for operation {0}")]
    FaultInjected(String),

    #[error("Invalid configuration value: {0}")]
    InvalidConfigValue(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Whether redelivering the message that produced this error can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Database(err) => err.is_transient(),
            Error::Workflow(err) => err.is_retryable(),
            Error::ConcurrencyViolation { .. } | Error::FaultInjected(_) => true,
            Error::Validation(_)
            | Error::BusinessRule(_)
            | Error::InvalidConfigValue(_)
            | Error::Unexpected(_) => false,
        }
    }
}

/// Database-agnostic error type for storage operations.
///
/// This enum uses `String` for all error details, allowing the storage layer
/// to convert storage-specific errors (Diesel, SQLite, etc.) into this format.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish a database connection.
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to create or configure the connection pool.
    #[error("Failed to create database pool: {0}")]
    PoolCreationFailed(String),

    /// A database query failed to execute.
    #[error("Database query failed: {0}")]
    QueryFailed(String),

    /// The requested record was not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A unique constraint was violated (e.g., duplicate key).
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// A foreign key constraint was violated.
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// A database transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Database migration failed.
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Internal/unexpected database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DatabaseError {
    /// Connection, query and transaction failures may clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DatabaseError::ConnectionFailed(_)
                | DatabaseError::PoolCreationFailed(_)
                | DatabaseError::QueryFailed(_)
                | DatabaseError::TransactionFailed(_)
                | DatabaseError::Internal(_)
        )
    }
}

/// Validation errors for user input, account lookups and data parsing.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Required field '{0}' is missing")]
    MissingField(String),

    #[error("Account {0} does not exist")]
    AccountNotFound(String),

    #[error("Account {0} is deleted")]
    AccountDeleted(String),

    #[error("Client {client_id} already has account {account_id}")]
    DuplicateAccount {
        client_id: String,
        account_id: String,
    },

    #[error("No trading condition with id {0}")]
    UnknownTradingCondition(String),

    #[error("Base asset {base_asset_id} is not configured for trading condition {trading_condition_id}")]
    BaseAssetNotConfigured {
        base_asset_id: String,
        trading_condition_id: String,
    },

    #[error("Account {account_id} has legal entity {account_legal_entity}, trading condition {trading_condition_id} belongs to {legal_entity}")]
    LegalEntityMismatch {
        account_id: String,
        account_legal_entity: String,
        trading_condition_id: String,
        legal_entity: String,
    },

    #[error("Failed to parse decimal number: {0}")]
    DecimalParse(#[from] rust_decimal::Error),

    #[error("Failed to parse date/time: {0}")]
    DateTimeParse(#[from] ChronoParseError),
}

// === From implementations for common error types ===

impl From<rust_decimal::Error> for Error {
    fn from(err: rust_decimal::Error) -> Self {
        Error::Validation(ValidationError::DecimalParse(err))
    }
}

impl From<ChronoParseError> for Error {
    fn from(err: ChronoParseError) -> Self {
        Error::Validation(ValidationError::DateTimeParse(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Unexpected(err.to_string())
    }
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_and_concurrency_errors_are_retryable() {
        let err = Error::ConcurrencyViolation {
            operation_name: "Deposit".to_string(),
            operation_id: "op-1".to_string(),
        };
        assert!(err.is_retryable());
        assert!(Error::FaultInjected("op-1".to_string()).is_retryable());
        assert!(Error::Database(DatabaseError::QueryFailed("locked".to_string())).is_retryable());
    }

    #[test]
    fn validation_and_business_errors_are_not_retryable() {
        assert!(!Error::Validation(ValidationError::AccountNotFound("a1".to_string())).is_retryable());
        assert!(!Error::BusinessRule("reset disabled".to_string()).is_retryable());
        assert!(!Error::Database(DatabaseError::UniqueViolation("dup".to_string())).is_retryable());
    }
}
