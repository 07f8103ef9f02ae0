//! Text encodings shared by the SQLite models.
//!
//! Timestamps are fixed-width RFC 3339 UTC strings with microsecond precision,
//! so comparing the text in SQL orders rows chronologically. Decimals are
//! stored as their canonical string form.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;

use crate::errors::StorageError;

/// Format used for `trading_date` columns.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::SerializationError(format!("timestamp '{}': {}", value, e)))
}

pub fn parse_decimal(value: &str) -> Result<Decimal, StorageError> {
    Decimal::from_str(value)
        .map_err(|e| StorageError::SerializationError(format!("decimal '{}': {}", value, e)))
}

pub fn format_date(value: NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Result<NaiveDate, StorageError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| StorageError::SerializationError(format!("date '{}': {}", value, e)))
}
