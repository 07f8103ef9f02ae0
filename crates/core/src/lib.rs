//! Margin accounts core - domain entities, sagas, services, and traits.
//!
//! This crate contains the business logic of the account management
//! service. It is database-agnostic and defines repository traits that are
//! implemented by the `storage-sqlite` crate; in-memory implementations of
//! every trait live next to the traits.

pub mod accounts;
pub mod errors;
pub mod ledger;
pub mod operations;
pub mod settings;
pub mod statistics;
pub mod trading;
pub mod utils;
pub mod workflow;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
