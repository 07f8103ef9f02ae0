//! SQLite storage implementation for margin account management.
//!
//! This crate provides all database-related functionality using Diesel ORM with SQLite.
//! It implements the repository traits defined in `margin-accounts-core` and contains:
//! - Database connection pooling and management
//! - Diesel migrations
//! - Repository implementations for accounts, the balance-change ledger and
//!   saga checkpoints
//! - Database-specific model types (with Diesel derives)
//!
//! # Architecture
//!
//! This crate is the only place in the workspace where Diesel dependencies exist.
//! The core crate is database-agnostic and works with traits.
//!
//! ```text
//!        core (domain, sagas)
//!                  │
//!                  ▼
//!          storage-sqlite (this crate)
//!                  │
//!                  ▼
//!              SQLite DB
//! ```
//!
//! Reads go straight to the pool. Every write runs on a single writer task
//! inside an immediate transaction, which is what makes the
//! read-modify-write repository methods atomic.

pub mod db;
pub mod errors;
pub mod schema;
pub mod utils;

// Repository implementations
pub mod accounts;
pub mod ledger;
pub mod operations;

// Re-export database utilities
pub use db::{
    create_pool, get_connection, init, open, run_migrations, spawn_writer, DbConnection, DbPool,
    WriteHandle,
};

// Re-export storage errors and conversion helpers
pub use errors::{IntoCore, StorageError};

pub use accounts::AccountRepository;
pub use ledger::LedgerRepository;
pub use operations::OperationExecutionRepository;

// Re-export from margin-accounts-core for convenience
pub use margin_accounts_core::errors::{DatabaseError, Error, Result};
