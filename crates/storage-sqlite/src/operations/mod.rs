//! SQLite storage implementation for saga checkpoints.

mod model;
mod repository;

pub use model::OperationExecutionInfoDB;
pub use repository::OperationExecutionRepository;
