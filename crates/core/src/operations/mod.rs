//! Operations module - durable saga checkpoints.

mod memory;
mod operations_model;
mod operations_traits;
mod store;

pub use memory::InMemoryOperationExecutionRepository;
pub use operations_model::{OperationExecutionInfo, StoredOperation};
pub use operations_traits::OperationExecutionRepositoryTrait;
pub use store::OperationExecutionStore;
