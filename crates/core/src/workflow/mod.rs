//! Workflow module - messages, sagas and command handlers.
//!
//! Multi-step operations are sagas: each one keeps its state in a checkpoint
//! (see [`crate::operations`]) and moves forward only through the events it
//! consumes. Money moves exclusively through the `UpdateBalance` command.

mod balance_commands_handler;
mod balance_commands_service;
mod deposit_saga;
mod faults;
mod give_temporary_capital_saga;
mod handler;
mod messages;
mod negative_protection;
mod operation_commands_handler;
mod revoke_temporary_capital_saga;
mod saga_context;
mod sink;
mod state;
mod temporary_capital_commands_handler;
mod withdrawal_saga;
mod workflow_errors;

pub use balance_commands_handler::BalanceCommandsHandler;
pub use balance_commands_service::{
    BalanceCommandsService, BalanceOperationRequest, ChargeManuallyRequest,
    GiveTemporaryCapitalRequest, RevokeTemporaryCapitalRequest, CHARGE_MANUALLY_SOURCE,
};
pub use deposit_saga::{DepositData, DepositSaga, DepositState, DEPOSIT_OPERATION_NAME};
pub use faults::{FaultInjector, NoFaults, RandomFaults, ScriptedFaults};
pub use give_temporary_capital_saga::{
    GiveTemporaryCapitalData, GiveTemporaryCapitalSaga, GiveTemporaryCapitalState,
    GIVE_TEMPORARY_CAPITAL_OPERATION_NAME,
};
pub use handler::{CommandHandler, EventHandler};
pub use messages::*;
pub use negative_protection::{
    deficit_fingerprint, NegativeProtectionRecord, NegativeProtectionSaga,
    NegativeProtectionService, NegativeProtectionServiceTrait, NEGATIVE_PROTECTION_OPERATION_NAME,
};
pub use operation_commands_handler::OperationCommandsHandler;
pub use revoke_temporary_capital_saga::{
    RevokeTemporaryCapitalData, RevokeTemporaryCapitalSaga, RevokeTemporaryCapitalState,
    REVOKE_TEMPORARY_CAPITAL_OPERATION_NAME,
};
pub use saga_context::SagaContext;
pub use sink::{MessageSink, MockMessageSink, NoOpMessageSink};
pub use state::{switch_state, OperationData, OperationState, Transition};
pub use temporary_capital_commands_handler::{
    temporary_capital_operation_key, TemporaryCapitalCommandsHandler,
};
pub use withdrawal_saga::{
    WithdrawalData, WithdrawalSaga, WithdrawalState, WITHDRAWAL_OPERATION_NAME,
};
pub use workflow_errors::WorkflowError;
