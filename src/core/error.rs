use super::{CommandId, CommandState, ReservationId, TaskId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Step failed: {0}")]
    Step(String),

    #[error("Duplicate active task for command {command} at step {step}")]
    DuplicateActiveTask { command: CommandId, step: u32 },

    #[error("Quota '{quota}' exceeded: requested {requested} bytes, {available} available")]
    QuotaExceeded {
        quota: String,
        requested: u64,
        available: u64,
    },

    #[error("Compensation failed: {0}")]
    Compensation(String),

    #[error("Command {0} not found")]
    CommandNotFound(CommandId),

    #[error("Task {0} not found")]
    TaskNotFound(TaskId),

    #[error("Reservation {0} not found")]
    ReservationNotFound(ReservationId),

    #[error("Remote id already bound for task {0}")]
    RemoteAlreadyBound(TaskId),

    #[error("Invalid command state transition: {from} -> {to}")]
    InvalidTransition {
        from: CommandState,
        to: CommandState,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
