pub mod error;
pub mod types;

pub use error::{EngineError, Result};
pub use types::{
    Capability, CommandId, CommandKind, CommandState, EntityId, QuotaId, RemoteId, RemoteStepStatus,
    ReservationId, StepKind, TaskId, TaskStatus,
};
