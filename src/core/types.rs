// ============================================================================
// Core Identities and Status Types
// ============================================================================

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a command (one logical user operation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommandId(pub Uuid);

impl CommandId {
    pub fn new() -> Self {
        CommandId(Uuid::new_v4())
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cmd_{}", self.0)
    }
}

/// Unique identifier for a task handle (one tracked remote step attempt)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        TaskId(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task_{}", self.0)
    }
}

/// Unique identifier for a quota reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReservationId(pub Uuid);

impl ReservationId {
    pub fn new() -> Self {
        ReservationId(Uuid::new_v4())
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rsv_{}", self.0)
    }
}

/// Identifier of an external entity (storage domain, image, user),
/// assigned by the surrounding inventory, not by this engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        EntityId(id.into())
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        EntityId(id.to_string())
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a capacity budget shared across commands
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuotaId(pub String);

impl QuotaId {
    pub fn new(id: impl Into<String>) -> Self {
        QuotaId(id.into())
    }
}

impl From<&str> for QuotaId {
    fn from(id: &str) -> Self {
        QuotaId(id.to_string())
    }
}

impl std::fmt::Display for QuotaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation id returned by the remote execution host once it accepts
/// a step. Opaque to the engine; write-once on a task handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteId(pub String);

impl RemoteId {
    pub fn new(id: impl Into<String>) -> Self {
        RemoteId(id.into())
    }
}

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of logical operation a command performs.
///
/// Each kind maps to a fixed, ordered chain of step kinds (see
/// `handler::chain_for`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    ImportImage,
    ExportImage,
    RemoveImage,
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CommandKind::ImportImage => "import_image",
            CommandKind::ExportImage => "export_image",
            CommandKind::RemoveImage => "remove_image",
        };
        write!(f, "{}", name)
    }
}

/// Kind of remotely-executed unit of work within a command's chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    CreateImage,
    CopyImage,
    FinalizeImage,
    DeleteImage,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StepKind::CreateImage => "create_image",
            StepKind::CopyImage => "copy_image",
            StepKind::FinalizeImage => "finalize_image",
            StepKind::DeleteImage => "delete_image",
        };
        write!(f, "{}", name)
    }
}

/// Capability required on a target entity before a command may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    CreateDisk,
    DeleteDisk,
    AccessImageStorage,
}

/// Command lifecycle state
///
/// State transitions:
/// ```text
/// Validating ──> Executing ──> EndSuccess
///     │              │
///     │              └──compensate──> EndFailure
///     └──precondition failed──> EndFailure
/// ```
///
/// Transitions are one-directional; a terminal state is never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandState {
    /// Precondition checks are running; no remote work submitted yet
    Validating,

    /// The handler chain is being executed step by step
    Executing,

    /// All steps reached terminal success; quota consumed
    EndSuccess,

    /// Validation failed or a step fatally failed; quota released,
    /// compensation drained
    EndFailure,
}

impl CommandState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandState::EndSuccess | CommandState::EndFailure)
    }
}

impl std::fmt::Display for CommandState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CommandState::Validating => "VALIDATING",
            CommandState::Executing => "EXECUTING",
            CommandState::EndSuccess => "END_SUCCESS",
            CommandState::EndFailure => "END_FAILURE",
        };
        write!(f, "{}", name)
    }
}

/// Status of one task handle
///
/// ```text
/// Pending ──> Running ──> Succeeded
///                 │
///                 └──> Failed
/// ```
///
/// Terminal statuses are monotonic: once Succeeded or Failed is recorded
/// the registry rejects any further change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Registered locally, not yet accepted by the remote host
    Pending,

    /// Accepted by the remote host, correlation id bound
    Running,

    Succeeded,

    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Succeeded => "SUCCEEDED",
            TaskStatus::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

/// Status of a step as reported by the remote execution host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteStepStatus {
    Running,
    Succeeded,
    Failed,
}

impl From<RemoteStepStatus> for TaskStatus {
    fn from(status: RemoteStepStatus) -> Self {
        match status {
            RemoteStepStatus::Running => TaskStatus::Running,
            RemoteStepStatus::Succeeded => TaskStatus::Succeeded,
            RemoteStepStatus::Failed => TaskStatus::Failed,
        }
    }
}
