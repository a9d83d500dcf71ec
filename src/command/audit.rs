// ============================================================================
// Audit Classification
// ============================================================================
//
// The user-visible classification of a command's progress is a pure
// function of three observables: lifecycle state, whether any step ran,
// and the overall success flag. It deliberately knows nothing about the
// remote host or the orchestrator's control flow.

use crate::core::{CommandId, CommandState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditKind {
    /// The command entered execution; no step has completed yet
    OperationStarted,

    /// The command finished successfully
    OperationFinished,

    /// The command finished with failure (validation or step failure)
    OperationFinishedFailure,

    /// No user-visible classification for this combination
    Unassigned,
}

impl std::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AuditKind::OperationStarted => "operation started",
            AuditKind::OperationFinished => "operation finished",
            AuditKind::OperationFinishedFailure => "operation finished with failure",
            AuditKind::Unassigned => "unassigned",
        };
        write!(f, "{}", name)
    }
}

/// Classify a command's progress for the audit log.
pub fn classify(state: CommandState, any_step_ran: bool, succeeded: bool) -> AuditKind {
    match state {
        CommandState::EndSuccess => AuditKind::OperationFinished,
        CommandState::EndFailure => AuditKind::OperationFinishedFailure,
        CommandState::Executing if !succeeded => AuditKind::OperationFinishedFailure,
        CommandState::Executing if !any_step_ran => AuditKind::OperationStarted,
        _ => AuditKind::Unassigned,
    }
}

/// One entry handed to the audit sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub kind: AuditKind,
    pub command: CommandId,
    pub timestamp: DateTime<Utc>,
    pub properties: HashMap<String, String>,
}

impl AuditRecord {
    pub fn new(kind: AuditKind, command: CommandId, properties: HashMap<String, String>) -> Self {
        Self {
            kind,
            command,
            timestamp: Utc::now(),
            properties,
        }
    }
}
