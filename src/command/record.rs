use super::CommandParams;
use crate::core::{CommandId, CommandKind, CommandState, EngineError, ReservationId, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Durable record of one command: identity, immutable parameters and the
/// mutable progress the state machine advances.
///
/// The execution index is the cursor into the handler chain. It is
/// persisted before the next step starts, so a restarted process resumes
/// at the correct step instead of re-running completed ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: CommandId,
    pub kind: CommandKind,
    pub params: CommandParams,
    pub state: CommandState,
    pub execution_index: u32,

    /// True once at least one step reached terminal success
    pub any_step_ran: bool,

    /// Overall success flag, cleared as soon as any step fatally fails
    pub succeeded: bool,

    /// Cooperative abort: the worker stops submitting further steps and
    /// takes the failure path once the in-flight step settles
    pub abort_requested: bool,

    pub last_error: Option<String>,
    pub reservation: Option<ReservationId>,
    pub created_at: DateTime<Utc>,

    /// User-facing metadata, e.g. resolved display name of the image
    pub job_properties: HashMap<String, String>,
}

impl CommandRecord {
    pub fn new(kind: CommandKind, params: CommandParams) -> Self {
        Self {
            id: CommandId::new(),
            kind,
            params,
            state: CommandState::Validating,
            execution_index: 0,
            any_step_ran: false,
            succeeded: true,
            abort_requested: false,
            last_error: None,
            reservation: None,
            created_at: Utc::now(),
            job_properties: HashMap::new(),
        }
    }

    /// Validating -> Executing
    pub fn begin_executing(&mut self) -> Result<()> {
        self.transition(CommandState::Executing)
    }

    /// Executing -> EndSuccess / EndFailure. Validation failures go
    /// Validating -> EndFailure directly, without ever executing.
    pub fn finish(&mut self, success: bool) -> Result<()> {
        let target = if success {
            CommandState::EndSuccess
        } else {
            CommandState::EndFailure
        };
        if !success {
            self.succeeded = false;
        }
        self.transition(target)
    }

    /// Advance the chain cursor past a terminally-successful step
    pub fn advance(&mut self) {
        self.execution_index += 1;
        self.any_step_ran = true;
    }

    fn transition(&mut self, to: CommandState) -> Result<()> {
        let allowed = matches!(
            (self.state, to),
            (CommandState::Validating, CommandState::Executing)
                | (CommandState::Validating, CommandState::EndFailure)
                | (CommandState::Executing, CommandState::EndSuccess)
                | (CommandState::Executing, CommandState::EndFailure)
        );
        if !allowed {
            return Err(EngineError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

/// Snapshot of a command's progress as exposed to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandStatus {
    pub state: CommandState,
    pub execution_index: u32,
    pub last_error: Option<String>,
}

impl From<&CommandRecord> for CommandStatus {
    fn from(record: &CommandRecord) -> Self {
        Self {
            state: record.state,
            execution_index: record.execution_index,
            last_error: record.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CommandKind;

    fn record() -> CommandRecord {
        CommandRecord::new(
            CommandKind::ImportImage,
            CommandParams::new("admin", "dom-target"),
        )
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut cmd = record();
        assert_eq!(cmd.state, CommandState::Validating);
        cmd.begin_executing().unwrap();
        assert_eq!(cmd.state, CommandState::Executing);
        cmd.finish(true).unwrap();
        assert_eq!(cmd.state, CommandState::EndSuccess);
        assert!(cmd.succeeded);
    }

    #[test]
    fn test_validation_failure_skips_executing() {
        let mut cmd = record();
        cmd.finish(false).unwrap();
        assert_eq!(cmd.state, CommandState::EndFailure);
        assert!(!cmd.succeeded);
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut cmd = record();
        cmd.begin_executing().unwrap();
        cmd.finish(false).unwrap();
        assert!(cmd.finish(true).is_err());
        assert!(cmd.begin_executing().is_err());
        assert_eq!(cmd.state, CommandState::EndFailure);
    }

    #[test]
    fn test_cannot_succeed_from_validating() {
        let mut cmd = record();
        assert!(cmd.finish(true).is_err());
    }

    #[test]
    fn test_advance_marks_progress() {
        let mut cmd = record();
        cmd.begin_executing().unwrap();
        assert!(!cmd.any_step_ran);
        cmd.advance();
        assert_eq!(cmd.execution_index, 1);
        assert!(cmd.any_step_ran);
    }
}
