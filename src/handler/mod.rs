// ============================================================================
// Handler Chains
// ============================================================================
//
// Each command kind declares a fixed, ordered chain of step descriptors.
// The chain is data, not a class hierarchy: the state machine owns the
// sequencing, and the functions here are pure with respect to command
// state. Chain order is significant: "create target image" must precede
// "copy image data" must precede "finalize metadata".

use crate::command::CommandParams;
use crate::core::{CommandKind, StepKind, TaskStatus};
use serde_json::{Value, json};

/// Descriptor of one step in a command's chain.
///
/// `compensation`, when present, is the inverse action pushed on the
/// rollback ledger once this step completes a non-idempotent external
/// mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSpec {
    pub kind: StepKind,
    pub compensation: Option<StepKind>,
}

const IMPORT_IMAGE_CHAIN: &[StepSpec] = &[
    StepSpec {
        kind: StepKind::CreateImage,
        compensation: Some(StepKind::DeleteImage),
    },
    // The copied data is undone separately from the created image; each
    // completed mutation carries its own inverse on the ledger
    StepSpec {
        kind: StepKind::CopyImage,
        compensation: Some(StepKind::DeleteImage),
    },
    StepSpec {
        kind: StepKind::FinalizeImage,
        compensation: None,
    },
];

const EXPORT_IMAGE_CHAIN: &[StepSpec] = &[
    StepSpec {
        kind: StepKind::CreateImage,
        compensation: Some(StepKind::DeleteImage),
    },
    StepSpec {
        kind: StepKind::CopyImage,
        compensation: None,
    },
];

const REMOVE_IMAGE_CHAIN: &[StepSpec] = &[StepSpec {
    kind: StepKind::DeleteImage,
    compensation: None,
}];

/// Ordered chain of steps for a command kind
pub fn chain_for(kind: CommandKind) -> &'static [StepSpec] {
    match kind {
        CommandKind::ImportImage => IMPORT_IMAGE_CHAIN,
        CommandKind::ExportImage => EXPORT_IMAGE_CHAIN,
        CommandKind::RemoveImage => REMOVE_IMAGE_CHAIN,
    }
}

/// Build the remote submission payload for a step from the command's
/// immutable parameters.
pub fn build_payload(kind: StepKind, params: &CommandParams) -> Value {
    match kind {
        StepKind::CreateImage => json!({
            "target_domain": params.target_domain,
            "size_bytes": params.requested_bytes,
        }),
        StepKind::CopyImage => json!({
            "source_domain": params.source_domain,
            "source_image": params.source_image,
            "target_domain": params.target_domain,
        }),
        StepKind::FinalizeImage => json!({
            "target_domain": params.target_domain,
        }),
        StepKind::DeleteImage => json!({
            "target_domain": params.target_domain,
            "source_image": params.source_image,
        }),
    }
}

/// Build the payload for a compensation action undoing `undone` on the
/// entities named by `params`.
pub fn build_compensation_payload(undone: StepKind, params: &CommandParams) -> Value {
    json!({
        "undoes": undone.to_string(),
        "target_domain": params.target_domain,
        "source_image": params.source_image,
        // Must stay safe if the undone step completes after a timeout:
        // the remote treats a missing target as already-deleted.
        "force": true,
    })
}

/// Decision taken after a task handle reaches a terminal status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Advance the execution index and start the next step
    Success,

    /// Fatal: take the compensation + quota-release path
    Failure,

    /// Register a fresh task handle at the same step index and resubmit
    Retry,
}

/// Interpret a terminal task status under the configured retry budget.
/// `attempt` is 1-based: the first submission is attempt 1.
pub fn interpret_outcome(status: TaskStatus, attempt: u32, retry_budget: u32) -> StepOutcome {
    match status {
        TaskStatus::Succeeded => StepOutcome::Success,
        TaskStatus::Failed if attempt <= retry_budget => StepOutcome::Retry,
        TaskStatus::Failed => StepOutcome::Failure,
        // Non-terminal statuses never reach interpretation
        TaskStatus::Pending | TaskStatus::Running => StepOutcome::Retry,
    }
}
