// ============================================================================
// Compensation Ledger
// ============================================================================
//
// Records the inverse action of every completed step whose external side
// effect is not naturally idempotent. On END_FAILURE the ledger is drained
// in strict reverse order of original completion; each inverse action's
// own failure is recorded but never halts the remainder. Best effort,
// never silent, never blocking.

use crate::core::{CommandId, StepKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Result of executing one inverse action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UndoResult {
    Pending,
    Undone,
    UndoFailed(String),
}

/// One (step index, inverse action) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationEntry {
    pub command: CommandId,

    /// Step whose side effect this entry undoes
    pub step: u32,

    pub action: StepKind,
    pub payload: Value,
    pub result: UndoResult,
}

impl CompensationEntry {
    pub fn new(command: CommandId, step: u32, action: StepKind, payload: Value) -> Self {
        Self {
            command,
            step,
            action,
            payload,
            result: UndoResult::Pending,
        }
    }
}

#[derive(Default)]
pub struct CompensationLedger {
    entries: RwLock<HashMap<CommandId, Vec<CompensationEntry>>>,
}

impl CompensationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an inverse action. Called after the step completed its side
    /// effect and before the next step starts.
    pub async fn push(&self, entry: CompensationEntry) {
        self.entries
            .write()
            .await
            .entry(entry.command)
            .or_default()
            .push(entry);
    }

    /// Remove and return a command's entries in reverse order of original
    /// completion, ready for execution.
    pub async fn take(&self, command: CommandId) -> Vec<CompensationEntry> {
        let mut entries = self
            .entries
            .write()
            .await
            .remove(&command)
            .unwrap_or_default();
        entries.reverse();
        entries
    }

    /// Drop a command's entries without running them (END_SUCCESS path)
    pub async fn discard(&self, command: CommandId) {
        self.entries.write().await.remove(&command);
    }

    pub async fn entries_for(&self, command: CommandId) -> Vec<CompensationEntry> {
        self.entries
            .read()
            .await
            .get(&command)
            .cloned()
            .unwrap_or_default()
    }

    /// Full dump for checkpointing, per command in push order
    pub async fn dump(&self) -> HashMap<CommandId, Vec<CompensationEntry>> {
        self.entries.read().await.clone()
    }

    /// Load recovered entries, replacing any current content. Entries are
    /// expected in original push order per command.
    pub async fn hydrate(&self, items: impl IntoIterator<Item = CompensationEntry>) {
        let mut entries = self.entries.write().await;
        entries.clear();
        for entry in items {
            entries.entry(entry.command).or_default().push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_take_reverses_push_order() {
        let ledger = CompensationLedger::new();
        let command = CommandId::new();
        ledger
            .push(CompensationEntry::new(
                command,
                0,
                StepKind::DeleteImage,
                json!({"step": 0}),
            ))
            .await;
        ledger
            .push(CompensationEntry::new(
                command,
                1,
                StepKind::DeleteImage,
                json!({"step": 1}),
            ))
            .await;

        let drained = ledger.take(command).await;
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].step, 1);
        assert_eq!(drained[1].step, 0);

        // Taken entries are gone
        assert!(ledger.take(command).await.is_empty());
    }

    #[tokio::test]
    async fn test_discard_drops_entries() {
        let ledger = CompensationLedger::new();
        let command = CommandId::new();
        ledger
            .push(CompensationEntry::new(
                command,
                0,
                StepKind::DeleteImage,
                json!({}),
            ))
            .await;
        ledger.discard(command).await;
        assert!(ledger.entries_for(command).await.is_empty());
    }

    #[tokio::test]
    async fn test_commands_are_isolated() {
        let ledger = CompensationLedger::new();
        let a = CommandId::new();
        let b = CommandId::new();
        ledger
            .push(CompensationEntry::new(a, 0, StepKind::DeleteImage, json!({})))
            .await;
        assert!(ledger.take(b).await.is_empty());
        assert_eq!(ledger.entries_for(a).await.len(), 1);
    }
}
