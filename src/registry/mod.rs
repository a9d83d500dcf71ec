// ============================================================================
// Task Registry
// ============================================================================
//
// Durable, restart-safe store of task handles: one record per attempt of
// one step of one command. The registry itself never contacts the remote
// host; the engine's poller feeds it status updates. All maps live behind
// a single RwLock so every mutation keyed by (command, step) is applied
// atomically (single writer per key).

use crate::core::{
    CommandId, EngineError, RemoteId, Result, StepKind, TaskId, TaskStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Identity + status record for one remote unit of work.
///
/// A handle is never reused across retries: a retry registers a fresh
/// handle at the same step index with a bumped attempt number. The remote
/// correlation id is write-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHandle {
    pub id: TaskId,
    pub command: CommandId,
    pub step: u32,
    pub kind: StepKind,
    pub remote: Option<RemoteId>,
    pub status: TaskStatus,

    /// 1-based submission attempt for this step index
    pub attempt: u32,

    /// Millisecond timestamp of the last status change, driving the
    /// step-timeout check
    pub updated_at_ms: i64,
}

impl TaskHandle {
    fn new(command: CommandId, step: u32, kind: StepKind, attempt: u32) -> Self {
        Self {
            id: TaskId::new(),
            command,
            step,
            kind,
            remote: None,
            status: TaskStatus::Pending,
            attempt,
            updated_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    tasks: HashMap<TaskId, TaskHandle>,
    by_command: HashMap<CommandId, Vec<TaskId>>,
}

#[derive(Default)]
pub struct TaskRegistry {
    inner: RwLock<RegistryInner>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh handle for (command, step).
    ///
    /// Fails with `DuplicateActiveTask` if a non-terminal handle already
    /// exists for that key: concurrent duplicate submission of one step
    /// indicates a registry/state-machine desynchronization and is fatal
    /// to the command.
    pub async fn register(
        &self,
        command: CommandId,
        step: u32,
        kind: StepKind,
    ) -> Result<TaskHandle> {
        let mut inner = self.inner.write().await;

        let mut attempts = 0u32;
        if let Some(ids) = inner.by_command.get(&command) {
            for id in ids {
                let task = &inner.tasks[id];
                if task.step == step {
                    if !task.status.is_terminal() {
                        return Err(EngineError::DuplicateActiveTask { command, step });
                    }
                    attempts = attempts.max(task.attempt);
                }
            }
        }

        let handle = TaskHandle::new(command, step, kind, attempts + 1);
        inner.by_command.entry(command).or_default().push(handle.id);
        inner.tasks.insert(handle.id, handle.clone());
        Ok(handle)
    }

    /// Bind the remote correlation id. Write-once: rebinding with a
    /// different id is an error.
    pub async fn bind_remote(&self, task: TaskId, remote: RemoteId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let handle = inner
            .tasks
            .get_mut(&task)
            .ok_or(EngineError::TaskNotFound(task))?;
        match &handle.remote {
            None => {
                handle.remote = Some(remote);
                Ok(())
            }
            Some(existing) if *existing == remote => Ok(()),
            Some(_) => Err(EngineError::RemoteAlreadyBound(task)),
        }
    }

    /// Monotonic status update: a terminal status is never overwritten.
    /// Returns the effective status after the call.
    pub async fn update_status(&self, task: TaskId, status: TaskStatus) -> Result<TaskStatus> {
        let mut inner = self.inner.write().await;
        let handle = inner
            .tasks
            .get_mut(&task)
            .ok_or(EngineError::TaskNotFound(task))?;
        if handle.status.is_terminal() {
            return Ok(handle.status);
        }
        handle.status = status;
        handle.updated_at_ms = chrono::Utc::now().timestamp_millis();
        Ok(status)
    }

    pub async fn get(&self, task: TaskId) -> Option<TaskHandle> {
        self.inner.read().await.tasks.get(&task).cloned()
    }

    /// Non-terminal handles of a command, used on restart to resume
    /// polling without resubmitting.
    pub async fn list_active(&self, command: CommandId) -> Vec<TaskHandle> {
        let inner = self.inner.read().await;
        let mut active: Vec<TaskHandle> = inner
            .by_command
            .get(&command)
            .map(|ids| {
                ids.iter()
                    .map(|id| inner.tasks[id].clone())
                    .filter(|t| !t.status.is_terminal())
                    .collect()
            })
            .unwrap_or_default();
        active.sort_by_key(|t| (t.step, t.attempt));
        active
    }

    /// Every handle of a command, ordered by (step, attempt)
    pub async fn tasks_for(&self, command: CommandId) -> Vec<TaskHandle> {
        let inner = self.inner.read().await;
        let mut all: Vec<TaskHandle> = inner
            .by_command
            .get(&command)
            .map(|ids| ids.iter().map(|id| inner.tasks[id].clone()).collect())
            .unwrap_or_default();
        all.sort_by_key(|t| (t.step, t.attempt));
        all
    }

    /// The non-terminal handle for (command, step), if any
    pub async fn active_for_step(&self, command: CommandId, step: u32) -> Option<TaskHandle> {
        self.list_active(command)
            .await
            .into_iter()
            .find(|t| t.step == step)
    }

    /// The most recent handle for (command, step) by attempt number
    pub async fn latest_for_step(&self, command: CommandId, step: u32) -> Option<TaskHandle> {
        self.tasks_for(command)
            .await
            .into_iter()
            .filter(|t| t.step == step)
            .max_by_key(|t| t.attempt)
    }

    /// Full dump for checkpointing
    pub async fn dump(&self) -> HashMap<TaskId, TaskHandle> {
        self.inner.read().await.tasks.clone()
    }

    /// Load recovered handles, replacing any current content. Used once
    /// at engine startup from the journal.
    pub async fn hydrate(&self, handles: impl IntoIterator<Item = TaskHandle>) {
        let mut inner = self.inner.write().await;
        inner.tasks.clear();
        inner.by_command.clear();
        for handle in handles {
            inner
                .by_command
                .entry(handle.command)
                .or_default()
                .push(handle.id);
            inner.tasks.insert(handle.id, handle);
        }
        // Keep per-command ordering stable for list_active consumers
        let steps: HashMap<TaskId, (u32, u32)> = inner
            .tasks
            .values()
            .map(|t| (t.id, (t.step, t.attempt)))
            .collect();
        for ids in inner.by_command.values_mut() {
            ids.sort_by_key(|id| steps[id]);
        }
    }
}
