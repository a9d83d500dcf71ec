// ============================================================================
// Command Engine
// ============================================================================
//
// The orchestrator: drives each command from validation to a terminal
// outcome on its own worker task. Validation runs inline in `submit` so
// precondition failures surface to the caller before any remote work or
// reservation outlives the call. Execution iterates the declarative
// handler chain, persisting the execution index before each next step so
// a restarted process resumes instead of re-running completed steps.

use crate::command::{AuditKind, AuditRecord, CommandParams, CommandRecord, CommandStatus, classify};
use crate::config::EngineConfig;
use crate::core::{
    Capability, CommandId, CommandKind, EngineError, EntityId, RemoteStepStatus, Result, TaskStatus,
};
use crate::gates::{AuditSink, InventoryGate, PermissionGate, QuotaAuthority, RemoteClient};
use crate::handler::{
    StepOutcome, StepSpec, build_compensation_payload, build_payload, chain_for, interpret_outcome,
};
use crate::journal::{EngineSnapshot, Journal, JournalEntry};
use crate::quota::{QuotaLedger, QuotaReservation, ReservationState};
use crate::registry::{TaskHandle, TaskRegistry};
use crate::rollback::{CompensationEntry, CompensationLedger, UndoResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// External collaborators the engine consumes. All are explicit
/// dependencies passed in at construction; nothing is resolved through a
/// process-wide factory.
#[derive(Clone)]
pub struct Collaborators {
    pub permissions: Arc<dyn PermissionGate>,
    pub remote: Arc<dyn RemoteClient>,
    pub quota: Arc<dyn QuotaAuthority>,
    pub audit: Arc<dyn AuditSink>,
    pub inventory: Arc<dyn InventoryGate>,
}

pub struct CommandEngine {
    config: EngineConfig,
    collab: Collaborators,
    commands: RwLock<HashMap<CommandId, CommandRecord>>,
    registry: TaskRegistry,
    quota: QuotaLedger,
    compensation: CompensationLedger,
    journal: Mutex<Journal>,
    workers: Mutex<HashMap<CommandId, JoinHandle<()>>>,
}

impl CommandEngine {
    /// Open the engine over its data directory, recovering any durable
    /// state a previous process left behind. Recovered commands are not
    /// resumed until `resume` is called.
    pub async fn open(config: EngineConfig, collab: Collaborators) -> Result<Arc<Self>> {
        let mut journal = Journal::new(&config.data_dir, config.durability)?;
        journal.set_checkpoint_threshold(config.checkpoint_threshold);
        let recovered = journal.recover()?;

        let engine = Arc::new(Self {
            quota: QuotaLedger::new(Arc::clone(&collab.quota)),
            config,
            collab,
            commands: RwLock::new(HashMap::new()),
            registry: TaskRegistry::new(),
            compensation: CompensationLedger::new(),
            journal: Mutex::new(journal),
            workers: Mutex::new(HashMap::new()),
        });

        if let Some(memory) = recovered {
            *engine.commands.write().await = memory.commands;
            // Give in-flight tasks a fresh timeout window after restart
            let now = chrono::Utc::now().timestamp_millis();
            engine
                .registry
                .hydrate(memory.tasks.into_values().map(|mut t| {
                    if !t.status.is_terminal() {
                        t.updated_at_ms = now;
                    }
                    t
                }))
                .await;
            engine.quota.hydrate(memory.reservations.into_values()).await;
            engine.compensation.hydrate(memory.compensations).await;
        }

        Ok(engine)
    }

    /// Respawn workers for every command recovered mid-execution.
    /// Returns the ids that were resumed.
    pub async fn resume(self: &Arc<Self>) -> Vec<CommandId> {
        let resumable: Vec<CommandId> = {
            let commands = self.commands.read().await;
            commands
                .values()
                .filter(|r| !r.state.is_terminal())
                .map(|r| r.id)
                .collect()
        };
        for id in &resumable {
            info!(command = %id, "resuming command after restart");
            self.spawn_worker(*id).await;
        }
        resumable
    }

    /// Submit a command. Fails fast when validation fails: no task
    /// handles and no surviving reservation exist in that case, and the
    /// command never enters EXECUTING.
    pub async fn submit(self: &Arc<Self>, kind: CommandKind, params: CommandParams) -> Result<CommandId> {
        let mut record = CommandRecord::new(kind, params);
        let id = record.id;

        if let Err(e) = self.validate(&mut record).await {
            warn!(command = %id, error = %e, "command validation failed");
            record.last_error = Some(e.to_string());
            record.finish(false)?;
            self.emit_audit(&record).await;
            self.commands.write().await.insert(id, record);
            return Err(e);
        }

        record.begin_executing()?;
        self.log(JournalEntry::CommandCreated(record.clone())).await?;
        if let Some(reservation_id) = record.reservation {
            if let Some(reservation) = self.quota.get(reservation_id).await {
                self.log(JournalEntry::ReservationCreated(reservation)).await?;
            }
        }

        info!(command = %id, kind = %kind, "command accepted");
        self.emit_audit(&record).await;
        self.commands.write().await.insert(id, record);
        self.spawn_worker(id).await;
        Ok(id)
    }

    /// Progress snapshot of a command
    pub async fn get_status(&self, command: CommandId) -> Result<CommandStatus> {
        let commands = self.commands.read().await;
        commands
            .get(&command)
            .map(CommandStatus::from)
            .ok_or(EngineError::CommandNotFound(command))
    }

    /// User-facing metadata resolved at validation time
    pub async fn get_job_properties(&self, command: CommandId) -> Result<HashMap<String, String>> {
        let commands = self.commands.read().await;
        commands
            .get(&command)
            .map(|r| r.job_properties.clone())
            .ok_or(EngineError::CommandNotFound(command))
    }

    /// Every task handle a command owns, ordered by (step, attempt)
    pub async fn tasks_for(&self, command: CommandId) -> Vec<TaskHandle> {
        self.registry.tasks_for(command).await
    }

    /// The command's quota reservation, if it holds one
    pub async fn reservation_for(&self, command: CommandId) -> Option<QuotaReservation> {
        let reservation_id = {
            let commands = self.commands.read().await;
            commands.get(&command)?.reservation
        };
        self.quota.get(reservation_id?).await
    }

    /// Request a cooperative abort: no further steps are submitted, the
    /// in-flight step settles naturally, then the failure path runs with
    /// compensation. No-op on a command already terminal.
    pub async fn abort(&self, command: CommandId) -> Result<()> {
        {
            let mut commands = self.commands.write().await;
            let record = commands
                .get_mut(&command)
                .ok_or(EngineError::CommandNotFound(command))?;
            if record.state.is_terminal() {
                return Ok(());
            }
            record.abort_requested = true;
        }
        self.log(JournalEntry::AbortRequested { command }).await?;
        info!(command = %command, "abort requested");
        Ok(())
    }

    /// Block until the command reaches a terminal state
    pub async fn wait_terminal(&self, command: CommandId) -> Result<CommandStatus> {
        loop {
            let status = self.get_status(command).await?;
            if status.state.is_terminal() {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stop all workers without finalizing their commands, as a process
    /// crash would. Durable state stays in the journal for recovery.
    pub async fn shutdown(&self) {
        let mut workers = self.workers.lock().await;
        for (_, handle) in workers.drain() {
            handle.abort();
        }
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    async fn validate(&self, record: &mut CommandRecord) -> Result<()> {
        let target = record.params.target_domain.clone();
        match self.collab.inventory.pool_is_up(&target).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(EngineError::Validation(format!(
                    "storage pool for domain '{target}' is not available"
                )));
            }
            Err(e) => {
                return Err(EngineError::Validation(format!(
                    "storage pool lookup failed: {e}"
                )));
            }
        }

        for (subject_target, capability) in permission_subjects(record.kind, &record.params) {
            match self
                .collab
                .permissions
                .check_access(&record.params.subject, &subject_target, capability)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    return Err(EngineError::Validation(format!(
                        "permission denied: {capability:?} on '{subject_target}'"
                    )));
                }
                Err(e) => {
                    return Err(EngineError::Validation(format!(
                        "permission lookup failed: {e}"
                    )));
                }
            }
        }

        let mut bytes = record.params.requested_bytes;
        if let Some(image) = record.params.source_image.clone() {
            let info = match self.collab.inventory.resolve_image(&image).await {
                Ok(Some(info)) => info,
                Ok(None) => {
                    return Err(EngineError::Validation(format!(
                        "image '{image}' does not exist"
                    )));
                }
                Err(e) => {
                    error!(command = %record.id, error = %e, "unable to resolve image from the inventory");
                    return Err(EngineError::Validation(format!(
                        "image '{image}' could not be resolved: {e}"
                    )));
                }
            };
            record
                .job_properties
                .insert("imagename".to_string(), info.name);
            if bytes.is_none() {
                bytes = Some(info.size_bytes);
            }
        }
        record
            .job_properties
            .insert("targetdomain".to_string(), target.to_string());

        // Reserve last: a validation failure must never leave a hold
        if let Some(quota) = record.params.quota.clone() {
            let amount = bytes.ok_or_else(|| {
                EngineError::Validation("quota amount unresolvable: no image size".to_string())
            })?;
            let reservation = self.quota.reserve(quota, record.id, amount).await?;
            record.reservation = Some(reservation.id);
        }

        // Fixed from here on; never renegotiated mid-execution
        record.params.requested_bytes = bytes;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    async fn spawn_worker(self: &Arc<Self>, command: CommandId) {
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            if let Err(e) = engine.drive(command).await {
                error!(command = %command, error = %e, "command worker stopped abnormally");
            }
        });
        let mut workers = self.workers.lock().await;
        workers.retain(|_, h| !h.is_finished());
        workers.insert(command, handle);
    }

    async fn drive(self: Arc<Self>, command: CommandId) -> Result<()> {
        loop {
            let snapshot = {
                let commands = self.commands.read().await;
                commands
                    .get(&command)
                    .cloned()
                    .ok_or(EngineError::CommandNotFound(command))?
            };
            if snapshot.state.is_terminal() {
                return Ok(());
            }
            if !snapshot.succeeded {
                // Recovered mid-rollback; finish the failure path
                let reason = snapshot
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "step failed".to_string());
                return self.finalize_failure(command, reason).await;
            }
            if snapshot.abort_requested {
                return self.finalize_failure(command, "aborted by user".to_string()).await;
            }

            let chain = chain_for(snapshot.kind);
            let index = snapshot.execution_index;
            if index as usize >= chain.len() {
                return self.finalize_success(command).await;
            }
            let spec = chain[index as usize];

            // Idempotent submission: resume a live handle, honor an
            // already-successful one, only otherwise submit fresh.
            let existing = match self.registry.active_for_step(command, index).await {
                Some(live) => Some(live),
                None => match self.registry.latest_for_step(command, index).await {
                    Some(last) if last.status == TaskStatus::Succeeded => {
                        self.complete_step(command, index, spec, &snapshot.params).await?;
                        continue;
                    }
                    Some(last)
                        if last.status == TaskStatus::Failed
                            && interpret_outcome(
                                last.status,
                                last.attempt,
                                self.config.retry_budget,
                            ) == StepOutcome::Failure =>
                    {
                        return self
                            .finalize_failure(
                                command,
                                format!(
                                    "step {} ({}) failed after {} attempts",
                                    index, spec.kind, last.attempt
                                ),
                            )
                            .await;
                    }
                    _ => None,
                },
            };
            let handle = match existing {
                Some(handle) => handle,
                None => match self.submit_step(command, index, spec, &snapshot.params).await {
                    Ok(handle) => handle,
                    Err(e @ EngineError::DuplicateActiveTask { .. }) => {
                        return self.finalize_failure(command, e.to_string()).await;
                    }
                    Err(e) => return Err(e),
                },
            };

            let terminal = self.poll_to_terminal(&handle).await?;
            match terminal {
                TaskStatus::Succeeded => {
                    self.complete_step(command, index, spec, &snapshot.params).await?;
                }
                TaskStatus::Failed => {
                    match interpret_outcome(terminal, handle.attempt, self.config.retry_budget) {
                        StepOutcome::Retry => {
                            warn!(
                                command = %command,
                                step = index,
                                attempt = handle.attempt,
                                "step failed, retrying with a fresh task handle"
                            );
                        }
                        _ => {
                            return self
                                .finalize_failure(
                                    command,
                                    format!(
                                        "step {} ({}) failed after {} attempts",
                                        index, spec.kind, handle.attempt
                                    ),
                                )
                                .await;
                        }
                    }
                }
                other => {
                    return Err(EngineError::Step(format!(
                        "poll loop returned non-terminal status {other}"
                    )));
                }
            }
        }
    }

    /// Register a handle and hand the step to the remote host. A
    /// submission rejection marks the handle FAILED and counts against
    /// the retry budget; it never propagates as a raw collaborator error.
    async fn submit_step(
        &self,
        command: CommandId,
        index: u32,
        spec: StepSpec,
        params: &CommandParams,
    ) -> Result<TaskHandle> {
        let handle = match self.registry.register(command, index, spec.kind).await {
            Ok(handle) => handle,
            Err(e @ EngineError::DuplicateActiveTask { .. }) => {
                // Registry/state-machine desynchronization; never ignored
                error!(command = %command, step = index, error = %e, "duplicate active task detected");
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        self.log(JournalEntry::TaskRegistered(handle.clone())).await?;

        let payload = build_payload(spec.kind, params);
        match self.collab.remote.submit_step(spec.kind, &payload).await {
            Ok(remote) => {
                self.registry.bind_remote(handle.id, remote.clone()).await?;
                self.log(JournalEntry::TaskRemoteBound {
                    task: handle.id,
                    remote,
                })
                .await?;
                self.set_task_status(handle.id, TaskStatus::Running).await?;
            }
            Err(e) => {
                warn!(command = %command, step = index, error = %e, "remote submission failed");
                self.set_task_status(handle.id, TaskStatus::Failed).await?;
            }
        }

        self.registry
            .get(handle.id)
            .await
            .ok_or(EngineError::TaskNotFound(handle.id))
    }

    /// Suspend-and-poll until the handle is terminal. A handle with no
    /// status change within the step timeout is marked FAILED; the remote
    /// operation itself is not assumed cancelled.
    async fn poll_to_terminal(&self, handle: &TaskHandle) -> Result<TaskStatus> {
        if handle.status.is_terminal() {
            return Ok(handle.status);
        }
        let remote = match &handle.remote {
            Some(remote) => remote.clone(),
            // Registered but never accepted remotely (e.g. crash between
            // register and submit): count as a failed attempt
            None => return self.set_task_status(handle.id, TaskStatus::Failed).await,
        };

        loop {
            let current = self
                .registry
                .get(handle.id)
                .await
                .ok_or(EngineError::TaskNotFound(handle.id))?;
            if current.status.is_terminal() {
                return Ok(current.status);
            }

            let idle_ms = chrono::Utc::now().timestamp_millis() - current.updated_at_ms;
            if idle_ms >= self.config.step_timeout.as_millis() as i64 {
                warn!(
                    command = %handle.command,
                    step = handle.step,
                    task = %handle.id,
                    "step timed out without a status change, treating as failed"
                );
                return self.set_task_status(handle.id, TaskStatus::Failed).await;
            }

            tokio::time::sleep(self.config.poll_interval).await;

            match self.collab.remote.poll_status(&remote).await {
                Ok(status) => {
                    let status: TaskStatus = status.into();
                    // Only a change counts as an update; a steady RUNNING
                    // stream still runs into the timeout
                    if status != current.status {
                        let effective = self.set_task_status(handle.id, status).await?;
                        if effective.is_terminal() {
                            return Ok(effective);
                        }
                    }
                }
                Err(e) => {
                    warn!(task = %handle.id, error = %e, "remote status poll failed");
                }
            }
        }
    }

    /// Record a step's terminal success: push its inverse action, then
    /// persist the advanced execution index before the next step starts.
    async fn complete_step(
        &self,
        command: CommandId,
        index: u32,
        spec: StepSpec,
        params: &CommandParams,
    ) -> Result<()> {
        if let Some(inverse) = spec.compensation {
            let already_pushed = self
                .compensation
                .entries_for(command)
                .await
                .iter()
                .any(|e| e.step == index);
            if !already_pushed {
                let entry = CompensationEntry::new(
                    command,
                    index,
                    inverse,
                    build_compensation_payload(spec.kind, params),
                );
                self.compensation.push(entry.clone()).await;
                self.log(JournalEntry::CompensationPushed(entry)).await?;
            }
        }

        let new_index = {
            let mut commands = self.commands.write().await;
            let record = commands
                .get_mut(&command)
                .ok_or(EngineError::CommandNotFound(command))?;
            record.advance();
            record.execution_index
        };
        self.log(JournalEntry::ExecutionIndexAdvanced {
            command,
            index: new_index,
        })
        .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Finalization
    // ------------------------------------------------------------------

    async fn finalize_success(&self, command: CommandId) -> Result<()> {
        let active = self.registry.list_active(command).await;
        if !active.is_empty() {
            // Invariant: never END_SUCCESS with a non-terminal handle
            return Err(EngineError::Step(format!(
                "command {command} has {} non-terminal tasks at completion",
                active.len()
            )));
        }

        let record = {
            let mut commands = self.commands.write().await;
            let record = commands
                .get_mut(&command)
                .ok_or(EngineError::CommandNotFound(command))?;
            record.finish(true)?;
            record.clone()
        };
        self.log(JournalEntry::CommandStateChanged {
            command,
            state: record.state,
            succeeded: record.succeeded,
            last_error: record.last_error.clone(),
        })
        .await?;

        if let Some(reservation) = record.reservation {
            self.quota.confirm(reservation).await?;
            self.log(JournalEntry::ReservationClosed {
                reservation,
                state: ReservationState::Consumed,
            })
            .await?;
        }
        self.compensation.discard(command).await;

        info!(command = %command, "command finished successfully");
        self.emit_audit(&record).await;
        self.maybe_checkpoint().await;
        Ok(())
    }

    async fn finalize_failure(&self, command: CommandId, reason: String) -> Result<()> {
        // Mark the failure durably before compensating so a crash during
        // rollback resumes on the failure path, not the step loop
        let record = {
            let mut commands = self.commands.write().await;
            let record = commands
                .get_mut(&command)
                .ok_or(EngineError::CommandNotFound(command))?;
            record.succeeded = false;
            record.last_error = Some(reason.clone());
            record.clone()
        };
        self.log(JournalEntry::CommandStateChanged {
            command,
            state: record.state,
            succeeded: false,
            last_error: Some(reason.clone()),
        })
        .await?;

        self.compensate(command).await?;

        if let Some(reservation) = record.reservation {
            self.quota.release(reservation).await?;
            self.log(JournalEntry::ReservationClosed {
                reservation,
                state: ReservationState::Released,
            })
            .await?;
        }

        let record = {
            let mut commands = self.commands.write().await;
            let record = commands
                .get_mut(&command)
                .ok_or(EngineError::CommandNotFound(command))?;
            record.finish(false)?;
            record.clone()
        };
        self.log(JournalEntry::CommandStateChanged {
            command,
            state: record.state,
            succeeded: false,
            last_error: record.last_error.clone(),
        })
        .await?;

        warn!(command = %command, reason = %reason, "command finished with failure");
        self.emit_audit(&record).await;
        self.maybe_checkpoint().await;
        Ok(())
    }

    /// Drain the compensation ledger in strict reverse completion order.
    /// Each inverse action's failure is recorded and logged but never
    /// halts the remainder.
    async fn compensate(&self, command: CommandId) -> Result<()> {
        for entry in self.compensation.take(command).await {
            if entry.result != UndoResult::Pending {
                continue;
            }
            let result = match self.run_inverse(&entry).await {
                Ok(()) => UndoResult::Undone,
                Err(e) => {
                    warn!(
                        command = %command,
                        step = entry.step,
                        action = %entry.action,
                        error = %e,
                        "compensation action failed"
                    );
                    UndoResult::UndoFailed(e.to_string())
                }
            };
            self.log(JournalEntry::CompensationResolved {
                command,
                step: entry.step,
                result,
            })
            .await?;
        }
        Ok(())
    }

    async fn run_inverse(&self, entry: &CompensationEntry) -> Result<()> {
        let remote = self
            .collab
            .remote
            .submit_step(entry.action, &entry.payload)
            .await
            .map_err(|e| EngineError::Compensation(format!("submission failed: {e}")))?;

        let deadline =
            chrono::Utc::now().timestamp_millis() + self.config.step_timeout.as_millis() as i64;
        loop {
            match self.collab.remote.poll_status(&remote).await {
                Ok(RemoteStepStatus::Succeeded) => return Ok(()),
                Ok(RemoteStepStatus::Failed) => {
                    return Err(EngineError::Compensation(format!(
                        "inverse action {} reported failure",
                        entry.action
                    )));
                }
                Ok(RemoteStepStatus::Running) => {}
                Err(e) => {
                    warn!(error = %e, "compensation status poll failed");
                }
            }
            if chrono::Utc::now().timestamp_millis() >= deadline {
                return Err(EngineError::Compensation(format!(
                    "inverse action {} timed out",
                    entry.action
                )));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    async fn set_task_status(&self, task: crate::core::TaskId, status: TaskStatus) -> Result<TaskStatus> {
        let effective = self.registry.update_status(task, status).await?;
        self.log(JournalEntry::TaskStatusChanged {
            task,
            status: effective,
        })
        .await?;
        Ok(effective)
    }

    async fn log(&self, entry: JournalEntry) -> Result<()> {
        self.journal.lock().await.log(&entry)
    }

    /// The journal lock is held across the state dump and the WAL
    /// truncation. `log` serializes on the same lock, so no entry can
    /// land in the WAL between the dump and the clear and get truncated
    /// out from under a snapshot that predates it.
    async fn maybe_checkpoint(&self) {
        let mut journal = self.journal.lock().await;
        if !journal.needs_checkpoint() {
            return;
        }
        let snapshot = EngineSnapshot::new(
            self.commands.read().await.clone(),
            self.registry.dump().await,
            self.quota.dump().await,
            self.compensation.dump().await,
        );
        if let Err(e) = journal.checkpoint(&snapshot) {
            warn!(error = %e, "checkpoint failed, keeping WAL");
        }
    }

    /// Every terminal state yields exactly one audit record; sink faults
    /// are logged, never propagated.
    async fn emit_audit(&self, record: &CommandRecord) {
        let kind = classify(record.state, record.any_step_ran, record.succeeded);
        if kind == AuditKind::Unassigned {
            return;
        }
        let audit = AuditRecord::new(kind, record.id, record.job_properties.clone());
        if let Err(e) = self.collab.audit.record(&audit).await {
            warn!(command = %record.id, error = %e, "audit sink rejected record");
        }
    }
}

/// Capability subjects checked during validation, per command kind
fn permission_subjects(kind: CommandKind, params: &CommandParams) -> Vec<(EntityId, Capability)> {
    let mut subjects = Vec::new();
    match kind {
        CommandKind::ImportImage | CommandKind::ExportImage => {
            subjects.push((params.target_domain.clone(), Capability::CreateDisk));
            if let Some(source) = &params.source_domain {
                subjects.push((source.clone(), Capability::AccessImageStorage));
            }
        }
        CommandKind::RemoveImage => {
            subjects.push((params.target_domain.clone(), Capability::DeleteDisk));
        }
    }
    subjects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandParams;

    #[test]
    fn test_permission_subjects_per_kind() {
        let params = CommandParams::new("admin", "dom-1").source_domain("dom-src");
        let subjects = permission_subjects(CommandKind::ImportImage, &params);
        assert_eq!(
            subjects,
            vec![
                (EntityId::from("dom-1"), Capability::CreateDisk),
                (EntityId::from("dom-src"), Capability::AccessImageStorage),
            ]
        );

        let subjects = permission_subjects(CommandKind::RemoveImage, &params);
        assert_eq!(subjects, vec![(EntityId::from("dom-1"), Capability::DeleteDisk)]);
    }
}
