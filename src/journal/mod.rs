//! Write-ahead journal and snapshotting for the engine's durable state

use crate::command::CommandRecord;
use crate::core::{
    CommandId, CommandState, EngineError, RemoteId, ReservationId, Result, TaskId, TaskStatus,
};
use crate::quota::{QuotaReservation, ReservationState};
use crate::registry::TaskHandle;
use crate::rollback::{CompensationEntry, UndoResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

// ============================================================================
// Journal Entry Types
// ============================================================================

/// One durable state change. Every mutation the engine must survive a
/// restart with is appended here before it takes user-visible effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JournalEntry {
    CommandCreated(CommandRecord),
    CommandStateChanged {
        command: CommandId,
        state: CommandState,
        succeeded: bool,
        last_error: Option<String>,
    },
    /// Persisted after a step's terminal success and before the next step
    /// starts; replay resumes at this index
    ExecutionIndexAdvanced {
        command: CommandId,
        index: u32,
    },
    AbortRequested {
        command: CommandId,
    },
    TaskRegistered(TaskHandle),
    TaskRemoteBound {
        task: TaskId,
        remote: RemoteId,
    },
    TaskStatusChanged {
        task: TaskId,
        status: TaskStatus,
    },
    ReservationCreated(QuotaReservation),
    ReservationClosed {
        reservation: ReservationId,
        state: ReservationState,
    },
    CompensationPushed(CompensationEntry),
    CompensationResolved {
        command: CommandId,
        step: u32,
        result: UndoResult,
    },
}

// ============================================================================
// Engine Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub version: u32,
    pub commands: HashMap<CommandId, CommandRecord>,
    pub tasks: HashMap<TaskId, TaskHandle>,
    pub reservations: HashMap<ReservationId, QuotaReservation>,
    /// Per command, in original push order
    pub compensations: HashMap<CommandId, Vec<CompensationEntry>>,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: u64,
    pub command_count: usize,
    pub task_count: usize,
}

impl EngineSnapshot {
    pub fn new(
        commands: HashMap<CommandId, CommandRecord>,
        tasks: HashMap<TaskId, TaskHandle>,
        reservations: HashMap<ReservationId, QuotaReservation>,
        compensations: HashMap<CommandId, Vec<CompensationEntry>>,
    ) -> Self {
        let command_count = commands.len();
        let task_count = tasks.len();
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            version: 1,
            commands,
            tasks,
            reservations,
            compensations,
            metadata: SnapshotMetadata {
                created_at,
                command_count,
                task_count,
            },
        }
    }
}

/// In-memory image of the durable state, rebuilt on recovery
#[derive(Debug, Default)]
pub struct EngineMemory {
    pub commands: HashMap<CommandId, CommandRecord>,
    pub tasks: HashMap<TaskId, TaskHandle>,
    pub reservations: HashMap<ReservationId, QuotaReservation>,
    /// In original push order across the whole journal
    pub compensations: Vec<CompensationEntry>,
}

// ============================================================================
// Durability Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// fsync every appended frame
    Sync,
    #[default]
    Async,
    /// No journal at all; restart loses everything
    None,
}

// ============================================================================
// WAL Manager
// ============================================================================

pub struct WalManager {
    wal_path: PathBuf,
    wal_file: Option<BufWriter<File>>,
    durability_mode: DurabilityMode,
    entries_since_checkpoint: usize,
    checkpoint_threshold: usize,
}

impl WalManager {
    pub fn new<P: AsRef<Path>>(wal_path: P, durability_mode: DurabilityMode) -> Result<Self> {
        let wal_path = wal_path.as_ref().to_path_buf();
        if let Some(parent) = wal_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| EngineError::Storage(format!("Failed to create WAL directory: {e}")))?;
        }

        let wal_file = if durability_mode != DurabilityMode::None {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&wal_path)
                .map_err(|e| EngineError::Storage(format!("Failed to open WAL file: {e}")))?;
            Some(BufWriter::new(file))
        } else {
            None
        };

        Ok(Self {
            wal_path,
            wal_file,
            durability_mode,
            entries_since_checkpoint: 0,
            checkpoint_threshold: 1000,
        })
    }

    pub fn append(&mut self, entry: &JournalEntry) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        let file = self
            .wal_file
            .as_mut()
            .ok_or_else(|| EngineError::Storage("WAL file not initialized".to_string()))?;
        let serialized = rmp_serde::to_vec(entry)
            .map_err(|e| EngineError::Storage(format!("Failed to serialize WAL entry: {e}")))?;
        let len = serialized.len() as u32;
        file.write_all(&len.to_le_bytes())
            .map_err(|e| EngineError::Storage(format!("Failed to write WAL: {e}")))?;
        file.write_all(&serialized)
            .map_err(|e| EngineError::Storage(format!("Failed to write WAL: {e}")))?;
        file.flush()
            .map_err(|e| EngineError::Storage(format!("Failed to flush WAL: {e}")))?;
        if self.durability_mode == DurabilityMode::Sync {
            file.get_mut()
                .sync_all()
                .map_err(|e| EngineError::Storage(format!("Failed to sync WAL: {e}")))?;
        }
        self.entries_since_checkpoint += 1;
        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<JournalEntry>> {
        if !self.wal_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.wal_path)
            .map_err(|e| EngineError::Storage(format!("Failed to open WAL for reading: {e}")))?;
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    return Err(EngineError::Storage(format!(
                        "Failed to read WAL entry length: {e}"
                    )));
                }
            }
            let len = u32::from_le_bytes(len_bytes) as usize;
            let mut data = vec![0u8; len];
            reader
                .read_exact(&mut data)
                .map_err(|e| EngineError::Storage(format!("Failed to read WAL entry data: {e}")))?;
            let entry: JournalEntry = rmp_serde::from_slice(&data).map_err(|e| {
                EngineError::Storage(format!("Failed to deserialize WAL entry: {e}"))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn clear(&mut self) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        self.wal_file = None;
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.wal_path)
            .map_err(|e| EngineError::Storage(format!("Failed to truncate WAL: {e}")))?;
        self.wal_file = Some(BufWriter::new(file));
        self.entries_since_checkpoint = 0;
        Ok(())
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.entries_since_checkpoint >= self.checkpoint_threshold
    }

    pub fn entries_since_checkpoint(&self) -> usize {
        self.entries_since_checkpoint
    }

    pub fn set_checkpoint_threshold(&mut self, threshold: usize) {
        self.checkpoint_threshold = threshold;
    }
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    pub fn save(&self, snapshot: &EngineSnapshot) -> Result<()> {
        let parent = self
            .snapshot_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&parent)
            .map_err(|e| EngineError::Storage(format!("Failed to create snapshot directory: {e}")))?;

        let serialized = rmp_serde::to_vec(snapshot)
            .map_err(|e| EngineError::Storage(format!("Failed to serialize snapshot: {e}")))?;

        // Stage in the same directory so the rename stays atomic
        let mut staged = tempfile::NamedTempFile::new_in(&parent)
            .map_err(|e| EngineError::Storage(format!("Failed to create temp file: {e}")))?;
        staged
            .write_all(&serialized)
            .map_err(|e| EngineError::Storage(format!("Failed to write snapshot: {e}")))?;
        staged
            .as_file()
            .sync_all()
            .map_err(|e| EngineError::Storage(format!("Failed to sync snapshot: {e}")))?;
        staged
            .persist(&self.snapshot_path)
            .map_err(|e| EngineError::Storage(format!("Failed to persist snapshot: {e}")))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<EngineSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&self.snapshot_path)
            .map_err(|e| EngineError::Storage(format!("Failed to open snapshot: {e}")))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| EngineError::Storage(format!("Failed to read snapshot: {e}")))?;
        let snapshot: EngineSnapshot = rmp_serde::from_slice(&data)
            .map_err(|e| EngineError::Storage(format!("Failed to deserialize snapshot: {e}")))?;
        Ok(Some(snapshot))
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }
}

// ============================================================================
// Journal
// ============================================================================

pub struct Journal {
    wal: WalManager,
    snapshot: SnapshotManager,
    durability_mode: DurabilityMode,
}

impl Journal {
    pub fn new<P: AsRef<Path>>(data_dir: P, durability_mode: DurabilityMode) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let wal_path = data_dir.join("cmdflow.wal");
        let snapshot_path = data_dir.join("cmdflow.snapshot");
        let wal = WalManager::new(wal_path, durability_mode)?;
        let snapshot = SnapshotManager::new(snapshot_path);
        Ok(Self {
            wal,
            snapshot,
            durability_mode,
        })
    }

    pub fn log(&mut self, entry: &JournalEntry) -> Result<()> {
        self.wal.append(entry)
    }

    pub fn checkpoint(&mut self, snapshot: &EngineSnapshot) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        self.snapshot.save(snapshot)?;
        self.wal.clear()?;
        Ok(())
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.wal.needs_checkpoint()
    }

    pub fn set_checkpoint_threshold(&mut self, threshold: usize) {
        self.wal.set_checkpoint_threshold(threshold);
    }

    /// Rebuild the durable state: load the last snapshot, then apply the
    /// WAL on top. Returns `None` when neither exists.
    pub fn recover(&self) -> Result<Option<EngineMemory>> {
        let mut memory = EngineMemory::default();
        let mut found = false;

        if let Some(snapshot) = self.snapshot.load()? {
            found = true;
            memory.commands = snapshot.commands;
            memory.tasks = snapshot.tasks;
            memory.reservations = snapshot.reservations;
            let mut commands: Vec<_> = snapshot.compensations.into_iter().collect();
            commands.sort_by_key(|(id, _)| *id);
            for (_, entries) in commands {
                memory.compensations.extend(entries);
            }
        }

        let wal_entries = self.wal.read_all()?;
        if !wal_entries.is_empty() {
            found = true;
        }
        for entry in wal_entries {
            apply(&mut memory, entry);
        }

        Ok(if found { Some(memory) } else { None })
    }

    pub fn wal(&self) -> &WalManager {
        &self.wal
    }
}

fn apply(memory: &mut EngineMemory, entry: JournalEntry) {
    match entry {
        JournalEntry::CommandCreated(record) => {
            memory.commands.insert(record.id, record);
        }
        JournalEntry::CommandStateChanged {
            command,
            state,
            succeeded,
            last_error,
        } => {
            if let Some(record) = memory.commands.get_mut(&command) {
                record.state = state;
                record.succeeded = succeeded;
                record.last_error = last_error;
            }
        }
        JournalEntry::ExecutionIndexAdvanced { command, index } => {
            if let Some(record) = memory.commands.get_mut(&command) {
                record.execution_index = index;
                record.any_step_ran = true;
            }
        }
        JournalEntry::AbortRequested { command } => {
            if let Some(record) = memory.commands.get_mut(&command) {
                record.abort_requested = true;
            }
        }
        JournalEntry::TaskRegistered(handle) => {
            memory.tasks.insert(handle.id, handle);
        }
        JournalEntry::TaskRemoteBound { task, remote } => {
            if let Some(handle) = memory.tasks.get_mut(&task) {
                if handle.remote.is_none() {
                    handle.remote = Some(remote);
                }
            }
        }
        JournalEntry::TaskStatusChanged { task, status } => {
            if let Some(handle) = memory.tasks.get_mut(&task) {
                // Replay honors the same monotonicity as the live registry
                if !handle.status.is_terminal() {
                    handle.status = status;
                    handle.updated_at_ms = chrono::Utc::now().timestamp_millis();
                }
            }
        }
        JournalEntry::ReservationCreated(reservation) => {
            memory.reservations.insert(reservation.id, reservation);
        }
        JournalEntry::ReservationClosed { reservation, state } => {
            if let Some(existing) = memory.reservations.get_mut(&reservation) {
                if existing.state == ReservationState::Held {
                    existing.state = state;
                }
            }
        }
        JournalEntry::CompensationPushed(entry) => {
            memory.compensations.push(entry);
        }
        JournalEntry::CompensationResolved {
            command,
            step,
            result,
        } => {
            if let Some(entry) = memory
                .compensations
                .iter_mut()
                .find(|e| e.command == command && e.step == step && e.result == UndoResult::Pending)
            {
                entry.result = result;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandParams, CommandRecord};
    use crate::core::{CommandKind, StepKind};
    use tempfile::TempDir;

    fn sample_command() -> CommandRecord {
        CommandRecord::new(
            CommandKind::ImportImage,
            CommandParams::new("admin", "dom-1").requested_bytes(512),
        )
    }

    #[test]
    fn test_wal_append_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("test.wal");
        let mut wal = WalManager::new(&wal_path, DurabilityMode::Sync).unwrap();

        let record = sample_command();
        wal.append(&JournalEntry::CommandCreated(record.clone()))
            .unwrap();
        wal.append(&JournalEntry::ExecutionIndexAdvanced {
            command: record.id,
            index: 1,
        })
        .unwrap();

        let entries = wal.read_all().unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_snapshot_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot_path = temp_dir.path().join("test.snapshot");
        let snapshot_mgr = SnapshotManager::new(&snapshot_path);

        let record = sample_command();
        let mut commands = HashMap::new();
        commands.insert(record.id, record);
        let snapshot =
            EngineSnapshot::new(commands, HashMap::new(), HashMap::new(), HashMap::new());
        snapshot_mgr.save(&snapshot).unwrap();
        assert!(snapshot_mgr.exists());

        let loaded = snapshot_mgr.load().unwrap().unwrap();
        assert_eq!(loaded.metadata.command_count, 1);
    }

    #[test]
    fn test_checkpoint_clears_wal() {
        let temp_dir = TempDir::new().unwrap();
        let mut journal = Journal::new(temp_dir.path(), DurabilityMode::Sync).unwrap();

        let record = sample_command();
        journal
            .log(&JournalEntry::CommandCreated(record))
            .unwrap();
        assert_eq!(journal.wal().entries_since_checkpoint(), 1);

        let snapshot =
            EngineSnapshot::new(HashMap::new(), HashMap::new(), HashMap::new(), HashMap::new());
        journal.checkpoint(&snapshot).unwrap();
        assert_eq!(journal.wal().entries_since_checkpoint(), 0);
    }

    #[test]
    fn test_recover_replays_wal_over_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let mut journal = Journal::new(temp_dir.path(), DurabilityMode::Sync).unwrap();

        let mut record = sample_command();
        record.begin_executing().unwrap();
        journal
            .log(&JournalEntry::CommandCreated(record.clone()))
            .unwrap();
        journal
            .log(&JournalEntry::ExecutionIndexAdvanced {
                command: record.id,
                index: 1,
            })
            .unwrap();

        let memory = journal.recover().unwrap().unwrap();
        let recovered = &memory.commands[&record.id];
        assert_eq!(recovered.state, CommandState::Executing);
        assert_eq!(recovered.execution_index, 1);
        assert!(recovered.any_step_ran);
    }

    #[test]
    fn test_recover_empty_dir_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let journal = Journal::new(temp_dir.path(), DurabilityMode::Sync).unwrap();
        assert!(journal.recover().unwrap().is_none());
    }

    #[test]
    fn test_replay_keeps_terminal_task_status() {
        let temp_dir = TempDir::new().unwrap();
        let mut journal = Journal::new(temp_dir.path(), DurabilityMode::Sync).unwrap();

        let record = sample_command();
        let handle = TaskHandle {
            id: crate::core::TaskId::new(),
            command: record.id,
            step: 0,
            kind: StepKind::CreateImage,
            remote: None,
            status: TaskStatus::Pending,
            attempt: 1,
            updated_at_ms: 0,
        };
        journal
            .log(&JournalEntry::TaskRegistered(handle.clone()))
            .unwrap();
        journal
            .log(&JournalEntry::TaskStatusChanged {
                task: handle.id,
                status: TaskStatus::Succeeded,
            })
            .unwrap();
        // A stale non-terminal update after the terminal one must not win
        journal
            .log(&JournalEntry::TaskStatusChanged {
                task: handle.id,
                status: TaskStatus::Running,
            })
            .unwrap();

        let memory = journal.recover().unwrap().unwrap();
        assert_eq!(memory.tasks[&handle.id].status, TaskStatus::Succeeded);
    }

    #[test]
    fn test_durability_none_skips_files() {
        let temp_dir = TempDir::new().unwrap();
        let mut journal = Journal::new(temp_dir.path(), DurabilityMode::None).unwrap();
        journal
            .log(&JournalEntry::CommandCreated(sample_command()))
            .unwrap();
        assert!(journal.recover().unwrap().is_none());
    }
}
