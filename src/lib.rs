// ============================================================================
// cmdflow Library
// ============================================================================

//! Asynchronous command orchestration engine.
//!
//! One logical user operation (a command) is decomposed into an ordered
//! chain of remotely-executed steps, each tracked by a durable task
//! handle. The engine validates preconditions, reserves quota, drives the
//! chain step by step, and resolves every command to exactly one terminal
//! outcome, running compensation and releasing the reservation on
//! failure. Progress is journaled, so a restarted process resumes
//! mid-chain instead of re-running completed steps.
//!
//! # Examples
//!
//! ```no_run
//! use cmdflow::{Collaborators, CommandEngine, CommandKind, CommandParams, EngineConfig};
//! use cmdflow::gates::memory::{
//!     FixedQuotaAuthority, MemoryAuditSink, MemoryInventory, MemoryPermissions, MemoryRemote,
//! };
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let inventory = Arc::new(MemoryInventory::new());
//! inventory.add_image("img-1", "fedora-cloud", 8 * 1024 * 1024 * 1024);
//!
//! let collab = Collaborators {
//!     permissions: Arc::new(MemoryPermissions::allow_all()),
//!     remote: Arc::new(MemoryRemote::new()),
//!     quota: Arc::new(FixedQuotaAuthority::new([("gold", 100 * 1024 * 1024 * 1024)])),
//!     audit: Arc::new(MemoryAuditSink::new()),
//!     inventory,
//! };
//!
//! let engine = CommandEngine::open(EngineConfig::new("/var/lib/cmdflow"), collab)
//!     .await
//!     .unwrap();
//! engine.resume().await;
//!
//! let id = engine
//!     .submit(
//!         CommandKind::ImportImage,
//!         CommandParams::new("admin", "dom-1")
//!             .source_image("img-1")
//!             .quota("gold"),
//!     )
//!     .await
//!     .unwrap();
//!
//! let status = engine.wait_terminal(id).await.unwrap();
//! println!("command {} ended in {}", id, status.state);
//! # });
//! ```

pub mod command;
pub mod config;
pub mod core;
pub mod engine;
pub mod gates;
pub mod handler;
pub mod journal;
pub mod quota;
pub mod registry;
pub mod rollback;

// Re-export main types for convenience
pub use command::{AuditKind, AuditRecord, CommandParams, CommandStatus};
pub use config::EngineConfig;
pub use core::{
    Capability, CommandId, CommandKind, CommandState, EngineError, EntityId, QuotaId, RemoteId,
    Result, StepKind, TaskId, TaskStatus,
};
pub use engine::{Collaborators, CommandEngine};
pub use journal::DurabilityMode;
pub use registry::TaskHandle;

#[cfg(test)]
mod tests {
    use crate::gates::memory::{
        FixedQuotaAuthority, MemoryAuditSink, MemoryInventory, MemoryPermissions, MemoryRemote,
    };
    use crate::journal::DurabilityMode;
    use crate::{
        Collaborators, CommandEngine, CommandKind, CommandParams, CommandState, EngineConfig,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn collaborators() -> (Collaborators, Arc<MemoryInventory>) {
        let inventory = Arc::new(MemoryInventory::new());
        inventory.add_image("img-1", "fedora-cloud", 1024);
        let collab = Collaborators {
            permissions: Arc::new(MemoryPermissions::allow_all()),
            remote: Arc::new(MemoryRemote::new()),
            quota: Arc::new(FixedQuotaAuthority::new([("gold", 10_000)])),
            audit: Arc::new(MemoryAuditSink::new()),
            inventory: inventory.clone(),
        };
        (collab, inventory)
    }

    #[tokio::test]
    async fn test_import_image_smoke() {
        let dir = TempDir::new().unwrap();
        let (collab, _inventory) = collaborators();
        let config = EngineConfig::new(dir.path())
            .durability(DurabilityMode::None)
            .poll_interval(Duration::from_millis(5));
        let engine = CommandEngine::open(config, collab).await.unwrap();

        let id = engine
            .submit(
                CommandKind::ImportImage,
                CommandParams::new("admin", "dom-1")
                    .source_image("img-1")
                    .quota("gold"),
            )
            .await
            .unwrap();

        let status = engine.wait_terminal(id).await.unwrap();
        assert_eq!(status.state, CommandState::EndSuccess);
        assert_eq!(status.last_error, None);
    }

    #[tokio::test]
    async fn test_job_properties_resolved_at_validation() {
        let dir = TempDir::new().unwrap();
        let (collab, _inventory) = collaborators();
        let config = EngineConfig::new(dir.path())
            .durability(DurabilityMode::None)
            .poll_interval(Duration::from_millis(5));
        let engine = CommandEngine::open(config, collab).await.unwrap();

        let id = engine
            .submit(
                CommandKind::ImportImage,
                CommandParams::new("admin", "dom-1").source_image("img-1"),
            )
            .await
            .unwrap();

        let properties = engine.get_job_properties(id).await.unwrap();
        assert_eq!(properties.get("imagename").map(String::as_str), Some("fedora-cloud"));
        assert_eq!(properties.get("targetdomain").map(String::as_str), Some("dom-1"));
        engine.wait_terminal(id).await.unwrap();
    }
}
