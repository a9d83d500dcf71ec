// ============================================================================
// Collaborator Gates
// ============================================================================
//
// Interfaces the engine consumes from the surrounding system: permission
// lookup, the remote execution host, the authoritative quota figures, the
// audit sink and the inventory. The engine never implements these; it
// catches their faults at the boundary and converts them into validation
// or step failures, so a collaborator outage can never crash the
// orchestrator.

pub mod memory;

use crate::command::AuditRecord;
use crate::core::{Capability, EntityId, QuotaId, RemoteId, RemoteStepStatus, StepKind};
use async_trait::async_trait;
use serde_json::Value;

/// Pre-execution authorization check
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn check_access(
        &self,
        subject: &EntityId,
        target: &EntityId,
        capability: Capability,
    ) -> anyhow::Result<bool>;
}

/// Client of the remote execution host (the system that actually performs
/// storage-domain operations). The engine only ever submits and polls.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn submit_step(&self, kind: StepKind, payload: &Value) -> anyhow::Result<RemoteId>;

    async fn poll_status(&self, remote: &RemoteId) -> anyhow::Result<RemoteStepStatus>;
}

/// Authoritative capacity figures advising the best-effort reservation
/// check
#[async_trait]
pub trait QuotaAuthority: Send + Sync {
    async fn capacity(&self, quota: &QuotaId) -> anyhow::Result<u64>;
}

/// Terminal-classification sink
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> anyhow::Result<()>;
}

/// Resolved description of an image, used to compute the quota amount and
/// the user-facing display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub name: String,
    pub size_bytes: u64,
}

/// External inventory lookups needed during validation
#[async_trait]
pub trait InventoryGate: Send + Sync {
    /// Resolve an image; `None` when the inventory has no such image
    async fn resolve_image(&self, image: &EntityId) -> anyhow::Result<Option<ImageInfo>>;

    /// Whether the storage pool behind a domain is up and usable
    async fn pool_is_up(&self, domain: &EntityId) -> anyhow::Result<bool>;
}
