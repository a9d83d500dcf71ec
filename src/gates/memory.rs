// ============================================================================
// In-Memory Collaborators
// ============================================================================
//
// Reference implementations of the collaborator gates, backed by plain
// maps. Useful for embedding the engine without a real datacenter behind
// it and for driving the integration suites: the remote host is scripted
// per step kind (succeed, fail N times, hang), and every fault mode the
// engine must tolerate can be switched on.

use super::{AuditSink, ImageInfo, InventoryGate, PermissionGate, QuotaAuthority, RemoteClient};
use crate::command::AuditRecord;
use crate::core::{Capability, EntityId, QuotaId, RemoteId, RemoteStepStatus, StepKind};
use anyhow::bail;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

// ----------------------------------------------------------------------------
// Permissions
// ----------------------------------------------------------------------------

/// Permission gate over an explicit deny list. Allows everything by
/// default; can be flipped to simulate an unreachable directory.
#[derive(Default)]
pub struct MemoryPermissions {
    denied: Mutex<HashSet<(EntityId, Capability)>>,
    unreachable: AtomicBool,
}

impl MemoryPermissions {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn deny(&self, target: impl Into<EntityId>, capability: Capability) {
        self.denied
            .lock()
            .unwrap()
            .insert((target.into(), capability));
    }

    /// Make every lookup fail, as an unreachable permission store would
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl PermissionGate for MemoryPermissions {
    async fn check_access(
        &self,
        _subject: &EntityId,
        target: &EntityId,
        capability: Capability,
    ) -> anyhow::Result<bool> {
        if self.unreachable.load(Ordering::SeqCst) {
            bail!("permission store unreachable");
        }
        let denied = self.denied.lock().unwrap();
        Ok(!denied.contains(&(target.clone(), capability)))
    }
}

// ----------------------------------------------------------------------------
// Quota authority
// ----------------------------------------------------------------------------

/// Authority with a fixed capacity per quota id
pub struct FixedQuotaAuthority {
    capacities: HashMap<QuotaId, u64>,
    unreachable: AtomicBool,
}

impl FixedQuotaAuthority {
    pub fn new<I, Q>(capacities: I) -> Self
    where
        I: IntoIterator<Item = (Q, u64)>,
        Q: Into<QuotaId>,
    {
        Self {
            capacities: capacities
                .into_iter()
                .map(|(q, c)| (q.into(), c))
                .collect(),
            unreachable: AtomicBool::new(false),
        }
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl QuotaAuthority for FixedQuotaAuthority {
    async fn capacity(&self, quota: &QuotaId) -> anyhow::Result<u64> {
        if self.unreachable.load(Ordering::SeqCst) {
            bail!("quota authority unreachable");
        }
        match self.capacities.get(quota) {
            Some(capacity) => Ok(*capacity),
            None => bail!("unknown quota '{quota}'"),
        }
    }
}

// ----------------------------------------------------------------------------
// Audit sink
// ----------------------------------------------------------------------------

/// Sink that collects audit records for inspection
#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: &AuditRecord) -> anyhow::Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Inventory
// ----------------------------------------------------------------------------

/// Inventory over explicit image and pool maps
#[derive(Default)]
pub struct MemoryInventory {
    images: Mutex<HashMap<EntityId, ImageInfo>>,
    pools_down: Mutex<HashSet<EntityId>>,
    image_lookups_fail: AtomicBool,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_image(&self, id: impl Into<EntityId>, name: impl Into<String>, size_bytes: u64) {
        self.images.lock().unwrap().insert(
            id.into(),
            ImageInfo {
                name: name.into(),
                size_bytes,
            },
        );
    }

    pub fn set_pool_down(&self, domain: impl Into<EntityId>, down: bool) {
        let mut pools = self.pools_down.lock().unwrap();
        let domain = domain.into();
        if down {
            pools.insert(domain);
        } else {
            pools.remove(&domain);
        }
    }

    /// Make image resolution fail, as an unreachable provider would
    pub fn set_image_lookups_fail(&self, fail: bool) {
        self.image_lookups_fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl InventoryGate for MemoryInventory {
    async fn resolve_image(&self, image: &EntityId) -> anyhow::Result<Option<ImageInfo>> {
        if self.image_lookups_fail.load(Ordering::SeqCst) {
            bail!("image provider unreachable");
        }
        Ok(self.images.lock().unwrap().get(image).cloned())
    }

    async fn pool_is_up(&self, domain: &EntityId) -> anyhow::Result<bool> {
        Ok(!self.pools_down.lock().unwrap().contains(domain))
    }
}

// ----------------------------------------------------------------------------
// Remote execution host
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlannedOutcome {
    Succeed,
    Fail,
    Hang,
}

#[derive(Debug)]
struct RemoteOp {
    kind: StepKind,
    polls: u32,
    outcome: PlannedOutcome,
}

#[derive(Default)]
struct RemoteInner {
    next_id: u64,
    ops: HashMap<RemoteId, RemoteOp>,
    fail_budget: HashMap<StepKind, u32>,
    hanging: HashSet<StepKind>,
    submit_errors: HashSet<StepKind>,
    submissions: Vec<(StepKind, Value)>,
}

/// Scripted remote host: every submitted step succeeds on the next poll
/// unless told to fail N times, hang, or reject the submission outright.
#[derive(Default)]
pub struct MemoryRemote {
    inner: Mutex<RemoteInner>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `times` submissions of `kind` will report FAILED
    pub fn fail_next(&self, kind: StepKind, times: u32) {
        self.inner.lock().unwrap().fail_budget.insert(kind, times);
    }

    /// Submissions of `kind` stay RUNNING until `complete_hanging` is
    /// called for them
    pub fn hang(&self, kind: StepKind) {
        self.inner.lock().unwrap().hanging.insert(kind);
    }

    /// Flip every hanging operation of `kind` to SUCCEEDED, modeling a
    /// remote step that completes after the engine already timed it out
    pub fn complete_hanging(&self, kind: StepKind) {
        let mut inner = self.inner.lock().unwrap();
        inner.hanging.remove(&kind);
        for op in inner.ops.values_mut() {
            if op.kind == kind && op.outcome == PlannedOutcome::Hang {
                op.outcome = PlannedOutcome::Succeed;
            }
        }
    }

    /// `submit_step` for `kind` returns an error, as an unreachable host
    /// would
    pub fn reject_submissions(&self, kind: StepKind) {
        self.inner.lock().unwrap().submit_errors.insert(kind);
    }

    /// Every submission seen so far, in order
    pub fn submissions(&self) -> Vec<(StepKind, Value)> {
        self.inner.lock().unwrap().submissions.clone()
    }

    pub fn submissions_of(&self, kind: StepKind) -> usize {
        self.inner
            .lock()
            .unwrap()
            .submissions
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }
}

#[async_trait]
impl RemoteClient for MemoryRemote {
    async fn submit_step(&self, kind: StepKind, payload: &Value) -> anyhow::Result<RemoteId> {
        let mut inner = self.inner.lock().unwrap();
        if inner.submit_errors.contains(&kind) {
            bail!("remote host rejected {kind}");
        }
        inner.submissions.push((kind, payload.clone()));

        let outcome = if let Some(budget) = inner.fail_budget.get_mut(&kind) {
            if *budget > 0 {
                *budget -= 1;
                PlannedOutcome::Fail
            } else {
                PlannedOutcome::Succeed
            }
        } else if inner.hanging.contains(&kind) {
            PlannedOutcome::Hang
        } else {
            PlannedOutcome::Succeed
        };

        inner.next_id += 1;
        let remote = RemoteId::new(format!("rop-{}", inner.next_id));
        inner.ops.insert(
            remote.clone(),
            RemoteOp {
                kind,
                polls: 0,
                outcome,
            },
        );
        Ok(remote)
    }

    async fn poll_status(&self, remote: &RemoteId) -> anyhow::Result<RemoteStepStatus> {
        let mut inner = self.inner.lock().unwrap();
        let op = match inner.ops.get_mut(remote) {
            Some(op) => op,
            None => bail!("unknown remote operation '{remote}'"),
        };
        op.polls += 1;
        let status = match op.outcome {
            PlannedOutcome::Hang => RemoteStepStatus::Running,
            PlannedOutcome::Succeed => RemoteStepStatus::Succeeded,
            PlannedOutcome::Fail => RemoteStepStatus::Failed,
        };
        Ok(status)
    }
}
