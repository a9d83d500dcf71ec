use crate::core::{CommandId, EntityId, QuotaId};
use serde::{Deserialize, Serialize};

/// Immutable input snapshot of a command, captured at creation.
///
/// Nothing in here changes after `submit`; mutable progress lives on the
/// `CommandRecord` (execution index, state, flags).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandParams {
    /// User on whose behalf the command runs
    pub subject: EntityId,

    /// Destination storage domain
    pub target_domain: EntityId,

    /// Source storage domain, for operations that read from one
    pub source_domain: Option<EntityId>,

    /// Source image being imported/exported/removed
    pub source_image: Option<EntityId>,

    /// Quota charged for the storage the command consumes
    pub quota: Option<QuotaId>,

    /// Requested storage size in bytes. When absent the size is resolved
    /// from the inventory at validation time and fixed from then on.
    pub requested_bytes: Option<u64>,

    /// Parent command, for sub-commands
    pub parent: Option<CommandId>,
}

impl CommandParams {
    pub fn new(subject: impl Into<EntityId>, target_domain: impl Into<EntityId>) -> Self {
        Self {
            subject: subject.into(),
            target_domain: target_domain.into(),
            source_domain: None,
            source_image: None,
            quota: None,
            requested_bytes: None,
            parent: None,
        }
    }

    pub fn source_domain(mut self, domain: impl Into<EntityId>) -> Self {
        self.source_domain = Some(domain.into());
        self
    }

    pub fn source_image(mut self, image: impl Into<EntityId>) -> Self {
        self.source_image = Some(image.into());
        self
    }

    pub fn quota(mut self, quota: impl Into<QuotaId>) -> Self {
        self.quota = Some(quota.into());
        self
    }

    pub fn requested_bytes(mut self, bytes: u64) -> Self {
        self.requested_bytes = Some(bytes);
        self
    }

    pub fn parent(mut self, parent: CommandId) -> Self {
        self.parent = Some(parent);
        self
    }
}
