pub mod audit;
pub mod params;
pub mod record;

pub use audit::{AuditKind, AuditRecord, classify};
pub use params::CommandParams;
pub use record::{CommandRecord, CommandStatus};
