mod definitions;
mod notifications;
mod records;

pub use definitions::{
    NotificationRuleRepository, PermissionRepository, ProcessRepository, SchemaRepository,
};
pub use notifications::NotificationDispatcher;
pub use records::{RecordFilter, RecordStore};
