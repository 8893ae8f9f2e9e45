//! Application services and ports.

#![forbid(unsafe_code)]

mod derived_field_service;
mod notification_service;
mod permission_resolver;
mod permission_service;
mod ports;
mod process_service;
mod record_mutation_service;
mod schema_service;

#[cfg(test)]
mod test_fakes;

pub use derived_field_service::{
    DerivedFieldReport, DerivedFieldService, LookupError, LookupResolver, RelatedRecord,
    format_calculated_fields,
};
pub use notification_service::NotificationService;
pub use permission_resolver::{
    EffectiveAccess, FieldAccessMap, PermissionRuleSet, access_ceiling, creation_capabilities,
    pick_highest_priority, record_target_matches, reorder_priorities, resolve_app_capabilities,
    resolve_effective_access, resolve_field_access, resolve_record_capabilities, target_matches,
};
pub use permission_service::{PermissionService, RuleKind};
pub use ports::{
    NotificationDispatcher, NotificationRuleRepository, PermissionRepository, ProcessRepository,
    RecordFilter, RecordStore, SchemaRepository,
};
pub use process_service::{ProcessService, TransitionOutcome};
pub use record_mutation_service::{
    ActionOutcome, MutationOutcome, RecordMutationService, RecordView,
};
pub use schema_service::SchemaService;
