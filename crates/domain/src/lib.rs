//! Domain entities, invariants and the pure rule evaluators.

#![forbid(unsafe_code)]

mod condition;
mod field;
mod formula;
mod notification;
mod permission;
mod process;
mod record;
mod schema;

pub use condition::{
    Condition, ConditionGroup, ConditionOperator, LogicalMode, value_as_number, value_as_text,
};
pub use field::{
    FieldCategory, FieldDefinition, FieldDefinitionInput, FieldLayout, FieldOption, FieldType,
    FormulaConfig, LinkType, LookupConfig, LookupCopyField, MAX_FILE_SIZE_MB, MAX_FILES,
    MAX_FORMULA_DECIMALS, RelatedRecordsConfig, SubtableConfig, validate_field_code,
};
pub use formula::{
    Formula, FormulaError, FormulaFormat, FormulaOutcome, FormulaWarning, MAX_FORMULA_LENGTH,
    MAX_FORMULA_NESTING,
};
pub use notification::{
    ActorRef, NotificationIntent, NotificationRule, NotificationRuleInput, NotifyType,
    TriggerType, render_template,
};
pub use permission::{
    AccessLevel, AppCapabilities, AppPermission, FieldPermission, PrioritizedRule,
    RecordCapabilities, RecordPermissionRule, RecordPermissionRuleInput, RecordTargetType,
    TargetType,
};
pub use process::{
    ActionType, AssigneeType, ProcessAction, ProcessDefinition, ProcessStatus, TransitionRejection,
};
pub use record::{
    CREATED_AT_KEY, CREATED_BY_KEY, RECORD_NUMBER_KEY, RESERVED_KEYS, Record, RecordData,
    STATUS_KEY, UPDATED_AT_KEY, UPDATED_BY_KEY, is_reserved_key,
};
pub use schema::AppSchema;
