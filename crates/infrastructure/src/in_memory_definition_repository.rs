use std::collections::HashMap;

use async_trait::async_trait;
use dynapp_application::{
    NotificationRuleRepository, PermissionRepository, ProcessRepository, SchemaRepository,
};
use dynapp_core::{AppError, AppId, AppResult};
use dynapp_domain::{
    AppPermission, AppSchema, FieldPermission, NotificationRule, PrioritizedRule,
    ProcessDefinition, RecordPermissionRule,
};
use tokio::sync::RwLock;

mod notifications;
mod permissions;
mod process;
mod schemas;

/// In-memory store for everything an app designer configures: schemas,
/// permission rules, process graphs with their assignees, and notification
/// rules.
#[derive(Debug, Default)]
pub struct InMemoryDefinitionRepository {
    schemas: RwLock<HashMap<AppId, AppSchema>>,
    app_permissions: RwLock<HashMap<AppId, Vec<AppPermission>>>,
    field_permissions: RwLock<HashMap<AppId, Vec<FieldPermission>>>,
    record_rules: RwLock<HashMap<AppId, Vec<RecordPermissionRule>>>,
    process_definitions: RwLock<HashMap<AppId, ProcessDefinition>>,
    assignees: RwLock<HashMap<(AppId, String), Vec<String>>>,
    notification_rules: RwLock<HashMap<AppId, Vec<NotificationRule>>>,
}

impl InMemoryDefinitionRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn upsert_rule<R: PrioritizedRule>(rows: &mut Vec<R>, row: R) {
    match rows
        .iter()
        .position(|stored| stored.rule_id() == row.rule_id())
    {
        Some(position) => rows[position] = row,
        None => rows.push(row),
    }
}

fn ensure_single_app(
    app_id: AppId,
    mut row_app_ids: impl Iterator<Item = AppId>,
) -> AppResult<()> {
    if row_app_ids.any(|row_app_id| row_app_id != app_id) {
        return Err(AppError::Validation(format!(
            "replacement rows must all belong to app '{app_id}'"
        )));
    }
    Ok(())
}
