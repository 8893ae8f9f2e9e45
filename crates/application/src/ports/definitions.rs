use async_trait::async_trait;
use dynapp_core::{AppId, AppResult};
use dynapp_domain::{
    AppPermission, AppSchema, FieldPermission, NotificationRule, ProcessDefinition,
    RecordPermissionRule,
};

/// Repository port for app schemas.
#[async_trait]
pub trait SchemaRepository: Send + Sync {
    /// Returns one schema by app id.
    async fn find_schema(&self, app_id: AppId) -> AppResult<Option<AppSchema>>;

    /// Returns one schema by app code.
    async fn find_schema_by_code(&self, app_code: &str) -> AppResult<Option<AppSchema>>;

    /// Creates or replaces a schema.
    async fn save_schema(&self, schema: AppSchema) -> AppResult<()>;
}

/// Repository port for the three permission rule tables.
///
/// The `replace_*` operations swap an app's full rule list in one write; they
/// back priority reordering and must not interleave with each other.
#[async_trait]
pub trait PermissionRepository: Send + Sync {
    /// Lists app-level permission rows.
    async fn list_app_permissions(&self, app_id: AppId) -> AppResult<Vec<AppPermission>>;

    /// Lists field-level permission rows.
    async fn list_field_permissions(&self, app_id: AppId) -> AppResult<Vec<FieldPermission>>;

    /// Lists record permission rules.
    async fn list_record_rules(&self, app_id: AppId) -> AppResult<Vec<RecordPermissionRule>>;

    /// Creates or replaces one app-level row by id.
    async fn save_app_permission(&self, permission: AppPermission) -> AppResult<()>;

    /// Creates or replaces one field-level row by id.
    async fn save_field_permission(&self, permission: FieldPermission) -> AppResult<()>;

    /// Creates or replaces one record rule by id.
    async fn save_record_rule(&self, rule: RecordPermissionRule) -> AppResult<()>;

    /// Replaces every app-level row of an app.
    async fn replace_app_permissions(
        &self,
        app_id: AppId,
        permissions: Vec<AppPermission>,
    ) -> AppResult<()>;

    /// Replaces every field-level row of an app.
    async fn replace_field_permissions(
        &self,
        app_id: AppId,
        permissions: Vec<FieldPermission>,
    ) -> AppResult<()>;

    /// Replaces every record rule of an app.
    async fn replace_record_rules(
        &self,
        app_id: AppId,
        rules: Vec<RecordPermissionRule>,
    ) -> AppResult<()>;
}

/// Repository port for process graphs and the current status assignees.
#[async_trait]
pub trait ProcessRepository: Send + Sync {
    /// Returns an app's process graph.
    async fn find_definition(&self, app_id: AppId) -> AppResult<Option<ProcessDefinition>>;

    /// Creates or replaces an app's process graph.
    async fn save_definition(&self, definition: ProcessDefinition) -> AppResult<()>;

    /// Lists the users assigned to a record's current status.
    async fn list_assignees(&self, app_id: AppId, record_id: &str) -> AppResult<Vec<String>>;

    /// Replaces the users assigned to a record's current status.
    async fn set_assignees(
        &self,
        app_id: AppId,
        record_id: &str,
        assignees: Vec<String>,
    ) -> AppResult<()>;
}

/// Repository port for notification rules.
#[async_trait]
pub trait NotificationRuleRepository: Send + Sync {
    /// Lists an app's notification rules.
    async fn list_rules(&self, app_id: AppId) -> AppResult<Vec<NotificationRule>>;

    /// Creates or replaces one rule by id.
    async fn save_rule(&self, rule: NotificationRule) -> AppResult<()>;
}
