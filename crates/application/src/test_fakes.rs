//! Port fakes shared by the service tests.

use std::collections::HashMap;

use async_trait::async_trait;
use dynapp_core::{Actor, AppError, AppId, AppResult};
use dynapp_domain::{
    AppPermission, AppSchema, FieldDefinition, FieldDefinitionInput, FieldPermission, FieldType,
    NotificationIntent, NotificationRule, ProcessDefinition, Record, RecordData,
    RecordPermissionRule,
};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::ports::{
    NotificationDispatcher, NotificationRuleRepository, PermissionRepository, ProcessRepository,
    RecordFilter, RecordStore, SchemaRepository,
};

#[derive(Default)]
pub struct FakeSchemaRepository {
    pub schemas: Mutex<HashMap<AppId, AppSchema>>,
}

impl FakeSchemaRepository {
    pub fn with(schemas: Vec<AppSchema>) -> Self {
        Self {
            schemas: Mutex::new(
                schemas
                    .into_iter()
                    .map(|schema| (schema.app_id(), schema))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl SchemaRepository for FakeSchemaRepository {
    async fn find_schema(&self, app_id: AppId) -> AppResult<Option<AppSchema>> {
        Ok(self.schemas.lock().await.get(&app_id).cloned())
    }

    async fn find_schema_by_code(&self, app_code: &str) -> AppResult<Option<AppSchema>> {
        Ok(self
            .schemas
            .lock()
            .await
            .values()
            .find(|schema| schema.app_code().as_str() == app_code)
            .cloned())
    }

    async fn save_schema(&self, mut schema: AppSchema) -> AppResult<()> {
        let mut schemas = self.schemas.lock().await;
        if let Some(stored) = schemas.get(&schema.app_id()) {
            schema.ensure_stable_codes(stored)?;
        }
        schema.mark_persisted();
        schemas.insert(schema.app_id(), schema);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePermissionRepository {
    pub app: Mutex<Vec<AppPermission>>,
    pub field: Mutex<Vec<FieldPermission>>,
    pub record: Mutex<Vec<RecordPermissionRule>>,
}

#[async_trait]
impl PermissionRepository for FakePermissionRepository {
    async fn list_app_permissions(&self, app_id: AppId) -> AppResult<Vec<AppPermission>> {
        let rows = self.app.lock().await;
        Ok(rows.iter().filter(|row| row.app_id() == app_id).cloned().collect())
    }

    async fn list_field_permissions(&self, app_id: AppId) -> AppResult<Vec<FieldPermission>> {
        let rows = self.field.lock().await;
        Ok(rows.iter().filter(|row| row.app_id() == app_id).cloned().collect())
    }

    async fn list_record_rules(&self, app_id: AppId) -> AppResult<Vec<RecordPermissionRule>> {
        let rows = self.record.lock().await;
        Ok(rows.iter().filter(|row| row.app_id() == app_id).cloned().collect())
    }

    async fn save_app_permission(&self, permission: AppPermission) -> AppResult<()> {
        self.app.lock().await.push(permission);
        Ok(())
    }

    async fn save_field_permission(&self, permission: FieldPermission) -> AppResult<()> {
        self.field.lock().await.push(permission);
        Ok(())
    }

    async fn save_record_rule(&self, rule: RecordPermissionRule) -> AppResult<()> {
        self.record.lock().await.push(rule);
        Ok(())
    }

    async fn replace_app_permissions(
        &self,
        app_id: AppId,
        permissions: Vec<AppPermission>,
    ) -> AppResult<()> {
        let mut rows = self.app.lock().await;
        rows.retain(|row| row.app_id() != app_id);
        rows.extend(permissions);
        Ok(())
    }

    async fn replace_field_permissions(
        &self,
        app_id: AppId,
        permissions: Vec<FieldPermission>,
    ) -> AppResult<()> {
        let mut rows = self.field.lock().await;
        rows.retain(|row| row.app_id() != app_id);
        rows.extend(permissions);
        Ok(())
    }

    async fn replace_record_rules(
        &self,
        app_id: AppId,
        rules: Vec<RecordPermissionRule>,
    ) -> AppResult<()> {
        let mut rows = self.record.lock().await;
        rows.retain(|row| row.app_id() != app_id);
        rows.extend(rules);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeProcessRepository {
    pub definitions: Mutex<HashMap<AppId, ProcessDefinition>>,
    pub assignees: Mutex<HashMap<(AppId, String), Vec<String>>>,
}

#[async_trait]
impl ProcessRepository for FakeProcessRepository {
    async fn find_definition(&self, app_id: AppId) -> AppResult<Option<ProcessDefinition>> {
        Ok(self.definitions.lock().await.get(&app_id).cloned())
    }

    async fn save_definition(&self, definition: ProcessDefinition) -> AppResult<()> {
        self.definitions
            .lock()
            .await
            .insert(definition.app_id(), definition);
        Ok(())
    }

    async fn list_assignees(&self, app_id: AppId, record_id: &str) -> AppResult<Vec<String>> {
        Ok(self
            .assignees
            .lock()
            .await
            .get(&(app_id, record_id.to_owned()))
            .cloned()
            .unwrap_or_default())
    }

    async fn set_assignees(
        &self,
        app_id: AppId,
        record_id: &str,
        assignees: Vec<String>,
    ) -> AppResult<()> {
        self.assignees
            .lock()
            .await
            .insert((app_id, record_id.to_owned()), assignees);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeNotificationRuleRepository {
    pub rules: Mutex<Vec<NotificationRule>>,
    pub fail: bool,
}

#[async_trait]
impl NotificationRuleRepository for FakeNotificationRuleRepository {
    async fn list_rules(&self, app_id: AppId) -> AppResult<Vec<NotificationRule>> {
        if self.fail {
            return Err(AppError::Internal("rule store unavailable".to_owned()));
        }
        let rules = self.rules.lock().await;
        Ok(rules.iter().filter(|rule| rule.app_id() == app_id).cloned().collect())
    }

    async fn save_rule(&self, rule: NotificationRule) -> AppResult<()> {
        self.rules.lock().await.push(rule);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDispatcher {
    pub sent: Mutex<Vec<NotificationIntent>>,
    pub fail: bool,
}

#[async_trait]
impl NotificationDispatcher for FakeDispatcher {
    async fn dispatch(&self, intent: &NotificationIntent) -> AppResult<()> {
        if self.fail {
            return Err(AppError::Internal("transport down".to_owned()));
        }
        self.sent.lock().await.push(intent.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRecordStore {
    pub records: Mutex<HashMap<String, Vec<Record>>>,
}

impl FakeRecordStore {
    pub async fn seed(&self, app_code: &str, data: Value) -> Record {
        let Value::Object(data) = data else {
            unreachable!();
        };
        self.insert_record(app_code, data)
            .await
            .unwrap_or_else(|_| unreachable!())
    }
}

#[async_trait]
impl RecordStore for FakeRecordStore {
    async fn find_record(&self, app_code: &str, record_id: &str) -> AppResult<Option<Record>> {
        Ok(self.records.lock().await.get(app_code).and_then(|records| {
            records
                .iter()
                .find(|record| record.record_id().as_str() == record_id)
                .cloned()
        }))
    }

    async fn list_records(
        &self,
        app_code: &str,
        filter: &RecordFilter,
    ) -> AppResult<Vec<Record>> {
        let records = self.records.lock().await;
        let matched = records
            .get(app_code)
            .into_iter()
            .flatten()
            .filter(|record| filter.matches(record.data()))
            .take(filter.limit().unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(matched)
    }

    async fn insert_record(&self, app_code: &str, data: RecordData) -> AppResult<Record> {
        let mut records = self.records.lock().await;
        let app_records = records.entry(app_code.to_owned()).or_default();
        let number = app_records.len() as u64 + 1;
        let record = Record::new(format!("{app_code}-{number}"), number, data)?;
        app_records.push(record.clone());
        Ok(record)
    }

    async fn update_record(
        &self,
        app_code: &str,
        record: &Record,
        expected_status: Option<&str>,
    ) -> AppResult<()> {
        let mut records = self.records.lock().await;
        let stored = records
            .get_mut(app_code)
            .and_then(|records| {
                records
                    .iter_mut()
                    .find(|stored| stored.record_id() == record.record_id())
            })
            .ok_or_else(|| AppError::NotFound("record".to_owned()))?;
        if stored.status() != expected_status {
            return Err(AppError::Conflict("status changed".to_owned()));
        }
        *stored = record.clone();
        Ok(())
    }

    async fn delete_record(&self, app_code: &str, record_id: &str) -> AppResult<()> {
        let mut records = self.records.lock().await;
        if let Some(records) = records.get_mut(app_code) {
            records.retain(|record| record.record_id().as_str() != record_id);
        }
        Ok(())
    }
}

pub fn field(code: &str, field_type: FieldType) -> FieldDefinition {
    FieldDefinition::new(FieldDefinitionInput::new(code, code, field_type))
        .unwrap_or_else(|_| unreachable!())
}

pub fn text(code: &str) -> FieldDefinition {
    field(code, FieldType::SingleLineText { max: None })
}

pub fn number(code: &str) -> FieldDefinition {
    field(code, FieldType::Number { min: None, max: None })
}

pub fn actor(id: &str, roles: &[&str]) -> Actor {
    Actor::new(
        id,
        id,
        roles.iter().map(|role| (*role).to_owned()).collect(),
        None,
        Vec::new(),
    )
}
