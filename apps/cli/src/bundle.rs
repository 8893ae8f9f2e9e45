//! JSON bundle holding app definitions, rules and existing records.

use std::path::Path;

use dynapp_application::ProcessRepository;
use dynapp_core::{AppError, AppResult};
use dynapp_domain::{
    AppPermission, AppSchema, FieldPermission, NotificationRule, ProcessDefinition, Record,
    RecordData, RecordPermissionRule,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::services::Services;

#[derive(Debug, Deserialize)]
pub struct Bundle {
    schemas: Vec<AppSchema>,
    #[serde(default)]
    app_permissions: Vec<AppPermission>,
    #[serde(default)]
    field_permissions: Vec<FieldPermission>,
    #[serde(default)]
    record_rules: Vec<RecordPermissionRule>,
    #[serde(default)]
    process_definitions: Vec<ProcessDefinition>,
    #[serde(default)]
    notification_rules: Vec<NotificationRule>,
    #[serde(default)]
    records: Vec<BundleRecord>,
    #[serde(default)]
    assignees: Vec<BundleAssignees>,
}

#[derive(Debug, Deserialize)]
struct BundleRecord {
    app_code: String,
    record_id: String,
    record_number: u64,
    #[serde(default)]
    data: RecordData,
}

#[derive(Debug, Deserialize)]
struct BundleAssignees {
    app_code: String,
    record_id: String,
    assignees: Vec<String>,
}

pub async fn read_json<T: DeserializeOwned>(path: &Path) -> AppResult<T> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|error| {
        AppError::Validation(format!("cannot read '{}': {error}", path.display()))
    })?;
    serde_json::from_str(raw.as_str()).map_err(|error| {
        AppError::configuration_invalid(format!("'{}' ({error})", path.display()))
    })
}

impl Bundle {
    /// Loads every definition through the services so save-time validation
    /// runs exactly as it would for a designer edit.
    pub async fn seed(self, services: &Services) -> AppResult<()> {
        let schema_count = self.schemas.len();
        for schema in self.schemas {
            services.schemas.save_schema(schema).await?;
        }

        for permission in self.app_permissions {
            permission.validate()?;
            services.permissions.save_app_permission(permission).await?;
        }
        for permission in self.field_permissions {
            permission.validate()?;
            services.permissions.save_field_permission(permission).await?;
        }
        for rule in self.record_rules {
            services.permissions.save_record_rule(rule).await?;
        }

        for definition in self.process_definitions {
            services.process.save_definition(definition).await?;
        }
        for rule in self.notification_rules {
            services.notifications.save_rule(rule).await?;
        }

        let record_count = self.records.len();
        for entry in self.records {
            require_app(services, entry.app_code.as_str()).await?;
            let record = Record::new(entry.record_id, entry.record_number, entry.data)?;
            services
                .records
                .restore(entry.app_code.as_str(), record)
                .await?;
        }

        for entry in self.assignees {
            let schema = require_app(services, entry.app_code.as_str()).await?;
            services
                .definitions
                .set_assignees(schema.app_id(), entry.record_id.as_str(), entry.assignees)
                .await?;
        }

        info!(
            apps = schema_count,
            records = record_count,
            "bundle loaded"
        );
        Ok(())
    }
}

async fn require_app(services: &Services, app_code: &str) -> AppResult<AppSchema> {
    let schema = services.schemas.find_by_code(app_code).await?;

    if schema.process_enabled()
        && services
            .definitions
            .find_definition(schema.app_id())
            .await?
            .is_none()
    {
        return Err(AppError::Validation(format!(
            "app '{app_code}' enables process management without a process definition"
        )));
    }

    Ok(schema)
}
