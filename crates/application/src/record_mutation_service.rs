use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use dynapp_core::{Actor, AppError, AppId, AppResult};
use dynapp_domain::{
    AccessLevel, AppSchema, FieldDefinition, NotificationIntent, Record, RecordData,
    STATUS_KEY, TransitionRejection, TriggerType, UPDATED_AT_KEY, UPDATED_BY_KEY,
};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::derived_field_service::{DerivedFieldReport, format_calculated_fields};
use crate::permission_resolver::EffectiveAccess;
use crate::ports::{RecordFilter, RecordStore, SchemaRepository};
use crate::{DerivedFieldService, NotificationService, PermissionService, ProcessService};

mod process;
mod reads;
mod writes;

/// Record as one actor may see it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordView {
    /// Record id.
    pub record_id: String,
    /// Per-app record number.
    pub record_number: u64,
    /// Field values with auto fields projected and hidden fields removed.
    pub data: RecordData,
    /// Visible calculated fields rendered per their format.
    pub formatted: BTreeMap<String, String>,
    /// Resolved access of the actor on this record.
    pub access: EffectiveAccess,
}

/// Result of a create, update or delete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationOutcome {
    /// Post-mutation record, when it still exists and the actor may view it.
    pub record: Option<RecordView>,
    /// What derived field recomputation did.
    pub derived: DerivedFieldReport,
    /// Notification intents emitted.
    pub notifications: Vec<NotificationIntent>,
}

/// Result of a process action request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// The record moved to the action's target status.
    Applied {
        /// Status before the action.
        from_status: String,
        /// Status after the action.
        to_status: String,
        /// Post-transition record, when the actor may still view it.
        record: Option<RecordView>,
        /// Notification intents emitted.
        notifications: Vec<NotificationIntent>,
    },
    /// The request was refused; the record is untouched.
    Rejected(TransitionRejection),
}

/// Orchestrates record mutations: access checks, field write enforcement,
/// process transitions, derived field recomputation and notifications.
#[derive(Clone)]
pub struct RecordMutationService {
    schemas: Arc<dyn SchemaRepository>,
    records: Arc<dyn RecordStore>,
    permissions: PermissionService,
    process: ProcessService,
    derived: DerivedFieldService,
    notifications: NotificationService,
    currency_symbol: String,
}

impl RecordMutationService {
    /// Creates the orchestrator from its collaborating services.
    #[must_use]
    pub fn new(
        schemas: Arc<dyn SchemaRepository>,
        records: Arc<dyn RecordStore>,
        permissions: PermissionService,
        process: ProcessService,
        derived: DerivedFieldService,
        notifications: NotificationService,
    ) -> Self {
        Self {
            schemas,
            records,
            permissions,
            process,
            derived,
            notifications,
            currency_symbol: String::new(),
        }
    }

    /// Sets the symbol used when rendering currency-formatted fields.
    #[must_use]
    pub fn with_currency_symbol(mut self, currency_symbol: impl Into<String>) -> Self {
        self.currency_symbol = currency_symbol.into();
        self
    }

    async fn require_schema(&self, app_id: AppId) -> AppResult<AppSchema> {
        self.schemas
            .find_schema(app_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("app '{app_id}' does not exist")))
    }

    async fn require_record(&self, schema: &AppSchema, record_id: &str) -> AppResult<Record> {
        self.records
            .find_record(schema.app_code().as_str(), record_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "record '{record_id}' does not exist in app '{}'",
                    schema.app_code()
                ))
            })
    }

    async fn require_access(
        &self,
        actor: &Actor,
        schema: &AppSchema,
        record: &Record,
    ) -> AppResult<EffectiveAccess> {
        let access = self
            .permissions
            .effective_access(actor, schema, Some(record))
            .await?;
        if !access.record.can_view {
            return Err(AppError::Forbidden(format!(
                "actor '{}' cannot view record '{}'",
                actor.id(),
                record.record_id()
            )));
        }
        Ok(access)
    }

    async fn view(
        &self,
        actor: &Actor,
        schema: &AppSchema,
        record: &Record,
    ) -> AppResult<Option<RecordView>> {
        let access = self
            .permissions
            .effective_access(actor, schema, Some(record))
            .await?;
        if !access.record.can_view {
            return Ok(None);
        }
        Ok(Some(self.project(schema, record, access)))
    }

    // The record is already stored, so a failing rule lookup only costs the
    // notifications.
    async fn notify_after_write(
        &self,
        app_id: AppId,
        trigger_type: TriggerType,
        record: &Record,
    ) -> Vec<NotificationIntent> {
        match self.notifications.notify(app_id, trigger_type, record).await {
            Ok(intents) => intents,
            Err(error) => {
                warn!(
                    app_id = %app_id,
                    record_id = record.record_id().as_str(),
                    trigger = %trigger_type,
                    %error,
                    "notification rules could not be evaluated"
                );
                Vec::new()
            }
        }
    }

    fn project(&self, schema: &AppSchema, record: &Record, access: EffectiveAccess) -> RecordView {
        let mut data = schema.project_auto_fields(record);
        let mut formatted = format_calculated_fields(schema, &data, self.currency_symbol.as_str());
        formatted.retain(|code, _| access.fields.level(code) != AccessLevel::Hidden);
        access.fields.redact(&mut data);

        RecordView {
            record_id: record.record_id().as_str().to_owned(),
            record_number: record.record_number(),
            data,
            formatted,
            access,
        }
    }
}

fn stamp_modified(data: &mut RecordData, actor: &Actor) {
    data.insert(UPDATED_BY_KEY.to_owned(), Value::String(actor.id().to_owned()));
    data.insert(UPDATED_AT_KEY.to_owned(), Value::String(Utc::now().to_rfc3339()));
}

fn validate_input(schema: &AppSchema, input: &RecordData) -> AppResult<()> {
    for (code, value) in input {
        if code == STATUS_KEY && !schema.process_enabled() {
            if !(value.is_string() || value.is_null()) {
                return Err(AppError::Validation(
                    "status must be a string or null".to_owned(),
                ));
            }
            continue;
        }
        let field = schema
            .field(code)
            .ok_or_else(|| AppError::Validation(format!("unknown field code '{code}'")))?;
        if !field.field_type().accepts_input() {
            return Err(AppError::Validation(format!(
                "{} field '{code}' does not accept input",
                field.field_type().as_str()
            )));
        }
        field.validate_value(value)?;
    }

    Ok(())
}

fn check_required(schema: &AppSchema, data: &RecordData) -> AppResult<()> {
    let missing: Vec<&str> = schema
        .active_fields()
        .filter(|field| field.is_required() && field.field_type().accepts_input())
        .filter(|field| FieldDefinition::is_empty_value(data.get(field.field_code().as_str())))
        .map(|field| field.field_code().as_str())
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    Err(AppError::Validation(format!(
        "required fields are empty: {}",
        missing.join(", ")
    )))
}

impl RecordMutationService {
    async fn check_unique(
        &self,
        schema: &AppSchema,
        data: &RecordData,
        own_record_id: Option<&str>,
    ) -> AppResult<()> {
        for field in schema.active_fields().filter(|field| field.is_unique()) {
            let code = field.field_code().as_str();
            let Some(value) = data.get(code) else {
                continue;
            };
            if FieldDefinition::is_empty_value(Some(value)) {
                continue;
            }

            let filter = RecordFilter::field_equals(code, value.clone()).with_limit(2);
            let duplicates = self
                .records
                .list_records(schema.app_code().as_str(), &filter)
                .await?;
            if duplicates
                .iter()
                .any(|record| Some(record.record_id().as_str()) != own_record_id)
            {
                return Err(AppError::Conflict(format!(
                    "value of unique field '{code}' is already used"
                )));
            }
        }

        Ok(())
    }
}
