use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use dynapp_core::{Actor, AppError, AppId, AppResult};
use dynapp_domain::{
    AppSchema, AssigneeType, ProcessAction, ProcessDefinition, Record, STATUS_KEY,
    TransitionRejection, UPDATED_AT_KEY, UPDATED_BY_KEY,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::ports::{ProcessRepository, RecordStore, SchemaRepository};

/// Result of a transition request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome {
    /// The record moved to the action's target status.
    Applied {
        /// Record after the status update.
        record: Record,
        /// Status before the action.
        from_status: String,
        /// Status after the action.
        to_status: String,
    },
    /// The request was refused; the record is untouched.
    Rejected(TransitionRejection),
}

/// Application service driving an app's process graph.
#[derive(Clone)]
pub struct ProcessService {
    schemas: Arc<dyn SchemaRepository>,
    repository: Arc<dyn ProcessRepository>,
    records: Arc<dyn RecordStore>,
}

impl ProcessService {
    /// Creates a process service from port implementations.
    #[must_use]
    pub fn new(
        schemas: Arc<dyn SchemaRepository>,
        repository: Arc<dyn ProcessRepository>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            schemas,
            repository,
            records,
        }
    }

    /// Saves a process graph after re-checking its invariants.
    pub async fn save_definition(&self, definition: ProcessDefinition) -> AppResult<()> {
        definition.validate()?;
        self.require_schema(definition.app_id()).await?;
        self.repository.save_definition(definition).await
    }

    /// Switches process management on or off. Enabling requires a saved graph.
    pub async fn set_process_enabled(&self, app_id: AppId, enabled: bool) -> AppResult<()> {
        let mut schema = self.require_schema(app_id).await?;
        if enabled && self.repository.find_definition(app_id).await?.is_none() {
            return Err(AppError::Validation(format!(
                "app '{}' has no process definition to enable",
                schema.app_code()
            )));
        }

        schema.set_process_enabled(enabled);
        self.schemas.save_schema(schema).await?;
        info!(app_id = %app_id, enabled, "process management toggled");
        Ok(())
    }

    /// Returns the status new records start in, or `None` when unmanaged.
    pub async fn initial_status(&self, schema: &AppSchema) -> AppResult<Option<String>> {
        if !schema.process_enabled() {
            return Ok(None);
        }

        let definition = self.require_definition(schema).await?;
        Ok(Some(definition.initial_status()?.id().as_str().to_owned()))
    }

    /// Records who is assigned to a record's current status.
    pub async fn assign(
        &self,
        schema: &AppSchema,
        record: &Record,
        mut assignees: Vec<String>,
    ) -> AppResult<()> {
        let definition = self.require_definition(schema).await?;
        let status_id = record.status().unwrap_or_default();
        let assignee_type = definition
            .status(status_id)
            .and_then(|status| status.assignee_type())
            .ok_or_else(|| {
                AppError::Validation(format!("status '{status_id}' does not take assignees"))
            })?;

        let mut seen = HashSet::new();
        assignees.retain(|assignee| !assignee.trim().is_empty() && seen.insert(assignee.clone()));
        match (assignee_type, assignees.len()) {
            (_, 0) => Err(AppError::Validation(
                "at least one assignee is required".to_owned(),
            )),
            (AssigneeType::One, count) if count > 1 => Err(AppError::Validation(format!(
                "status '{status_id}' takes exactly one assignee, got {count}"
            ))),
            _ => Ok(()),
        }?;

        self.repository
            .set_assignees(schema.app_id(), record.record_id().as_str(), assignees)
            .await
    }

    /// Lists the actions this actor may invoke on the record right now.
    pub async fn available_actions(
        &self,
        actor: &Actor,
        schema: &AppSchema,
        record: &Record,
    ) -> AppResult<Vec<ProcessAction>> {
        if !schema.process_enabled() {
            return Ok(Vec::new());
        }

        let definition = self.require_definition(schema).await?;
        let assignees = self
            .repository
            .list_assignees(schema.app_id(), record.record_id().as_str())
            .await?;
        let current = record.status();

        Ok(definition
            .actions_from(current.unwrap_or_default())
            .filter(|action| {
                definition
                    .authorize_transition(current, action.id().as_str(), actor.id(), &assignees)
                    .is_ok()
            })
            .cloned()
            .collect())
    }

    /// Authorizes an action and moves the record to its target status.
    ///
    /// The status update is a compare-and-set on the status the check ran
    /// against, so a concurrent transition surfaces as a conflict.
    pub async fn transition(
        &self,
        actor: &Actor,
        schema: &AppSchema,
        record: &Record,
        action_id: &str,
    ) -> AppResult<TransitionOutcome> {
        if !schema.process_enabled() {
            return Ok(Self::reject(schema, record, TransitionRejection::ProcessDisabled));
        }
        let Some(definition) = self.repository.find_definition(schema.app_id()).await? else {
            return Ok(Self::reject(schema, record, TransitionRejection::ProcessDisabled));
        };

        let assignees = self
            .repository
            .list_assignees(schema.app_id(), record.record_id().as_str())
            .await?;
        let current = record.status();
        let authorized =
            definition.authorize_transition(current, action_id, actor.id(), &assignees);
        let action = match authorized {
            Ok(action) => action,
            Err(rejection) => return Ok(Self::reject(schema, record, rejection)),
        };

        let from_status = action.from_status_id().as_str().to_owned();
        let to_status = action.to_status_id().as_str().to_owned();
        let mut next = record.clone();
        let data = next.data_mut();
        data.insert(STATUS_KEY.to_owned(), Value::String(to_status.clone()));
        data.insert(UPDATED_BY_KEY.to_owned(), Value::String(actor.id().to_owned()));
        data.insert(UPDATED_AT_KEY.to_owned(), Value::String(Utc::now().to_rfc3339()));

        self.records
            .update_record(schema.app_code().as_str(), &next, current)
            .await?;
        self.repository
            .set_assignees(schema.app_id(), record.record_id().as_str(), Vec::new())
            .await?;

        info!(
            app = schema.app_code().as_str(),
            record_id = record.record_id().as_str(),
            actor = actor.id(),
            action = action_id,
            from = from_status.as_str(),
            to = to_status.as_str(),
            "process transition applied"
        );

        Ok(TransitionOutcome::Applied {
            record: next,
            from_status,
            to_status,
        })
    }

    fn reject(
        schema: &AppSchema,
        record: &Record,
        rejection: TransitionRejection,
    ) -> TransitionOutcome {
        warn!(
            app = schema.app_code().as_str(),
            record_id = record.record_id().as_str(),
            reason = %rejection,
            "process transition rejected"
        );
        TransitionOutcome::Rejected(rejection)
    }

    async fn require_schema(&self, app_id: AppId) -> AppResult<AppSchema> {
        self.schemas
            .find_schema(app_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("app '{app_id}' does not exist")))
    }

    async fn require_definition(&self, schema: &AppSchema) -> AppResult<ProcessDefinition> {
        self.repository
            .find_definition(schema.app_id())
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "app '{}' has no process definition",
                    schema.app_code()
                ))
            })
    }
}

#[cfg(test)]
mod tests;
