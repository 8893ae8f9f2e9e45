use std::sync::Arc;

use dynapp_core::{Actor, AppError, AppId, AppResult};
use dynapp_domain::{
    AppPermission, AppSchema, FieldPermission, Record, RecordPermissionRule,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::permission_resolver::{
    EffectiveAccess, PermissionRuleSet, reorder_priorities, resolve_effective_access,
};
use crate::ports::{PermissionRepository, SchemaRepository};

/// Which rule table a reorder targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// App-level rows.
    App,
    /// Field-level rows.
    Field,
    /// Record rules.
    Record,
}

/// Application service for permission rules and access resolution.
#[derive(Clone)]
pub struct PermissionService {
    schemas: Arc<dyn SchemaRepository>,
    repository: Arc<dyn PermissionRepository>,
}

impl PermissionService {
    /// Creates a permission service from repository implementations.
    #[must_use]
    pub fn new(
        schemas: Arc<dyn SchemaRepository>,
        repository: Arc<dyn PermissionRepository>,
    ) -> Self {
        Self {
            schemas,
            repository,
        }
    }

    /// Loads every rule table of an app.
    pub async fn rule_set(&self, app_id: AppId) -> AppResult<PermissionRuleSet> {
        Ok(PermissionRuleSet {
            app: self.repository.list_app_permissions(app_id).await?,
            field: self.repository.list_field_permissions(app_id).await?,
            record: self.repository.list_record_rules(app_id).await?,
        })
    }

    /// Resolves an actor's access to an app and, optionally, one record.
    pub async fn effective_access(
        &self,
        actor: &Actor,
        schema: &AppSchema,
        record: Option<&Record>,
    ) -> AppResult<EffectiveAccess> {
        let rules = self.rule_set(schema.app_id()).await?;
        let access = resolve_effective_access(actor, schema, &rules, record);

        debug!(
            actor = actor.id(),
            app = schema.app_code().as_str(),
            record_id = record.map(|record| record.record_id().as_str()),
            can_view = access.record.can_view,
            can_edit = access.record.can_edit,
            can_delete = access.record.can_delete,
            "resolved effective access"
        );

        Ok(access)
    }

    /// Saves an app-level row.
    pub async fn save_app_permission(&self, permission: AppPermission) -> AppResult<()> {
        permission.validate()?;
        self.require_schema(permission.app_id()).await?;
        self.repository.save_app_permission(permission).await
    }

    /// Saves a field-level row after checking its field code exists.
    pub async fn save_field_permission(&self, permission: FieldPermission) -> AppResult<()> {
        permission.validate()?;
        let schema = self.require_schema(permission.app_id()).await?;
        schema.validate_field_reference(permission.field_name().as_str())?;
        self.repository.save_field_permission(permission).await
    }

    /// Saves a record rule after checking its condition and target field.
    pub async fn save_record_rule(&self, rule: RecordPermissionRule) -> AppResult<()> {
        rule.validate()?;
        let schema = self.require_schema(rule.app_id()).await?;
        schema.validate_condition(rule.condition())?;
        if let Some(target_field) = rule.target_field() {
            schema.validate_field_reference(target_field)?;
        }
        self.repository.save_record_rule(rule).await
    }

    /// Rewrites the priority column of one rule table; the first id ranks highest.
    pub async fn reorder_priorities(
        &self,
        app_id: AppId,
        kind: RuleKind,
        ids_in_order: &[String],
    ) -> AppResult<()> {
        match kind {
            RuleKind::App => {
                let mut rules = self.repository.list_app_permissions(app_id).await?;
                reorder_priorities(&mut rules, ids_in_order)?;
                self.repository.replace_app_permissions(app_id, rules).await?;
            }
            RuleKind::Field => {
                let mut rules = self.repository.list_field_permissions(app_id).await?;
                reorder_priorities(&mut rules, ids_in_order)?;
                self.repository.replace_field_permissions(app_id, rules).await?;
            }
            RuleKind::Record => {
                let mut rules = self.repository.list_record_rules(app_id).await?;
                reorder_priorities(&mut rules, ids_in_order)?;
                self.repository.replace_record_rules(app_id, rules).await?;
            }
        }

        info!(
            app_id = %app_id,
            kind = ?kind,
            count = ids_in_order.len(),
            "reordered rule priorities"
        );
        Ok(())
    }

    async fn require_schema(&self, app_id: AppId) -> AppResult<AppSchema> {
        self.schemas
            .find_schema(app_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("app '{app_id}' does not exist")))
    }
}
