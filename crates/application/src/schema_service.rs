use std::sync::Arc;

use dynapp_core::{Actor, AppError, AppId, AppResult};
use dynapp_domain::{AppSchema, FieldDefinition};
use tracing::info;

use crate::PermissionService;
use crate::ports::SchemaRepository;

/// Application service for app schemas and the field lifecycle.
#[derive(Clone)]
pub struct SchemaService {
    schemas: Arc<dyn SchemaRepository>,
    permissions: PermissionService,
}

impl SchemaService {
    /// Creates a schema service.
    #[must_use]
    pub fn new(schemas: Arc<dyn SchemaRepository>, permissions: PermissionService) -> Self {
        Self {
            schemas,
            permissions,
        }
    }

    /// Saves a complete schema, as a designer import does.
    ///
    /// Field codes saved before must keep their value; the repository marks
    /// every saved field persisted.
    pub async fn save_schema(&self, schema: AppSchema) -> AppResult<()> {
        schema.validate()?;
        let app_code = schema.app_code().as_str().to_owned();
        let field_count = schema.fields().len();
        self.schemas.save_schema(schema).await?;

        info!(app = app_code.as_str(), fields = field_count, "schema saved");
        Ok(())
    }

    /// Returns one schema by app code.
    pub async fn find_by_code(&self, app_code: &str) -> AppResult<AppSchema> {
        self.schemas
            .find_schema_by_code(app_code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("app '{app_code}' does not exist")))
    }

    /// Appends a field to an app. The field id must be new to the app,
    /// including among retired fields.
    pub async fn add_field(
        &self,
        actor: &Actor,
        app_id: AppId,
        field: FieldDefinition,
    ) -> AppResult<FieldDefinition> {
        let mut schema = self.require_manageable(actor, app_id).await?;
        field.validate()?;
        if schema.fields().iter().any(|stored| stored.id() == field.id()) {
            return Err(AppError::Conflict(format!(
                "field id '{}' is already used in app '{}'",
                field.id(),
                schema.app_code()
            )));
        }

        schema.add_field(field.clone())?;
        self.schemas.save_schema(schema.clone()).await?;

        info!(
            app = schema.app_code().as_str(),
            field = field.field_code().as_str(),
            actor = actor.id(),
            "field added"
        );
        Ok(field)
    }

    /// Soft-retires a field. Formulas, lookups and related-records fields of
    /// the same app that still depend on it block the retirement.
    pub async fn retire_field(
        &self,
        actor: &Actor,
        app_id: AppId,
        field_code: &str,
    ) -> AppResult<()> {
        let mut schema = self.require_manageable(actor, app_id).await?;
        schema.retire_field(field_code)?;
        self.schemas.save_schema(schema.clone()).await?;

        info!(
            app = schema.app_code().as_str(),
            field = field_code,
            actor = actor.id(),
            "field retired"
        );
        Ok(())
    }

    async fn require_manageable(&self, actor: &Actor, app_id: AppId) -> AppResult<AppSchema> {
        let schema = self
            .schemas
            .find_schema(app_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("app '{app_id}' does not exist")))?;
        let access = self.permissions.effective_access(actor, &schema, None).await?;
        if !access.app.can_manage {
            return Err(AppError::Forbidden(format!(
                "actor '{}' cannot manage app '{}'",
                actor.id(),
                schema.app_code()
            )));
        }

        Ok(schema)
    }
}
