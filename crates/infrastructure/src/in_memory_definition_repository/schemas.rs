use super::*;

#[async_trait]
impl SchemaRepository for InMemoryDefinitionRepository {
    async fn find_schema(&self, app_id: AppId) -> AppResult<Option<AppSchema>> {
        Ok(self.schemas.read().await.get(&app_id).cloned())
    }

    async fn find_schema_by_code(&self, app_code: &str) -> AppResult<Option<AppSchema>> {
        Ok(self
            .schemas
            .read()
            .await
            .values()
            .find(|schema| schema.app_code().as_str() == app_code)
            .cloned())
    }

    async fn save_schema(&self, mut schema: AppSchema) -> AppResult<()> {
        schema.validate()?;
        let mut schemas = self.schemas.write().await;

        if let Some(stored) = schemas.get(&schema.app_id()) {
            schema.ensure_stable_codes(stored)?;
        }

        let code_taken = schemas.values().any(|stored| {
            stored.app_id() != schema.app_id() && stored.app_code() == schema.app_code()
        });
        if code_taken {
            return Err(AppError::Conflict(format!(
                "app code '{}' is already used",
                schema.app_code()
            )));
        }

        schema.mark_persisted();
        schemas.insert(schema.app_id(), schema);
        Ok(())
    }
}
