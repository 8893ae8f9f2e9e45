use super::*;

#[async_trait]
impl ProcessRepository for InMemoryDefinitionRepository {
    async fn find_definition(&self, app_id: AppId) -> AppResult<Option<ProcessDefinition>> {
        Ok(self.process_definitions.read().await.get(&app_id).cloned())
    }

    async fn save_definition(&self, definition: ProcessDefinition) -> AppResult<()> {
        self.process_definitions
            .write()
            .await
            .insert(definition.app_id(), definition);
        Ok(())
    }

    async fn list_assignees(&self, app_id: AppId, record_id: &str) -> AppResult<Vec<String>> {
        Ok(self
            .assignees
            .read()
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
        let key = (app_id, record_id.to_owned());
        let mut stored = self.assignees.write().await;
        if assignees.is_empty() {
            stored.remove(&key);
        } else {
            stored.insert(key, assignees);
        }
        Ok(())
    }
}
