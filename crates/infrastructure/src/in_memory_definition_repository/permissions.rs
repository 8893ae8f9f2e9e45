use super::*;

#[async_trait]
impl PermissionRepository for InMemoryDefinitionRepository {
    async fn list_app_permissions(&self, app_id: AppId) -> AppResult<Vec<AppPermission>> {
        Ok(self
            .app_permissions
            .read()
            .await
            .get(&app_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_field_permissions(&self, app_id: AppId) -> AppResult<Vec<FieldPermission>> {
        Ok(self
            .field_permissions
            .read()
            .await
            .get(&app_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_record_rules(&self, app_id: AppId) -> AppResult<Vec<RecordPermissionRule>> {
        Ok(self
            .record_rules
            .read()
            .await
            .get(&app_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_app_permission(&self, permission: AppPermission) -> AppResult<()> {
        let mut rows = self.app_permissions.write().await;
        upsert_rule(rows.entry(permission.app_id()).or_default(), permission);
        Ok(())
    }

    async fn save_field_permission(&self, permission: FieldPermission) -> AppResult<()> {
        let mut rows = self.field_permissions.write().await;
        upsert_rule(rows.entry(permission.app_id()).or_default(), permission);
        Ok(())
    }

    async fn save_record_rule(&self, rule: RecordPermissionRule) -> AppResult<()> {
        let mut rows = self.record_rules.write().await;
        upsert_rule(rows.entry(rule.app_id()).or_default(), rule);
        Ok(())
    }

    async fn replace_app_permissions(
        &self,
        app_id: AppId,
        permissions: Vec<AppPermission>,
    ) -> AppResult<()> {
        ensure_single_app(app_id, permissions.iter().map(AppPermission::app_id))?;
        self.app_permissions
            .write()
            .await
            .insert(app_id, permissions);
        Ok(())
    }

    async fn replace_field_permissions(
        &self,
        app_id: AppId,
        permissions: Vec<FieldPermission>,
    ) -> AppResult<()> {
        ensure_single_app(app_id, permissions.iter().map(FieldPermission::app_id))?;
        self.field_permissions
            .write()
            .await
            .insert(app_id, permissions);
        Ok(())
    }

    async fn replace_record_rules(
        &self,
        app_id: AppId,
        rules: Vec<RecordPermissionRule>,
    ) -> AppResult<()> {
        ensure_single_app(app_id, rules.iter().map(RecordPermissionRule::app_id))?;
        self.record_rules.write().await.insert(app_id, rules);
        Ok(())
    }
}
