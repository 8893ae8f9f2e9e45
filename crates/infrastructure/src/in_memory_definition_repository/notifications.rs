use super::*;

#[async_trait]
impl NotificationRuleRepository for InMemoryDefinitionRepository {
    async fn list_rules(&self, app_id: AppId) -> AppResult<Vec<NotificationRule>> {
        Ok(self
            .notification_rules
            .read()
            .await
            .get(&app_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_rule(&self, rule: NotificationRule) -> AppResult<()> {
        let mut rules = self.notification_rules.write().await;
        let app_rules = rules.entry(rule.app_id()).or_default();
        match app_rules.iter().position(|stored| stored.id() == rule.id()) {
            Some(position) => app_rules[position] = rule,
            None => app_rules.push(rule),
        }
        Ok(())
    }
}
