use std::sync::Arc;

use dynapp_core::{AppError, AppId, AppResult};
use dynapp_domain::{AppSchema, NotificationIntent, NotificationRule, Record, TriggerType};
use tracing::{debug, info, warn};

use crate::ports::{NotificationDispatcher, NotificationRuleRepository, SchemaRepository};

/// Application service matching notification rules and handing intents to delivery.
#[derive(Clone)]
pub struct NotificationService {
    schemas: Arc<dyn SchemaRepository>,
    rules: Arc<dyn NotificationRuleRepository>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    record_number_prefix: String,
}

impl NotificationService {
    /// Creates a notification service.
    #[must_use]
    pub fn new(
        schemas: Arc<dyn SchemaRepository>,
        rules: Arc<dyn NotificationRuleRepository>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        record_number_prefix: impl Into<String>,
    ) -> Self {
        Self {
            schemas,
            rules,
            dispatcher,
            record_number_prefix: record_number_prefix.into(),
        }
    }

    /// Saves a rule after checking its condition and target field exist.
    pub async fn save_rule(&self, rule: NotificationRule) -> AppResult<()> {
        rule.validate()?;
        let schema = self.require_schema(rule.app_id()).await?;

        if let Some(condition) = rule.condition() {
            schema.validate_condition(condition)?;
        }
        if let Some(target_field) = rule.notify_target_field() {
            schema.validate_field_reference(target_field)?;
        }

        self.rules.save_rule(rule).await
    }

    /// Builds the intents a post-mutation record triggers, in rule id order.
    /// Rules resolving to no recipients produce nothing.
    pub async fn evaluate(
        &self,
        app_id: AppId,
        trigger_type: TriggerType,
        record: &Record,
    ) -> AppResult<Vec<NotificationIntent>> {
        let schema = self.require_schema(app_id).await?;
        let mut rules = self.rules.list_rules(app_id).await?;
        rules.sort_by(|left, right| left.id().as_str().cmp(right.id().as_str()));

        Ok(rules
            .iter()
            .filter(|rule| rule.matches(trigger_type, &schema, record))
            .filter_map(|rule| {
                let intent = rule.intent(&schema, record, self.record_number_prefix.as_str());
                if intent.recipients.is_empty() {
                    debug!(rule_id = rule.id().as_str(), "notification rule has no recipients");
                    return None;
                }
                Some(intent)
            })
            .collect())
    }

    /// Evaluates and dispatches. Delivery failures are logged and never fail
    /// the surrounding mutation.
    pub async fn notify(
        &self,
        app_id: AppId,
        trigger_type: TriggerType,
        record: &Record,
    ) -> AppResult<Vec<NotificationIntent>> {
        let intents = self.evaluate(app_id, trigger_type, record).await?;

        for intent in &intents {
            match self.dispatcher.dispatch(intent).await {
                Ok(()) => info!(
                    rule_id = intent.rule_id.as_str(),
                    record_id = intent.record_id.as_str(),
                    trigger = %trigger_type,
                    recipients = intent.recipients.len(),
                    "notification intent emitted"
                ),
                Err(error) => warn!(
                    rule_id = intent.rule_id.as_str(),
                    record_id = intent.record_id.as_str(),
                    %error,
                    "notification dispatch failed"
                ),
            }
        }

        Ok(intents)
    }

    async fn require_schema(&self, app_id: AppId) -> AppResult<AppSchema> {
        self.schemas
            .find_schema(app_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("app '{app_id}' does not exist")))
    }
}
