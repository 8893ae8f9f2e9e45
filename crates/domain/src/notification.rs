use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use dynapp_core::{AppError, AppId, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

use crate::condition::{ConditionGroup, value_as_text};
use crate::record::{RECORD_NUMBER_KEY, Record};
use crate::schema::AppSchema;

/// Record event that can fire a notification rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// A record was created.
    RecordAdded,
    /// A record's field values changed.
    RecordEdited,
    /// A record was deleted.
    RecordDeleted,
    /// A comment was posted on a record.
    CommentAdded,
    /// A process action moved the record to another status.
    StatusChanged,
}

impl TriggerType {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecordAdded => "record_added",
            Self::RecordEdited => "record_edited",
            Self::RecordDeleted => "record_deleted",
            Self::CommentAdded => "comment_added",
            Self::StatusChanged => "status_changed",
        }
    }
}

impl Display for TriggerType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// How a notification rule picks its recipients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyType {
    /// The record's creator.
    Creator,
    /// One user named by `notify_target_id`.
    User,
    /// A role named by `notify_target_id`.
    Role,
    /// An organization named by `notify_target_id`.
    Organization,
    /// The user ids held in `notify_target_field`.
    FieldValue,
}

/// Reference to a notification recipient, resolved to people by the delivery side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ActorRef {
    /// A single user.
    User(String),
    /// All holders of a role.
    Role(String),
    /// All members of an organization.
    Organization(String),
}

/// Notification ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIntent {
    /// Rule that produced the intent.
    pub rule_id: String,
    /// Record the intent is about.
    pub record_id: String,
    /// Resolved recipients, in rule order without duplicates.
    pub recipients: Vec<ActorRef>,
    /// Rendered title.
    pub title: String,
    /// Rendered message body.
    pub message: String,
}

/// Conditional notification configured on one app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRule {
    id: NonEmptyString,
    app_id: AppId,
    trigger_type: TriggerType,
    #[serde(default)]
    condition: Option<ConditionGroup>,
    notify_type: NotifyType,
    #[serde(default)]
    notify_target_id: Option<String>,
    #[serde(default)]
    notify_target_field: Option<String>,
    title_template: String,
    #[serde(default)]
    message_template: String,
}

/// Input payload for [`NotificationRule::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRuleInput {
    /// Trigger the rule listens to.
    pub trigger_type: TriggerType,
    /// Optional record filter; `None` matches every record.
    pub condition: Option<ConditionGroup>,
    /// Recipient policy.
    pub notify_type: NotifyType,
    /// Target id for user, role and organization recipients.
    pub notify_target_id: Option<String>,
    /// Field code for field-value recipients.
    pub notify_target_field: Option<String>,
    /// Title template with `{{field_code}}` placeholders.
    pub title_template: String,
    /// Message template with `{{field_code}}` placeholders.
    pub message_template: String,
}

impl NotificationRule {
    /// Creates a validated notification rule.
    pub fn new(
        id: impl Into<String>,
        app_id: AppId,
        input: NotificationRuleInput,
    ) -> AppResult<Self> {
        let rule = Self {
            id: NonEmptyString::new(id)?,
            app_id,
            trigger_type: input.trigger_type,
            condition: input.condition,
            notify_type: input.notify_type,
            notify_target_id: input.notify_target_id,
            notify_target_field: input.notify_target_field,
            title_template: input.title_template,
            message_template: input.message_template,
        };
        rule.validate()?;
        Ok(rule)
    }

    /// Re-checks the rule invariants; used after deserialization.
    pub fn validate(&self) -> AppResult<()> {
        if self.title_template.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "notification rule '{}' requires a title template",
                self.id
            )));
        }

        match self.notify_type {
            NotifyType::User | NotifyType::Role | NotifyType::Organization => {
                if blank(self.notify_target_id.as_deref()) {
                    return Err(AppError::Validation(format!(
                        "notification rule '{}' requires notify_target_id",
                        self.id
                    )));
                }
            }
            NotifyType::FieldValue => {
                if blank(self.notify_target_field.as_deref()) {
                    return Err(AppError::Validation(format!(
                        "notification rule '{}' requires notify_target_field",
                        self.id
                    )));
                }
            }
            NotifyType::Creator => {}
        }

        if let Some(condition) = &self.condition {
            condition.validate()?;
        }

        Ok(())
    }

    /// Returns the rule id.
    #[must_use]
    pub fn id(&self) -> &NonEmptyString {
        &self.id
    }

    /// Returns the owning app.
    #[must_use]
    pub fn app_id(&self) -> AppId {
        self.app_id
    }

    /// Returns the trigger.
    #[must_use]
    pub fn trigger_type(&self) -> TriggerType {
        self.trigger_type
    }

    /// Returns the record filter, if any.
    #[must_use]
    pub fn condition(&self) -> Option<&ConditionGroup> {
        self.condition.as_ref()
    }

    /// Returns the recipient policy.
    #[must_use]
    pub fn notify_type(&self) -> NotifyType {
        self.notify_type
    }

    /// Returns the target field for field-value recipients.
    #[must_use]
    pub fn notify_target_field(&self) -> Option<&str> {
        self.notify_target_field.as_deref()
    }

    /// Returns the title template.
    #[must_use]
    pub fn title_template(&self) -> &str {
        &self.title_template
    }

    /// Returns the message template.
    #[must_use]
    pub fn message_template(&self) -> &str {
        &self.message_template
    }

    /// Returns whether the rule fires for this trigger and post-mutation record.
    /// The condition sees auto fields under their own codes.
    #[must_use]
    pub fn matches(&self, trigger_type: TriggerType, schema: &AppSchema, record: &Record) -> bool {
        if self.trigger_type != trigger_type {
            return false;
        }

        self.condition
            .as_ref()
            .is_none_or(|condition| condition.matches(&schema.project_auto_fields(record)))
    }

    /// Resolves recipients for a record. An empty list means nobody to notify.
    #[must_use]
    pub fn resolve_recipients(&self, record: &Record) -> Vec<ActorRef> {
        let target_id = self.notify_target_id.clone().unwrap_or_default();
        let mut recipients = match self.notify_type {
            NotifyType::Creator => record
                .created_by()
                .map(|creator| vec![ActorRef::User(creator.to_owned())])
                .unwrap_or_default(),
            NotifyType::User => vec![ActorRef::User(target_id)],
            NotifyType::Role => vec![ActorRef::Role(target_id)],
            NotifyType::Organization => vec![ActorRef::Organization(target_id)],
            NotifyType::FieldValue => self
                .notify_target_field
                .as_deref()
                .map(|field| record.actor_ids(field))
                .unwrap_or_default()
                .into_iter()
                .map(ActorRef::User)
                .collect(),
        };

        let mut seen = HashSet::new();
        recipients.retain(|recipient| seen.insert(recipient.clone()));
        recipients
    }

    /// Builds the notification intent for a matched record.
    #[must_use]
    pub fn intent(
        &self,
        schema: &AppSchema,
        record: &Record,
        record_number_prefix: &str,
    ) -> NotificationIntent {
        let projected = schema.project_record(record);
        NotificationIntent {
            rule_id: self.id.as_str().to_owned(),
            record_id: record.record_id().as_str().to_owned(),
            recipients: self.resolve_recipients(&projected),
            title: render_projected(&self.title_template, &projected, record_number_prefix),
            message: render_projected(&self.message_template, &projected, record_number_prefix),
        }
    }
}

fn blank(value: Option<&str>) -> bool {
    value.is_none_or(|value| value.trim().is_empty())
}

/// Substitutes `{{field_code}}` and `{{record_number}}` placeholders.
///
/// Any field of the app resolves, auto fields included. Placeholders naming
/// a key the record does not hold are left as written, as are unterminated
/// `{{` sequences.
#[must_use]
pub fn render_template(
    template: &str,
    schema: &AppSchema,
    record: &Record,
    record_number_prefix: &str,
) -> String {
    render_projected(template, &schema.project_record(record), record_number_prefix)
}

fn render_projected(template: &str, record: &Record, record_number_prefix: &str) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let (head, after_head) = rest.split_at(start);
        result.push_str(head);

        let Some(end_relative) = after_head.find("}}") else {
            result.push_str(after_head);
            rest = "";
            break;
        };

        let token = after_head[2..end_relative].trim();
        if let Some(token_value) = placeholder_value(token, record, record_number_prefix) {
            result.push_str(token_value.as_str());
        } else {
            result.push_str(&after_head[..end_relative + 2]);
        }

        rest = &after_head[end_relative + 2..];
    }

    result.push_str(rest);
    result
}

fn placeholder_value(token: &str, record: &Record, record_number_prefix: &str) -> Option<String> {
    if token == RECORD_NUMBER_KEY {
        return Some(format!("{record_number_prefix}{}", record.record_number()));
    }

    record.data().get(token).map(value_as_text)
}

#[cfg(test)]
mod tests {
    use dynapp_core::AppId;
    use serde_json::{Map, Value, json};

    use super::{
        ActorRef, NotificationRule, NotificationRuleInput, NotifyType, TriggerType,
        render_template,
    };
    use crate::condition::{Condition, ConditionGroup, ConditionOperator, LogicalMode};
    use crate::field::{FieldDefinition, FieldDefinitionInput, FieldType};
    use crate::record::Record;
    use crate::schema::AppSchema;

    fn plain_schema() -> AppSchema {
        AppSchema::new(AppId::new(), "orders", false, Vec::new()).unwrap_or_else(|_| unreachable!())
    }

    fn authored_schema() -> AppSchema {
        let author = FieldDefinition::new(FieldDefinitionInput::new(
            "f-author",
            "author",
            FieldType::Creator,
        ))
        .unwrap_or_else(|_| unreachable!());
        AppSchema::new(AppId::new(), "orders", false, vec![author])
            .unwrap_or_else(|_| unreachable!())
    }

    fn record(data: Value) -> Record {
        let Value::Object(data) = data else {
            unreachable!();
        };
        Record::new("rec-1", 42, data).unwrap_or_else(|_| unreachable!())
    }

    fn rule(notify_type: NotifyType, condition: Option<ConditionGroup>) -> NotificationRule {
        NotificationRule::new(
            "rule-1",
            AppId::new(),
            NotificationRuleInput {
                trigger_type: TriggerType::RecordEdited,
                condition,
                notify_type,
                notify_target_id: Some("sales".to_owned()),
                notify_target_field: Some("reviewers".to_owned()),
                title_template: "Order {{record_number}}".to_owned(),
                message_template: "{{customer}} owes {{amount}}".to_owned(),
            },
        )
        .unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn matches_trigger_and_condition() {
        let closed = ConditionGroup::new(
            LogicalMode::And,
            vec![
                Condition::scalar("status", ConditionOperator::Eq, json!("closed"))
                    .unwrap_or_else(|_| unreachable!()),
            ],
        );
        let rule = rule(NotifyType::Creator, Some(closed));

        let closed_record = record(json!({"status": "closed"}));
        let open_record = record(json!({"status": "open"}));

        let schema = plain_schema();

        assert!(rule.matches(TriggerType::RecordEdited, &schema, &closed_record));
        assert!(!rule.matches(TriggerType::RecordAdded, &schema, &closed_record));
        assert!(!rule.matches(TriggerType::RecordEdited, &schema, &open_record));
    }

    #[test]
    fn missing_condition_matches_every_record() {
        let rule = rule(NotifyType::Role, None);
        assert!(rule.matches(TriggerType::RecordEdited, &plain_schema(), &record(json!({}))));
        assert_eq!(
            rule.resolve_recipients(&record(json!({}))),
            vec![ActorRef::Role("sales".to_owned())]
        );
    }

    #[test]
    fn resolves_creator_and_field_value_recipients() {
        let snapshot = record(json!({
            "created_by": "alice",
            "reviewers": ["bob", {"code": "carol"}, "bob", ""]
        }));

        assert_eq!(
            rule(NotifyType::Creator, None).resolve_recipients(&snapshot),
            vec![ActorRef::User("alice".to_owned())]
        );
        assert_eq!(
            rule(NotifyType::FieldValue, None).resolve_recipients(&snapshot),
            vec![
                ActorRef::User("bob".to_owned()),
                ActorRef::User("carol".to_owned())
            ]
        );
        assert!(
            rule(NotifyType::Creator, None)
                .resolve_recipients(&record(json!({})))
                .is_empty()
        );
    }

    #[test]
    fn render_leaves_unknown_placeholders_literal() {
        let snapshot = record(json!({"customer": "Acme", "amount": 12.5, "note": null}));

        let rendered = render_template(
            "#{{ record_number }} {{customer}} {{amount}} [{{note}}] {{missing}} {{open",
            &plain_schema(),
            &snapshot,
            "ORD-",
        );

        assert_eq!(rendered, "#ORD-42 Acme 12.5 [] {{missing}} {{open");
    }

    #[test]
    fn intent_renders_both_templates() {
        let snapshot = record(json!({"customer": "Acme", "amount": 3}));
        let intent = rule(NotifyType::User, None).intent(&plain_schema(), &snapshot, "");

        assert_eq!(intent.title, "Order 42");
        assert_eq!(intent.message, "Acme owes 3");
        assert_eq!(intent.recipients, vec![ActorRef::User("sales".to_owned())]);
    }

    #[test]
    fn targeted_rules_require_target() {
        let result = NotificationRule::new(
            "rule-2",
            AppId::new(),
            NotificationRuleInput {
                trigger_type: TriggerType::RecordAdded,
                condition: None,
                notify_type: NotifyType::FieldValue,
                notify_target_id: None,
                notify_target_field: None,
                title_template: "New".to_owned(),
                message_template: String::new(),
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn empty_record_data_renders_number_only() {
        let snapshot = Record::new("rec-9", 9, Map::new()).unwrap_or_else(|_| unreachable!());
        assert_eq!(render_template("{{record_number}}", &plain_schema(), &snapshot, ""), "9");
    }

    #[test]
    fn auto_fields_resolve_in_templates_and_conditions() {
        let schema = authored_schema();
        let snapshot = record(json!({"created_by": "alice"}));
        let by_alice = ConditionGroup::new(
            LogicalMode::And,
            vec![
                Condition::scalar("author", ConditionOperator::Eq, json!("alice"))
                    .unwrap_or_else(|_| unreachable!()),
            ],
        );
        let rule = rule(NotifyType::Creator, Some(by_alice));

        assert_eq!(render_template("by {{author}}", &schema, &snapshot, ""), "by alice");
        assert!(rule.matches(TriggerType::RecordEdited, &schema, &snapshot));
        assert!(!rule.matches(TriggerType::RecordEdited, &plain_schema(), &snapshot));
    }
}
