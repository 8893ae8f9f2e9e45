
use dynapp_core::{AppError, AppId, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

use crate::condition::ConditionGroup;

/// Shape shared by every priority-ordered rule table.
pub trait PrioritizedRule {
    /// Returns the stable rule id used to break priority ties.
    fn rule_id(&self) -> &str;

    /// Returns the rule priority; higher wins.
    fn priority(&self) -> i32;

    /// Overwrites the rule priority.
    fn set_priority(&mut self, priority: i32);
}

/// Whom an app-level or field-level permission row applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// One user by id.
    User,
    /// Members of an organization.
    Organization,
    /// Holders of a role.
    Role,
    /// Every actor.
    Everyone,
}

impl TargetType {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Organization => "organization",
            Self::Role => "role",
            Self::Everyone => "everyone",
        }
    }
}

/// Whom a record permission rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordTargetType {
    /// One user by id.
    User,
    /// Members of an organization.
    Organization,
    /// Holders of a role.
    Role,
    /// The record's creator.
    Creator,
    /// The users named in a record field.
    FieldValue,
}

impl RecordTargetType {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Organization => "organization",
            Self::Role => "role",
            Self::Creator => "creator",
            Self::FieldValue => "field_value",
        }
    }
}

/// App-level capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppCapabilities {
    /// View records.
    #[serde(default)]
    pub can_view: bool,
    /// Add records.
    #[serde(default)]
    pub can_add: bool,
    /// Edit records.
    #[serde(default)]
    pub can_edit: bool,
    /// Delete records.
    #[serde(default)]
    pub can_delete: bool,
    /// Manage app settings.
    #[serde(default)]
    pub can_manage: bool,
    /// Export records.
    #[serde(default)]
    pub can_export: bool,
    /// Import records.
    #[serde(default)]
    pub can_import: bool,
}

impl AppCapabilities {
    /// Returns the fully denied capability set.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns the fully granted capability set.
    #[must_use]
    pub fn all() -> Self {
        Self {
            can_view: true,
            can_add: true,
            can_edit: true,
            can_delete: true,
            can_manage: true,
            can_export: true,
            can_import: true,
        }
    }
}

/// Record-level capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordCapabilities {
    /// View the record.
    #[serde(default)]
    pub can_view: bool,
    /// Edit the record.
    #[serde(default)]
    pub can_edit: bool,
    /// Delete the record.
    #[serde(default)]
    pub can_delete: bool,
}

impl RecordCapabilities {
    /// Returns the logical AND of both sets.
    #[must_use]
    pub fn intersect(self, other: Self) -> Self {
        Self {
            can_view: self.can_view && other.can_view,
            can_edit: self.can_edit && other.can_edit,
            can_delete: self.can_delete && other.can_delete,
        }
    }

    /// Returns whether every capability of `self` is also held by `other`.
    #[must_use]
    pub fn is_subset_of(self, other: Self) -> bool {
        (!self.can_view || other.can_view)
            && (!self.can_edit || other.can_edit)
            && (!self.can_delete || other.can_delete)
    }
}

impl From<AppCapabilities> for RecordCapabilities {
    fn from(value: AppCapabilities) -> Self {
        Self {
            can_view: value.can_view,
            can_edit: value.can_edit,
            can_delete: value.can_delete,
        }
    }
}

/// Field access level; variants are ordered from most to least restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// Removed from read and write payloads.
    Hidden,
    /// Read-only.
    View,
    /// Readable and writable.
    Edit,
}

fn validate_target(target_type: TargetType, target_id: Option<&str>) -> AppResult<()> {
    match (target_type, target_id) {
        (TargetType::Everyone, Some(_)) => Err(AppError::Validation(
            "everyone rules must not carry a target_id".to_owned(),
        )),
        (TargetType::Everyone, None) => Ok(()),
        (_, Some(id)) if !id.trim().is_empty() => Ok(()),
        (target_type, _) => Err(AppError::Validation(format!(
            "{} rules require a target_id",
            target_type.as_str()
        ))),
    }
}

/// App-level permission row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppPermission {
    id: NonEmptyString,
    app_id: AppId,
    target_type: TargetType,
    #[serde(default)]
    target_id: Option<String>,
    #[serde(flatten)]
    capabilities: AppCapabilities,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    include_sub_organizations: bool,
}

impl AppPermission {
    /// Creates a validated app permission row.
    pub fn new(
        id: impl Into<String>,
        app_id: AppId,
        target_type: TargetType,
        target_id: Option<String>,
        capabilities: AppCapabilities,
        priority: i32,
        include_sub_organizations: bool,
    ) -> AppResult<Self> {
        validate_target(target_type, target_id.as_deref())?;

        Ok(Self {
            id: NonEmptyString::new(id)?,
            app_id,
            target_type,
            target_id,
            capabilities,
            priority,
            include_sub_organizations,
        })
    }

    /// Re-checks invariants; used after deserialization.
    pub fn validate(&self) -> AppResult<()> {
        validate_target(self.target_type, self.target_id.as_deref())
    }

    /// Returns the owning app.
    #[must_use]
    pub fn app_id(&self) -> AppId {
        self.app_id
    }

    /// Returns the target type.
    #[must_use]
    pub fn target_type(&self) -> TargetType {
        self.target_type
    }

    /// Returns the target id.
    #[must_use]
    pub fn target_id(&self) -> Option<&str> {
        self.target_id.as_deref()
    }

    /// Returns the granted capabilities.
    #[must_use]
    pub fn capabilities(&self) -> AppCapabilities {
        self.capabilities
    }

    /// Returns whether descendant organizations match too.
    #[must_use]
    pub fn include_sub_organizations(&self) -> bool {
        self.include_sub_organizations
    }
}

impl PrioritizedRule for AppPermission {
    fn rule_id(&self) -> &str {
        self.id.as_str()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }
}

/// Field-level permission row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPermission {
    id: NonEmptyString,
    app_id: AppId,
    field_name: NonEmptyString,
    target_type: TargetType,
    #[serde(default)]
    target_id: Option<String>,
    access_level: AccessLevel,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    include_sub_organizations: bool,
}

impl FieldPermission {
    /// Creates a validated field permission row.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        app_id: AppId,
        field_name: impl Into<String>,
        target_type: TargetType,
        target_id: Option<String>,
        access_level: AccessLevel,
        priority: i32,
        include_sub_organizations: bool,
    ) -> AppResult<Self> {
        validate_target(target_type, target_id.as_deref())?;

        Ok(Self {
            id: NonEmptyString::new(id)?,
            app_id,
            field_name: NonEmptyString::new(field_name)?,
            target_type,
            target_id,
            access_level,
            priority,
            include_sub_organizations,
        })
    }

    /// Re-checks invariants; used after deserialization.
    pub fn validate(&self) -> AppResult<()> {
        validate_target(self.target_type, self.target_id.as_deref())
    }

    /// Returns the owning app.
    #[must_use]
    pub fn app_id(&self) -> AppId {
        self.app_id
    }

    /// Returns the governed field code.
    #[must_use]
    pub fn field_name(&self) -> &NonEmptyString {
        &self.field_name
    }

    /// Returns the target type.
    #[must_use]
    pub fn target_type(&self) -> TargetType {
        self.target_type
    }

    /// Returns the target id.
    #[must_use]
    pub fn target_id(&self) -> Option<&str> {
        self.target_id.as_deref()
    }

    /// Returns the forced access level.
    #[must_use]
    pub fn access_level(&self) -> AccessLevel {
        self.access_level
    }

    /// Returns whether descendant organizations match too.
    #[must_use]
    pub fn include_sub_organizations(&self) -> bool {
        self.include_sub_organizations
    }
}

impl PrioritizedRule for FieldPermission {
    fn rule_id(&self) -> &str {
        self.id.as_str()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }
}

/// Record permission rule: narrows access to records matching a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPermissionRule {
    id: NonEmptyString,
    app_id: AppId,
    #[serde(default)]
    condition: ConditionGroup,
    target_type: RecordTargetType,
    #[serde(default)]
    target_id: Option<String>,
    #[serde(default)]
    target_field: Option<String>,
    #[serde(flatten)]
    capabilities: RecordCapabilities,
    #[serde(default)]
    priority: i32,
}

/// Input payload for constructing a record permission rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPermissionRuleInput {
    /// Records the rule applies to.
    pub condition: ConditionGroup,
    /// Whom the rule applies to.
    pub target_type: RecordTargetType,
    /// Target user, organization or role id.
    pub target_id: Option<String>,
    /// Field holding user ids for `field_value` rules.
    pub target_field: Option<String>,
    /// Capabilities granted on matching records.
    pub capabilities: RecordCapabilities,
    /// Rule priority; higher wins.
    pub priority: i32,
}

impl RecordPermissionRule {
    /// Creates a validated record permission rule.
    pub fn new(
        id: impl Into<String>,
        app_id: AppId,
        input: RecordPermissionRuleInput,
    ) -> AppResult<Self> {
        let rule = Self {
            id: NonEmptyString::new(id)?,
            app_id,
            condition: input.condition,
            target_type: input.target_type,
            target_id: input.target_id,
            target_field: input.target_field,
            capabilities: input.capabilities,
            priority: input.priority,
        };
        rule.validate()?;
        Ok(rule)
    }

    /// Re-checks invariants; used after deserialization.
    pub fn validate(&self) -> AppResult<()> {
        self.condition.validate()?;

        let has_id = self
            .target_id
            .as_deref()
            .is_some_and(|value| !value.trim().is_empty());
        let has_field = self
            .target_field
            .as_deref()
            .is_some_and(|value| !value.trim().is_empty());

        match self.target_type {
            RecordTargetType::User | RecordTargetType::Organization | RecordTargetType::Role => {
                if !has_id {
                    return Err(AppError::Validation(format!(
                        "{} record rules require a target_id",
                        self.target_type.as_str()
                    )));
                }
            }
            RecordTargetType::Creator => {}
            RecordTargetType::FieldValue => {
                if !has_field {
                    return Err(AppError::Validation(
                        "field_value record rules require a target_field".to_owned(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Returns the owning app.
    #[must_use]
    pub fn app_id(&self) -> AppId {
        self.app_id
    }

    /// Returns the record condition.
    #[must_use]
    pub fn condition(&self) -> &ConditionGroup {
        &self.condition
    }

    /// Returns the target type.
    #[must_use]
    pub fn target_type(&self) -> RecordTargetType {
        self.target_type
    }

    /// Returns the target id.
    #[must_use]
    pub fn target_id(&self) -> Option<&str> {
        self.target_id.as_deref()
    }

    /// Returns the target field for `field_value` rules.
    #[must_use]
    pub fn target_field(&self) -> Option<&str> {
        self.target_field.as_deref()
    }

    /// Returns the capabilities granted on matching records.
    #[must_use]
    pub fn capabilities(&self) -> RecordCapabilities {
        self.capabilities
    }
}

impl PrioritizedRule for RecordPermissionRule {
    fn rule_id(&self) -> &str {
        self.id.as_str()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }
}
