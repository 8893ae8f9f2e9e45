//! Pure permission resolution over the three prioritized rule tables.

use std::collections::{BTreeMap, HashSet};

use dynapp_core::{Actor, AppError, AppResult};
use dynapp_domain::{
    AccessLevel, AppCapabilities, AppPermission, AppSchema, FieldPermission, PrioritizedRule,
    Record, RecordCapabilities, RecordData, RecordPermissionRule, RecordTargetType, STATUS_KEY,
    TargetType, is_reserved_key,
};
use serde::{Deserialize, Serialize};

/// Every permission rule configured on one app.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionRuleSet {
    /// App-level rows.
    #[serde(default)]
    pub app: Vec<AppPermission>,
    /// Field-level rows.
    #[serde(default)]
    pub field: Vec<FieldPermission>,
    /// Record rules.
    #[serde(default)]
    pub record: Vec<RecordPermissionRule>,
}

/// Picks the matching rule with the highest priority.
///
/// Equal priorities go to the lexicographically smallest rule id, so the
/// result never depends on list order.
pub fn pick_highest_priority<'a, R, I, F>(rules: I, mut matches: F) -> Option<&'a R>
where
    R: PrioritizedRule + 'a,
    I: IntoIterator<Item = &'a R>,
    F: FnMut(&R) -> bool,
{
    rules
        .into_iter()
        .filter(|rule| matches(*rule))
        .fold(None, |best: Option<&'a R>, candidate| match best {
            Some(current) if !outranks(candidate, current) => Some(current),
            _ => Some(candidate),
        })
}

fn outranks<R: PrioritizedRule>(candidate: &R, current: &R) -> bool {
    candidate.priority() > current.priority()
        || (candidate.priority() == current.priority() && candidate.rule_id() < current.rule_id())
}

/// Returns whether an app- or field-level target covers the actor.
#[must_use]
pub fn target_matches(
    actor: &Actor,
    target_type: TargetType,
    target_id: Option<&str>,
    include_sub_organizations: bool,
) -> bool {
    match (target_type, target_id) {
        (TargetType::Everyone, _) => true,
        (TargetType::User, Some(id)) => actor.id() == id,
        (TargetType::Role, Some(id)) => actor.has_role(id),
        (TargetType::Organization, Some(id)) => {
            actor.belongs_to_org(id, include_sub_organizations)
        }
        (_, None) => false,
    }
}

/// Resolves app-level capabilities; no matching row denies everything.
#[must_use]
pub fn resolve_app_capabilities(actor: &Actor, rules: &[AppPermission]) -> AppCapabilities {
    pick_highest_priority(rules, |rule| {
        target_matches(
            actor,
            rule.target_type(),
            rule.target_id(),
            rule.include_sub_organizations(),
        )
    })
    .map(AppPermission::capabilities)
    .unwrap_or_else(AppCapabilities::none)
}

/// Returns whether a record rule's target covers the actor on this record.
#[must_use]
pub fn record_target_matches(actor: &Actor, rule: &RecordPermissionRule, record: &Record) -> bool {
    match rule.target_type() {
        RecordTargetType::User => rule.target_id() == Some(actor.id()),
        RecordTargetType::Role => rule.target_id().is_some_and(|id| actor.has_role(id)),
        RecordTargetType::Organization => rule
            .target_id()
            .is_some_and(|id| actor.belongs_to_org(id, false)),
        RecordTargetType::Creator => record.created_by() == Some(actor.id()),
        RecordTargetType::FieldValue => rule.target_field().is_some_and(|field| {
            record
                .actor_ids(field)
                .iter()
                .any(|value| value == actor.id())
        }),
    }
}

/// Resolves record-level capabilities. A matching rule can only narrow the
/// app-level grant; without one the app-level grant applies unchanged.
///
/// Conditions and field-value targets see auto fields under their own codes.
#[must_use]
pub fn resolve_record_capabilities(
    actor: &Actor,
    schema: &AppSchema,
    record: &Record,
    app: AppCapabilities,
    rules: &[RecordPermissionRule],
) -> RecordCapabilities {
    let granted = RecordCapabilities::from(app);
    let projected = schema.project_record(record);

    pick_highest_priority(rules, |rule| {
        rule.condition().matches(projected.data())
            && record_target_matches(actor, rule, &projected)
    })
    .map_or(granted, |rule| rule.capabilities().intersect(granted))
}

/// Capabilities that stand in for the record layer while a record is being
/// created.
#[must_use]
pub fn creation_capabilities(app: AppCapabilities) -> RecordCapabilities {
    RecordCapabilities {
        can_view: app.can_add,
        can_edit: app.can_add,
        can_delete: false,
    }
}

/// Ceiling the field layer can never exceed for a given record grant.
#[must_use]
pub fn access_ceiling(record: RecordCapabilities) -> AccessLevel {
    if record.can_edit {
        AccessLevel::Edit
    } else if record.can_view {
        AccessLevel::View
    } else {
        AccessLevel::Hidden
    }
}

/// Resolves the access level of every active, non-decorative field.
#[must_use]
pub fn resolve_field_access(
    actor: &Actor,
    schema: &AppSchema,
    rules: &[FieldPermission],
    record: RecordCapabilities,
) -> FieldAccessMap {
    let ceiling = access_ceiling(record);
    let levels = schema
        .active_fields()
        .filter(|field| !field.field_type().is_decorative())
        .map(|field| {
            let code = field.field_code().as_str();
            let explicit = pick_highest_priority(
                rules.iter().filter(|rule| rule.field_name().as_str() == code),
                |rule| {
                    target_matches(
                        actor,
                        rule.target_type(),
                        rule.target_id(),
                        rule.include_sub_organizations(),
                    )
                },
            )
            .map(FieldPermission::access_level);

            (code.to_owned(), explicit.map_or(ceiling, |level| level.min(ceiling)))
        })
        .collect();

    FieldAccessMap { levels }
}

/// Resolved access level per field code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldAccessMap {
    levels: BTreeMap<String, AccessLevel>,
}

impl FieldAccessMap {
    /// Returns a field's level; unknown codes are hidden.
    #[must_use]
    pub fn level(&self, field_code: &str) -> AccessLevel {
        self.levels
            .get(field_code)
            .copied()
            .unwrap_or(AccessLevel::Hidden)
    }

    /// Iterates over `(field_code, level)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, AccessLevel)> {
        self.levels
            .iter()
            .map(|(field_code, level)| (field_code.as_str(), *level))
    }

    /// Removes hidden and unknown fields from a read payload. Reserved
    /// metadata keys pass through.
    pub fn redact(&self, data: &mut RecordData) {
        data.retain(|key, _| is_reserved_key(key) || self.level(key) != AccessLevel::Hidden);
    }

    /// Rejects a write payload touching anything but editable fields.
    ///
    /// `status` is free text on apps without process management and may be
    /// written there; every other reserved key is engine-owned.
    pub fn enforce_writable(&self, schema: &AppSchema, data: &RecordData) -> AppResult<()> {
        for key in data.keys() {
            if key == STATUS_KEY && !schema.process_enabled() {
                continue;
            }
            if is_reserved_key(key) {
                return Err(AppError::Forbidden(format!(
                    "reserved key '{key}' cannot be written"
                )));
            }

            match self.levels.get(key) {
                None => {
                    return Err(AppError::Validation(format!("unknown field code '{key}'")));
                }
                Some(AccessLevel::Edit) => {}
                Some(level) => {
                    return Err(AppError::Forbidden(format!(
                        "field '{key}' is {} for this actor",
                        match level {
                            AccessLevel::View => "read-only",
                            _ => "hidden",
                        }
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Effective access of one actor on one app, and optionally one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveAccess {
    /// App-level capabilities.
    pub app: AppCapabilities,
    /// Record-level capabilities after narrowing.
    pub record: RecordCapabilities,
    /// Per-field access levels.
    pub fields: FieldAccessMap,
}

/// Runs the three layers in order for one actor.
///
/// Without a record the creation capabilities stand in for the record layer.
#[must_use]
pub fn resolve_effective_access(
    actor: &Actor,
    schema: &AppSchema,
    rules: &PermissionRuleSet,
    record: Option<&Record>,
) -> EffectiveAccess {
    let app = resolve_app_capabilities(actor, &rules.app);
    let record_capabilities = match record {
        Some(record) => resolve_record_capabilities(actor, schema, record, app, &rules.record),
        None => creation_capabilities(app),
    };
    let fields = resolve_field_access(actor, schema, &rules.field, record_capabilities);

    EffectiveAccess {
        app,
        record: record_capabilities,
        fields,
    }
}

/// Rewrites the priority column so the first id ranks highest.
///
/// `ids_in_order` must name every rule exactly once.
pub fn reorder_priorities<R: PrioritizedRule>(
    rules: &mut [R],
    ids_in_order: &[String],
) -> AppResult<()> {
    let known: HashSet<&str> = rules.iter().map(PrioritizedRule::rule_id).collect();
    let mut seen = HashSet::new();
    for id in ids_in_order {
        if !known.contains(id.as_str()) {
            return Err(AppError::Validation(format!("unknown rule id '{id}'")));
        }
        if !seen.insert(id.as_str()) {
            return Err(AppError::Validation(format!("rule id '{id}' listed twice")));
        }
    }
    if seen.len() != known.len() {
        return Err(AppError::Validation(format!(
            "reorder must list all {} rules, got {}",
            known.len(),
            seen.len()
        )));
    }

    let count = ids_in_order.len();
    for rule in rules.iter_mut() {
        let position = ids_in_order
            .iter()
            .position(|id| id == rule.rule_id())
            .unwrap_or(count);
        let priority = i32::try_from(count - position)
            .map_err(|_| AppError::Validation("too many rules to reorder".to_owned()))?;
        rule.set_priority(priority);
    }

    Ok(())
}
