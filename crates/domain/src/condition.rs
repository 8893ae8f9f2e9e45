use std::fmt::{Display, Formatter};

use dynapp_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::RecordData;

/// Logical fold applied to the leaf results of a condition group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogicalMode {
    /// All conditions must match.
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    /// Any condition may match.
    #[serde(rename = "OR", alias = "or")]
    Or,
}

/// Comparison operator of one leaf condition.
///
/// Unknown operators survive a round trip so persisted configuration is kept
/// verbatim, and never match during evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionOperator {
    /// Equality comparison.
    Eq,
    /// Inequality comparison.
    Ne,
    /// Membership in the `values` list.
    In,
    /// Absence from the `values` list.
    NotIn,
    /// Numeric greater-than comparison.
    Gt,
    /// Numeric less-than comparison.
    Lt,
    /// Numeric greater-than-or-equal comparison.
    Gte,
    /// Numeric less-than-or-equal comparison.
    Lte,
    /// Case-sensitive substring test.
    Contains,
    /// Operator not known to this engine.
    Unknown(String),
}

impl ConditionOperator {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::Contains => "contains",
            Self::Unknown(value) => value.as_str(),
        }
    }

    /// Returns whether the operator compares against a `values` list.
    #[must_use]
    pub fn takes_list(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

impl From<String> for ConditionOperator {
    fn from(value: String) -> Self {
        match value.as_str() {
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            "in" => Self::In,
            "not_in" => Self::NotIn,
            "gt" => Self::Gt,
            "lt" => Self::Lt,
            "gte" => Self::Gte,
            "lte" => Self::Lte,
            "contains" => Self::Contains,
            _ => Self::Unknown(value),
        }
    }
}

impl From<ConditionOperator> for String {
    fn from(value: ConditionOperator) -> Self {
        value.as_str().to_owned()
    }
}

impl Display for ConditionOperator {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// One field comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    field: NonEmptyString,
    operator: ConditionOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    values: Option<Vec<Value>>,
}

impl Condition {
    /// Creates a scalar comparison.
    pub fn scalar(
        field: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<Value>,
    ) -> AppResult<Self> {
        let condition = Self {
            field: NonEmptyString::new(field)?,
            operator,
            value: Some(value.into()),
            values: None,
        };
        condition.validate()?;
        Ok(condition)
    }

    /// Creates an `in`/`not_in` comparison.
    pub fn list(
        field: impl Into<String>,
        operator: ConditionOperator,
        values: Vec<Value>,
    ) -> AppResult<Self> {
        let condition = Self {
            field: NonEmptyString::new(field)?,
            operator,
            value: None,
            values: Some(values),
        };
        condition.validate()?;
        Ok(condition)
    }

    /// Returns the referenced field code.
    #[must_use]
    pub fn field(&self) -> &NonEmptyString {
        &self.field
    }

    /// Returns the operator.
    #[must_use]
    pub fn operator(&self) -> &ConditionOperator {
        &self.operator
    }

    /// Returns the scalar comparison value.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Returns the list comparison values.
    #[must_use]
    pub fn values(&self) -> Option<&[Value]> {
        self.values.as_deref()
    }

    /// Checks operator arity: list operators take `values`, the rest a scalar `value`.
    pub fn validate(&self) -> AppResult<()> {
        if let ConditionOperator::Unknown(operator) = &self.operator {
            return Err(AppError::Validation(format!(
                "condition on '{}' uses unknown operator '{operator}'",
                self.field
            )));
        }

        if self.operator.takes_list() {
            if self.values.is_none() {
                return Err(AppError::Validation(format!(
                    "condition on '{}' with operator '{}' requires values",
                    self.field, self.operator
                )));
            }
            return Ok(());
        }

        match &self.value {
            Some(Value::Array(_) | Value::Object(_)) | None => Err(AppError::Validation(format!(
                "condition on '{}' with operator '{}' requires a scalar value",
                self.field, self.operator
            ))),
            Some(_) => Ok(()),
        }
    }

    /// Evaluates this leaf against a record snapshot. Never fails; malformed
    /// leaves do not match.
    #[must_use]
    pub fn matches(&self, record: &RecordData) -> bool {
        let actual = record.get(self.field.as_str()).unwrap_or(&Value::Null);

        match &self.operator {
            ConditionOperator::Eq => self
                .value
                .as_ref()
                .is_some_and(|expected| values_equal(actual, expected)),
            ConditionOperator::Ne => self
                .value
                .as_ref()
                .is_some_and(|expected| !values_equal(actual, expected)),
            ConditionOperator::Gt => self.compare_numbers(actual, |left, right| left > right),
            ConditionOperator::Lt => self.compare_numbers(actual, |left, right| left < right),
            ConditionOperator::Gte => self.compare_numbers(actual, |left, right| left >= right),
            ConditionOperator::Lte => self.compare_numbers(actual, |left, right| left <= right),
            ConditionOperator::In => self
                .values
                .as_deref()
                .is_some_and(|values| is_member(actual, values)),
            ConditionOperator::NotIn => self
                .values
                .as_deref()
                .is_some_and(|values| !is_member(actual, values)),
            ConditionOperator::Contains => self.value.as_ref().is_some_and(|expected| {
                let needle = value_as_text(expected);
                match actual {
                    Value::Array(items) => items
                        .iter()
                        .any(|item| value_as_text(item).contains(needle.as_str())),
                    _ => value_as_text(actual).contains(needle.as_str()),
                }
            }),
            ConditionOperator::Unknown(_) => false,
        }
    }

    fn compare_numbers(&self, actual: &Value, compare: impl Fn(f64, f64) -> bool) -> bool {
        let Some(expected) = self.value.as_ref().and_then(value_as_number) else {
            return false;
        };

        value_as_number(actual).is_some_and(|actual| compare(actual, expected))
    }
}

/// Flat AND/OR list of field comparisons.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionGroup {
    #[serde(default)]
    logic: LogicalMode,
    #[serde(default)]
    conditions: Vec<Condition>,
}

impl ConditionGroup {
    /// Creates a condition group.
    #[must_use]
    pub fn new(logic: LogicalMode, conditions: Vec<Condition>) -> Self {
        Self { logic, conditions }
    }

    /// Returns the group that matches every record.
    #[must_use]
    pub fn match_all() -> Self {
        Self::default()
    }

    /// Parses persisted condition JSON. A document that does not parse at all
    /// is a configuration error.
    pub fn from_json(raw: &str) -> AppResult<Self> {
        serde_json::from_str(raw)
            .map_err(|error| AppError::configuration_invalid(format!("condition JSON ({error})")))
    }

    /// Serializes the group back to its persisted JSON form.
    pub fn to_json(&self) -> AppResult<String> {
        serde_json::to_string(self)
            .map_err(|error| AppError::Internal(format!("failed to encode condition: {error}")))
    }

    /// Returns the logical fold.
    #[must_use]
    pub fn logic(&self) -> LogicalMode {
        self.logic
    }

    /// Returns the leaf conditions.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Returns the field codes referenced by the leaves.
    pub fn referenced_fields(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(|condition| condition.field.as_str())
    }

    /// Validates every leaf.
    pub fn validate(&self) -> AppResult<()> {
        self.conditions.iter().try_for_each(Condition::validate)
    }

    /// Evaluates the group. An empty group matches every record.
    #[must_use]
    pub fn matches(&self, record: &RecordData) -> bool {
        if self.conditions.is_empty() {
            return true;
        }

        match self.logic {
            LogicalMode::And => self.conditions.iter().all(|condition| condition.matches(record)),
            LogicalMode::Or => self.conditions.iter().any(|condition| condition.matches(record)),
        }
    }
}

/// Coerces a value to a number. Numeric strings count; booleans, arrays and
/// objects do not.
#[must_use]
pub fn value_as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|number| number.is_finite())
        }
        _ => None,
    }
}

/// Coerces a value to its display string; `null` becomes the empty string.
#[must_use]
pub fn value_as_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(content) => content.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_as_text)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    }
}

// Numeric fields hold JSON numbers, so the stored value decides the comparison.
fn values_equal(actual: &Value, expected: &Value) -> bool {
    if actual.is_number() {
        return match (value_as_number(actual), value_as_number(expected)) {
            (Some(left), Some(right)) => left == right,
            _ => false,
        };
    }

    value_as_text(actual) == value_as_text(expected)
}

fn is_member(actual: &Value, values: &[Value]) -> bool {
    match actual {
        Value::Array(items) => items
            .iter()
            .any(|item| values.iter().any(|candidate| values_equal(item, candidate))),
        _ => values.iter().any(|candidate| values_equal(actual, candidate)),
    }
}
