use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use dynapp_core::{AppError, AppId, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::ConditionGroup;
use crate::field::{FieldDefinition, FieldType};
use crate::formula::Formula;
use crate::record::{
    CREATED_AT_KEY, CREATED_BY_KEY, Record, RecordData, UPDATED_AT_KEY, UPDATED_BY_KEY,
    is_reserved_key,
};

/// Field schema of one dynamic application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSchema {
    app_id: AppId,
    app_code: NonEmptyString,
    #[serde(default)]
    process_enabled: bool,
    fields: Vec<FieldDefinition>,
}

impl AppSchema {
    /// Creates a validated schema.
    pub fn new(
        app_id: AppId,
        app_code: impl Into<String>,
        process_enabled: bool,
        fields: Vec<FieldDefinition>,
    ) -> AppResult<Self> {
        let schema = Self {
            app_id,
            app_code: NonEmptyString::new(app_code)?,
            process_enabled,
            fields,
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Re-checks every schema invariant; used after deserialization.
    pub fn validate(&self) -> AppResult<()> {
        let mut codes = HashSet::new();
        let mut auto_types = HashSet::new();

        for field in &self.fields {
            field.validate()?;

            if !codes.insert(field.field_code().as_str()) {
                return Err(AppError::Validation(format!(
                    "duplicate field code '{}' in app '{}'",
                    field.field_code(),
                    self.app_code
                )));
            }

            if field.field_type().is_auto() && !auto_types.insert(field.field_type().as_str()) {
                return Err(AppError::Validation(format!(
                    "app '{}' already has a {} field",
                    self.app_code,
                    field.field_type().as_str()
                )));
            }
        }

        for field in self.active_fields() {
            match field.field_type() {
                FieldType::Lookup(config) => {
                    for copy in &config.lookup_copy_fields {
                        let target = self.require_active_field(copy.target_field.as_str())?;
                        if !target.field_type().accepts_input()
                            || matches!(target.field_type(), FieldType::Lookup(_))
                        {
                            return Err(AppError::Validation(format!(
                                "lookup '{}' cannot copy into {} field '{}'",
                                field.field_code(),
                                target.field_type().as_str(),
                                copy.target_field
                            )));
                        }
                    }
                }
                FieldType::RelatedRecords(config) => {
                    self.require_active_field(config.related_this_field.as_str())?;
                }
                _ => {}
            }
        }

        self.calculation_order().map(|_| ())
    }

    /// Returns the app id.
    #[must_use]
    pub fn app_id(&self) -> AppId {
        self.app_id
    }

    /// Returns the app code used by lookups and record stores.
    #[must_use]
    pub fn app_code(&self) -> &NonEmptyString {
        &self.app_code
    }

    /// Returns whether process management is enabled.
    #[must_use]
    pub fn process_enabled(&self) -> bool {
        self.process_enabled
    }

    /// Enables or disables process management.
    pub fn set_process_enabled(&mut self, enabled: bool) {
        self.process_enabled = enabled;
    }

    /// Returns all fields, including retired ones.
    #[must_use]
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    /// Returns active fields ordered for display.
    pub fn active_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|field| field.is_active())
    }

    /// Finds an active field by code.
    #[must_use]
    pub fn field(&self, field_code: &str) -> Option<&FieldDefinition> {
        self.active_fields()
            .find(|field| field.field_code().as_str() == field_code)
    }

    /// Finds an active field by code, or fails with a validation error.
    pub fn require_active_field(&self, field_code: &str) -> AppResult<&FieldDefinition> {
        self.field(field_code).ok_or_else(|| {
            AppError::Validation(format!(
                "field '{field_code}' does not exist in app '{}'",
                self.app_code
            ))
        })
    }

    /// Adds a field, re-validating the whole schema.
    pub fn add_field(&mut self, field: FieldDefinition) -> AppResult<()> {
        self.fields.push(field);
        if let Err(error) = self.validate() {
            self.fields.pop();
            return Err(error);
        }

        Ok(())
    }

    /// Checks this schema against its previously saved version. Field codes
    /// are frozen once persisted, and persisted fields are retired rather
    /// than dropped.
    pub fn ensure_stable_codes(&self, previous: &AppSchema) -> AppResult<()> {
        for stored in previous.fields.iter().filter(|field| !field.is_temporary()) {
            let Some(field) = self.fields.iter().find(|field| field.id() == stored.id()) else {
                return Err(AppError::Conflict(format!(
                    "field '{}' cannot be removed once saved; retire it instead",
                    stored.field_code()
                )));
            };

            if field.field_code() != stored.field_code() {
                return Err(AppError::Conflict(format!(
                    "field code '{}' is immutable once saved and cannot become '{}'",
                    stored.field_code(),
                    field.field_code()
                )));
            }
        }

        Ok(())
    }

    /// Marks every temporary field persisted, freezing its code.
    pub fn mark_persisted(&mut self) {
        for field in &mut self.fields {
            field.mark_persisted();
        }
    }

    /// Soft-retires a field. Rejected while an active formula, lookup or
    /// related-records field still depends on it.
    pub fn retire_field(&mut self, field_code: &str) -> AppResult<()> {
        let dependants: Vec<String> = self
            .active_fields()
            .filter(|field| field.field_code().as_str() != field_code)
            .filter(|field| field_dependencies(field).contains(field_code))
            .map(|field| field.field_code().as_str().to_owned())
            .collect();

        if !dependants.is_empty() {
            return Err(AppError::Conflict(format!(
                "field '{field_code}' is still referenced by {}",
                dependants.join(", ")
            )));
        }

        let field = self
            .fields
            .iter_mut()
            .find(|field| field.is_active() && field.field_code().as_str() == field_code)
            .ok_or_else(|| AppError::NotFound(format!("field '{field_code}' does not exist")))?;
        field.retire();
        Ok(())
    }

    /// Checks that a soft reference names an active field or a metadata key.
    pub fn validate_field_reference(&self, field_code: &str) -> AppResult<()> {
        if is_reserved_key(field_code) || self.field(field_code).is_some() {
            return Ok(());
        }

        Err(AppError::Validation(format!(
            "field '{field_code}' does not exist in app '{}'",
            self.app_code
        )))
    }

    /// Checks every field referenced by a condition group, plus operator arity.
    pub fn validate_condition(&self, condition: &ConditionGroup) -> AppResult<()> {
        condition.validate()?;
        condition
            .referenced_fields()
            .try_for_each(|field_code| self.validate_field_reference(field_code))
    }

    /// Returns calculated field codes ordered so that dependencies come first.
    /// Cycles and non-numeric operands are configuration errors.
    pub fn calculation_order(&self) -> AppResult<Vec<&FieldDefinition>> {
        let mut formulas: BTreeMap<&str, (&FieldDefinition, Formula)> = BTreeMap::new();
        for field in self.active_fields() {
            let FieldType::Calculated(config) = field.field_type() else {
                continue;
            };
            let formula = Formula::parse(config.formula.as_str()).map_err(|error| {
                AppError::Validation(format!(
                    "invalid formula on '{}': {error}",
                    field.field_code()
                ))
            })?;
            for operand in formula.referenced_fields() {
                let referenced = self.field(operand).ok_or_else(|| {
                    AppError::Validation(format!(
                        "formula on '{}' references unknown field '{operand}'",
                        field.field_code()
                    ))
                })?;
                if !referenced.field_type().is_numeric() {
                    return Err(AppError::Validation(format!(
                        "formula on '{}' references non-numeric field '{operand}'",
                        field.field_code()
                    )));
                }
            }
            formulas.insert(field.field_code().as_str(), (field, formula));
        }

        let mut ordered = Vec::with_capacity(formulas.len());
        let mut state: HashMap<&str, VisitState> = HashMap::new();
        for code in formulas.keys() {
            visit(*code, &formulas, &mut state, &mut ordered)?;
        }

        Ok(ordered)
    }

    /// Returns the record snapshot with auto fields populated from metadata.
    #[must_use]
    pub fn project_auto_fields(&self, record: &Record) -> RecordData {
        let mut data = record.data().clone();
        for field in self.active_fields() {
            let value = match field.field_type() {
                FieldType::RecordNumber => Value::from(record.record_number()),
                FieldType::Creator => record.value(CREATED_BY_KEY).clone(),
                FieldType::CreatedTime => record.value(CREATED_AT_KEY).clone(),
                FieldType::Modifier => record.value(UPDATED_BY_KEY).clone(),
                FieldType::ModifiedTime => record.value(UPDATED_AT_KEY).clone(),
                _ => continue,
            };
            data.insert(field.field_code().as_str().to_owned(), value);
        }

        data
    }

    /// Returns a copy of the record whose data carries the projected auto
    /// fields, for evaluating conditions and templates against field codes.
    #[must_use]
    pub fn project_record(&self, record: &Record) -> Record {
        let mut projected = record.clone();
        *projected.data_mut() = self.project_auto_fields(record);
        projected
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Visiting,
    Done,
}

fn visit<'a>(
    code: &'a str,
    formulas: &BTreeMap<&'a str, (&'a FieldDefinition, Formula)>,
    state: &mut HashMap<&'a str, VisitState>,
    ordered: &mut Vec<&'a FieldDefinition>,
) -> AppResult<()> {
    match state.get(code) {
        Some(VisitState::Done) => return Ok(()),
        Some(VisitState::Visiting) => {
            return Err(AppError::Validation(format!(
                "calculated field '{code}' depends on itself"
            )));
        }
        None => {}
    }

    let Some((field, formula)) = formulas.get(code) else {
        return Ok(());
    };

    state.insert(code, VisitState::Visiting);
    for operand in formula.referenced_fields() {
        if let Some((key, _)) = formulas.get_key_value(operand) {
            visit(*key, formulas, state, ordered)?;
        }
    }
    state.insert(code, VisitState::Done);
    ordered.push(*field);
    Ok(())
}

fn field_dependencies(field: &FieldDefinition) -> BTreeSet<String> {
    match field.field_type() {
        FieldType::Calculated(config) => Formula::parse(config.formula.as_str())
            .map(|formula| {
                formula
                    .referenced_fields()
                    .into_iter()
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default(),
        FieldType::Lookup(config) => config
            .lookup_copy_fields
            .iter()
            .map(|copy| copy.target_field.clone())
            .collect(),
        FieldType::RelatedRecords(config) => BTreeSet::from([config.related_this_field.clone()]),
        _ => BTreeSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use dynapp_core::{AppError, AppId};
    use serde_json::{Map, json};

    use super::AppSchema;
    use crate::condition::{Condition, ConditionGroup, ConditionOperator, LogicalMode};
    use crate::field::{
        FieldDefinition, FieldDefinitionInput, FieldType, FormulaConfig, LookupConfig,
        LookupCopyField,
    };
    use crate::formula::FormulaFormat;
    use crate::record::Record;

    fn field(code: &str, field_type: FieldType) -> FieldDefinition {
        FieldDefinition::new(FieldDefinitionInput::new(format!("id_{code}"), code, field_type))
            .unwrap_or_else(|_| unreachable!())
    }

    fn field_with_id(id: &str, code: &str) -> FieldDefinition {
        FieldDefinition::new(FieldDefinitionInput::new(
            id,
            code,
            FieldType::Number { min: None, max: None },
        ))
        .unwrap_or_else(|_| unreachable!())
    }

    fn number(code: &str) -> FieldDefinition {
        field(code, FieldType::Number { min: None, max: None })
    }

    fn calculated(code: &str, formula: &str) -> FieldDefinition {
        field(
            code,
            FieldType::Calculated(FormulaConfig {
                formula: formula.to_owned(),
                formula_format: FormulaFormat::Number,
                formula_decimals: 2,
            }),
        )
    }

    #[test]
    fn auto_fields_are_singletons() {
        let result = AppSchema::new(
            AppId::new(),
            "orders",
            false,
            vec![field("made_by", FieldType::Creator), field("author", FieldType::Creator)],
        );
        assert!(result.is_err());
    }

    #[test]
    fn field_codes_are_unique() {
        let result =
            AppSchema::new(AppId::new(), "orders", false, vec![number("qty"), number("qty")]);
        assert!(result.is_err());
    }

    #[test]
    fn calculation_order_puts_dependencies_first() {
        let schema = AppSchema::new(
            AppId::new(),
            "orders",
            false,
            vec![
                calculated("gross", "net * 1.19"),
                number("qty"),
                number("price"),
                calculated("net", "qty * price"),
            ],
        )
        .unwrap_or_else(|_| unreachable!());

        let order: Vec<&str> = schema
            .calculation_order()
            .unwrap_or_default()
            .into_iter()
            .map(|field| field.field_code().as_str())
            .collect();
        assert_eq!(order, vec!["net", "gross"]);
    }

    #[test]
    fn formula_cycles_and_text_operands_are_rejected() {
        let cycle = AppSchema::new(
            AppId::new(),
            "orders",
            false,
            vec![calculated("a", "b + 1"), calculated("b", "a + 1")],
        );
        assert!(cycle.is_err());

        let text_operand = AppSchema::new(
            AppId::new(),
            "orders",
            false,
            vec![
                field("name", FieldType::SingleLineText { max: None }),
                calculated("x", "name * 2"),
            ],
        );
        assert!(text_operand.is_err());

        let dangling =
            AppSchema::new(AppId::new(), "orders", false, vec![calculated("x", "ghost")]);
        assert!(dangling.is_err());
    }

    #[test]
    fn retiring_a_referenced_field_is_rejected() {
        let mut schema = AppSchema::new(
            AppId::new(),
            "orders",
            false,
            vec![
                number("qty"),
                number("price"),
                calculated("total", "qty * price"),
                number("notes"),
            ],
        )
        .unwrap_or_else(|_| unreachable!());

        assert!(schema.retire_field("qty").is_err());
        assert!(schema.retire_field("notes").is_ok());
        assert!(schema.field("notes").is_none());
        assert!(schema.retire_field("notes").is_err());
    }

    #[test]
    fn persisted_field_codes_are_frozen() {
        let mut saved = AppSchema::new(AppId::new(), "orders", false, vec![number("qty")])
            .unwrap_or_else(|_| unreachable!());
        let draft_rename =
            AppSchema::new(saved.app_id(), "orders", false, vec![field_with_id("id_qty", "amount")])
                .unwrap_or_else(|_| unreachable!());
        assert!(draft_rename.ensure_stable_codes(&saved).is_ok());

        saved.mark_persisted();
        assert!(saved.fields().iter().all(|field| !field.is_temporary()));
        assert!(matches!(
            draft_rename.ensure_stable_codes(&saved),
            Err(AppError::Conflict(_))
        ));

        let dropped = AppSchema::new(saved.app_id(), "orders", false, vec![number("price")])
            .unwrap_or_else(|_| unreachable!());
        assert!(dropped.ensure_stable_codes(&saved).is_err());

        let mut retired = saved.clone();
        assert!(retired.add_field(number("price")).is_ok());
        assert!(retired.retire_field("qty").is_ok());
        assert!(retired.ensure_stable_codes(&saved).is_ok());
    }

    #[test]
    fn lookup_targets_must_exist() {
        let lookup = field(
            "customer",
            FieldType::Lookup(LookupConfig {
                lookup_app_code: "customers".to_owned(),
                lookup_key_field: "code".to_owned(),
                lookup_copy_fields: vec![LookupCopyField {
                    source_field: "name".to_owned(),
                    target_field: "customer_name".to_owned(),
                }],
            }),
        );

        let missing = AppSchema::new(AppId::new(), "orders", false, vec![lookup.clone()]);
        assert!(missing.is_err());

        let present = AppSchema::new(
            AppId::new(),
            "orders",
            false,
            vec![lookup, field("customer_name", FieldType::SingleLineText { max: None })],
        );
        assert!(present.is_ok());
    }

    #[test]
    fn condition_references_are_validated() {
        let schema = AppSchema::new(AppId::new(), "orders", false, vec![number("qty")])
            .unwrap_or_else(|_| unreachable!());
        let known = ConditionGroup::new(
            LogicalMode::And,
            vec![
                Condition::scalar("qty", ConditionOperator::Gt, json!(1))
                    .unwrap_or_else(|_| unreachable!()),
                Condition::scalar("status", ConditionOperator::Eq, json!("closed"))
                    .unwrap_or_else(|_| unreachable!()),
            ],
        );
        let unknown = ConditionGroup::new(
            LogicalMode::And,
            vec![Condition::scalar("ghost", ConditionOperator::Eq, json!("x"))
                .unwrap_or_else(|_| unreachable!())],
        );

        assert!(schema.validate_condition(&known).is_ok());
        assert!(schema.validate_condition(&unknown).is_err());
    }

    #[test]
    fn auto_fields_project_from_metadata() {
        let schema = AppSchema::new(
            AppId::new(),
            "orders",
            false,
            vec![field("no", FieldType::RecordNumber), field("owner", FieldType::Creator)],
        )
        .unwrap_or_else(|_| unreachable!());
        let mut data = Map::new();
        data.insert("created_by".to_owned(), json!("u7"));
        let record = Record::new("r1", 42, data).unwrap_or_else(|_| unreachable!());

        let projected = schema.project_auto_fields(&record);
        assert_eq!(projected.get("no"), Some(&json!(42)));
        assert_eq!(projected.get("owner"), Some(&json!("u7")));
    }
}
