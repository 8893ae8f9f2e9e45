use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveTime};
use dynapp_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::formula::{Formula, FormulaFormat};
use crate::record::is_reserved_key;

/// Largest accepted per-file upload size in megabytes.
pub const MAX_FILE_SIZE_MB: u32 = 50;
/// Largest accepted number of files per upload field.
pub const MAX_FILES: u32 = 20;
/// Largest accepted number of decimals for calculated fields.
pub const MAX_FORMULA_DECIMALS: u8 = 10;

/// Broad category of a field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldCategory {
    /// Directly entered value.
    Input,
    /// Read-only value populated from record metadata.
    Auto,
    /// Layout element without a stored value.
    Decorative,
    /// Value derived from other fields or other apps.
    Reference,
    /// Reference to users, organizations or groups.
    EntitySelect,
    /// Composite or binary payload.
    Structural,
}

/// Link flavour of a `link` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    /// Web address.
    Url,
    /// Telephone number.
    Tel,
    /// Email address.
    Email,
}

/// One source-to-target mapping copied on lookup match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupCopyField {
    /// Field code in the referenced app.
    pub source_field: String,
    /// Field code in this app.
    pub target_field: String,
}

/// Lookup configuration: copy fields from the first remote record whose key matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Referenced app code.
    pub lookup_app_code: String,
    /// Key field code in the referenced app.
    pub lookup_key_field: String,
    /// Field mappings copied on match.
    #[serde(default)]
    pub lookup_copy_fields: Vec<LookupCopyField>,
}

/// Related-records configuration: live projection of remote records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedRecordsConfig {
    /// Referenced app code.
    pub related_app_code: String,
    /// Field code in the referenced app compared against this record.
    pub related_key_field: String,
    /// Field code in this app supplying the comparison value.
    pub related_this_field: String,
    /// Remote field codes shown in the projection.
    #[serde(default)]
    pub related_display_fields: Vec<String>,
}

/// Calculated field configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaConfig {
    /// Arithmetic formula text.
    pub formula: String,
    /// Presentation format.
    #[serde(default)]
    pub formula_format: FormulaFormat,
    /// Rendered decimals.
    #[serde(default)]
    pub formula_decimals: u8,
}

/// Subtable configuration: ordered rows keyed by sub-field code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtableConfig {
    /// Minimum number of rows.
    #[serde(default)]
    pub min_rows: Option<u32>,
    /// Maximum number of rows.
    #[serde(default)]
    pub max_rows: Option<u32>,
    /// Whether users may append rows.
    #[serde(default = "default_true")]
    pub allow_add: bool,
    /// Whether users may remove rows.
    #[serde(default = "default_true")]
    pub allow_delete: bool,
    /// Column definitions of each row.
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

fn default_true() -> bool {
    true
}

/// Closed set of field types, each carrying its type-specific validation config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    /// One line of text.
    SingleLineText {
        /// Maximum character count.
        #[serde(default)]
        max: Option<u32>,
    },
    /// Multi-line text.
    MultiLineText {
        /// Maximum character count.
        #[serde(default)]
        max: Option<u32>,
    },
    /// Numeric value.
    Number {
        /// Inclusive lower bound.
        #[serde(default)]
        min: Option<f64>,
        /// Inclusive upper bound.
        #[serde(default)]
        max: Option<f64>,
    },
    /// Calendar date (`YYYY-MM-DD`).
    Date,
    /// Time of day (`HH:MM` or `HH:MM:SS`).
    Time,
    /// RFC 3339 timestamp.
    Datetime,
    /// URL, telephone number or email address.
    Link {
        /// Link flavour.
        link_type: LinkType,
    },
    /// Single choice from a dropdown.
    Dropdown,
    /// Single choice from radio buttons.
    RadioButton,
    /// Multiple choices from checkboxes.
    Checkbox,
    /// Multiple choices from a list.
    MultiSelect,
    /// Sequential per-app record number.
    RecordNumber,
    /// User who created the record.
    Creator,
    /// Creation timestamp.
    CreatedTime,
    /// User who last modified the record.
    Modifier,
    /// Last modification timestamp.
    ModifiedTime,
    /// Static text.
    Label,
    /// Blank layout cell.
    Space,
    /// Horizontal rule.
    Hr,
    /// Key field copying values from another app.
    Lookup(LookupConfig),
    /// Live list of records in another app.
    RelatedRecords(RelatedRecordsConfig),
    /// Arithmetic over numeric sibling fields.
    Calculated(FormulaConfig),
    /// User reference.
    UserSelect {
        /// Whether several users may be selected.
        #[serde(default)]
        allow_multiple: bool,
    },
    /// Organization reference.
    OrgSelect {
        /// Whether several organizations may be selected.
        #[serde(default)]
        allow_multiple: bool,
    },
    /// Group reference.
    GroupSelect {
        /// Whether several groups may be selected.
        #[serde(default)]
        allow_multiple: bool,
    },
    /// Ordered list of sub-rows.
    Subtable(SubtableConfig),
    /// Uploaded files.
    FileUpload {
        /// Per-file size limit in megabytes.
        max_file_size: u32,
        /// Maximum number of files.
        max_files: u32,
    },
    /// Formatted rich text.
    RichEditor,
}

impl FieldType {
    /// Returns the stable storage value of the type tag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleLineText { .. } => "single_line_text",
            Self::MultiLineText { .. } => "multi_line_text",
            Self::Number { .. } => "number",
            Self::Date => "date",
            Self::Time => "time",
            Self::Datetime => "datetime",
            Self::Link { .. } => "link",
            Self::Dropdown => "dropdown",
            Self::RadioButton => "radio_button",
            Self::Checkbox => "checkbox",
            Self::MultiSelect => "multi_select",
            Self::RecordNumber => "record_number",
            Self::Creator => "creator",
            Self::CreatedTime => "created_time",
            Self::Modifier => "modifier",
            Self::ModifiedTime => "modified_time",
            Self::Label => "label",
            Self::Space => "space",
            Self::Hr => "hr",
            Self::Lookup(_) => "lookup",
            Self::RelatedRecords(_) => "related_records",
            Self::Calculated(_) => "calculated",
            Self::UserSelect { .. } => "user_select",
            Self::OrgSelect { .. } => "org_select",
            Self::GroupSelect { .. } => "group_select",
            Self::Subtable(_) => "subtable",
            Self::FileUpload { .. } => "file_upload",
            Self::RichEditor => "rich_editor",
        }
    }

    /// Returns the broad category.
    #[must_use]
    pub fn category(&self) -> FieldCategory {
        match self {
            Self::SingleLineText { .. }
            | Self::MultiLineText { .. }
            | Self::Number { .. }
            | Self::Date
            | Self::Time
            | Self::Datetime
            | Self::Link { .. }
            | Self::Dropdown
            | Self::RadioButton
            | Self::Checkbox
            | Self::MultiSelect => FieldCategory::Input,
            Self::RecordNumber
            | Self::Creator
            | Self::CreatedTime
            | Self::Modifier
            | Self::ModifiedTime => FieldCategory::Auto,
            Self::Label | Self::Space | Self::Hr => FieldCategory::Decorative,
            Self::Lookup(_) | Self::RelatedRecords(_) | Self::Calculated(_) => {
                FieldCategory::Reference
            }
            Self::UserSelect { .. } | Self::OrgSelect { .. } | Self::GroupSelect { .. } => {
                FieldCategory::EntitySelect
            }
            Self::Subtable(_) | Self::FileUpload { .. } | Self::RichEditor => {
                FieldCategory::Structural
            }
        }
    }

    /// Returns whether values come from record metadata.
    #[must_use]
    pub fn is_auto(&self) -> bool {
        self.category() == FieldCategory::Auto
    }

    /// Returns whether the type stores no value.
    #[must_use]
    pub fn is_decorative(&self) -> bool {
        self.category() == FieldCategory::Decorative
    }

    /// Returns whether the value is derived from other fields or apps.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.category() == FieldCategory::Reference
    }

    /// Returns whether the field holds a number usable as a formula operand.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Number { .. } | Self::Calculated(_))
    }

    /// Returns whether the type selects from the field's option list.
    #[must_use]
    pub fn uses_options(&self) -> bool {
        matches!(
            self,
            Self::Dropdown | Self::RadioButton | Self::Checkbox | Self::MultiSelect
        )
    }

    /// Returns whether the stored value is a list.
    #[must_use]
    pub fn is_multi_valued(&self) -> bool {
        match self {
            Self::Checkbox | Self::MultiSelect | Self::Subtable(_) | Self::FileUpload { .. } => {
                true
            }
            Self::UserSelect { allow_multiple }
            | Self::OrgSelect { allow_multiple }
            | Self::GroupSelect { allow_multiple } => *allow_multiple,
            _ => false,
        }
    }

    /// Returns whether clients may supply a value for this type.
    #[must_use]
    pub fn accepts_input(&self) -> bool {
        match self.category() {
            FieldCategory::Auto | FieldCategory::Decorative => false,
            FieldCategory::Reference => matches!(self, Self::Lookup(_)),
            FieldCategory::Input | FieldCategory::EntitySelect | FieldCategory::Structural => true,
        }
    }

    /// Returns whether the type stores a value at all.
    #[must_use]
    pub fn stores_value(&self) -> bool {
        !self.is_decorative() && !matches!(self, Self::RelatedRecords(_))
    }

    fn validate_config(&self) -> AppResult<()> {
        match self {
            Self::SingleLineText { max } | Self::MultiLineText { max } => {
                if *max == Some(0) {
                    return Err(AppError::Validation(
                        "text max length must be greater than zero".to_owned(),
                    ));
                }
            }
            Self::Number { min, max } => {
                if let (Some(min), Some(max)) = (min, max)
                    && min > max
                {
                    return Err(AppError::Validation(format!(
                        "number min {min} must not exceed max {max}"
                    )));
                }
            }
            Self::FileUpload {
                max_file_size,
                max_files,
            } => {
                if *max_file_size == 0 || *max_file_size > MAX_FILE_SIZE_MB {
                    return Err(AppError::Validation(format!(
                        "max_file_size must be between 1 and {MAX_FILE_SIZE_MB} MB"
                    )));
                }
                if *max_files == 0 || *max_files > MAX_FILES {
                    return Err(AppError::Validation(format!(
                        "max_files must be between 1 and {MAX_FILES}"
                    )));
                }
            }
            Self::Lookup(config) => {
                require_code("lookup_app_code", &config.lookup_app_code)?;
                require_code("lookup_key_field", &config.lookup_key_field)?;
                let mut targets = HashSet::new();
                for copy in &config.lookup_copy_fields {
                    require_code("source_field", &copy.source_field)?;
                    require_code("target_field", &copy.target_field)?;
                    if !targets.insert(copy.target_field.as_str()) {
                        return Err(AppError::Validation(format!(
                            "lookup copies into '{}' more than once",
                            copy.target_field
                        )));
                    }
                }
            }
            Self::RelatedRecords(config) => {
                require_code("related_app_code", &config.related_app_code)?;
                require_code("related_key_field", &config.related_key_field)?;
                require_code("related_this_field", &config.related_this_field)?;
            }
            Self::Calculated(config) => {
                Formula::parse(config.formula.as_str()).map_err(|error| {
                    AppError::Validation(format!("invalid formula '{}': {error}", config.formula))
                })?;
                if config.formula_decimals > MAX_FORMULA_DECIMALS {
                    return Err(AppError::Validation(format!(
                        "formula_decimals must not exceed {MAX_FORMULA_DECIMALS}"
                    )));
                }
            }
            Self::Subtable(config) => {
                if let (Some(min), Some(max)) = (config.min_rows, config.max_rows)
                    && min > max
                {
                    return Err(AppError::Validation(format!(
                        "subtable min_rows {min} must not exceed max_rows {max}"
                    )));
                }
                if config.fields.is_empty() {
                    return Err(AppError::Validation(
                        "subtables require at least one sub-field".to_owned(),
                    ));
                }
                let mut seen = HashSet::new();
                for field in &config.fields {
                    if !matches!(
                        field.field_type().category(),
                        FieldCategory::Input | FieldCategory::EntitySelect
                    ) {
                        return Err(AppError::Validation(format!(
                            "sub-field '{}' has unsupported type '{}'",
                            field.field_code(),
                            field.field_type().as_str()
                        )));
                    }
                    if !seen.insert(field.field_code().as_str()) {
                        return Err(AppError::Validation(format!(
                            "duplicate sub-field code '{}'",
                            field.field_code()
                        )));
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }
}

fn require_code(name: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{name} must not be empty")));
    }

    Ok(())
}

/// One choice of a choice-type field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    /// Stored value.
    pub value: String,
    /// Display label.
    pub label: String,
}

/// Form grid placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLayout {
    /// Ordering among all fields.
    pub display_order: i32,
    /// Grid row.
    pub row_index: i32,
    /// Grid column.
    pub col_index: i32,
    /// Number of grid columns spanned.
    pub col_span: i32,
}

impl Default for FieldLayout {
    fn default() -> Self {
        Self {
            display_order: 0,
            row_index: 0,
            col_index: 0,
            col_span: 1,
        }
    }
}

/// Input payload for constructing a field definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinitionInput {
    /// Stable field id.
    pub id: String,
    /// Field code, unique within the app.
    pub field_code: String,
    /// Field type with its validation config.
    pub field_type: FieldType,
    /// Labels by locale.
    pub label: BTreeMap<String, String>,
    /// Descriptions by locale.
    pub description: BTreeMap<String, String>,
    /// Whether a value is mandatory.
    pub required: bool,
    /// Whether values must be unique across records.
    pub unique_field: bool,
    /// Default value for new records.
    pub default_value: Option<Value>,
    /// Choices for choice types.
    pub options: Vec<FieldOption>,
    /// Grid placement.
    pub layout: FieldLayout,
}

impl FieldDefinitionInput {
    /// Creates an input with defaults for everything except identity and type.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        field_code: impl Into<String>,
        field_type: FieldType,
    ) -> Self {
        Self {
            id: id.into(),
            field_code: field_code.into(),
            field_type,
            label: BTreeMap::new(),
            description: BTreeMap::new(),
            required: false,
            unique_field: false,
            default_value: None,
            options: Vec::new(),
            layout: FieldLayout::default(),
        }
    }
}

/// Schema slot of one app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    id: NonEmptyString,
    field_code: NonEmptyString,
    field_type: FieldType,
    #[serde(default)]
    label: BTreeMap<String, String>,
    #[serde(default)]
    description: BTreeMap<String, String>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    unique_field: bool,
    #[serde(default)]
    default_value: Option<Value>,
    #[serde(default)]
    options: Vec<FieldOption>,
    #[serde(default)]
    layout: FieldLayout,
    #[serde(default = "default_true")]
    is_active: bool,
    #[serde(default)]
    is_temporary: bool,
}

impl FieldDefinition {
    /// Creates a validated, temporary (not yet persisted) field definition.
    pub fn new(input: FieldDefinitionInput) -> AppResult<Self> {
        let field = Self {
            id: NonEmptyString::new(input.id)?,
            field_code: NonEmptyString::new(input.field_code)?,
            field_type: input.field_type,
            label: input.label,
            description: input.description,
            required: input.required,
            unique_field: input.unique_field,
            default_value: input.default_value,
            options: input.options,
            layout: input.layout,
            is_active: true,
            is_temporary: true,
        };
        field.validate()?;
        Ok(field)
    }

    /// Re-checks every definition invariant; used after deserialization.
    pub fn validate(&self) -> AppResult<()> {
        validate_field_code(self.field_code.as_str())?;
        self.field_type.validate_config()?;

        let type_name = self.field_type.as_str();
        if self.field_type.uses_options() {
            if self.options.is_empty() {
                return Err(AppError::Validation(format!(
                    "{type_name} field '{}' requires options",
                    self.field_code
                )));
            }
            let mut seen = HashSet::new();
            for option in &self.options {
                if !seen.insert(option.value.as_str()) {
                    return Err(AppError::Validation(format!(
                        "duplicate option value '{}' on field '{}'",
                        option.value, self.field_code
                    )));
                }
            }
        } else if !self.options.is_empty() {
            return Err(AppError::Validation(format!(
                "options are not allowed on {type_name} field '{}'",
                self.field_code
            )));
        }

        if self.unique_field
            && (!self.field_type.accepts_input()
                || self.field_type.is_multi_valued()
                || matches!(self.field_type, FieldType::RichEditor))
        {
            return Err(AppError::Validation(format!(
                "unique constraints are not supported for {type_name} field '{}'",
                self.field_code
            )));
        }

        if self.required && !self.field_type.accepts_input() {
            return Err(AppError::Validation(format!(
                "{type_name} field '{}' cannot be required",
                self.field_code
            )));
        }

        if self.layout.col_span <= 0 {
            return Err(AppError::Validation(format!(
                "col_span of field '{}' must be greater than zero",
                self.field_code
            )));
        }

        if let Some(default_value) = &self.default_value {
            if !self.field_type.accepts_input() {
                return Err(AppError::Validation(format!(
                    "{type_name} field '{}' cannot have a default value",
                    self.field_code
                )));
            }
            self.validate_value(default_value)?;
        }

        Ok(())
    }

    /// Returns the stable field id.
    #[must_use]
    pub fn id(&self) -> &NonEmptyString {
        &self.id
    }

    /// Returns the field code.
    #[must_use]
    pub fn field_code(&self) -> &NonEmptyString {
        &self.field_code
    }

    /// Returns the field type.
    #[must_use]
    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    /// Returns the label for a locale, falling back to the first label.
    #[must_use]
    pub fn label(&self, locale: &str) -> Option<&str> {
        self.label
            .get(locale)
            .or_else(|| self.label.values().next())
            .map(String::as_str)
    }

    /// Returns the description for a locale.
    #[must_use]
    pub fn description(&self, locale: &str) -> Option<&str> {
        self.description.get(locale).map(String::as_str)
    }

    /// Returns whether a value is mandatory.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Returns whether values must be unique.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique_field
    }

    /// Returns the configured default value.
    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    /// Returns the choices.
    #[must_use]
    pub fn options(&self) -> &[FieldOption] {
        &self.options
    }

    /// Returns the grid placement.
    #[must_use]
    pub fn layout(&self) -> FieldLayout {
        self.layout
    }

    /// Returns whether the field is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns whether the field has never been persisted.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.is_temporary
    }

    /// Marks the field persisted; its code is frozen from now on.
    pub fn mark_persisted(&mut self) {
        self.is_temporary = false;
    }

    /// Soft-retires the field.
    pub fn retire(&mut self) {
        self.is_active = false;
    }

    /// Returns the initial stored value for a new record, or `None` when the
    /// type stores nothing or is populated elsewhere.
    #[must_use]
    pub fn default_value_for(&self) -> Option<Value> {
        if !self.field_type.stores_value() || self.field_type.is_auto() {
            return None;
        }

        if let Some(default_value) = &self.default_value {
            return Some(default_value.clone());
        }

        match &self.field_type {
            FieldType::Calculated(_) => None,
            FieldType::Subtable(config) => {
                let rows = (0..config.min_rows.unwrap_or(0))
                    .map(|_| Value::Object(empty_subtable_row(config)))
                    .collect();
                Some(Value::Array(rows))
            }
            field_type if field_type.is_multi_valued() => Some(Value::Array(Vec::new())),
            FieldType::SingleLineText { .. }
            | FieldType::MultiLineText { .. }
            | FieldType::RichEditor => Some(Value::String(String::new())),
            _ => Some(Value::Null),
        }
    }

    /// Validates a client-supplied or default value against the type.
    /// `null` is accepted here; required checks are separate.
    pub fn validate_value(&self, value: &Value) -> AppResult<()> {
        if value.is_null() {
            return Ok(());
        }

        let code = self.field_code.as_str();
        let mismatch = || {
            AppError::Validation(format!(
                "value for '{code}' does not match field type '{}'",
                self.field_type.as_str()
            ))
        };

        match &self.field_type {
            FieldType::SingleLineText { max } | FieldType::MultiLineText { max } => {
                let text = value.as_str().ok_or_else(mismatch)?;
                if let Some(max) = max
                    && text.chars().count() > *max as usize
                {
                    return Err(AppError::Validation(format!(
                        "value for '{code}' exceeds {max} characters"
                    )));
                }
            }
            FieldType::RichEditor => {
                value.as_str().ok_or_else(mismatch)?;
            }
            FieldType::Number { min, max } => {
                let number = value.as_f64().ok_or_else(mismatch)?;
                if let Some(min) = min
                    && number < *min
                {
                    return Err(AppError::Validation(format!(
                        "value for '{code}' is below minimum {min}"
                    )));
                }
                if let Some(max) = max
                    && number > *max
                {
                    return Err(AppError::Validation(format!(
                        "value for '{code}' is above maximum {max}"
                    )));
                }
            }
            FieldType::Date => {
                let text = value.as_str().ok_or_else(mismatch)?;
                NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| mismatch())?;
            }
            FieldType::Time => {
                let text = value.as_str().ok_or_else(mismatch)?;
                NaiveTime::parse_from_str(text, "%H:%M:%S")
                    .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
                    .map_err(|_| mismatch())?;
            }
            FieldType::Datetime => {
                let text = value.as_str().ok_or_else(mismatch)?;
                DateTime::parse_from_rfc3339(text).map_err(|_| mismatch())?;
            }
            FieldType::Link { link_type } => {
                let text = value.as_str().ok_or_else(mismatch)?;
                if !link_is_valid(*link_type, text) {
                    return Err(AppError::Validation(format!(
                        "value for '{code}' is not a valid {} link",
                        match link_type {
                            LinkType::Url => "url",
                            LinkType::Tel => "tel",
                            LinkType::Email => "email",
                        }
                    )));
                }
            }
            FieldType::Dropdown | FieldType::RadioButton => {
                let choice = value.as_str().ok_or_else(mismatch)?;
                self.require_option(choice)?;
            }
            FieldType::Checkbox | FieldType::MultiSelect => {
                let choices = value.as_array().ok_or_else(mismatch)?;
                for choice in choices {
                    self.require_option(choice.as_str().ok_or_else(mismatch)?)?;
                }
            }
            FieldType::UserSelect { allow_multiple }
            | FieldType::OrgSelect { allow_multiple }
            | FieldType::GroupSelect { allow_multiple } => {
                if *allow_multiple {
                    let ids = value.as_array().ok_or_else(mismatch)?;
                    if !ids.iter().all(|id| id.as_str().is_some_and(|id| !id.trim().is_empty())) {
                        return Err(mismatch());
                    }
                } else if value.as_str().is_none_or(|id| id.trim().is_empty()) {
                    return Err(mismatch());
                }
            }
            FieldType::Lookup(_) => {
                if !(value.is_string() || value.is_number()) {
                    return Err(mismatch());
                }
            }
            FieldType::Subtable(config) => self.validate_subtable(config, value)?,
            FieldType::FileUpload {
                max_file_size,
                max_files,
            } => {
                let files = value.as_array().ok_or_else(mismatch)?;
                if files.len() > *max_files as usize {
                    return Err(AppError::Validation(format!(
                        "'{code}' accepts at most {max_files} files"
                    )));
                }
                let limit_bytes = u64::from(*max_file_size) * 1024 * 1024;
                for file in files {
                    let file = file.as_object().ok_or_else(mismatch)?;
                    let size = file.get("size").and_then(Value::as_u64).unwrap_or(0);
                    if size > limit_bytes {
                        return Err(AppError::Validation(format!(
                            "a file in '{code}' exceeds {max_file_size} MB"
                        )));
                    }
                }
            }
            FieldType::RecordNumber
            | FieldType::Creator
            | FieldType::CreatedTime
            | FieldType::Modifier
            | FieldType::ModifiedTime
            | FieldType::Label
            | FieldType::Space
            | FieldType::Hr
            | FieldType::RelatedRecords(_)
            | FieldType::Calculated(_) => {
                return Err(AppError::Validation(format!(
                    "'{code}' is a {} field and does not accept values",
                    self.field_type.as_str()
                )));
            }
        }

        Ok(())
    }

    /// Returns whether a stored value counts as empty for required checks.
    #[must_use]
    pub fn is_empty_value(value: Option<&Value>) -> bool {
        match value {
            None | Some(Value::Null) => true,
            Some(Value::String(text)) => text.trim().is_empty(),
            Some(Value::Array(items)) => items.is_empty(),
            Some(_) => false,
        }
    }

    fn require_option(&self, choice: &str) -> AppResult<()> {
        if self.options.iter().any(|option| option.value == choice) {
            return Ok(());
        }

        Err(AppError::Validation(format!(
            "'{choice}' is not an option of '{}'",
            self.field_code
        )))
    }

    fn validate_subtable(&self, config: &SubtableConfig, value: &Value) -> AppResult<()> {
        let code = self.field_code.as_str();
        let rows = value.as_array().ok_or_else(|| {
            AppError::Validation(format!("subtable '{code}' expects a list of rows"))
        })?;

        let row_count = u32::try_from(rows.len()).unwrap_or(u32::MAX);
        if let Some(min_rows) = config.min_rows
            && row_count < min_rows
        {
            return Err(AppError::Validation(format!(
                "subtable '{code}' requires at least {min_rows} rows"
            )));
        }
        if let Some(max_rows) = config.max_rows
            && row_count > max_rows
        {
            return Err(AppError::Validation(format!(
                "subtable '{code}' accepts at most {max_rows} rows"
            )));
        }

        for row in rows {
            let row = row.as_object().ok_or_else(|| {
                AppError::Validation(format!("subtable '{code}' rows must be objects"))
            })?;
            for (key, cell) in row {
                let sub_field = config
                    .fields
                    .iter()
                    .find(|field| field.field_code().as_str() == key)
                    .ok_or_else(|| {
                        AppError::Validation(format!("subtable '{code}' has no sub-field '{key}'"))
                    })?;
                sub_field.validate_value(cell)?;
            }
            for sub_field in config.fields.iter().filter(|field| field.is_required()) {
                if Self::is_empty_value(row.get(sub_field.field_code().as_str())) {
                    return Err(AppError::Validation(format!(
                        "subtable '{code}' row is missing required '{}'",
                        sub_field.field_code()
                    )));
                }
            }
        }

        Ok(())
    }
}

fn empty_subtable_row(config: &SubtableConfig) -> serde_json::Map<String, Value> {
    config
        .fields
        .iter()
        .filter_map(|field| {
            field
                .default_value_for()
                .map(|value| (field.field_code().as_str().to_owned(), value))
        })
        .collect()
}

/// Checks that a field code is an identifier usable in formulas and templates.
pub fn validate_field_code(code: &str) -> AppResult<()> {
    let mut characters = code.chars();
    let starts_well = characters
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_');
    if !starts_well || !characters.all(|next| next.is_ascii_alphanumeric() || next == '_') {
        return Err(AppError::Validation(format!(
            "field code '{code}' must start with a letter or '_' \
             and contain only letters, digits and '_'"
        )));
    }

    if is_reserved_key(code) {
        return Err(AppError::Validation(format!(
            "field code '{code}' is reserved for record metadata"
        )));
    }

    Ok(())
}

fn link_is_valid(link_type: LinkType, text: &str) -> bool {
    match link_type {
        LinkType::Url => Url::parse(text).is_ok_and(|url| {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|host| !host.is_empty())
        }),
        LinkType::Tel => {
            let digits = text.chars().filter(char::is_ascii_digit).count();
            digits >= 3
                && text
                    .chars()
                    .all(|character| character.is_ascii_digit() || "+-() ".contains(character))
        }
        LinkType::Email => {
            let Some((local, domain)) = text.split_once('@') else {
                return false;
            };
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
                && !text.contains(char::is_whitespace)
        }
    }
}
