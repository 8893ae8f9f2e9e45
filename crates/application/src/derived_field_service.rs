use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dynapp_core::AppResult;
use dynapp_domain::{AppSchema, FieldType, Formula, RecordData};
use serde::Serialize;
use serde_json::{Number, Value};
use tracing::{debug, warn};

use crate::ports::RecordStore;

mod lookup;

pub use lookup::{LookupError, LookupResolver, RelatedRecord};

/// What a recomputation pass did to a record snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DerivedFieldReport {
    /// Lookup fields whose copy fields were refreshed.
    pub lookups_applied: Vec<String>,
    /// Lookup fields whose key matched nothing; targets were left untouched.
    pub lookups_missed: Vec<String>,
    /// Calculated fields blanked by an evaluation error, with the reason.
    pub formula_errors: BTreeMap<String, String>,
    /// Operands substituted with `0`, per calculated field.
    pub formula_warnings: BTreeMap<String, Vec<String>>,
    /// Set when the schema's formulas could not be ordered at all.
    pub configuration_error: Option<String>,
}

/// Application service recomputing lookup and calculated fields.
#[derive(Clone)]
pub struct DerivedFieldService {
    lookups: LookupResolver,
}

impl DerivedFieldService {
    /// Creates a derived field service over a record store.
    #[must_use]
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self {
            lookups: LookupResolver::new(records),
        }
    }

    /// Returns the lookup resolver.
    #[must_use]
    pub fn lookups(&self) -> &LookupResolver {
        &self.lookups
    }

    /// Refreshes derived values in place: lookups first, then calculated
    /// fields in dependency order.
    ///
    /// With `changed` set, only lookups whose key field changed are
    /// re-resolved, so manual edits to copy targets survive unrelated edits.
    pub async fn recompute(
        &self,
        schema: &AppSchema,
        data: &mut RecordData,
        changed: Option<&BTreeSet<String>>,
    ) -> AppResult<DerivedFieldReport> {
        let mut report = DerivedFieldReport::default();

        for field in schema.active_fields() {
            let FieldType::Lookup(config) = field.field_type() else {
                continue;
            };
            let code = field.field_code().as_str();
            if changed.is_some_and(|changed| !changed.contains(code)) {
                continue;
            }

            let key = data.get(code).cloned().unwrap_or(Value::Null);
            match self.lookups.resolve(config, &key).await {
                Ok(copied) => {
                    data.extend(copied);
                    report.lookups_applied.push(code.to_owned());
                }
                Err(LookupError::NotFound { .. }) => {
                    debug!(
                        app = schema.app_code().as_str(),
                        field = code,
                        "lookup key matched nothing"
                    );
                    report.lookups_missed.push(code.to_owned());
                }
                Err(LookupError::Store(error)) => return Err(error),
            }
        }

        let order = match schema.calculation_order() {
            Ok(order) => order,
            Err(error) => {
                warn!(app = schema.app_code().as_str(), %error, "calculated fields skipped");
                report.configuration_error = Some(error.to_string());
                return Ok(report);
            }
        };

        for field in order {
            let FieldType::Calculated(config) = field.field_type() else {
                continue;
            };
            let code = field.field_code().as_str();
            let evaluated = Formula::parse(config.formula.as_str())
                .and_then(|formula| formula.evaluate(&*data));

            match evaluated {
                Ok(outcome) => {
                    if !outcome.warnings.is_empty() {
                        report.formula_warnings.insert(
                            code.to_owned(),
                            outcome.warnings.iter().map(ToString::to_string).collect(),
                        );
                    }
                    let value =
                        Number::from_f64(outcome.value).map_or(Value::Null, Value::Number);
                    data.insert(code.to_owned(), value);
                }
                Err(error) => {
                    warn!(
                        app = schema.app_code().as_str(),
                        field = code,
                        %error,
                        "calculated field blanked"
                    );
                    report.formula_errors.insert(code.to_owned(), error.to_string());
                    data.insert(code.to_owned(), Value::Null);
                }
            }
        }

        Ok(report)
    }
}

/// Renders every calculated field of a snapshot per its configured format.
/// Blank values render as the empty string.
#[must_use]
pub fn format_calculated_fields(
    schema: &AppSchema,
    data: &RecordData,
    currency_symbol: &str,
) -> BTreeMap<String, String> {
    schema
        .active_fields()
        .filter_map(|field| {
            let FieldType::Calculated(config) = field.field_type() else {
                return None;
            };
            let code = field.field_code().as_str();
            let value = data.get(code)?;
            let rendered = value
                .as_f64()
                .map(|value| {
                    config
                        .formula_format
                        .render(value, config.formula_decimals, currency_symbol)
                })
                .unwrap_or_default();
            Some((code.to_owned(), rendered))
        })
        .collect()
}

#[cfg(test)]
mod tests;
