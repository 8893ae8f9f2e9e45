use std::sync::Arc;

use dynapp_core::{AppError, AppResult};
use dynapp_domain::{LookupConfig, Record, RecordData, RelatedRecordsConfig, value_as_text};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::ports::{RecordFilter, RecordStore};

/// Lookup resolution failure.
#[derive(Debug, Error)]
pub enum LookupError {
    /// No remote record holds the key. Routine for new or unmatched keys.
    #[error("no record in '{app_code}' has {key_field} = '{key}'")]
    NotFound {
        /// Referenced app code.
        app_code: String,
        /// Remote key field.
        key_field: String,
        /// Key text that was searched.
        key: String,
    },
    /// The record store failed.
    #[error(transparent)]
    Store(#[from] AppError),
}

/// One remote record projected for a related-records field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedRecord {
    /// Remote record id.
    pub record_id: String,
    /// Remote record number.
    pub record_number: u64,
    /// Display fields; absent values read as `null`.
    pub fields: RecordData,
}

impl RelatedRecord {
    /// Projects a remote record onto the given display fields.
    #[must_use]
    pub fn project(record: &Record, display_fields: &[String]) -> Self {
        Self {
            record_id: record.record_id().as_str().to_owned(),
            record_number: record.record_number(),
            fields: display_fields
                .iter()
                .map(|field| (field.clone(), record.value(field).clone()))
                .collect(),
        }
    }
}

/// Cross-app reads backing lookup and related-records fields.
#[derive(Clone)]
pub struct LookupResolver {
    records: Arc<dyn RecordStore>,
}

impl LookupResolver {
    /// Creates a resolver over a record store.
    #[must_use]
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }

    /// Copies fields from the first remote record whose key field equals `key`.
    pub async fn resolve(
        &self,
        config: &LookupConfig,
        key: &Value,
    ) -> Result<RecordData, LookupError> {
        let not_found = || LookupError::NotFound {
            app_code: config.lookup_app_code.clone(),
            key_field: config.lookup_key_field.clone(),
            key: value_as_text(key),
        };
        if value_as_text(key).is_empty() {
            return Err(not_found());
        }

        let filter =
            RecordFilter::field_equals(config.lookup_key_field.as_str(), key.clone()).with_limit(1);
        let matched = self
            .records
            .list_records(config.lookup_app_code.as_str(), &filter)
            .await?
            .into_iter()
            .next()
            .ok_or_else(not_found)?;

        Ok(config
            .lookup_copy_fields
            .iter()
            .map(|copy| {
                (
                    copy.target_field.clone(),
                    matched.value(copy.source_field.as_str()).clone(),
                )
            })
            .collect())
    }

    /// Lists every remote record whose key field equals this record's
    /// `related_this_field` value, ordered by record number.
    pub async fn related_source_records(
        &self,
        config: &RelatedRecordsConfig,
        data: &RecordData,
    ) -> AppResult<Vec<Record>> {
        let this_value = data
            .get(config.related_this_field.as_str())
            .cloned()
            .unwrap_or(Value::Null);
        if value_as_text(&this_value).is_empty() {
            return Ok(Vec::new());
        }

        let filter = RecordFilter::field_equals(config.related_key_field.as_str(), this_value);
        self.records
            .list_records(config.related_app_code.as_str(), &filter)
            .await
    }

    /// Live projection of the related records' display fields. Nothing is
    /// persisted.
    pub async fn related_records(
        &self,
        config: &RelatedRecordsConfig,
        data: &RecordData,
    ) -> AppResult<Vec<RelatedRecord>> {
        Ok(self
            .related_source_records(config, data)
            .await?
            .iter()
            .map(|record| RelatedRecord::project(record, &config.related_display_fields))
            .collect())
    }
}
