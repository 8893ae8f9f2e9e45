use async_trait::async_trait;
use dynapp_core::AppResult;
use dynapp_domain::{Record, RecordData, value_as_text};
use serde_json::Value;

/// Equality filter for record listings.
///
/// Values compare by their display text, so `"7"` and `7` are the same key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    equals: Vec<(String, Value)>,
    limit: Option<usize>,
}

impl RecordFilter {
    /// Matches every record.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches records whose field holds the given value.
    #[must_use]
    pub fn field_equals(field_code: impl Into<String>, value: Value) -> Self {
        Self::all().and_equals(field_code, value)
    }

    /// Adds one more equality constraint.
    #[must_use]
    pub fn and_equals(mut self, field_code: impl Into<String>, value: Value) -> Self {
        self.equals.push((field_code.into(), value));
        self
    }

    /// Caps the number of returned records.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Drops the record cap.
    #[must_use]
    pub fn without_limit(mut self) -> Self {
        self.limit = None;
        self
    }

    /// Iterates over the constrained field codes.
    pub fn field_codes(&self) -> impl Iterator<Item = &str> {
        self.equals.iter().map(|(field_code, _)| field_code.as_str())
    }

    /// Returns the record cap.
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Returns whether a record snapshot satisfies every constraint.
    #[must_use]
    pub fn matches(&self, data: &RecordData) -> bool {
        self.equals.iter().all(|(field_code, expected)| {
            let actual = data.get(field_code).unwrap_or(&Value::Null);
            !actual.is_null() && value_as_text(actual) == value_as_text(expected)
        })
    }
}

/// Record persistence port, partitioned by app code.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns one record by id.
    async fn find_record(&self, app_code: &str, record_id: &str) -> AppResult<Option<Record>>;

    /// Lists records matching a filter, ordered by record number.
    async fn list_records(&self, app_code: &str, filter: &RecordFilter)
    -> AppResult<Vec<Record>>;

    /// Stores a new record, assigning its id and next record number.
    async fn insert_record(&self, app_code: &str, data: RecordData) -> AppResult<Record>;

    /// Replaces a record if its stored status still equals `expected_status`.
    ///
    /// A status mismatch is an [`dynapp_core::AppError::Conflict`], so a
    /// status change and the field update land together or not at all.
    async fn update_record(
        &self,
        app_code: &str,
        record: &Record,
        expected_status: Option<&str>,
    ) -> AppResult<()>;

    /// Deletes one record.
    async fn delete_record(&self, app_code: &str, record_id: &str) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use super::RecordFilter;

    #[test]
    fn filter_compares_display_text() {
        let mut data = Map::new();
        data.insert("code".to_owned(), json!(7));
        data.insert("name".to_owned(), json!("Acme"));

        assert!(RecordFilter::field_equals("code", json!("7")).matches(&data));
        assert!(
            RecordFilter::field_equals("code", json!(7))
                .and_equals("name", json!("Acme"))
                .matches(&data)
        );
        assert!(!RecordFilter::field_equals("missing", json!("")).matches(&data));
        assert!(RecordFilter::all().matches(&data));
    }
}
