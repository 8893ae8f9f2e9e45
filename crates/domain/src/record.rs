use dynapp_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Flat mapping from field code to value, including reserved metadata keys.
pub type RecordData = Map<String, Value>;

/// Reserved metadata key holding the creator's user id.
pub const CREATED_BY_KEY: &str = "created_by";
/// Reserved metadata key holding the creation timestamp.
pub const CREATED_AT_KEY: &str = "created_at";
/// Reserved metadata key holding the last modifier's user id.
pub const UPDATED_BY_KEY: &str = "updated_by";
/// Reserved metadata key holding the last modification timestamp.
pub const UPDATED_AT_KEY: &str = "updated_at";
/// Reserved metadata key holding the process status id.
pub const STATUS_KEY: &str = "status";
/// Placeholder and metadata key for the per-app record number.
pub const RECORD_NUMBER_KEY: &str = "record_number";

/// All metadata keys that field codes may not reuse.
pub const RESERVED_KEYS: &[&str] = &[
    CREATED_BY_KEY,
    CREATED_AT_KEY,
    UPDATED_BY_KEY,
    UPDATED_AT_KEY,
    STATUS_KEY,
    RECORD_NUMBER_KEY,
];

/// Returns whether the key is a reserved metadata key.
#[must_use]
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Persisted record of one dynamic application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    record_id: NonEmptyString,
    record_number: u64,
    data: RecordData,
}

impl Record {
    /// Creates a record snapshot.
    pub fn new(
        record_id: impl Into<String>,
        record_number: u64,
        data: RecordData,
    ) -> AppResult<Self> {
        if record_number == 0 {
            return Err(AppError::Validation(
                "record_number must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            record_id: NonEmptyString::new(record_id)?,
            record_number,
            data,
        })
    }

    /// Returns the stable record identifier.
    #[must_use]
    pub fn record_id(&self) -> &NonEmptyString {
        &self.record_id
    }

    /// Returns the per-app sequential record number.
    #[must_use]
    pub fn record_number(&self) -> u64 {
        self.record_number
    }

    /// Returns the flat field snapshot.
    #[must_use]
    pub fn data(&self) -> &RecordData {
        &self.data
    }

    /// Returns the field snapshot for in-place mutation.
    pub fn data_mut(&mut self) -> &mut RecordData {
        &mut self.data
    }

    /// Returns the record creator's user id.
    #[must_use]
    pub fn created_by(&self) -> Option<&str> {
        self.data.get(CREATED_BY_KEY).and_then(Value::as_str)
    }

    /// Returns the current process status id.
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.data.get(STATUS_KEY).and_then(Value::as_str)
    }

    /// Returns one field value, treating a missing key as `null`.
    #[must_use]
    pub fn value(&self, field_code: &str) -> &Value {
        self.data.get(field_code).unwrap_or(&Value::Null)
    }

    /// Returns the user ids held by an entity-select field.
    #[must_use]
    pub fn actor_ids(&self, field_code: &str) -> Vec<String> {
        actor_ids(self.value(field_code))
    }
}

// Entity-select fields hold ids as strings, or as `{ "code": ... }` entries.
fn actor_ids(value: &Value) -> Vec<String> {
    match value {
        Value::String(id) if !id.trim().is_empty() => vec![id.clone()],
        Value::Array(items) => items.iter().flat_map(actor_ids).collect(),
        Value::Object(entry) => entry
            .get("code")
            .or_else(|| entry.get("id"))
            .map(actor_ids)
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, Value, json};

    use super::{Record, is_reserved_key};

    #[test]
    fn record_number_must_be_positive() {
        assert!(Record::new("r1", 0, Map::new()).is_err());
    }

    #[test]
    fn missing_field_reads_as_null() {
        let mut data = Map::new();
        data.insert("created_by".to_owned(), json!("u1"));
        let record = Record::new("r1", 1, data).unwrap_or_else(|_| unreachable!());

        assert_eq!(record.value("amount"), &Value::Null);
        assert_eq!(record.created_by(), Some("u1"));
        assert!(is_reserved_key("status"));
    }

    #[test]
    fn actor_ids_accept_plain_and_coded_entries() {
        let mut data = Map::new();
        data.insert("owner".to_owned(), json!("u1"));
        data.insert("reviewers".to_owned(), json!(["u2", {"code": "u3"}, {"id": "u4"}, 7]));
        let record = Record::new("r1", 1, data).unwrap_or_else(|_| unreachable!());

        assert_eq!(record.actor_ids("owner"), vec!["u1"]);
        assert_eq!(record.actor_ids("reviewers"), vec!["u2", "u3", "u4"]);
        assert!(record.actor_ids("missing").is_empty());
    }
}
