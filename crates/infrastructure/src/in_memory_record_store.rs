use std::collections::HashMap;

use async_trait::async_trait;
use dynapp_application::{RecordFilter, RecordStore};
use dynapp_core::{AppError, AppResult};
use dynapp_domain::{Record, RecordData};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Records of one app in record-number order.
#[derive(Debug, Default)]
struct AppRecords {
    last_number: u64,
    records: Vec<Record>,
}

impl AppRecords {
    fn position(&self, record_id: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|record| record.record_id().as_str() == record_id)
    }
}

/// In-memory record store implementation.
///
/// Record numbers are per app, start at 1 and are never reused after a
/// delete.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    apps: RwLock<HashMap<String, AppRecords>>,
}

impl InMemoryRecordStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            apps: RwLock::new(HashMap::new()),
        }
    }

    /// Loads an existing record snapshot, keeping its id and number.
    pub async fn restore(&self, app_code: &str, record: Record) -> AppResult<()> {
        let mut apps = self.apps.write().await;
        let app = apps.entry(app_code.to_owned()).or_default();

        if app.position(record.record_id().as_str()).is_some() {
            return Err(AppError::Conflict(format!(
                "record '{}' already exists in app '{app_code}'",
                record.record_id()
            )));
        }
        if app
            .records
            .iter()
            .any(|stored| stored.record_number() == record.record_number())
        {
            return Err(AppError::Conflict(format!(
                "record number {} is already used in app '{app_code}'",
                record.record_number()
            )));
        }

        app.last_number = app.last_number.max(record.record_number());
        app.records.push(record);
        app.records.sort_by_key(Record::record_number);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find_record(&self, app_code: &str, record_id: &str) -> AppResult<Option<Record>> {
        let apps = self.apps.read().await;
        Ok(apps.get(app_code).and_then(|app| {
            app.position(record_id)
                .map(|position| app.records[position].clone())
        }))
    }

    async fn list_records(
        &self,
        app_code: &str,
        filter: &RecordFilter,
    ) -> AppResult<Vec<Record>> {
        let apps = self.apps.read().await;
        let Some(app) = apps.get(app_code) else {
            return Ok(Vec::new());
        };

        Ok(app
            .records
            .iter()
            .filter(|record| filter.matches(record.data()))
            .take(filter.limit().unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn insert_record(&self, app_code: &str, data: RecordData) -> AppResult<Record> {
        let mut apps = self.apps.write().await;
        let app = apps.entry(app_code.to_owned()).or_default();

        let record = Record::new(Uuid::new_v4().to_string(), app.last_number + 1, data)?;
        app.last_number = record.record_number();
        app.records.push(record.clone());
        Ok(record)
    }

    async fn update_record(
        &self,
        app_code: &str,
        record: &Record,
        expected_status: Option<&str>,
    ) -> AppResult<()> {
        let mut apps = self.apps.write().await;
        let not_found = || {
            AppError::NotFound(format!(
                "record '{}' does not exist in app '{app_code}'",
                record.record_id()
            ))
        };
        let app = apps.get_mut(app_code).ok_or_else(not_found)?;
        let position = app
            .position(record.record_id().as_str())
            .ok_or_else(not_found)?;

        let stored = &mut app.records[position];
        if stored.status() != expected_status {
            return Err(AppError::Conflict(format!(
                "record '{}' changed status from '{}' to '{}' concurrently",
                record.record_id(),
                expected_status.unwrap_or("<none>"),
                stored.status().unwrap_or("<none>")
            )));
        }
        if stored.record_number() != record.record_number() {
            return Err(AppError::Validation(
                "record_number cannot change on update".to_owned(),
            ));
        }

        *stored = record.clone();
        Ok(())
    }

    async fn delete_record(&self, app_code: &str, record_id: &str) -> AppResult<()> {
        let mut apps = self.apps.write().await;
        let position = apps
            .get(app_code)
            .and_then(|app| app.position(record_id))
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "record '{record_id}' does not exist in app '{app_code}'"
                ))
            })?;

        if let Some(app) = apps.get_mut(app_code) {
            app.records.remove(position);
        }
        Ok(())
    }
}
