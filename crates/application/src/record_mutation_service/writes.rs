use std::collections::BTreeSet;

use dynapp_domain::{CREATED_AT_KEY, CREATED_BY_KEY, STATUS_KEY, TriggerType};
use tracing::info;

use super::*;

impl RecordMutationService {
    /// Creates a record from client input.
    ///
    /// Defaults fill absent fields, the process (when enabled) sets the
    /// initial status, and derived fields are computed before the required
    /// and unique checks run.
    pub async fn create_record(
        &self,
        actor: &Actor,
        app_id: AppId,
        input: RecordData,
    ) -> AppResult<MutationOutcome> {
        let schema = self.require_schema(app_id).await?;
        let access = self.permissions.effective_access(actor, &schema, None).await?;
        if !access.app.can_add {
            return Err(AppError::Forbidden(format!(
                "actor '{}' cannot add records to app '{}'",
                actor.id(),
                schema.app_code()
            )));
        }
        access.fields.enforce_writable(&schema, &input)?;
        validate_input(&schema, &input)?;

        let mut data = RecordData::new();
        for field in schema.active_fields() {
            let code = field.field_code().as_str();
            if input.contains_key(code) {
                continue;
            }
            if let Some(default_value) = field.default_value_for() {
                data.insert(code.to_owned(), default_value);
            }
        }
        data.extend(input);

        data.insert(CREATED_BY_KEY.to_owned(), Value::String(actor.id().to_owned()));
        data.insert(CREATED_AT_KEY.to_owned(), Value::String(Utc::now().to_rfc3339()));
        stamp_modified(&mut data, actor);
        if let Some(status) = self.process.initial_status(&schema).await? {
            data.insert(STATUS_KEY.to_owned(), Value::String(status));
        }

        let derived = self.derived.recompute(&schema, &mut data, None).await?;
        check_required(&schema, &data)?;
        self.check_unique(&schema, &data, None).await?;

        let record = self
            .records
            .insert_record(schema.app_code().as_str(), data)
            .await?;
        info!(
            app = schema.app_code().as_str(),
            record_id = record.record_id().as_str(),
            actor = actor.id(),
            "record created"
        );

        let notifications = self
            .notify_after_write(app_id, TriggerType::RecordAdded, &record)
            .await;

        Ok(MutationOutcome {
            record: self.view(actor, &schema, &record).await?,
            derived,
            notifications,
        })
    }

    /// Applies a partial update to an existing record.
    ///
    /// Only lookups whose key field actually changed are re-resolved.
    /// The write is a compare-and-set on the status read here, so it cannot
    /// overwrite a concurrent process transition.
    pub async fn update_record(
        &self,
        actor: &Actor,
        app_id: AppId,
        record_id: &str,
        changes: RecordData,
    ) -> AppResult<MutationOutcome> {
        let schema = self.require_schema(app_id).await?;
        let record = self.require_record(&schema, record_id).await?;
        let access = self
            .permissions
            .effective_access(actor, &schema, Some(&record))
            .await?;
        if !access.record.can_edit {
            return Err(AppError::Forbidden(format!(
                "actor '{}' cannot edit record '{record_id}'",
                actor.id()
            )));
        }
        access.fields.enforce_writable(&schema, &changes)?;
        validate_input(&schema, &changes)?;

        let changed: BTreeSet<String> = changes
            .iter()
            .filter(|(code, value)| record.data().get(code.as_str()) != Some(*value))
            .map(|(code, _)| code.clone())
            .collect();

        let mut next = record.clone();
        let data = next.data_mut();
        data.extend(changes);
        stamp_modified(data, actor);

        let derived = self.derived.recompute(&schema, data, Some(&changed)).await?;
        check_required(&schema, next.data())?;
        self.check_unique(&schema, next.data(), Some(record_id)).await?;

        self.records
            .update_record(schema.app_code().as_str(), &next, record.status())
            .await?;
        info!(
            app = schema.app_code().as_str(),
            record_id,
            actor = actor.id(),
            changed = changed.len(),
            "record updated"
        );

        let notifications = self
            .notify_after_write(app_id, TriggerType::RecordEdited, &next)
            .await;

        Ok(MutationOutcome {
            record: self.view(actor, &schema, &next).await?,
            derived,
            notifications,
        })
    }

    /// Deletes a record. Rules see the record as it was before deletion.
    pub async fn delete_record(
        &self,
        actor: &Actor,
        app_id: AppId,
        record_id: &str,
    ) -> AppResult<MutationOutcome> {
        let schema = self.require_schema(app_id).await?;
        let record = self.require_record(&schema, record_id).await?;
        let access = self
            .permissions
            .effective_access(actor, &schema, Some(&record))
            .await?;
        if !access.record.can_delete {
            return Err(AppError::Forbidden(format!(
                "actor '{}' cannot delete record '{record_id}'",
                actor.id()
            )));
        }

        self.records
            .delete_record(schema.app_code().as_str(), record_id)
            .await?;
        info!(
            app = schema.app_code().as_str(),
            record_id,
            actor = actor.id(),
            "record deleted"
        );

        let notifications = self
            .notify_after_write(app_id, TriggerType::RecordDeleted, &record)
            .await;

        Ok(MutationOutcome {
            record: None,
            derived: DerivedFieldReport::default(),
            notifications,
        })
    }
}
