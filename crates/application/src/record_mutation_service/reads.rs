use dynapp_domain::FieldType;

use crate::derived_field_service::RelatedRecord;
use crate::permission_resolver::{resolve_app_capabilities, resolve_effective_access};

use super::*;

impl RecordMutationService {
    /// Returns one record as the actor may see it.
    pub async fn read_record(
        &self,
        actor: &Actor,
        app_id: AppId,
        record_id: &str,
    ) -> AppResult<RecordView> {
        let schema = self.require_schema(app_id).await?;
        let record = self.require_record(&schema, record_id).await?;
        let access = self.require_access(actor, &schema, &record).await?;
        Ok(self.project(&schema, &record, access))
    }

    /// Lists the records the actor may view that match the filter.
    ///
    /// A record only matches when every filtered field is visible to the
    /// actor on that record, so filters cannot reveal hidden values.
    pub async fn list_records(
        &self,
        actor: &Actor,
        app_id: AppId,
        filter: &RecordFilter,
    ) -> AppResult<Vec<RecordView>> {
        let schema = self.require_schema(app_id).await?;
        self.visible_records(actor, &schema, filter).await
    }

    /// Live related-records list for one `related_records` field.
    ///
    /// The remote app's own permissions decide which remote records and
    /// display fields come back.
    pub async fn related_records(
        &self,
        actor: &Actor,
        app_id: AppId,
        record_id: &str,
        field_code: &str,
    ) -> AppResult<Vec<RelatedRecord>> {
        let schema = self.require_schema(app_id).await?;
        let record = self.require_record(&schema, record_id).await?;
        let access = self.require_access(actor, &schema, &record).await?;
        if access.fields.level(field_code) == AccessLevel::Hidden {
            return Err(AppError::Forbidden(format!(
                "field '{field_code}' is hidden for this actor"
            )));
        }
        let Some(FieldType::RelatedRecords(config)) =
            schema.field(field_code).map(FieldDefinition::field_type)
        else {
            return Err(AppError::Validation(format!(
                "field '{field_code}' is not a related records field"
            )));
        };

        let remote_schema = self
            .schemas
            .find_schema_by_code(config.related_app_code.as_str())
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "related app '{}' does not exist",
                    config.related_app_code
                ))
            })?;
        let remote_rules = self.permissions.rule_set(remote_schema.app_id()).await?;
        let data = schema.project_auto_fields(&record);

        Ok(self
            .derived
            .lookups()
            .related_source_records(config, &data)
            .await?
            .into_iter()
            .filter_map(|remote| {
                let remote_access =
                    resolve_effective_access(actor, &remote_schema, &remote_rules, Some(&remote));
                if !remote_access.record.can_view {
                    return None;
                }
                let mut related = RelatedRecord::project(&remote, &config.related_display_fields);
                remote_access.fields.redact(&mut related.fields);
                Some(related)
            })
            .collect())
    }

    async fn visible_records(
        &self,
        actor: &Actor,
        schema: &AppSchema,
        filter: &RecordFilter,
    ) -> AppResult<Vec<RecordView>> {
        let rules = self.permissions.rule_set(schema.app_id()).await?;
        if !resolve_app_capabilities(actor, &rules.app).can_view {
            return Err(AppError::Forbidden(format!(
                "actor '{}' cannot view app '{}'",
                actor.id(),
                schema.app_code()
            )));
        }

        // The limit applies to what the actor can see, not to raw matches.
        let candidates = self
            .records
            .list_records(schema.app_code().as_str(), &filter.clone().without_limit())
            .await?;

        Ok(candidates
            .iter()
            .filter_map(|record| {
                let access = resolve_effective_access(actor, schema, &rules, Some(record));
                let filters_hidden = filter
                    .field_codes()
                    .any(|code| access.fields.level(code) == AccessLevel::Hidden);
                (access.record.can_view && !filters_hidden)
                    .then(|| self.project(schema, record, access))
            })
            .take(filter.limit().unwrap_or(usize::MAX))
            .collect())
    }
}
