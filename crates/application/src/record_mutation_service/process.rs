use dynapp_domain::{ProcessAction, TriggerType};
use tracing::info;

use crate::TransitionOutcome;

use super::*;

impl RecordMutationService {
    /// Runs a process action on a record the actor can view.
    pub async fn execute_action(
        &self,
        actor: &Actor,
        app_id: AppId,
        record_id: &str,
        action_id: &str,
    ) -> AppResult<ActionOutcome> {
        let schema = self.require_schema(app_id).await?;
        let record = self.require_record(&schema, record_id).await?;
        self.require_access(actor, &schema, &record).await?;

        match self
            .process
            .transition(actor, &schema, &record, action_id)
            .await?
        {
            TransitionOutcome::Rejected(rejection) => Ok(ActionOutcome::Rejected(rejection)),
            TransitionOutcome::Applied {
                record,
                from_status,
                to_status,
            } => {
                let notifications = self
                    .notify_after_write(app_id, TriggerType::StatusChanged, &record)
                    .await;
                Ok(ActionOutcome::Applied {
                    from_status,
                    to_status,
                    record: self.view(actor, &schema, &record).await?,
                    notifications,
                })
            }
        }
    }

    /// Lists the process actions the actor may invoke on a record.
    pub async fn available_actions(
        &self,
        actor: &Actor,
        app_id: AppId,
        record_id: &str,
    ) -> AppResult<Vec<ProcessAction>> {
        let schema = self.require_schema(app_id).await?;
        let record = self.require_record(&schema, record_id).await?;
        self.require_access(actor, &schema, &record).await?;
        self.process.available_actions(actor, &schema, &record).await
    }

    /// Replaces the assignees of a record's current status.
    pub async fn assign(
        &self,
        actor: &Actor,
        app_id: AppId,
        record_id: &str,
        assignees: Vec<String>,
    ) -> AppResult<()> {
        let schema = self.require_schema(app_id).await?;
        let record = self.require_record(&schema, record_id).await?;
        let access = self.require_access(actor, &schema, &record).await?;
        if !access.record.can_edit {
            return Err(AppError::Forbidden(format!(
                "actor '{}' cannot assign record '{record_id}'",
                actor.id()
            )));
        }

        self.process.assign(&schema, &record, assignees).await?;
        info!(
            app = schema.app_code().as_str(),
            record_id,
            actor = actor.id(),
            "record assignees updated"
        );
        Ok(())
    }

    /// Signals a new comment on a record. Comment bodies are not stored
    /// here; only the notification rules run.
    pub async fn add_comment(
        &self,
        actor: &Actor,
        app_id: AppId,
        record_id: &str,
        comment: &str,
    ) -> AppResult<Vec<NotificationIntent>> {
        if comment.trim().is_empty() {
            return Err(AppError::Validation("comment must not be empty".to_owned()));
        }

        let schema = self.require_schema(app_id).await?;
        let record = self.require_record(&schema, record_id).await?;
        self.require_access(actor, &schema, &record).await?;

        self.notifications
            .notify(app_id, TriggerType::CommentAdded, &record)
            .await
    }
}
