//! Mutation requests read from `DYNAPP_MUTATION_PATH`.

use std::collections::BTreeMap;

use dynapp_application::RecordFilter;
use dynapp_core::{Actor, AppError, AppResult};
use dynapp_domain::{FieldDefinition, RecordData};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::services::Services;

#[derive(Debug, Deserialize)]
pub struct MutationRequest {
    actor: Actor,
    app_code: String,
    #[serde(flatten)]
    operation: Operation,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
enum Operation {
    Create {
        data: RecordData,
    },
    Update {
        record_id: String,
        data: RecordData,
    },
    Delete {
        record_id: String,
    },
    Read {
        record_id: String,
    },
    List {
        #[serde(default)]
        equals: BTreeMap<String, Value>,
        #[serde(default)]
        limit: Option<usize>,
    },
    Access {
        #[serde(default)]
        record_id: Option<String>,
    },
    AvailableActions {
        record_id: String,
    },
    Transition {
        record_id: String,
        action_id: String,
    },
    Assign {
        record_id: String,
        assignees: Vec<String>,
    },
    Comment {
        record_id: String,
        comment: String,
    },
    Related {
        record_id: String,
        field_code: String,
    },
    AddField {
        field: FieldDefinition,
    },
    RetireField {
        field_code: String,
    },
}

impl MutationRequest {
    pub async fn execute(self, services: &Services) -> AppResult<Value> {
        let schema = services.schemas.find_by_code(self.app_code.as_str()).await?;
        let app_id = schema.app_id();
        let actor = &self.actor;
        let mutations = &services.mutations;

        match self.operation {
            Operation::Create { data } => {
                to_json(&mutations.create_record(actor, app_id, data).await?)
            }
            Operation::Update { record_id, data } => to_json(
                &mutations
                    .update_record(actor, app_id, record_id.as_str(), data)
                    .await?,
            ),
            Operation::Delete { record_id } => to_json(
                &mutations
                    .delete_record(actor, app_id, record_id.as_str())
                    .await?,
            ),
            Operation::Read { record_id } => {
                to_json(&mutations.read_record(actor, app_id, record_id.as_str()).await?)
            }
            Operation::List { equals, limit } => {
                let mut filter = equals
                    .into_iter()
                    .fold(RecordFilter::all(), |filter, (field_code, value)| {
                        filter.and_equals(field_code, value)
                    });
                if let Some(limit) = limit {
                    filter = filter.with_limit(limit);
                }
                to_json(&mutations.list_records(actor, app_id, &filter).await?)
            }
            Operation::Access { record_id } => {
                let access = match record_id {
                    Some(record_id) => {
                        mutations
                            .read_record(actor, app_id, record_id.as_str())
                            .await?
                            .access
                    }
                    None => {
                        services
                            .permissions
                            .effective_access(actor, &schema, None)
                            .await?
                    }
                };
                to_json(&access)
            }
            Operation::AvailableActions { record_id } => to_json(
                &mutations
                    .available_actions(actor, app_id, record_id.as_str())
                    .await?,
            ),
            Operation::Transition {
                record_id,
                action_id,
            } => to_json(
                &mutations
                    .execute_action(actor, app_id, record_id.as_str(), action_id.as_str())
                    .await?,
            ),
            Operation::Assign {
                record_id,
                assignees,
            } => {
                mutations
                    .assign(actor, app_id, record_id.as_str(), assignees)
                    .await?;
                to_json(&Acknowledged { ok: true })
            }
            Operation::Comment { record_id, comment } => to_json(
                &mutations
                    .add_comment(actor, app_id, record_id.as_str(), comment.as_str())
                    .await?,
            ),
            Operation::Related {
                record_id,
                field_code,
            } => to_json(
                &mutations
                    .related_records(actor, app_id, record_id.as_str(), field_code.as_str())
                    .await?,
            ),
            Operation::AddField { field } => {
                to_json(&services.schemas.add_field(actor, app_id, field).await?)
            }
            Operation::RetireField { field_code } => {
                services
                    .schemas
                    .retire_field(actor, app_id, field_code.as_str())
                    .await?;
                to_json(&Acknowledged { ok: true })
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct Acknowledged {
    ok: bool,
}

fn to_json<T: Serialize>(value: &T) -> AppResult<Value> {
    serde_json::to_value(value)
        .map_err(|error| AppError::Internal(format!("failed to serialize result: {error}")))
}
