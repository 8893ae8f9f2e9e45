use std::sync::Arc;

use dynapp_core::{AppError, AppId};
use dynapp_domain::{
    ActionType, AppSchema, AssigneeType, ProcessAction, ProcessDefinition, ProcessStatus, Record,
    TransitionRejection,
};
use serde_json::json;

use crate::test_fakes::{FakeProcessRepository, FakeRecordStore, FakeSchemaRepository, actor, text};

use super::{ProcessService, TransitionOutcome};

struct Harness {
    service: ProcessService,
    records: Arc<FakeRecordStore>,
    schema: AppSchema,
}

fn status(
    id: &str,
    is_initial: bool,
    is_final: bool,
    assignee: Option<AssigneeType>,
) -> ProcessStatus {
    ProcessStatus::new(id, id, is_initial, is_final, assignee).unwrap_or_else(|_| unreachable!())
}

fn action(id: &str, from: &str, to: &str, action_type: ActionType) -> ProcessAction {
    ProcessAction::new(id, id, from, to, action_type).unwrap_or_else(|_| unreachable!())
}

fn approval_graph(app_id: AppId) -> ProcessDefinition {
    ProcessDefinition::new(
        app_id,
        vec![
            status("draft", true, false, None),
            status("review", false, false, Some(AssigneeType::One)),
            status("approved", false, true, None),
        ],
        vec![
            action("submit", "draft", "review", ActionType::Normal),
            action("approve", "review", "approved", ActionType::Normal),
            action("recall", "review", "draft", ActionType::NonAssignee),
        ],
    )
    .unwrap_or_else(|_| unreachable!())
}

async fn harness(enabled: bool) -> Harness {
    let app_id = AppId::new();
    let schema = AppSchema::new(app_id, "expenses", false, vec![text("title")])
        .unwrap_or_else(|_| unreachable!());
    let schemas = Arc::new(FakeSchemaRepository::with(vec![schema]));
    let records = Arc::new(FakeRecordStore::default());
    let service = ProcessService::new(
        schemas.clone(),
        Arc::new(FakeProcessRepository::default()),
        records.clone(),
    );

    assert!(service.save_definition(approval_graph(app_id)).await.is_ok());
    if enabled {
        assert!(service.set_process_enabled(app_id, true).await.is_ok());
    }
    let schema = schemas
        .schemas
        .lock()
        .await
        .get(&app_id)
        .cloned()
        .unwrap_or_else(|| unreachable!());

    Harness {
        service,
        records,
        schema,
    }
}

async fn seeded(harness: &Harness, status: &str) -> Record {
    harness
        .records
        .seed("expenses", json!({"status": status, "created_by": "alice", "title": "Trip"}))
        .await
}

#[tokio::test]
async fn disabled_process_rejects_transitions() {
    let harness = harness(false).await;
    let record = seeded(&harness, "draft").await;

    let outcome = harness
        .service
        .transition(&actor("alice", &[]), &harness.schema, &record, "submit")
        .await;

    assert_eq!(
        outcome.unwrap_or_else(|_| unreachable!()),
        TransitionOutcome::Rejected(TransitionRejection::ProcessDisabled)
    );
    assert_eq!(
        harness.service.initial_status(&harness.schema).await.unwrap_or_default(),
        None
    );
}

#[tokio::test]
async fn applied_transition_updates_the_stored_status() {
    let harness = harness(true).await;
    let record = seeded(&harness, "draft").await;

    let outcome = harness
        .service
        .transition(&actor("alice", &[]), &harness.schema, &record, "submit")
        .await
        .unwrap_or_else(|_| unreachable!());

    let TransitionOutcome::Applied { to_status, .. } = outcome else {
        unreachable!();
    };
    assert_eq!(to_status, "review");

    let stored = harness.records.records.lock().await["expenses"][0].clone();
    assert_eq!(stored.status(), Some("review"));
    assert_eq!(stored.value("updated_by"), &json!("alice"));
}

#[tokio::test]
async fn normal_action_requires_the_assignee() {
    let harness = harness(true).await;
    let record = seeded(&harness, "review").await;
    assert!(
        harness
            .service
            .assign(&harness.schema, &record, vec!["bob".to_owned()])
            .await
            .is_ok()
    );

    let stranger = harness
        .service
        .transition(&actor("alice", &[]), &harness.schema, &record, "approve")
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(matches!(
        stranger,
        TransitionOutcome::Rejected(TransitionRejection::NotAssignee { .. })
    ));

    let actions = harness
        .service
        .available_actions(&actor("alice", &[]), &harness.schema, &record)
        .await
        .unwrap_or_default();
    let ids: Vec<&str> = actions.iter().map(|action| action.id().as_str()).collect();
    assert_eq!(ids, vec!["recall"]);

    let assignee = harness
        .service
        .transition(&actor("bob", &[]), &harness.schema, &record, "approve")
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(matches!(assignee, TransitionOutcome::Applied { .. }));
}

#[tokio::test]
async fn stale_status_is_a_conflict() {
    let harness = harness(true).await;
    let record = seeded(&harness, "draft").await;
    let first = harness
        .service
        .transition(&actor("alice", &[]), &harness.schema, &record, "submit")
        .await;
    assert!(first.is_ok());

    let stale = harness
        .service
        .transition(&actor("alice", &[]), &harness.schema, &record, "submit")
        .await;
    assert!(matches!(stale, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn wrong_source_status_and_unknown_action_are_structured() {
    let harness = harness(true).await;
    let record = seeded(&harness, "draft").await;
    let alice = actor("alice", &[]);

    let wrong = harness
        .service
        .transition(&alice, &harness.schema, &record, "approve")
        .await
        .unwrap_or_else(|_| unreachable!());
    let unknown = harness
        .service
        .transition(&alice, &harness.schema, &record, "archive")
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(matches!(
        wrong,
        TransitionOutcome::Rejected(TransitionRejection::InvalidTransition { .. })
    ));
    assert!(matches!(
        unknown,
        TransitionOutcome::Rejected(TransitionRejection::UnknownAction { .. })
    ));
}

#[tokio::test]
async fn one_assignee_statuses_take_a_single_user() {
    let harness = harness(true).await;
    let record = seeded(&harness, "review").await;

    let result = harness
        .service
        .assign(&harness.schema, &record, vec!["bob".to_owned(), "carol".to_owned()])
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let draft = seeded(&harness, "draft").await;
    let unassignable = harness
        .service
        .assign(&harness.schema, &draft, vec!["bob".to_owned()])
        .await;
    assert!(unassignable.is_err());
}

#[tokio::test]
async fn enabling_requires_a_definition() {
    let app_id = AppId::new();
    let schema =
        AppSchema::new(app_id, "bare", false, Vec::new()).unwrap_or_else(|_| unreachable!());
    let schemas = Arc::new(FakeSchemaRepository::with(vec![schema]));
    let service = ProcessService::new(
        schemas.clone(),
        Arc::new(FakeProcessRepository::default()),
        Arc::new(FakeRecordStore::default()),
    );

    assert!(service.set_process_enabled(app_id, true).await.is_err());
    assert!(!schemas.schemas.lock().await[&app_id].process_enabled());
}
