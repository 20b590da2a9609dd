use offload_core::db::open_db_in_memory;
use offload_core::model::capture::{CaptureSource, InputType, LifecycleEvent, LifecycleState};
use offload_core::model::handoff::{
    DecisionSource, DecisionType, HandOffMode, HandOffRun, RequestSource, RunStatus,
    SuggestionKind,
};
use offload_core::model::placement::PlacementTargetType;
use offload_core::repo::capture_repo::SqliteCaptureRepository;
use offload_core::repo::placement_repo::{PlacementRepository, SqlitePlacementRepository};
use offload_core::service::lifecycle_service::{LifecycleError, LifecycleService};
use rusqlite::{params, Connection};
use uuid::Uuid;

fn service(conn: &Connection) -> LifecycleService<SqliteCaptureRepository<'_>> {
    LifecycleService::new(SqliteCaptureRepository::try_new(conn).unwrap())
}

fn run() -> HandOffRun {
    HandOffRun::start("test-model", "v1", "snapshot")
}

fn state_of(service: &LifecycleService<SqliteCaptureRepository<'_>>, id: Uuid) -> LifecycleState {
    service.get_entry(id).unwrap().lifecycle_state
}

#[test]
fn entry_walks_raw_to_placed_through_audit_records() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let entry = service
        .capture_entry("Plan the weekend", InputType::Text, CaptureSource::App)
        .unwrap();
    assert_eq!(entry.lifecycle_state, LifecycleState::Raw);

    let request = service
        .hand_off(entry.id, RequestSource::User, HandOffMode::Manual, vec![run()])
        .unwrap();
    assert_eq!(state_of(&service, entry.id), LifecycleState::HandedOff);

    let run_id = request.runs[0].id;
    let suggestion = service
        .add_suggestion(entry.id, run_id, SuggestionKind::Plan, r#"{"version":1}"#, Some(0.8))
        .unwrap();
    assert_eq!(state_of(&service, entry.id), LifecycleState::HandedOff);

    service
        .record_decision(entry.id, suggestion.id, DecisionType::Accepted, DecisionSource::User)
        .unwrap();
    let ready = service.get_entry(entry.id).unwrap();
    assert_eq!(ready.lifecycle_state, LifecycleState::Ready);
    assert_eq!(ready.accepted_suggestion_id, Some(suggestion.id));

    let target_id = Uuid::new_v4();
    let placement = service
        .place(entry.id, PlacementTargetType::Plan, target_id, Some("weekend".into()))
        .unwrap();
    assert_eq!(placement.source_suggestion_id, suggestion.id);
    assert_eq!(state_of(&service, entry.id), LifecycleState::Placed);
}

#[test]
fn loaded_entry_exposes_the_full_ordered_subtree() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let entry = service
        .capture_entry("Renew passport", InputType::Voice, CaptureSource::Widget)
        .unwrap();

    let request = service
        .hand_off(entry.id, RequestSource::Auto, HandOffMode::Auto, vec![run()])
        .unwrap();
    let second = service
        .start_run(entry.id, request.id, "other-model", "v2")
        .unwrap();
    assert_eq!(second.input_snapshot, "Renew passport");
    let suggestion = service
        .add_suggestion(entry.id, second.id, SuggestionKind::Task, "{}", None)
        .unwrap();
    service
        .record_decision(entry.id, suggestion.id, DecisionType::NotNow, DecisionSource::User)
        .unwrap();

    let loaded = service.get_entry(entry.id).unwrap();
    assert_eq!(loaded.input_type, InputType::Voice);
    assert_eq!(loaded.source, CaptureSource::Widget);
    assert_eq!(loaded.requests.len(), 1);
    let runs = &loaded.requests[0].runs;
    assert_eq!(runs.len(), 2);
    assert!(runs[0].suggestions.is_empty());
    assert_eq!(runs[1].id, second.id);
    assert_eq!(runs[1].suggestions[0].decisions[0].decision, DecisionType::NotNow);
}

#[test]
fn hand_off_requires_at_least_one_run() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let entry = service
        .capture_entry("text", InputType::Text, CaptureSource::App)
        .unwrap();

    let err = service
        .hand_off(entry.id, RequestSource::User, HandOffMode::Manual, Vec::new())
        .unwrap_err();
    assert!(matches!(err, LifecycleError::MissingRuns));
    let loaded = service.get_entry(entry.id).unwrap();
    assert_eq!(loaded.lifecycle_state, LifecycleState::Raw);
    assert!(loaded.requests.is_empty());
}

#[test]
fn non_accepting_operations_leave_state_unchanged() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let entry = service
        .capture_entry("text", InputType::Text, CaptureSource::Shortcut)
        .unwrap();
    let request = service
        .hand_off(entry.id, RequestSource::User, HandOffMode::Manual, vec![run()])
        .unwrap();
    let run_id = request.runs[0].id;
    let suggestion = service
        .add_suggestion(entry.id, run_id, SuggestionKind::List, "{}", None)
        .unwrap();

    for decision in [DecisionType::NotNow, DecisionType::Rejected] {
        service
            .record_decision(entry.id, suggestion.id, decision, DecisionSource::User)
            .unwrap();
        assert_eq!(state_of(&service, entry.id), LifecycleState::HandedOff);
    }
    service.complete_run(entry.id, run_id).unwrap();
    assert_eq!(state_of(&service, entry.id), LifecycleState::HandedOff);

    let err = service
        .place(entry.id, PlacementTargetType::List, Uuid::new_v4(), None)
        .unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::InvalidTransition {
            from: LifecycleState::HandedOff,
            event: LifecycleEvent::Place
        }
    ));
    assert_eq!(state_of(&service, entry.id), LifecycleState::HandedOff);
}

#[test]
fn decisions_need_a_known_suggestion() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let entry = service
        .capture_entry("text", InputType::Text, CaptureSource::App)
        .unwrap();

    let err = service
        .record_decision(entry.id, Uuid::new_v4(), DecisionType::Accepted, DecisionSource::User)
        .unwrap_err();
    assert!(matches!(err, LifecycleError::SuggestionNotFound(_)));
    assert_eq!(state_of(&service, entry.id), LifecycleState::Raw);
}

#[test]
fn run_finishes_once_and_records_failure() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let entry = service
        .capture_entry("text", InputType::Text, CaptureSource::App)
        .unwrap();
    let request = service
        .hand_off(entry.id, RequestSource::User, HandOffMode::Manual, vec![run()])
        .unwrap();
    let run_id = request.runs[0].id;

    let failed = service.fail_run(entry.id, run_id, "provider timeout").unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    let completed_at = failed.completed_at.unwrap();

    let err = service.complete_run(entry.id, run_id).unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::RunAlreadyFinished {
            status: RunStatus::Failed,
            ..
        }
    ));

    let loaded = service.get_entry(entry.id).unwrap();
    let stored = loaded.find_run(run_id).unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
    assert_eq!(stored.completed_at, Some(completed_at));
    assert_eq!(stored.error_message.as_deref(), Some("provider timeout"));
}

#[test]
fn pending_suggestions_span_all_runs_and_ignore_undo() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let entry = service
        .capture_entry("text", InputType::Text, CaptureSource::App)
        .unwrap();
    let request = service
        .hand_off(entry.id, RequestSource::User, HandOffMode::Manual, vec![run(), run()])
        .unwrap();
    let first = service
        .add_suggestion(entry.id, request.runs[0].id, SuggestionKind::Task, "{}", None)
        .unwrap();
    let second = service
        .add_suggestion(entry.id, request.runs[1].id, SuggestionKind::Plan, "{}", None)
        .unwrap();
    assert_eq!(service.pending_suggestions(entry.id).unwrap().len(), 2);

    let accepted = service
        .record_decision(entry.id, first.id, DecisionType::Accepted, DecisionSource::User)
        .unwrap();
    let pending = service.pending_suggestions(entry.id).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second.id);

    let undo = service
        .undo_decision(entry.id, accepted.id, DecisionSource::User)
        .unwrap();
    assert_eq!(undo.undo_of_decision_id, Some(accepted.id));
    assert_eq!(state_of(&service, entry.id), LifecycleState::Ready);

    let loaded = service.get_entry(entry.id).unwrap();
    let decisions = &loaded.find_suggestion(first.id).unwrap().decisions;
    assert_eq!(decisions.len(), 2);
    assert_eq!(decisions[0].decision, DecisionType::Accepted);

    let err = service
        .undo_decision(entry.id, accepted.id, DecisionSource::User)
        .unwrap_err();
    assert!(matches!(err, LifecycleError::DecisionAlreadyUndone(_)));
}

#[test]
fn archive_is_idempotent_and_blocks_further_writes() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let entry = service
        .capture_entry("text", InputType::Text, CaptureSource::App)
        .unwrap();

    assert_eq!(service.archive(entry.id).unwrap().lifecycle_state, LifecycleState::Archived);
    assert_eq!(service.archive(entry.id).unwrap().lifecycle_state, LifecycleState::Archived);

    let err = service
        .hand_off(entry.id, RequestSource::User, HandOffMode::Manual, vec![run()])
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Terminal(LifecycleState::Archived)));
}

#[test]
fn placed_entries_cannot_be_archived() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let entry = service
        .capture_entry("text", InputType::Text, CaptureSource::App)
        .unwrap();
    let request = service
        .hand_off(entry.id, RequestSource::User, HandOffMode::Manual, vec![run()])
        .unwrap();
    let suggestion = service
        .add_suggestion(entry.id, request.runs[0].id, SuggestionKind::Task, "{}", None)
        .unwrap();
    service
        .record_decision(entry.id, suggestion.id, DecisionType::Accepted, DecisionSource::User)
        .unwrap();
    service
        .place(entry.id, PlacementTargetType::Task, Uuid::new_v4(), None)
        .unwrap();

    assert!(service.archive(entry.id).is_err());
    assert_eq!(state_of(&service, entry.id), LifecycleState::Placed);
}

#[test]
fn delete_cascades_subtree_but_keeps_placements() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let entry = service
        .capture_entry("text", InputType::Text, CaptureSource::App)
        .unwrap();
    let request = service
        .hand_off(entry.id, RequestSource::User, HandOffMode::Manual, vec![run()])
        .unwrap();
    let suggestion = service
        .add_suggestion(entry.id, request.runs[0].id, SuggestionKind::Task, "{}", None)
        .unwrap();
    service
        .record_decision(entry.id, suggestion.id, DecisionType::Accepted, DecisionSource::User)
        .unwrap();
    let target_id = Uuid::new_v4();
    let placement = service
        .place(entry.id, PlacementTargetType::Task, target_id, None)
        .unwrap();

    service.delete(entry.id).unwrap();

    assert!(matches!(
        service.get_entry(entry.id).unwrap_err(),
        LifecycleError::EntryNotFound(_)
    ));
    for table in [
        "handoff_requests",
        "handoff_runs",
        "suggestions",
        "suggestion_decisions",
    ] {
        assert_eq!(count_rows(&conn, table), 0, "{table} not cascaded");
    }

    let placements = SqlitePlacementRepository::try_new(&conn).unwrap();
    assert_eq!(
        placements.placements_for_suggestion(suggestion.id).unwrap(),
        vec![placement.clone()]
    );
    assert_eq!(
        placements
            .placements_for_target(PlacementTargetType::Task, target_id)
            .unwrap(),
        vec![placement.clone()]
    );
    assert_eq!(placements.get_placement(placement.id).unwrap(), Some(placement));
}

#[test]
fn listing_filters_by_state_and_text() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let milk = service
        .capture_entry("Buy MILK", InputType::Text, CaptureSource::App)
        .unwrap();
    let dog = service
        .capture_entry("Walk dog", InputType::Text, CaptureSource::App)
        .unwrap();
    conn.execute(
        "UPDATE capture_entries SET created_at = ?2 WHERE id = ?1;",
        params![milk.id.to_string(), 1_000],
    )
    .unwrap();
    conn.execute(
        "UPDATE capture_entries SET created_at = ?2 WHERE id = ?1;",
        params![dog.id.to_string(), 2_000],
    )
    .unwrap();
    service.archive(dog.id).unwrap();

    let inbox = service.fetch_inbox().unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].id, milk.id);
    assert_eq!(
        service.fetch_by_state(LifecycleState::Archived).unwrap()[0].id,
        dog.id
    );
    assert!(service.fetch_ready().unwrap().is_empty());

    let found = service.search_entries("milk", None).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, milk.id);

    let all = service.search_entries("", Some(10)).unwrap();
    assert_eq!(
        all.iter().map(|entry| entry.id).collect::<Vec<_>>(),
        vec![dog.id, milk.id]
    );
}

#[test]
fn unknown_stored_enum_values_decode_to_fallbacks() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let entry = service
        .capture_entry("text", InputType::Text, CaptureSource::App)
        .unwrap();
    conn.execute(
        "UPDATE capture_entries SET source = 'smartwatch', input_type = 'telepathy' WHERE id = ?1;",
        [entry.id.to_string()],
    )
    .unwrap();

    let loaded = service.get_entry(entry.id).unwrap();
    assert_eq!(loaded.source, CaptureSource::App);
    assert_eq!(loaded.input_type, InputType::Text);
}

fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| row.get(0))
        .unwrap()
}
