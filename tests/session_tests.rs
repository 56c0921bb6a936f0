//! Integration tests for the session lifecycle
//!
//! Each test drives a `SessionContext` the way the REPL does: an action,
//! then a refresh. The model is scripted and the database is a temporary
//! SQLite file.

use std::sync::Arc;

use insightsql::agent::{BundledPromptSource, NoopObserver};
use insightsql::chat::{Readiness, TurnOutcome};
use insightsql::ollama::{MockChatModel, MockProvider, MockReply};
use insightsql::session::{Message, Role, Slot};
use insightsql::{AppConfig, ErrorKind, SessionContext};
use tempfile::TempDir;

struct Harness {
    session: SessionContext,
    model: Arc<MockChatModel>,
    provider: Arc<MockProvider>,
    _dir: TempDir,
}

fn harness(replies: Vec<MockReply>) -> Harness {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dresses.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE dresses (id INTEGER PRIMARY KEY, style TEXT, rating REAL);
         CREATE TABLE sales (dress_id INTEGER, total INTEGER);
         INSERT INTO dresses (style, rating) VALUES ('Casual', 4.6), ('Vintage', 3.9);",
    )
    .unwrap();
    drop(conn);

    let config = AppConfig {
        database_uri: format!("sqlite:///{}", path.display()),
        ..AppConfig::default()
    };
    let model = Arc::new(MockChatModel::new(replies));
    let provider = Arc::new(MockProvider::new(model.clone()));
    let session = SessionContext::new(config, provider.clone(), Arc::new(BundledPromptSource));
    Harness {
        session,
        model,
        provider,
        _dir: dir,
    }
}

/// Credential set, database connected, executor built
async fn ready_harness(replies: Vec<MockReply>) -> Harness {
    let mut h = harness(replies);
    h.session.set_credential("test-key");
    h.session.refresh().await;
    h.session.connect().await;
    h.session.refresh().await;
    assert!(h.session.store().executor().is_some());
    h
}

fn all_handles_present(session: &SessionContext) -> bool {
    [Slot::ModelClient, Slot::Toolkit, Slot::Memory, Slot::Executor]
        .into_iter()
        .all(|slot| session.store().is_populated(slot))
}

#[tokio::test]
async fn test_repeated_creation_keeps_handle_identity() {
    let mut h = ready_harness(vec![]).await;
    let model = h.session.store().model_client().cloned().unwrap();
    let toolkit = h.session.store().toolkit().cloned().unwrap();

    let model_again = h.session.ensure_model_client().unwrap();
    let toolkit_again = h.session.ensure_toolkit().await.unwrap().unwrap();
    let notice = h.session.connect().await;
    h.session.refresh().await;

    assert!(Arc::ptr_eq(&model, &model_again));
    assert!(Arc::ptr_eq(&toolkit, &toolkit_again));
    assert!(Arc::ptr_eq(h.session.store().model_client().unwrap(), &model));
    assert!(Arc::ptr_eq(h.session.store().toolkit().unwrap(), &toolkit));
    assert_eq!(notice.text, "System is already active. Ready to query!");
    assert_eq!(h.provider.connects(), 1);
}

#[tokio::test]
async fn test_language_change_rebuilds_only_the_executor() {
    let mut h = ready_harness(vec![MockReply::answer("Hello! How can I help?")]).await;
    h.session.submit("Hi", &NoopObserver).await;

    let model = h.session.store().model_client().cloned().unwrap();
    let toolkit = h.session.store().toolkit().cloned().unwrap();
    let memory = h.session.store().memory().cloned().unwrap();
    let history = h.session.store().history().to_vec();

    h.session.set_language("Indonesian");
    assert!(h.session.store().executor().is_none());
    assert_eq!(h.session.store().history(), history.as_slice());
    assert!(Arc::ptr_eq(h.session.store().model_client().unwrap(), &model));
    assert!(Arc::ptr_eq(h.session.store().toolkit().unwrap(), &toolkit));
    assert!(Arc::ptr_eq(h.session.store().memory().unwrap(), &memory));

    // the rebuilt executor binds the same memory, summary included
    h.session.refresh().await;
    let executor = h.session.store().executor().cloned().unwrap();
    assert_eq!(executor.language(), "Indonesian");
    assert!(Arc::ptr_eq(executor.memory(), &memory));
    assert_eq!(memory.lock().await.turns(), 1);
}

#[tokio::test]
async fn test_credential_change_empties_every_slot() {
    // from a fully populated session
    let mut h = ready_harness(vec![MockReply::answer("Hi!")]).await;
    h.session.submit("Hello", &NoopObserver).await;
    h.session.set_credential("other-key");
    for slot in Slot::ALL {
        assert!(!h.session.store().is_populated(slot), "{:?} survived", slot);
    }

    // and from a partially populated one
    let mut h = harness(vec![]);
    h.session.set_credential("first");
    h.session.refresh().await;
    h.session.set_credential("second");
    for slot in Slot::ALL {
        assert!(!h.session.store().is_populated(slot), "{:?} survived", slot);
    }
}

#[tokio::test]
async fn test_screen_clear_only_drops_history() {
    let mut h = ready_harness(vec![MockReply::answer("Two tables.")]).await;
    h.session.submit("How many tables?", &NoopObserver).await;
    let executor = h.session.store().executor().cloned().unwrap();
    let memory = h.session.store().memory().cloned().unwrap();

    let notice = h.session.clear_screen();
    assert_eq!(notice.text, "Screen cleared! Memory retained.");
    assert!(h.session.store().history().is_empty());
    assert!(Arc::ptr_eq(h.session.store().executor().unwrap(), &executor));
    assert!(Arc::ptr_eq(h.session.store().memory().unwrap(), &memory));
    assert!(all_handles_present(&h.session));
}

#[tokio::test]
async fn test_not_ready_input_is_rejected_without_side_effects() {
    let mut h = harness(vec![]);

    let outcome = h.session.submit("List all tables", &NoopObserver).await;
    assert_eq!(outcome, TurnOutcome::NotReady(Readiness::MissingModel));

    h.session.set_credential("test-key");
    h.session.refresh().await;
    let outcome = h.session.submit("List all tables", &NoopObserver).await;
    assert_eq!(outcome, TurnOutcome::NotReady(Readiness::MissingToolkit));

    h.session.connect().await;
    // executor not built yet: no refresh after connect
    let outcome = h.session.submit("List all tables", &NoopObserver).await;
    assert_eq!(outcome, TurnOutcome::NotReady(Readiness::MissingExecutor));

    assert!(h.session.store().history().is_empty());
    assert_eq!(h.model.agent_calls(), 0);
}

#[tokio::test]
async fn test_failed_turn_only_records_the_user_message() {
    let mut h = ready_harness(vec![
        MockReply::answer("There are 2 tables."),
        MockReply::status(500, "internal error"),
    ])
    .await;
    h.session.submit("How many tables?", &NoopObserver).await;
    let before = h.session.store().history().len();

    let outcome = h.session.submit("And how many rows?", &NoopObserver).await;
    assert!(matches!(outcome, TurnOutcome::Failed { .. }));
    let history = h.session.store().history();
    assert_eq!(history.len(), before + 1);
    assert_eq!(history.last().unwrap(), &Message::user("And how many rows?"));
}

#[tokio::test]
async fn test_fresh_session_to_first_answer() {
    let mut h = harness(vec![
        MockReply::action("sql_db_list_tables", ""),
        MockReply::answer("The database has two tables: dresses and sales."),
    ]);

    h.session.set_credential("test-key");
    let notices = h.session.refresh().await;
    assert!(h.session.store().model_client().is_some());
    assert!(h.session.store().history().is_empty());
    assert_eq!(notices[0].text, "AI engine initialized successfully!");

    let notice = h.session.connect().await;
    assert_eq!(notice.text, "Database connected! System ready.");
    assert!(h.session.store().toolkit().is_some());
    h.session.refresh().await;

    let outcome = h.session.submit("List all tables", &NoopObserver).await;
    assert!(matches!(outcome, TurnOutcome::Completed { .. }));
    let history = h.session.store().history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[1].role, Role::Assistant);
    assert!(!history[1].text.is_empty());
    assert!(history[1].text.contains("dresses"));
}

#[tokio::test]
async fn test_language_change_keeps_memory_and_three_messages() {
    let mut h = ready_harness(vec![MockReply::answer("Casual is the most common style.")]).await;
    h.session.submit("Most common style?", &NoopObserver).await;
    h.session
        .store_mut()
        .push_message(Message::user("Which one has the lowest rating?"));
    assert_eq!(h.session.store().history().len(), 3);
    let memory = h.session.store().memory().cloned().unwrap();

    h.session.set_language("Indonesian");

    assert!(h.session.store().executor().is_none());
    assert!(Arc::ptr_eq(h.session.store().memory().unwrap(), &memory));
    assert_eq!(h.session.store().history().len(), 3);
}

#[tokio::test]
async fn test_clear_screen_with_all_handles() {
    let mut h = ready_harness(vec![MockReply::answer("ok")]).await;
    h.session.submit("hello", &NoopObserver).await;
    assert!(!h.session.store().history().is_empty());

    h.session.clear_screen();
    assert_eq!(h.session.store().history().len(), 0);
    assert!(all_handles_present(&h.session));
}

#[tokio::test]
async fn test_credential_change_with_all_handles() {
    let mut h = ready_harness(vec![]).await;
    assert!(all_handles_present(&h.session));

    let notice = h.session.set_credential("rotated-key");
    assert_eq!(notice.text, "API key updated! System reset.");
    for slot in Slot::ALL {
        assert!(!h.session.store().is_populated(slot));
    }
}

#[tokio::test]
async fn test_quota_failure_is_classified() {
    let mut h = ready_harness(vec![MockReply::status(
        429,
        "Quota exceeded for quota metric 'Generate Content API requests per minute'",
    )])
    .await;

    let outcome = h.session.submit("How many dresses?", &NoopObserver).await;
    match &outcome {
        TurnOutcome::Failed { kind, .. } => assert_eq!(*kind, ErrorKind::QuotaExceeded),
        other => panic!("expected a failed turn, got {:?}", other),
    }
    assert!(outcome.notice().unwrap().text.contains("quota"));
    let history = h.session.store().history();
    assert_eq!(history.len(), 1);
    assert!(history.iter().all(|m| m.role == Role::User));
}

#[tokio::test]
async fn test_full_reset_then_rebuild() {
    let mut h = ready_harness(vec![MockReply::answer("ok")]).await;
    h.session.submit("hello", &NoopObserver).await;
    let old_memory = h.session.store().memory().cloned().unwrap();

    let notice = h.session.full_reset();
    assert_eq!(notice.text, "System fully reset. Memory wiped!");
    for slot in Slot::ALL {
        assert!(!h.session.store().is_populated(slot));
    }

    h.session.refresh().await;
    h.session.connect().await;
    h.session.refresh().await;
    let new_memory = h.session.store().memory().cloned().unwrap();
    assert!(!Arc::ptr_eq(&old_memory, &new_memory));
    assert_eq!(new_memory.lock().await.turns(), 0);
}
