//! End-to-end tests for the usage engine.
//!
//! HTTP collaborators (advisory oracle, emergency webhook) are served by
//! mockito; persistence uses a real SQLite file under a temp dir.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use screenwarden_core::advisory::DisabledOracle;
use screenwarden_core::emergency::{LogNotifier, WebhookNotifier};
use screenwarden_core::profile::{GuardianStore, ProfileStore};
use screenwarden_core::{
    AdvisoryClient, AdvisoryOrigin, Database, EmergencyDispatcher, EngineStores, Guardian,
    HttpOracle, IncidentOutcome, LockPolicy, LockState, ManualClock, MemoryStore, Notifier,
    Profile, Role, UsageEngine,
};

// ============================================================================
// Helpers
// ============================================================================

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::at(
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
        16,
        30,
    ))
}

fn profile(limit_min: u32) -> Profile {
    Profile {
        display_name: "Riley".into(),
        role: Role::Student,
        daily_limit_min: limit_min,
    }
}

fn engine_with(
    stores: EngineStores,
    oracle_url: Option<String>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<ManualClock>,
) -> UsageEngine {
    let advisory = match oracle_url {
        Some(url) => AdvisoryClient::new(
            Arc::new(HttpOracle::new(&url, "test-model", None)),
            Duration::from_secs(5),
            "fallback advice",
        ),
        None => AdvisoryClient::new(Arc::new(DisabledOracle), Duration::from_secs(5), "fallback advice"),
    };
    UsageEngine::new(
        stores,
        advisory,
        EmergencyDispatcher::new(notifier, Duration::from_secs(5)),
        LockPolicy::default(),
        clock,
    )
}

fn memory_engine(limit_min: u32) -> UsageEngine {
    let store = Arc::new(MemoryStore::with_profile(profile(limit_min)));
    engine_with(EngineStores::shared(store), None, Arc::new(LogNotifier), clock())
}

fn chat_reply(content: &str) -> String {
    serde_json::json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    })
    .to_string()
}

// ============================================================================
// Accrual and lockout
// ============================================================================

#[test]
fn test_lock_after_exceeding_one_minute_limit() {
    let engine = memory_engine(1);

    let first = engine.record_usage("device", 30).unwrap();
    assert_eq!(first.total_secs, 30);
    assert_eq!(first.lock_state, LockState::Unlocked);

    let second = engine.record_usage("device", 61).unwrap();
    assert_eq!(second.total_secs, 91);
    assert_eq!(second.lock_state, LockState::Locked);

    assert!(engine.request_unlock().unwrap().is_some());
    assert_eq!(engine.lock_state().unwrap(), LockState::Unlocked);
    assert_eq!(engine.current_total().unwrap(), 91);
}

#[test]
fn test_total_equal_to_limit_stays_unlocked() {
    let engine = memory_engine(1);
    engine.record_usage("device", 60).unwrap();
    assert_eq!(engine.lock_state().unwrap(), LockState::Unlocked);
}

#[test]
fn test_unlock_when_unlocked_is_noop() {
    let engine = memory_engine(5);
    assert!(engine.request_unlock().unwrap().is_none());
    assert_eq!(engine.lock_state().unwrap(), LockState::Unlocked);
}

#[test]
fn test_negative_duration_is_ignored() {
    let engine = memory_engine(1);
    engine.record_usage("device", 20).unwrap();
    let accrual = engine.record_usage("device", -50).unwrap();
    assert!(!accrual.applied);
    assert_eq!(engine.current_total().unwrap(), 20);
}

#[test]
fn test_huge_durations_saturate_and_lock() {
    let engine = memory_engine(1);
    for _ in 0..3 {
        engine.record_usage("device", i64::MAX).unwrap();
    }
    assert_eq!(engine.current_total().unwrap(), u64::MAX);
    assert_eq!(engine.lock_state().unwrap(), LockState::Locked);
    assert_eq!(engine.history(u32::MAX).unwrap().len(), 3650);
}

#[test]
fn test_sqlite_reopen_reconstructs_total() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("screenwarden.db");
    let clock = clock();

    {
        let db = Arc::new(Database::open_at(&path).unwrap());
        db.put(&profile(1)).unwrap();
        let engine = engine_with(
            EngineStores::shared(db),
            None,
            Arc::new(LogNotifier),
            clock.clone(),
        );
        engine.record_usage("device", 45).unwrap();
        engine.record_usage("app", 25).unwrap();
    }

    let db = Arc::new(Database::open_at(&path).unwrap());
    let engine = engine_with(EngineStores::shared(db), None, Arc::new(LogNotifier), clock);
    assert_eq!(engine.current_total().unwrap(), 70);
    let history = engine.history(1).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].events, 2);
    assert_eq!(history[0].total_secs, 70);
}

#[test]
fn test_sqlite_reopen_keeps_lock_until_override() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("screenwarden.db");
    let open = |clock: Arc<ManualClock>| {
        let db = Arc::new(Database::open_at(&path).unwrap());
        engine_with(EngineStores::shared(db), None, Arc::new(LogNotifier), clock)
    };
    let clock = clock();
    {
        let db = Database::open_at(&path).unwrap();
        db.put(&profile(1)).unwrap();
    }

    let daemon = open(clock.clone());
    daemon.record_usage("device", 90).unwrap();

    // A second handle on the same file, as a one-shot command would open.
    let command = open(clock.clone());
    assert_eq!(command.lock_state().unwrap(), LockState::Locked);
    assert!(command.request_unlock().unwrap().is_some());
    drop(command);

    assert_eq!(daemon.lock_state().unwrap(), LockState::Unlocked);
    drop(daemon);
    assert_eq!(open(clock).lock_state().unwrap(), LockState::Unlocked);
}

// ============================================================================
// Advisory
// ============================================================================

#[tokio::test]
async fn test_oracle_score_is_clamped() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(chat_reply(r#"{"score": 150, "recommendation": "Stop for today."}"#))
        .create_async()
        .await;

    let store = Arc::new(MemoryStore::with_profile(profile(60)));
    let engine = engine_with(
        EngineStores::shared(store),
        Some(format!("{}/v1/chat/completions", server.url())),
        Arc::new(LogNotifier),
        clock(),
    );

    let result = engine.refresh_advisory().await;
    mock.assert_async().await;
    assert_eq!(result.score, 100);
    assert_eq!(result.recommendation, "Stop for today.");
    assert_eq!(result.origin, AdvisoryOrigin::Oracle);
}

#[tokio::test]
async fn test_oracle_failure_yields_last_known_result() {
    let mut server = mockito::Server::new_async().await;
    let good = server
        .mock("POST", "/chat")
        .with_status(200)
        .with_body(chat_reply(r#"{"score": 42, "recommendation": "Stretch."}"#))
        .expect(1)
        .create_async()
        .await;

    let store = Arc::new(MemoryStore::with_profile(profile(60)));
    let engine = engine_with(
        EngineStores::shared(store),
        Some(format!("{}/chat", server.url())),
        Arc::new(LogNotifier),
        clock(),
    );
    assert_eq!(engine.refresh_advisory().await.score, 42);
    good.assert_async().await;
    good.remove_async().await;

    let _broken = server
        .mock("POST", "/chat")
        .with_status(200)
        .with_body(chat_reply("I am not JSON at all"))
        .create_async()
        .await;

    let result = engine.refresh_advisory().await;
    assert_eq!(result.origin, AdvisoryOrigin::LastKnown);
    assert_eq!(result.score, 42);
    assert_eq!(result.recommendation, "Stretch.");
}

#[tokio::test]
async fn test_oracle_failure_on_first_run_yields_default() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat")
        .with_status(503)
        .with_body("unavailable")
        .create_async()
        .await;

    let store = Arc::new(MemoryStore::with_profile(profile(60)));
    let engine = engine_with(
        EngineStores::shared(store),
        Some(format!("{}/chat", server.url())),
        Arc::new(LogNotifier),
        clock(),
    );

    let result = engine.refresh_advisory().await;
    assert_eq!(result.origin, AdvisoryOrigin::Default);
    assert!(result.score <= 100);
    assert_eq!(result.recommendation, "fallback advice");
}

#[tokio::test]
async fn test_advisory_does_not_change_lock_state() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat")
        .with_status(200)
        .with_body(chat_reply(r#"{"score": 0, "recommendation": "All good."}"#))
        .create_async()
        .await;

    let store = Arc::new(MemoryStore::with_profile(profile(1)));
    let engine = engine_with(
        EngineStores::shared(store),
        Some(format!("{}/chat", server.url())),
        Arc::new(LogNotifier),
        clock(),
    );
    engine.record_usage("device", 120).unwrap();
    engine.refresh_advisory().await;
    assert_eq!(engine.lock_state().unwrap(), LockState::Locked);
}

// ============================================================================
// Emergency
// ============================================================================

#[tokio::test]
async fn test_emergency_notifies_each_guardian_once() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/alert")
        .with_status(204)
        .expect(2)
        .create_async()
        .await;

    let store = Arc::new(MemoryStore::with_profile(profile(60)));
    store
        .add(&Guardian::new("Mum", Some("+15550100"), None))
        .unwrap();
    store
        .add(&Guardian::new("Coach", None, Some("coach@example.org")))
        .unwrap();
    let notifier = Arc::new(WebhookNotifier::new(&format!("{}/alert", server.url())));
    let engine = engine_with(EngineStores::shared(store), None, notifier, clock());

    match engine.trigger_emergency().await.unwrap() {
        IncidentOutcome::Dispatched(report) => {
            assert_eq!(report.deliveries.len(), 2);
            assert!(report.all_notified());
        }
        other => panic!("Expected Dispatched, got {other:?}"),
    }
    mock.assert_async().await;
    assert!(!engine.emergency_active());
}

#[tokio::test]
async fn test_emergency_failure_is_reported_per_guardian() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/alert")
        .with_status(500)
        .create_async()
        .await;

    let store = Arc::new(MemoryStore::with_profile(profile(60)));
    store.add(&Guardian::new("Dad", Some("+15550101"), None)).unwrap();
    let notifier = Arc::new(WebhookNotifier::new(&format!("{}/alert", server.url())));
    let engine = engine_with(EngineStores::shared(store), None, notifier, clock());

    match engine.trigger_emergency().await.unwrap() {
        IncidentOutcome::Dispatched(report) => {
            assert_eq!(report.not_notified(), vec!["Dad"]);
        }
        other => panic!("Expected Dispatched, got {other:?}"),
    }
}

#[tokio::test]
async fn test_emergency_leaves_lock_state_alone() {
    let engine = memory_engine(1);
    engine.record_usage("device", 90).unwrap();
    engine.trigger_emergency().await.unwrap();
    assert_eq!(engine.lock_state().unwrap(), LockState::Locked);
}

#[tokio::test]
async fn test_second_profile_store_is_independent() {
    let a = memory_engine(1);
    let b = memory_engine(1);
    a.record_usage("device", 90).unwrap();
    assert_eq!(a.lock_state().unwrap(), LockState::Locked);
    assert_eq!(b.lock_state().unwrap(), LockState::Unlocked);
    assert_eq!(b.current_total().unwrap(), 0);
}
