//! Integration tests for finguard-agent
//!
//! These tests drive the session runtime end to end against a scripted
//! backend, the way the agent's event loop does.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration as ChronoDuration, Local};
use finguard_api::{
    AlertCategory, CredentialEvent, DomainEvent, Event, EventPayload, IdleState,
    NotificationEvent, NotificationKind, Priority, SessionEndReason, TokenPair,
};
use finguard_backend::{
    BUDGET_SUMMARY_PATH, FinanceApi, MockTransport, REFRESH_PATH, UPCOMING_BILLS_PATH,
};
use finguard_config::{AgentConfig, parse_config};
use finguard_core::{CredentialStatus, NotificationDraft, ScheduleDecision, SessionRuntime};
use finguard_store::{AuditEventType, MemoryStore, SqliteStore, Store};
use finguard_util::MonotonicInstant;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn jwt_expiring_in(secs: i64) -> String {
    let exp = finguard_util::now().timestamp() + secs;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let claims = URL_SAFE_NO_PAD.encode(json!({ "sub": "user-1", "exp": exp }).to_string());
    format!("{}.{}.sig", header, claims)
}

fn pair(secs: i64) -> TokenPair {
    TokenPair::new(jwt_expiring_in(secs), Some("refresh-1".into()))
}

fn quiet_config() -> AgentConfig {
    let mut config = AgentConfig::default();
    config.notifications.defaults.quiet_hours.enabled = false;
    config
}

fn make_runtime(store: Arc<dyn Store>) -> (Arc<MockTransport>, SessionRuntime) {
    let mock = Arc::new(MockTransport::new());
    let runtime = SessionRuntime::new(FinanceApi::new(mock.clone()), store, &quiet_config());
    (mock, runtime)
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_renewal_expires_session() {
    let store = Arc::new(MemoryStore::new());
    let (mock, runtime) = make_runtime(store.clone());
    let mut events = runtime.credentials().events().subscribe();

    for _ in 0..3 {
        mock.push_status(REFRESH_PATH, 500);
    }

    let decision = runtime
        .login(pair(60), finguard_util::now(), MonotonicInstant::now())
        .unwrap();
    assert_eq!(decision, ScheduleDecision::RefreshNow);

    runtime.settle().await;

    assert_eq!(mock.calls_to(REFRESH_PATH), 3);
    assert_eq!(
        events.recv().await.unwrap(),
        CredentialEvent::SessionExpired {
            reason: SessionEndReason::RenewalExhausted
        }
    );

    // Nothing is left armed anywhere
    assert!(!runtime.credentials().has_credential());
    assert_eq!(runtime.credentials().armed_timers(), 0);
    assert_eq!(runtime.idle().armed_timers(), 0);
    assert_eq!(runtime.idle().state(), IdleState::Expired);
    assert_eq!(runtime.notifications().armed_timers(), 0);
    assert!(store.load_credential().unwrap().is_none());
}

#[tokio::test]
async fn test_expired_credential_refreshes_immediately() {
    let (mock, runtime) = make_runtime(Arc::new(MemoryStore::new()));
    mock.push_ok(
        REFRESH_PATH,
        json!({ "token": jwt_expiring_in(3600), "refreshToken": "refresh-2" }),
    );

    let now = finguard_util::now();
    let decision = runtime
        .login(pair(-30), now, MonotonicInstant::now())
        .unwrap();
    assert_eq!(decision, ScheduleDecision::RefreshNow);

    runtime.settle().await;

    let credential = runtime.credentials().credential().unwrap();
    assert_eq!(credential.refresh_token.as_deref(), Some("refresh-2"));
    assert_eq!(
        runtime.on_focus(&finguard_util::now()),
        CredentialStatus::Valid
    );
    assert_eq!(runtime.credentials().armed_timers(), 1);
}

#[tokio::test]
async fn test_bill_due_tomorrow_is_critical_once() {
    let (mock, runtime) = make_runtime(Arc::new(MemoryStore::new()));
    let t0 = MonotonicInstant::now();
    let now = finguard_util::now();
    runtime.login(pair(4 * 3600), now, t0).unwrap();

    let due = (now + ChronoDuration::hours(20)).to_rfc3339();
    mock.set_default_ok(
        UPCOMING_BILLS_PATH,
        json!([{ "id": 3, "name": "Internet", "amount": 999, "dueDate": due }]),
    );

    // First hourly poll; activity keeps the idle monitor from expiring
    assert!(runtime.record_activity(t0 + Duration::from_secs(3590)));
    runtime.tick(now, t0 + Duration::from_secs(3600));
    runtime.settle().await;

    // Second hourly poll sees the same bill
    assert!(runtime.record_activity(t0 + Duration::from_secs(7190)));
    runtime.tick(now, t0 + Duration::from_secs(7200));
    runtime.settle().await;

    assert_eq!(mock.calls_to(UPCOMING_BILLS_PATH), 2);

    let bills: Vec<_> = runtime
        .notifications()
        .notifications(None, false)
        .into_iter()
        .filter(|n| n.kind == NotificationKind::BillDue)
        .collect();
    assert_eq!(bills.len(), 1);
    assert_eq!(bills[0].priority, Priority::Critical);
    assert_eq!(bills[0].title, "Bill Due Tomorrow!");
    assert!(bills[0].has_action("pay-bill"));
}

#[tokio::test]
async fn test_budget_thresholds() {
    let (mock, runtime) = make_runtime(Arc::new(MemoryStore::new()));
    mock.set_default_ok(
        BUDGET_SUMMARY_PATH,
        json!([{ "category": "Groceries", "spent": "700", "budget_limit": "1000" }]),
    );
    runtime
        .login(pair(3600), finguard_util::now(), MonotonicInstant::now())
        .unwrap();

    let expense = |amount: f64| DomainEvent::ExpenseRecorded {
        amount,
        category: "Groceries".into(),
    };

    let medium = runtime
        .dispatch(expense(60.0), finguard_util::now())
        .await
        .unwrap();
    assert_eq!(medium.priority, Priority::Medium);
    assert_eq!(medium.kind, NotificationKind::BudgetWarning);

    let high = runtime
        .dispatch(expense(220.0), finguard_util::now())
        .await
        .unwrap();
    assert_eq!(high.priority, Priority::High);

    let list = runtime.notifications().notifications(None, false);
    assert_eq!(list.len(), 2);
    assert_eq!(
        list.iter().filter(|n| n.priority == Priority::High).count(),
        1
    );
}

#[tokio::test]
async fn test_idle_expiry_clears_credential() {
    let store = Arc::new(MemoryStore::new());
    let (_, runtime) = make_runtime(store.clone());
    let mut idle_events = runtime.idle().events().subscribe();
    let t0 = MonotonicInstant::now();
    let now = finguard_util::now();
    runtime.login(pair(4 * 3600), now, t0).unwrap();

    runtime.tick(now, t0 + Duration::from_secs(25 * 60));
    runtime.tick(now, t0 + Duration::from_secs(25 * 60 + 1));
    let report = runtime.tick(now, t0 + Duration::from_secs(30 * 60));
    assert!(report.idle_expired);

    assert!(matches!(
        idle_events.try_recv(),
        Ok(finguard_api::IdleEvent::WarningStarted {
            remaining_ms: 300_000
        })
    ));
    assert!(matches!(
        idle_events.try_recv(),
        Ok(finguard_api::IdleEvent::Countdown { .. })
    ));

    assert!(!runtime.credentials().has_credential());
    assert!(store.load_credential().unwrap().is_none());
    assert!(!runtime.notifications().is_running());

    let audits: Vec<_> = store
        .get_recent_audits(10)
        .unwrap()
        .into_iter()
        .map(|a| a.event)
        .collect();
    assert!(audits.contains(&AuditEventType::IdleWarning));
    assert!(audits.contains(&AuditEventType::SessionExpired {
        reason: SessionEndReason::IdleTimeout
    }));
}

#[tokio::test]
async fn test_session_survives_restart_until_logout() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("finguard.db");

    {
        let store = Arc::new(SqliteStore::open(&db_path).unwrap());
        let (_, runtime) = make_runtime(store);
        runtime
            .login(pair(3600), finguard_util::now(), MonotonicInstant::now())
            .unwrap();
        runtime.shutdown();
    }

    let store = Arc::new(SqliteStore::open(&db_path).unwrap());
    let (_, runtime) = make_runtime(store.clone());
    assert!(
        runtime
            .restore(finguard_util::now(), MonotonicInstant::now())
            .unwrap()
    );
    assert_eq!(runtime.idle().state(), IdleState::Active);

    runtime.logout();
    assert_eq!(runtime.idle().state(), IdleState::Stopped);
    assert!(!runtime.notifications().is_running());
    assert!(store.load_credential().unwrap().is_none());

    let (_, fresh) = make_runtime(store);
    assert!(
        !fresh
            .restore(finguard_util::now(), MonotonicInstant::now())
            .unwrap()
    );
}

#[tokio::test]
async fn test_history_retention_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("finguard.db")).unwrap());
    let now = finguard_util::now();

    let make = |days: i64, name: &str| -> finguard_api::Notification {
        NotificationDraft::new(NotificationKind::FamilyUpdate, "Family Member Added", name)
            .into_notification(now - ChronoDuration::days(days), None)
    };
    let kept = make(29, "kept");
    let pruned = make(31, "pruned");
    store.save_notifications(&[kept.clone(), pruned]).unwrap();

    let (_, runtime) = make_runtime(store.clone());
    assert!(
        !runtime
            .restore(now, MonotonicInstant::now())
            .unwrap()
    );

    let history = runtime.notifications().notifications(None, false);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, kept.id);
    assert_eq!(store.load_notifications().unwrap().len(), 1);
}

#[tokio::test]
async fn test_settings_failure_keeps_in_memory_settings() {
    let store = Arc::new(MemoryStore::new());
    let (_, runtime) = make_runtime(store.clone());
    let engine = runtime.notifications();

    let mut settings = engine.settings();
    settings.set_enabled(AlertCategory::BudgetAlerts, false);

    store.set_fail_writes(true);
    assert!(engine.update_settings(settings).is_err());
    assert!(!engine.settings().is_enabled(AlertCategory::BudgetAlerts));

    store.set_fail_writes(false);
    assert!(store.load_settings().unwrap().is_none());
}

#[tokio::test]
async fn test_quiet_hours_from_config() {
    let config = parse_config(
        r#"
config_version = 1

[notifications.quiet_hours]
enabled = true
start = "00:00"
end = "23:59"
"#,
    )
    .unwrap();

    let mock = Arc::new(MockTransport::new());
    let runtime = SessionRuntime::new(
        FinanceApi::new(mock),
        Arc::new(MemoryStore::new()),
        &config,
    );
    let mut rx = runtime.notifications().events().subscribe();
    runtime
        .login(pair(3600), finguard_util::now(), MonotonicInstant::now())
        .unwrap();

    let at: DateTime<Local> = finguard_util::now()
        .date_naive()
        .and_hms_opt(12, 0, 0)
        .and_then(|t| t.and_local_timezone(Local).earliest())
        .unwrap();

    let n = runtime
        .dispatch(
            DomainEvent::FamilyMemberAdded {
                name: "Meera".into(),
            },
            at,
        )
        .await
        .unwrap();
    assert!(n.deferred_until.is_some());
    assert!(runtime.notifications().toasts().is_empty());
    assert!(matches!(
        rx.try_recv(),
        Ok(NotificationEvent::Added {
            immediate: false,
            ..
        })
    ));
}

#[test]
fn test_event_envelope_wire_format() {
    let event = Event::new(EventPayload::Credential(CredentialEvent::LoggedOut));
    let value = serde_json::to_value(&event).unwrap();

    assert_eq!(value["payload"]["channel"], "credential");
    assert_eq!(value["payload"]["event"]["type"], "logged_out");
    assert!(value["api_version"].is_number());
}
