//! Session actor tests on tokio's paused clock.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use session_meter_core::{
    EndReason, HostContext, LanguageAddition, ManualClock, MeetingId, MeterError,
    PricingCatalog, SessionEvent, SessionRequest, SessionStatus, UserId, UserRole,
};
use session_meter_runtime::{MeterConfig, RuntimeError, SessionActor, SessionHandle};
use session_meter_store::{MemoryStore, UsageStore};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

fn user() -> UserId {
    UserId::new("host-7").unwrap()
}

fn request(targets: &[&str]) -> SessionRequest {
    SessionRequest::new("en", targets.iter().copied()).with_context(HostContext {
        meeting_id: MeetingId::new("all-hands").unwrap(),
        user_id: user(),
        role: UserRole::Host,
        display_name: "All Hands".into(),
    })
}

fn spawn(store: Arc<MemoryStore>) -> (SessionHandle, JoinHandle<()>) {
    let clock = Arc::new(ManualClock::new(
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
    ));
    SessionActor::spawn(
        &MeterConfig::default(),
        Arc::new(PricingCatalog::default()),
        store,
        clock,
        user(),
    )
    .unwrap()
}

/// Sleep to just past `seconds` ticks so the timer and the sleep never tie.
async fn advance(seconds: u64) {
    tokio::time::sleep(Duration::from_millis(seconds * 1000 + 500)).await;
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn ticks_once_per_second_while_active() {
    let store = Arc::new(MemoryStore::new());
    let (handle, _task) = spawn(store);
    handle.attach_payment_method().await.unwrap();
    handle
        .start(request(&["es"]).with_tier("starter"))
        .await
        .unwrap();

    advance(10).await;
    let snapshot = handle.snapshot().unwrap();
    assert_eq!(snapshot.status, SessionStatus::Active);
    assert_eq!(snapshot.duration_seconds, 10);
    assert!((snapshot.cost - 45.0 * 10.0 / 3600.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn paused_session_does_not_tick() {
    let store = Arc::new(MemoryStore::new());
    let (handle, _task) = spawn(store);
    handle.start(request(&["es"])).await.unwrap();

    advance(5).await;
    handle.pause().await.unwrap();
    advance(120).await;
    assert_eq!(handle.snapshot().unwrap().duration_seconds, 5);
    assert_eq!(handle.snapshot().unwrap().status, SessionStatus::Paused);

    handle.resume().await.unwrap();
    advance(2).await;
    assert_eq!(handle.snapshot().unwrap().duration_seconds, 7);
}

#[tokio::test(start_paused = true)]
async fn free_tier_session_ends_and_clears_after_grace() {
    let store = Arc::new(MemoryStore::new());
    let (handle, _task) = spawn(store.clone());
    let mut events = handle.subscribe();

    handle.start(request(&["es"])).await.unwrap();
    advance(900).await;

    let snapshot = handle.snapshot().unwrap();
    assert_eq!(snapshot.status, SessionStatus::Ended);
    assert_eq!(snapshot.duration_seconds, 900);
    assert_eq!(snapshot.end_reason, Some(EndReason::FreeTierLimitReached));

    let events = drain(&mut events);
    assert!(matches!(events.first(), Some(SessionEvent::Started { .. })));
    let warnings: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::FreeTimeWarning {
                remaining_seconds, ..
            } => Some(*remaining_seconds),
            _ => None,
        })
        .collect();
    assert_eq!(warnings, vec![120]);
    assert!(matches!(
        events.last(),
        Some(SessionEvent::Ended {
            reason: EndReason::FreeTierLimitReached,
            ..
        })
    ));

    // Persisted on end.
    let account = store.get_account(&user()).unwrap().unwrap();
    assert_eq!(account.daily_free_seconds_used, 900);
    assert_eq!(store.list_sessions(&user(), 10, 0).unwrap().len(), 1);

    // Cleared once the grace period passes.
    advance(3).await;
    assert!(handle.snapshot().is_none());

    let err = handle.start(request(&["es"])).await.unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Meter(MeterError::FreeTierExhausted)
    ));
}

#[tokio::test(start_paused = true)]
async fn commands_report_engine_errors() {
    let store = Arc::new(MemoryStore::new());
    let (handle, _task) = spawn(store);

    let err = handle.pause().await.unwrap_err();
    assert!(matches!(
        err.as_meter(),
        Some(MeterError::InvalidTransition { .. })
    ));

    handle.attach_payment_method().await.unwrap();
    handle
        .start(request(&["es", "fr"]).with_tier("starter"))
        .await
        .unwrap();
    assert_eq!(
        handle.add_language("de").await.unwrap(),
        LanguageAddition::Overage
    );
    assert_eq!(
        handle.add_language("de").await.unwrap(),
        LanguageAddition::AlreadyActive
    );
    assert_eq!(handle.set_participant_count(150).await.unwrap(), 1.25);
    assert!(handle.detach_payment_method().await.is_err());
    assert!(matches!(
        handle.attach_payment_method().await.unwrap_err().as_meter(),
        Some(MeterError::InvalidTransition { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn stop_persists_account_and_history() {
    let store = Arc::new(MemoryStore::new());
    let (handle, _task) = spawn(store.clone());
    handle.attach_payment_method().await.unwrap();
    handle
        .start(request(&["es"]).with_tier("professional"))
        .await
        .unwrap();

    advance(60).await;
    let summary = handle.stop().await.unwrap();
    assert_eq!(summary.duration_seconds, 60);

    let account = store.get_account(&user()).unwrap().unwrap();
    assert_eq!(account.lifetime_sessions, 1);
    assert!(account.unpaid_usage_cents > 0);

    let history = handle.history(10).await.unwrap();
    assert_eq!(history, vec![summary]);

    let billed = handle.close_billing_period().await.unwrap();
    assert_eq!(billed, account.unpaid_usage_cents);
    assert_eq!(
        store.get_account(&user()).unwrap().unwrap().unpaid_usage_cents,
        0
    );
}

#[tokio::test(start_paused = true)]
async fn account_survives_actor_restart() {
    let store = Arc::new(MemoryStore::new());
    {
        let (handle, task) = spawn(store.clone());
        handle.attach_payment_method().await.unwrap();
        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(matches!(
            handle.account().await,
            Err(RuntimeError::ActorClosed)
        ));
    }

    let (handle, _task) = spawn(store);
    let account = handle.account().await.unwrap();
    assert!(account.payment_method_added());
}

#[tokio::test(start_paused = true)]
async fn dropping_handles_stops_live_session() {
    let store = Arc::new(MemoryStore::new());
    let (handle, task) = spawn(store.clone());
    handle.start(request(&["es"])).await.unwrap();
    advance(30).await;

    drop(handle);
    task.await.unwrap();

    let sessions = store.list_sessions(&user(), 10, 0).unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].duration_seconds, 30);
    assert_eq!(sessions[0].end_reason, Some(EndReason::Manual));
}
