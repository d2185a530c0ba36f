//! Behaviour shared by every `UsageStore` backend.

use std::sync::Arc;

use chrono::NaiveDate;
use session_meter_core::{
    FreeTierLimits, HostContext, ManualClock, MeetingId, PricingCatalog, SessionEngine,
    SessionRequest, SessionSummary, UsageLedger, UserId, UserRole,
};
use session_meter_store::{FileStore, MemoryStore, StoreError, UsageStore};

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
}

/// Run `count` short paid sessions and return the engine and their summaries.
fn run_sessions(user: &UserId, count: usize) -> (SessionEngine, Vec<SessionSummary>) {
    let mut ledger = UsageLedger::open(user.clone(), FreeTierLimits::default(), day());
    ledger.attach_payment_method();
    let mut engine = SessionEngine::new(
        Arc::new(PricingCatalog::default()),
        ledger,
        Arc::new(ManualClock::new(day())),
    );

    let context = HostContext {
        meeting_id: MeetingId::new("standup").unwrap(),
        user_id: user.clone(),
        role: UserRole::Host,
        display_name: "Standup".into(),
    };

    let mut summaries = Vec::new();
    for i in 0..count {
        engine
            .start(
                SessionRequest::new("en", ["es"])
                    .with_context(context.clone())
                    .with_tier("starter"),
            )
            .unwrap();
        for _ in 0..=(i * 60) {
            engine.tick().unwrap();
        }
        summaries.push(engine.stop().unwrap());
        // ULIDs generated in the same millisecond are not ordered; space them out.
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
    (engine, summaries)
}

fn exercise(store: &dyn UsageStore) {
    let alice = UserId::new("alice").unwrap();
    let bob = UserId::new("bob").unwrap();

    assert!(store.get_account(&alice).unwrap().is_none());

    let (engine, summaries) = run_sessions(&alice, 3);
    let account = engine.usage().account().clone();
    store.put_account(&account).unwrap();
    for summary in &summaries {
        store.put_session(summary).unwrap();
    }

    let (_, bob_sessions) = run_sessions(&bob, 1);
    store.put_session(&bob_sessions[0]).unwrap();

    // Account round trip, including an update.
    assert_eq!(store.get_account(&alice).unwrap().unwrap(), account);
    let mut updated = account.clone();
    updated.unpaid_usage_cents += 100;
    store.put_account(&updated).unwrap();
    assert_eq!(
        store.get_account(&alice).unwrap().unwrap().unpaid_usage_cents,
        account.unpaid_usage_cents + 100
    );

    // Single session lookup.
    let first = &summaries[0];
    assert_eq!(
        store
            .get_session(&alice, &first.session_id)
            .unwrap()
            .as_ref(),
        Some(first)
    );
    assert!(store
        .get_session(&bob, &first.session_id)
        .unwrap()
        .is_none());

    // Listing is per user, newest first, paginated.
    let listed = store.list_sessions(&alice, 10, 0).unwrap();
    let ids: Vec<_> = listed.iter().map(|s| s.session_id).collect();
    let mut expected: Vec<_> = summaries.iter().map(|s| s.session_id).collect();
    expected.reverse();
    assert_eq!(ids, expected);

    let page = store.list_sessions(&alice, 1, 1).unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].session_id, summaries[1].session_id);

    assert_eq!(store.list_sessions(&bob, 10, 0).unwrap().len(), 1);

    // Delete.
    store.delete_account(&alice).unwrap();
    assert!(store.get_account(&alice).unwrap().is_none());
    assert!(matches!(
        store.delete_account(&alice),
        Err(StoreError::NotFound)
    ));
}

#[test]
fn memory_store() {
    exercise(&MemoryStore::new());
}

#[test]
fn file_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    exercise(&store);

    assert!(dir.path().join("session/alice").is_dir());
}

#[test]
fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let alice = UserId::new("alice").unwrap();
    let (engine, summaries) = run_sessions(&alice, 1);

    {
        let store = FileStore::open(dir.path()).unwrap();
        store.put_account(engine.usage().account()).unwrap();
        store.put_session(&summaries[0]).unwrap();
    }

    let store = FileStore::open(dir.path()).unwrap();
    let account = store.get_account(&alice).unwrap().unwrap();
    assert_eq!(account.lifetime_sessions, 1);
    assert_eq!(store.list_sessions(&alice, 10, 0).unwrap(), summaries);
}

#[cfg(feature = "rocksdb-backend")]
#[test]
fn rocks_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = session_meter_store::RocksStore::open(dir.path()).unwrap();
    exercise(&store);
}
