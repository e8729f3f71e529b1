//! Integration tests for session state across reruns
//!
//! Tests the flow: SessionRegistry -> SessionHandle::rerun -> StateStore

use std::time::Duration;

use rerunkit::demo::{counter_page, CounterAction, COUNTER_KEY};
use rerunkit::{SessionConfig, SessionRegistry, StateError};
use serde_json::json;

/// Counter starts at zero and three reruns each add one
#[test]
fn test_counter_persists_across_reruns() {
    let registry = SessionRegistry::default();
    let session = registry.connect(None);

    session.rerun(|ctx| ctx.state_mut().set("counter", 0));
    for _ in 0..3 {
        session.rerun(|ctx| {
            let state = ctx.state_mut();
            let current = state.get_as::<i64>("counter").unwrap();
            state.set("counter", current + 1);
        });
    }

    let value = session.rerun(|ctx| ctx.state().get_as::<i64>("counter").unwrap());
    assert_eq!(value, 3);
    assert_eq!(session.reruns(), 5);
}

/// A value written in one rerun is visible unchanged in the next
#[test]
fn test_value_visible_in_later_rerun() {
    let registry = SessionRegistry::default();
    let session = registry.connect(None);

    session.rerun(|ctx| {
        ctx.state_mut()
            .set("csv_url", "https://example.com/airtravel.csv")
    });

    for _ in 0..3 {
        session.rerun(|ctx| {
            assert_eq!(
                ctx.state().get("csv_url").unwrap(),
                &json!("https://example.com/airtravel.csv")
            );
        });
    }
}

/// Deleting a key makes later reruns see it as absent
#[test]
fn test_delete_across_reruns() {
    let registry = SessionRegistry::default();
    let session = registry.connect(None);

    session.rerun(|ctx| ctx.state_mut().set("draft", "hello"));
    session.rerun(|ctx| {
        ctx.state_mut().delete("draft");
    });

    session.rerun(|ctx| {
        assert!(!ctx.state().contains("draft"));
        assert!(matches!(
            ctx.state().get("draft"),
            Err(StateError::KeyNotFound(_))
        ));
    });
}

/// The counter page from the demo driver, with a reset in the middle
#[test]
fn test_counter_page_with_reset() {
    let registry = SessionRegistry::default();
    let session = registry.connect(None);

    let actions = [
        CounterAction::None,
        CounterAction::Increment,
        CounterAction::Increment,
        CounterAction::Reset,
        CounterAction::Increment,
    ];
    let values: Vec<i64> = actions
        .iter()
        .map(|action| session.rerun(|ctx| counter_page(ctx, *action)).unwrap())
        .collect();

    assert_eq!(values, vec![0, 1, 2, 0, 1]);
    session.inspect(|s| {
        assert_eq!(s.state().get_as::<i64>(COUNTER_KEY).unwrap(), 1);
    });
}

/// Two browser tabs get independent counters
#[test]
fn test_sessions_keep_separate_counters() {
    let registry = SessionRegistry::default();
    let first = registry.connect(None);
    let second = registry.connect(None);

    for _ in 0..2 {
        first
            .rerun(|ctx| counter_page(ctx, CounterAction::Increment))
            .unwrap();
    }
    let second_value = second
        .rerun(|ctx| counter_page(ctx, CounterAction::Increment))
        .unwrap();

    assert_eq!(second_value, 1);
    assert_eq!(
        first
            .rerun(|ctx| counter_page(ctx, CounterAction::None))
            .unwrap(),
        2
    );
}

/// Reconnecting with a known id resumes state; after expiry it starts over
#[test]
fn test_reconnect_and_expiry() {
    let registry = SessionRegistry::new(SessionConfig {
        idle_timeout: Duration::from_secs(300),
    });
    let session = registry.connect(None);
    session
        .rerun(|ctx| counter_page(ctx, CounterAction::Increment))
        .unwrap();

    let resumed = registry.connect(Some(session.id()));
    assert_eq!(
        resumed
            .rerun(|ctx| counter_page(ctx, CounterAction::None))
            .unwrap(),
        1
    );

    let later = resumed.last_seen() + chrono::Duration::seconds(301);
    assert_eq!(registry.reap_idle_at(later), vec![session.id().clone()]);

    let fresh = registry.connect(Some(session.id()));
    assert_ne!(fresh.id(), session.id());
    assert_eq!(
        fresh
            .rerun(|ctx| counter_page(ctx, CounterAction::None))
            .unwrap(),
        0
    );
}
