//! Integration tests for memoized functions
//!
//! Tests the flow: Memoized::invoke -> fingerprint -> cache hit/miss,
//! including sharing one cache between several sessions.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use rerunkit::cache::{CacheRegistry, ManualClock};
use rerunkit::demo::SquareDemo;
use rerunkit::{CachePolicy, Config, InvokeError, Memoized, SessionRegistry};
use serde::Serialize;

use super::common::determinism::CallCounter;

/// square(7) three times returns 49 each time and runs once
#[test]
fn test_square_scenario() {
    let demo = SquareDemo::new(CachePolicy::default());

    let results: Vec<i64> = (0..3).map(|_| demo.square(7).unwrap()).collect();

    assert_eq!(results, vec![49, 49, 49]);
    assert_eq!(demo.calls(), 1);
}

/// A failing load is retried on the next call instead of being cached
#[test]
fn test_failed_load_is_retried() {
    let calls = CallCounter::new();
    let counter = calls.clone();
    let load_csv = Memoized::new("load_csv", move |url: &str| {
        counter.hit();
        if counter.get() == 1 {
            Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("timed out fetching {}", url),
            ))
        } else {
            Ok(vec!["Month".to_string(), "1958".to_string()])
        }
    });

    let first = load_csv.invoke("airtravel.csv");
    assert!(matches!(first, Err(InvokeError::Failed(ref e)) if e.kind() == std::io::ErrorKind::TimedOut));

    let second = load_csv.invoke("airtravel.csv").unwrap();
    let third = load_csv.invoke("airtravel.csv").unwrap();

    assert_eq!(second, third);
    assert_eq!(calls.get(), 2);
}

#[derive(Debug, Clone, Serialize)]
struct ChartRequest {
    product: String,
    months: Vec<String>,
    options: HashMap<String, String>,
}

/// Structured arguments with nested collections hit the cache when equal
#[test]
fn test_structured_arguments() {
    let calls = CallCounter::new();
    let counter = calls.clone();
    let render = Memoized::infallible("render_chart", move |req: &ChartRequest| {
        counter.hit();
        format!("{}:{}", req.product, req.months.len())
    });

    let mut options = HashMap::new();
    options.insert("marker".to_string(), "x".to_string());
    options.insert("grid".to_string(), "true".to_string());
    let request = ChartRequest {
        product: "A".into(),
        months: vec!["Jan".into(), "Feb".into()],
        options,
    };

    let mut reordered = HashMap::new();
    reordered.insert("grid".to_string(), "true".to_string());
    reordered.insert("marker".to_string(), "x".to_string());
    let same = ChartRequest {
        options: reordered,
        ..request.clone()
    };
    let different = ChartRequest {
        product: "B".into(),
        ..request.clone()
    };

    assert_eq!(render.invoke(&request).unwrap(), "A:2");
    assert_eq!(render.invoke(&same).unwrap(), "A:2");
    assert_eq!(calls.get(), 1);

    assert_eq!(render.invoke(&different).unwrap(), "B:2");
    assert_eq!(calls.get(), 2);
}

/// Policy from the config file drives expiry
#[test]
fn test_configured_ttl_expires_results() {
    let config = Config::from_toml_str("[cache]\nttl_secs = 60").unwrap();
    let clock = ManualClock::new();
    let calls = CallCounter::new();
    let counter = calls.clone();
    let square = Memoized::infallible("square", move |x: &i64| {
        counter.hit();
        x * x
    })
    .with_policy(config.cache)
    .with_clock(Arc::new(clock.clone()));

    square.invoke(&4).unwrap();
    clock.advance(Duration::from_secs(30));
    square.invoke(&4).unwrap();
    assert_eq!(calls.get(), 1);

    clock.advance(Duration::from_secs(30));
    square.invoke(&4).unwrap();
    assert_eq!(calls.get(), 2);
}

/// Capacity bound keeps the most recently used results
#[test]
fn test_capacity_bound() {
    let calls = CallCounter::new();
    let counter = calls.clone();
    let square = Memoized::infallible("square", move |x: &i64| {
        counter.hit();
        x * x
    })
    .with_policy(CachePolicy::lru(NonZeroUsize::new(3).unwrap()));

    for x in 0..10 {
        square.invoke(&x).unwrap();
    }
    assert_eq!(square.len(), 3);
    assert_eq!(square.stats().evictions, 7);

    square.invoke(&9).unwrap();
    assert_eq!(calls.get(), 10);
    square.invoke(&0).unwrap();
    assert_eq!(calls.get(), 11);
}

/// One process-wide cache serves many sessions, each with its own state
#[test]
fn test_cache_shared_across_sessions() {
    let calls = CallCounter::new();
    let counter = calls.clone();
    let square = Arc::new(Memoized::infallible("square", move |x: &i64| {
        counter.hit();
        x * x
    }));
    let registry = Arc::new(SessionRegistry::default());

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let square = square.clone();
            let registry = registry.clone();
            std::thread::spawn(move || {
                let session = registry.connect(None);
                session.rerun(|ctx| {
                    let result = square.invoke(&9).unwrap();
                    ctx.state_mut().set("last_square", result);
                });
                session.id().clone()
            })
        })
        .collect();
    let ids: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();

    assert_eq!(calls.get(), 1);
    assert_eq!(registry.len(), 4);
    for id in &ids {
        let session = registry.get(id).unwrap();
        session.inspect(|s| {
            assert_eq!(s.state().get_as::<i64>("last_square").unwrap(), 81);
        });
    }
}

/// Clearing through the registry forces every cache to recompute
#[test]
fn test_clear_all_caches() {
    let registry = CacheRegistry::new();
    let calls = CallCounter::new();
    let counter = calls.clone();
    let square = Arc::new(Memoized::infallible("square", move |x: &i64| {
        counter.hit();
        x * x
    }));
    registry.register(&square);

    square.invoke(&5).unwrap();
    square.invoke(&5).unwrap();
    assert_eq!(registry.clear_all(), 1);
    square.invoke(&5).unwrap();

    assert_eq!(calls.get(), 2);
}
