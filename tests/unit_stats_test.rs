mod support;

use peridot::connection::RemoteConnectionSession;
use peridot::core::stats::{ActiveSessionRegistry, RequestRateCounter};
use peridot::core::{MethodCall, RemoteClient};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use support::*;
use tokio::sync::broadcast;
use uuid::Uuid;

#[tokio::test(start_paused = true)]
async fn test_rate_counter_computes_rounded_rate_per_tick() {
    let counter = Arc::new(RequestRateCounter::new());
    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(
        counter
            .clone()
            .run(Duration::from_millis(2500), shutdown_tx.subscribe()),
    );
    // Let the task start and swallow the immediate first tick.
    tokio::task::yield_now().await;

    assert_eq!(counter.requests_per_second(), 0);
    for _ in 0..50 {
        counter.record();
    }

    tokio::time::advance(Duration::from_millis(2500)).await;
    tokio::task::yield_now().await;

    // 50 requests over a 2.5 second window.
    assert_eq!(counter.requests_per_second(), 20);
}

#[tokio::test(start_paused = true)]
async fn test_rate_counter_resets_between_ticks() {
    let counter = Arc::new(RequestRateCounter::new());
    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(
        counter
            .clone()
            .run(Duration::from_millis(2500), shutdown_tx.subscribe()),
    );
    tokio::task::yield_now().await;

    for _ in 0..50 {
        counter.record();
    }
    tokio::time::advance(Duration::from_millis(2500)).await;
    tokio::task::yield_now().await;
    assert_eq!(counter.requests_per_second(), 20);

    // A quiet window drops the rate back to zero.
    tokio::time::advance(Duration::from_millis(2500)).await;
    tokio::task::yield_now().await;
    assert_eq!(counter.requests_per_second(), 0);
}

#[tokio::test]
async fn test_rate_is_stale_between_ticks() {
    let counter = RequestRateCounter::new();
    for _ in 0..10 {
        counter.record();
    }
    // No tick has run, so the published rate is still the initial zero.
    assert_eq!(counter.requests_per_second(), 0);
}

#[tokio::test]
async fn test_active_session_registry_tracks_membership() {
    let active = ActiveSessionRegistry::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    assert!(active.is_empty());
    active.enter(a);
    active.enter(b);
    assert_eq!(active.len(), 2);
    assert!(active.is_active(a));

    active.exit(a);
    assert_eq!(active.len(), 1);
    assert!(!active.is_active(a));
    assert!(active.is_active(b));
}

#[tokio::test]
async fn test_session_is_active_only_during_a_call() {
    let active = Arc::new(ActiveSessionRegistry::new());
    let rate = Arc::new(RequestRateCounter::new());
    let env = peridot::connection::SessionEnv::new(
        active.clone(),
        rate,
        Arc::new(peridot::core::transport::NoopExporter),
    );
    let factory = TestFactory::new();
    let client = RemoteClient::from_request(request("demo"));
    let session = RemoteConnectionSession::open_local(client, factory.clone(), env)
        .await
        .unwrap();

    let observed = Arc::new(AtomicUsize::new(0));
    let during_call = observed.clone();
    let watch = active.clone();
    *factory.last().on_execute.lock() = Some(Box::new(move || {
        during_call.store(watch.len(), Ordering::SeqCst);
    }));

    assert!(active.is_empty());
    session.invoke(MethodCall::new("query")).await.unwrap();

    assert_eq!(observed.load(Ordering::SeqCst), 1);
    assert!(active.is_empty());
}

#[tokio::test]
async fn test_session_calls_feed_the_rate_counter() {
    let active = Arc::new(ActiveSessionRegistry::new());
    let rate = Arc::new(RequestRateCounter::new());
    let env = peridot::connection::SessionEnv::new(
        active,
        rate.clone(),
        Arc::new(peridot::core::transport::NoopExporter),
    );
    let factory = TestFactory::new();
    let client = RemoteClient::from_request(request("demo"));
    let session = RemoteConnectionSession::open_local(client, factory, env)
        .await
        .unwrap();

    for _ in 0..3 {
        session.invoke(MethodCall::new("query")).await.unwrap();
    }
    // Recorded but not folded into a rate until the next tick.
    assert_eq!(rate.requests_per_second(), 0);
}
