// tests/session_throttle.rs
//
// Per-session admission: coalescing of automatic triggers onto a running
// crawl, the minimum-interval window, manual refresh supersede and session end.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use opportunity_engine::session::SessionRegistry;
use opportunity_engine::{Served, Trigger};

fn slow_board(delay: Duration) -> StubConnector {
    StubConnector::ok("board", vec![listing("board", "Go Intern", "Acme", &["go"], None)]).with_delay(delay)
}

#[tokio::test(start_paused = true)]
async fn concurrent_auto_triggers_share_one_crawl() {
    let c = slow_board(Duration::from_millis(500));
    let calls = c.counter();
    let engine = engine(vec![Arc::new(c)]);
    let session = engine.new_session("student@kec.edu");
    let catalog = catalog();
    let p = profile();

    let (a, b) = tokio::join!(
        engine.discover(&session, &p, &catalog, Trigger::Auto),
        engine.discover(&session, &p, &catalog, Trigger::Auto),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(calls.load(Ordering::SeqCst), 1, "second trigger must not start a crawl");
    assert_eq!(a.served, Served::Fresh);
    assert_eq!(b.served, Served::InFlight);
    assert_eq!(a.opportunities, b.opportunities);
    assert!(!session.is_crawling());
}

#[tokio::test]
async fn auto_trigger_inside_window_serves_last_result() {
    let c = slow_board(Duration::ZERO);
    let calls = c.counter();
    let engine = engine(vec![Arc::new(c)]);
    let session = engine.new_session("student@kec.edu");
    let catalog = catalog();
    let p = profile();

    let first = engine.discover(&session, &p, &catalog, Trigger::Auto).await.unwrap();
    let second = engine.discover(&session, &p, &catalog, Trigger::Auto).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.served, Served::Fresh);
    assert_eq!(second.served, Served::Cached);
    assert_eq!(first.opportunities, second.opportunities);
    assert_eq!(first.meta, second.meta);
}

#[tokio::test]
async fn manual_refresh_bypasses_the_window_and_restarts_it() {
    let c = slow_board(Duration::ZERO);
    let calls = c.counter();
    let engine = engine(vec![Arc::new(c)]);
    let session = engine.new_session("student@kec.edu");
    let catalog = catalog();
    let p = profile();

    engine.discover(&session, &p, &catalog, Trigger::Auto).await.unwrap();
    let manual = engine.discover(&session, &p, &catalog, Trigger::Manual).await.unwrap();
    assert_eq!(manual.served, Served::Fresh);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let auto = engine.discover(&session, &p, &catalog, Trigger::Auto).await.unwrap();
    assert_eq!(auto.served, Served::Cached, "manual refresh restarts the window");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn manual_refresh_cancels_running_crawl() {
    let c = slow_board(Duration::from_secs(10));
    let calls = c.counter();
    let engine = engine(vec![Arc::new(c)]);
    let session = engine.new_session("student@kec.edu");
    let catalog = Arc::new(catalog());
    let p = profile();

    let first = {
        let (engine, session, catalog, p) = (engine.clone(), session.clone(), catalog.clone(), p.clone());
        tokio::spawn(async move {
            engine
                .discover(&session, &p, catalog.as_ref(), Trigger::Auto)
                .await
        })
    };
    while calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }
    assert!(session.is_crawling());

    let second = engine
        .discover(&session, &p, catalog.as_ref(), Trigger::Manual)
        .await
        .unwrap();
    let first = first.await.expect("join").unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(second.served, Served::Fresh);
    assert_eq!(first.served, Served::InFlight, "superseded caller follows the replacement");
    assert_eq!(first.opportunities, second.opportunities);

    let last = session.last_result().expect("replacement result stored");
    assert_eq!(last.meta, second.meta);
}

#[tokio::test]
async fn session_end_reopens_the_window() {
    let c = slow_board(Duration::ZERO);
    let calls = c.counter();
    let engine = engine(vec![Arc::new(c)]);
    let session = engine.new_session("student@kec.edu");

    let first = engine
        .discover(&session, &profile(), &catalog(), Trigger::Auto)
        .await
        .unwrap();
    assert_eq!(first.served, Served::Fresh);
    session.end();
    assert!(session.last_result().is_none());

    let after_end = engine
        .discover(&session, &profile(), &catalog(), Trigger::Auto)
        .await
        .unwrap();
    assert_eq!(after_end.served, Served::Fresh);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn registry_ends_sessions_and_resets_state() {
    let c = slow_board(Duration::ZERO);
    let calls = c.counter();
    let engine = engine(vec![Arc::new(c)]);
    let registry: SessionRegistry = engine.new_registry();
    let catalog = catalog();
    let p = profile();

    let s = registry.start(&p.email);
    engine.discover(&s, &p, &catalog, Trigger::Auto).await.unwrap();
    assert!(s.last_result().is_some());

    assert!(registry.end(&p.email));
    assert!(s.last_result().is_none());
    assert!(registry.get(&p.email).is_none());

    let s2 = registry.start(&p.email);
    let d = engine.discover(&s2, &p, &catalog, Trigger::Auto).await.unwrap();
    assert_eq!(d.served, Served::Fresh);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn ending_the_session_mid_crawl_falls_back_to_curated() {
    let c = slow_board(Duration::from_secs(10));
    let calls = c.counter();
    let engine = engine(vec![Arc::new(c)]);
    let session = engine.new_session("student@kec.edu");
    let catalog = Arc::new(catalog());

    let waiter = {
        let (engine, session, catalog) = (engine.clone(), session.clone(), catalog.clone());
        tokio::spawn(async move {
            engine
                .discover(&session, &profile(), catalog.as_ref(), Trigger::Auto)
                .await
        })
    };
    while calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }
    session.end();

    let d = waiter.await.expect("join").unwrap();
    assert_eq!(d.served, Served::Cached);
    assert_eq!(d.opportunities.len(), 1);
    assert!(d.opportunities[0].is_curated());
    assert!(session.last_result().is_none(), "aborted crawl must not be stored");
}
