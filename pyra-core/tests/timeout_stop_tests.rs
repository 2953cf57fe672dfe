//! Timeout behaviour: the two-condition predicate and the idle sweeper.

use chrono::{Duration, Utc};
use pyra_core::core::{FillAction, SessionStatus};
use pyra_core::testing::helpers::{btc_params, fill_event, world};
use pyra_core::SessionStore;

#[test]
fn test_sweeper_stops_session_idle_past_deadline() {
    let w = world();
    let id = w.manager.create_pyramid_session(btc_params()).unwrap().id;
    w.manager.start(id).unwrap();
    let queued = w.gateway.pop().unwrap();
    w.hooks
        .on_fill(&fill_event(
            queued.pending_order_id,
            &queued.order.source_ref,
            2e-5,
            50_000.0,
            Some(50_000.0),
        ))
        .unwrap();
    let _ = w.gateway.pop();

    // Fresh fill: nothing to sweep.
    assert!(w.manager.sweep_timeouts().is_empty());

    // Single filled wave, 35 minutes of silence: timeout applies.
    {
        let shared = w.manager.session(id).unwrap();
        shared.lock().last_fill_at = Some(Utc::now() - Duration::minutes(35));
    }
    let stopped = w.manager.sweep_timeouts();
    assert_eq!(stopped, vec![id]);

    let snap = w.manager.get(id).unwrap();
    assert_eq!(snap.status, SessionStatus::Stopped);
    assert!(w.gateway.is_empty(), "timeout emits no order");

    // Durable record caught the stop.
    let stored = &w.store.load_all().unwrap()[0];
    assert_eq!(stored.status, SessionStatus::Stopped);
    assert!(stored.completed_at.is_some());

    // Sweeping again finds nothing.
    assert!(w.manager.sweep_timeouts().is_empty());
}

#[test]
fn test_idle_session_with_no_fills_times_out_from_start() {
    let w = world();
    let id = w.manager.create_pyramid_session(btc_params()).unwrap().id;
    w.manager.start(id).unwrap();
    let _ = w.gateway.pop();

    {
        let shared = w.manager.session(id).unwrap();
        shared.lock().started_at = Some(Utc::now() - Duration::minutes(35));
    }
    assert_eq!(w.manager.sweep_timeouts(), vec![id]);
    assert_eq!(w.manager.get(id).unwrap().status, SessionStatus::Stopped);
}

#[test]
fn test_wide_fill_gap_waives_the_timeout() {
    let w = world();
    let id = w.manager.create_pyramid_session(btc_params()).unwrap().id;
    w.manager.start(id).unwrap();
    let queued = w.gateway.pop().unwrap();
    w.hooks
        .on_fill(&fill_event(
            queued.pending_order_id,
            &queued.order.source_ref,
            2e-5,
            50_000.0,
            Some(50_000.0),
        ))
        .unwrap();
    let queued = w.gateway.pop().unwrap();
    w.hooks
        .on_fill(&fill_event(
            queued.pending_order_id,
            &queued.order.source_ref,
            4e-5,
            49_000.0,
            Some(49_000.0),
        ))
        .unwrap();
    let _ = w.gateway.pop();

    let now = Utc::now();
    {
        let shared = w.manager.session(id).unwrap();
        let mut session = shared.lock();
        session.last_fill_at = Some(now - Duration::minutes(35));
        // Fills came 10 minutes apart (>= gap_y_min of 5): the ladder was
        // filling at a healthy pace, let it ride.
        session.waves[0].filled_at = Some(now - Duration::minutes(45));
        session.waves[1].filled_at = Some(now - Duration::minutes(35));
    }
    assert!(w.manager.sweep_timeouts().is_empty());
    assert_eq!(w.manager.get(id).unwrap().status, SessionStatus::Active);

    // Rapid-fire fills then silence: stop.
    {
        let shared = w.manager.session(id).unwrap();
        let mut session = shared.lock();
        session.waves[0].filled_at = Some(now - Duration::minutes(37));
        session.waves[1].filled_at = Some(now - Duration::minutes(35));
    }
    assert_eq!(w.manager.sweep_timeouts(), vec![id]);
}

#[test]
fn test_fill_after_stop_is_ignored() {
    let w = world();
    let id = w.manager.create_pyramid_session(btc_params()).unwrap().id;
    w.manager.start(id).unwrap();
    let queued = w.gateway.pop().unwrap();

    {
        let shared = w.manager.session(id).unwrap();
        shared.lock().started_at = Some(Utc::now() - Duration::minutes(35));
    }
    w.manager.sweep_timeouts();

    // The wave-0 fill arrives late; the stopped session ignores it.
    let outcome = w
        .hooks
        .on_fill(&fill_event(
            queued.pending_order_id,
            &queued.order.source_ref,
            2e-5,
            50_000.0,
            Some(50_000.0),
        ))
        .unwrap()
        .unwrap();
    assert_eq!(outcome.action, FillAction::None);
    let snap = w.manager.get(id).unwrap();
    assert_eq!(snap.total_filled_qty, 0.0);
    assert_eq!(snap.status, SessionStatus::Stopped);
}
