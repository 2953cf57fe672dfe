//! Approval and rejection hooks.

use pyra_core::core::{SessionStatus, WaveStatus};
use pyra_core::testing::helpers::{btc_params, world};
use pyra_core::SessionStore;

#[test]
fn test_wave_rejection_stops_the_pyramid() {
    let w = world();
    let id = w.manager.create_pyramid_session(btc_params()).unwrap().id;
    let started = w.manager.start(id).unwrap();
    let poid = started.pending_order_id.unwrap();
    let queued = w.gateway.pop().unwrap();

    w.hooks
        .on_order_rejected(poid, &queued.order.source_ref)
        .unwrap();

    let snap = w.manager.get(id).unwrap();
    assert_eq!(snap.status, SessionStatus::Stopped);
    assert_eq!(snap.waves[0].status, WaveStatus::Cancelled);

    let stored = &w.store.load_all().unwrap()[0];
    assert_eq!(stored.status, SessionStatus::Stopped);
    assert_eq!(stored.waves[0].status, WaveStatus::Cancelled);
}

#[test]
fn test_rejection_of_foreign_order_is_ignored() {
    let w = world();
    let id = w.manager.create_pyramid_session(btc_params()).unwrap().id;
    w.manager.start(id).unwrap();

    w.hooks.on_order_rejected(999, "excel:batch:17").unwrap();
    w.hooks.on_order_rejected(999, "not a token").unwrap();

    assert_eq!(w.manager.get(id).unwrap().status, SessionStatus::Active);
}

#[test]
fn test_approval_is_idempotent_on_sent_wave() {
    let w = world();
    let id = w.manager.create_pyramid_session(btc_params()).unwrap().id;
    let started = w.manager.start(id).unwrap();
    let poid = started.pending_order_id.unwrap();
    let queued = w.gateway.pop().unwrap();

    // The queue-acknowledge path already marked the wave SENT; the human
    // approval arriving later changes nothing.
    let before = w.manager.get(id).unwrap();
    w.hooks
        .on_order_approved(poid, &queued.order.source_ref)
        .unwrap();
    let after = w.manager.get(id).unwrap();

    assert_eq!(before.waves[0].status, WaveStatus::Sent);
    assert_eq!(after.waves[0].status, WaveStatus::Sent);
    assert_eq!(
        before.waves[0].pending_order_id,
        after.waves[0].pending_order_id
    );
}

#[test]
fn test_approval_for_foreign_order_is_ignored() {
    let w = world();
    w.hooks.on_order_approved(1, "excel:batch:17").unwrap();
    w.hooks.on_order_approved(1, "pyramid:zzz").unwrap();
}
