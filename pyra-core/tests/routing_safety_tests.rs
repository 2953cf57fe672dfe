//! Routing safety: malformed or foreign references must never touch state.

use pyra_core::core::FillAction;
use pyra_core::testing::helpers::{btc_params, fill_event, world};

#[test]
fn test_malformed_refs_are_dropped_without_side_effects() {
    let w = world();
    let id = w.manager.create_pyramid_session(btc_params()).unwrap().id;
    w.manager.start(id).unwrap();
    let before = w.manager.get(id).unwrap();

    let refs = vec![
        "".to_string(),
        "manual order".to_string(),
        "pyramid:".to_string(),
        "pyramid:abc:wave:0".to_string(),
        format!("pyramid:{id}:wave:zero"),
        format!("pyramid:{id}:wave:0:extra"),
        format!("pyramid:{id}:unknown"),
    ];
    for raw in &refs {
        let outcome = w
            .hooks
            .on_fill(&fill_event(1, raw, 2e-5, 50_000.0, Some(50_000.0)))
            .unwrap();
        assert!(outcome.is_none(), "ref {raw:?} must be dropped");
    }

    let after = w.manager.get(id).unwrap();
    assert_eq!(after.total_filled_qty, before.total_filled_qty);
    assert_eq!(after.waves.len(), before.waves.len());
    assert_eq!(after.status, before.status);
}

#[test]
fn test_fill_for_unknown_session_is_dropped() {
    let w = world();
    let outcome = w
        .hooks
        .on_fill(&fill_event(
            1,
            "pyramid:404:wave:0",
            2e-5,
            50_000.0,
            Some(50_000.0),
        ))
        .unwrap();
    assert!(outcome.is_none());
}

#[test]
fn test_fill_for_unknown_wave_is_a_noop() {
    let w = world();
    let id = w.manager.create_pyramid_session(btc_params()).unwrap().id;
    w.manager.start(id).unwrap();

    let outcome = w
        .hooks
        .on_fill(&fill_event(
            1,
            &format!("pyramid:{id}:wave:7"),
            2e-5,
            48_000.0,
            Some(48_000.0),
        ))
        .unwrap()
        .unwrap();
    assert_eq!(outcome.action, FillAction::None);
    assert_eq!(w.manager.get(id).unwrap().total_filled_qty, 0.0);
}

#[test]
fn test_redelivered_fill_is_idempotent() {
    let w = world();
    let id = w.manager.create_pyramid_session(btc_params()).unwrap().id;
    w.manager.start(id).unwrap();
    let queued = w.gateway.pop().unwrap();
    let event = fill_event(
        queued.pending_order_id,
        &queued.order.source_ref,
        2e-5,
        50_000.0,
        Some(50_000.0),
    );

    let first = w.hooks.on_fill(&event).unwrap().unwrap();
    assert_eq!(first.action, FillAction::NextWave);
    let snap = w.manager.get(id).unwrap();

    let second = w.hooks.on_fill(&event).unwrap().unwrap();
    assert_eq!(second.action, FillAction::None);

    let after = w.manager.get(id).unwrap();
    assert_eq!(after.total_filled_qty, snap.total_filled_qty);
    assert_eq!(after.total_cost, snap.total_cost);
    assert_eq!(after.waves.len(), snap.waves.len());
    assert_eq!(w.gateway.len(), 1, "wave 1 queued exactly once");
}

#[test]
fn test_non_pyramid_sources_pass_through() {
    let w = world();
    // A manual or spreadsheet-driven order shares the event bus; the hook
    // must hand it back untouched.
    let outcome = w
        .hooks
        .on_fill(&fill_event(55, "excel:batch:9", 1.0, 100.0, None))
        .unwrap();
    assert!(outcome.is_none());
}
