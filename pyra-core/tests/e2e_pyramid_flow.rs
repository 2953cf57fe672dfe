//! End-to-end pyramid flow over the full stack: manager, store, gateway,
//! router, and hooks.
//!
//! These tests drive the engine the way the platform does: start a session,
//! pop the queued order from the approval queue, deliver a fill event for
//! it, and follow whatever the engine queues next.

use approx::assert_relative_eq;
use pyra_core::core::{FillAction, OrderType, SessionStatus, Side, WaveStatus};
use pyra_core::testing::helpers::{btc_params, fill_event, world};
use pyra_core::SessionStore;

#[test]
fn test_happy_path_to_take_profit() {
    let w = world();
    let created = w.manager.create_pyramid_session(btc_params()).unwrap();
    let id = created.id;
    assert_eq!(created.status, SessionStatus::Pending);

    // Start queues wave 0.
    let started = w.manager.start(id).unwrap();
    let wave0_poid = started.pending_order_id.unwrap();
    let queued = w.gateway.pop().unwrap();
    assert_eq!(queued.pending_order_id, wave0_poid);
    assert_eq!(queued.order.source_ref, format!("pyramid:{id}:wave:0"));
    assert_eq!(queued.order.side, Side::Buy);
    assert_eq!(queued.order.order_type, OrderType::Limit);

    // Wave 0 fills at the anchor; market is flat, so wave 1 is queued.
    let outcome = w
        .hooks
        .on_fill(&fill_event(
            wave0_poid,
            &queued.order.source_ref,
            2e-5,
            50_000.0,
            Some(50_000.0),
        ))
        .unwrap()
        .unwrap();
    assert_eq!(outcome.action, FillAction::NextWave);
    let wave1_poid = outcome.pending_order_id.unwrap();
    let queued = w.gateway.pop().unwrap();
    assert_eq!(queued.order.source_ref, format!("pyramid:{id}:wave:1"));
    assert_eq!(queued.order.price, 49_000.0);

    // Wave 1 fills while the market rips: TP triggers.
    let outcome = w
        .hooks
        .on_fill(&fill_event(
            wave1_poid,
            &queued.order.source_ref,
            4e-5,
            49_000.0,
            Some(52_000.0),
        ))
        .unwrap()
        .unwrap();
    assert_eq!(outcome.action, FillAction::TpTriggered);

    let snap = w.manager.get(id).unwrap();
    assert_eq!(snap.status, SessionStatus::TpTriggered);
    assert_relative_eq!(snap.avg_price, 49_333.333333, max_relative = 1e-6);
    assert_relative_eq!(snap.total_filled_qty, 6e-5, max_relative = 1e-9);

    // The TP order is a market sell of the whole position.
    let tp = w.gateway.pop().unwrap();
    assert_eq!(tp.order.side, Side::Sell);
    assert_eq!(tp.order.order_type, OrderType::Market);
    assert_eq!(tp.order.price, 0.0);
    assert_relative_eq!(tp.order.quantity, 6e-5, max_relative = 1e-9);
    assert_eq!(tp.order.source_ref, format!("pyramid:{id}:tp"));

    // TP fill completes the session.
    let outcome = w
        .hooks
        .on_fill(&fill_event(
            tp.pending_order_id,
            &tp.order.source_ref,
            6e-5,
            52_000.0,
            None,
        ))
        .unwrap()
        .unwrap();
    assert_eq!(outcome.action, FillAction::Completed);
    let snap = w.manager.get(id).unwrap();
    assert_eq!(snap.status, SessionStatus::Completed);
    assert!(snap.completed_at.is_some());

    // Durable rows agree.
    let stored = w.store.load_all().unwrap();
    assert_eq!(stored[0].status, SessionStatus::Completed);
    assert_eq!(stored[0].waves.len(), 2);
    assert!(stored[0]
        .waves
        .iter()
        .all(|wave| wave.status == WaveStatus::Filled));
}

#[test]
fn test_insufficient_fund_truncates_the_ladder() {
    let w = world();
    let mut params = btc_params();
    params.entry_price = 1_000.0;
    params.isolated_fund = 0.025; // wave 0 costs 0.02, wave 1 would cost 0.0392
    let id = w.manager.create_pyramid_session(params).unwrap().id;

    w.manager.start(id).unwrap();
    let queued = w.gateway.pop().unwrap();

    let outcome = w
        .hooks
        .on_fill(&fill_event(
            queued.pending_order_id,
            &queued.order.source_ref,
            2e-5,
            1_000.0,
            Some(1_000.0),
        ))
        .unwrap()
        .unwrap();

    assert_eq!(outcome.action, FillAction::None);
    assert!(outcome.message.contains("Insufficient fund for wave 1"));

    let snap = w.manager.get(id).unwrap();
    assert_eq!(snap.status, SessionStatus::Active);
    assert_eq!(snap.waves.len(), 1);
    assert!(w.gateway.is_empty(), "no wave 1 was queued");
}

#[test]
fn test_start_refused_without_fund_for_wave_zero() {
    let w = world();
    let mut params = btc_params();
    params.isolated_fund = 0.5; // wave 0 costs 1.0
    let id = w.manager.create_pyramid_session(params).unwrap().id;

    let outcome = w.manager.start(id).unwrap();
    assert_eq!(outcome.action, FillAction::None);
    assert!(w.gateway.is_empty());
    assert_eq!(w.manager.get(id).unwrap().status, SessionStatus::Pending);
}

#[test]
fn test_tp_fires_even_after_wave_cap() {
    let w = world();
    let mut params = btc_params();
    params.max_waves = 1;
    let id = w.manager.create_pyramid_session(params).unwrap().id;

    w.manager.start(id).unwrap();
    let queued = w.gateway.pop().unwrap();

    // Last allowed wave fills; market flat, nothing more to queue.
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
    assert!(outcome.message.contains("All 1 waves sent"));

    // The cap does not gate TP: a later mark above threshold still exits.
    let shared = w.manager.session(id).unwrap();
    let outcome = shared.lock().check_tp(52_000.0).unwrap();
    assert_eq!(outcome.action, FillAction::TpTriggered);
    assert_eq!(
        w.manager.get(id).unwrap().status,
        SessionStatus::TpTriggered
    );
}

#[test]
fn test_fill_without_mark_price_queries_the_oracle() {
    let w = world();
    let id = w.manager.create_pyramid_session(btc_params()).unwrap().id;
    w.manager.start(id).unwrap();
    let queued = w.gateway.pop().unwrap();

    // No price published yet: the oracle answers 0 and TP stays quiet.
    let outcome = w
        .hooks
        .on_fill(&fill_event(
            queued.pending_order_id,
            &queued.order.source_ref,
            2e-5,
            50_000.0,
            None,
        ))
        .unwrap()
        .unwrap();
    assert_eq!(outcome.action, FillAction::NextWave);
    assert_eq!(w.manager.get(id).unwrap().status, SessionStatus::Active);

    // With a published mark above threshold the next oracle-priced fill
    // triggers TP.
    w.prices.set("BTC", 52_000.0);
    let queued = w.gateway.pop().unwrap();
    let outcome = w
        .hooks
        .on_fill(&fill_event(
            queued.pending_order_id,
            &queued.order.source_ref,
            4e-5,
            49_000.0,
            None,
        ))
        .unwrap()
        .unwrap();
    assert_eq!(outcome.action, FillAction::TpTriggered);
}

#[test]
fn test_summary_counts_and_funds() {
    let w = world();
    w.prices.set("BTC", 51_000.0);

    let a = w.manager.create_pyramid_session(btc_params()).unwrap().id;
    let b = w.manager.create_pyramid_session(btc_params()).unwrap().id;
    w.manager.start(a).unwrap();
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

    let summary = w.manager.get_summary();
    assert_eq!(summary.total_sessions, 2);
    assert_eq!(summary.active_sessions, 1);
    assert_eq!(summary.pending_sessions, 1);
    assert_relative_eq!(summary.total_isolated_fund, 1_000.0, max_relative = 1e-9);
    assert_relative_eq!(summary.total_used_fund, 1.0, max_relative = 1e-9);
    // 2e-5 qty * 51000 mark - 1.0 cost
    assert_relative_eq!(summary.total_unrealized_pnl, 0.02, max_relative = 1e-6);

    // Stop both; clear_completed removes only terminal entries.
    w.manager.stop(a, "test").unwrap();
    assert_eq!(w.manager.clear_completed(), 1);
    assert!(w.manager.get(a).is_none());
    assert!(w.manager.get(b).is_some());
    // The durable record survives clearing.
    assert_eq!(w.store.load_all().unwrap().len(), 2);
}

#[test]
fn test_list_is_newest_first_and_filtered() {
    let w = world();
    let a = w.manager.create_pyramid_session(btc_params()).unwrap().id;
    let mut params = btc_params();
    params.symbol = "ETH".to_string();
    params.entry_price = 3_000.0;
    let b = w.manager.create_pyramid_session(params).unwrap().id;

    let all = w.manager.list(None, None);
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, b, "newest first");
    assert_eq!(all[1].id, a);

    let eth = w.manager.list(None, Some("ETH"));
    assert_eq!(eth.len(), 1);
    assert_eq!(eth[0].id, b);

    w.manager.start(a).unwrap();
    let active = w.manager.list(Some(SessionStatus::Active), None);
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, a);
}
