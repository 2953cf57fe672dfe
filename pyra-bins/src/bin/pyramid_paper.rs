//! Pyramid DCA - PAPER TRADING
//!
//! Runs one pyramid session end to end against the in-memory approval
//! queue and a drifting simulated market: waves are auto-approved and
//! filled at their target prices, the mark price walks down the ladder and
//! then rips upward until take profit fires.
//!
//! No exchange is touched; the session and its waves are persisted to the
//! configured SQLite store exactly as in production wiring.

use anyhow::Result;
use clap::Parser;
use pyra_bins::common::{init_logging, print_summary, CommonArgs};
use pyra_core::config::EngineConfig;
use pyra_core::core::{FillAction, FillEvent, SymbolFilters};
use pyra_core::data::{StaticExchangeInfo, StaticPrices};
use pyra_core::engine::{Hooks, SessionManager};
use pyra_core::execution::InMemoryGateway;
use pyra_core::storage::SqliteStore;
use pyra_core::strategy::SessionParams;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// CLI arguments for the pyramid paper-trading demo
#[derive(Parser, Debug)]
#[command(author, version, about = "Pyramid DCA Paper Trading")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Symbol to trade
    #[arg(long, default_value = "BTC")]
    symbol: String,

    /// Anchor price for wave 0
    #[arg(long, default_value = "50000")]
    entry_price: f64,

    /// Price decrease per wave, percent
    #[arg(long, default_value = "2.0")]
    distance_pct: f64,

    /// Maximum number of waves
    #[arg(long, default_value = "10")]
    max_waves: u32,

    /// Quote-currency fund reserved for the session
    #[arg(long, default_value = "1000")]
    isolated_fund: f64,

    /// Take profit percent above the average fill price
    #[arg(long, default_value = "3.0")]
    tp_pct: f64,

    /// Stop if no fill for this many minutes
    #[arg(long, default_value = "30")]
    timeout_x_min: f64,

    /// Minimum gap between fills before the timeout applies, minutes
    #[arg(long, default_value = "5")]
    gap_y_min: f64,

    /// How many waves to fill before the market turns upward
    #[arg(long, default_value = "3")]
    fills: u32,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.common);

    info!("=== Pyra: Pyramid DCA + PAPER TRADING ===");
    warn!("PAPER TRADING MODE - NO REAL ORDERS WILL BE PLACED");

    let config: EngineConfig = args.common.engine_config()?;
    if let Some(parent) = std::path::Path::new(&config.database_url).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let store = Arc::new(SqliteStore::open(&config.database_url)?);
    let gateway = Arc::new(InMemoryGateway::new());
    let exchange =
        Arc::new(StaticExchangeInfo::new().with_symbol(&args.symbol, SymbolFilters::conservative()));
    let prices = Arc::new(StaticPrices::new().with_price(&args.symbol, args.entry_price));

    let manager = Arc::new(SessionManager::new(
        store,
        gateway.clone(),
        exchange,
        prices.clone(),
        config,
    )?);
    let recovered = manager.recover()?;
    if recovered > 0 {
        info!("recovered {recovered} stored sessions");
    }
    let hooks = Hooks::new(manager.clone());

    let running = Arc::new(AtomicBool::new(true));
    let running_ctrlc = running.clone();
    ctrlc::set_handler(move || {
        warn!("received Ctrl+C, stopping paper loop");
        running_ctrlc.store(false, Ordering::SeqCst);
    })?;

    let created = manager.create_pyramid_session(SessionParams {
        symbol: args.symbol.clone(),
        entry_price: args.entry_price,
        distance_pct: args.distance_pct,
        max_waves: args.max_waves,
        isolated_fund: args.isolated_fund,
        tp_pct: args.tp_pct,
        timeout_x_min: args.timeout_x_min,
        gap_y_min: args.gap_y_min,
        created_by: Some("pyramid_paper".to_string()),
        note: Some("paper trading demo".to_string()),
    })?;
    let session_id = created.id;
    info!(
        "created session {session_id}: estimated cost for {} waves = {:.4}",
        args.max_waves,
        manager
            .session(session_id)?
            .lock()
            .estimate_total_cost(None)
    );

    manager.start(session_id)?;

    // Walk the ladder: approve and fill each queued wave at its target.
    let mut fills_done = 0u32;
    while running.load(Ordering::SeqCst) {
        let Some(queued) = gateway.pop() else {
            break;
        };
        hooks.on_order_approved(queued.pending_order_id, &queued.order.source_ref)?;

        // After the configured number of fills the market rips above TP.
        let market_price = if fills_done + 1 >= args.fills {
            let snapshot = manager
                .get(session_id)
                .ok_or_else(|| anyhow::anyhow!("session {session_id} vanished"))?;
            snapshot.estimated_tp_price * 1.01
        } else {
            queued.order.price
        };
        prices.set(&args.symbol, market_price);

        let outcome = hooks
            .on_fill(&FillEvent {
                pending_order_id: queued.pending_order_id,
                filled_qty: queued.order.quantity,
                filled_price: if queued.order.price > 0.0 {
                    queued.order.price
                } else {
                    market_price
                },
                source_ref: queued.order.source_ref.clone(),
                current_market_price: Some(market_price),
            })?
            .ok_or_else(|| anyhow::anyhow!("fill was not routed"))?;

        info!("outcome: {:?} - {}", outcome.action, outcome.message);
        fills_done += 1;

        if outcome.action == FillAction::Completed {
            break;
        }
    }

    if let Some(snapshot) = manager.get(session_id) {
        info!(
            "session {session_id} finished: status={}, waves_filled={}, avg={:.4}, pnl={:.4}",
            snapshot.status,
            snapshot.filled_waves_count,
            snapshot.avg_price,
            snapshot.unrealized_pnl
        );
        info!("{}", serde_json::to_string_pretty(&snapshot)?);
    }
    print_summary(&manager.get_summary());
    Ok(())
}
