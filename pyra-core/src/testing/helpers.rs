//! Builders for fully wired test worlds: in-memory store, static oracles,
//! and a bounded in-memory approval queue.

use crate::config::EngineConfig;
use crate::core::{FillEvent, SymbolFilters};
use crate::data::{StaticExchangeInfo, StaticPrices};
use crate::engine::{Hooks, SessionManager};
use crate::execution::InMemoryGateway;
use crate::storage::SqliteStore;
use crate::strategy::pyramid::SessionParams;
use std::sync::Arc;

/// Everything a scenario test needs, with shared handles to every seam.
pub struct TestWorld {
    pub manager: Arc<SessionManager>,
    pub hooks: Hooks,
    pub gateway: Arc<InMemoryGateway>,
    pub prices: Arc<StaticPrices>,
    pub exchange: Arc<StaticExchangeInfo>,
    pub store: Arc<SqliteStore>,
}

/// Build a world over an in-memory store with BTC and ETH configured.
pub fn world() -> TestWorld {
    let store = Arc::new(SqliteStore::open_in_memory().expect("in-memory store"));
    world_with_store(store)
}

/// Build a world over a given store (used by recovery tests that reopen a
/// database file across "restarts").
pub fn world_with_store(store: Arc<SqliteStore>) -> TestWorld {
    let gateway = Arc::new(InMemoryGateway::new());
    let exchange = Arc::new(
        StaticExchangeInfo::new()
            .with_symbol("BTC", SymbolFilters::conservative())
            .with_symbol(
                "ETH",
                SymbolFilters {
                    min_qty: 1e-4,
                    step_size: 1e-4,
                    max_qty: 1e5,
                },
            ),
    );
    let prices = Arc::new(StaticPrices::new());

    let manager = Arc::new(
        SessionManager::new(
            store.clone(),
            gateway.clone(),
            exchange.clone(),
            prices.clone(),
            EngineConfig::default(),
        )
        .expect("manager"),
    );
    let hooks = Hooks::new(manager.clone());

    TestWorld {
        manager,
        hooks,
        gateway,
        prices,
        exchange,
        store,
    }
}

/// The reference BTC session parameters used across scenario tests.
pub fn btc_params() -> SessionParams {
    SessionParams {
        symbol: "BTC".to_string(),
        entry_price: 50_000.0,
        distance_pct: 2.0,
        max_waves: 10,
        isolated_fund: 1_000.0,
        tp_pct: 3.0,
        timeout_x_min: 30.0,
        gap_y_min: 5.0,
        created_by: Some("tests".to_string()),
        note: None,
    }
}

/// Fill notification for a queued order.
pub fn fill_event(
    pending_order_id: i64,
    source_ref: &str,
    filled_qty: f64,
    filled_price: f64,
    market_price: Option<f64>,
) -> FillEvent {
    FillEvent {
        pending_order_id,
        filled_qty,
        filled_price,
        source_ref: source_ref.to_string(),
        current_market_price: market_price,
    }
}
