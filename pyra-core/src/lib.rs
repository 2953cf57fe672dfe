//! Pyra Core - Pyramid DCA Session Engine
//!
//! Pyra manages long-lived pyramid DCA sessions inside a paper-trading
//! platform: each session places a ladder of buy waves at geometrically
//! decreasing prices below an anchor, averages down the position as waves
//! fill, and exits with a market sell once the mark price clears the
//! average fill price by a configured take-profit percentage.
//!
//! ## Architecture
//!
//! ```text
//!  fill / approval / rejection events
//!              │
//!              ▼
//!        ┌──────────┐     ┌────────────────┐
//!        │  Hooks   │────▶│ SessionManager │──── registry of
//!        └──────────┘     └───────┬────────┘     Arc<Mutex<PyramidSession>>
//!              │                  │
//!        ┌──────────┐      ┌──────┴───────┐
//!        │FillRouter│      │ SessionStore │ (SQLite, crash-safe recovery)
//!        └──────────┘      └──────────────┘
//!                                 │
//!                    ┌────────────┴──────────┐
//!                    │ PendingOrderGateway   │ (human approval queue)
//!                    └───────────────────────┘
//! ```
//!
//! ## Core Modules
//! - `core`: shared types (statuses, order descriptors, routing tokens) and errors
//! - `config`: process-wide knobs (pip multiplier, store url, oracle fallbacks)
//! - `data`: exchange-info and market-price oracle seams
//! - `strategy`: pure wave math and the `PyramidSession` state machine
//! - `engine`: `SessionManager`, `FillRouter`, and the inbound hook layer
//! - `execution`: the pending-order gateway seam
//! - `storage`: the durable session store and restart recovery

pub mod config;
pub mod core;
pub mod data;
pub mod engine;
pub mod execution;
pub mod storage;
pub mod strategy;

// Test support (builders shared by unit and integration tests)
pub mod testing;

// Re-export the surface most callers need
pub use config::EngineConfig;
pub use core::{
    EngineError, FillAction, FillEvent, FillOutcome, OrderRequest, OrderSlot, OrderType, Result,
    SessionStatus, Side, SourceRef, SymbolFilters, WaveStatus,
};
pub use data::{ExchangeInfoOracle, MarketPriceOracle};
pub use engine::{Hooks, ManagerSummary, SessionManager};
pub use execution::{InMemoryGateway, PendingOrderGateway};
pub use storage::{SessionStore, SqliteStore};
pub use strategy::{AdjustRequest, PyramidSession, SessionParams, SessionSnapshot, Wave};
