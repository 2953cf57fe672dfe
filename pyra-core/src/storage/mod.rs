//! Durable session store.
//!
//! The store is the durable shadow of the in-memory registry: sessions and
//! their waves, linked by foreign key and cascade-deleted together. Every
//! logical state change commits as one transaction so a crash never leaves
//! a half-written transition observable.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::core::{Result, SessionStatus};
use crate::strategy::pyramid::{AdjustRequest, Wave};
use chrono::{DateTime, Utc};

/// One stored session with its waves ordered by wave number.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: i64,
    pub symbol: String,
    pub entry_price: f64,
    pub distance_pct: f64,
    pub max_waves: u32,
    pub isolated_fund: f64,
    pub tp_pct: f64,
    pub timeout_x_min: f64,
    pub gap_y_min: f64,
    pub status: SessionStatus,
    pub current_wave: u32,
    pub avg_price: f64,
    pub total_filled_qty: f64,
    pub total_cost: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_fill_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub note: Option<String>,
    pub waves: Vec<Wave>,
}

/// Listing filter; all fields optional.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub status: Option<SessionStatus>,
    pub symbol: Option<String>,
    pub limit: Option<u32>,
}

/// Session-state columns updated together on every fill.
#[derive(Debug, Clone, Copy)]
pub struct StateDelta {
    pub current_wave: u32,
    pub avg_price: f64,
    pub total_filled_qty: f64,
    pub total_cost: f64,
    pub last_fill_at: Option<DateTime<Utc>>,
}

/// Everything one fill transition changed, persisted atomically:
/// the session state row, the filled wave, an optionally issued next wave,
/// and an optional status change (timeout stop or TP trigger).
#[derive(Debug, Clone)]
pub struct FillDelta {
    pub state: StateDelta,
    pub filled_wave_id: Option<i64>,
    pub filled_qty: f64,
    pub filled_price: f64,
    pub filled_at: Option<DateTime<Utc>>,
    pub new_wave: Option<Wave>,
    pub new_status: Option<SessionStatus>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub trait SessionStore: Send + Sync {
    // Session rows -----------------------------------------------------

    /// Insert a new session under its pre-allocated id.
    fn insert_session(&self, record: &SessionRecord) -> Result<()>;

    /// Update status; `started_at`/`completed_at` overwrite only when set.
    fn update_session_status(
        &self,
        session_id: i64,
        status: SessionStatus,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    fn update_session_state(&self, session_id: i64, state: &StateDelta) -> Result<()>;

    /// Persist the applied subset of an adjustment.
    fn update_session_params(&self, session_id: i64, applied: &AdjustRequest) -> Result<()>;

    /// Delete a session; its waves cascade.
    fn delete_session(&self, session_id: i64) -> Result<()>;

    // Wave rows --------------------------------------------------------

    fn insert_wave(&self, session_id: i64, wave: &Wave) -> Result<i64>;

    fn mark_wave_sent(
        &self,
        wave_id: i64,
        pending_order_id: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<()>;

    fn mark_wave_filled(
        &self,
        wave_id: i64,
        filled_qty: f64,
        filled_price: f64,
        filled_at: DateTime<Utc>,
    ) -> Result<()>;

    fn mark_wave_cancelled(&self, wave_id: i64) -> Result<()>;

    /// Locate a wave by the approval queue's handle. Returns
    /// `(session_id, wave)`.
    fn get_wave_by_pending_order_id(&self, pending_order_id: i64) -> Result<Option<(i64, Wave)>>;

    fn list_waves_for_session(&self, session_id: i64) -> Result<Vec<Wave>>;

    // Queries ----------------------------------------------------------

    fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<SessionRecord>>;

    /// Every stored session with waves, for recovery.
    fn load_all(&self) -> Result<Vec<SessionRecord>>;

    /// Largest stored session id, 0 when empty. Seeds the id counter.
    fn max_session_id(&self) -> Result<i64>;

    // Composite transactions -------------------------------------------

    /// One transaction: session goes ACTIVE and wave 0 is inserted PENDING.
    /// Returns the wave row id.
    fn record_session_started(
        &self,
        session_id: i64,
        started_at: DateTime<Utc>,
        wave: &Wave,
    ) -> Result<i64>;

    /// One transaction for a whole fill transition. Returns the row id of
    /// the newly issued wave, if any.
    fn record_fill(&self, session_id: i64, delta: &FillDelta) -> Result<Option<i64>>;
}
