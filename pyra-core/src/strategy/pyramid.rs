//! Pyramid DCA session state machine.
//!
//! A session places a ladder of buy waves below an anchor price, each wave
//! one pip larger and `distance_pct` percent cheaper than the last, and
//! exits with a market sell once the mark price clears the running average
//! fill price by `tp_pct` percent.
//!
//! # State diagram
//!
//! ```text
//!  pending --start()--> active --check_tp--> tp_triggered --tp fill--> completed
//!     |                   |
//!     |                   +--timeout / stop / rejection--> stopped
//!     +------stop()-----> stopped
//! ```
//!
//! Status is a plain enum; every transition method enforces its own guards,
//! so an invalid transition is a no-op outcome or an explicit error, never a
//! corrupted session. All mutation of one session is expected to happen
//! under its manager-held lock; this type itself is single-threaded state.

use crate::core::{
    EngineError, FillAction, FillOutcome, OrderRequest, OrderType, Result, SessionStatus, Side,
    SourceRef, SymbolFilters, WaveStatus, ORDER_SOURCE,
};
use crate::strategy::wave_math::{WaveMath, WaveQuote};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ============================================================================
// Parameters
// ============================================================================

/// Construction parameters for a pyramid session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionParams {
    pub symbol: String,
    /// Anchor price for wave 0.
    pub entry_price: f64,
    /// Per-wave price decrease, percent.
    pub distance_pct: f64,
    pub max_waves: u32,
    /// Quote-currency budget reserved for this session.
    pub isolated_fund: f64,
    /// Take-profit percent above the running average fill price.
    pub tp_pct: f64,
    /// Stop if no fill for this many minutes.
    pub timeout_x_min: f64,
    /// Minimum gap between fills before the timeout applies.
    pub gap_y_min: f64,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl SessionParams {
    pub fn validate(&self) -> Result<()> {
        fn invalid(field: &'static str, reason: String) -> EngineError {
            EngineError::InvalidParameter { field, reason }
        }

        if self.symbol.is_empty() {
            return Err(invalid("symbol", "symbol is required".into()));
        }
        if !(self.entry_price > 0.0) {
            return Err(invalid(
                "entry_price",
                format!("must be positive: {}", self.entry_price),
            ));
        }
        if !(self.distance_pct > 0.0 && self.distance_pct < 100.0) {
            return Err(invalid(
                "distance_pct",
                format!("must be between 0 and 100: {}", self.distance_pct),
            ));
        }
        if self.max_waves < 1 {
            return Err(invalid(
                "max_waves",
                format!("must be at least 1: {}", self.max_waves),
            ));
        }
        if !(self.isolated_fund > 0.0) {
            return Err(invalid(
                "isolated_fund",
                format!("must be positive: {}", self.isolated_fund),
            ));
        }
        if !(self.tp_pct > 0.0) {
            return Err(invalid(
                "tp_pct",
                format!("must be positive: {}", self.tp_pct),
            ));
        }
        if !(self.timeout_x_min > 0.0) {
            return Err(invalid(
                "timeout_x_min",
                format!("must be positive: {}", self.timeout_x_min),
            ));
        }
        if !(self.gap_y_min >= 0.0) {
            return Err(invalid(
                "gap_y_min",
                format!("must be non-negative: {}", self.gap_y_min),
            ));
        }
        Ok(())
    }
}

/// The adjustable subset of session parameters, kept as an immutable copy of
/// the values the session was created with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdjustableParams {
    pub max_waves: u32,
    pub isolated_fund: f64,
    pub tp_pct: f64,
    pub distance_pct: f64,
    pub timeout_x_min: f64,
    pub gap_y_min: f64,
}

/// Live-adjustment request. Absent fields are untouched; invalid fields are
/// dropped with a warning. The same shape is returned carrying exactly the
/// fields that were applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AdjustRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_waves: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolated_fund: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tp_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_x_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap_y_min: Option<f64>,
}

impl AdjustRequest {
    pub fn is_empty(&self) -> bool {
        self.max_waves.is_none()
            && self.isolated_fund.is_none()
            && self.tp_pct.is_none()
            && self.distance_pct.is_none()
            && self.timeout_x_min.is_none()
            && self.gap_y_min.is_none()
    }
}

// ============================================================================
// Wave
// ============================================================================

/// One scheduled buy order within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wave {
    /// Durable row id, set once the wave is persisted.
    pub id: Option<i64>,
    pub wave_num: u32,
    pub quantity: f64,
    pub target_price: f64,
    pub status: WaveStatus,
    pub filled_qty: Option<f64>,
    pub filled_price: Option<f64>,
    pub filled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Handle returned by the pending-order queue once acknowledged.
    pub pending_order_id: Option<i64>,
}

impl Wave {
    pub fn from_quote(quote: WaveQuote, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            wave_num: quote.wave_num,
            quantity: quote.quantity,
            target_price: quote.price,
            status: WaveStatus::Pending,
            filled_qty: None,
            filled_price: None,
            filled_at: None,
            sent_at: None,
            created_at: now,
            pending_order_id: None,
        }
    }

    /// Quote-currency cost if this wave fills at target.
    pub fn cost(&self) -> f64 {
        self.quantity * self.target_price
    }

    pub fn mark_sent(&mut self, pending_order_id: i64, now: DateTime<Utc>) {
        self.status = WaveStatus::Sent;
        self.sent_at = Some(now);
        self.pending_order_id = Some(pending_order_id);
    }

    pub fn mark_filled(&mut self, filled_qty: f64, filled_price: f64, now: DateTime<Utc>) {
        self.status = WaveStatus::Filled;
        self.filled_qty = Some(filled_qty);
        self.filled_price = Some(filled_price);
        self.filled_at = Some(now);
    }

    pub fn mark_cancelled(&mut self) {
        self.status = WaveStatus::Cancelled;
    }
}

// ============================================================================
// Session
// ============================================================================

/// A single pyramid DCA session.
#[derive(Debug, Clone)]
pub struct PyramidSession {
    pub id: i64,
    pub symbol: String,
    pub entry_price: f64,

    // Adjustable parameters (mutable while the session is live).
    pub distance_pct: f64,
    pub max_waves: u32,
    pub isolated_fund: f64,
    pub tp_pct: f64,
    pub timeout_x_min: f64,
    pub gap_y_min: f64,
    /// Copy of the adjustable parameters at construction, for audit.
    pub initial_params: AdjustableParams,

    pub status: SessionStatus,
    /// Largest wave number issued so far.
    pub current_wave: u32,
    pub waves: Vec<Wave>,

    // Running totals over filled waves.
    pub avg_price: f64,
    pub total_filled_qty: f64,
    pub total_cost: f64,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_fill_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub created_by: Option<String>,
    pub note: Option<String>,

    // Exchange constraints resolved at construction.
    pub filters: SymbolFilters,
    pub pip_multiplier: f64,
}

impl PyramidSession {
    /// Build a new PENDING session. Parameters are validated here; the
    /// filters come from the exchange-info oracle (or its fallback).
    pub fn new(
        id: i64,
        params: SessionParams,
        filters: SymbolFilters,
        pip_multiplier: f64,
    ) -> Result<Self> {
        params.validate()?;
        let initial = AdjustableParams {
            max_waves: params.max_waves,
            isolated_fund: params.isolated_fund,
            tp_pct: params.tp_pct,
            distance_pct: params.distance_pct,
            timeout_x_min: params.timeout_x_min,
            gap_y_min: params.gap_y_min,
        };
        Ok(Self {
            id,
            symbol: params.symbol,
            entry_price: params.entry_price,
            distance_pct: params.distance_pct,
            max_waves: params.max_waves,
            isolated_fund: params.isolated_fund,
            tp_pct: params.tp_pct,
            timeout_x_min: params.timeout_x_min,
            gap_y_min: params.gap_y_min,
            initial_params: initial,
            status: SessionStatus::Pending,
            current_wave: 0,
            waves: Vec::new(),
            avg_price: 0.0,
            total_filled_qty: 0.0,
            total_cost: 0.0,
            created_at: Utc::now(),
            started_at: None,
            last_fill_at: None,
            completed_at: None,
            created_by: params.created_by,
            note: params.note,
            filters,
            pip_multiplier,
        })
    }

    // ------------------------------------------------------------------
    // Derived values
    // ------------------------------------------------------------------

    /// Wave calculator for the current parameters. Rebuilt per use so a
    /// `distance_pct` adjustment only affects waves not yet generated.
    pub fn math(&self) -> WaveMath {
        WaveMath::new(
            self.entry_price,
            self.distance_pct,
            self.pip_multiplier,
            &self.filters,
        )
    }

    pub fn pip_size(&self) -> f64 {
        self.math().pip_size()
    }

    /// Take-profit price for the current position, or for the anchor price
    /// before anything filled.
    pub fn estimated_tp_price(&self) -> f64 {
        if self.avg_price > 0.0 {
            self.avg_price * (1.0 + self.tp_pct / 100.0)
        } else {
            self.entry_price * (1.0 + self.tp_pct / 100.0)
        }
    }

    pub fn used_fund(&self) -> f64 {
        self.total_cost
    }

    pub fn remaining_fund(&self) -> f64 {
        (self.isolated_fund - self.total_cost).max(0.0)
    }

    /// Estimated cost of the first `num_waves` waves (default all), for
    /// fund planning before starting.
    pub fn estimate_total_cost(&self, num_waves: Option<u32>) -> f64 {
        self.math()
            .estimate_total_cost(num_waves.unwrap_or(self.max_waves))
    }

    pub fn wave(&self, wave_num: u32) -> Option<&Wave> {
        self.waves.iter().find(|w| w.wave_num == wave_num)
    }

    pub fn wave_mut(&mut self, wave_num: u32) -> Option<&mut Wave> {
        self.waves.iter_mut().find(|w| w.wave_num == wave_num)
    }

    pub fn filled_wave_count(&self) -> usize {
        self.waves
            .iter()
            .filter(|w| w.status == WaveStatus::Filled)
            .count()
    }

    fn strategy_name(&self) -> String {
        format!("Pyramid_{}", self.symbol)
    }

    /// Limit-buy descriptor for a generated wave.
    pub fn wave_order(&self, wave: &Wave) -> OrderRequest {
        OrderRequest {
            symbol: self.symbol.clone(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            quantity: wave.quantity,
            price: wave.target_price,
            source: ORDER_SOURCE.to_string(),
            source_ref: SourceRef::wave(self.id, wave.wave_num).to_string(),
            strategy_name: self.strategy_name(),
            note: format!("Pyramid wave {}/{}", wave.wave_num, self.max_waves),
        }
    }

    /// Market-sell descriptor closing the whole position.
    pub fn tp_order(&self) -> OrderRequest {
        OrderRequest {
            symbol: self.symbol.clone(),
            side: Side::Sell,
            order_type: OrderType::Market,
            quantity: self.total_filled_qty,
            price: 0.0,
            source: ORDER_SOURCE.to_string(),
            source_ref: SourceRef::take_profit(self.id).to_string(),
            strategy_name: self.strategy_name(),
            note: format!(
                "Pyramid TP: sell {} @ market (avg={:.4})",
                self.total_filled_qty, self.avg_price
            ),
        }
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Start the session: generate wave 0 and return its order descriptor.
    ///
    /// Returns `Ok(None)` without any state change when the isolated fund
    /// cannot cover wave 0.
    pub fn start(&mut self) -> Result<Option<OrderRequest>> {
        if self.status != SessionStatus::Pending {
            warn!(
                "session {} already started (status {})",
                self.id, self.status
            );
            return Err(EngineError::AlreadyStarted {
                session_id: self.id,
                status: self.status,
            });
        }

        let quote = self.math().quote(0)?;
        if quote.cost() > self.isolated_fund {
            warn!(
                "insufficient fund for wave 0: need {:.4}, have {:.4}",
                quote.cost(),
                self.isolated_fund
            );
            return Ok(None);
        }

        let now = Utc::now();
        self.started_at = Some(now);
        self.status = SessionStatus::Active;
        self.current_wave = 0;

        let wave = Wave::from_quote(quote, now);
        let order = self.wave_order(&wave);
        self.waves.push(wave);

        info!(
            "starting pyramid session {}: {} @ {}, waves=0/{}, fund={}",
            self.id, self.symbol, self.entry_price, self.max_waves, self.isolated_fund
        );
        Ok(Some(order))
    }

    /// Process a wave fill.
    ///
    /// Updates the wave and the running totals, then evaluates take-profit,
    /// timeout, and next-wave admission in that order. A fill for a wave
    /// already FILLED is a no-op, so redelivered fill events never
    /// double-count.
    pub fn on_fill(
        &mut self,
        wave_num: u32,
        filled_qty: f64,
        filled_price: f64,
        market_price: f64,
    ) -> FillOutcome {
        if self.status != SessionStatus::Active {
            return FillOutcome::none(format!("Session not active: {}", self.status));
        }

        let Some(idx) = self.waves.iter().position(|w| w.wave_num == wave_num) else {
            return FillOutcome::none(format!("Wave {wave_num} not found"));
        };
        if self.waves[idx].status == WaveStatus::Filled {
            debug!(
                "duplicate fill for session {} wave {} ignored",
                self.id, wave_num
            );
            return FillOutcome::none(format!("Wave {wave_num} already filled"));
        }

        let now = Utc::now();
        self.waves[idx].mark_filled(filled_qty, filled_price, now);

        self.total_filled_qty += filled_qty;
        self.total_cost += filled_qty * filled_price;
        if self.total_filled_qty > 0.0 {
            self.avg_price = self.total_cost / self.total_filled_qty;
        }
        self.last_fill_at = Some(now);

        info!(
            "pyramid {} wave {} filled: {} @ {}, avg={:.4}",
            self.id, wave_num, filled_qty, filled_price, self.avg_price
        );

        if let Some(outcome) = self.check_tp(market_price) {
            return outcome;
        }

        if self.timeout_due(now) {
            self.enter_stopped(now);
            return FillOutcome::plain(
                FillAction::Stopped,
                format!(
                    "Session stopped: timeout ({} min without fill)",
                    self.timeout_x_min
                ),
            );
        }

        self.admit_next_wave(wave_num + 1, now)
    }

    /// Try to issue the next wave after a fill.
    fn admit_next_wave(&mut self, next_wave_num: u32, now: DateTime<Utc>) -> FillOutcome {
        if next_wave_num >= self.max_waves {
            return FillOutcome::none(format!(
                "All {} waves sent, waiting for fills or TP",
                self.max_waves
            ));
        }
        // Redelivered events must not duplicate a wave number.
        if self.wave(next_wave_num).is_some() {
            return FillOutcome::none(format!("Wave {next_wave_num} already issued"));
        }

        let quote = match self.math().quote(next_wave_num) {
            Ok(quote) => quote,
            Err(err) => {
                warn!("session {}: {err}; no further waves", self.id);
                return FillOutcome::none(format!(
                    "Wave {next_wave_num} price below the symbol tick floor"
                ));
            }
        };

        let remaining = self.remaining_fund();
        if quote.cost() > remaining {
            warn!(
                "insufficient fund for wave {}: need {:.4}, have {:.4}",
                next_wave_num,
                quote.cost(),
                remaining
            );
            return FillOutcome::none(format!("Insufficient fund for wave {next_wave_num}"));
        }

        self.current_wave = next_wave_num;
        let wave = Wave::from_quote(quote, now);
        let order = self.wave_order(&wave);
        let price = wave.target_price;
        self.waves.push(wave);

        FillOutcome::with_order(
            FillAction::NextWave,
            order,
            format!("Queued wave {next_wave_num} @ {price}"),
        )
    }

    /// Evaluate the take-profit condition at the given mark price.
    ///
    /// Triggers at most once: a session already TP_TRIGGERED (or otherwise
    /// out of ACTIVE) returns `None`. The wave cap does not gate this; TP
    /// can fire after every wave has been issued or filled.
    pub fn check_tp(&mut self, market_price: f64) -> Option<FillOutcome> {
        if self.status != SessionStatus::Active {
            return None;
        }
        if self.total_filled_qty <= 0.0 || market_price <= 0.0 {
            return None;
        }

        let tp_price = self.avg_price * (1.0 + self.tp_pct / 100.0);
        if market_price < tp_price {
            return None;
        }

        self.status = SessionStatus::TpTriggered;
        self.completed_at = Some(Utc::now());
        info!(
            "pyramid {} TP triggered: market {} >= TP {:.4} (avg={:.4}, tp%={})",
            self.id, market_price, tp_price, self.avg_price, self.tp_pct
        );

        Some(FillOutcome::with_order(
            FillAction::TpTriggered,
            self.tp_order(),
            format!(
                "TP triggered at {market_price}, selling {}",
                self.total_filled_qty
            ),
        ))
    }

    /// Timeout predicate. Both conditions must hold:
    ///
    /// 1. more than `timeout_x_min` minutes since the last fill (the start
    ///    time stands in before any fill);
    /// 2. fewer than two filled waves, or the gap between the two most
    ///    recent fills is under `gap_y_min` minutes.
    pub fn timeout_due(&self, now: DateTime<Utc>) -> bool {
        let Some(anchor) = self.last_fill_at.or(self.started_at) else {
            return false;
        };

        let idle_min = (now - anchor).num_milliseconds() as f64 / 60_000.0;
        if idle_min <= self.timeout_x_min {
            return false;
        }

        let mut fill_times: Vec<DateTime<Utc>> = self
            .waves
            .iter()
            .filter(|w| w.status == WaveStatus::Filled)
            .filter_map(|w| w.filled_at)
            .collect();
        if fill_times.len() < 2 {
            return true;
        }

        fill_times.sort_unstable();
        let gap = fill_times[fill_times.len() - 1] - fill_times[fill_times.len() - 2];
        (gap.num_milliseconds() as f64 / 60_000.0) < self.gap_y_min
    }

    /// Convenience wrapper over [`timeout_due`](Self::timeout_due) at the
    /// current wall clock.
    pub fn check_timeout(&self) -> bool {
        self.timeout_due(Utc::now())
    }

    /// Stop the session if it is ACTIVE and the timeout predicate holds.
    /// Used by the manager's idle sweeper; no order is emitted.
    pub fn timeout_if_due(&mut self) -> Option<FillOutcome> {
        if self.status != SessionStatus::Active {
            return None;
        }
        let now = Utc::now();
        if !self.timeout_due(now) {
            return None;
        }
        self.enter_stopped(now);
        Some(FillOutcome::plain(
            FillAction::Stopped,
            format!(
                "Session stopped: timeout ({} min without fill)",
                self.timeout_x_min
            ),
        ))
    }

    fn enter_stopped(&mut self, now: DateTime<Utc>) {
        self.status = SessionStatus::Stopped;
        self.completed_at = Some(now);
        warn!("pyramid {} stopped", self.id);
    }

    /// Manual or rejection-driven stop. Allowed from PENDING and ACTIVE.
    pub fn stop(&mut self, reason: &str) -> Result<()> {
        if self.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal {
                session_id: self.id,
                status: self.status,
            });
        }
        self.status = SessionStatus::Stopped;
        self.completed_at = Some(Utc::now());
        info!("pyramid {} stopped: {reason}", self.id);
        Ok(())
    }

    /// The take-profit order filled; the session is done.
    pub fn on_tp_filled(&mut self) -> FillOutcome {
        if self.status != SessionStatus::TpTriggered {
            warn!(
                "TP fill for session {} ignored in status {}",
                self.id, self.status
            );
            return FillOutcome::none(format!("TP fill ignored in status {}", self.status));
        }
        self.status = SessionStatus::Completed;
        self.completed_at = Some(Utc::now());
        info!("pyramid {} TP order filled, session complete", self.id);
        FillOutcome::plain(
            FillAction::Completed,
            format!("TP order filled, session {} complete", self.id),
        )
    }

    /// Adjust parameters live. Invalid fields are dropped with a warning;
    /// the returned request carries exactly the fields that were applied.
    pub fn adjust(&mut self, req: &AdjustRequest) -> Result<AdjustRequest> {
        if self.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal {
                session_id: self.id,
                status: self.status,
            });
        }

        let mut applied = AdjustRequest::default();

        if let Some(max_waves) = req.max_waves {
            if max_waves < self.current_wave + 1 {
                warn!(
                    "cannot set max_waves={max_waves} below current wave {}",
                    self.current_wave
                );
            } else {
                self.max_waves = max_waves;
                applied.max_waves = Some(max_waves);
            }
        }

        if let Some(isolated_fund) = req.isolated_fund {
            if isolated_fund < self.total_cost {
                warn!(
                    "cannot set isolated_fund={isolated_fund} below used cost {}",
                    self.total_cost
                );
            } else {
                self.isolated_fund = isolated_fund;
                applied.isolated_fund = Some(isolated_fund);
            }
        }

        if let Some(tp_pct) = req.tp_pct {
            if tp_pct <= 0.0 {
                warn!("invalid tp_pct={tp_pct}, must be positive");
            } else {
                self.tp_pct = tp_pct;
                applied.tp_pct = Some(tp_pct);
            }
        }

        if let Some(distance_pct) = req.distance_pct {
            if distance_pct <= 0.0 || distance_pct >= 100.0 {
                warn!("invalid distance_pct={distance_pct}, must be between 0 and 100");
            } else {
                // Only waves generated from here on see the new distance.
                self.distance_pct = distance_pct;
                applied.distance_pct = Some(distance_pct);
            }
        }

        if let Some(timeout_x_min) = req.timeout_x_min {
            if timeout_x_min <= 0.0 {
                warn!("invalid timeout_x_min={timeout_x_min}, must be positive");
            } else {
                self.timeout_x_min = timeout_x_min;
                applied.timeout_x_min = Some(timeout_x_min);
            }
        }

        if let Some(gap_y_min) = req.gap_y_min {
            if gap_y_min < 0.0 {
                warn!("invalid gap_y_min={gap_y_min}, must be non-negative");
            } else {
                self.gap_y_min = gap_y_min;
                applied.gap_y_min = Some(gap_y_min);
            }
        }

        if !applied.is_empty() {
            info!("pyramid {} params adjusted: {:?}", self.id, applied);
        }
        Ok(applied)
    }

    // ------------------------------------------------------------------
    // Projections
    // ------------------------------------------------------------------

    /// Serializable view of the session. `current_price` is supplied by the
    /// caller (0 when unknown) and drives the PnL fields.
    pub fn snapshot(&self, current_price: f64) -> SessionSnapshot {
        let filled = self.filled_wave_count();
        let open = self
            .waves
            .iter()
            .filter(|w| matches!(w.status, WaveStatus::Pending | WaveStatus::Sent))
            .count();

        let mut unrealized_pnl = 0.0;
        if self.total_filled_qty > 0.0 && current_price > 0.0 {
            unrealized_pnl = self.total_filled_qty * current_price - self.total_cost;
        }
        let unrealized_pnl_pct = if self.total_cost > 0.0 {
            unrealized_pnl / self.total_cost * 100.0
        } else {
            0.0
        };

        SessionSnapshot {
            id: self.id,
            symbol: self.symbol.clone(),
            status: self.status,
            entry_price: self.entry_price,
            distance_pct: self.distance_pct,
            max_waves: self.max_waves,
            isolated_fund: self.isolated_fund,
            tp_pct: self.tp_pct,
            timeout_x_min: self.timeout_x_min,
            gap_y_min: self.gap_y_min,
            current_wave: self.current_wave,
            filled_waves_count: filled,
            pending_waves_count: open,
            total_filled_qty: self.total_filled_qty,
            avg_price: self.avg_price,
            total_cost: self.total_cost,
            used_fund: self.used_fund(),
            remaining_fund: self.remaining_fund(),
            current_price,
            estimated_tp_price: self.estimated_tp_price(),
            unrealized_pnl,
            unrealized_pnl_pct,
            created_at: self.created_at,
            started_at: self.started_at,
            last_fill_at: self.last_fill_at,
            completed_at: self.completed_at,
            created_by: self.created_by.clone(),
            note: self.note.clone(),
            waves: self.waves.clone(),
        }
    }
}

/// Full session view for listings, summaries, and the API layer above.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: i64,
    pub symbol: String,
    pub status: SessionStatus,

    pub entry_price: f64,
    pub distance_pct: f64,
    pub max_waves: u32,
    pub isolated_fund: f64,
    pub tp_pct: f64,
    pub timeout_x_min: f64,
    pub gap_y_min: f64,

    pub current_wave: u32,
    pub filled_waves_count: usize,
    pub pending_waves_count: usize,

    pub total_filled_qty: f64,
    pub avg_price: f64,
    pub total_cost: f64,
    pub used_fund: f64,
    pub remaining_fund: f64,

    pub current_price: f64,
    pub estimated_tp_price: f64,
    pub unrealized_pnl: f64,
    pub unrealized_pnl_pct: f64,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_fill_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub created_by: Option<String>,
    pub note: Option<String>,

    pub waves: Vec<Wave>,
}
