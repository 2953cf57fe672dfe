//! Session manager.
//!
//! Registry of live sessions plus the orchestration around every
//! transition: persist the change, queue emitted orders, and keep the fill
//! router's live table in step.
//!
//! ## Locking discipline
//!
//! - The registry mutex only guards the id map and counter; it is never
//!   held across a session mutation.
//! - Each session sits behind its own mutex; one transition in flight per
//!   session, fills applied in arrival order at that lock.
//! - Store writes happen under the session lock so the durable row always
//!   matches the decision just taken. The pending-order gateway is the slow
//!   human-facing edge and is only ever called with the session lock
//!   released; marking the wave SENT afterwards re-acquires it.

use crate::config::EngineConfig;
use crate::core::{
    EngineError, FillAction, FillOutcome, OrderSlot, Result, SessionStatus, SourceRef, WaveStatus,
};
use crate::data::{lookup_or_default, ExchangeInfoOracle, MarketPriceOracle};
use crate::engine::router::FillRouter;
use crate::execution::PendingOrderGateway;
use crate::storage::{FillDelta, SessionRecord, SessionStore, StateDelta};
use crate::strategy::pyramid::{
    AdjustRequest, PyramidSession, SessionParams, SessionSnapshot,
};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};

pub type SharedSession = Arc<Mutex<PyramidSession>>;

#[derive(Debug, Default)]
struct Registry {
    sessions: HashMap<i64, SharedSession>,
    next_id: i64,
}

/// Aggregate view for dashboards.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ManagerSummary {
    pub total_sessions: usize,
    pub pending_sessions: usize,
    pub active_sessions: usize,
    pub stopped_sessions: usize,
    pub completed_sessions: usize,
    pub tp_triggered_sessions: usize,
    /// Isolated fund committed across ACTIVE sessions.
    pub total_isolated_fund: f64,
    /// Cost of filled waves across ACTIVE sessions.
    pub total_used_fund: f64,
    pub total_unrealized_pnl: f64,
}

pub struct SessionManager {
    registry: Mutex<Registry>,
    router: FillRouter,
    store: Arc<dyn SessionStore>,
    gateway: Arc<dyn PendingOrderGateway>,
    exchange_info: Arc<dyn ExchangeInfoOracle>,
    market_prices: Arc<dyn MarketPriceOracle>,
    config: EngineConfig,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        gateway: Arc<dyn PendingOrderGateway>,
        exchange_info: Arc<dyn ExchangeInfoOracle>,
        market_prices: Arc<dyn MarketPriceOracle>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let next_id = store.max_session_id()? + 1;
        info!("session manager initialized (next id {next_id})");
        Ok(Self {
            registry: Mutex::new(Registry {
                sessions: HashMap::new(),
                next_id,
            }),
            router: FillRouter::new(),
            store,
            gateway,
            exchange_info,
            market_prices,
            config,
        })
    }

    pub(crate) fn router(&self) -> &FillRouter {
        &self.router
    }

    /// Reload every stored session into the registry after a restart.
    ///
    /// PENDING sessions come back startable, ACTIVE ones resume accepting
    /// fills for their in-flight waves, terminal ones stay queryable until
    /// `clear_completed`. Router routes are rebuilt for SENT waves.
    pub fn recover(&self) -> Result<usize> {
        let records = self.store.load_all()?;
        let count = records.len();
        let mut max_id = 0;

        for record in records {
            max_id = max_id.max(record.id);
            let filters = lookup_or_default(
                self.exchange_info.as_ref(),
                &record.symbol,
                self.config.fallback_filters(),
            );

            for wave in &record.waves {
                if wave.status == WaveStatus::Sent {
                    if let Some(poid) = wave.pending_order_id {
                        let token = SourceRef::wave(record.id, wave.wave_num);
                        if let Err(err) = self.router.register(poid, token) {
                            warn!("skipping stale route {token}: {err}");
                        }
                    }
                }
            }

            let session = PyramidSession {
                id: record.id,
                symbol: record.symbol,
                entry_price: record.entry_price,
                distance_pct: record.distance_pct,
                max_waves: record.max_waves,
                isolated_fund: record.isolated_fund,
                tp_pct: record.tp_pct,
                timeout_x_min: record.timeout_x_min,
                gap_y_min: record.gap_y_min,
                initial_params: crate::strategy::pyramid::AdjustableParams {
                    max_waves: record.max_waves,
                    isolated_fund: record.isolated_fund,
                    tp_pct: record.tp_pct,
                    distance_pct: record.distance_pct,
                    timeout_x_min: record.timeout_x_min,
                    gap_y_min: record.gap_y_min,
                },
                status: record.status,
                current_wave: record.current_wave,
                waves: record.waves,
                avg_price: record.avg_price,
                total_filled_qty: record.total_filled_qty,
                total_cost: record.total_cost,
                created_at: record.created_at,
                started_at: record.started_at,
                last_fill_at: record.last_fill_at,
                completed_at: record.completed_at,
                created_by: record.created_by,
                note: record.note,
                filters,
                pip_multiplier: self.config.pip_multiplier,
            };

            let mut registry = self.registry.lock();
            registry
                .sessions
                .insert(session.id, Arc::new(Mutex::new(session)));
        }

        let mut registry = self.registry.lock();
        registry.next_id = registry.next_id.max(max_id + 1);
        info!(
            "recovered {count} sessions, id counter at {}",
            registry.next_id
        );
        Ok(count)
    }

    /// Fetch the shared handle for a session.
    pub fn session(&self, session_id: i64) -> Result<SharedSession> {
        self.registry
            .lock()
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or(EngineError::SessionNotFound(session_id))
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Create a new PENDING session: validate, resolve exchange filters,
    /// allocate an id, persist, register.
    pub fn create_pyramid_session(&self, params: SessionParams) -> Result<SessionSnapshot> {
        params.validate()?;
        let filters = lookup_or_default(
            self.exchange_info.as_ref(),
            &params.symbol,
            self.config.fallback_filters(),
        );

        let id = {
            let mut registry = self.registry.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            id
        };

        let session = PyramidSession::new(id, params, filters, self.config.pip_multiplier)?;

        // No session without a durable row.
        self.store.insert_session(&record_of(&session))?;

        info!(
            "created pyramid session {id}: {} @ {}, max_waves={}, fund={}",
            session.symbol, session.entry_price, session.max_waves, session.isolated_fund
        );

        let snapshot = session.snapshot(self.market_prices.current_price(&session.symbol));
        self.registry
            .lock()
            .sessions
            .insert(id, Arc::new(Mutex::new(session)));
        Ok(snapshot)
    }

    /// Start a session: emit wave 0, persist, queue it for approval.
    pub fn start(&self, session_id: i64) -> Result<FillOutcome> {
        let shared = self.session(session_id)?;

        let order = {
            let mut session = shared.lock();
            let Some(order) = session.start()? else {
                return Ok(FillOutcome::none("Insufficient fund for wave 0"));
            };
            let started_at = session.started_at.unwrap_or_else(Utc::now);
            let wave = session.waves[0].clone();
            let wave_id = self
                .store
                .record_session_started(session_id, started_at, &wave)?;
            session.waves[0].id = Some(wave_id);
            order
        };

        let mut outcome = FillOutcome::with_order(
            FillAction::NextWave,
            order.clone(),
            format!("Queued wave 0 @ {}", order.price),
        );
        outcome.pending_order_id =
            Some(self.queue_wave(session_id, &shared, 0, &outcome)?);
        Ok(outcome)
    }

    /// Queue the order for wave `wave_num` (already generated, PENDING) and
    /// mark it SENT once the gateway acknowledges. The session lock must
    /// NOT be held by the caller.
    fn queue_wave(
        &self,
        session_id: i64,
        shared: &SharedSession,
        wave_num: u32,
        outcome: &FillOutcome,
    ) -> Result<i64> {
        let Some(order) = &outcome.order else {
            return Err(EngineError::Gateway("no order to queue".to_string()));
        };

        // On failure the wave stays PENDING; its number is not consumed.
        let poid = self.gateway.queue(order).inspect_err(|err| {
            warn!("session {session_id} wave {wave_num} stays pending: {err}");
        })?;

        let token = SourceRef::wave(session_id, wave_num);
        self.router.register(poid, token)?;

        let mut session = shared.lock();
        let now = Utc::now();
        let Some(wave) = session.wave_mut(wave_num) else {
            return Err(EngineError::WaveNotFound {
                session_id,
                wave_num,
            });
        };
        wave.mark_sent(poid, now);
        let wave_id = wave.id;
        drop(session);

        if let Some(wave_id) = wave_id {
            self.store.mark_wave_sent(wave_id, poid, now)?;
        }
        Ok(poid)
    }

    pub fn stop(&self, session_id: i64, reason: &str) -> Result<()> {
        let shared = self.session(session_id)?;
        let completed_at = {
            let mut session = shared.lock();
            session.stop(reason)?;
            session.completed_at
        };
        self.store
            .update_session_status(session_id, SessionStatus::Stopped, None, completed_at)?;
        Ok(())
    }

    /// Adjust live parameters; returns exactly the applied subset.
    pub fn adjust(&self, session_id: i64, req: &AdjustRequest) -> Result<AdjustRequest> {
        let shared = self.session(session_id)?;
        let applied = {
            let mut session = shared.lock();
            session.adjust(req)?
        };
        if !applied.is_empty() {
            self.store.update_session_params(session_id, &applied)?;
        }
        Ok(applied)
    }

    /// Drop a session from the registry and the store (waves cascade).
    pub fn delete(&self, session_id: i64) -> Result<()> {
        self.registry.lock().sessions.remove(&session_id);
        self.router.remove_session(session_id);
        self.store.delete_session(session_id)?;
        info!("deleted session {session_id}");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Fills
    // ------------------------------------------------------------------

    /// Route a fill notification by its `source_ref`. Returns `Ok(None)`
    /// for refs that are malformed or not ours.
    pub fn on_fill(
        &self,
        source_ref: &str,
        filled_qty: f64,
        filled_price: f64,
        market_price: Option<f64>,
    ) -> Result<Option<FillOutcome>> {
        let Some(token) = FillRouter::parse(source_ref) else {
            return Ok(None);
        };
        self.handle_fill(token, filled_qty, filled_price, market_price)
    }

    pub(crate) fn handle_fill(
        &self,
        token: SourceRef,
        filled_qty: f64,
        filled_price: f64,
        market_price: Option<f64>,
    ) -> Result<Option<FillOutcome>> {
        let shared = match self.session(token.session_id) {
            Ok(shared) => shared,
            Err(_) => {
                warn!("session {} not found for fill", token.session_id);
                return Ok(None);
            }
        };

        match token.slot {
            OrderSlot::Wave(wave_num) => {
                self.handle_wave_fill(token.session_id, &shared, wave_num, filled_qty, filled_price, market_price)
            }
            OrderSlot::TakeProfit => self.handle_tp_fill(token.session_id, &shared),
        }
    }

    fn handle_wave_fill(
        &self,
        session_id: i64,
        shared: &SharedSession,
        wave_num: u32,
        filled_qty: f64,
        filled_price: f64,
        market_price: Option<f64>,
    ) -> Result<Option<FillOutcome>> {
        // Resolve the mark price outside the session lock; the oracle may
        // be remote.
        let market_price = match market_price {
            Some(price) => price,
            None => {
                let symbol = shared.lock().symbol.clone();
                self.market_prices.current_price(&symbol)
            }
        };

        let mut session = shared.lock();
        let was_filled = session
            .wave(wave_num)
            .map(|w| w.status == WaveStatus::Filled)
            .unwrap_or(false);

        let mut outcome = session.on_fill(wave_num, filled_qty, filled_price, market_price);

        let newly_filled = !was_filled
            && session
                .wave(wave_num)
                .map(|w| w.status == WaveStatus::Filled)
                .unwrap_or(false);

        if newly_filled {
            let filled_wave = session.wave(wave_num).cloned();
            let delta = FillDelta {
                state: StateDelta {
                    current_wave: session.current_wave,
                    avg_price: session.avg_price,
                    total_filled_qty: session.total_filled_qty,
                    total_cost: session.total_cost,
                    last_fill_at: session.last_fill_at,
                },
                filled_wave_id: filled_wave.as_ref().and_then(|w| w.id),
                filled_qty,
                filled_price,
                filled_at: filled_wave.as_ref().and_then(|w| w.filled_at),
                new_wave: match outcome.action {
                    FillAction::NextWave => session.waves.last().cloned(),
                    _ => None,
                },
                new_status: match outcome.action {
                    FillAction::Stopped => Some(SessionStatus::Stopped),
                    FillAction::TpTriggered => Some(SessionStatus::TpTriggered),
                    _ => None,
                },
                completed_at: session.completed_at,
            };
            let new_wave_id = self.store.record_fill(session_id, &delta)?;
            if let (Some(new_wave_id), Some(wave)) = (new_wave_id, session.waves.last_mut()) {
                wave.id = Some(new_wave_id);
            }
        }
        drop(session);

        match outcome.action {
            FillAction::NextWave => {
                let poid = self.queue_wave(session_id, shared, wave_num + 1, &outcome)?;
                outcome.pending_order_id = Some(poid);
            }
            FillAction::TpTriggered => {
                if let Some(order) = &outcome.order {
                    let poid = self.gateway.queue(order).inspect_err(|err| {
                        warn!("session {session_id} TP order not queued: {err}");
                    })?;
                    self.router
                        .register(poid, SourceRef::take_profit(session_id))?;
                    outcome.pending_order_id = Some(poid);
                }
            }
            _ => {}
        }

        Ok(Some(outcome))
    }

    fn handle_tp_fill(&self, session_id: i64, shared: &SharedSession) -> Result<Option<FillOutcome>> {
        let mut session = shared.lock();
        let outcome = session.on_tp_filled();
        if outcome.action == FillAction::Completed {
            let completed_at = session.completed_at;
            drop(session);
            self.store.update_session_status(
                session_id,
                SessionStatus::Completed,
                None,
                completed_at,
            )?;
        }
        Ok(Some(outcome))
    }

    // ------------------------------------------------------------------
    // Hook support
    // ------------------------------------------------------------------

    /// Approval acknowledgement: mark the wave SENT if it is not already.
    pub(crate) fn mark_wave_sent_if_needed(
        &self,
        session_id: i64,
        wave_num: u32,
        pending_order_id: i64,
    ) -> Result<()> {
        let shared = self.session(session_id)?;
        let mut session = shared.lock();
        let Some(wave) = session.wave_mut(wave_num) else {
            return Err(EngineError::WaveNotFound {
                session_id,
                wave_num,
            });
        };
        match wave.status {
            WaveStatus::Pending => {
                let now = Utc::now();
                wave.mark_sent(pending_order_id, now);
                let wave_id = wave.id;
                drop(session);
                if let Some(wave_id) = wave_id {
                    self.store.mark_wave_sent(wave_id, pending_order_id, now)?;
                }
                if let Err(err) = self
                    .router
                    .register(pending_order_id, SourceRef::wave(session_id, wave_num))
                {
                    warn!("route for order {pending_order_id} already live: {err}");
                }
            }
            WaveStatus::Sent => {}
            other => {
                warn!(
                    "approval for session {session_id} wave {wave_num} ignored in status {other}"
                );
            }
        }
        Ok(())
    }

    /// Rejection of a queued order: cancel the wave and halt the pyramid.
    pub(crate) fn handle_rejection(
        &self,
        token: SourceRef,
        pending_order_id: i64,
    ) -> Result<()> {
        let shared = self.session(token.session_id)?;
        let mut session = shared.lock();

        if let OrderSlot::Wave(wave_num) = token.slot {
            if let Some(wave) = session.wave_mut(wave_num) {
                wave.mark_cancelled();
                let wave_id = wave.id;
                if let Some(wave_id) = wave_id {
                    self.store.mark_wave_cancelled(wave_id)?;
                }
            }
        }

        match session.stop("wave_rejected") {
            Ok(()) => {
                let completed_at = session.completed_at;
                drop(session);
                self.store.update_session_status(
                    token.session_id,
                    SessionStatus::Stopped,
                    None,
                    completed_at,
                )?;
                info!(
                    "session {} stopped due to order {pending_order_id} rejection",
                    token.session_id
                );
            }
            Err(err) => warn!("rejection on terminal session ignored: {err}"),
        }

        self.router.remove(pending_order_id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    fn shared_sessions(&self) -> Vec<SharedSession> {
        self.registry.lock().sessions.values().cloned().collect()
    }

    pub fn get(&self, session_id: i64) -> Option<SessionSnapshot> {
        let shared = self.session(session_id).ok()?;
        let symbol = shared.lock().symbol.clone();
        let price = self.market_prices.current_price(&symbol);
        let snapshot = shared.lock().snapshot(price);
        Some(snapshot)
    }

    /// List sessions, newest first, with optional status/symbol filters.
    pub fn list(
        &self,
        status: Option<SessionStatus>,
        symbol: Option<&str>,
    ) -> Vec<SessionSnapshot> {
        let mut selected = Vec::new();
        let mut symbols = HashSet::new();
        for shared in self.shared_sessions() {
            let session = shared.lock();
            if let Some(status) = status {
                if session.status != status {
                    continue;
                }
            }
            if let Some(symbol) = symbol {
                if session.symbol != symbol {
                    continue;
                }
            }
            symbols.insert(session.symbol.clone());
            drop(session);
            selected.push(shared);
        }

        let symbol_refs: Vec<&str> = symbols.iter().map(String::as_str).collect();
        let prices = self.market_prices.current_prices(&symbol_refs);

        let mut snapshots: Vec<SessionSnapshot> = selected
            .into_iter()
            .map(|shared| {
                let session = shared.lock();
                let price = prices.get(&session.symbol).copied().unwrap_or(0.0);
                session.snapshot(price)
            })
            .collect();
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        snapshots
    }

    pub fn get_summary(&self) -> ManagerSummary {
        let mut summary = ManagerSummary::default();
        let mut active: Vec<(String, f64, f64)> = Vec::new(); // symbol, qty, cost

        for shared in self.shared_sessions() {
            let session = shared.lock();
            summary.total_sessions += 1;
            match session.status {
                SessionStatus::Pending => summary.pending_sessions += 1,
                SessionStatus::Active => summary.active_sessions += 1,
                SessionStatus::Stopped => summary.stopped_sessions += 1,
                SessionStatus::Completed => summary.completed_sessions += 1,
                SessionStatus::TpTriggered => summary.tp_triggered_sessions += 1,
            }
            if session.status == SessionStatus::Active {
                summary.total_isolated_fund += session.isolated_fund;
                summary.total_used_fund += session.used_fund();
                active.push((
                    session.symbol.clone(),
                    session.total_filled_qty,
                    session.total_cost,
                ));
            }
        }

        let symbols: HashSet<&str> = active.iter().map(|(s, _, _)| s.as_str()).collect();
        let symbol_refs: Vec<&str> = symbols.into_iter().collect();
        let prices = self.market_prices.current_prices(&symbol_refs);
        for (symbol, qty, cost) in active {
            let price = prices.get(&symbol).copied().unwrap_or(0.0);
            if qty > 0.0 && price > 0.0 {
                summary.total_unrealized_pnl += qty * price - cost;
            }
        }
        summary
    }

    /// Remove terminal sessions from the registry. Durable records remain.
    pub fn clear_completed(&self) -> usize {
        let terminal: Vec<i64> = self
            .shared_sessions()
            .into_iter()
            .filter_map(|shared| {
                let session = shared.lock();
                session.status.is_terminal().then_some(session.id)
            })
            .collect();

        let mut registry = self.registry.lock();
        let mut cleared = 0;
        for id in terminal {
            if registry.sessions.remove(&id).is_some() {
                cleared += 1;
            }
        }
        if cleared > 0 {
            info!("cleared {cleared} completed sessions");
        }
        cleared
    }

    /// Stop ACTIVE sessions whose timeout predicate holds. Returns the ids
    /// stopped. Intended for a low-frequency sweeper task; sessions that
    /// receive fills evaluate the same predicate inline.
    pub fn sweep_timeouts(&self) -> Vec<i64> {
        let mut stopped = Vec::new();
        for shared in self.shared_sessions() {
            let mut session = shared.lock();
            if session.timeout_if_due().is_some() {
                let id = session.id;
                let completed_at = session.completed_at;
                drop(session);
                if let Err(err) = self.store.update_session_status(
                    id,
                    SessionStatus::Stopped,
                    None,
                    completed_at,
                ) {
                    error!("failed to persist timeout stop for session {id}: {err}");
                }
                stopped.push(id);
            }
        }
        stopped
    }

    /// Test hook: forget everything and restart the id counter.
    pub fn reset(&self) {
        let mut registry = self.registry.lock();
        registry.sessions.clear();
        registry.next_id = 1;
        info!("session manager reset");
    }
}


/// Project a session onto its storage record (waves excluded; they have
/// their own rows).
fn record_of(session: &PyramidSession) -> SessionRecord {
    SessionRecord {
        id: session.id,
        symbol: session.symbol.clone(),
        entry_price: session.entry_price,
        distance_pct: session.distance_pct,
        max_waves: session.max_waves,
        isolated_fund: session.isolated_fund,
        tp_pct: session.tp_pct,
        timeout_x_min: session.timeout_x_min,
        gap_y_min: session.gap_y_min,
        status: session.status,
        current_wave: session.current_wave,
        avg_price: session.avg_price,
        total_filled_qty: session.total_filled_qty,
        total_cost: session.total_cost,
        created_at: session.created_at,
        started_at: session.started_at,
        last_fill_at: session.last_fill_at,
        completed_at: session.completed_at,
        created_by: session.created_by.clone(),
        note: session.note.clone(),
        waves: Vec::new(),
    }
}
