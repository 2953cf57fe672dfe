//! Inbound hooks.
//!
//! The three entry points the surrounding platform calls into the engine:
//! fill notifications, approval acknowledgements, and rejections. Anything
//! whose `source_ref` is not a pyramid token is ignored so these can sit on
//! a global order-event bus.

use crate::core::{FillEvent, FillOutcome, OrderSlot, Result};
use crate::engine::manager::SessionManager;
use crate::engine::router::FillRouter;
use std::sync::Arc;
use tracing::info;

pub struct Hooks {
    manager: Arc<SessionManager>,
}

impl Hooks {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Handle a fill from the execution side. Routes to the owning session,
    /// applies the transition, persists, and queues any emitted order.
    /// Returns `Ok(None)` when the order is not ours or the ref is
    /// malformed; nothing is touched in that case.
    pub fn on_fill(&self, event: &FillEvent) -> Result<Option<FillOutcome>> {
        if !event.source_ref.starts_with("pyramid:") {
            return Ok(None);
        }
        let Some(token) = FillRouter::parse(&event.source_ref) else {
            return Ok(None);
        };

        info!(
            "fill event: order={}, ref={}, qty={}, price={}",
            event.pending_order_id, event.source_ref, event.filled_qty, event.filled_price
        );

        self.manager
            .router()
            .confirm(event.pending_order_id, token);

        let outcome = self.manager.handle_fill(
            token,
            event.filled_qty,
            event.filled_price,
            event.current_market_price,
        )?;

        // The order is terminal either way; free its route.
        if outcome.is_some() {
            self.manager.router().remove(event.pending_order_id);
        }
        Ok(outcome)
    }

    /// Approval acknowledgement for a queued order. Marks the wave SENT if
    /// it is not already (the queue-acknowledge path normally did).
    pub fn on_order_approved(&self, pending_order_id: i64, source_ref: &str) -> Result<()> {
        if !source_ref.starts_with("pyramid:") {
            return Ok(());
        }
        let Some(token) = FillRouter::parse(source_ref) else {
            return Ok(());
        };
        // The TP order has no wave row; approval is a no-op for it.
        let OrderSlot::Wave(wave_num) = token.slot else {
            return Ok(());
        };
        self.manager
            .mark_wave_sent_if_needed(token.session_id, wave_num, pending_order_id)
    }

    /// Rejection of a queued order: the wave is cancelled and the pyramid
    /// halts.
    pub fn on_order_rejected(&self, pending_order_id: i64, source_ref: &str) -> Result<()> {
        if !source_ref.starts_with("pyramid:") {
            return Ok(());
        }
        let Some(token) = FillRouter::parse(source_ref) else {
            return Ok(());
        };
        self.manager.handle_rejection(token, pending_order_id)
    }
}
