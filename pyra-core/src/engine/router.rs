//! Fill routing.
//!
//! Outbound orders carry a `source_ref` token; the router owns the live
//! table from the queue's `pending_order_id` back to that token. A wave has
//! exactly one live route while its order is in flight: routes are added
//! when the queue acknowledges an order, rejected on duplicates, and
//! removed when the order fills or is cancelled.

use crate::core::{EngineError, Result, SourceRef};
use dashmap::DashMap;
use tracing::{error, warn};

#[derive(Debug, Default)]
pub struct FillRouter {
    routes: DashMap<i64, SourceRef>,
}

impl FillRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw token, logging and dropping anything malformed.
    pub fn parse(raw: &str) -> Option<SourceRef> {
        match SourceRef::parse(raw) {
            Some(token) => Some(token),
            None => {
                error!("failed to parse source_ref {raw:?}");
                None
            }
        }
    }

    /// Record the live route for an acknowledged order.
    pub fn register(&self, pending_order_id: i64, token: SourceRef) -> Result<()> {
        use dashmap::mapref::entry::Entry;
        match self.routes.entry(pending_order_id) {
            Entry::Occupied(_) => Err(EngineError::DuplicateRoute(pending_order_id)),
            Entry::Vacant(slot) => {
                slot.insert(token);
                Ok(())
            }
        }
    }

    /// Look up the route for a pending-order id, if still live.
    pub fn resolve(&self, pending_order_id: i64) -> Option<SourceRef> {
        self.routes.get(&pending_order_id).map(|entry| *entry.value())
    }

    /// Drop the route once the order reached a terminal state.
    pub fn remove(&self, pending_order_id: i64) {
        self.routes.remove(&pending_order_id);
    }

    /// Drop every route belonging to a session (session deletion).
    pub fn remove_session(&self, session_id: i64) {
        self.routes.retain(|_, token| token.session_id != session_id);
    }

    /// Cross-check an inbound fill's token against the live table. A
    /// mismatch is logged and the parsed token wins (the table is a
    /// consistency aid, not the source of truth; it is empty right after a
    /// restart).
    pub fn confirm(&self, pending_order_id: i64, token: SourceRef) {
        if let Some(live) = self.resolve(pending_order_id) {
            if live != token {
                warn!(
                    "pending order {pending_order_id} routed to {live} but fill carried {token}"
                );
            }
        }
    }

    pub fn live_routes(&self) -> usize {
        self.routes.len()
    }
}
