//! Pending-order gateway.
//!
//! Every order the engine emits goes through a human-approval queue before
//! it reaches the exchange. The engine only needs one operation: queue an
//! order descriptor and get back the queue's handle (`pending_order_id`).
//! Approval, rejection, and fills flow back in through the hook layer.

use crate::core::{EngineError, OrderRequest, Result};
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, info};

/// Capacity of the in-memory queue. A pyramid engine produces one order per
/// fill, so hitting this bound means the approval side has stalled.
const MAX_QUEUED_ORDERS: usize = 1024;

pub trait PendingOrderGateway: Send + Sync {
    /// Queue an order for approval; returns the queue's `pending_order_id`.
    ///
    /// A failure here means the order was NOT queued; the caller keeps the
    /// wave in PENDING status and surfaces the error.
    fn queue(&self, order: &OrderRequest) -> Result<i64>;
}

/// An order sitting in the in-memory approval queue.
#[derive(Debug, Clone)]
pub struct QueuedOrder {
    pub pending_order_id: i64,
    pub order: OrderRequest,
}

/// Bounded in-memory gateway for paper trading and tests.
pub struct InMemoryGateway {
    queue: ArrayQueue<QueuedOrder>,
    next_id: AtomicI64,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self {
            queue: ArrayQueue::new(MAX_QUEUED_ORDERS),
            next_id: AtomicI64::new(1),
        }
    }

    /// Pop the oldest queued order (the approval side of the demo loop).
    pub fn pop(&self) -> Option<QueuedOrder> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingOrderGateway for InMemoryGateway {
    fn queue(&self, order: &OrderRequest) -> Result<i64> {
        let pending_order_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queued = QueuedOrder {
            pending_order_id,
            order: order.clone(),
        };
        if self.queue.push(queued).is_err() {
            return Err(EngineError::Gateway(format!(
                "approval queue full ({MAX_QUEUED_ORDERS} orders)"
            )));
        }
        info!(
            "queued order {}: {} {} {} @ {} ({})",
            pending_order_id, order.side, order.quantity, order.symbol, order.price,
            order.source_ref
        );
        Ok(pending_order_id)
    }
}

/// Gateway that refuses every order; exercises the queue-failure path in
/// tests.
#[derive(Debug, Default)]
pub struct FailingGateway;

impl PendingOrderGateway for FailingGateway {
    fn queue(&self, order: &OrderRequest) -> Result<i64> {
        debug!("refusing order {}", order.source_ref);
        Err(EngineError::Gateway("queue unavailable".to_string()))
    }
}
