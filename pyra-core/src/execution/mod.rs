//! Outbound execution seam: the pending-order approval queue.

pub mod gateway;

pub use gateway::{FailingGateway, InMemoryGateway, PendingOrderGateway, QueuedOrder};
