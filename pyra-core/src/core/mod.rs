//! Shared engine types and errors.

pub mod errors;
pub mod types;

pub use errors::{EngineError, Result};
pub use types::{
    FillAction, FillEvent, FillOutcome, OrderRequest, OrderSlot, OrderType, SessionStatus, Side,
    SourceRef, SymbolFilters, WaveStatus, ORDER_SOURCE,
};
