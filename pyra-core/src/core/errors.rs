//! Engine error kinds.
//!
//! One enum covers the whole library. Conditions that are part of normal
//! operation (insufficient fund for a next wave, duplicate fills) are not
//! errors; they surface as `FillOutcome` descriptors with `action = none`.

use super::types::SessionStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Construction or adjustment parameter failed validation.
    #[error("invalid {field}: {reason}")]
    InvalidParameter {
        field: &'static str,
        reason: String,
    },

    #[error("session {0} not found")]
    SessionNotFound(i64),

    #[error("wave {wave_num} not found in session {session_id}")]
    WaveNotFound { session_id: i64, wave_num: u32 },

    /// `start` on a session that already left PENDING.
    #[error("session {session_id} already started (status {status})")]
    AlreadyStarted {
        session_id: i64,
        status: SessionStatus,
    },

    /// Mutation attempted on a terminal session.
    #[error("session {session_id} is terminal (status {status})")]
    AlreadyTerminal {
        session_id: i64,
        status: SessionStatus,
    },

    /// A wave price rounded to zero or below; the wave index is refused.
    #[error("wave {wave_num} price rounds to zero at the symbol precision")]
    PriceUnderflow { wave_num: u32 },

    /// A pending-order id is already routed to a live wave.
    #[error("pending order {0} already has a live route")]
    DuplicateRoute(i64),

    /// The pending-order queue refused the order.
    #[error("pending order queue: {0}")]
    Gateway(String),

    #[error("storage: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A stored row could not be decoded back into engine state.
    #[error("corrupt stored record: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
