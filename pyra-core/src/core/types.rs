//! Core wire and domain types.
//!
//! Everything the engine shares with the surrounding platform lives here:
//! the outbound order descriptor consumed by the pending-order queue, the
//! inbound fill notification, the routing token attached to every outbound
//! order, and the session/wave status enums with their canonical string
//! forms (used for storage, serialization, and logs alike).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Source tag attached to every order the engine emits.
pub const ORDER_SOURCE: &str = "kss";

// ============================================================================
// Order primitives
// ============================================================================

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type. Wave orders are limit orders; take-profit exits are market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    Market,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Market => write!(f, "MARKET"),
        }
    }
}

// ============================================================================
// Status enums (canonical lowercase strings)
// ============================================================================

/// Status of a pyramid session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created but not started.
    Pending,
    /// Running, waiting for fills.
    Active,
    /// Stopped by timeout, rejection, or manual stop.
    Stopped,
    /// Take-profit order filled; position closed.
    Completed,
    /// Take-profit condition met; exit order in flight.
    TpTriggered,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Active => "active",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Completed => "completed",
            SessionStatus::TpTriggered => "tp_triggered",
        }
    }

    /// Terminal sessions accept no further waves, fills, or adjustments.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Stopped | SessionStatus::Completed | SessionStatus::TpTriggered
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SessionStatus::Pending),
            "active" => Ok(SessionStatus::Active),
            "stopped" => Ok(SessionStatus::Stopped),
            "completed" => Ok(SessionStatus::Completed),
            "tp_triggered" => Ok(SessionStatus::TpTriggered),
            other => Err(format!("unknown session status '{other}'")),
        }
    }
}

/// Status of a single wave within a session.
///
/// A wave is PENDING from the moment it is generated in memory and becomes
/// SENT only once the pending-order queue has acknowledged it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveStatus {
    Pending,
    Sent,
    Filled,
    Cancelled,
}

impl WaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaveStatus::Pending => "pending",
            WaveStatus::Sent => "sent",
            WaveStatus::Filled => "filled",
            WaveStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WaveStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WaveStatus::Pending),
            "sent" => Ok(WaveStatus::Sent),
            "filled" => Ok(WaveStatus::Filled),
            "cancelled" => Ok(WaveStatus::Cancelled),
            other => Err(format!("unknown wave status '{other}'")),
        }
    }
}

// ============================================================================
// Routing token
// ============================================================================

/// Which order of a session an outbound order (or inbound fill) refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderSlot {
    /// Buy wave, 0-indexed.
    Wave(u32),
    /// Take-profit market sell.
    TakeProfit,
}

/// Routing token attached to outbound orders as an opaque string.
///
/// Wire shapes: `pyramid:{session_id}:wave:{n}` and `pyramid:{session_id}:tp`.
/// Only the router parses it; every other component treats the string as
/// opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceRef {
    pub session_id: i64,
    pub slot: OrderSlot,
}

impl SourceRef {
    pub fn wave(session_id: i64, wave_num: u32) -> Self {
        Self {
            session_id,
            slot: OrderSlot::Wave(wave_num),
        }
    }

    pub fn take_profit(session_id: i64) -> Self {
        Self {
            session_id,
            slot: OrderSlot::TakeProfit,
        }
    }

    /// Parse a raw token. Returns `None` for anything malformed or not ours.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split(':');
        if parts.next()? != "pyramid" {
            return None;
        }
        let session_id: i64 = parts.next()?.parse().ok()?;
        let slot = match parts.next()? {
            "wave" => OrderSlot::Wave(parts.next()?.parse().ok()?),
            "tp" => OrderSlot::TakeProfit,
            _ => return None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self { session_id, slot })
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot {
            OrderSlot::Wave(n) => write!(f, "pyramid:{}:wave:{}", self.session_id, n),
            OrderSlot::TakeProfit => write!(f, "pyramid:{}:tp", self.session_id),
        }
    }
}

// ============================================================================
// Wire records
// ============================================================================

/// Outbound order descriptor handed to the pending-order queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: f64,
    /// Limit price; 0 for market orders.
    pub price: f64,
    pub source: String,
    pub source_ref: String,
    pub strategy_name: String,
    pub note: String,
}

impl OrderRequest {
    pub fn notional(&self) -> f64 {
        self.quantity * self.price
    }
}

/// Inbound fill notification from the execution side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillEvent {
    pub pending_order_id: i64,
    pub filled_qty: f64,
    pub filled_price: f64,
    pub source_ref: String,
    /// If absent the engine queries the market-price oracle before the
    /// take-profit evaluation.
    #[serde(default)]
    pub current_market_price: Option<f64>,
}

/// What a fill transition decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillAction {
    NextWave,
    TpTriggered,
    Stopped,
    Completed,
    None,
}

/// Result descriptor returned from fill processing to the hook layer.
#[derive(Debug, Clone, Serialize)]
pub struct FillOutcome {
    pub action: FillAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderRequest>,
    pub message: String,
    /// Set by the manager once an emitted order is queued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_order_id: Option<i64>,
}

impl FillOutcome {
    pub fn none(message: impl Into<String>) -> Self {
        Self {
            action: FillAction::None,
            order: None,
            message: message.into(),
            pending_order_id: None,
        }
    }

    pub fn with_order(action: FillAction, order: OrderRequest, message: impl Into<String>) -> Self {
        Self {
            action,
            order: Some(order),
            message: message.into(),
            pending_order_id: None,
        }
    }

    pub fn plain(action: FillAction, message: impl Into<String>) -> Self {
        Self {
            action,
            order: None,
            message: message.into(),
            pending_order_id: None,
        }
    }
}

// ============================================================================
// Exchange filters
// ============================================================================

/// Per-symbol lot constraints resolved from the exchange-info oracle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymbolFilters {
    pub min_qty: f64,
    pub step_size: f64,
    pub max_qty: f64,
}

impl SymbolFilters {
    /// Conservative fallback used when the oracle is unavailable.
    pub fn conservative() -> Self {
        Self {
            min_qty: 1e-5,
            step_size: 1e-5,
            max_qty: 1e4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            SessionStatus::Pending,
            SessionStatus::Active,
            SessionStatus::Stopped,
            SessionStatus::Completed,
            SessionStatus::TpTriggered,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>(), Ok(status));
        }
        for status in [
            WaveStatus::Pending,
            WaveStatus::Sent,
            WaveStatus::Filled,
            WaveStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<WaveStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!SessionStatus::Pending.is_terminal());
        assert!(!SessionStatus::Active.is_terminal());
        assert!(SessionStatus::Stopped.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::TpTriggered.is_terminal());
    }

    #[test]
    fn test_source_ref_wave_round_trip() {
        let token = SourceRef::wave(17, 3);
        assert_eq!(token.to_string(), "pyramid:17:wave:3");
        assert_eq!(SourceRef::parse("pyramid:17:wave:3"), Some(token));
    }

    #[test]
    fn test_source_ref_tp_round_trip() {
        let token = SourceRef::take_profit(4);
        assert_eq!(token.to_string(), "pyramid:4:tp");
        assert_eq!(SourceRef::parse("pyramid:4:tp"), Some(token));
    }

    #[test]
    fn test_source_ref_rejects_malformed() {
        for raw in [
            "",
            "pyramid",
            "pyramid:",
            "pyramid:abc:wave:0",
            "pyramid:1:wave",
            "pyramid:1:wave:x",
            "pyramid:1:wave:0:extra",
            "pyramid:1:tp:extra",
            "grid:1:wave:0",
            "manual order",
        ] {
            assert_eq!(SourceRef::parse(raw), None, "should reject {raw:?}");
        }
    }

    #[test]
    fn test_order_side_wire_format() {
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"BUY\"");
        assert_eq!(serde_json::to_string(&OrderType::Market).unwrap(), "\"MARKET\"");
    }
}
