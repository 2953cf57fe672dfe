//! Read-side market data oracles.
//!
//! Two narrow seams the engine consumes: per-symbol lot constraints
//! (queried once at session construction) and current market prices
//! (queried per take-profit evaluation when the fill does not carry one).

pub mod exchange_info;
pub mod market_price;

pub use exchange_info::{lookup_or_default, ExchangeInfoOracle, StaticExchangeInfo};
pub use market_price::{MarketPriceOracle, StaticPrices};
