//! Exchange-info oracle: per-symbol lot constraints.

use crate::core::{Result, SymbolFilters};
use dashmap::DashMap;
use tracing::warn;

/// Resolves `min_qty`, `step_size`, and `max_qty` for a symbol.
pub trait ExchangeInfoOracle: Send + Sync {
    fn lookup(&self, symbol: &str) -> Result<SymbolFilters>;
}

/// Query the oracle, falling back to the configured conservative filters on
/// any failure. Sessions proceed either way.
pub fn lookup_or_default(
    oracle: &dyn ExchangeInfoOracle,
    symbol: &str,
    fallback: SymbolFilters,
) -> SymbolFilters {
    match oracle.lookup(symbol) {
        Ok(filters) => filters,
        Err(err) => {
            warn!("exchange info unavailable for {symbol}: {err}; using fallback filters");
            fallback
        }
    }
}

/// In-memory oracle for tests and paper wiring.
#[derive(Debug, Default)]
pub struct StaticExchangeInfo {
    filters: DashMap<String, SymbolFilters>,
}

impl StaticExchangeInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbol(self, symbol: &str, filters: SymbolFilters) -> Self {
        self.filters.insert(symbol.to_string(), filters);
        self
    }

    pub fn set(&self, symbol: &str, filters: SymbolFilters) {
        self.filters.insert(symbol.to_string(), filters);
    }
}

impl ExchangeInfoOracle for StaticExchangeInfo {
    fn lookup(&self, symbol: &str) -> Result<SymbolFilters> {
        self.filters
            .get(symbol)
            .map(|entry| *entry.value())
            .ok_or_else(|| crate::core::EngineError::Corrupt(format!("no filters for {symbol}")))
    }
}
