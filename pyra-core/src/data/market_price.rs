//! Market-price oracle.

use dashmap::DashMap;
use std::collections::HashMap;

/// Current mark prices for a set of symbols. Symbols the oracle cannot
/// answer for are simply absent; callers treat them as 0, which suppresses
/// take-profit evaluation for that pass.
pub trait MarketPriceOracle: Send + Sync {
    fn current_prices(&self, symbols: &[&str]) -> HashMap<String, f64>;

    fn current_price(&self, symbol: &str) -> f64 {
        self.current_prices(&[symbol])
            .get(symbol)
            .copied()
            .unwrap_or(0.0)
    }
}

/// In-memory price table for tests and paper wiring.
#[derive(Debug, Default)]
pub struct StaticPrices {
    prices: DashMap<String, f64>,
}

impl StaticPrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(self, symbol: &str, price: f64) -> Self {
        self.prices.insert(symbol.to_string(), price);
        self
    }

    pub fn set(&self, symbol: &str, price: f64) {
        self.prices.insert(symbol.to_string(), price);
    }
}

impl MarketPriceOracle for StaticPrices {
    fn current_prices(&self, symbols: &[&str]) -> HashMap<String, f64> {
        symbols
            .iter()
            .filter_map(|s| self.prices.get(*s).map(|p| (s.to_string(), *p.value())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_symbol_reads_zero() {
        let prices = StaticPrices::new().with_price("BTC", 52_000.0);
        assert_eq!(prices.current_price("BTC"), 52_000.0);
        assert_eq!(prices.current_price("ETH"), 0.0);
    }
}
