//! Pure wave sizing and pricing.
//!
//! Wave `n` (0-indexed) buys `(n + 1)` pips of quantity at a price
//! `distance_pct` percent below the previous wave:
//!
//! ```text
//! quantity_n = max(round(((n + 1) * pip_size) / step) * step, min_qty)
//! price_n    = round(entry * (1 - distance/100)^n, precision)
//! ```
//!
//! where `pip_size = pip_multiplier * min_qty` and the price precision is
//! derived from the entry-price magnitude. Everything here is deterministic
//! and side-effect free; a wave whose rounded price would drop to zero or
//! below is refused rather than clamped.

use crate::core::{EngineError, Result, SymbolFilters};

/// Decimal places for prices, by entry-price magnitude.
pub fn price_precision(entry_price: f64) -> u32 {
    if entry_price >= 10_000.0 {
        2
    } else if entry_price >= 100.0 {
        4
    } else {
        6
    }
}

fn round_to_step(value: f64, step: f64) -> f64 {
    (value / step).round() * step
}

fn round_dp(value: f64, dp: u32) -> f64 {
    let factor = 10f64.powi(dp as i32);
    (value * factor).round() / factor
}

/// Quantity and price for one wave.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveQuote {
    pub wave_num: u32,
    pub quantity: f64,
    pub price: f64,
}

impl WaveQuote {
    /// Quote-currency cost of this wave if it fills at target.
    pub fn cost(&self) -> f64 {
        self.quantity * self.price
    }
}

/// Wave calculator bound to one session's parameters and symbol filters.
///
/// Cheap to construct; sessions rebuild it whenever `distance_pct` is
/// adjusted so only not-yet-generated waves see the new distance.
#[derive(Debug, Clone, Copy)]
pub struct WaveMath {
    entry_price: f64,
    distance_pct: f64,
    pip_size: f64,
    min_qty: f64,
    step_size: f64,
    precision: u32,
}

impl WaveMath {
    pub fn new(
        entry_price: f64,
        distance_pct: f64,
        pip_multiplier: f64,
        filters: &SymbolFilters,
    ) -> Self {
        Self {
            entry_price,
            distance_pct,
            pip_size: pip_multiplier * filters.min_qty,
            min_qty: filters.min_qty,
            step_size: filters.step_size,
            precision: price_precision(entry_price),
        }
    }

    pub fn pip_size(&self) -> f64 {
        self.pip_size
    }

    /// Wave quantity: `(n + 1)` pips, step-aligned, at least `min_qty`.
    pub fn quantity(&self, wave_num: u32) -> f64 {
        let raw = (wave_num as f64 + 1.0) * self.pip_size;
        round_to_step(raw, self.step_size).max(self.min_qty)
    }

    /// Wave price, or `None` once rounding would reach zero or below.
    pub fn price(&self, wave_num: u32) -> Option<f64> {
        let factor = 1.0 - self.distance_pct / 100.0;
        let raw = self.entry_price * factor.powi(wave_num as i32);
        let price = round_dp(raw, self.precision);
        (price > 0.0).then_some(price)
    }

    pub fn quote(&self, wave_num: u32) -> Result<WaveQuote> {
        let price = self
            .price(wave_num)
            .ok_or(EngineError::PriceUnderflow { wave_num })?;
        Ok(WaveQuote {
            wave_num,
            quantity: self.quantity(wave_num),
            price,
        })
    }

    /// Estimated total cost of the first `num_waves` waves, for fund
    /// planning. Stops summing at the first wave whose price underflows.
    pub fn estimate_total_cost(&self, num_waves: u32) -> f64 {
        let mut total = 0.0;
        for n in 0..num_waves {
            match self.quote(n) {
                Ok(quote) => total += quote.cost(),
                Err(_) => break,
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn btc_math() -> WaveMath {
        WaveMath::new(50_000.0, 2.0, 2.0, &SymbolFilters::conservative())
    }

    #[test]
    fn test_wave_zero_quantity_is_one_pip() {
        let math = btc_math();
        // pip_size = 2.0 * 1e-5
        assert_relative_eq!(math.quantity(0), 2e-5, max_relative = 1e-9);
        assert_relative_eq!(math.quantity(1), 4e-5, max_relative = 1e-9);
        assert_relative_eq!(math.quantity(9), 2e-4, max_relative = 1e-9);
    }

    #[test]
    fn test_wave_zero_price_is_entry() {
        let math = btc_math();
        assert_eq!(math.price(0), Some(50_000.0));
    }

    #[test]
    fn test_price_descends_by_distance() {
        let math = btc_math();
        assert_eq!(math.price(1), Some(49_000.0));
        assert_eq!(math.price(2), Some(48_020.0));
    }

    #[test]
    fn test_price_precision_ladder() {
        assert_eq!(price_precision(50_000.0), 2);
        assert_eq!(price_precision(10_000.0), 2);
        assert_eq!(price_precision(3_000.0), 4);
        assert_eq!(price_precision(100.0), 4);
        assert_eq!(price_precision(0.5), 6);
    }

    #[test]
    fn test_quantity_floor_at_min_qty() {
        // pip_multiplier below 1 would size wave 0 under the lot minimum
        let math = WaveMath::new(50_000.0, 2.0, 0.4, &SymbolFilters::conservative());
        assert_relative_eq!(math.quantity(0), 1e-5, max_relative = 1e-9);
    }

    #[test]
    fn test_price_underflow_refused() {
        // 90% per wave from a sub-cent entry hits the 6dp floor fast
        let math = WaveMath::new(0.00001, 90.0, 2.0, &SymbolFilters::conservative());
        assert!(math.price(0).is_some());
        assert!(math.price(5).is_none());
        assert!(matches!(
            math.quote(5),
            Err(EngineError::PriceUnderflow { wave_num: 5 })
        ));
    }

    #[test]
    fn test_estimate_total_cost_sums_quotes() {
        let math = btc_math();
        let expected: f64 = (0..3)
            .map(|n| math.quote(n).unwrap().cost())
            .sum();
        assert_relative_eq!(math.estimate_total_cost(3), expected, max_relative = 1e-12);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn params() -> impl Strategy<Value = (f64, f64, f64, u32)> {
            // entry, distance, pip multiplier, step multiple k (min_qty = k * step)
            (
                1.0..50_000.0f64,
                1.0..30.0f64,
                1.0..5.0f64,
                prop::sample::select(vec![1u32, 2, 5, 10]),
            )
        }

        fn math_for(entry: f64, distance: f64, mult: f64, k: u32) -> WaveMath {
            let step = 1e-5;
            let filters = SymbolFilters {
                min_qty: step * k as f64,
                step_size: step,
                max_qty: 1e4,
            };
            WaveMath::new(entry, distance, mult, &filters)
        }

        proptest! {
            #[test]
            fn prop_quotes_are_deterministic((entry, distance, mult, k) in params(), n in 0u32..30) {
                let math = math_for(entry, distance, mult, k);
                let a = math.quote(n).unwrap();
                let b = math.quote(n).unwrap();
                prop_assert_eq!(a, b);
            }

            #[test]
            fn prop_quantity_weakly_increasing((entry, distance, mult, k) in params(), n in 0u32..29) {
                let math = math_for(entry, distance, mult, k);
                prop_assert!(math.quantity(n) <= math.quantity(n + 1) + 1e-12);
            }

            #[test]
            fn prop_price_strictly_decreasing((entry, distance, mult, k) in params(), n in 0u32..29) {
                let math = math_for(entry, distance, mult, k);
                let (p0, p1) = (math.price(n), math.price(n + 1));
                if let (Some(p0), Some(p1)) = (p0, p1) {
                    prop_assert!(p1 < p0, "price({}) = {} !< price({}) = {}", n + 1, p1, n, p0);
                }
            }

            #[test]
            fn prop_quantity_step_aligned((entry, distance, mult, k) in params(), n in 0u32..30) {
                let math = math_for(entry, distance, mult, k);
                let lots = math.quantity(n) / 1e-5;
                prop_assert!((lots - lots.round()).abs() < 1e-9);
            }
        }
    }
}
