//! Process-wide engine configuration.
//!
//! Runtime knobs only; everything strategy-specific lives on the session
//! parameters. Loadable from JSON (serde) with per-field defaults so an
//! empty `{}` yields a working paper-trading setup.

use crate::core::{EngineError, Result, SymbolFilters};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// One pip of quantity is `pip_multiplier * min_qty`.
    #[serde(default = "default_pip_multiplier")]
    pub pip_multiplier: f64,

    /// SQLite connection string / path for the session store.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Fallback lot minimum when the exchange-info oracle is unavailable.
    #[serde(default = "default_min_qty")]
    pub default_min_qty: f64,

    /// Fallback quantity step when the exchange-info oracle is unavailable.
    #[serde(default = "default_step_size")]
    pub default_step_size: f64,

    /// Fallback lot maximum when the exchange-info oracle is unavailable.
    #[serde(default = "default_max_qty")]
    pub default_max_qty: f64,
}

fn default_pip_multiplier() -> f64 {
    2.0
}

fn default_database_url() -> String {
    "data/pyra.db".to_string()
}

fn default_min_qty() -> f64 {
    1e-5
}

fn default_step_size() -> f64 {
    1e-5
}

fn default_max_qty() -> f64 {
    1e4
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pip_multiplier: default_pip_multiplier(),
            database_url: default_database_url(),
            default_min_qty: default_min_qty(),
            default_step_size: default_step_size(),
            default_max_qty: default_max_qty(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pip_multiplier <= 0.0 || !self.pip_multiplier.is_finite() {
            return Err(EngineError::InvalidParameter {
                field: "pip_multiplier",
                reason: format!("must be a positive number: {}", self.pip_multiplier),
            });
        }
        if self.default_min_qty <= 0.0 {
            return Err(EngineError::InvalidParameter {
                field: "default_min_qty",
                reason: format!("must be positive: {}", self.default_min_qty),
            });
        }
        if self.default_step_size <= 0.0 {
            return Err(EngineError::InvalidParameter {
                field: "default_step_size",
                reason: format!("must be positive: {}", self.default_step_size),
            });
        }
        if self.default_max_qty <= self.default_min_qty {
            return Err(EngineError::InvalidParameter {
                field: "default_max_qty",
                reason: format!(
                    "must exceed default_min_qty: {} <= {}",
                    self.default_max_qty, self.default_min_qty
                ),
            });
        }
        Ok(())
    }

    /// Filters used when the oracle cannot answer for a symbol.
    pub fn fallback_filters(&self) -> SymbolFilters {
        SymbolFilters {
            min_qty: self.default_min_qty,
            step_size: self.default_step_size,
            max_qty: self.default_max_qty,
        }
    }
}
