//! Solver configuration and numeric constants.
//!
//! Everything here deserializes from JSON with defaults for missing fields,
//! so a config file only needs to name what it changes:
//!
//! ```
//! use hsvi_bounds::config::{SawtoothMode, SolverConfig};
//!
//! let config = SolverConfig::from_json_str(
//!     r#"{ "hsvi": { "error": 0.05 }, "sawtooth": { "mode": "relaxed" } }"#,
//! )
//! .unwrap();
//! assert_eq!(config.hsvi.error, 0.05);
//! assert_eq!(config.sawtooth.mode, SawtoothMode::Relaxed);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// Tolerance used when deciding whether a new value tightens a bound and when
/// comparing hyperplanes for dominance.
pub const DEFAULT_PRECISION: f64 = 1e-9;

/// Resolution at which probability distributions are compared for identity.
pub const PROBABILITY_PRECISION: f64 = 1e-9;

/// Stop extending a discounted sum once the accumulated discount factor
/// drops below this.
pub const INFINITE_HORIZON_TOLERANCE: f64 = 1e-10;

/// Pruning period the hyperplane and sawtooth builders fall back to.
pub const DEFAULT_PRUNING_FREQUENCY: usize = 10;

/// Number of decimals printed when dumping bounds.
pub const VALUE_DECIMAL_PRINT: usize = 4;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HsviConfig {
    /// Label used in logs.
    pub name: String,
    /// Target gap at the root.
    pub error: f64,
    pub max_trials: usize,
    /// Wall-clock budget; `None` runs until convergence or `max_trials`.
    pub time_max_secs: Option<f64>,
    /// CSV file receiving one row per trial.
    pub trial_log: Option<PathBuf>,
}

impl Default for HsviConfig {
    fn default() -> Self {
        Self {
            name: "hsvi".to_string(),
            error: 1e-2,
            max_trials: 10_000,
            time_max_secs: None,
            trial_log: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoundConfig {
    pub precision: f64,
    /// Prune the updated stage every `n` updates; `None` never prunes.
    pub pruning_frequency: Option<usize>,
}

impl Default for BoundConfig {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
            pruning_frequency: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SawtoothMode {
    /// One mixed-integer program over every witness.
    Full,
    /// One program per witness with the big-M forced to zero. Faster, but the
    /// chosen decision rule is not guaranteed to keep the bound sound.
    Relaxed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SawtoothEncoding {
    /// `... + M * omega <= M` with the configured `big_m`.
    BigM,
    /// Implication rows; the backend derives a tight constant from the
    /// variable bounds.
    Indicator,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SawtoothConfig {
    pub mode: SawtoothMode,
    pub encoding: SawtoothEncoding,
    pub big_m: f64,
}

impl Default for SawtoothConfig {
    fn default() -> Self {
        Self {
            mode: SawtoothMode::Full,
            encoding: SawtoothEncoding::Indicator,
            big_m: 1e3,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    pub hsvi: HsviConfig,
    pub lower: BoundConfig,
    pub upper: BoundConfig,
    pub sawtooth: SawtoothConfig,
}

impl SolverConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.hsvi.error > 0.0) {
            return Err(SearchError::Config(format!(
                "error must be positive, got {}",
                self.hsvi.error
            )));
        }
        if self.hsvi.max_trials == 0 {
            return Err(SearchError::Config("max_trials must be at least 1".into()));
        }
        if let Some(limit) = self.hsvi.time_max_secs {
            if !(limit > 0.0) {
                return Err(SearchError::Config(format!(
                    "time_max_secs must be positive, got {limit}"
                )));
            }
        }
        for (label, bound) in [("lower", &self.lower), ("upper", &self.upper)] {
            if !(bound.precision > 0.0) {
                return Err(SearchError::Config(format!(
                    "{label} bound precision must be positive"
                )));
            }
            if bound.pruning_frequency == Some(0) {
                return Err(SearchError::Config(format!(
                    "{label} bound pruning frequency must be at least 1"
                )));
            }
        }
        if self.sawtooth.encoding == SawtoothEncoding::BigM && !(self.sawtooth.big_m > 0.0) {
            return Err(SearchError::Config("big_m must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = SolverConfig::from_json_str("{}").unwrap();
        assert_eq!(config, SolverConfig::default());
    }

    #[test]
    fn nested_fields_override_defaults() {
        let config = SolverConfig::from_json_str(
            r#"{
                "hsvi": { "max_trials": 5, "time_max_secs": 2.5 },
                "upper": { "pruning_frequency": 10 },
                "sawtooth": { "encoding": "big_m", "big_m": 50.0 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.hsvi.max_trials, 5);
        assert_eq!(config.hsvi.time_max_secs, Some(2.5));
        assert_eq!(config.upper.pruning_frequency, Some(10));
        assert_eq!(config.lower.pruning_frequency, None);
        assert_eq!(config.sawtooth.encoding, SawtoothEncoding::BigM);
        assert_eq!(config.sawtooth.big_m, 50.0);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(SolverConfig::from_json_str(r#"{ "hsvi": { "error": 0.0 } }"#).is_err());
        assert!(SolverConfig::from_json_str(r#"{ "hsvi": { "max_trials": 0 } }"#).is_err());
        assert!(SolverConfig::from_json_str(r#"{ "lower": { "pruning_frequency": 0 } }"#).is_err());
        assert!(SolverConfig::from_json_str(r#"{ "hsvi": { "unknown": 1 } }"#).is_err());
    }
}
