//! Run configuration.
//!
//! A `RunConfig` is built once per run (defaults, then an optional JSON file,
//! then command-line overrides) and passed down to every component.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backtest::BacktestConfig;
use crate::regime::RegimeClassifierConfig;
use crate::walkforward::WalkForwardConfig;

/// Default universe.
pub const DEFAULT_TICKERS: &[&str] = &["SPY", "QQQ", "IWM", "TLT", "GLD"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Everything a run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Instruments to evaluate.
    pub tickers: Vec<String>,
    /// Earliest date of price history to use.
    pub start: NaiveDate,
    /// Directory with one price file per ticker.
    pub data_dir: String,
    /// Directory for result tables.
    pub output_dir: String,
    pub backtest: BacktestConfig,
    pub walkforward: WalkForwardConfig,
    pub regime: RegimeClassifierConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tickers: DEFAULT_TICKERS.iter().map(|t| t.to_string()).collect(),
            start: NaiveDate::from_ymd_opt(2012, 1, 1).unwrap_or_default(),
            data_dir: "data".to_string(),
            output_dir: "results".to_string(),
            backtest: BacktestConfig::default(),
            walkforward: WalkForwardConfig::default(),
            regime: RegimeClassifierConfig::default(),
        }
    }
}

impl RunConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write as pretty JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject settings no run could succeed with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.tickers.is_empty() {
            return invalid("ticker list is empty");
        }
        if self.walkforward.train_years == 0 || self.walkforward.test_years == 0 {
            return invalid("train_years and test_years must be positive");
        }
        if !positive(self.walkforward.periods_per_year) {
            return invalid("periods_per_year must be positive");
        }
        if self.walkforward.grid.pairs.is_empty() {
            return invalid("parameter grid is empty");
        }
        if self.walkforward.grid.pairs.iter().any(|p| p.fast == 0 || p.slow == 0) {
            return invalid("EMA spans must be positive");
        }

        let fee = self.backtest.commission.fee_bps;
        let slip = self.backtest.slippage.slippage_bps;
        if !(fee.is_finite() && fee >= 0.0) {
            return invalid("fee_bps must be a non-negative number");
        }
        if !(slip.is_finite() && slip >= 0.0) {
            return invalid("slippage_bps must be a non-negative number");
        }

        if self.regime.quantiles < 1 {
            return invalid("regime quantiles must be at least 1");
        }
        if self.regime.vol_window < 2 {
            return invalid("vol_window must be at least 2");
        }
        if !positive(self.regime.periods_per_year) {
            return invalid("regime periods_per_year must be positive");
        }

        Ok(())
    }
}

fn positive(x: f64) -> bool {
    x.is_finite() && x > 0.0
}

/// Split a comma-separated ticker list, trimming and uppercasing.
pub fn parse_tickers(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_uppercase)
        .collect()
}
