//! Volatility regime classifier.
//!
//! Labels each date by the quantile bucket of trailing realized volatility
//! and breaks strategy performance down by label.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use thiserror::Error;

use crate::backtest::BacktestResult;
use crate::data::PriceSeries;
use crate::metrics::{MetricsCalculator, PerformanceStats};

/// Date-keyed realized volatility; `None` while the rolling window fills.
pub type RealizedVol = BTreeMap<NaiveDate, Option<f64>>;

/// Date-keyed regime labels in `1..=quantiles`; `None` is undefined.
pub type RegimeLabels = BTreeMap<NaiveDate, Option<u32>>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegimeError {
    #[error("No regime label for backtest date {0}")]
    Misaligned(NaiveDate),
}

/// Regime classifier configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeClassifierConfig {
    /// Rolling window for realized volatility (bars).
    pub vol_window: usize,
    /// Number of quantile buckets.
    pub quantiles: usize,
    /// Annualization factor.
    pub periods_per_year: f64,
}

impl Default for RegimeClassifierConfig {
    fn default() -> Self {
        Self {
            vol_window: 21, // ~1 month
            quantiles: 4,
            periods_per_year: 252.0,
        }
    }
}

/// Performance of the strategy within one regime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeStats {
    pub regime: u32,
    pub days: usize,
    pub stats: PerformanceStats,
}

/// Volatility regime classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegimeClassifier {
    config: RegimeClassifierConfig,
}

impl RegimeClassifier {
    /// Create a new classifier.
    pub fn new(config: RegimeClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegimeClassifierConfig {
        &self.config
    }

    /// Annualized rolling sample std of close-to-close returns.
    ///
    /// The first return is undefined, so the first `vol_window` dates carry
    /// no value.
    pub fn realized_vol(&self, prices: &PriceSeries) -> RealizedVol {
        let window = self.config.vol_window;
        let scale = self.config.periods_per_year.sqrt();
        let closes = prices.closes();

        let returns: Vec<f64> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| if i == 0 { f64::NAN } else { c / closes[i - 1] - 1.0 })
            .collect();

        prices
            .dates()
            .into_iter()
            .enumerate()
            .map(|(i, date)| {
                let vol = if window > 0 && i >= window {
                    let sd = returns[i + 1 - window..=i].iter().std_dev();
                    sd.is_finite().then_some(sd * scale)
                } else {
                    None
                };
                (date, vol)
            })
            .collect()
    }

    /// Bucket volatility into quantile regimes, 1 = calmest.
    ///
    /// Edges are the linear-interpolated quantiles of the defined values.
    /// Bins are right-closed with the lowest edge included. Tied edges are
    /// collapsed, which yields fewer buckets; with fewer than two distinct
    /// edges every label is undefined.
    pub fn regime_labels(&self, vol: &RealizedVol) -> RegimeLabels {
        let mut defined: Vec<f64> = vol
            .values()
            .filter_map(|v| *v)
            .filter(|v| v.is_finite())
            .collect();
        defined.sort_by(|a, b| a.total_cmp(b));

        let mut edges: Vec<f64> = (0..=self.config.quantiles)
            .filter_map(|k| quantile(&defined, k as f64 / self.config.quantiles as f64))
            .collect();
        edges.dedup();

        vol.iter()
            .map(|(&date, v)| {
                let label = match v {
                    Some(x) if edges.len() >= 2 => bucket(&edges, *x),
                    _ => None,
                };
                (date, label)
            })
            .collect()
    }

    /// Realized volatility and regime labels in one step.
    pub fn classify(&self, prices: &PriceSeries) -> RegimeLabels {
        self.regime_labels(&self.realized_vol(prices))
    }

    /// Strategy statistics per regime label, ascending by label.
    ///
    /// Every backtest date must have an entry in `labels`. Rows with an
    /// undefined label or a non-finite strategy return are ignored.
    pub fn performance_by_regime(
        &self,
        backtest: &BacktestResult,
        labels: &RegimeLabels,
    ) -> Result<Vec<RegimeStats>, RegimeError> {
        let mut groups: BTreeMap<u32, Vec<f64>> = BTreeMap::new();

        for row in &backtest.rows {
            let label = labels
                .get(&row.date)
                .ok_or(RegimeError::Misaligned(row.date))?;
            if let Some(regime) = label {
                if row.strategy_return.is_finite() {
                    groups.entry(*regime).or_default().push(row.strategy_return);
                }
            }
        }

        Ok(groups
            .into_iter()
            .map(|(regime, returns)| RegimeStats {
                regime,
                days: returns.len(),
                stats: MetricsCalculator::perf_stats(&returns, self.config.periods_per_year),
            })
            .collect())
    }

    /// Number of dates per defined label.
    pub fn regime_distribution(labels: &RegimeLabels) -> BTreeMap<u32, usize> {
        let mut counts = BTreeMap::new();
        for regime in labels.values().flatten() {
            *counts.entry(*regime).or_insert(0) += 1;
        }
        counts
    }
}

/// Linear-interpolated quantile of sorted data.
fn quantile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// 1-based bucket of `x` within ascending `edges`.
fn bucket(edges: &[f64], x: f64) -> Option<u32> {
    let (first, last) = (edges[0], edges[edges.len() - 1]);
    if x < first || x > last {
        return None;
    }
    let idx = edges.partition_point(|&e| e < x).max(1);
    Some(idx as u32)
}
