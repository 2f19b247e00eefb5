//! Walk-forward parameter optimization.
//!
//! Performs a grid search over (fast, slow) EMA spans on each training
//! window and evaluates the winner on the following test window.

use std::collections::HashMap;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backtest::{BacktestConfig, BacktestEngine, BacktestResult};
use crate::data::PriceSeries;
use crate::metrics::{MetricsCalculator, PerformanceStats, DEFAULT_PERIODS_PER_YEAR};
use crate::regime::{RegimeClassifier, RegimeClassifierConfig, RegimeError};
use crate::signals::make_signals;

use super::periods::{rolling_splits, Fold};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalkForwardError {
    #[error("No valid parameter combination found in grid")]
    NoValidParameters,

    #[error("No price data between {start} and {end}")]
    EmptyWindow { start: NaiveDate, end: NaiveDate },

    #[error("Regime breakdown failed: {0}")]
    Regime(#[from] RegimeError),
}

/// A single (fast, slow) parameter pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterSet {
    pub fast: usize,
    pub slow: usize,
}

impl ParameterSet {
    pub fn new(fast: usize, slow: usize) -> Self {
        Self { fast, slow }
    }

    /// A pair is searched only when the slow span exceeds the fast span.
    pub fn is_valid(&self) -> bool {
        self.slow > self.fast
    }

    /// Create a unique key for this parameter set.
    pub fn key(&self) -> String {
        format!("ema{}-{}", self.fast, self.slow)
    }
}

/// Ordered list of parameter pairs to sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterGrid {
    pub pairs: Vec<ParameterSet>,
}

impl Default for ParameterGrid {
    fn default() -> Self {
        let fast: Vec<usize> = (5..=30).step_by(5).collect();
        let slow: Vec<usize> = (10..=60).step_by(5).collect();
        Self::from_ranges(&fast, &slow)
    }
}

impl ParameterGrid {
    /// Cartesian product in fast-major order. Invalid pairs are kept and
    /// skipped at search time.
    pub fn from_ranges(fast: &[usize], slow: &[usize]) -> Self {
        let pairs = fast
            .iter()
            .flat_map(|&f| slow.iter().map(move |&s| ParameterSet::new(f, s)))
            .collect();
        Self { pairs }
    }

    /// Grid with one pair.
    pub fn single(fast: usize, slow: usize) -> Self {
        Self {
            pairs: vec![ParameterSet::new(fast, slow)],
        }
    }

    /// Calculate total number of parameter combinations.
    pub fn total_combinations(&self) -> usize {
        self.pairs.len()
    }

    /// Pairs with `slow > fast`, in grid order.
    pub fn eligible(&self) -> Vec<ParameterSet> {
        self.pairs.iter().copied().filter(ParameterSet::is_valid).collect()
    }
}

/// Walk-forward settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    /// Training window length in years.
    pub train_years: u32,
    /// Test window length in years; also the roll step.
    pub test_years: u32,
    /// Annualization factor.
    pub periods_per_year: f64,
    /// Attach a volatility-regime breakdown to each fold.
    pub compute_regimes: bool,
    /// Parameter pairs to search.
    pub grid: ParameterGrid,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            train_years: 7,
            test_years: 3,
            periods_per_year: DEFAULT_PERIODS_PER_YEAR,
            compute_regimes: true,
            grid: ParameterGrid::default(),
        }
    }
}

/// Outcome of the training-window search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSearchResult {
    pub best: ParameterSet,
    pub train_stats: PerformanceStats,
    /// Number of eligible pairs evaluated.
    pub evaluated: usize,
}

/// Selected parameters and their train/test performance for one fold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoldSummary {
    pub fold: Fold,
    pub params: ParameterSet,
    pub train_ann_return: f64,
    pub test_ann_return: f64,
    pub test_sharpe: f64,
    pub test_max_dd: f64,
}

/// Result of one fold: a summary, or the reason it failed.
#[derive(Debug, Clone, PartialEq)]
pub enum FoldOutcome {
    Success(FoldSummary),
    Failure { fold: Fold, reason: String },
}

impl FoldOutcome {
    pub fn fold(&self) -> &Fold {
        match self {
            Self::Success(summary) => &summary.fold,
            Self::Failure { fold, .. } => fold,
        }
    }

    pub fn summary(&self) -> Option<&FoldSummary> {
        match self {
            Self::Success(summary) => Some(summary),
            Self::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure { reason, .. } => Some(reason),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Test-window performance within one volatility regime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeRow {
    pub fold: Fold,
    pub params: ParameterSet,
    pub regime: u32,
    pub stats: PerformanceStats,
}

/// Complete walk-forward result for one instrument.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalkForwardResult {
    /// One outcome per fold, in fold order.
    pub folds: Vec<FoldOutcome>,
    /// Regime breakdown rows; `None` when regimes were not requested.
    pub regimes: Option<Vec<RegimeRow>>,
}

impl WalkForwardResult {
    pub fn summaries(&self) -> impl Iterator<Item = &FoldSummary> {
        self.folds.iter().filter_map(FoldOutcome::summary)
    }

    pub fn failure_count(&self) -> usize {
        self.folds.iter().filter(|f| !f.is_success()).count()
    }

    /// Mean test annualized return over folds where it is defined.
    pub fn mean_test_ann_return(&self) -> f64 {
        mean(self.summaries().map(|s| s.test_ann_return))
    }

    /// Mean test Sharpe ratio over folds where it is defined.
    pub fn avg_test_sharpe(&self) -> f64 {
        mean(self.summaries().map(|s| s.test_sharpe))
    }

    /// Most frequently selected parameters; ties go to the earliest fold.
    pub fn consensus_params(&self) -> Option<ParameterSet> {
        let mut counts: HashMap<ParameterSet, (usize, usize)> = HashMap::new();
        for (order, summary) in self.summaries().enumerate() {
            counts.entry(summary.params).or_insert((0, order)).0 += 1;
        }
        counts
            .into_iter()
            .max_by(|(_, (ca, oa)), (_, (cb, ob))| ca.cmp(cb).then(ob.cmp(oa)))
            .map(|(params, _)| params)
    }

    /// Get summary string.
    pub fn summary(&self) -> String {
        let consensus = self
            .consensus_params()
            .map(|p| p.key())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "Walk-Forward Results: {} folds ({} failed)\n\
             Mean Test Return: {:.2}%\n\
             Avg Test Sharpe: {:.2}\n\
             Consensus Params: {}",
            self.folds.len(),
            self.failure_count(),
            self.mean_test_ann_return() * 100.0,
            self.avg_test_sharpe(),
            consensus,
        )
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let defined: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    if defined.is_empty() {
        return f64::NAN;
    }
    defined.iter().sum::<f64>() / defined.len() as f64
}

/// Walk-forward optimizer.
#[derive(Debug, Clone, Default)]
pub struct WalkForwardOptimizer {
    config: WalkForwardConfig,
    backtest: BacktestConfig,
    regime: RegimeClassifierConfig,
}

impl WalkForwardOptimizer {
    /// Create a new optimizer.
    pub fn new(config: WalkForwardConfig) -> Self {
        Self {
            config,
            backtest: BacktestConfig::default(),
            regime: RegimeClassifierConfig::default(),
        }
    }

    /// Set backtest configuration.
    pub fn with_backtest_config(mut self, config: BacktestConfig) -> Self {
        self.backtest = config;
        self
    }

    /// Set regime classifier configuration.
    pub fn with_regime_config(mut self, config: RegimeClassifierConfig) -> Self {
        self.regime = config;
        self
    }

    pub fn config(&self) -> &WalkForwardConfig {
        &self.config
    }

    /// Signals and backtest for one parameter pair over a price window.
    fn backtest(&self, prices: &PriceSeries, params: ParameterSet) -> BacktestResult {
        let signals = make_signals(prices, params.fast, params.slow);
        BacktestEngine::new(self.backtest).run(&signals)
    }

    /// Pick the pair with the highest training annualized return.
    ///
    /// A pair wins only with a strictly greater return than every earlier
    /// pair, so ties go to grid order. Undefined returns never win, and a
    /// window where every return is undefined fails with `NoValidParameters`.
    pub fn grid_search(
        &self,
        prices: &PriceSeries,
        train_start: NaiveDate,
        train_end: NaiveDate,
    ) -> Result<GridSearchResult, WalkForwardError> {
        let candidates = self.config.grid.eligible();
        if candidates.is_empty() {
            return Err(WalkForwardError::NoValidParameters);
        }

        let window = prices.window(train_start, train_end);
        if window.is_empty() {
            return Err(WalkForwardError::EmptyWindow {
                start: train_start,
                end: train_end,
            });
        }

        let ppy = self.config.periods_per_year;
        let results: Vec<(ParameterSet, PerformanceStats)> = candidates
            .par_iter()
            .map(|&params| {
                let bt = self.backtest(&window, params);
                (params, MetricsCalculator::from_backtest(&bt, ppy))
            })
            .collect();

        // Undefined returns never win; the winner must be strictly greatest
        let mut chosen: Option<(ParameterSet, PerformanceStats)> = None;
        let mut best_score = f64::NEG_INFINITY;
        for (params, stats) in results {
            if stats.ann_return > best_score {
                best_score = stats.ann_return;
                chosen = Some((params, stats));
            }
        }
        let (best, train_stats) = chosen.ok_or(WalkForwardError::NoValidParameters)?;

        debug!(
            "Grid search {} to {}: {} pairs, best {} ({:.4})",
            train_start,
            train_end,
            candidates.len(),
            best.key(),
            train_stats.ann_return
        );

        Ok(GridSearchResult {
            best,
            train_stats,
            evaluated: candidates.len(),
        })
    }

    /// Backtest fixed parameters on the test window.
    ///
    /// Signals are rebuilt from the test-window prices alone. A window with
    /// no bars gives an empty backtest and undefined statistics.
    pub fn evaluate(
        &self,
        prices: &PriceSeries,
        params: ParameterSet,
        test_start: NaiveDate,
        test_end: NaiveDate,
    ) -> Result<(PerformanceStats, BacktestResult), WalkForwardError> {
        let window = prices.window(test_start, test_end);
        if window.is_empty() {
            debug!("No test bars between {} and {}", test_start, test_end);
        }

        let bt = self.backtest(&window, params);
        let stats = MetricsCalculator::from_backtest(&bt, self.config.periods_per_year);
        Ok((stats, bt))
    }

    /// Search and evaluate a single fold.
    pub fn run_fold(
        &self,
        prices: &PriceSeries,
        fold: &Fold,
    ) -> Result<(FoldSummary, BacktestResult), WalkForwardError> {
        let search = self.grid_search(prices, fold.train_start, fold.train_end)?;
        let (test_stats, bt) = self.evaluate(prices, search.best, fold.test_start, fold.test_end)?;

        let summary = FoldSummary {
            fold: *fold,
            params: search.best,
            train_ann_return: search.train_stats.ann_return,
            test_ann_return: test_stats.ann_return,
            test_sharpe: test_stats.sharpe,
            test_max_dd: test_stats.max_drawdown,
        };
        Ok((summary, bt))
    }

    /// Regime breakdown of a fold's test backtest.
    pub fn regime_rows(
        &self,
        prices: &PriceSeries,
        summary: &FoldSummary,
        test_backtest: &BacktestResult,
    ) -> Result<Vec<RegimeRow>, WalkForwardError> {
        let fold = summary.fold;
        let window = prices.window(fold.test_start, fold.test_end);
        let classifier = RegimeClassifier::new(self.regime);
        let labels = classifier.classify(&window);
        debug!(
            "Fold {}: regime day counts {:?}",
            fold.index + 1,
            RegimeClassifier::regime_distribution(&labels)
        );
        let by_regime = classifier.performance_by_regime(test_backtest, &labels)?;

        Ok(by_regime
            .into_iter()
            .map(|r| RegimeRow {
                fold,
                params: summary.params,
                regime: r.regime,
                stats: r.stats,
            })
            .collect())
    }

    /// Run every fold over the full price history.
    ///
    /// A failing fold is recorded and the remaining folds still run.
    pub fn run(&self, prices: &PriceSeries) -> WalkForwardResult {
        let folds = rolling_splits(&prices.dates(), self.config.train_years, self.config.test_years);
        info!(
            "Generated {} walk-forward folds ({}y train / {}y test)",
            folds.len(),
            self.config.train_years,
            self.config.test_years
        );

        let mut outcomes = Vec::with_capacity(folds.len());
        let mut regimes = self.config.compute_regimes.then(Vec::new);

        for fold in &folds {
            info!(
                "Processing fold {}/{}: train {} to {}, test {} to {}",
                fold.index + 1,
                folds.len(),
                fold.train_start,
                fold.train_end,
                fold.test_start,
                fold.test_end
            );

            match self.run_fold(prices, fold) {
                Ok((summary, bt)) => {
                    info!(
                        "  Fold {}/{} complete: best params = {}, test return = {:.2}%",
                        fold.index + 1,
                        folds.len(),
                        summary.params.key(),
                        summary.test_ann_return * 100.0
                    );

                    if let Some(rows) = regimes.as_mut() {
                        match self.regime_rows(prices, &summary, &bt) {
                            Ok(fold_rows) => rows.extend(fold_rows),
                            Err(e) => warn!("  Fold {}: dropping regime rows: {}", fold.index + 1, e),
                        }
                    }

                    outcomes.push(FoldOutcome::Success(summary));
                }
                Err(e) => {
                    warn!("  Fold {} failed: {}", fold.index + 1, e);
                    outcomes.push(FoldOutcome::Failure {
                        fold: *fold,
                        reason: e.to_string(),
                    });
                }
            }
        }

        WalkForwardResult {
            folds: outcomes,
            regimes,
        }
    }
}
