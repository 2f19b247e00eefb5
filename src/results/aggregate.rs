//! Multi-ticker aggregate runner.
//!
//! Drives the walk-forward engine for each ticker in a universe. A ticker
//! whose data cannot be loaded is skipped; the run only fails when no
//! ticker produces a summary.

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use crate::backtest::ExecutionMode;
use crate::config::RunConfig;
use crate::data::PriceProvider;
use crate::walkforward::{WalkForwardOptimizer, WalkForwardResult};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregateError {
    #[error("No summaries produced")]
    NoSummaries,
}

/// Walk-forward result tagged with its ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerResult {
    pub ticker: String,
    /// Number of bars the engine ran over.
    pub bars: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub result: WalkForwardResult,
}

/// Outcome of a universe run.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    pub execution: ExecutionMode,
    /// Tickers that produced a summary, in input order.
    pub tickers: Vec<TickerResult>,
    /// Tickers that were skipped, with the reason.
    pub skipped: Vec<(String, String)>,
}

impl AggregateResult {
    /// Total folds across all tickers.
    pub fn fold_count(&self) -> usize {
        self.tickers.iter().map(|t| t.result.folds.len()).sum()
    }

    pub fn failed_fold_count(&self) -> usize {
        self.tickers.iter().map(|t| t.result.failure_count()).sum()
    }

    pub fn get(&self, ticker: &str) -> Option<&TickerResult> {
        self.tickers.iter().find(|t| t.ticker == ticker)
    }

    /// Get summary string.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Aggregate Results ({} execution)\n\
             ================================\n\
             Tickers: {} ({} skipped)\n\
             Folds: {} ({} failed)\n",
            self.execution,
            self.tickers.len(),
            self.skipped.len(),
            self.fold_count(),
            self.failed_fold_count(),
        );
        for t in &self.tickers {
            out.push_str(&format!(
                "  {:<6} {:>3} folds  mean OOS return {:>7.2}%\n",
                t.ticker,
                t.result.folds.len(),
                t.result.mean_test_ann_return() * 100.0
            ));
        }
        for (ticker, reason) in &self.skipped {
            out.push_str(&format!("  {:<6} skipped: {}\n", ticker, reason));
        }
        out
    }
}

/// Runs the walk-forward engine across a universe.
pub struct AggregateRunner {
    config: RunConfig,
}

impl AggregateRunner {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    fn optimizer(&self) -> WalkForwardOptimizer {
        WalkForwardOptimizer::new(self.config.walkforward.clone())
            .with_backtest_config(self.config.backtest)
            .with_regime_config(self.config.regime)
    }

    /// Run every ticker. `on_done` is called once per ticker, processed or skipped.
    pub fn run<P, F>(
        &self,
        provider: &P,
        tickers: &[String],
        mut on_done: F,
    ) -> Result<AggregateResult, AggregateError>
    where
        P: PriceProvider + ?Sized,
        F: FnMut(&str),
    {
        let optimizer = self.optimizer();
        let mut processed = Vec::new();
        let mut skipped = Vec::new();

        for ticker in tickers {
            match provider.fetch(ticker, self.config.start) {
                Ok(prices) => {
                    info!(
                        "{}: {} bars from {} to {}",
                        ticker,
                        prices.len(),
                        prices.first_date().map(|d| d.to_string()).unwrap_or_default(),
                        prices.last_date().map(|d| d.to_string()).unwrap_or_default()
                    );
                    let result = optimizer.run(&prices);
                    processed.push(TickerResult {
                        ticker: ticker.clone(),
                        bars: prices.len(),
                        first_date: prices.first_date(),
                        last_date: prices.last_date(),
                        result,
                    });
                }
                Err(e) => {
                    warn!("{} failed: {}", ticker, e);
                    skipped.push((ticker.clone(), e.to_string()));
                }
            }
            on_done(ticker);
        }

        if processed.is_empty() {
            return Err(AggregateError::NoSummaries);
        }

        Ok(AggregateResult {
            execution: self.config.backtest.execution,
            tickers: processed,
            skipped,
        })
    }
}
