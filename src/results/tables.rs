//! Tabular export of walk-forward results.
//!
//! Results are laid out as polars DataFrames and written as CSV:
//! - `summary_{ticker}_{execution}.csv`, `summary_all_{execution}.csv`
//! - `regimes_{ticker}_{execution}.csv`, `regimes_all_{execution}.csv`
//! - `aggregate_oos_returns.csv`, `regime_summary_{execution}.csv`
//! - `run_manifest.json`
//!
//! Undefined statistics are written as empty cells.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::backtest::{BacktestResult, ExecutionMode};
use crate::config::RunConfig;
use crate::walkforward::{Fold, WalkForwardResult};

use super::aggregate::{AggregateResult, TickerResult};

#[derive(Error, Debug)]
pub enum ResultsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A walk-forward result, optionally tagged with its ticker.
pub type TableEntry<'a> = (Option<&'a str>, &'a WalkForwardResult);

fn defined(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

fn date_str(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Fold bound columns shared by the summary and regime tables.
#[derive(Default)]
struct FoldColumns {
    train_start: Vec<String>,
    train_end: Vec<String>,
    test_start: Vec<String>,
    test_end: Vec<String>,
}

impl FoldColumns {
    fn push(&mut self, fold: &Fold) {
        self.train_start.push(date_str(fold.train_start));
        self.train_end.push(date_str(fold.train_end));
        self.test_start.push(date_str(fold.test_start));
        self.test_end.push(date_str(fold.test_end));
    }

    fn into_columns(self) -> Vec<Column> {
        vec![
            Column::new("train_start".into(), self.train_start),
            Column::new("train_end".into(), self.train_end),
            Column::new("test_start".into(), self.test_start),
            Column::new("test_end".into(), self.test_end),
        ]
    }
}

/// One row per fold: bounds, selected parameters, train/test statistics.
///
/// The `ticker` column is present when any entry is tagged; the `error`
/// column when any fold failed.
pub fn summary_frame(entries: &[TableEntry<'_>]) -> PolarsResult<DataFrame> {
    let tagged = entries.iter().any(|(t, _)| t.is_some());
    let mut ticker = Vec::new();
    let mut bounds = FoldColumns::default();
    let mut best_fast: Vec<Option<u32>> = Vec::new();
    let mut best_slow: Vec<Option<u32>> = Vec::new();
    let mut train_ann_return = Vec::new();
    let mut test_ann_return = Vec::new();
    let mut test_sharpe = Vec::new();
    let mut test_max_dd = Vec::new();
    let mut error: Vec<Option<String>> = Vec::new();

    for (tag, result) in entries {
        for outcome in &result.folds {
            ticker.push(tag.unwrap_or_default().to_string());
            bounds.push(outcome.fold());
            match outcome.summary() {
                Some(s) => {
                    best_fast.push(Some(s.params.fast as u32));
                    best_slow.push(Some(s.params.slow as u32));
                    train_ann_return.push(defined(s.train_ann_return));
                    test_ann_return.push(defined(s.test_ann_return));
                    test_sharpe.push(defined(s.test_sharpe));
                    test_max_dd.push(defined(s.test_max_dd));
                }
                None => {
                    best_fast.push(None);
                    best_slow.push(None);
                    train_ann_return.push(None);
                    test_ann_return.push(None);
                    test_sharpe.push(None);
                    test_max_dd.push(None);
                }
            }
            error.push(outcome.error().map(str::to_string));
        }
    }

    let mut columns = Vec::new();
    if tagged {
        columns.push(Column::new("ticker".into(), ticker));
    }
    columns.extend(bounds.into_columns());
    columns.push(Column::new("best_fast".into(), best_fast));
    columns.push(Column::new("best_slow".into(), best_slow));
    columns.push(Column::new("train_ann_return".into(), train_ann_return));
    columns.push(Column::new("test_ann_return".into(), test_ann_return));
    columns.push(Column::new("test_sharpe".into(), test_sharpe));
    columns.push(Column::new("test_max_dd".into(), test_max_dd));
    if error.iter().any(Option::is_some) {
        columns.push(Column::new("error".into(), error));
    }

    DataFrame::new(columns)
}

/// One row per (fold, regime) of the test-window breakdown.
pub fn regime_frame(entries: &[TableEntry<'_>]) -> PolarsResult<DataFrame> {
    let tagged = entries.iter().any(|(t, _)| t.is_some());
    let mut ticker = Vec::new();
    let mut bounds = FoldColumns::default();
    let mut best_fast: Vec<u32> = Vec::new();
    let mut best_slow: Vec<u32> = Vec::new();
    let mut regime: Vec<u32> = Vec::new();
    let mut ann_return = Vec::new();
    let mut ann_vol = Vec::new();
    let mut sharpe = Vec::new();
    let mut max_drawdown = Vec::new();

    for (tag, result) in entries {
        for row in result.regimes.iter().flatten() {
            ticker.push(tag.unwrap_or_default().to_string());
            bounds.push(&row.fold);
            best_fast.push(row.params.fast as u32);
            best_slow.push(row.params.slow as u32);
            regime.push(row.regime);
            ann_return.push(defined(row.stats.ann_return));
            ann_vol.push(defined(row.stats.ann_vol));
            sharpe.push(defined(row.stats.sharpe));
            max_drawdown.push(defined(row.stats.max_drawdown));
        }
    }

    let mut columns = Vec::new();
    if tagged {
        columns.push(Column::new("ticker".into(), ticker));
    }
    columns.extend(bounds.into_columns());
    columns.push(Column::new("best_fast".into(), best_fast));
    columns.push(Column::new("best_slow".into(), best_slow));
    columns.push(Column::new("regime".into(), regime));
    columns.push(Column::new("ann_return".into(), ann_return));
    columns.push(Column::new("ann_vol".into(), ann_vol));
    columns.push(Column::new("sharpe".into(), sharpe));
    columns.push(Column::new("max_drawdown".into(), max_drawdown));

    DataFrame::new(columns)
}

/// Mean out-of-sample annualized return per ticker, best first.
pub fn aggregate_oos_frame(summary: &DataFrame) -> PolarsResult<DataFrame> {
    summary
        .clone()
        .lazy()
        .group_by_stable([col("ticker")])
        .agg([
            col("test_ann_return").mean().alias("mean_test_ann_return"),
            col("test_ann_return").count().alias("folds"),
        ])
        .sort(
            ["mean_test_ann_return"],
            SortMultipleOptions::default()
                .with_order_descending(true)
                .with_nulls_last(true)
                .with_maintain_order(true),
        )
        .collect()
}

/// Mean, std and count of the regime annualized return, by regime label.
pub fn regime_summary_frame(regimes: &DataFrame) -> PolarsResult<DataFrame> {
    regimes
        .clone()
        .lazy()
        .group_by([col("regime")])
        .agg([
            col("ann_return").mean().alias("mean_ann_return"),
            col("ann_return").std(1).alias("std_ann_return"),
            col("ann_return").count().alias("count"),
        ])
        .sort(["regime"], SortMultipleOptions::default())
        .collect()
}

/// Per-bar equity of a single backtest against buy-and-hold.
pub fn equity_frame(result: &BacktestResult) -> PolarsResult<DataFrame> {
    let rows = &result.rows;
    DataFrame::new(vec![
        Column::new("date".into(), rows.iter().map(|r| date_str(r.date)).collect::<Vec<_>>()),
        Column::new("position".into(), rows.iter().map(|r| r.position as u32).collect::<Vec<_>>()),
        Column::new("strategy_return".into(), rows.iter().map(|r| r.strategy_return).collect::<Vec<_>>()),
        Column::new("equity".into(), rows.iter().map(|r| r.equity).collect::<Vec<_>>()),
        Column::new("buy_hold".into(), rows.iter().map(|r| r.buy_hold_equity).collect::<Vec<_>>()),
    ])
}

/// Write a DataFrame as CSV with a header row.
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<(), ResultsError> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

#[derive(Serialize)]
struct SkippedTicker<'a> {
    ticker: &'a str,
    reason: &'a str,
}

#[derive(Serialize)]
struct RunManifest<'a> {
    generated_at: String,
    execution: ExecutionMode,
    config: &'a RunConfig,
    tickers: Vec<&'a str>,
    skipped: Vec<SkippedTicker<'a>>,
    folds: usize,
    failed_folds: usize,
    files: Vec<String>,
}

/// Writes result tables into an output directory.
pub struct ResultsWriter {
    output_dir: PathBuf,
    execution: ExecutionMode,
}

impl ResultsWriter {
    pub fn new<P: AsRef<Path>>(output_dir: P, execution: ExecutionMode) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            execution,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }

    /// `summary_{ticker}_{execution}.csv` and, when regimes were computed,
    /// `regimes_{ticker}_{execution}.csv`.
    pub fn write_ticker(&self, ticker: &TickerResult) -> Result<Vec<PathBuf>, ResultsError> {
        fs::create_dir_all(&self.output_dir)?;
        let entries = [(Some(ticker.ticker.as_str()), &ticker.result)];
        let mut written = Vec::new();

        let path = self.path(&format!("summary_{}_{}.csv", ticker.ticker, self.execution));
        write_csv(&mut summary_frame(&entries)?, &path)?;
        written.push(path);

        if ticker.result.regimes.is_some() {
            let path = self.path(&format!("regimes_{}_{}.csv", ticker.ticker, self.execution));
            write_csv(&mut regime_frame(&entries)?, &path)?;
            written.push(path);
        }

        Ok(written)
    }

    /// Write every table for a universe run. Returns the files written.
    ///
    /// The concatenated summary and regime tables are required; per-ticker
    /// tables, derived tables and the manifest are logged and skipped on error.
    pub fn write_all(
        &self,
        result: &AggregateResult,
        config: &RunConfig,
    ) -> Result<Vec<PathBuf>, ResultsError> {
        fs::create_dir_all(&self.output_dir)?;
        let mut written = Vec::new();

        for ticker in &result.tickers {
            match self.write_ticker(ticker) {
                Ok(paths) => written.extend(paths),
                Err(e) => warn!("{}: could not write tables: {}", ticker.ticker, e),
            }
        }

        let entries: Vec<TableEntry<'_>> = result
            .tickers
            .iter()
            .map(|t| (Some(t.ticker.as_str()), &t.result))
            .collect();

        let mut summary = summary_frame(&entries)?;
        let path = self.path(&format!("summary_all_{}.csv", self.execution));
        write_csv(&mut summary, &path)?;
        written.push(path);

        let path = self.path("aggregate_oos_returns.csv");
        let oos = aggregate_oos_frame(&summary)
            .map_err(ResultsError::from)
            .and_then(|mut df| write_csv(&mut df, &path));
        match oos {
            Ok(()) => written.push(path),
            Err(e) => warn!("Could not write aggregate OOS table: {}", e),
        }

        let with_regimes = result.tickers.iter().any(|t| t.result.regimes.is_some());
        if with_regimes {
            let mut regimes = regime_frame(&entries)?;
            let path = self.path(&format!("regimes_all_{}.csv", self.execution));
            write_csv(&mut regimes, &path)?;
            written.push(path);

            let path = self.path(&format!("regime_summary_{}.csv", self.execution));
            let by_regime = regime_summary_frame(&regimes)
                .map_err(ResultsError::from)
                .and_then(|mut df| write_csv(&mut df, &path));
            match by_regime {
                Ok(()) => written.push(path),
                Err(e) => warn!("Could not write regime summary: {}", e),
            }
        }

        let path = self.path("run_manifest.json");
        match self.write_manifest(result, config, &written, &path) {
            Ok(()) => written.push(path),
            Err(e) => warn!("Could not write run manifest: {}", e),
        }

        info!("Wrote {} files to {}", written.len(), self.output_dir.display());
        Ok(written)
    }

    fn write_manifest(
        &self,
        result: &AggregateResult,
        config: &RunConfig,
        written: &[PathBuf],
        path: &Path,
    ) -> Result<(), ResultsError> {
        let manifest = RunManifest {
            generated_at: Utc::now().to_rfc3339(),
            execution: self.execution,
            config,
            tickers: result.tickers.iter().map(|t| t.ticker.as_str()).collect(),
            skipped: result
                .skipped
                .iter()
                .map(|(ticker, reason)| SkippedTicker { ticker, reason })
                .collect(),
            folds: result.fold_count(),
            failed_folds: result.failed_fold_count(),
            files: written
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect(),
        };
        fs::write(path, serde_json::to_string_pretty(&manifest)?)?;
        Ok(())
    }

    /// `equity_{ticker}_{execution}.csv` for a single backtest.
    pub fn write_equity(&self, ticker: &str, result: &BacktestResult) -> Result<PathBuf, ResultsError> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.path(&format!("equity_{}_{}.csv", ticker, self.execution));
        write_csv(&mut equity_frame(result)?, &path)?;
        Ok(path)
    }
}
