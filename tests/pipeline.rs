//! File-to-file run: CSV prices in, result tables out.

use std::fs;
use std::path::Path;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use polars::prelude::*;
use tempfile::TempDir;

use ema_walkforward::backtest::ExecutionMode;
use ema_walkforward::config::RunConfig;
use ema_walkforward::data::{DataLoader, PriceProvider};
use ema_walkforward::results::{AggregateError, AggregateRunner, ResultsWriter};
use ema_walkforward::validation::DataIntegrityValidator;
use ema_walkforward::walkforward::ParameterGrid;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Weekday bars with a drifting, oscillating close.
fn write_prices(dir: &Path, ticker: &str, start: NaiveDate, end: NaiveDate, phase: f64) {
    let mut csv = String::from("Date,Open,High,Low,Close,Volume\n");
    let mut date = start;
    let mut i = 0.0;
    while date <= end {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            let close = 100.0 + 10.0 * ((i + phase) / 15.0).sin() + 0.03 * i;
            csv.push_str(&format!(
                "{},{:.4},{:.4},{:.4},{:.4},1000000\n",
                date,
                close,
                close + 1.0,
                close - 1.0,
                close
            ));
            i += 1.0;
        }
        date += Duration::days(1);
    }
    fs::write(dir.join(format!("{}.csv", ticker)), csv).unwrap();
}

fn config(data_dir: &Path, output_dir: &Path, tickers: &[&str]) -> RunConfig {
    let mut config = RunConfig::default();
    config.tickers = tickers.iter().map(|t| t.to_string()).collect();
    config.start = d(2010, 1, 1);
    config.data_dir = data_dir.to_string_lossy().into_owned();
    config.output_dir = output_dir.to_string_lossy().into_owned();
    config.walkforward.train_years = 2;
    config.walkforward.test_years = 1;
    config.walkforward.grid = ParameterGrid::from_ranges(&[5, 10], &[20, 40]);
    config
}

fn read_csv(path: &Path) -> DataFrame {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .unwrap()
        .finish()
        .unwrap()
}

#[test]
fn test_run_writes_all_tables() {
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_prices(data.path(), "AAA", d(2010, 1, 1), d(2013, 12, 31), 0.0);
    write_prices(data.path(), "BBB", d(2010, 1, 1), d(2013, 12, 31), 7.0);

    let config = config(data.path(), out.path(), &["AAA", "MISSING", "BBB"]);
    config.validate().unwrap();

    let loader = DataLoader::new(&config.data_dir);
    let mut done = 0;
    let result = AggregateRunner::new(config.clone())
        .run(&loader, &config.tickers, |_| done += 1)
        .unwrap();

    assert_eq!(done, 3);
    assert_eq!(result.tickers.len(), 2);
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].0, "MISSING");
    assert!(result.fold_count() >= 1);
    assert_eq!(result.failed_fold_count(), 0);

    let writer = ResultsWriter::new(out.path(), ExecutionMode::Close);
    let written = writer.write_all(&result, &config).unwrap();

    for name in [
        "summary_AAA_close.csv",
        "regimes_AAA_close.csv",
        "summary_BBB_close.csv",
        "regimes_BBB_close.csv",
        "summary_all_close.csv",
        "regimes_all_close.csv",
        "aggregate_oos_returns.csv",
        "regime_summary_close.csv",
        "run_manifest.json",
    ] {
        let path = out.path().join(name);
        assert!(path.exists(), "missing {}", name);
        assert!(written.contains(&path), "not reported {}", name);
    }
    assert!(!out.path().join("summary_MISSING_close.csv").exists());

    let summary = read_csv(&out.path().join("summary_all_close.csv"));
    assert_eq!(summary.height(), result.fold_count());
    assert!(summary.column("ticker").is_ok());
    assert!(summary.column("error").is_err());

    // Selected spans always come from the grid
    let fast = summary.column("best_fast").unwrap().cast(&DataType::Int64).unwrap();
    let slow = summary.column("best_slow").unwrap().cast(&DataType::Int64).unwrap();
    for (f, s) in fast.i64().unwrap().into_iter().zip(slow.i64().unwrap()) {
        let (f, s) = (f.unwrap(), s.unwrap());
        assert!([5, 10].contains(&f));
        assert!([20, 40].contains(&s));
        assert!(f < s);
    }

    let oos = read_csv(&out.path().join("aggregate_oos_returns.csv"));
    assert_eq!(oos.height(), 2);

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join("run_manifest.json")).unwrap()).unwrap();
    assert_eq!(manifest["execution"], "close");
    assert_eq!(manifest["skipped"][0]["ticker"], "MISSING");
}

#[test]
fn test_run_without_regimes() {
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_prices(data.path(), "AAA", d(2010, 1, 1), d(2013, 12, 31), 0.0);

    let mut config = config(data.path(), out.path(), &["AAA"]);
    config.walkforward.compute_regimes = false;
    config.backtest.execution = ExecutionMode::Open;

    let loader = DataLoader::new(&config.data_dir);
    let result = AggregateRunner::new(config.clone())
        .run(&loader, &config.tickers, |_| {})
        .unwrap();
    let writer = ResultsWriter::new(out.path(), config.backtest.execution);
    writer.write_all(&result, &config).unwrap();

    assert!(out.path().join("summary_all_open.csv").exists());
    assert!(out.path().join("summary_AAA_open.csv").exists());
    assert!(!out.path().join("regimes_all_open.csv").exists());
    assert!(!out.path().join("regimes_AAA_open.csv").exists());
}

#[test]
fn test_no_data_anywhere() {
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let config = config(data.path(), out.path(), &["AAA", "BBB"]);

    let loader = DataLoader::new(&config.data_dir);
    let err = AggregateRunner::new(config.clone())
        .run(&loader, &config.tickers, |_| {})
        .unwrap_err();
    assert_eq!(err, AggregateError::NoSummaries);
}

#[test]
fn test_loader_and_validator_agree() {
    let data = TempDir::new().unwrap();
    write_prices(data.path(), "AAA", d(2011, 1, 3), d(2011, 12, 30), 0.0);

    let loader = DataLoader::new(&data.path().to_string_lossy());
    let prices = loader.fetch("AAA", d(2011, 6, 1)).unwrap();
    assert!(prices.first_date().unwrap() >= d(2011, 6, 1));

    let validator = DataIntegrityValidator::new(&data.path().to_string_lossy());
    let reports = validator.validate_all().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].ticker, "AAA");
    assert!(reports[0].all_passed(), "{:?}", reports[0].failed_checks());
}
