//! Data integrity validation for daily price files.
//!
//! Validates:
//! - Schema (Date, Open, High, Low, Close, Volume present)
//! - Price positivity (all OHLC > 0)
//! - OHLC consistency (low <= open/close <= high)
//! - Volume (non-negative)
//! - Date continuity (no calendar gaps longer than a threshold)

use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use polars::prelude::*;
use thiserror::Error;

use crate::data::{dataframe_to_series, DataLoader, LoaderError, PriceSeries, EXPECTED_COLUMNS};

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Largest calendar gap between consecutive bars before it is flagged.
pub const DEFAULT_MAX_GAP_DAYS: i64 = 7;

/// Result of a single validation check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
}

impl CheckResult {
    pub fn pass(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: message.to_string(),
            details: None,
        }
    }

    pub fn fail(name: &str, message: &str, details: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: message.to_string(),
            details,
        }
    }
}

/// Complete data integrity report for a ticker.
#[derive(Debug)]
pub struct DataIntegrityReport {
    pub ticker: String,
    pub row_count: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub checks: Vec<CheckResult>,
}

impl DataIntegrityReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failed_checks(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    pub fn summary(&self) -> String {
        let passed = self.checks.iter().filter(|c| c.passed).count();
        let total = self.checks.len();
        let span = match (self.first_date, self.last_date) {
            (Some(first), Some(last)) => format!("{} to {}", first, last),
            _ => "empty".to_string(),
        };
        format!(
            "{} ({} rows, {}): {}/{} checks passed",
            self.ticker, self.row_count, span, passed, total
        )
    }
}

/// Validator for daily price data.
pub struct DataIntegrityValidator {
    loader: DataLoader,
    max_gap_days: i64,
}

impl DataIntegrityValidator {
    pub fn new(data_dir: &str) -> Self {
        Self {
            loader: DataLoader::new(data_dir),
            max_gap_days: DEFAULT_MAX_GAP_DAYS,
        }
    }

    pub fn with_max_gap_days(mut self, days: i64) -> Self {
        self.max_gap_days = days;
        self
    }

    /// Run all validation checks on a ticker's price file.
    pub fn validate(&self, ticker: &str) -> ValidationResult<DataIntegrityReport> {
        let df = self.loader.load_dataframe(ticker)?;
        let row_count = df.height();

        let schema = check_schema(&df);
        if !schema.passed {
            return Ok(DataIntegrityReport {
                ticker: ticker.to_string(),
                row_count,
                first_date: None,
                last_date: None,
                checks: vec![schema],
            });
        }

        let prices = dataframe_to_series(&df)?;
        let mut report = self.validate_series(ticker, &prices);
        report.row_count = row_count;

        let mut checks = vec![schema, check_complete_rows(row_count, prices.len())];
        checks.append(&mut report.checks);
        report.checks = checks;

        Ok(report)
    }

    /// Run the value and calendar checks on an already-loaded series.
    pub fn validate_series(&self, ticker: &str, prices: &PriceSeries) -> DataIntegrityReport {
        let checks = vec![
            check_price_positivity(prices),
            check_ohlc_consistency(prices),
            check_volume(prices),
            self.check_date_continuity(prices),
        ];

        DataIntegrityReport {
            ticker: ticker.to_string(),
            row_count: prices.len(),
            first_date: prices.first_date(),
            last_date: prices.last_date(),
            checks,
        }
    }

    /// Validate all available tickers.
    pub fn validate_all(&self) -> ValidationResult<Vec<DataIntegrityReport>> {
        let tickers = self.loader.available_tickers()?;
        let mut reports = Vec::new();

        for ticker in tickers {
            reports.push(self.validate(&ticker)?);
        }

        Ok(reports)
    }

    /// Check that trading days are continuous (no unexpected gaps).
    fn check_date_continuity(&self, prices: &PriceSeries) -> CheckResult {
        let dates = prices.dates();

        if dates.is_empty() {
            return CheckResult::fail("date_continuity", "No trading dates found", None);
        }

        let mut gaps = Vec::new();
        let mut missing_weekdays = 0usize;
        let mut weekend_bars = 0usize;

        for window in dates.windows(2) {
            let (prev, curr) = (window[0], window[1]);

            let mut expected = next_trading_day(prev);
            while expected < curr {
                missing_weekdays += 1;
                expected = next_trading_day(expected);
            }

            let gap_days = (curr - prev).num_days();
            if gap_days > self.max_gap_days {
                gaps.push(format!("{} to {} ({} days)", prev, curr, gap_days));
            }
        }
        for date in &dates {
            if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                weekend_bars += 1;
            }
        }

        let message = format!(
            "{} trading days, {} weekdays without a bar, {} weekend bars",
            dates.len(),
            missing_weekdays,
            weekend_bars
        );

        if gaps.is_empty() {
            CheckResult::pass("date_continuity", &message)
        } else {
            CheckResult::fail(
                "date_continuity",
                &format!("{} gaps longer than {} days; {}", gaps.len(), self.max_gap_days, message),
                Some(gaps.join(", ")),
            )
        }
    }
}

/// Check that schema has all expected columns (case-insensitive).
fn check_schema(df: &DataFrame) -> CheckResult {
    let columns: HashSet<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_lowercase())
        .collect();

    let missing: Vec<&str> = EXPECTED_COLUMNS
        .iter()
        .copied()
        .filter(|c| !columns.contains(*c))
        .collect();

    if missing.is_empty() {
        CheckResult::pass(
            "schema_consistency",
            &format!("All {} expected columns present", EXPECTED_COLUMNS.len()),
        )
    } else {
        CheckResult::fail(
            "schema_consistency",
            "Schema mismatch",
            Some(format!("Missing: {:?}", missing)),
        )
    }
}

/// Rows dropped while loading (null or unparseable fields).
fn check_complete_rows(raw_rows: usize, kept: usize) -> CheckResult {
    let dropped = raw_rows.saturating_sub(kept);
    if dropped == 0 {
        CheckResult::pass("complete_rows", &format!("All {} rows complete", raw_rows))
    } else {
        CheckResult::fail(
            "complete_rows",
            &format!("{} of {} rows incomplete", dropped, raw_rows),
            None,
        )
    }
}

/// Check price positivity: every OHLC value > 0.
fn check_price_positivity(prices: &PriceSeries) -> CheckResult {
    let bad: Vec<String> = prices
        .bars()
        .iter()
        .filter(|b| b.open <= 0.0 || b.high <= 0.0 || b.low <= 0.0 || b.close <= 0.0)
        .map(|b| b.date.to_string())
        .collect();

    if bad.is_empty() {
        CheckResult::pass("price_positivity", "All prices positive")
    } else {
        CheckResult::fail(
            "price_positivity",
            &format!("{} bars with non-positive prices", bad.len()),
            Some(bad.into_iter().take(10).collect::<Vec<_>>().join(", ")),
        )
    }
}

/// Check OHLC consistency: low <= min(open, close), high >= max(open, close).
fn check_ohlc_consistency(prices: &PriceSeries) -> CheckResult {
    let bad: Vec<String> = prices
        .bars()
        .iter()
        .filter(|b| b.low > b.open.min(b.close) || b.high < b.open.max(b.close) || b.low > b.high)
        .map(|b| b.date.to_string())
        .collect();

    let total = prices.len();
    if bad.is_empty() {
        CheckResult::pass("ohlc_consistency", "All bars have consistent OHLC")
    } else {
        let pct = bad.len() as f64 / total.max(1) as f64 * 100.0;
        CheckResult::fail(
            "ohlc_consistency",
            &format!("{} ({:.2}%) inconsistent bars", bad.len(), pct),
            Some(bad.into_iter().take(10).collect::<Vec<_>>().join(", ")),
        )
    }
}

/// Check volume is non-negative.
fn check_volume(prices: &PriceSeries) -> CheckResult {
    let negative = prices.bars().iter().filter(|b| b.volume < 0.0).count();
    if negative == 0 {
        CheckResult::pass("volume", "All volumes non-negative")
    } else {
        CheckResult::fail("volume", &format!("{} bars with negative volume", negative), None)
    }
}

/// Get the next expected trading day (skip weekends).
fn next_trading_day(date: NaiveDate) -> NaiveDate {
    let mut next = date + Duration::days(1);
    while matches!(next.weekday(), Weekday::Sat | Weekday::Sun) {
        next += Duration::days(1);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PriceBar;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn check<'a>(report: &'a DataIntegrityReport, name: &str) -> &'a CheckResult {
        report.checks.iter().find(|c| c.name == name).unwrap()
    }

    #[test]
    fn test_next_trading_day() {
        // Friday -> Monday
        let friday = d(2024, 1, 5);
        assert_eq!(next_trading_day(friday), d(2024, 1, 8));

        // Monday -> Tuesday
        assert_eq!(next_trading_day(d(2024, 1, 8)), d(2024, 1, 9));
    }

    #[test]
    fn test_check_result() {
        let pass = CheckResult::pass("test", "passed");
        assert!(pass.passed);

        let fail = CheckResult::fail("test", "failed", Some("details".to_string()));
        assert!(!fail.passed);
        assert_eq!(fail.details, Some("details".to_string()));
    }

    #[test]
    fn test_clean_series_passes() {
        let bars = vec![
            PriceBar::new(d(2024, 1, 4), 10.0, 11.0, 9.5, 10.5, 1000.0),
            PriceBar::new(d(2024, 1, 5), 10.5, 10.8, 10.1, 10.2, 1200.0),
            PriceBar::new(d(2024, 1, 8), 10.2, 10.9, 10.0, 10.7, 900.0),
        ];
        let prices = PriceSeries::new(bars).unwrap();
        let report = DataIntegrityValidator::new("unused").validate_series("SPY", &prices);

        assert!(report.all_passed(), "{:?}", report.failed_checks());
        assert!(report.summary().contains("4/4 checks passed"));
    }

    #[test]
    fn test_detects_bad_bars() {
        let bars = vec![
            PriceBar::new(d(2024, 1, 4), 10.0, 9.0, 9.5, 10.5, 1000.0),
            PriceBar::new(d(2024, 1, 5), -1.0, 10.8, -1.0, 10.2, -5.0),
            PriceBar::new(d(2024, 2, 20), 10.2, 10.9, 10.0, 10.7, 900.0),
        ];
        let prices = PriceSeries::new(bars).unwrap();
        let report = DataIntegrityValidator::new("unused").validate_series("SPY", &prices);

        assert!(!report.all_passed());
        assert!(!check(&report, "price_positivity").passed);
        assert!(!check(&report, "ohlc_consistency").passed);
        assert!(!check(&report, "volume").passed);
        let continuity = check(&report, "date_continuity");
        assert!(!continuity.passed);
        assert!(continuity.details.as_ref().unwrap().contains("2024-01-05 to 2024-02-20"));
    }

    #[test]
    fn test_gap_threshold() {
        let bars = vec![
            PriceBar::from_close(d(2024, 1, 2), 10.0),
            PriceBar::from_close(d(2024, 1, 12), 10.0),
        ];
        let prices = PriceSeries::new(bars).unwrap();

        let strict = DataIntegrityValidator::new("unused").validate_series("X", &prices);
        assert!(!check(&strict, "date_continuity").passed);

        let lenient = DataIntegrityValidator::new("unused")
            .with_max_gap_days(14)
            .validate_series("X", &prices);
        assert!(check(&lenient, "date_continuity").passed);
    }

    #[test]
    fn test_schema_check() {
        let df = DataFrame::new(vec![
            Series::new("date".into(), &["2024-01-02"]).into(),
            Series::new("CLOSE".into(), &[1.0]).into(),
        ])
        .unwrap();
        let result = check_schema(&df);
        assert!(!result.passed);
        assert!(result.details.unwrap().contains("open"));
    }
}
