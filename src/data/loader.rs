//! Price data loading.
//!
//! Reads daily OHLCV files from a data directory, one file per ticker:
//! `{data_dir}/{TICKER}.csv` or `{data_dir}/{TICKER}.parquet`, with columns
//! Date, Open, High, Low, Close, Volume (header case is ignored).
//!
//! The walk-forward core only sees the `PriceProvider` trait, so any other
//! source can be plugged in.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;
use thiserror::Error;
use tracing::debug;

use super::types::{PriceBar, PriceSeries, SeriesError};

/// Expected columns, lowercase.
pub const EXPECTED_COLUMNS: &[&str] = &["date", "open", "high", "low", "close", "volume"];

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("No data for {ticker} since {start}")]
    NoData { ticker: String, start: NaiveDate },

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid series: {0}")]
    Series(#[from] SeriesError),
}

/// Source of daily price history.
pub trait PriceProvider {
    /// Price history for `ticker` from `start` onwards.
    ///
    /// Returns `LoaderError::NoData` when nothing is available.
    fn fetch(&self, ticker: &str, start: NaiveDate) -> Result<PriceSeries, LoaderError>;
}

/// File-backed loader.
pub struct DataLoader {
    data_dir: String,
}

impl DataLoader {
    pub fn new(data_dir: &str) -> Self {
        Self {
            data_dir: data_dir.to_string(),
        }
    }

    fn csv_path(&self, ticker: &str) -> String {
        format!("{}/{}.csv", self.data_dir, ticker)
    }

    fn parquet_path(&self, ticker: &str) -> String {
        format!("{}/{}.parquet", self.data_dir, ticker)
    }

    /// Tickers with a price file in the data directory, sorted.
    pub fn available_tickers(&self) -> Result<Vec<String>, LoaderError> {
        let path = Path::new(&self.data_dir);
        if !path.exists() {
            return Ok(vec![]);
        }

        let mut tickers = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(t) = name
                .strip_suffix(".csv")
                .or_else(|| name.strip_suffix(".parquet"))
            {
                tickers.push(t.to_string());
            }
        }
        tickers.sort();
        tickers.dedup();
        Ok(tickers)
    }

    /// Raw DataFrame for a ticker. CSV takes precedence over parquet.
    pub fn load_dataframe(&self, ticker: &str) -> Result<DataFrame, LoaderError> {
        let csv = self.csv_path(ticker);
        if Path::new(&csv).exists() {
            let df = CsvReadOptions::default()
                .with_has_header(true)
                .try_into_reader_with_file_path(Some(csv.into()))?
                .finish()?;
            return Ok(df);
        }

        let parquet = self.parquet_path(ticker);
        if Path::new(&parquet).exists() {
            let df = LazyFrame::scan_parquet(&parquet, ScanArgsParquet::default())?.collect()?;
            return Ok(df);
        }

        Err(LoaderError::FileNotFound(csv))
    }

    /// Full price history for a ticker.
    pub fn load_prices(&self, ticker: &str) -> Result<PriceSeries, LoaderError> {
        let df = self.load_dataframe(ticker)?;
        dataframe_to_series(&df)
    }
}

impl PriceProvider for DataLoader {
    fn fetch(&self, ticker: &str, start: NaiveDate) -> Result<PriceSeries, LoaderError> {
        let prices = match self.load_prices(ticker) {
            Ok(p) => p,
            Err(LoaderError::FileNotFound(path)) => {
                debug!("{}: no price file at {}", ticker, path);
                return Err(LoaderError::NoData {
                    ticker: ticker.to_string(),
                    start,
                });
            }
            Err(e) => return Err(e),
        };

        let prices = prices.since(start);
        if prices.is_empty() {
            return Err(LoaderError::NoData {
                ticker: ticker.to_string(),
                start,
            });
        }
        Ok(prices)
    }
}

/// Provider over series already held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    series: HashMap<String, PriceSeries>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ticker: &str, prices: PriceSeries) {
        self.series.insert(ticker.to_string(), prices);
    }

    pub fn with(mut self, ticker: &str, prices: PriceSeries) -> Self {
        self.insert(ticker, prices);
        self
    }
}

impl PriceProvider for InMemoryProvider {
    fn fetch(&self, ticker: &str, start: NaiveDate) -> Result<PriceSeries, LoaderError> {
        let prices = self
            .series
            .get(ticker)
            .map(|s| s.since(start))
            .unwrap_or_default();
        if prices.is_empty() {
            return Err(LoaderError::NoData {
                ticker: ticker.to_string(),
                start,
            });
        }
        Ok(prices)
    }
}

/// Convert days since Unix epoch to NaiveDate. `None` when out of range.
fn date_from_days(days: i32) -> Option<NaiveDate> {
    days.checked_add(719_163).and_then(NaiveDate::from_num_days_from_ce_opt)
}

/// Parse `YYYY-MM-DD`, ignoring any time suffix.
fn parse_date(s: &str) -> Option<NaiveDate> {
    let head = s.trim().get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Find a column by case-insensitive name.
fn find_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, LoaderError> {
    let actual = df
        .get_column_names()
        .into_iter()
        .find(|c| c.as_str().eq_ignore_ascii_case(name))
        .ok_or_else(|| LoaderError::InvalidData(format!("Missing column: {}", name)))?
        .clone();
    Ok(df.column(actual.as_str())?)
}

fn date_values(column: &Column) -> Result<Vec<Option<NaiveDate>>, LoaderError> {
    if let Ok(str_col) = column.str() {
        return Ok(str_col.into_iter().map(|s| s.and_then(parse_date)).collect());
    }

    let as_date = column.cast(&DataType::Date).map_err(|_| {
        LoaderError::InvalidData(format!("Date column has unexpected type {}", column.dtype()))
    })?;
    let date_col = as_date.date()?;
    Ok(date_col.into_iter().map(|d| d.and_then(date_from_days)).collect())
}

fn float_values(column: &Column) -> Result<Vec<Option<f64>>, LoaderError> {
    let cast = column.cast(&DataType::Float64)?;
    Ok(cast.f64()?.into_iter().collect())
}

/// Convert an OHLCV DataFrame into a validated `PriceSeries`.
///
/// Rows with any null or unparseable field are dropped; the rest are sorted by date.
pub fn dataframe_to_series(df: &DataFrame) -> Result<PriceSeries, LoaderError> {
    let dates = date_values(find_column(df, "date")?)?;
    let open = float_values(find_column(df, "open")?)?;
    let high = float_values(find_column(df, "high")?)?;
    let low = float_values(find_column(df, "low")?)?;
    let close = float_values(find_column(df, "close")?)?;
    let volume = float_values(find_column(df, "volume")?)?;

    let mut bars = Vec::with_capacity(df.height());
    let mut dropped = 0usize;

    for idx in 0..df.height() {
        match (dates[idx], open[idx], high[idx], low[idx], close[idx], volume[idx]) {
            (Some(date), Some(o), Some(h), Some(l), Some(c), Some(v))
                if o.is_finite() && h.is_finite() && l.is_finite() && c.is_finite() && v.is_finite() =>
            {
                bars.push(PriceBar::new(date, o, h, l, c, v));
            }
            _ => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!("Dropped {} incomplete rows", dropped);
    }

    bars.sort_by_key(|b| b.date);
    Ok(PriceSeries::new(bars)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_date_from_days() {
        assert_eq!(date_from_days(18262), Some(d(2020, 1, 1)));
        assert_eq!(date_from_days(i32::MAX), None);
        assert_eq!(date_from_days(2_000_000_000), None);
    }

    #[test]
    fn test_out_of_range_dates_are_dropped() {
        let dates = Series::new("Date".into(), &[18262i32, 2_000_000_000, 18263])
            .cast(&DataType::Date)
            .unwrap();
        let df = DataFrame::new(vec![
            dates.into(),
            Series::new("Open".into(), &[1.0, 1.0, 1.0]).into(),
            Series::new("High".into(), &[1.0, 1.0, 1.0]).into(),
            Series::new("Low".into(), &[1.0, 1.0, 1.0]).into(),
            Series::new("Close".into(), &[1.0, 1.0, 1.0]).into(),
            Series::new("Volume".into(), &[10.0, 10.0, 10.0]).into(),
        ])
        .unwrap();

        let series = dataframe_to_series(&df).unwrap();
        assert_eq!(series.dates(), vec![d(2020, 1, 1), d(2020, 1, 2)]);
    }

    #[test]
    fn test_parse_date_ignores_time() {
        assert_eq!(parse_date("2020-03-04"), Some(d(2020, 3, 4)));
        assert_eq!(parse_date("2020-03-04 00:00:00"), Some(d(2020, 3, 4)));
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn test_paths() {
        let loader = DataLoader::new("data/prices");
        assert_eq!(loader.csv_path("SPY"), "data/prices/SPY.csv");
        assert_eq!(loader.parquet_path("SPY"), "data/prices/SPY.parquet");
    }

    #[test]
    fn test_dataframe_to_series_drops_nulls_and_sorts() {
        let df = DataFrame::new(vec![
            Series::new("Date".into(), &["2020-01-03", "2020-01-02", "2020-01-06"]).into(),
            Series::new("Open".into(), &[Some(2.0), Some(1.0), None]).into(),
            Series::new("High".into(), &[2.0, 1.0, 3.0]).into(),
            Series::new("Low".into(), &[2.0, 1.0, 3.0]).into(),
            Series::new("Close".into(), &[2.0, 1.0, 3.0]).into(),
            Series::new("Volume".into(), &[10i64, 20, 30]).into(),
        ])
        .unwrap();

        let series = dataframe_to_series(&df).unwrap();
        assert_eq!(series.dates(), vec![d(2020, 1, 2), d(2020, 1, 3)]);
        assert_eq!(series.bars()[0].volume, 20.0);
    }

    #[test]
    fn test_dataframe_missing_column() {
        let df = DataFrame::new(vec![
            Series::new("Date".into(), &["2020-01-02"]).into(),
            Series::new("Close".into(), &[1.0]).into(),
        ])
        .unwrap();

        let err = dataframe_to_series(&df).unwrap_err();
        assert!(matches!(err, LoaderError::InvalidData(_)));
    }

    #[test]
    fn test_in_memory_provider_no_data() {
        let provider = InMemoryProvider::new();
        let err = provider.fetch("SPY", d(2012, 1, 1)).unwrap_err();
        assert!(matches!(err, LoaderError::NoData { .. }));
    }

    #[test]
    fn test_missing_file_is_no_data() {
        let loader = DataLoader::new("/nonexistent/dir");
        let err = loader.fetch("SPY", d(2012, 1, 1)).unwrap_err();
        assert!(matches!(err, LoaderError::NoData { .. }));
    }
}
