//! Core price data types.
//!
//! A `PriceSeries` is the unit every other module consumes: one daily OHLCV
//! bar per trading date, strictly ascending, no duplicates. Calendar gaps are
//! kept as-is (no reindexing).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SeriesError {
    #[error("Dates out of order: {previous} followed by {next}")]
    OutOfOrder { previous: NaiveDate, next: NaiveDate },

    #[error("Duplicate date: {0}")]
    DuplicateDate(NaiveDate),

    #[error("Non-finite {field} on {date}")]
    NonFinite { date: NaiveDate, field: &'static str },
}

/// Daily OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Bar with every price equal to `close`. Handy for close-only sources.
    pub fn from_close(date: NaiveDate, close: f64) -> Self {
        Self::new(date, close, close, close, close, 0.0)
    }

    fn check_finite(&self) -> Result<(), SeriesError> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(SeriesError::NonFinite {
                    date: self.date,
                    field,
                });
            }
        }
        Ok(())
    }
}

/// Chronologically ordered daily price history for one instrument.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Build a series, rejecting unordered or duplicate dates and non-finite values.
    pub fn new(bars: Vec<PriceBar>) -> Result<Self, SeriesError> {
        for bar in &bars {
            bar.check_finite()?;
        }
        for pair in bars.windows(2) {
            let (previous, next) = (pair[0].date, pair[1].date);
            if next == previous {
                return Err(SeriesError::DuplicateDate(next));
            }
            if next < previous {
                return Err(SeriesError::OutOfOrder { previous, next });
            }
        }
        Ok(Self { bars })
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    /// Bars with `start <= date <= end`, as a new series.
    ///
    /// Ordering is inherited from `self`, so no re-validation is needed.
    pub fn window(&self, start: NaiveDate, end: NaiveDate) -> PriceSeries {
        let lo = self.bars.partition_point(|b| b.date < start);
        let hi = self.bars.partition_point(|b| b.date <= end);
        let bars = if lo < hi {
            self.bars[lo..hi].to_vec()
        } else {
            Vec::new()
        };
        PriceSeries { bars }
    }

    /// Bars on or after `start`.
    pub fn since(&self, start: NaiveDate) -> PriceSeries {
        let lo = self.bars.partition_point(|b| b.date < start);
        PriceSeries {
            bars: self.bars[lo..].to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn series(dates: &[NaiveDate]) -> Result<PriceSeries, SeriesError> {
        PriceSeries::new(dates.iter().map(|&dt| PriceBar::from_close(dt, 100.0)).collect())
    }

    #[test]
    fn test_rejects_duplicate_dates() {
        let err = series(&[d(2020, 1, 2), d(2020, 1, 2)]).unwrap_err();
        assert_eq!(err, SeriesError::DuplicateDate(d(2020, 1, 2)));
    }

    #[test]
    fn test_rejects_out_of_order() {
        let err = series(&[d(2020, 1, 3), d(2020, 1, 2)]).unwrap_err();
        assert!(matches!(err, SeriesError::OutOfOrder { .. }));
    }

    #[test]
    fn test_rejects_nan_close() {
        let bars = vec![PriceBar::from_close(d(2020, 1, 2), f64::NAN)];
        let err = PriceSeries::new(bars).unwrap_err();
        assert!(matches!(err, SeriesError::NonFinite { field: "open", .. }));
    }

    #[test]
    fn test_window_is_inclusive() {
        let s = series(&[d(2020, 1, 2), d(2020, 1, 3), d(2020, 1, 6), d(2020, 1, 7)]).unwrap();
        let w = s.window(d(2020, 1, 3), d(2020, 1, 6));
        assert_eq!(w.dates(), vec![d(2020, 1, 3), d(2020, 1, 6)]);

        // Bounds that fall on non-trading days
        let w = s.window(d(2020, 1, 4), d(2020, 1, 5));
        assert!(w.is_empty());

        // Inverted bounds
        let w = s.window(d(2020, 1, 7), d(2020, 1, 2));
        assert!(w.is_empty());
    }

    #[test]
    fn test_since() {
        let s = series(&[d(2020, 1, 2), d(2020, 1, 3), d(2020, 1, 6)]).unwrap();
        assert_eq!(s.since(d(2020, 1, 3)).len(), 2);
        assert!(s.since(d(2021, 1, 1)).is_empty());
    }
}
