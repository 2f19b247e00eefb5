//! Walk-forward fold generation.
//!
//! Partitions a date range into consecutive train/test folds that roll
//! forward by the test length.

use chrono::{Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// A single walk-forward fold. All bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fold {
    /// Fold number (0-indexed).
    pub index: usize,
    /// Training start date.
    pub train_start: NaiveDate,
    /// Training end date.
    pub train_end: NaiveDate,
    /// Test start date (day after `train_end`).
    pub test_start: NaiveDate,
    /// Test end date.
    pub test_end: NaiveDate,
}

impl Fold {
    /// Get training period length in days.
    pub fn train_days(&self) -> i64 {
        (self.train_end - self.train_start).num_days() + 1
    }

    /// Get test period length in days.
    pub fn test_days(&self) -> i64 {
        (self.test_end - self.test_start).num_days() + 1
    }
}

/// Add whole years to a date. Feb 29 clamps to Feb 28 in non-leap years.
pub fn add_years(date: NaiveDate, years: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(years.checked_mul(12)?))
}

/// Generate rolling folds over the span of `dates`.
///
/// Fold 0 trains on `[min, min + train_years - 1 day]` and tests on the
/// following `test_years`. Each later fold starts `test_years` after the
/// previous one. Generation stops at the first fold whose test window ends
/// after the last date.
pub fn rolling_splits(dates: &[NaiveDate], train_years: u32, test_years: u32) -> Vec<Fold> {
    let (Some(&min), Some(&max)) = (dates.iter().min(), dates.iter().max()) else {
        return Vec::new();
    };
    if train_years == 0 || test_years == 0 {
        return Vec::new();
    }

    let one_day = Duration::days(1);
    let mut folds = Vec::new();
    let mut train_start = min;

    loop {
        let Some(fold) = fold_at(folds.len(), train_start, train_years, test_years, one_day) else {
            break;
        };

        // Check if we have enough data
        if fold.test_end > max {
            break;
        }

        folds.push(fold);

        // Roll forward
        match add_years(train_start, test_years) {
            Some(next) => train_start = next,
            None => break,
        }
    }

    folds
}

fn fold_at(
    index: usize,
    train_start: NaiveDate,
    train_years: u32,
    test_years: u32,
    one_day: Duration,
) -> Option<Fold> {
    let train_end = add_years(train_start, train_years)? - one_day;
    let test_start = train_end + one_day;
    let test_end = add_years(test_start, test_years)? - one_day;
    Some(Fold {
        index,
        train_start,
        train_end,
        test_start,
        test_end,
    })
}
