//! EMA crossover signal.
//!
//! Long (1) while the fast EMA of Close is strictly above the slow EMA,
//! flat (0) otherwise.

use chrono::NaiveDate;

use crate::data::{PriceBar, PriceSeries};

/// One price bar with its indicator values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalRow {
    pub bar: PriceBar,
    pub ema_fast: f64,
    pub ema_slow: f64,
    /// 1 = long, 0 = flat.
    pub signal: u8,
}

impl SignalRow {
    pub fn date(&self) -> NaiveDate {
        self.bar.date
    }
}

/// Price series extended with crossover indicator columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalSeries {
    pub fast: usize,
    pub slow: usize,
    pub rows: Vec<SignalRow>,
}

impl SignalSeries {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn signals(&self) -> Vec<u8> {
        self.rows.iter().map(|r| r.signal).collect()
    }
}

/// Recursive exponential moving average with `alpha = 2 / (span + 1)`.
///
/// Seeded with the first finite value, no bias correction. Entries before the
/// seed are NaN; a later non-finite input carries the previous average forward.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;

    for &v in values {
        let next = match (prev, v.is_finite()) {
            (None, true) => Some(v),
            // Same recursion as alpha*v + (1-alpha)*p; this form keeps a
            // constant input exactly constant.
            (Some(p), true) => Some(p + alpha * (v - p)),
            (p, false) => p,
        };
        out.push(next.unwrap_or(f64::NAN));
        prev = next;
    }

    out
}

/// Compute fast/slow EMAs of Close and the binary crossover signal.
///
/// Leading rows where either EMA is undefined are dropped. An empty input
/// yields an empty series.
pub fn make_signals(prices: &PriceSeries, fast: usize, slow: usize) -> SignalSeries {
    let closes = prices.closes();
    let ema_fast = ema(&closes, fast);
    let ema_slow = ema(&closes, slow);

    let rows = prices
        .bars()
        .iter()
        .zip(ema_fast.iter().zip(ema_slow.iter()))
        .filter(|(_, (f, s))| f.is_finite() && s.is_finite())
        .map(|(bar, (&f, &s))| SignalRow {
            bar: *bar,
            ema_fast: f,
            ema_slow: s,
            signal: u8::from(f > s),
        })
        .collect();

    SignalSeries { fast, slow, rows }
}
