//! Performance metrics calculator.
//!
//! Annualized statistics over a sequence of per-period returns.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::backtest::BacktestResult;

/// Trading days per year.
pub const DEFAULT_PERIODS_PER_YEAR: f64 = 252.0;

/// Annualized performance statistics. `NaN` marks an undefined value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub ann_return: f64,
    pub ann_vol: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
}

impl Default for PerformanceStats {
    fn default() -> Self {
        Self::undefined()
    }
}

impl PerformanceStats {
    /// All statistics undefined.
    pub fn undefined() -> Self {
        Self {
            ann_return: f64::NAN,
            ann_vol: f64::NAN,
            sharpe: f64::NAN,
            max_drawdown: f64::NAN,
        }
    }

    pub fn is_undefined(&self) -> bool {
        self.ann_return.is_nan()
            && self.ann_vol.is_nan()
            && self.sharpe.is_nan()
            && self.max_drawdown.is_nan()
    }

    /// Generate a summary report.
    pub fn summary(&self) -> String {
        format!(
            "Annualized Return: {:.2}%\n\
             Annualized Vol: {:.2}%\n\
             Sharpe Ratio: {:.2}\n\
             Max Drawdown: {:.2}%",
            self.ann_return * 100.0,
            self.ann_vol * 100.0,
            self.sharpe,
            self.max_drawdown * 100.0,
        )
    }
}

/// Drawdown analysis details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownAnalysis {
    /// Deepest drawdown as a (non-positive) fraction of the running peak.
    pub max_drawdown: f64,
    pub peak_date: Option<NaiveDate>,
    pub trough_date: Option<NaiveDate>,
    /// First date the equity regained the peak after the trough.
    pub recovery_date: Option<NaiveDate>,
    pub duration_days: i64,
}

/// Metrics calculator.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Annualized return, volatility, Sharpe and max drawdown.
    ///
    /// Non-finite returns count as zero. Fewer than two observations leave
    /// every statistic undefined.
    pub fn perf_stats(returns: &[f64], periods_per_year: f64) -> PerformanceStats {
        let r: Vec<f64> = returns
            .iter()
            .map(|&x| if x.is_finite() { x } else { 0.0 })
            .collect();

        let n = r.len();
        if n <= 1 {
            return PerformanceStats::undefined();
        }

        let growth = Self::growth(&r);
        let last = growth[n - 1];
        let ann_return = last.powf(periods_per_year / n as f64) - 1.0;

        // Sample standard deviation (n - 1)
        let ann_vol = r.iter().std_dev() * periods_per_year.sqrt();

        let sharpe = if ann_vol > 0.0 {
            ann_return / ann_vol
        } else {
            f64::NAN
        };

        let max_drawdown = Self::drawdown_series(&r)
            .into_iter()
            .fold(f64::INFINITY, f64::min);

        PerformanceStats {
            ann_return,
            ann_vol,
            sharpe,
            max_drawdown,
        }
    }

    /// Strategy statistics of a completed backtest.
    pub fn from_backtest(result: &BacktestResult, periods_per_year: f64) -> PerformanceStats {
        Self::perf_stats(&result.strategy_returns(), periods_per_year)
    }

    /// Buy-and-hold statistics over the same bars as a backtest.
    pub fn buy_and_hold(result: &BacktestResult, periods_per_year: f64) -> PerformanceStats {
        let mut prev = 1.0;
        let returns: Vec<f64> = result
            .rows
            .iter()
            .map(|row| {
                let r = row.buy_hold_equity / prev - 1.0;
                prev = row.buy_hold_equity;
                r
            })
            .collect();
        Self::perf_stats(&returns, periods_per_year)
    }

    /// Drawdown at each period: `growth / running_max(growth) - 1`.
    pub fn drawdown_series(returns: &[f64]) -> Vec<f64> {
        let mut peak = f64::NEG_INFINITY;
        Self::growth(returns)
            .into_iter()
            .map(|g| {
                peak = peak.max(g);
                g / peak - 1.0
            })
            .collect()
    }

    /// Locate the deepest drawdown of a backtest's strategy equity.
    pub fn analyze_drawdown(result: &BacktestResult) -> DrawdownAnalysis {
        let mut analysis = DrawdownAnalysis {
            max_drawdown: 0.0,
            peak_date: None,
            trough_date: None,
            recovery_date: None,
            duration_days: 0,
        };

        let Some(first) = result.rows.first() else {
            return analysis;
        };

        let mut peak = first.equity;
        let mut peak_date = first.date;
        let mut worst_peak = first.equity;

        for row in &result.rows {
            if row.equity >= peak {
                if analysis.trough_date.is_some()
                    && analysis.recovery_date.is_none()
                    && row.equity >= worst_peak
                {
                    analysis.recovery_date = Some(row.date);
                }
                peak = row.equity;
                peak_date = row.date;
                continue;
            }

            let drawdown = row.equity / peak - 1.0;
            if drawdown < analysis.max_drawdown {
                analysis.max_drawdown = drawdown;
                analysis.peak_date = Some(peak_date);
                analysis.trough_date = Some(row.date);
                analysis.recovery_date = None;
                worst_peak = peak;
            }
        }

        if let (Some(start), Some(trough)) = (analysis.peak_date, analysis.trough_date) {
            let end = analysis.recovery_date.unwrap_or(trough);
            analysis.duration_days = (end - start).num_days();
        }

        analysis
    }

    fn growth(returns: &[f64]) -> Vec<f64> {
        let mut acc = 1.0;
        returns
            .iter()
            .map(|r| {
                acc *= 1.0 + r;
                acc
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{BacktestConfig, BacktestRow};
    use chrono::Duration;

    #[test]
    fn test_flat_returns() {
        let stats = MetricsCalculator::perf_stats(&[0.0; 100], DEFAULT_PERIODS_PER_YEAR);
        assert_eq!(stats.ann_return, 0.0);
        assert_eq!(stats.ann_vol, 0.0);
        assert!(stats.sharpe.is_nan());
        assert_eq!(stats.max_drawdown, 0.0);
    }

    #[test]
    fn test_too_few_observations() {
        assert!(MetricsCalculator::perf_stats(&[], 252.0).is_undefined());
        assert!(MetricsCalculator::perf_stats(&[0.01], 252.0).is_undefined());
    }

    #[test]
    fn test_annualized_return() {
        // 1% per period for 252 periods compounds to 1.01^252 - 1
        let stats = MetricsCalculator::perf_stats(&[0.01; 252], 252.0);
        assert!((stats.ann_return - (1.01f64.powi(252) - 1.0)).abs() < 1e-9);
        assert!(stats.ann_vol.abs() < 1e-12);
        assert_eq!(stats.max_drawdown, 0.0);
    }

    #[test]
    fn test_sample_volatility() {
        let returns = [0.01, -0.01, 0.01, -0.01];
        let stats = MetricsCalculator::perf_stats(&returns, 252.0);
        // Sample std of +-0.01 alternating, n = 4: sqrt(4 * 1e-4 / 3)
        let expected = (4.0e-4f64 / 3.0).sqrt() * 252.0f64.sqrt();
        assert!((stats.ann_vol - expected).abs() < 1e-12);
        assert!((stats.sharpe - stats.ann_return / stats.ann_vol).abs() < 1e-12);
    }

    #[test]
    fn test_nan_counts_as_zero() {
        let with_nan = MetricsCalculator::perf_stats(&[f64::NAN, 0.02, -0.01], 252.0);
        let with_zero = MetricsCalculator::perf_stats(&[0.0, 0.02, -0.01], 252.0);
        assert_eq!(with_nan, with_zero);
    }

    #[test]
    fn test_max_drawdown_non_positive() {
        let returns = [0.05, -0.10, 0.02, -0.03, 0.08, 0.01];
        let stats = MetricsCalculator::perf_stats(&returns, 252.0);
        assert!(stats.max_drawdown <= 0.0);

        let dd = MetricsCalculator::drawdown_series(&returns);
        assert!(dd.iter().all(|&d| d <= 0.0));
        // Peak after +5%, trough after -10% and +2% and -3%
        let expected = (1.05 * 0.90 * 1.02 * 0.97) / 1.05 - 1.0;
        assert!((stats.max_drawdown - expected).abs() < 1e-12);
    }

    #[test]
    fn test_analyze_drawdown_dates() {
        let start = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
        let equity = [1.0, 1.1, 0.99, 1.05, 1.12, 1.2];
        let rows = equity
            .iter()
            .enumerate()
            .map(|(i, &e)| BacktestRow {
                date: start + Duration::days(i as i64),
                ret: 0.0,
                position: 1,
                turnover: 0.0,
                cost: 0.0,
                strategy_return: 0.0,
                equity: e,
                buy_hold_equity: e,
            })
            .collect();
        let result = BacktestResult {
            config: BacktestConfig::default(),
            fast: 12,
            slow: 26,
            rows,
        };

        let analysis = MetricsCalculator::analyze_drawdown(&result);
        assert!((analysis.max_drawdown - (0.99 / 1.1 - 1.0)).abs() < 1e-12);
        assert_eq!(analysis.peak_date, Some(start + Duration::days(1)));
        assert_eq!(analysis.trough_date, Some(start + Duration::days(2)));
        assert_eq!(analysis.recovery_date, Some(start + Duration::days(4)));
        assert_eq!(analysis.duration_days, 3);
    }

    #[test]
    fn test_analyze_drawdown_empty() {
        let analysis = MetricsCalculator::analyze_drawdown(&BacktestResult::default());
        assert_eq!(analysis.max_drawdown, 0.0);
        assert!(analysis.peak_date.is_none());
    }
}
