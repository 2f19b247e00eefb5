//! Single-period vectorised backtester.
//!
//! Turns a crossover signal series into per-bar position, turnover, cost,
//! strategy return and equity:
//! 1. Position at bar t is the signal at bar t-1 (flat on the first bar)
//! 2. Turnover is the absolute change in position
//! 3. Cost is turnover times (fee + slippage)
//! 4. Strategy return is position times the period return, less cost
//! 5. Equity and buy-and-hold equity compound from 1.0

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::signals::SignalSeries;

use super::commission::CommissionModel;
use super::slippage::SlippageModel;

/// When a position earns its return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Close-to-close: `close[t] / close[t-1] - 1`.
    #[default]
    Close,
    /// Enter at the open, earn the intraday move: `close[t] / open[t] - 1`.
    Open,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Close => "close",
            Self::Open => "open",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "close" => Ok(Self::Close),
            "open" => Ok(Self::Open),
            other => Err(format!("Unknown execution mode: {}", other)),
        }
    }
}

/// Configuration for backtest execution.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Execution timing convention.
    #[serde(default)]
    pub execution: ExecutionMode,

    /// Commission model.
    #[serde(default)]
    pub commission: CommissionModel,

    /// Slippage model.
    #[serde(default)]
    pub slippage: SlippageModel,
}

impl BacktestConfig {
    pub fn new(execution: ExecutionMode, fee_bps: f64, slippage_bps: f64) -> Self {
        Self {
            execution,
            commission: CommissionModel::new(fee_bps),
            slippage: SlippageModel::new(slippage_bps),
        }
    }

    /// Commission plus slippage for a given turnover, as a fraction of equity.
    pub fn cost(&self, turnover: f64) -> f64 {
        self.commission.calculate(turnover) + self.slippage.calculate(turnover)
    }
}

/// One bar of backtest output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestRow {
    pub date: NaiveDate,
    /// Period return under the configured execution mode.
    pub ret: f64,
    /// Position held during the bar (0 or 1).
    pub position: u8,
    pub turnover: f64,
    pub cost: f64,
    pub strategy_return: f64,
    pub equity: f64,
    pub buy_hold_equity: f64,
}

/// Result of a completed backtest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BacktestResult {
    pub config: BacktestConfig,
    pub fast: usize,
    pub slow: usize,
    pub rows: Vec<BacktestRow>,
}

impl BacktestResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    pub fn strategy_returns(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.strategy_return).collect()
    }

    /// Final strategy equity (1.0 when empty).
    pub fn final_equity(&self) -> f64 {
        self.rows.last().map(|r| r.equity).unwrap_or(1.0)
    }

    /// Final buy-and-hold equity (1.0 when empty).
    pub fn final_buy_hold(&self) -> f64 {
        self.rows.last().map(|r| r.buy_hold_equity).unwrap_or(1.0)
    }

    /// Number of position changes.
    pub fn trade_count(&self) -> usize {
        self.rows.iter().filter(|r| r.turnover > 0.0).count()
    }

    pub fn total_cost(&self) -> f64 {
        self.rows.iter().map(|r| r.cost).sum()
    }

    /// Fraction of bars spent long.
    pub fn exposure(&self) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        self.rows.iter().filter(|r| r.position == 1).count() as f64 / self.rows.len() as f64
    }

    /// Generate summary string.
    pub fn summary(&self) -> String {
        let (start, end) = match (self.rows.first(), self.rows.last()) {
            (Some(f), Some(l)) => (f.date.to_string(), l.date.to_string()),
            _ => ("-".to_string(), "-".to_string()),
        };
        format!(
            "EMA({},{}) {} execution ({} to {})\n\
             ----------------------------------------\n\
             Bars: {}\n\
             Final Equity: {:.4}\n\
             Buy & Hold: {:.4}\n\
             Trades: {}\n\
             Exposure: {:.1}%\n\
             Total Cost: {:.4}",
            self.fast,
            self.slow,
            self.config.execution,
            start,
            end,
            self.rows.len(),
            self.final_equity(),
            self.final_buy_hold(),
            self.trade_count(),
            self.exposure() * 100.0,
            self.total_cost(),
        )
    }
}

/// The backtesting engine. Stateless between runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktestEngine {
    config: BacktestConfig,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Run the backtest over a signal series.
    pub fn run(&self, signals: &SignalSeries) -> BacktestResult {
        let mut rows = Vec::with_capacity(signals.len());

        let mut prev_close: Option<f64> = None;
        let mut prev_signal: u8 = 0;
        let mut prev_position: u8 = 0;
        let mut equity = 1.0;
        let mut buy_hold = 1.0;

        for (idx, row) in signals.rows.iter().enumerate() {
            let bar = &row.bar;

            let close_ret = prev_close.map(|p| bar.close / p - 1.0).unwrap_or(0.0);
            let ret = match self.config.execution {
                ExecutionMode::Close => close_ret,
                ExecutionMode::Open => bar.close / bar.open - 1.0,
            };

            let position = if idx == 0 { 0 } else { prev_signal };
            let turnover = if idx == 0 {
                0.0
            } else {
                (f64::from(position) - f64::from(prev_position)).abs()
            };
            let cost = self.config.cost(turnover);
            let strategy_return = f64::from(position) * ret - cost;

            equity *= 1.0 + strategy_return;
            buy_hold *= 1.0 + close_ret;

            rows.push(BacktestRow {
                date: bar.date,
                ret,
                position,
                turnover,
                cost,
                strategy_return,
                equity,
                buy_hold_equity: buy_hold,
            });

            prev_close = Some(bar.close);
            prev_signal = row.signal;
            prev_position = position;
        }

        BacktestResult {
            config: self.config,
            fast: signals.fast,
            slow: signals.slow,
            rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{PriceBar, PriceSeries};
    use crate::metrics::MetricsCalculator;
    use crate::signals::{make_signals, SignalRow};
    use chrono::Duration;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
    }

    /// Signal series with explicit bars and signals, bypassing the EMA.
    fn manual_signals(bars: &[(f64, f64)], signals: &[u8]) -> SignalSeries {
        let rows = bars
            .iter()
            .zip(signals)
            .enumerate()
            .map(|(i, (&(open, close), &signal))| SignalRow {
                bar: PriceBar::new(start() + Duration::days(i as i64), open, close, open, close, 0.0),
                ema_fast: 0.0,
                ema_slow: 0.0,
                signal,
            })
            .collect();
        SignalSeries { fast: 1, slow: 2, rows }
    }

    #[test]
    fn test_execution_mode_parse() {
        assert_eq!("close".parse::<ExecutionMode>().unwrap(), ExecutionMode::Close);
        assert_eq!("OPEN".parse::<ExecutionMode>().unwrap(), ExecutionMode::Open);
        assert!("vwap".parse::<ExecutionMode>().is_err());
        assert_eq!(ExecutionMode::Open.to_string(), "open");
    }

    #[test]
    fn test_position_lags_signal() {
        let sig = manual_signals(&[(10.0, 10.0), (10.0, 11.0), (11.0, 12.0), (12.0, 12.0)], &[1, 1, 0, 0]);
        let result = BacktestEngine::new(BacktestConfig::new(ExecutionMode::Close, 0.0, 0.0)).run(&sig);

        let positions: Vec<u8> = result.rows.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![0, 1, 1, 0]);
        let turnover: Vec<f64> = result.rows.iter().map(|r| r.turnover).collect();
        assert_eq!(turnover, vec![0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_first_position_is_flat() {
        let sig = manual_signals(&[(10.0, 10.0), (10.0, 11.0)], &[1, 1]);
        for mode in [ExecutionMode::Close, ExecutionMode::Open] {
            let result = BacktestEngine::new(BacktestConfig::new(mode, 5.0, 5.0)).run(&sig);
            assert_eq!(result.rows[0].position, 0);
            assert_eq!(result.rows[0].turnover, 0.0);
            assert_eq!(result.rows[0].equity, 1.0);
        }
    }

    #[test]
    fn test_close_returns_and_equity() {
        let sig = manual_signals(&[(10.0, 10.0), (10.0, 11.0), (11.0, 12.1)], &[1, 1, 1]);
        let result = BacktestEngine::new(BacktestConfig::new(ExecutionMode::Close, 0.0, 0.0)).run(&sig);

        assert_eq!(result.rows[0].ret, 0.0);
        assert!((result.rows[1].ret - 0.1).abs() < 1e-12);
        // Long from bar 1: equity tracks buy-and-hold
        assert!((result.final_equity() - 1.21).abs() < 1e-12);
        assert!((result.final_buy_hold() - 1.21).abs() < 1e-12);
    }

    #[test]
    fn test_open_execution_uses_intraday_return() {
        // Gap up overnight, flat intraday
        let sig = manual_signals(&[(10.0, 10.0), (12.0, 12.0), (12.0, 13.2)], &[1, 1, 1]);
        let result = BacktestEngine::new(BacktestConfig::new(ExecutionMode::Open, 0.0, 0.0)).run(&sig);

        assert_eq!(result.rows[1].ret, 0.0);
        assert!((result.rows[2].ret - 0.1).abs() < 1e-12);
        assert!((result.final_equity() - 1.1).abs() < 1e-12);
        // Buy-and-hold is close-to-close regardless of mode
        assert!((result.final_buy_hold() - 1.32).abs() < 1e-12);
    }

    #[test]
    fn test_costs_on_every_flip() {
        let n = 20;
        let closes: Vec<(f64, f64)> = (0..n).map(|i| (100.0, 100.0 * (1.0 + 0.002 * i as f64))).collect();
        let signals: Vec<u8> = (0..n).map(|i| (i % 2) as u8).collect();
        let sig = manual_signals(&closes, &signals);

        let result = BacktestEngine::new(BacktestConfig::new(ExecutionMode::Close, 100.0, 0.0)).run(&sig);

        for row in result.rows.iter().skip(1) {
            assert_eq!(row.turnover, 1.0);
            assert!((row.cost - 0.01).abs() < 1e-12);
            let gross = f64::from(row.position) * row.ret;
            assert!(row.strategy_return <= gross - 0.01 + 1e-12);
        }
    }

    #[test]
    fn test_turnover_binary_and_equity_positive() {
        let closes: Vec<f64> = (0..300)
            .map(|i| 100.0 + 10.0 * ((i as f64) / 7.0).sin() + i as f64 * 0.05)
            .collect();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar::new(start() + Duration::days(i as i64), c * 0.999, c, c, c, 0.0))
            .collect();
        let prices = PriceSeries::new(bars).unwrap();
        let sig = make_signals(&prices, 5, 20);

        for mode in [ExecutionMode::Close, ExecutionMode::Open] {
            let result = BacktestEngine::new(BacktestConfig::new(mode, 2.0, 0.5)).run(&sig);
            assert_eq!(result.len(), sig.len());
            assert!(result.rows.iter().all(|r| r.turnover == 0.0 || r.turnover == 1.0));
            assert!(result.rows.iter().all(|r| r.equity > 0.0 && r.buy_hold_equity > 0.0));
            assert!(result.trade_count() > 0);
        }
    }

    #[test]
    fn test_config_cost() {
        let config = BacktestConfig::new(ExecutionMode::Close, 2.0, 0.5);
        assert!((config.cost(1.0) - 0.00025).abs() < 1e-15);
        assert_eq!(config.cost(0.0), 0.0);
    }

    #[test]
    fn test_flat_prices_end_to_end() {
        let bars = (0..2520)
            .map(|i| PriceBar::new(start() + Duration::days(i), 100.0, 100.0, 100.0, 100.0, 1e6))
            .collect();
        let prices = PriceSeries::new(bars).unwrap();
        let sig = make_signals(&prices, 12, 26);
        assert!(sig.rows.iter().all(|r| r.signal == 0));

        let result = BacktestEngine::new(BacktestConfig::new(ExecutionMode::Close, 1.0, 0.0)).run(&sig);
        assert!(result.rows.iter().all(|r| r.strategy_return == 0.0));
        assert!(result.rows.iter().all(|r| r.equity == 1.0));
        assert_eq!(result.trade_count(), 0);

        let stats = MetricsCalculator::from_backtest(&result, 252.0);
        assert_eq!(stats.ann_return, 0.0);
        assert_eq!(stats.ann_vol, 0.0);
        assert!(stats.sharpe.is_nan());
        assert_eq!(stats.max_drawdown, 0.0);
    }

    #[test]
    fn test_empty_signals() {
        let result = BacktestEngine::default().run(&SignalSeries::default());
        assert!(result.is_empty());
        assert_eq!(result.final_equity(), 1.0);
        assert_eq!(result.exposure(), 0.0);
    }
}
