//! Performance metrics module.
//!
//! Provides return-series statistics:
//! - Annualized return and volatility
//! - Sharpe ratio
//! - Maximum drawdown and drawdown analysis

pub mod calculator;

pub use calculator::{DrawdownAnalysis, MetricsCalculator, PerformanceStats, DEFAULT_PERIODS_PER_YEAR};
