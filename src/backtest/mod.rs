//! Backtesting for the EMA crossover strategy.
//!
//! This module provides the single-period backtester:
//! - Lagged position from the signal (no look-ahead)
//! - Close-to-close or open-execution returns
//! - Commission and slippage in basis points of turnover
//! - Strategy and buy-and-hold equity curves

pub mod commission;
pub mod engine;
pub mod slippage;

pub use commission::CommissionModel;
pub use engine::{BacktestConfig, BacktestEngine, BacktestResult, BacktestRow, ExecutionMode};
pub use slippage::SlippageModel;
