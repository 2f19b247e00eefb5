//! Aggregate runs and result tables.
//!
//! - `aggregate`: run the walk-forward engine over a universe
//! - `tables`: lay results out as DataFrames and write them to disk

pub mod aggregate;
pub mod tables;

pub use aggregate::{AggregateError, AggregateResult, AggregateRunner, TickerResult};
pub use tables::{
    aggregate_oos_frame, equity_frame, regime_frame, regime_summary_frame, summary_frame, write_csv,
    ResultsError, ResultsWriter, TableEntry,
};
