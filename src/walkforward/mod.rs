//! Walk-forward validation module.
//!
//! Implements rolling window optimization with train/test splits:
//! - Train: 7 years (parameter grid search)
//! - Test: 3 years (out-of-sample evaluation)
//! - Roll: by the test length

pub mod optimizer;
pub mod periods;

pub use optimizer::{
    FoldOutcome, FoldSummary, GridSearchResult, ParameterGrid, ParameterSet, RegimeRow,
    WalkForwardConfig, WalkForwardError, WalkForwardOptimizer, WalkForwardResult,
};
pub use periods::{add_years, rolling_splits, Fold};
