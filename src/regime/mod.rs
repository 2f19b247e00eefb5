//! Market regime classification module.
//!
//! Categorizes dates by trailing realized volatility:
//! - Regime 1: calmest quantile
//! - Regime q: most volatile quantile
//!
//! and reports strategy performance within each regime.

pub mod classifier;

pub use classifier::{
    RealizedVol, RegimeClassifier, RegimeClassifierConfig, RegimeError, RegimeLabels, RegimeStats,
};
