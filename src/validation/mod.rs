//! Validation module for daily price data.
//!
//! This module provides integrity validation of:
//! - Schema and row completeness
//! - Value ranges (positive prices, consistent OHLC, non-negative volume)
//! - Calendar continuity

pub mod data_integrity;

pub use data_integrity::{
    CheckResult, DataIntegrityReport, DataIntegrityValidator, ValidationError, ValidationResult,
    DEFAULT_MAX_GAP_DAYS,
};
