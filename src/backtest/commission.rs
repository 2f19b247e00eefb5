//! Commission model.
//!
//! Fees are quoted in basis points of traded notional and charged once per
//! unit of turnover (entering or leaving a position).

use serde::{Deserialize, Serialize};

/// Basis points per unit.
pub const BPS: f64 = 10_000.0;

/// Per-trade fee in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommissionModel {
    pub fee_bps: f64,
}

impl Default for CommissionModel {
    fn default() -> Self {
        Self { fee_bps: 1.0 }
    }
}

impl CommissionModel {
    pub fn new(fee_bps: f64) -> Self {
        Self { fee_bps }
    }

    /// Create a zero-commission model.
    pub fn zero() -> Self {
        Self { fee_bps: 0.0 }
    }

    /// Fee as a fraction of notional.
    pub fn rate(&self) -> f64 {
        self.fee_bps / BPS
    }

    /// Fee charged for a given turnover.
    pub fn calculate(&self, turnover: f64) -> f64 {
        turnover * self.rate()
    }
}
