//! Slippage model.
//!
//! A flat haircut in basis points per unit of turnover, charged on top of
//! commission.

use serde::{Deserialize, Serialize};

use super::commission::BPS;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlippageModel {
    pub slippage_bps: f64,
}

impl Default for SlippageModel {
    fn default() -> Self {
        Self::zero()
    }
}

impl SlippageModel {
    pub fn new(slippage_bps: f64) -> Self {
        Self { slippage_bps }
    }

    /// Fills at the reference price.
    pub fn zero() -> Self {
        Self { slippage_bps: 0.0 }
    }

    pub fn rate(&self) -> f64 {
        self.slippage_bps / BPS
    }

    pub fn calculate(&self, turnover: f64) -> f64 {
        turnover * self.rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slippage_model_default() {
        let model = SlippageModel::default();
        assert_eq!(model.slippage_bps, 0.0);
        assert_eq!(model.calculate(1.0), 0.0);
    }

    #[test]
    fn test_slippage_rate() {
        let model = SlippageModel::new(0.5);
        assert!((model.rate() - 0.00005).abs() < 1e-15);
        assert!((model.calculate(1.0) - 0.00005).abs() < 1e-15);
    }
}
