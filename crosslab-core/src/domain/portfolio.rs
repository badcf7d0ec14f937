//! Portfolio snapshot — the read-only view the risk monitor evaluates.

use super::position::Position;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point-in-time portfolio state: cash plus marked positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub cash: f64,
    pub positions: BTreeMap<String, Position>,
    pub total_value: f64,
}

impl PortfolioSnapshot {
    pub fn all_cash(cash: f64) -> Self {
        Self {
            cash,
            positions: BTreeMap::new(),
            total_value: cash,
        }
    }

    /// Gross exposure: total absolute position value over total value.
    /// Total value is floored at a small positive number so an empty or
    /// wiped-out account cannot divide by zero.
    pub fn gross_exposure(&self) -> f64 {
        let gross_value: f64 = self.positions.values().map(|p| p.value.abs()).sum();
        gross_value / self.total_value.max(1e-8)
    }

    /// Absolute position weights (|value| / total value), zero-weight
    /// positions skipped.
    pub fn position_weights(&self) -> Vec<f64> {
        let total = self.total_value.max(1e-8);
        self.positions
            .values()
            .map(|p| p.value.abs() / total)
            .filter(|w| *w > 0.0)
            .collect()
    }
}
