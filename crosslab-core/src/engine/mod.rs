//! Event-driven daily simulation engine.
//!
//! Two simulation paths share the result types here:
//! - [`run_daily`] — the cross-sectional loop: rank baseline blended with the
//!   rolling bootstrap Kelly leg, one step per panel date.
//! - [`run_rebalance`] — the simpler target-weight path: follow externally
//!   supplied weights over a price history, charging commission on turnover.
//!
//! Both paths apply P&L strictly from the weights held before the current
//! date; today's observations only shape the weights carried into tomorrow.

mod daily;
mod rebalance;

pub use daily::run_daily;
pub use rebalance::{run_rebalance, PriceHistory, TargetSchedule};

use thiserror::Error;

use crate::domain::{EquityPoint, TradeRecord, WeightVec};
use crate::metrics::PerformanceSummary;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot simulate an empty panel")]
    EmptyPanel,
    #[error("cannot simulate an empty price history")]
    EmptyPriceHistory,
}

/// Result of the daily cross-sectional simulation.
#[derive(Debug, Clone)]
pub struct DailyBacktest {
    pub equity_curve: Vec<EquityPoint>,
    /// Realized portfolio return per panel date (zero on the first date).
    pub daily_returns: Vec<f64>,
    /// L1 weight turnover per panel date.
    pub turnover: Vec<f64>,
    /// Weights held at the end of the horizon.
    pub final_weights: WeightVec,
    pub summary: PerformanceSummary,
}

/// Result of the target-weight rebalance simulation.
#[derive(Debug, Clone)]
pub struct RebalanceBacktest {
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<TradeRecord>,
    pub summary: PerformanceSummary,
}
