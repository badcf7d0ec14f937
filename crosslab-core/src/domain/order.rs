//! Order, fill, and trade records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for buys, -1 for sells.
    pub fn sign(&self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }
}

/// Terminal status of an execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Filled,
    Rejected,
    /// The idempotency key was already seen; no second fill was produced.
    IgnoredDuplicate,
}

/// Immutable record of one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillReport {
    pub account_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub requested_qty: f64,
    pub client_order_id: String,
    /// Pre-trade cost estimate, logged for shortfall reconciliation.
    pub expected_cost: f64,
    /// Realized fill price; zero when no fill occurred.
    pub fill_price: f64,
    /// Realized quantity; zero when no fill occurred.
    pub filled_qty: f64,
    pub status: OrderStatus,
}

/// One rebalance transaction from the target-weight path. Emitted only when
/// the weight delta for an asset is non-zero on a rebalance date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub symbol: String,
    pub weight_before: f64,
    pub weight_after: f64,
    /// Signed weight change (positive = buy).
    pub weight_delta: f64,
    pub commission_cost: f64,
}

/// One point on the equity curve. The curve is append-only and strictly
/// increasing in date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub value: f64,
}
