//! Paper-trading order management — idempotent fills with a cost model.
//!
//! Every submission carries a client order id; the OMS hashes
//! `account:symbol:client_order_id` and refuses to fill the same key twice,
//! so a retried submission is a no-op rather than a double fill. Fills are
//! synchronous and immediate at the reference price plus a fixed slippage,
//! with the full pre-trade cost estimate charged against cash.
//!
//! Expected costs are logged per order so realized implementation shortfall
//! can be reconciled against the estimate after the fact.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{FillReport, OrderSide, OrderStatus, PortfolioSnapshot, Position};

/// Fixed slippage applied to fills: buys pay up, sells receive less.
const SLIPPAGE: f64 = 0.0005;

/// Reference price for a symbol with no prior fill.
const DEFAULT_REFERENCE_PRICE: f64 = 100.0;

#[derive(Debug, Error)]
pub enum OmsError {
    #[error("order quantity must be positive and finite, got {0}")]
    InvalidQuantity(f64),
}

/// One order to submit. Quantity is unsigned; direction comes from `side`.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub account_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    /// Fill reference. When absent, the last fill price for the symbol is
    /// used (or the default for a never-traded symbol).
    pub limit_price: Option<f64>,
    pub client_order_id: String,
}

/// Market texture inputs to the cost model.
#[derive(Debug, Clone, Copy)]
pub struct CostInputs {
    pub spread_bps: f64,
    /// Expected fraction of daily volume this order represents.
    pub participation: f64,
    /// Volatility regime multiplier for the temporary-impact term.
    pub vol_cone: f64,
}

impl Default for CostInputs {
    fn default() -> Self {
        Self {
            spread_bps: 5.0,
            participation: 0.01,
            vol_cone: 1.0,
        }
    }
}

/// Shortfall reconciliation: realized slippage versus the logged estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShortfallReport {
    pub expected: f64,
    pub realized: f64,
    /// Relative error, positive when realized exceeded the estimate.
    pub slippage_error: f64,
}

/// In-memory paper OMS: cash, positions, idempotency registry, per-fill
/// equity marks.
///
/// Submission takes `&mut self`; callers that share one account across
/// threads wrap the OMS in a `Mutex`.
#[derive(Debug, Clone)]
pub struct PaperOms {
    portfolio: PortfolioSnapshot,
    idempotency_registry: BTreeSet<String>,
    expected_costs: BTreeMap<String, f64>,
    equity_curve: Vec<f64>,
}

impl PaperOms {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            portfolio: PortfolioSnapshot::all_cash(initial_cash),
            idempotency_registry: BTreeSet::new(),
            expected_costs: BTreeMap::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn portfolio(&self) -> &PortfolioSnapshot {
        &self.portfolio
    }

    pub fn portfolio_value(&self) -> f64 {
        self.portfolio.cash + self.portfolio.positions.values().map(|p| p.value).sum::<f64>()
    }

    pub fn equity_curve(&self) -> &[f64] {
        &self.equity_curve
    }

    /// P&L since the first fill. Zero before any fill.
    pub fn pnl(&self) -> f64 {
        match (self.equity_curve.first(), self.equity_curve.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    fn idempotency_key(account_id: &str, symbol: &str, client_order_id: &str) -> String {
        blake3::hash(format!("{account_id}:{symbol}:{client_order_id}").as_bytes())
            .to_hex()
            .to_string()
    }

    fn reference_price(&self, symbol: &str) -> f64 {
        self.portfolio
            .positions
            .get(symbol)
            .map(|p| p.price)
            .unwrap_or(DEFAULT_REFERENCE_PRICE)
    }

    /// Pre-trade cost estimate: commission, half-spread, permanent impact
    /// linear in participation, temporary impact in √participation.
    pub fn estimate_cost(&self, qty: f64, price: f64, inputs: &CostInputs) -> f64 {
        let notional = qty.abs() * price;
        let commission = 0.0005 * notional;
        let spread_cost = 0.5 * (inputs.spread_bps / 10_000.0) * notional;
        let permanent = 0.1 * inputs.participation * notional;
        let temporary = 0.01 * inputs.vol_cone * inputs.participation.sqrt() * notional;
        commission + spread_cost + permanent + temporary
    }

    /// Submit one order. Duplicate keys are acknowledged without any state
    /// change; fresh orders fill immediately with slippage and the cost
    /// estimate deducted from cash.
    pub fn submit(
        &mut self,
        order: &OrderRequest,
        costs: &CostInputs,
    ) -> Result<FillReport, OmsError> {
        if !(order.quantity > 0.0) || !order.quantity.is_finite() {
            return Err(OmsError::InvalidQuantity(order.quantity));
        }

        let key = Self::idempotency_key(&order.account_id, &order.symbol, &order.client_order_id);
        if self.idempotency_registry.contains(&key) {
            return Ok(FillReport {
                account_id: order.account_id.clone(),
                symbol: order.symbol.clone(),
                side: order.side,
                requested_qty: order.quantity,
                client_order_id: order.client_order_id.clone(),
                expected_cost: 0.0,
                fill_price: 0.0,
                filled_qty: 0.0,
                status: OrderStatus::IgnoredDuplicate,
            });
        }
        self.idempotency_registry.insert(key);

        let reference = order
            .limit_price
            .unwrap_or_else(|| self.reference_price(&order.symbol));
        let expected_cost = self.estimate_cost(order.quantity, reference, costs);
        self.expected_costs
            .insert(order.client_order_id.clone(), expected_cost);

        let sign = order.side.sign();
        let fill_price = reference * (1.0 + sign * SLIPPAGE);
        let filled_qty = order.quantity;

        self.portfolio.cash -= sign * filled_qty * fill_price + expected_cost;
        self.portfolio
            .positions
            .entry(order.symbol.clone())
            .or_insert_with(Position::flat)
            .apply_fill(sign * filled_qty, fill_price);
        self.portfolio.total_value = self.portfolio_value();
        self.equity_curve.push(self.portfolio.total_value);

        Ok(FillReport {
            account_id: order.account_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            requested_qty: order.quantity,
            client_order_id: order.client_order_id.clone(),
            expected_cost,
            fill_price,
            filled_qty,
            status: OrderStatus::Filled,
        })
    }

    /// Reconcile realized shortfall against the estimate logged at
    /// submission. Unknown order ids reconcile against a zero estimate.
    pub fn validate_shortfall(
        &self,
        client_order_id: &str,
        arrival_price: f64,
        avg_fill_price: f64,
        filled_qty: f64,
    ) -> ShortfallReport {
        let expected = self
            .expected_costs
            .get(client_order_id)
            .copied()
            .unwrap_or(0.0);
        let realized = (avg_fill_price - arrival_price).abs() * filled_qty.abs();
        let slippage_error = (realized - expected) / (expected + 1e-8);
        ShortfallReport {
            expected,
            realized,
            slippage_error,
        }
    }
}
