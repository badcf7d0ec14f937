//! Position — per-asset holding owned by the OMS.

use serde::{Deserialize, Serialize};

/// A signed holding in one asset.
///
/// Owned exclusively by the execution layer; mutated only through the fill
/// path so `value == quantity * price` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Signed quantity (negative = short).
    pub quantity: f64,
    /// Last fill (mark) price.
    pub price: f64,
    /// Mark value = quantity * price.
    pub value: f64,
}

impl Position {
    pub fn flat() -> Self {
        Self {
            quantity: 0.0,
            price: 0.0,
            value: 0.0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0.0
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0.0
    }

    /// Apply a fill: adjust quantity and re-mark at the fill price.
    pub fn apply_fill(&mut self, signed_qty: f64, fill_price: f64) {
        self.quantity += signed_qty;
        self.price = fill_price;
        self.value = self.quantity * self.price;
    }
}
