//! Panel — per-date cross-sectional snapshots of the asset universe.
//!
//! A `Panel` is an ordered, append-only sequence of `CrossSection`s. Each
//! cross-section maps asset symbols to the observed `AssetDay` record for one
//! simulation date. Sections are immutable once pushed and dates must be
//! strictly increasing — the engine relies on both to rule out look-ahead.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// One asset's observation for one date.
///
/// `realized_return` is the return realized between the previous date and
/// this one, never a future value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetDay {
    /// Forecast score from the (external) scoring model.
    pub score: f64,
    /// One-period realized return, t-1 → t.
    pub realized_return: f64,
    /// Reference price, must be positive.
    pub price: f64,
    /// Traded volume / ADV proxy, must be non-negative.
    pub volume: f64,
}

/// Errors from panel construction. All are fatal: a malformed observation
/// has no sensible fallback.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("non-positive price {price} for '{symbol}' on {date}")]
    NonPositivePrice {
        symbol: String,
        date: NaiveDate,
        price: f64,
    },
    #[error("negative volume {volume} for '{symbol}' on {date}")]
    NegativeVolume {
        symbol: String,
        date: NaiveDate,
        volume: f64,
    },
    #[error("empty cross-section on {date}")]
    EmptyCrossSection { date: NaiveDate },
    #[error("out-of-order date {date}: panel already ends at {last}")]
    OutOfOrderDate { date: NaiveDate, last: NaiveDate },
}

/// All observations for a single date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossSection {
    pub date: NaiveDate,
    pub assets: BTreeMap<String, AssetDay>,
}

impl CrossSection {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            assets: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, symbol: impl Into<String>, day: AssetDay) {
        self.assets.insert(symbol.into(), day);
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Forecast scores in symbol order.
    pub fn scores(&self) -> impl Iterator<Item = (&str, f64)> {
        self.assets.iter().map(|(s, d)| (s.as_str(), d.score))
    }

    /// Realized returns in symbol order.
    pub fn returns(&self) -> impl Iterator<Item = (&str, f64)> {
        self.assets
            .iter()
            .map(|(s, d)| (s.as_str(), d.realized_return))
    }

    pub fn get(&self, symbol: &str) -> Option<&AssetDay> {
        self.assets.get(symbol)
    }
}

/// Ordered history of cross-sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Panel {
    sections: Vec<CrossSection>,
}

impl Panel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a cross-section, validating observations and date order.
    pub fn push(&mut self, section: CrossSection) -> Result<(), PanelError> {
        if section.is_empty() {
            return Err(PanelError::EmptyCrossSection { date: section.date });
        }
        if let Some(last) = self.sections.last() {
            if section.date <= last.date {
                return Err(PanelError::OutOfOrderDate {
                    date: section.date,
                    last: last.date,
                });
            }
        }
        for (symbol, day) in &section.assets {
            if day.price <= 0.0 {
                return Err(PanelError::NonPositivePrice {
                    symbol: symbol.clone(),
                    date: section.date,
                    price: day.price,
                });
            }
            if day.volume < 0.0 {
                return Err(PanelError::NegativeVolume {
                    symbol: symbol.clone(),
                    date: section.date,
                    volume: day.volume,
                });
            }
        }
        self.sections.push(section);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn sections(&self) -> &[CrossSection] {
        &self.sections
    }

    pub fn get(&self, index: usize) -> Option<&CrossSection> {
        self.sections.get(index)
    }

    /// Union of all symbols ever observed, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut set = BTreeSet::new();
        for section in &self.sections {
            for symbol in section.assets.keys() {
                set.insert(symbol.clone());
            }
        }
        set.into_iter().collect()
    }

    /// The trailing window of at most `max_len` sections strictly before
    /// index `t`. Used for return histories that must exclude the current
    /// date.
    pub fn window_before(&self, t: usize, max_len: usize) -> &[CrossSection] {
        let end = t.min(self.sections.len());
        let start = end.saturating_sub(max_len);
        &self.sections[start..end]
    }

    /// Long-format (date, symbol, return) triples over the whole panel.
    pub fn return_history(&self) -> Vec<(NaiveDate, String, f64)> {
        let mut out = Vec::new();
        for section in &self.sections {
            for (symbol, day) in &section.assets {
                out.push((section.date, symbol.clone(), day.realized_return));
            }
        }
        out
    }
}
