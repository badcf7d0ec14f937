//! Weight vectors — signed portfolio weights keyed by symbol.
//!
//! `WeightVec` is the common currency between the optimizer, the Kelly
//! sizer, and the engine. BTreeMap keeps iteration deterministic so blends
//! and distances are reproducible across runs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Signed portfolio weights by symbol. Absent symbols are implicitly zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightVec(BTreeMap<String, f64>);

impl WeightVec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: impl Into<String>, weight: f64) {
        self.0.insert(symbol.into(), weight);
    }

    pub fn get(&self, symbol: &str) -> f64 {
        self.0.get(symbol).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(s, w)| (s.as_str(), *w))
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|s| s.as_str())
    }

    /// Gross leverage: sum of absolute weights.
    pub fn gross(&self) -> f64 {
        self.0.values().map(|w| w.abs()).sum()
    }

    /// Net exposure: sum of signed weights.
    pub fn net(&self) -> f64 {
        self.0.values().sum()
    }

    /// Rescale so gross leverage equals `target`. A zero vector is returned
    /// unchanged.
    pub fn rescaled_gross(mut self, target: f64) -> Self {
        let gross = self.gross();
        if gross > 0.0 {
            let factor = target / gross;
            for w in self.0.values_mut() {
                *w *= factor;
            }
        }
        self
    }

    /// Multiply every weight by `factor`.
    pub fn scaled(mut self, factor: f64) -> Self {
        for w in self.0.values_mut() {
            *w *= factor;
        }
        self
    }

    /// Clamp every weight into `[-bound, bound]`.
    pub fn clipped(mut self, bound: f64) -> Self {
        for w in self.0.values_mut() {
            *w = w.clamp(-bound, bound);
        }
        self
    }

    /// Convex blend over the union of symbols: `ratio * self + (1 - ratio) * other`.
    pub fn blend(&self, other: &WeightVec, ratio: f64) -> WeightVec {
        let mut symbols: BTreeSet<&str> = self.symbols().collect();
        symbols.extend(other.symbols());
        let mut out = WeightVec::new();
        for symbol in symbols {
            let w = ratio * self.get(symbol) + (1.0 - ratio) * other.get(symbol);
            out.insert(symbol, w);
        }
        out
    }

    /// L1 distance over the union of symbols. This is the turnover implied
    /// by moving from `self` to `other`.
    pub fn l1_distance(&self, other: &WeightVec) -> f64 {
        let mut symbols: BTreeSet<&str> = self.symbols().collect();
        symbols.extend(other.symbols());
        symbols
            .into_iter()
            .map(|s| (self.get(s) - other.get(s)).abs())
            .sum()
    }

    /// Dot product with per-symbol values (e.g. realized returns). Symbols
    /// missing from `values` contribute zero.
    pub fn dot(&self, values: &BTreeMap<String, f64>) -> f64 {
        self.iter()
            .map(|(s, w)| w * values.get(s).copied().unwrap_or(0.0))
            .sum()
    }
}

impl FromIterator<(String, f64)> for WeightVec {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
