//! Bootstrap Kelly sizer — risk- and liquidity-constrained position sizing.
//!
//! Bootstraps the plug-in Kelly solution `Σ⁻¹μ` over resampled return
//! histories, keeps a conservative lower percentile per asset, applies a
//! fractional-Kelly haircut, then enforces an expected-shortfall budget and
//! an ADV participation ceiling.
//!
//! Draws are independent, so they run in parallel under rayon; each draw
//! derives its own RNG stream from the base seed, which keeps the aggregate
//! identical regardless of scheduling order.

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;

use crate::config::KellyConfig;
use crate::domain::WeightVec;
use crate::metrics::{expected_shortfall, percentile_sorted};

/// Aligned return history: one row per date, one column per symbol.
#[derive(Debug, Clone)]
pub struct ReturnsMatrix {
    pub symbols: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl ReturnsMatrix {
    pub fn new(symbols: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == symbols.len()));
        Self { symbols, rows }
    }

    pub fn n_assets(&self) -> usize {
        self.symbols.len()
    }

    pub fn n_obs(&self) -> usize {
        self.rows.len()
    }
}

/// Accessors the liquidity cap needs. When absent, the cap is skipped.
pub struct LiquidityInputs<'a> {
    pub price_of: &'a dyn Fn(&str) -> f64,
    pub adv_of: &'a dyn Fn(&str) -> f64,
    pub portfolio_value: f64,
}

/// Errors from sizing. Only a history too short to resample is fatal;
/// numerical trouble inside a bootstrap draw degrades to a zero vector for
/// that draw alone.
#[derive(Debug, Error)]
pub enum SizerError {
    #[error("insufficient history: {rows} rows < minimum 2")]
    InsufficientHistory { rows: usize },
    #[error("empty asset universe")]
    EmptyUniverse,
}

/// Risk-adjusted bootstrap Kelly sizer.
#[derive(Debug, Clone)]
pub struct KellySizer {
    config: KellyConfig,
}

impl KellySizer {
    pub fn new(config: KellyConfig) -> Self {
        Self { config }
    }

    /// Produce a conservative Kelly weight vector for the given history.
    ///
    /// Output weights may be asymmetric and do not sum to any particular
    /// value; the engine blends them with the rank baseline downstream.
    pub fn size(
        &self,
        returns: &ReturnsMatrix,
        liquidity: Option<&LiquidityInputs>,
    ) -> Result<WeightVec, SizerError> {
        let n = returns.n_assets();
        let t = returns.n_obs();
        if n == 0 {
            return Err(SizerError::EmptyUniverse);
        }
        if t < 2 {
            return Err(SizerError::InsufficientHistory { rows: t });
        }

        // Bootstrap the Kelly solution across resampled histories.
        let draws: Vec<DVector<f64>> = (0..self.config.n_bootstrap)
            .into_par_iter()
            .map(|draw| self.kelly_for_draw(returns, draw as u64))
            .collect();

        // Per asset, keep the conservative lower percentile, then apply the
        // fractional-Kelly haircut.
        let lower_pct = (1.0 - self.config.confidence) * 100.0 / 2.0;
        let mut weights: Vec<f64> = (0..n)
            .map(|j| {
                let mut column: Vec<f64> = draws.iter().map(|k| k[j]).collect();
                column.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                percentile_sorted(&column, lower_pct) * self.config.fraction
            })
            .collect();

        // Expected-shortfall budget: rescale so realized tail risk matches
        // the budget exactly when it would otherwise exceed it.
        let portfolio: Vec<f64> = returns
            .rows
            .iter()
            .map(|row| row.iter().zip(&weights).map(|(r, w)| r * w).sum())
            .collect();
        let es = expected_shortfall(&portfolio, self.config.es_tail);
        if es.abs() > self.config.es_budget && self.config.es_budget > 0.0 {
            let factor = self.config.es_budget / es.abs();
            for w in &mut weights {
                *w *= factor;
            }
        }

        // Liquidity cap: participation = |w|·V / (ADV·px) per asset.
        if let Some(liq) = liquidity {
            for (j, symbol) in returns.symbols.iter().enumerate() {
                let px = (liq.price_of)(symbol).max(1e-6);
                let adv = (liq.adv_of)(symbol).max(1.0);
                let participation = weights[j].abs() * liq.portfolio_value / (adv * px);
                if participation > self.config.adv_limit {
                    weights[j] *= self.config.adv_limit / participation;
                }
            }
        }

        Ok(returns
            .symbols
            .iter()
            .cloned()
            .zip(weights)
            .collect())
    }

    /// One bootstrap draw: resample rows with replacement, solve the
    /// regularized Kelly system. Numerical failure yields a zero vector for
    /// this draw only.
    fn kelly_for_draw(&self, returns: &ReturnsMatrix, draw: u64) -> DVector<f64> {
        let n = returns.n_assets();
        let t = returns.n_obs();

        // Independent per-draw stream: splitmix-style spread of the base seed.
        let seed = self
            .config
            .seed
            .wrapping_add(draw.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let mut rng = StdRng::seed_from_u64(seed);

        let sample: Vec<&Vec<f64>> = (0..t)
            .map(|_| &returns.rows[rng.gen_range(0..t)])
            .collect();

        let means: Vec<f64> = (0..n)
            .map(|j| sample.iter().map(|r| r[j]).sum::<f64>() / t as f64)
            .collect();
        let mut cov = DMatrix::from_fn(n, n, |i, j| {
            sample
                .iter()
                .map(|r| (r[i] - means[i]) * (r[j] - means[j]))
                .sum::<f64>()
                / (t - 1) as f64
        });
        // Diagonal jitter guards the solve against singular covariance.
        for i in 0..n {
            cov[(i, i)] += 1e-8;
        }

        let mu = DVector::from_vec(means);
        match cov.cholesky() {
            Some(chol) => {
                let k = chol.solve(&mu);
                if k.iter().all(|v| v.is_finite()) {
                    k
                } else {
                    DVector::zeros(n)
                }
            }
            None => DVector::zeros(n),
        }
    }
}
