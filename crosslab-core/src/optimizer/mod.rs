//! Constrained portfolio optimizer.
//!
//! Converts forecast scores into risk-aware target weights by maximizing
//! `μᵀw − λ·wᵀΣw` under gross/net/per-asset/sector constraints. Solver
//! failure is never fatal: the deterministic ranking fallback always
//! produces a bounded-leverage weight vector.

pub mod solver;

use chrono::NaiveDate;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::config::OptimizerConfig;
use crate::domain::WeightVec;
use solver::{Constraints, QpSolver, RankSolver, WeightSolver};

/// Errors from optimization. Only malformed input is fatal; solver trouble
/// is recovered internally.
#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("no assets to optimize")]
    EmptyUniverse,
}

/// Result of one optimization call. Created once, consumed the same step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub weights: WeightVec,
    /// μᵀw with the final weights.
    pub expected_return: f64,
    /// wᵀΣw with the final weights.
    pub risk: f64,
    /// Objective value; NaN when the fallback produced the weights.
    pub objective_value: f64,
    /// "optimal" or "fallback: <reason>".
    pub status: String,
}

// ─── Covariance estimation ──────────────────────────────────────────

/// Sample covariance aligned to an explicit symbol ordering.
#[derive(Debug, Clone)]
pub struct Covariance {
    pub symbols: Vec<String>,
    pub matrix: DMatrix<f64>,
}

impl Covariance {
    /// Small-diagonal prior used when history is too short to estimate.
    pub fn weak_prior(symbols: Vec<String>) -> Self {
        let n = symbols.len();
        Self {
            symbols,
            matrix: DMatrix::identity(n, n) * 1e-4,
        }
    }

    /// Reindex to `symbols` order, filling unknown pairs with zero (matching
    /// the original pivot-and-fill behavior).
    pub fn reindex(&self, symbols: &[String]) -> DMatrix<f64> {
        let pos: BTreeMap<&str, usize> = self
            .symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();
        let n = symbols.len();
        DMatrix::from_fn(n, n, |i, j| {
            match (pos.get(symbols[i].as_str()), pos.get(symbols[j].as_str())) {
                (Some(&a), Some(&b)) => self.matrix[(a, b)],
                _ => 0.0,
            }
        })
    }
}

/// Estimate a trailing-window sample covariance from long-format
/// (date, symbol, return) history.
///
/// Dates missing any requested symbol are dropped (complete-case pivot);
/// the most recent `lookback` complete rows are used. Fewer than two usable
/// rows degrade to the weak diagonal prior rather than erroring.
pub fn estimate_covariance(
    history: &[(NaiveDate, String, f64)],
    symbols: &[String],
    lookback: usize,
) -> Covariance {
    // Pivot: date → symbol → return, restricted to the requested universe.
    let mut by_date: BTreeMap<NaiveDate, BTreeMap<&str, f64>> = BTreeMap::new();
    for (date, symbol, ret) in history {
        if symbols.iter().any(|s| s == symbol) {
            by_date.entry(*date).or_default().insert(symbol.as_str(), *ret);
        }
    }

    let complete: Vec<Vec<f64>> = by_date
        .values()
        .filter(|row| symbols.iter().all(|s| row.contains_key(s.as_str())))
        .map(|row| symbols.iter().map(|s| row[s.as_str()]).collect())
        .collect();

    let rows: Vec<&Vec<f64>> = complete
        .iter()
        .skip(complete.len().saturating_sub(lookback))
        .collect();

    if rows.len() < 2 {
        return Covariance::weak_prior(symbols.to_vec());
    }

    let n = symbols.len();
    let t = rows.len() as f64;
    let means: Vec<f64> = (0..n)
        .map(|j| rows.iter().map(|r| r[j]).sum::<f64>() / t)
        .collect();
    let matrix = DMatrix::from_fn(n, n, |i, j| {
        rows.iter()
            .map(|r| (r[i] - means[i]) * (r[j] - means[j]))
            .sum::<f64>()
            / (t - 1.0)
    });

    Covariance {
        symbols: symbols.to_vec(),
        matrix,
    }
}

// ─── Optimizer facade ───────────────────────────────────────────────

/// Constrained mean-variance optimizer with a guaranteed fallback path.
pub struct PortfolioOptimizer {
    config: OptimizerConfig,
    solver: Box<dyn WeightSolver>,
}

impl PortfolioOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        let solver = Box::new(QpSolver::new(
            config.risk_aversion,
            config.max_iterations,
            config.tolerance,
        ));
        Self { config, solver }
    }

    /// Inject a custom solver (tests force failures through this seam).
    pub fn with_solver(config: OptimizerConfig, solver: Box<dyn WeightSolver>) -> Self {
        Self { config, solver }
    }

    /// Optimize weights for the given expectations.
    ///
    /// `sectors` maps symbols to sector labels; missing symbols default to
    /// "Unknown". An empty universe is the only fatal condition.
    pub fn optimize(
        &self,
        expected_returns: &BTreeMap<String, f64>,
        covariance: &Covariance,
        sectors: &BTreeMap<String, String>,
    ) -> Result<OptimizationResult, OptimizeError> {
        let symbols: Vec<String> = expected_returns.keys().cloned().collect();
        if symbols.is_empty() {
            return Err(OptimizeError::EmptyUniverse);
        }

        let mu = DVector::from_iterator(
            symbols.len(),
            symbols.iter().map(|s| expected_returns[s]),
        );
        let sigma = covariance.reindex(&symbols);
        let constraints = self.build_constraints(&symbols, sectors);

        match self.solver.solve(&mu, &sigma, &constraints) {
            Ok(raw) => {
                // Normalize gross leverage to exactly the ceiling, matching
                // the original post-solve rescale.
                let gross: f64 = raw.iter().map(|v| v.abs()).sum();
                let w = if gross > 0.0 {
                    raw * (self.config.max_gross_leverage / gross)
                } else {
                    raw
                };
                let objective =
                    mu.dot(&w) - self.config.risk_aversion * (&sigma * &w).dot(&w);
                Ok(self.result(&symbols, w, &mu, &sigma, objective, "optimal".to_string()))
            }
            Err(err) => {
                let w = RankSolver::weights(&mu, self.config.max_gross_leverage);
                Ok(self.result(
                    &symbols,
                    w,
                    &mu,
                    &sigma,
                    f64::NAN,
                    format!("fallback: {err}"),
                ))
            }
        }
    }

    fn build_constraints(
        &self,
        symbols: &[String],
        sectors: &BTreeMap<String, String>,
    ) -> Constraints {
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, symbol) in symbols.iter().enumerate() {
            let sector = sectors
                .get(symbol)
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string());
            groups.entry(sector).or_default().push(i);
        }

        let tech = self.config.tech_sector_label.to_lowercase();
        let sector_caps = groups
            .into_iter()
            .filter_map(|(sector, members)| {
                let cap = if sector.to_lowercase().starts_with(&tech) {
                    self.config.max_tech_sector_weight
                } else {
                    self.config.max_sector_weight
                };
                (cap > 0.0).then_some((members, cap))
            })
            .collect();

        Constraints {
            max_gross: self.config.max_gross_leverage,
            net_target: self.config.net_exposure_target,
            net_tolerance: self.config.net_exposure_tolerance,
            max_asset: self.config.max_asset_weight,
            sector_caps,
        }
    }

    fn result(
        &self,
        symbols: &[String],
        w: DVector<f64>,
        mu: &DVector<f64>,
        sigma: &DMatrix<f64>,
        objective: f64,
        status: String,
    ) -> OptimizationResult {
        let expected_return = mu.dot(&w);
        let risk = (sigma * &w).dot(&w);
        let weights = symbols
            .iter()
            .zip(w.iter())
            .map(|(s, v)| (s.clone(), *v))
            .collect();
        OptimizationResult {
            weights,
            expected_return,
            risk,
            objective_value: objective,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solver::SolverError;

    fn returns_map(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(s, v)| (s.to_string(), *v)).collect()
    }

    fn symbols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Solver that always fails, to exercise the fallback path.
    struct AlwaysFails;

    impl WeightSolver for AlwaysFails {
        fn solve(
            &self,
            _mu: &DVector<f64>,
            _sigma: &DMatrix<f64>,
            _constraints: &Constraints,
        ) -> Result<DVector<f64>, SolverError> {
            Err(SolverError::NotConverged { iterations: 0 })
        }

        fn name(&self) -> &str {
            "AlwaysFails"
        }
    }

    #[test]
    fn empty_universe_is_fatal() {
        let optimizer = PortfolioOptimizer::new(OptimizerConfig::default());
        let cov = Covariance::weak_prior(Vec::new());
        let result = optimizer.optimize(&BTreeMap::new(), &cov, &BTreeMap::new());
        assert!(matches!(result, Err(OptimizeError::EmptyUniverse)));
    }

    #[test]
    fn long_short_scenario() {
        // μ = [0.01, -0.01, 0.0], diagonal Σ = 0.02, gross 2.0, net 0 ± 0.1.
        let config = OptimizerConfig {
            max_asset_weight: 2.0,
            net_exposure_tolerance: 0.1,
            max_sector_weight: 0.0, // disables sector caps
            max_tech_sector_weight: 0.0,
            ..OptimizerConfig::default()
        };
        let optimizer = PortfolioOptimizer::new(config);
        let mu = returns_map(&[("A", 0.01), ("B", -0.01), ("C", 0.0)]);
        let cov = Covariance {
            symbols: symbols(&["A", "B", "C"]),
            matrix: DMatrix::from_diagonal(&DVector::from_vec(vec![0.02, 0.02, 0.02])),
        };
        let result = optimizer.optimize(&mu, &cov, &BTreeMap::new()).unwrap();

        let w = &result.weights;
        assert!(w.get("A") > 0.0);
        assert!(w.get("B") < 0.0);
        assert!((w.get("A") + w.get("B")).abs() < 0.15, "roughly equal legs");
        assert!(w.get("C").abs() < 0.15, "zero forecast stays near zero");
        assert!((w.gross() - 2.0).abs() < 1e-6, "gross ≈ 2.0, got {}", w.gross());
    }

    #[test]
    fn forced_solver_failure_falls_back_with_exact_gross() {
        let config = OptimizerConfig::default();
        let max_gross = config.max_gross_leverage;
        let optimizer = PortfolioOptimizer::with_solver(config, Box::new(AlwaysFails));
        let mu = returns_map(&[("A", 0.02), ("B", -0.01)]);
        let cov = Covariance::weak_prior(symbols(&["A", "B"]));
        let result = optimizer.optimize(&mu, &cov, &BTreeMap::new()).unwrap();

        assert!(result.status.starts_with("fallback"));
        assert!(result.objective_value.is_nan());
        assert!((result.weights.gross() - max_gross).abs() < 1e-9);
    }

    #[test]
    fn covariance_short_history_degrades_to_prior() {
        let syms = symbols(&["A", "B"]);
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let history = vec![(date, "A".to_string(), 0.01), (date, "B".to_string(), 0.02)];
        let cov = estimate_covariance(&history, &syms, 60);
        assert_eq!(cov.matrix[(0, 0)], 1e-4);
        assert_eq!(cov.matrix[(0, 1)], 0.0);
    }

    #[test]
    fn covariance_matches_hand_computation() {
        let syms = symbols(&["A", "B"]);
        let mut history = Vec::new();
        let rets_a = [0.01, 0.02, 0.03];
        let rets_b = [0.03, 0.02, 0.01];
        for (i, (ra, rb)) in rets_a.iter().zip(rets_b.iter()).enumerate() {
            let date = NaiveDate::from_ymd_opt(2024, 1, 2 + i as u32).unwrap();
            history.push((date, "A".to_string(), *ra));
            history.push((date, "B".to_string(), *rb));
        }
        let cov = estimate_covariance(&history, &syms, 60);
        // var = 1e-4 for both, covariance = -1e-4 (perfect anti-correlation).
        assert!((cov.matrix[(0, 0)] - 1e-4).abs() < 1e-12);
        assert!((cov.matrix[(1, 1)] - 1e-4).abs() < 1e-12);
        assert!((cov.matrix[(0, 1)] + 1e-4).abs() < 1e-12);
    }

    #[test]
    fn covariance_drops_incomplete_dates() {
        let syms = symbols(&["A", "B"]);
        let mut history = Vec::new();
        for i in 0..5u32 {
            let date = NaiveDate::from_ymd_opt(2024, 1, 2 + i).unwrap();
            history.push((date, "A".to_string(), 0.01));
            if i != 2 {
                history.push((date, "B".to_string(), 0.01));
            }
        }
        // 4 complete rows, constant returns → zero covariance everywhere.
        let cov = estimate_covariance(&history, &syms, 60);
        assert!(cov.matrix[(0, 0)].abs() < 1e-15);
    }

    #[test]
    fn tech_sector_gets_distinct_cap() {
        let config = OptimizerConfig::default();
        let optimizer = PortfolioOptimizer::new(config.clone());
        let sectors: BTreeMap<String, String> = [
            ("A".to_string(), "Technology".to_string()),
            ("B".to_string(), "Energy".to_string()),
        ]
        .into();
        let constraints = optimizer.build_constraints(&symbols(&["A", "B"]), &sectors);
        assert_eq!(constraints.sector_caps.len(), 2);
        let caps: Vec<f64> = constraints.sector_caps.iter().map(|(_, c)| *c).collect();
        assert!(caps.contains(&config.max_tech_sector_weight));
        assert!(caps.contains(&config.max_sector_weight));
    }
}
