//! Weight solvers: convex QP and the deterministic ranking fallback.
//!
//! The optimizer always talks to the `WeightSolver` trait and never branches
//! on solver availability. `QpSolver` can fail (non-convergence, infeasible
//! constraint set, numerical blowup); `RankSolver` never fails and is the
//! recovery path.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Constraint set for one optimization call. Index-aligned with the μ/Σ
/// ordering supplied to `solve`.
#[derive(Debug, Clone)]
pub struct Constraints {
    /// Σ|wᵢ| ≤ max_gross.
    pub max_gross: f64,
    /// net_target − net_tolerance ≤ Σwᵢ ≤ net_target + net_tolerance.
    pub net_target: f64,
    pub net_tolerance: f64,
    /// |wᵢ| ≤ max_asset.
    pub max_asset: f64,
    /// Per-sector (member indices, L1 cap) pairs.
    pub sector_caps: Vec<(Vec<usize>, f64)>,
}

/// Errors a solver may report. All are recoverable by falling back.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("did not converge within {iterations} iterations")]
    NotConverged { iterations: usize },
    #[error("constraint set infeasible: {detail}")]
    Infeasible { detail: String },
    #[error("numerical failure: non-finite iterate")]
    NonFinite,
}

/// Strategy interface for turning (μ, Σ, constraints) into weights.
pub trait WeightSolver: Send + Sync {
    fn solve(
        &self,
        mu: &DVector<f64>,
        sigma: &DMatrix<f64>,
        constraints: &Constraints,
    ) -> Result<DVector<f64>, SolverError>;

    fn name(&self) -> &str;
}

// ─── Convex QP via projected gradient ───────────────────────────────

/// Projected-gradient solver for `max μᵀw − λ·wᵀΣw` over the constraint set.
///
/// Gradient ascent with a Lipschitz-derived step size, followed by cyclic
/// projection onto the box, net band, sector caps, and gross-leverage ball.
/// Cyclic projection onto an intersection of convex sets converges for this
/// geometry; residual violation above tolerance after the iteration budget is
/// reported as infeasible.
#[derive(Debug, Clone)]
pub struct QpSolver {
    pub risk_aversion: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl QpSolver {
    pub fn new(risk_aversion: f64, max_iterations: usize, tolerance: f64) -> Self {
        Self {
            risk_aversion,
            max_iterations,
            tolerance,
        }
    }

    fn project(&self, w: &mut DVector<f64>, c: &Constraints) {
        // A few cyclic passes; each projection is cheap and idempotent.
        for _ in 0..4 {
            // Box
            for v in w.iter_mut() {
                *v = v.clamp(-c.max_asset, c.max_asset);
            }
            // Net exposure band: shift uniformly into the band.
            let n = w.len() as f64;
            let net: f64 = w.iter().sum();
            let clamped = net.clamp(c.net_target - c.net_tolerance, c.net_target + c.net_tolerance);
            if (net - clamped).abs() > 0.0 {
                let shift = (net - clamped) / n;
                for v in w.iter_mut() {
                    *v -= shift;
                }
            }
            // Sector L1 caps: shrink the offending group.
            for (members, cap) in &c.sector_caps {
                let group_gross: f64 = members.iter().map(|&i| w[i].abs()).sum();
                if group_gross > *cap && group_gross > 0.0 {
                    let factor = cap / group_gross;
                    for &i in members {
                        w[i] *= factor;
                    }
                }
            }
            // Gross leverage ball: direction-preserving shrink.
            let gross: f64 = w.iter().map(|v| v.abs()).sum();
            if gross > c.max_gross && gross > 0.0 {
                let factor = c.max_gross / gross;
                for v in w.iter_mut() {
                    *v *= factor;
                }
            }
        }
    }

    fn violation(&self, w: &DVector<f64>, c: &Constraints) -> f64 {
        let mut worst = 0.0_f64;
        for v in w.iter() {
            worst = worst.max(v.abs() - c.max_asset);
        }
        let net: f64 = w.iter().sum();
        worst = worst.max((net - c.net_target).abs() - c.net_tolerance);
        let gross: f64 = w.iter().map(|v| v.abs()).sum();
        worst = worst.max(gross - c.max_gross);
        for (members, cap) in &c.sector_caps {
            let group: f64 = members.iter().map(|&i| w[i].abs()).sum();
            worst = worst.max(group - cap);
        }
        worst
    }
}

impl WeightSolver for QpSolver {
    fn solve(
        &self,
        mu: &DVector<f64>,
        sigma: &DMatrix<f64>,
        constraints: &Constraints,
    ) -> Result<DVector<f64>, SolverError> {
        let n = mu.len();
        if constraints.max_asset <= 0.0 || constraints.max_gross <= 0.0 {
            return Err(SolverError::Infeasible {
                detail: "non-positive weight bounds".to_string(),
            });
        }

        // Lipschitz constant of the gradient: 2λ‖Σ‖∞ (plus slack so a zero
        // matrix still yields a finite step).
        let sigma_norm = (0..n)
            .map(|i| (0..n).map(|j| sigma[(i, j)].abs()).sum::<f64>())
            .fold(0.0_f64, f64::max);
        let step = 1.0 / (2.0 * self.risk_aversion * sigma_norm + 1.0);

        let mut w = DVector::zeros(n);
        self.project(&mut w, constraints);

        for _ in 0..self.max_iterations {
            // ∇(μᵀw − λ wᵀΣw) = μ − 2λΣw
            let grad = mu - (sigma * &w) * (2.0 * self.risk_aversion);
            let mut next = &w + grad * step;
            self.project(&mut next, constraints);

            if next.iter().any(|v| !v.is_finite()) {
                return Err(SolverError::NonFinite);
            }

            let delta = (&next - &w).norm();
            w = next;
            if delta < self.tolerance {
                if self.violation(&w, constraints) > 1e-6 {
                    return Err(SolverError::Infeasible {
                        detail: "converged outside the feasible region".to_string(),
                    });
                }
                return Ok(w);
            }
        }

        if self.violation(&w, constraints) > 1e-6 {
            return Err(SolverError::Infeasible {
                detail: "iteration budget exhausted outside the feasible region".to_string(),
            });
        }
        Err(SolverError::NotConverged {
            iterations: self.max_iterations,
        })
    }

    fn name(&self) -> &str {
        "QpSolver"
    }
}

// ─── Deterministic ranking fallback ─────────────────────────────────

/// Closed-form fallback weighting. Never fails.
///
/// Positive and negative forecasts are weighted proportionally to their
/// magnitude within each group; the short leg is subtracted from the long
/// leg and the result rescaled so gross leverage equals exactly `max_gross`.
/// All-zero forecasts yield equal weights across the universe.
#[derive(Debug, Clone, Copy, Default)]
pub struct RankSolver;

impl RankSolver {
    pub fn weights(mu: &DVector<f64>, max_gross: f64) -> DVector<f64> {
        let n = mu.len();
        let pos_sum: f64 = mu.iter().filter(|v| **v > 0.0).sum();
        let neg_sum: f64 = mu.iter().filter(|v| **v < 0.0).map(|v| -v).sum();

        let mut w = DVector::zeros(n);
        if pos_sum + neg_sum == 0.0 {
            for v in w.iter_mut() {
                *v = 1.0 / n as f64;
            }
        } else {
            for (i, &m) in mu.iter().enumerate() {
                w[i] = if m > 0.0 {
                    m / (pos_sum + 1e-8)
                } else if m < 0.0 {
                    m / (neg_sum + 1e-8)
                } else {
                    0.0
                };
            }
        }

        let gross: f64 = w.iter().map(|v| v.abs()).sum();
        if gross > 0.0 {
            w *= max_gross / gross;
        }
        w
    }
}

impl WeightSolver for RankSolver {
    fn solve(
        &self,
        mu: &DVector<f64>,
        _sigma: &DMatrix<f64>,
        constraints: &Constraints,
    ) -> Result<DVector<f64>, SolverError> {
        Ok(Self::weights(mu, constraints.max_gross))
    }

    fn name(&self) -> &str {
        "RankSolver"
    }
}
