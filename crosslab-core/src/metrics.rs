//! Performance metrics — pure functions, no state.
//!
//! Every function here is a straight computation: return series or equity
//! curve in, scalar (or fold list) out. The sizer and the risk monitor share
//! `expected_shortfall`; the validation layer shares `cpcv_folds`,
//! `deflated_sharpe`, and `pbo_binary`.

use serde::{Deserialize, Serialize};

/// Trading days per year used for annualization.
pub const ANN_FACTOR: f64 = 252.0;

/// Aggregate performance summary for one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub total_return: f64,
    pub cagr: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub max_drawdown: f64,
    pub calmar: f64,
    pub win_rate: f64,
    /// Days where turnover exceeded the rebalance threshold.
    pub n_trades: usize,
}

// ─── Return-series metrics ──────────────────────────────────────────

/// Daily returns from an equity curve.
pub fn daily_returns(equity_curve: &[f64]) -> Vec<f64> {
    if equity_curve.len() < 2 {
        return Vec::new();
    }
    equity_curve
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

/// Total return over an equity curve: (final - initial) / initial.
pub fn total_return(equity_curve: &[f64]) -> f64 {
    if equity_curve.len() < 2 {
        return 0.0;
    }
    let initial = equity_curve[0];
    if initial <= 0.0 {
        return 0.0;
    }
    (equity_curve[equity_curve.len() - 1] - initial) / initial
}

/// CAGR-style annualization of a mean daily return: (1 + mean)^252 - 1.
pub fn cagr(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    (1.0 + mean(returns)).powf(ANN_FACTOR) - 1.0
}

/// Annualized Sharpe ratio of a daily return series.
///
/// Returns 0.0 when variance is zero or fewer than two observations exist.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let sd = std_dev(returns);
    if sd < 1e-15 {
        return 0.0;
    }
    (mean(returns) / sd) * ANN_FACTOR.sqrt()
}

/// Annualized Sortino ratio: mean over downside deviation.
///
/// Returns 0.0 when there is no downside.
pub fn sortino_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let downside_sd = std_dev(&downside);
    if downside_sd < 1e-15 {
        return 0.0;
    }
    (mean(returns) / downside_sd) * ANN_FACTOR.sqrt()
}

/// Maximum drawdown of an equity curve, as a negative fraction.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    if equity_curve.len() < 2 {
        return 0.0;
    }
    let mut peak = equity_curve[0];
    let mut worst = 0.0_f64;
    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            let dd = (eq - peak) / peak;
            if dd < worst {
                worst = dd;
            }
        }
    }
    worst
}

/// Calmar ratio: annualized mean return over |max drawdown|.
pub fn calmar_ratio(returns: &[f64], equity_curve: &[f64]) -> f64 {
    let mdd = max_drawdown(equity_curve).abs();
    if mdd == 0.0 {
        return 0.0;
    }
    mean(returns) * ANN_FACTOR / mdd
}

/// Fraction of days with a strictly positive return.
pub fn win_rate(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    returns.iter().filter(|r| **r > 0.0).count() as f64 / returns.len() as f64
}

/// Expected shortfall: mean return in the worst `1 - q` tail.
///
/// `q` is the confidence level (0.95 → mean of the worst 5%). The result is
/// typically negative; callers compare magnitudes.
pub fn expected_shortfall(returns: &[f64], q: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let cutoff = percentile_sorted(&sorted, (1.0 - q) * 100.0);
    let tail: Vec<f64> = sorted.iter().copied().filter(|r| *r <= cutoff).collect();
    if tail.is_empty() {
        0.0
    } else {
        mean(&tail)
    }
}

// ─── Overfitting control ────────────────────────────────────────────

/// Deflated Sharpe ratio: subtract a multiple-testing penalty and floor at 0.
///
/// Penalty = sqrt(max(ln(n_trials), 0) / T). Degenerate sample sizes (T <= 2)
/// return 0.0.
pub fn deflated_sharpe(sharpe: f64, t: usize, n_trials: usize) -> f64 {
    if t <= 2 {
        return 0.0;
    }
    let penalty = ((n_trials.max(1) as f64).ln().max(0.0) / t.max(1) as f64).sqrt();
    (sharpe - penalty).max(0.0)
}

/// Contiguous-block cross-validation folds: `(train, test)` index lists.
///
/// The sample is partitioned into `n_splits` contiguous test blocks (the last
/// block absorbs the remainder); the train set is everything outside the test
/// block. Known limitation: no purge/embargo gap is applied at the block
/// boundaries, so labels that overlap a boundary can leak between train and
/// test.
pub fn cpcv_folds(n: usize, n_splits: usize) -> Vec<(Vec<usize>, Vec<usize>)> {
    if n_splits == 0 {
        return vec![((0..n).collect(), (0..n).collect())];
    }
    let fold = n / n_splits;
    let mut folds = Vec::with_capacity(n_splits);
    for idx in 0..n_splits {
        let start = idx * fold;
        let end = if idx < n_splits - 1 { (idx + 1) * fold } else { n };
        let test: Vec<usize> = (start..end).collect();
        let train: Vec<usize> = (0..start).chain(end..n).collect();
        folds.push((train, test));
    }
    folds
}

/// Binary probability-of-backtest-overfitting proxy.
///
/// 0.0 when the best in-sample fold index matches the best out-of-sample fold
/// index, 1.0 otherwise. Mismatched lengths or empty inputs return 1.0
/// (maximal evidence). This is a coarse proxy, not a continuous estimate.
pub fn pbo_binary(scores_is: &[f64], scores_oos: &[f64]) -> f64 {
    if scores_is.len() != scores_oos.len() || scores_is.is_empty() {
        return 1.0;
    }
    if argmax(scores_is) == argmax(scores_oos) {
        0.0
    } else {
        1.0
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Linear-interpolation percentile of an ascending-sorted slice.
pub fn percentile_sorted(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}
