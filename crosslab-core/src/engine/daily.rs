//! Daily cross-sectional loop: rank baseline + rolling Kelly blend.

use std::collections::BTreeMap;

use super::{DailyBacktest, EngineError};
use crate::config::RunConfig;
use crate::domain::{CrossSection, EquityPoint, Panel, WeightVec};
use crate::metrics::{
    cagr, calmar_ratio, daily_returns, max_drawdown, sharpe_ratio, sortino_ratio, total_return,
    win_rate, PerformanceSummary,
};
use crate::sizer::{KellySizer, LiquidityInputs, ReturnsMatrix, SizerError};

/// Run the daily simulation over the whole panel.
///
/// Each date: build the rank baseline from today's scores, size the Kelly leg
/// from realized returns strictly before today, blend, renormalize to unit
/// gross, and clip per-asset weights. P&L for the date comes from the weights
/// held coming into it, so today's scores cannot touch today's return.
pub fn run_daily(panel: &Panel, config: &RunConfig) -> Result<DailyBacktest, EngineError> {
    if panel.is_empty() {
        return Err(EngineError::EmptyPanel);
    }

    let engine = &config.engine;
    let sizer = KellySizer::new(config.kelly.clone());
    let universe = panel.symbols();

    let mut capital = engine.initial_capital;
    let mut prev_weights = WeightVec::new();
    let mut equity_curve = Vec::with_capacity(panel.len());
    let mut returns_hist = Vec::with_capacity(panel.len());
    let mut turnover_hist = Vec::with_capacity(panel.len());

    for (t, section) in panel.sections().iter().enumerate() {
        // P&L first, from yesterday's weights.
        let todays_returns: BTreeMap<String, f64> = section
            .returns()
            .map(|(s, r)| (s.to_string(), r))
            .collect();
        let day_ret = prev_weights.dot(&todays_returns);
        capital *= 1.0 + day_ret;
        returns_hist.push(day_ret);
        equity_curve.push(EquityPoint {
            date: section.date,
            value: capital,
        });

        // Then form the weights carried into tomorrow.
        let base = rank_weights(section);
        let kelly = kelly_leg(panel, t, &universe, &sizer, section, capital, config);
        let combined = base
            .blend(&kelly, engine.blend_ratio)
            .rescaled_gross(1.0)
            .clipped(config.limits.max_position_weight);

        turnover_hist.push(combined.l1_distance(&prev_weights));
        prev_weights = combined;
    }

    let equity_values: Vec<f64> = equity_curve.iter().map(|p| p.value).collect();
    let port_returns = daily_returns(&equity_values);
    let n_trades = turnover_hist
        .iter()
        .filter(|&&x| x > engine.rebalance_threshold)
        .count();

    let summary = PerformanceSummary {
        total_return: total_return(&equity_values),
        cagr: cagr(&port_returns),
        sharpe: sharpe_ratio(&port_returns),
        sortino: sortino_ratio(&port_returns),
        max_drawdown: max_drawdown(&equity_values),
        calmar: calmar_ratio(&port_returns, &equity_values),
        win_rate: win_rate(&returns_hist),
        n_trades,
    };

    Ok(DailyBacktest {
        equity_curve,
        daily_returns: returns_hist,
        turnover: turnover_hist,
        final_weights: prev_weights,
        summary,
    })
}

/// Cross-sectional rank baseline: percentile rank mapped to [-1, 1], then
/// renormalized to unit gross. Ties share the average rank.
fn rank_weights(section: &CrossSection) -> WeightVec {
    let scored: Vec<(&str, f64)> = section.scores().collect();
    let n = scored.len();
    if n == 0 {
        return WeightVec::new();
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        scored[a]
            .1
            .partial_cmp(&scored[b].1)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Average rank over tied scores, 1-based like a percentile rank.
    let mut ranks = vec![0.0_f64; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scored[order[j + 1]].1 == scored[order[i]].1 {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank;
        }
        i = j + 1;
    }

    let mut weights = WeightVec::new();
    for (idx, (symbol, _)) in scored.iter().enumerate() {
        let pct = ranks[idx] / n as f64;
        weights.insert(*symbol, pct * 2.0 - 1.0);
    }
    let gross = weights.gross();
    weights.scaled(1.0 / (gross + 1e-8))
}

/// Kelly leg for date index `t`: sized from the trailing return window
/// strictly before `t`, falling back to the earliest observations when the
/// trailing window is too short. Sizing failure degrades to a zero leg.
fn kelly_leg(
    panel: &Panel,
    t: usize,
    universe: &[String],
    sizer: &KellySizer,
    section: &CrossSection,
    capital: f64,
    config: &RunConfig,
) -> WeightVec {
    let engine = &config.engine;
    let window = panel.window_before(t, engine.kelly_window);
    let sections = if window.len() >= engine.kelly_min_obs {
        window
    } else {
        let take = engine.kelly_min_obs.min(panel.len());
        &panel.sections()[..take]
    };

    let rows: Vec<Vec<f64>> = sections
        .iter()
        .map(|cs| {
            universe
                .iter()
                .map(|s| cs.get(s).map(|d| d.realized_return).unwrap_or(0.0))
                .collect()
        })
        .collect();
    let matrix = ReturnsMatrix::new(universe.to_vec(), rows);

    let price_of = |s: &str| section.get(s).map(|d| d.price).unwrap_or(0.0);
    let adv_of = |s: &str| section.get(s).map(|d| d.volume).unwrap_or(0.0);
    let liquidity = LiquidityInputs {
        price_of: &price_of,
        adv_of: &adv_of,
        portfolio_value: capital,
    };

    match sizer.size(&matrix, Some(&liquidity)) {
        Ok(weights) => weights,
        Err(SizerError::InsufficientHistory { .. }) | Err(SizerError::EmptyUniverse) => {
            WeightVec::new()
        }
    }
}
