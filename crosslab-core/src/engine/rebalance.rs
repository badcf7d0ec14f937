//! Target-weight rebalance path: follow an external weight schedule over a
//! price history, charging commission on turnover.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::{EngineError, RebalanceBacktest};
use crate::config::EngineConfig;
use crate::domain::{EquityPoint, TradeRecord, WeightVec};
use crate::metrics::{
    cagr, calmar_ratio, daily_returns, max_drawdown, sharpe_ratio, sortino_ratio, total_return,
    win_rate, PerformanceSummary,
};

/// Close prices by date, then symbol.
pub type PriceHistory = BTreeMap<NaiveDate, BTreeMap<String, f64>>;

/// Target weights by rebalance date. Dates absent from the schedule keep the
/// weights already held.
pub type TargetSchedule = BTreeMap<NaiveDate, WeightVec>;

/// Run the target-weight simulation.
///
/// Each date after the first: realize the portfolio return from the weights
/// held coming into the date, charge commission in basis points on the L1
/// weight change toward the target, then adopt the target. The first date
/// establishes initial weights without producing a return.
pub fn run_rebalance(
    prices: &PriceHistory,
    targets: &TargetSchedule,
    config: &EngineConfig,
) -> Result<RebalanceBacktest, EngineError> {
    if prices.is_empty() {
        return Err(EngineError::EmptyPriceHistory);
    }

    let mut capital = config.initial_capital;
    let mut current = WeightVec::new();
    let mut previous_close: Option<&BTreeMap<String, f64>> = None;
    let mut equity_curve = Vec::with_capacity(prices.len());
    let mut day_returns = Vec::new();
    let mut trades = Vec::new();
    let mut rebalance_days = 0usize;

    for (date, close) in prices {
        let target = targets.get(date).cloned().unwrap_or_else(|| current.clone());

        if let Some(prev_close) = previous_close {
            let returns = period_returns(prev_close, close);
            let portfolio_return = current.dot(&returns);
            day_returns.push(portfolio_return);

            let turnover = target.l1_distance(&current);
            let commission = turnover * config.commission_bps / 10_000.0 * capital;
            capital = capital * (1.0 + portfolio_return) - commission;
            if turnover > config.rebalance_threshold {
                rebalance_days += 1;
            }

            for symbol in changed_symbols(&current, &target) {
                let before = current.get(&symbol);
                let after = target.get(&symbol);
                trades.push(TradeRecord {
                    date: *date,
                    symbol,
                    weight_before: before,
                    weight_after: after,
                    weight_delta: after - before,
                    commission_cost: (after - before).abs() * config.commission_bps / 10_000.0
                        * capital,
                });
            }
        }

        current = target;
        previous_close = Some(close);
        equity_curve.push(EquityPoint {
            date: *date,
            value: capital,
        });
    }

    let equity_values: Vec<f64> = equity_curve.iter().map(|p| p.value).collect();
    let port_returns = daily_returns(&equity_values);
    let summary = PerformanceSummary {
        total_return: total_return(&equity_values),
        cagr: cagr(&port_returns),
        sharpe: sharpe_ratio(&port_returns),
        sortino: sortino_ratio(&port_returns),
        max_drawdown: max_drawdown(&equity_values),
        calmar: calmar_ratio(&port_returns, &equity_values),
        win_rate: win_rate(&day_returns),
        n_trades: rebalance_days,
    };

    Ok(RebalanceBacktest {
        equity_curve,
        trades,
        summary,
    })
}

/// Per-symbol simple returns between two close maps. Symbols missing from
/// either side contribute zero.
fn period_returns(
    prev: &BTreeMap<String, f64>,
    curr: &BTreeMap<String, f64>,
) -> BTreeMap<String, f64> {
    curr.iter()
        .filter_map(|(symbol, &px)| {
            let prev_px = *prev.get(symbol)?;
            if prev_px > 0.0 {
                Some((symbol.clone(), px / prev_px - 1.0))
            } else {
                None
            }
        })
        .collect()
}

/// Symbols whose weight changes when moving from `current` to `target`.
fn changed_symbols(current: &WeightVec, target: &WeightVec) -> Vec<String> {
    let mut symbols: Vec<String> = current
        .symbols()
        .chain(target.symbols())
        .map(|s| s.to_string())
        .collect();
    symbols.sort();
    symbols.dedup();
    symbols
        .into_iter()
        .filter(|s| current.get(s) != target.get(s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn close(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(s, p)| (s.to_string(), *p)).collect()
    }

    fn weights(pairs: &[(&str, f64)]) -> WeightVec {
        pairs.iter().map(|(s, w)| (s.to_string(), *w)).collect()
    }

    #[test]
    fn empty_prices_are_an_error() {
        let result = run_rebalance(&PriceHistory::new(), &TargetSchedule::new(), &EngineConfig::default());
        assert!(matches!(result, Err(EngineError::EmptyPriceHistory)));
    }

    #[test]
    fn first_date_establishes_weights_without_return() {
        let mut prices = PriceHistory::new();
        prices.insert(date(1), close(&[("AAA", 100.0)]));
        let mut targets = TargetSchedule::new();
        targets.insert(date(1), weights(&[("AAA", 1.0)]));

        let result = run_rebalance(&prices, &targets, &EngineConfig::default()).unwrap();
        assert_eq!(result.equity_curve.len(), 1);
        assert_eq!(result.equity_curve[0].value, EngineConfig::default().initial_capital);
        assert!(result.trades.is_empty());
    }

    #[test]
    fn return_comes_from_held_weights() {
        let mut prices = PriceHistory::new();
        prices.insert(date(1), close(&[("AAA", 100.0)]));
        prices.insert(date(2), close(&[("AAA", 110.0)]));

        let mut targets = TargetSchedule::new();
        targets.insert(date(1), weights(&[("AAA", 1.0)]));

        let config = EngineConfig {
            commission_bps: 0.0,
            ..EngineConfig::default()
        };
        let result = run_rebalance(&prices, &targets, &config).unwrap();
        let expected = config.initial_capital * 1.10;
        assert!((result.equity_curve[1].value - expected).abs() < 1e-9);
        assert!((result.summary.total_return - 0.10).abs() < 1e-12);
    }

    #[test]
    fn commission_reduces_capital_on_rebalance() {
        let mut prices = PriceHistory::new();
        prices.insert(date(1), close(&[("AAA", 100.0)]));
        prices.insert(date(2), close(&[("AAA", 100.0)]));

        let mut targets = TargetSchedule::new();
        targets.insert(date(1), weights(&[("AAA", 0.0)]));
        targets.insert(date(2), weights(&[("AAA", 1.0)]));

        let config = EngineConfig {
            commission_bps: 10.0,
            ..EngineConfig::default()
        };
        let result = run_rebalance(&prices, &targets, &config).unwrap();
        // Flat price, so the only move is the 10 bp commission on |Δw| = 1.
        let expected = config.initial_capital * (1.0 - 10.0 / 10_000.0);
        assert!((result.equity_curve[1].value - expected).abs() < 1e-9);
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].symbol, "AAA");
        assert!((result.trades[0].weight_delta - 1.0).abs() < 1e-12);
    }

    #[test]
    fn missing_schedule_dates_hold_weights() {
        let mut prices = PriceHistory::new();
        prices.insert(date(1), close(&[("AAA", 100.0)]));
        prices.insert(date(2), close(&[("AAA", 105.0)]));
        prices.insert(date(3), close(&[("AAA", 110.25)]));

        let mut targets = TargetSchedule::new();
        targets.insert(date(1), weights(&[("AAA", 1.0)]));
        // No targets on later dates: stay fully invested, no trades.

        let config = EngineConfig {
            commission_bps: 0.0,
            ..EngineConfig::default()
        };
        let result = run_rebalance(&prices, &targets, &config).unwrap();
        assert!(result.trades.is_empty());
        let expected = config.initial_capital * 1.05 * 1.05;
        assert!((result.equity_curve[2].value - expected).abs() < 1e-6);
    }

    #[test]
    fn n_trades_counts_threshold_days() {
        let mut prices = PriceHistory::new();
        for d in 1..=4 {
            prices.insert(date(d), close(&[("AAA", 100.0), ("BBB", 50.0)]));
        }
        let mut targets = TargetSchedule::new();
        targets.insert(date(1), weights(&[("AAA", 0.5), ("BBB", -0.5)]));
        // Day 2: tiny drift, below the 0.02 threshold.
        targets.insert(date(2), weights(&[("AAA", 0.505), ("BBB", -0.5)]));
        // Day 3: full flip, well above it.
        targets.insert(date(3), weights(&[("AAA", -0.5), ("BBB", 0.5)]));

        let result = run_rebalance(&prices, &targets, &EngineConfig::default()).unwrap();
        assert_eq!(result.summary.n_trades, 1);
    }
}
