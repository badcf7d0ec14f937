//! Pre-trade risk monitor — ordered hard checks plus advisory diagnostics.
//!
//! The monitor is consulted before every submission batch with the current
//! portfolio snapshot. Checks run in a fixed order and the first violation
//! wins: cooldown, kill switch, gross leverage, per-position ADV
//! participation. A kill switch additionally arms a cooldown clock that
//! blocks all submissions until it expires. Concentration (HHI) is a
//! separate portfolio-level advisory and never gates an order.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::config::RiskLimits;
use crate::domain::PortfolioSnapshot;
use crate::metrics::expected_shortfall;

/// Outcome of a pre-trade check, in escalating severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RiskVerdict {
    Passed,
    Rejected { reason: String },
    KillSwitch { reason: String },
}

impl RiskVerdict {
    pub fn is_passed(&self) -> bool {
        matches!(self, RiskVerdict::Passed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    HhiConcentration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Advisory finding from the concentration check. Reported, never enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub severity: Severity,
    pub value: f64,
    pub limit: f64,
}

/// Stateful risk monitor: trailing P&L window plus the cooldown clock.
#[derive(Debug, Clone)]
pub struct RiskMonitor {
    limits: RiskLimits,
    pnl_history: Vec<f64>,
    cooldown_until: Option<NaiveDateTime>,
}

/// Minimum trailing observations before the kill switch may fire; below
/// this the tail estimate is too noisy to act on.
const KILL_SWITCH_MIN_OBS: usize = 10;

impl RiskMonitor {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            pnl_history: Vec::new(),
            cooldown_until: None,
        }
    }

    /// Append one day's P&L (as a fraction of capital) to the trailing
    /// window, discarding observations beyond `drawdown_window`.
    pub fn record_pnl(&mut self, pnl: f64) {
        self.pnl_history.push(pnl);
        if self.pnl_history.len() > self.limits.drawdown_window {
            let excess = self.pnl_history.len() - self.limits.drawdown_window;
            self.pnl_history.drain(..excess);
        }
    }

    pub fn in_cooldown(&self, now: NaiveDateTime) -> bool {
        self.cooldown_until.map(|until| now < until).unwrap_or(false)
    }

    /// Run the ordered pre-trade checks against the current portfolio.
    ///
    /// `adv_of` supplies average daily volume in shares per symbol. Arms the
    /// cooldown clock when the kill switch fires.
    pub fn check(
        &mut self,
        now: NaiveDateTime,
        portfolio: &PortfolioSnapshot,
        adv_of: &dyn Fn(&str) -> f64,
    ) -> RiskVerdict {
        if let Some(until) = self.cooldown_until {
            if now < until {
                return RiskVerdict::Rejected {
                    reason: format!("cooldown active until {until}"),
                };
            }
        }

        if let Some(reason) = self.kill_switch_reason() {
            self.cooldown_until = Some(now + Duration::minutes(self.limits.cooldown_minutes));
            return RiskVerdict::KillSwitch { reason };
        }

        let gross = portfolio.gross_exposure();
        if gross > self.limits.max_gross_exposure {
            return RiskVerdict::Rejected {
                reason: format!(
                    "gross exposure {gross:.2} exceeds ceiling {:.2}",
                    self.limits.max_gross_exposure
                ),
            };
        }

        for (symbol, position) in &portfolio.positions {
            let price = position.price.max(1e-6);
            let adv = adv_of(symbol).max(1.0);
            let participation = position.value.abs() / (adv * price);
            if participation > self.limits.max_participation_adv {
                return RiskVerdict::Rejected {
                    reason: format!(
                        "{symbol}: participation {:.2}% of ADV exceeds {:.2}%",
                        participation * 100.0,
                        self.limits.max_participation_adv * 100.0
                    ),
                };
            }
        }

        RiskVerdict::Passed
    }

    /// Kill switch condition: cumulative loss over the trailing window
    /// exceeds `kill_switch_multiple` times the window's |ES95|.
    fn kill_switch_reason(&self) -> Option<String> {
        if self.pnl_history.len() < KILL_SWITCH_MIN_OBS {
            return None;
        }
        let window_pnl: f64 = self.pnl_history.iter().sum();
        if window_pnl >= 0.0 {
            return None;
        }
        let es = expected_shortfall(&self.pnl_history, 0.95);
        if es.abs() <= f64::EPSILON {
            return None;
        }
        if window_pnl.abs() > self.limits.kill_switch_multiple * es.abs() {
            Some(format!(
                "window loss {:.4} exceeds {:.1}x |ES95| {:.4}",
                window_pnl.abs(),
                self.limits.kill_switch_multiple,
                es.abs()
            ))
        } else {
            None
        }
    }

    /// Advisory concentration check: Herfindahl index over absolute
    /// position weights.
    pub fn concentration(&self, portfolio: &PortfolioSnapshot) -> Option<Violation> {
        let hhi: f64 = portfolio.position_weights().iter().map(|w| w * w).sum();
        if hhi > self.limits.hhi_limit {
            Some(Violation {
                kind: ViolationKind::HhiConcentration,
                severity: Severity::Medium,
                value: hhi,
                limit: self.limits.hhi_limit,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Position;
    use chrono::NaiveDate;

    fn noon(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    /// Snapshot with one position per (symbol, value) pair at price 10.
    fn snapshot(pairs: &[(&str, f64)], total_value: f64) -> PortfolioSnapshot {
        let positions = pairs
            .iter()
            .map(|(s, value)| {
                (
                    s.to_string(),
                    Position {
                        quantity: value / 10.0,
                        price: 10.0,
                        value: *value,
                    },
                )
            })
            .collect();
        PortfolioSnapshot {
            cash: total_value - pairs.iter().map(|(_, v)| v).sum::<f64>(),
            positions,
            total_value,
        }
    }

    fn deep_adv(_: &str) -> f64 {
        1_000_000_000.0
    }

    #[test]
    fn passes_within_all_limits() {
        let mut monitor = RiskMonitor::new(RiskLimits::default());
        let portfolio = snapshot(&[("AAPL", 50_000.0)], 100_000.0);
        let verdict = monitor.check(noon(1), &portfolio, &deep_adv);
        assert_eq!(verdict, RiskVerdict::Passed);
    }

    #[test]
    fn rejects_gross_breach_naming_the_check() {
        let mut monitor = RiskMonitor::new(RiskLimits::default());
        // 250k absolute exposure on 100k of equity: 2.5x against the 2.0x cap.
        let portfolio = snapshot(&[("AAPL", 150_000.0), ("TSLA", -100_000.0)], 100_000.0);
        let verdict = monitor.check(noon(1), &portfolio, &deep_adv);
        match verdict {
            RiskVerdict::Rejected { reason } => assert!(reason.contains("gross exposure")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn rejects_participation_breach_naming_symbol() {
        let mut monitor = RiskMonitor::new(RiskLimits::default());
        let portfolio = snapshot(&[("THIN", 60_000.0)], 100_000.0);
        // ADV 10_000 shares at price 10: ceiling 0.05 allows 5_000 of value.
        let adv = |_: &str| 10_000.0;
        let verdict = monitor.check(noon(1), &portfolio, &adv);
        match verdict {
            RiskVerdict::Rejected { reason } => assert!(reason.contains("THIN")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn kill_switch_fires_and_arms_cooldown() {
        let mut monitor = RiskMonitor::new(RiskLimits::default());
        // Steady bleed: the cumulative loss dwarfs the per-day tail estimate.
        for _ in 0..50 {
            monitor.record_pnl(-0.01);
        }
        let portfolio = snapshot(&[("AAPL", 10_000.0)], 100_000.0);
        let verdict = monitor.check(noon(1), &portfolio, &deep_adv);
        assert!(matches!(verdict, RiskVerdict::KillSwitch { .. }));
        assert!(monitor.in_cooldown(noon(1)));

        // Still inside the hour: submissions blocked.
        let blocked = monitor.check(noon(1), &portfolio, &deep_adv);
        assert!(matches!(blocked, RiskVerdict::Rejected { .. }));

        // Next day the clock has expired.
        assert!(!monitor.in_cooldown(noon(2)));
    }

    #[test]
    fn kill_switch_needs_minimum_history() {
        let mut monitor = RiskMonitor::new(RiskLimits::default());
        for _ in 0..5 {
            monitor.record_pnl(-0.05);
        }
        let portfolio = snapshot(&[("AAPL", 10_000.0)], 100_000.0);
        let verdict = monitor.check(noon(1), &portfolio, &deep_adv);
        assert_eq!(verdict, RiskVerdict::Passed);
    }

    #[test]
    fn profitable_window_never_trips_kill_switch() {
        let mut monitor = RiskMonitor::new(RiskLimits::default());
        for i in 0..50 {
            monitor.record_pnl(if i % 5 == 0 { -0.02 } else { 0.01 });
        }
        let portfolio = snapshot(&[("AAPL", 10_000.0)], 100_000.0);
        let verdict = monitor.check(noon(1), &portfolio, &deep_adv);
        assert_eq!(verdict, RiskVerdict::Passed);
    }

    #[test]
    fn pnl_window_is_bounded() {
        let limits = RiskLimits {
            drawdown_window: 10,
            ..RiskLimits::default()
        };
        let mut monitor = RiskMonitor::new(limits);
        // Old losses scroll out of the window; only the recent gains remain.
        for _ in 0..90 {
            monitor.record_pnl(-0.02);
        }
        for _ in 0..10 {
            monitor.record_pnl(0.01);
        }
        let portfolio = snapshot(&[("AAPL", 10_000.0)], 100_000.0);
        let verdict = monitor.check(noon(1), &portfolio, &deep_adv);
        assert_eq!(verdict, RiskVerdict::Passed);
    }

    #[test]
    fn hhi_advisory_flags_concentration() {
        let monitor = RiskMonitor::new(RiskLimits::default());
        let concentrated = snapshot(&[("AAPL", 90_000.0)], 100_000.0);
        let violation = monitor.concentration(&concentrated).unwrap();
        assert_eq!(violation.kind, ViolationKind::HhiConcentration);
        assert_eq!(violation.severity, Severity::Medium);
        assert!(violation.value > violation.limit);

        let spread: Vec<(String, f64)> = (0..20).map(|i| (format!("S{i}"), 5_000.0)).collect();
        let pairs: Vec<(&str, f64)> = spread.iter().map(|(s, v)| (s.as_str(), *v)).collect();
        let diversified = snapshot(&pairs, 100_000.0);
        assert!(monitor.concentration(&diversified).is_none());
    }

    #[test]
    fn all_cash_has_no_concentration() {
        let monitor = RiskMonitor::new(RiskLimits::default());
        assert!(monitor.concentration(&PortfolioSnapshot::all_cash(25_000.0)).is_none());
    }
}
