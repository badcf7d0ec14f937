//! Top-level run assembly: simulate, validate, report.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crosslab_core::config::RunConfig;
use crosslab_core::domain::{EquityPoint, Panel};
use crosslab_core::engine::{run_daily, EngineError};
use crosslab_core::metrics::{deflated_sharpe, PerformanceSummary};

use crate::validation::{cpcv_validate, Dataset, ScoringModel, ValidationError, ValidationReport};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Complete run artifact: what the simulation did, whether to believe it,
/// and the equity path behind both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullReport {
    pub run_id: String,
    pub metrics: PerformanceSummary,
    pub validation: ValidationReport,
    pub equity_curve: Vec<EquityPoint>,
}

/// Run the daily engine over the panel, validate the scoring model with
/// CPCV, and assemble the report under the config's content-hashed run id.
///
/// The report-level deflated Sharpe judges the realized backtest Sharpe over
/// the simulated horizon; it replaces the fold-mean deflation computed inside
/// `cpcv_validate`.
pub fn run_with_validation(
    panel: &Panel,
    dataset: &Dataset,
    model: &mut dyn ScoringModel,
    config: &RunConfig,
    n_splits: usize,
) -> Result<FullReport, RunError> {
    let backtest = run_daily(panel, config)?;
    let mut validation = cpcv_validate(dataset, model, n_splits)?;

    // One return per date after the first.
    let horizon = backtest.daily_returns.len().saturating_sub(1).max(1);
    validation.deflated_sharpe = deflated_sharpe(backtest.summary.sharpe, horizon, n_splits);

    Ok(FullReport {
        run_id: config.run_id(),
        metrics: backtest.summary,
        validation,
        equity_curve: backtest.equity_curve,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use crosslab_core::domain::{AssetDay, CrossSection};

    struct PassThrough;

    impl ScoringModel for PassThrough {
        fn fit(&mut self, _: &[Vec<f64>], _: &[f64]) {}
        fn predict(&self, features: &[Vec<f64>]) -> Vec<f64> {
            features.iter().map(|row| row[0]).collect()
        }
    }

    fn make_panel(n_days: u32) -> Panel {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut panel = Panel::new();
        for d in 0..n_days {
            let mut cs = CrossSection::new(start + chrono::Duration::days(d as i64));
            for (k, symbol) in ["AAA", "BBB"].iter().enumerate() {
                let wiggle = if (d + k as u32) % 2 == 0 { 0.003 } else { -0.003 };
                cs.insert(
                    *symbol,
                    AssetDay {
                        score: (k as f64 - 0.5) + wiggle,
                        realized_return: wiggle,
                        price: 50.0,
                        volume: 2_000_000.0,
                    },
                );
            }
            panel.push(cs).unwrap();
        }
        panel
    }

    fn make_dataset(n: usize) -> Dataset {
        let features: Vec<Vec<f64>> = (0..n)
            .map(|i| vec![((i % 7) as f64 - 3.0) / 3.0])
            .collect();
        let targets: Vec<f64> = features.iter().map(|row| row[0] * 0.01).collect();
        Dataset::new(features, targets).unwrap()
    }

    fn fast_config() -> RunConfig {
        let mut config = RunConfig::default();
        config.kelly.n_bootstrap = 30;
        config
    }

    #[test]
    fn full_report_assembles_all_sections() {
        let panel = make_panel(25);
        let dataset = make_dataset(80);
        let config = fast_config();

        let report =
            run_with_validation(&panel, &dataset, &mut PassThrough, &config, 4).unwrap();

        assert_eq!(report.run_id, config.run_id());
        assert_eq!(report.equity_curve.len(), 25);
        assert_eq!(report.validation.cpcv.fold_sharpes.len(), 4);
        assert!(report.metrics.total_return.is_finite());
    }

    #[test]
    fn report_deflates_the_realized_backtest_sharpe() {
        let panel = make_panel(30);
        let dataset = make_dataset(80);
        let report =
            run_with_validation(&panel, &dataset, &mut PassThrough, &fast_config(), 4).unwrap();

        // 29 daily returns follow the first date; penalty = sqrt(ln(4)/29).
        let penalty = (4.0_f64.ln() / 29.0).sqrt();
        let expected = (report.metrics.sharpe - penalty).max(0.0);
        assert!(
            (report.validation.deflated_sharpe - expected).abs() < 1e-12,
            "deflation must apply to the realized Sharpe, got {} want {expected}",
            report.validation.deflated_sharpe
        );
    }

    #[test]
    fn empty_panel_surfaces_engine_error() {
        let dataset = make_dataset(40);
        let result = run_with_validation(
            &Panel::new(),
            &dataset,
            &mut PassThrough,
            &fast_config(),
            4,
        );
        assert!(matches!(result, Err(RunError::Engine(_))));
    }

    #[test]
    fn report_serializes_to_json() {
        let panel = make_panel(12);
        let dataset = make_dataset(40);
        let report =
            run_with_validation(&panel, &dataset, &mut PassThrough, &fast_config(), 4).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"metrics\""));
        assert!(json.contains("\"validation\""));
        assert!(json.contains("\"equity_curve\""));
    }
}
