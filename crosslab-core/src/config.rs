//! Run configuration — explicit, immutable, content-addressable.
//!
//! Every component takes its config by value or reference at construction;
//! there is no ambient/global lookup, so tests can supply isolated
//! configurations per case. `RunConfig::run_id()` hashes the canonical JSON
//! form so two identical runs share an id.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from config parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Named risk ceilings, read by the risk monitor and the engine.
/// Never mutated during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Max loss in one day before intervention, as a fraction of capital.
    pub max_daily_loss: f64,
    /// Kill switch fires when window loss exceeds this multiple of |ES95|.
    pub kill_switch_multiple: f64,
    /// Per-asset weight ceiling applied by the engine's clip step.
    pub max_position_weight: f64,
    pub max_net_exposure: f64,
    pub max_gross_exposure: f64,
    pub max_sector_weight: f64,
    /// Max fraction of average daily volume a position may represent.
    pub max_participation_adv: f64,
    /// Trailing observation count for the kill-switch drawdown window.
    pub drawdown_window: usize,
    /// HHI ceiling for the advisory concentration check.
    pub hhi_limit: f64,
    /// Minutes to hold off new submissions after a kill switch.
    pub cooldown_minutes: i64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_daily_loss: 0.03,
            kill_switch_multiple: 3.0,
            max_position_weight: 0.08,
            max_net_exposure: 0.30,
            max_gross_exposure: 2.0,
            max_sector_weight: 0.25,
            max_participation_adv: 0.05,
            drawdown_window: 100,
            hhi_limit: 0.15,
            cooldown_minutes: 60,
        }
    }
}

/// Optimizer objective and constraint parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Risk-aversion λ in the objective μᵀw − λ·wᵀΣw.
    pub risk_aversion: f64,
    /// Gross leverage ceiling, Σ|wᵢ| ≤ this.
    pub max_gross_leverage: f64,
    pub net_exposure_target: f64,
    pub net_exposure_tolerance: f64,
    /// Per-asset bound |wᵢ| ≤ this.
    pub max_asset_weight: f64,
    /// L1 cap per sector.
    pub max_sector_weight: f64,
    /// Distinct cap for the designated high-concentration sector.
    pub max_tech_sector_weight: f64,
    /// Sector label the distinct cap applies to (prefix match, case-insensitive).
    pub tech_sector_label: String,
    /// Trailing observations for covariance estimation.
    pub covariance_lookback: usize,
    /// Projected-gradient iteration cap.
    pub max_iterations: usize,
    /// Convergence tolerance on the iterate step.
    pub tolerance: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            risk_aversion: 0.5,
            max_gross_leverage: 2.0,
            net_exposure_target: 0.0,
            net_exposure_tolerance: 0.20,
            max_asset_weight: 0.03,
            max_sector_weight: 0.30,
            max_tech_sector_weight: 0.35,
            tech_sector_label: "Tech".to_string(),
            covariance_lookback: 60,
            max_iterations: 2_000,
            tolerance: 1e-8,
        }
    }
}

/// Bootstrap Kelly sizer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KellyConfig {
    /// Bootstrap resample count (>= 500 for a stable lower percentile).
    pub n_bootstrap: usize,
    /// Confidence level; the sizer keeps the (1 - confidence)/2 lower
    /// percentile of the bootstrap Kelly distribution.
    pub confidence: f64,
    /// Fractional-Kelly de-risking scalar, < 1.
    pub fraction: f64,
    /// Expected-shortfall budget: |ES95| of the sized portfolio may not
    /// exceed this.
    pub es_budget: f64,
    /// Tail confidence used for the ES budget check.
    pub es_tail: f64,
    /// ADV participation ceiling for the liquidity cap.
    pub adv_limit: f64,
    /// Base RNG seed; per-draw streams are derived from it.
    pub seed: u64,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            n_bootstrap: 500,
            confidence: 0.95,
            fraction: 0.25,
            es_budget: 0.03,
            es_tail: 0.95,
            adv_limit: 0.05,
            seed: 42,
        }
    }
}

/// Daily engine parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub initial_capital: f64,
    /// Mixing ratio applied to the rank baseline; the Kelly leg gets the
    /// complement. Equal weight is the reference policy.
    pub blend_ratio: f64,
    /// Rolling Kelly window length (most recent observations).
    pub kelly_window: usize,
    /// Minimum observations before the rolling window is trusted; below it
    /// the earliest available window of this length is used instead.
    pub kelly_min_obs: usize,
    /// L1 turnover above this counts as a real rebalance for `n_trades`.
    pub rebalance_threshold: f64,
    /// Commission in basis points on traded notional (rebalance path).
    pub commission_bps: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capital: 25_000.0,
            blend_ratio: 0.5,
            kelly_window: 60,
            kelly_min_obs: 20,
            rebalance_threshold: 0.02,
            commission_bps: 1.0,
        }
    }
}

/// Top-level run configuration: everything needed to reproduce a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RunConfig {
    pub universe: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub limits: RiskLimits,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub kelly: KellyConfig,
}

impl RunConfig {
    /// Deterministic content hash of this configuration. Two identical
    /// configs produce the same id, enabling result reuse.
    pub fn run_id(&self) -> String {
        let json = serde_json::to_string(self).expect("RunConfig serialization failed");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }

    /// Parse from TOML text, then sanity-check the ceilings.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_gross_exposure <= 0.0 {
            return Err(ConfigError::Invalid(
                "max_gross_exposure must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.engine.blend_ratio) {
            return Err(ConfigError::Invalid(
                "blend_ratio must lie in [0, 1]".to_string(),
            ));
        }
        if self.kelly.fraction <= 0.0 || self.kelly.fraction >= 1.0 {
            return Err(ConfigError::Invalid(
                "kelly fraction must lie in (0, 1)".to_string(),
            ));
        }
        Ok(())
    }
}
