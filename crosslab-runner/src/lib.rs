//! CrossLab Runner — validation and report assembly on top of the core engine.
//!
//! The core crate simulates; this crate judges. It drives combinatorial
//! cross-validation over a scoring model, deflates the resulting Sharpe for
//! multiple testing, computes the overfitting proxy, and assembles the full
//! run report (performance metrics + validation verdict + equity curve).

pub mod runner;
pub mod validation;

pub use runner::{run_with_validation, FullReport, RunError};
pub use validation::{
    cpcv_validate, CpcvSummary, Dataset, ScoringModel, ValidationError, ValidationReport,
};
