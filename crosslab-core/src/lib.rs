//! CrossLab Core — cross-sectional portfolio engine.
//!
//! This crate contains the heart of the daily equity simulation:
//! - Domain types (panels, weights, positions, portfolio snapshots, fills)
//! - Immutable run configuration with content-hashed run ids
//! - Pure performance and overfitting-control metrics
//! - Constrained portfolio optimizer with a deterministic fallback solver
//! - Bootstrap Kelly sizer with ES-budget and liquidity caps
//! - Pre-trade risk monitor with kill switch and cooldown
//! - Idempotent paper-trading OMS with a transaction-cost model
//! - Event-driven daily and target-weight simulation loops

pub mod config;
pub mod domain;
pub mod engine;
pub mod metrics;
pub mod oms;
pub mod optimizer;
pub mod risk;
pub mod sizer;
