//! Error taxonomy for the risk engine.
//!
//! Configuration problems abort before any detector runs. Record problems
//! reject a single row. Detector and model-fit problems stay local to the
//! signal that raised them.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::SignalKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("weight for {signal} must be finite and non-negative, got {value}")]
    InvalidWeight { signal: SignalKind, value: f64 },

    #[error("at least one signal weight must be positive")]
    NoActiveWeights,

    #[error("invalid threshold {name}: {reason}")]
    InvalidThreshold { name: &'static str, reason: String },

    #[error(
        "severity tiers must partition [0, 100]: high ends at {high_below} but critical starts at {critical_from}"
    )]
    SeverityGap { high_below: f64, critical_from: f64 },

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub fn threshold(name: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidThreshold {
            name,
            reason: reason.into(),
        }
    }
}

/// Reasons a canonical record is rejected at ingestion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("unparseable row: {0}")]
    Parse(String),

    #[error("quantity must not be negative (got {0})")]
    NegativeQuantity(f64),

    #[error("{field} must not be negative (got {value})")]
    NegativeAmount { field: &'static str, value: f64 },

    #[error("discount {discount} exceeds gross amount {gross}")]
    DiscountExceedsGross { discount: f64, gross: f64 },

    #[error("total_amount {total} does not match gross minus discount {expected}")]
    TotalMismatch { total: f64, expected: f64 },

    #[error("unknown transaction status {0:?}")]
    UnknownStatus(String),

    #[error("invalid time {0:?}")]
    BadTime(String),

    #[error("duplicate transaction id {id} on {date}")]
    DuplicateTransaction { id: String, date: chrono::NaiveDate },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectorError {
    #[error("{0}")]
    InsufficientData(String),

    #[error("baseline {metric} has zero variance but current value {current} differs from {baseline}")]
    ZeroVariance {
        metric: &'static str,
        current: f64,
        baseline: f64,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl DetectorError {
    pub fn insufficient(reason: impl Into<String>) -> Self {
        DetectorError::InsufficientData(reason.into())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("need at least {need} historical days to fit, have {have}")]
    InsufficientSamples { have: usize, need: usize },

    #[error("model fit exceeded its {budget_ms} ms budget after {trees_built} trees")]
    BudgetExceeded { budget_ms: u64, trees_built: usize },
}
