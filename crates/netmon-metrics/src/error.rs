//! Error types for the metric registry.

use thiserror::Error;

use crate::registry::MetricKind;

/// Result type alias for registry operations.
pub type MetricResult<T> = Result<T, MetricError>;

/// Errors that can occur when mutating the registry.
#[derive(Debug, Error, PartialEq)]
pub enum MetricError {
    #[error("invalid metric name: {0:?}")]
    InvalidName(String),

    #[error("invalid label name: {0:?}")]
    InvalidLabel(String),

    #[error("metric {name} is a {existing}, not a {requested}")]
    KindMismatch {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },

    #[error("counter {name} cannot be incremented by {delta}")]
    InvalidIncrement { name: String, delta: f64 },
}
