//! Error types for reduction runs.

use thiserror::Error;

/// Errors from parameter validation and reduction itself.
///
/// `InvalidParameter` is always detected before any computation starts, so a
/// failed call never leaves partial work behind. `Failure` wraps numerical
/// problems encountered mid-run (non-finite inputs, degenerate spectra) and
/// is propagated to the caller unchanged.
#[derive(Error, Debug)]
pub enum ReduceError {
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("reduction failed: {0}")]
    Failure(String),
}

impl ReduceError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn failure(reason: impl Into<String>) -> Self {
        Self::Failure(reason.into())
    }
}
