//! Error types for the exploration session.

use reduce::ReduceError;
use thiserror::Error;

/// Errors from explorer construction, reduction runs and view rendering.
#[derive(Error, Debug)]
pub enum ExplorerError {
    /// Per-item input arrays disagree on length.
    #[error("shape mismatch for {field}: expected {expected} rows, got {actual}")]
    ShapeMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Item index outside the current collection.
    #[error("item index {index} out of range ({len} items)")]
    OutOfRange { index: usize, len: usize },
    /// Parameter validation or the reduction itself failed.
    #[error(transparent)]
    Reduce(#[from] ReduceError),
    /// A view failed to draw.
    #[error("render failed: {0}")]
    Render(String),
}

/// Collapses the various plotters error types into [`ExplorerError::Render`].
pub(crate) fn render_err(e: impl std::fmt::Display) -> ExplorerError {
    ExplorerError::Render(e.to_string())
}
