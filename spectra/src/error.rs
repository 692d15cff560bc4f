//! Error types for dataset assembly and container I/O.

use thiserror::Error;

/// Errors from dataset construction, splitting and the FITS container.
#[derive(Error, Debug)]
pub enum SpectraError {
    #[error("shape mismatch for {field}: expected {expected} rows, got {actual}")]
    ShapeMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("split sizes too large: requested {requested} rows of {available}")]
    SplitTooLarge { requested: usize, available: usize },
    #[error("container is missing HDU '{0}'")]
    MissingHdu(String),
    #[error("HDU '{hdu}' has shape {actual:?}, expected {expected}")]
    HduShape {
        hdu: String,
        expected: String,
        actual: Vec<usize>,
    },
    #[error("FITS I/O error: {0}")]
    Fits(#[from] fitsio::errors::Error),
}
