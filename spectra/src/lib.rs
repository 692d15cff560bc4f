//! Spectra dataset model and batch preparation.
//!
//! This crate owns everything between the instrument archive and an
//! exploration session: provenance identifiers, the common log-wavelength
//! grid, flux-conserving resampling to fixed-length feature vectors,
//! per-spectrum normalization, the seeded train/validation/test split and
//! the FITS container the prepared arrays live in.

pub mod archive;
pub mod container;
pub mod dataset;
pub mod error;
pub mod grid;
pub mod id;
pub mod lines;
pub mod scale;
pub mod split;

// Re-exports for easier access
pub use container::{read_catalog, read_subset, write_container, PreparedArrays, Subset};
pub use dataset::Dataset;
pub use error::SpectraError;
pub use grid::{resample, resample_rows, LogLamGrid};
pub use id::SpectrumId;
pub use lines::{EmissionLine, LINES};
pub use scale::minmax_rows;
pub use split::{split_indices, SplitIndices, SplitSizes, SPLIT_SEED};
