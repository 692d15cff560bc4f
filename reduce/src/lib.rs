//! Dimensionality reduction methods for spectrum feature matrices.
//!
//! Every method maps an `N x F` feature matrix to an `N x 2` embedding with
//! row order preserved, so row `i` of the embedding is the projection of row
//! `i` of the input. Parameters are validated up front and rejected with
//! [`ReduceError::InvalidParameter`] before any computation runs.

pub mod error;
pub mod knn;
pub mod pca;
pub mod quadtree;
pub mod tsne;
pub mod umap;

// Re-exports for easier access
pub use error::ReduceError;
pub use knn::{nearest_neighbors, Metric, NeighborGraph};
pub use pca::{Pca, PcaSolver};
pub use quadtree::QuadTree;
pub use tsne::{Tsne, TsneInit, TsneMethod};
pub use umap::{Umap, UmapInit};

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// All embeddings are planar.
pub const EMBEDDING_DIM: usize = 2;

/// A reduction method taking feature vectors to the plane.
pub trait Reducer {
    /// Short method name for logs and plot titles.
    fn name(&self) -> &'static str;

    /// Check parameters against their allowed ranges for an input of
    /// `n_items` rows. Runs before any computation.
    fn validate(&self, n_items: usize) -> Result<(), ReduceError>;

    /// Map an `N x F` matrix to an `N x 2` embedding, preserving row order.
    fn reduce(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ReduceError>;
}

/// Tagged reducer configuration, usable from session files and CLIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Reduction {
    Pca(Pca),
    Tsne(Tsne),
    Umap(Umap),
}

impl Reducer for Reduction {
    fn name(&self) -> &'static str {
        match self {
            Reduction::Pca(r) => r.name(),
            Reduction::Tsne(r) => r.name(),
            Reduction::Umap(r) => r.name(),
        }
    }

    fn validate(&self, n_items: usize) -> Result<(), ReduceError> {
        match self {
            Reduction::Pca(r) => r.validate(n_items),
            Reduction::Tsne(r) => r.validate(n_items),
            Reduction::Umap(r) => r.validate(n_items),
        }
    }

    fn reduce(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ReduceError> {
        match self {
            Reduction::Pca(r) => r.reduce(x),
            Reduction::Tsne(r) => r.reduce(x),
            Reduction::Umap(r) => r.reduce(x),
        }
    }
}

impl From<Pca> for Reduction {
    fn from(r: Pca) -> Self {
        Reduction::Pca(r)
    }
}

impl From<Tsne> for Reduction {
    fn from(r: Tsne) -> Self {
        Reduction::Tsne(r)
    }
}

impl From<Umap> for Reduction {
    fn from(r: Umap) -> Self {
        Reduction::Umap(r)
    }
}

/// Reject inputs no method can embed: too few rows or columns, or any
/// non-finite value.
pub(crate) fn check_input(x: &ArrayView2<f64>) -> Result<(), ReduceError> {
    if x.nrows() < EMBEDDING_DIM {
        return Err(ReduceError::failure(format!(
            "need at least {} rows, got {}",
            EMBEDDING_DIM,
            x.nrows()
        )));
    }
    if x.ncols() < EMBEDDING_DIM {
        return Err(ReduceError::failure(format!(
            "need at least {} feature columns, got {}",
            EMBEDDING_DIM,
            x.ncols()
        )));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(ReduceError::failure("non-finite value in feature matrix"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_reduction_round_trips_through_json() {
        let r = Reduction::Tsne(Tsne {
            perplexity: 35.0,
            ..Tsne::default()
        });
        let text = serde_json::to_string(&r).unwrap();
        assert!(text.contains("\"method\":\"tsne\""));
        let back: Reduction = serde_json::from_str(&text).unwrap();
        match back {
            Reduction::Tsne(t) => assert_eq!(t.perplexity, 35.0),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_check_input_rejects_non_finite() {
        let x = array![[0.0, 1.0], [f64::NAN, 2.0]];
        assert!(matches!(
            check_input(&x.view()),
            Err(ReduceError::Failure(_))
        ));
    }

    #[test]
    fn test_check_input_rejects_single_row() {
        let x = array![[0.0, 1.0, 2.0]];
        assert!(check_input(&x.view()).is_err());
    }
}
