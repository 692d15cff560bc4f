//! Exact nearest-neighbor search over feature matrices.
//!
//! Brute force with a parallel outer loop. Fast enough for session-sized
//! inputs and has no tuning knobs, which keeps the neighbor graphs fed to
//! t-SNE and UMAP exact rather than approximate.

use std::cmp::Ordering;

use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Distance metric for neighbor searches in feature space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Metric {
    Euclidean,
    Manhattan,
    Chebyshev,
    /// Minkowski distance of order `p`, `p >= 1`.
    Minkowski { p: f64 },
}

impl Default for Metric {
    fn default() -> Self {
        Metric::Euclidean
    }
}

impl Metric {
    pub fn distance(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match *self {
            Metric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
                .sqrt(),
            Metric::Manhattan => a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum(),
            Metric::Chebyshev => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y).abs())
                .fold(0.0, f64::max),
            Metric::Minkowski { p } => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y).abs().powf(p))
                .sum::<f64>()
                .powf(1.0 / p),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Metric::Euclidean => "euclidean",
            Metric::Manhattan => "manhattan",
            Metric::Chebyshev => "chebyshev",
            Metric::Minkowski { .. } => "minkowski",
        }
    }
}

/// Neighbor lists for every row of the input.
///
/// `indices[i]` holds the `k` rows nearest to row `i` with the row itself
/// excluded, ordered by ascending distance. `distances[i]` matches it
/// entry for entry.
#[derive(Debug, Clone)]
pub struct NeighborGraph {
    pub indices: Vec<Vec<usize>>,
    pub distances: Vec<Vec<f64>>,
    pub k: usize,
}

/// Find the `k` nearest neighbors of every row. Callers must ensure
/// `k < x.nrows()`.
pub fn nearest_neighbors(x: ArrayView2<f64>, k: usize, metric: Metric) -> NeighborGraph {
    let n = x.nrows();
    debug_assert!(k < n);
    let rows: Vec<(Vec<usize>, Vec<f64>)> = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut scored: Vec<(f64, usize)> = (0..n)
                .filter(|&j| j != i)
                .map(|j| (metric.distance(x.row(i), x.row(j)), j))
                .collect();
            scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
            scored.truncate(k);
            (
                scored.iter().map(|&(_, j)| j).collect(),
                scored.iter().map(|&(d, _)| d).collect(),
            )
        })
        .collect();

    let mut indices = Vec::with_capacity(n);
    let mut distances = Vec::with_capacity(n);
    for (idx, dist) in rows {
        indices.push(idx);
        distances.push(dist);
    }
    NeighborGraph {
        indices,
        distances,
        k,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_metrics_agree_with_hand_values() {
        let a = array![0.0, 0.0];
        let b = array![3.0, 4.0];
        assert_relative_eq!(Metric::Euclidean.distance(a.view(), b.view()), 5.0);
        assert_relative_eq!(Metric::Manhattan.distance(a.view(), b.view()), 7.0);
        assert_relative_eq!(Metric::Chebyshev.distance(a.view(), b.view()), 4.0);
        assert_relative_eq!(
            Metric::Minkowski { p: 2.0 }.distance(a.view(), b.view()),
            5.0
        );
        assert_relative_eq!(
            Metric::Minkowski { p: 1.0 }.distance(a.view(), b.view()),
            7.0
        );
    }

    #[test]
    fn test_neighbors_ordered_and_self_excluded() {
        // Points on a line, so neighbor order is obvious.
        let x = array![[0.0, 0.0], [1.0, 0.0], [2.5, 0.0], [10.0, 0.0]];
        let graph = nearest_neighbors(x.view(), 2, Metric::Euclidean);
        assert_eq!(graph.indices[0], vec![1, 2]);
        assert_relative_eq!(graph.distances[0][0], 1.0);
        assert_relative_eq!(graph.distances[0][1], 2.5);
        assert_eq!(graph.indices[3], vec![2, 1]);
        for (i, neighbors) in graph.indices.iter().enumerate() {
            assert!(!neighbors.contains(&i));
            assert_eq!(neighbors.len(), 2);
        }
    }

    #[test]
    fn test_chebyshev_changes_the_winner() {
        // From the origin, (2, 2) is Chebyshev-closer than (0, 2.5) but
        // Euclidean-farther, so the nearest neighbor depends on the metric.
        let x = array![[0.0, 0.0], [2.0, 2.0], [0.0, 2.5]];
        let euclid = nearest_neighbors(x.view(), 1, Metric::Euclidean);
        let cheby = nearest_neighbors(x.view(), 1, Metric::Chebyshev);
        assert_eq!(euclid.indices[0], vec![2]);
        assert_eq!(cheby.indices[0], vec![1]);
        assert_relative_eq!(cheby.distances[0][0], 2.0);
        assert_relative_eq!(euclid.distances[0][0], 2.5);
    }
}
