//! Uniform manifold approximation and projection.
//!
//! A fuzzy neighborhood graph is built from per-point adaptive bandwidths,
//! symmetrized with the probabilistic t-conorm, and laid out in the plane
//! by stochastic gradient descent with negative sampling. The layout pass
//! runs single threaded on a seeded generator, so a fixed seed reproduces
//! the embedding exactly.

use log::{debug, info};
use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::ReduceError;
use crate::knn::{nearest_neighbors, Metric, NeighborGraph};
use crate::{check_input, Reducer, EMBEDDING_DIM};

pub const N_NEIGHBORS_MIN: usize = 2;
pub const N_NEIGHBORS_MAX: usize = 100;

/// Width of the target falloff curve in embedding space.
const SPREAD: f64 = 1.0;
/// Negative edges drawn per positive edge sample.
const NEGATIVE_SAMPLE_RATE: f64 = 5.0;
const DEFAULT_EPOCHS_SMALL: usize = 500;
const DEFAULT_EPOCHS_LARGE: usize = 200;
/// Inputs above this row count get the shorter default epoch schedule.
const LARGE_INPUT: usize = 10_000;
/// Half-width of the embedding at initialization.
const INIT_SCALE: f64 = 10.0;
/// Per-coordinate gradient clip in the layout pass.
const GRAD_CLIP: f64 = 4.0;
const SIGMA_ITERS: usize = 64;
const SIGMA_TOL: f64 = 1e-5;
/// Bandwidth floor relative to the mean neighbor distance.
const MIN_BANDWIDTH_SCALE: f64 = 1e-3;
const POWER_STEPS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UmapInit {
    #[default]
    Spectral,
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Umap {
    /// Neighborhood size, counting the point itself.
    pub n_neighbors: usize,
    pub metric: Metric,
    /// Layout epochs. `None` picks a default from the input size.
    pub n_epochs: Option<usize>,
    pub learning_rate: f64,
    pub init: UmapInit,
    /// Minimum separation the embedding tries to keep between close points.
    pub min_dist: f64,
    pub seed: u64,
}

impl Default for Umap {
    fn default() -> Self {
        Self {
            n_neighbors: 15,
            metric: Metric::Euclidean,
            n_epochs: None,
            learning_rate: 1.0,
            init: UmapInit::Spectral,
            min_dist: 0.1,
            seed: 42,
        }
    }
}

impl Reducer for Umap {
    fn name(&self) -> &'static str {
        "UMAP"
    }

    fn validate(&self, n_items: usize) -> Result<(), ReduceError> {
        if self.n_neighbors < N_NEIGHBORS_MIN || self.n_neighbors > N_NEIGHBORS_MAX {
            return Err(ReduceError::invalid(
                "n_neighbors",
                format!(
                    "must be within [{N_NEIGHBORS_MIN}, {N_NEIGHBORS_MAX}], got {}",
                    self.n_neighbors
                ),
            ));
        }
        if self.n_neighbors >= n_items {
            return Err(ReduceError::invalid(
                "n_neighbors",
                format!("must be below the number of items ({n_items})"),
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(ReduceError::invalid(
                "learning_rate",
                format!("must be positive, got {}", self.learning_rate),
            ));
        }
        if !self.min_dist.is_finite() || self.min_dist < 0.0 || self.min_dist >= SPREAD {
            return Err(ReduceError::invalid(
                "min_dist",
                format!("must lie in [0, {SPREAD}), got {}", self.min_dist),
            ));
        }
        if let Metric::Minkowski { p } = self.metric {
            if !p.is_finite() || p < 1.0 {
                return Err(ReduceError::invalid(
                    "metric",
                    format!("minkowski order must be at least 1, got {p}"),
                ));
            }
        }
        if self.n_epochs == Some(0) {
            return Err(ReduceError::invalid("n_epochs", "must be at least 1"));
        }
        Ok(())
    }

    fn reduce(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ReduceError> {
        self.validate(x.nrows())?;
        check_input(&x)?;
        let n = x.nrows();

        let graph = nearest_neighbors(x, self.n_neighbors - 1, self.metric);
        let memberships = smooth_memberships(&graph, self.n_neighbors);
        let n_epochs = self.n_epochs.unwrap_or(if n <= LARGE_INPUT {
            DEFAULT_EPOCHS_SMALL
        } else {
            DEFAULT_EPOCHS_LARGE
        });
        let edges = fuzzy_union(n, &memberships, n_epochs);
        if edges.is_empty() {
            return Err(ReduceError::failure("neighborhood graph has no edges"));
        }
        info!(
            "umap: {} items, {} {} neighbors, {} edges, {} epochs",
            n,
            self.n_neighbors,
            self.metric.label(),
            edges.len(),
            n_epochs
        );

        let (a, b) = fit_kernel(self.min_dist, SPREAD);
        debug!("umap kernel fit: a = {a:.4}, b = {b:.4}");

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut y = match self.init {
            UmapInit::Random => random_layout(n, &mut rng),
            UmapInit::Spectral => match spectral_coordinates(n, &edges, &mut rng) {
                Some(raw) => scale_and_jitter(raw, &mut rng)?,
                None => {
                    debug!("umap: spectral initialization degenerate, using random layout");
                    random_layout(n, &mut rng)
                }
            },
        };

        self.optimize_layout(&mut y, &edges, n_epochs, a, b, &mut rng);
        Ok(y)
    }
}

impl Umap {
    fn optimize_layout(
        &self,
        y: &mut Array2<f64>,
        edges: &[Edge],
        n_epochs: usize,
        a: f64,
        b: f64,
        rng: &mut StdRng,
    ) {
        let n = y.nrows();
        let max_weight = edges.iter().map(|e| e.weight).fold(0.0, f64::max);
        let epochs_per_sample: Vec<f64> = edges.iter().map(|e| max_weight / e.weight).collect();
        let mut next_sample = epochs_per_sample.clone();
        let per_negative: Vec<f64> = epochs_per_sample
            .iter()
            .map(|e| e / NEGATIVE_SAMPLE_RATE)
            .collect();
        let mut next_negative = per_negative.clone();

        for epoch in 0..n_epochs {
            let alpha = self.learning_rate * (1.0 - epoch as f64 / n_epochs as f64);
            for (idx, edge) in edges.iter().enumerate() {
                if next_sample[idx] > epoch as f64 {
                    continue;
                }

                let d2 = point_dist2(y, edge.a, edge.b);
                if d2 > 0.0 {
                    let coeff = (-2.0 * a * b * d2.powf(b - 1.0)) / (1.0 + a * d2.powf(b));
                    for d in 0..EMBEDDING_DIM {
                        let g = clip(coeff * (y[[edge.a, d]] - y[[edge.b, d]]));
                        y[[edge.a, d]] += alpha * g;
                        y[[edge.b, d]] -= alpha * g;
                    }
                }
                next_sample[idx] += epochs_per_sample[idx];

                let n_neg = ((epoch as f64 - next_negative[idx]) / per_negative[idx]) as usize;
                for _ in 0..n_neg {
                    let other = rng.gen_range(0..n);
                    if other == edge.a {
                        continue;
                    }
                    let d2 = point_dist2(y, edge.a, other);
                    if d2 > 0.0 {
                        let coeff = (2.0 * b) / ((0.001 + d2) * (1.0 + a * d2.powf(b)));
                        for d in 0..EMBEDDING_DIM {
                            let g = clip(coeff * (y[[edge.a, d]] - y[[other, d]]));
                            y[[edge.a, d]] += alpha * g;
                        }
                    } else {
                        // Coincident points repel by the full clip.
                        for d in 0..EMBEDDING_DIM {
                            y[[edge.a, d]] += alpha * GRAD_CLIP;
                        }
                    }
                }
                next_negative[idx] += n_neg as f64 * per_negative[idx];
            }
            if epoch % 50 == 0 {
                debug!("umap epoch {epoch}/{n_epochs}, alpha {alpha:.4}");
            }
        }
    }
}

/// Undirected graph edge with `a < b`.
struct Edge {
    a: usize,
    b: usize,
    weight: f64,
}

fn clip(v: f64) -> f64 {
    v.clamp(-GRAD_CLIP, GRAD_CLIP)
}

fn point_dist2(y: &Array2<f64>, i: usize, j: usize) -> f64 {
    let dx = y[[i, 0]] - y[[j, 0]];
    let dy = y[[i, 1]] - y[[j, 1]];
    dx * dx + dy * dy
}

/// Per-point membership weights over the neighbor lists. The bandwidth of
/// each point is binary-searched so its weights sum to log2(n_neighbors),
/// after subtracting the distance to the nearest neighbor.
fn smooth_memberships(graph: &NeighborGraph, n_neighbors: usize) -> Vec<Vec<(usize, f64)>> {
    let target = (n_neighbors as f64).log2();
    graph
        .indices
        .iter()
        .zip(&graph.distances)
        .map(|(neighbors, dists)| {
            let rho = dists.iter().copied().find(|&d| d > 0.0).unwrap_or(0.0);
            let mean: f64 = dists.iter().sum::<f64>() / dists.len().max(1) as f64;

            let mut lo = 0.0_f64;
            let mut hi = f64::INFINITY;
            let mut sigma = 1.0_f64;
            for _ in 0..SIGMA_ITERS {
                let sum: f64 = dists
                    .iter()
                    .map(|&d| {
                        let adj = d - rho;
                        if adj <= 0.0 {
                            1.0
                        } else {
                            (-adj / sigma).exp()
                        }
                    })
                    .sum();
                if (sum - target).abs() < SIGMA_TOL {
                    break;
                }
                if sum > target {
                    hi = sigma;
                    sigma = (lo + hi) / 2.0;
                } else {
                    lo = sigma;
                    sigma = if hi.is_finite() {
                        (lo + hi) / 2.0
                    } else {
                        sigma * 2.0
                    };
                }
            }
            if mean > 0.0 {
                sigma = sigma.max(MIN_BANDWIDTH_SCALE * mean);
            }

            neighbors
                .iter()
                .zip(dists)
                .map(|(&j, &d)| {
                    let adj = d - rho;
                    let w = if adj <= 0.0 { 1.0 } else { (-adj / sigma).exp() };
                    (j, w)
                })
                .collect()
        })
        .collect()
}

/// Symmetrize directed memberships with the probabilistic t-conorm
/// `w + w' - w w'`, dropping edges too weak to ever be sampled within
/// `n_epochs`.
fn fuzzy_union(n: usize, memberships: &[Vec<(usize, f64)>], n_epochs: usize) -> Vec<Edge> {
    use std::collections::HashMap;

    let mut directed: HashMap<(usize, usize), (f64, f64)> = HashMap::new();
    for (i, row) in memberships.iter().enumerate() {
        for &(j, w) in row {
            if i == j {
                continue;
            }
            let key = (i.min(j), i.max(j));
            let slot = directed.entry(key).or_insert((0.0, 0.0));
            if i < j {
                slot.0 = w;
            } else {
                slot.1 = w;
            }
        }
    }
    debug_assert!(memberships.len() == n);

    let mut edges: Vec<Edge> = directed
        .into_iter()
        .map(|((a, b), (wab, wba))| Edge {
            a,
            b,
            weight: wab + wba - wab * wba,
        })
        .filter(|e| e.weight > 0.0)
        .collect();
    edges.sort_by(|x, y| (x.a, x.b).cmp(&(y.a, y.b)));

    let max_weight = edges.iter().map(|e| e.weight).fold(0.0, f64::max);
    let floor = max_weight / n_epochs as f64;
    edges.retain(|e| e.weight >= floor);
    edges
}

/// Fit the layout kernel `1 / (1 + a d^(2b))` to the falloff curve implied
/// by `min_dist` and `spread`: flat at one out to `min_dist`, exponential
/// decay beyond. Coarse grid search with multiplicative refinement.
fn fit_kernel(min_dist: f64, spread: f64) -> (f64, f64) {
    let xs: Vec<f64> = (0..300).map(|i| i as f64 * 3.0 * spread / 299.0).collect();
    let targets: Vec<f64> = xs
        .iter()
        .map(|&d| {
            if d <= min_dist {
                1.0
            } else {
                (-(d - min_dist) / spread).exp()
            }
        })
        .collect();
    let sse = |a: f64, b: f64| {
        xs.iter()
            .zip(&targets)
            .map(|(&d, &t)| {
                let v = 1.0 / (1.0 + a * d.powf(2.0 * b));
                (v - t) * (v - t)
            })
            .sum::<f64>()
    };

    let mut best = (1.0, 1.0);
    let mut best_err = f64::INFINITY;
    for ai in 0..60 {
        let a = 10f64.powf(-2.0 + 3.0 * ai as f64 / 59.0);
        for bi in 0..60 {
            let b = 0.1 + 2.4 * bi as f64 / 59.0;
            let err = sse(a, b);
            if err < best_err {
                best_err = err;
                best = (a, b);
            }
        }
    }
    for pass in 0..3 {
        let span = 0.3 / 3f64.powi(pass);
        let (a0, b0) = best;
        for ai in 0..25 {
            let a = a0 * (1.0 + span * (ai as f64 / 12.0 - 1.0));
            for bi in 0..25 {
                let b = b0 * (1.0 + span * (bi as f64 / 12.0 - 1.0));
                let err = sse(a, b);
                if err < best_err {
                    best_err = err;
                    best = (a, b);
                }
            }
        }
    }
    best
}

fn random_layout(n: usize, rng: &mut StdRng) -> Array2<f64> {
    Array2::from_shape_fn((n, EMBEDDING_DIM), |_| {
        rng.gen_range(-INIT_SCALE..INIT_SCALE)
    })
}

/// Raw spectral coordinates: the two eigenvectors of the shifted operator
/// `I + D^-1/2 A D^-1/2` just below its leading one, found by deflated
/// power iteration. `None` when the graph is too degenerate to use.
fn spectral_coordinates(n: usize, edges: &[Edge], rng: &mut StdRng) -> Option<Array2<f64>> {
    let mut degree = vec![0.0_f64; n];
    for e in edges {
        degree[e.a] += e.weight;
        degree[e.b] += e.weight;
    }
    if degree.iter().any(|&d| d <= 0.0) {
        return None;
    }
    let inv_sqrt: Vec<f64> = degree.iter().map(|d| 1.0 / d.sqrt()).collect();

    let matvec = |v: &[f64]| {
        let mut out = v.to_vec();
        for e in edges {
            let s = e.weight * inv_sqrt[e.a] * inv_sqrt[e.b];
            out[e.a] += s * v[e.b];
            out[e.b] += s * v[e.a];
        }
        out
    };

    // The leading eigenvector is known in closed form for a connected
    // graph; everything else is found orthogonal to it.
    let mut lead: Vec<f64> = degree.iter().map(|d| d.sqrt()).collect();
    normalize(&mut lead);
    let mut basis = vec![lead];

    let mut coords = Array2::<f64>::zeros((n, EMBEDDING_DIM));
    for c in 0..EMBEDDING_DIM {
        let mut v: Vec<f64> = (0..n).map(|_| rng.sample::<f64, _>(StandardNormal)).collect();
        orthogonalize(&mut v, &basis);
        if normalize(&mut v) <= 0.0 {
            return None;
        }
        for _ in 0..POWER_STEPS {
            let mut w = matvec(&v);
            orthogonalize(&mut w, &basis);
            if normalize(&mut w) <= 1e-12 {
                return None;
            }
            let agreement: f64 = w.iter().zip(&v).map(|(x, y)| x * y).sum();
            v = w;
            if (1.0 - agreement.abs()) < 1e-10 {
                break;
            }
        }
        for (i, &value) in v.iter().enumerate() {
            coords[[i, c]] = value;
        }
        basis.push(v);
    }
    Some(coords)
}

/// Expand raw spectral coordinates to the initialization scale and add a
/// little noise so no two points start exactly coincident.
fn scale_and_jitter(mut coords: Array2<f64>, rng: &mut StdRng) -> Result<Array2<f64>, ReduceError> {
    let max_abs = coords.iter().fold(0.0_f64, |m, &v| m.max(v.abs()));
    if max_abs <= 0.0 {
        return Err(ReduceError::failure("spectral initialization collapsed"));
    }
    let expansion = INIT_SCALE / max_abs;
    coords.mapv_inplace(|v| v * expansion);
    for v in coords.iter_mut() {
        *v += rng.sample::<f64, _>(StandardNormal) * 1e-4;
    }
    Ok(coords)
}

fn orthogonalize(v: &mut [f64], basis: &[Vec<f64>]) {
    for b in basis {
        let dot: f64 = v.iter().zip(b).map(|(x, y)| x * y).sum();
        for (x, y) in v.iter_mut().zip(b) {
            *x -= dot * y;
        }
    }
}

fn normalize(v: &mut [f64]) -> f64 {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn two_blobs(per_side: usize) -> Array2<f64> {
        let n = 2 * per_side;
        Array2::from_shape_fn((n, 3), |(i, j)| {
            let offset = if i < per_side { 0.0 } else { 40.0 };
            offset + (((i * 5 + j * 3) % 7) as f64 - 3.0) * 0.1
        })
    }

    #[test]
    fn test_rejects_out_of_range_parameters() {
        let cases = [
            Umap {
                n_neighbors: 1,
                ..Umap::default()
            },
            Umap {
                n_neighbors: 101,
                ..Umap::default()
            },
            Umap {
                learning_rate: 0.0,
                ..Umap::default()
            },
            Umap {
                min_dist: 1.5,
                ..Umap::default()
            },
            Umap {
                min_dist: -0.1,
                ..Umap::default()
            },
            Umap {
                metric: Metric::Minkowski { p: 0.5 },
                ..Umap::default()
            },
            Umap {
                n_epochs: Some(0),
                ..Umap::default()
            },
        ];
        for bad in cases {
            assert!(bad.validate(1000).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_rejects_neighborhood_wider_than_input() {
        let u = Umap {
            n_neighbors: 30,
            ..Umap::default()
        };
        assert!(u.validate(20).is_err());
        assert!(u.validate(31).is_ok());
    }

    #[test]
    fn test_kernel_fit_matches_reference_values() {
        // Published coefficients for the default curve are a = 1.577,
        // b = 0.895.
        let (a, b) = fit_kernel(0.1, 1.0);
        assert!((1.45..=1.70).contains(&a), "a = {a}");
        assert!((0.85..=0.95).contains(&b), "b = {b}");
    }

    #[test]
    fn test_memberships_sum_to_entropy_target() {
        let x = Array2::from_shape_fn((30, 2), |(i, j)| {
            ((i * 17 + j * 5) % 23) as f64 * 0.7 + j as f64
        });
        let graph = nearest_neighbors(x.view(), 9, Metric::Euclidean);
        let memberships = smooth_memberships(&graph, 10);
        let target = 10f64.log2();
        for row in &memberships {
            let sum: f64 = row.iter().map(|&(_, w)| w).sum();
            assert!((sum - target).abs() < 0.05, "sum {sum} vs target {target}");
            let peak = row.iter().map(|&(_, w)| w).fold(0.0, f64::max);
            assert!((peak - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fuzzy_union_applies_the_t_conorm() {
        let memberships = vec![vec![(1usize, 0.5_f64)], vec![(0usize, 0.2_f64)]];
        let edges = fuzzy_union(2, &memberships, 100);
        assert_eq!(edges.len(), 1);
        assert_eq!((edges[0].a, edges[0].b), (0, 1));
        assert!((edges[0].weight - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_spectral_coordinates_spread_a_path_graph() {
        let edges: Vec<Edge> = (0..5)
            .map(|i| Edge {
                a: i,
                b: i + 1,
                weight: 1.0,
            })
            .collect();
        let mut rng = StdRng::seed_from_u64(7);
        let coords = spectral_coordinates(6, &edges, &mut rng).unwrap();
        assert!(coords.iter().all(|v| v.is_finite()));
        // The first nontrivial eigenvector varies monotonically along a
        // path, so the endpoints land far apart.
        assert!((coords[[0, 0]] - coords[[5, 0]]).abs() > 0.1);
    }

    #[test]
    fn test_layout_is_reproducible() {
        let x = two_blobs(12);
        let u = Umap {
            n_neighbors: 5,
            n_epochs: Some(60),
            init: UmapInit::Random,
            ..Umap::default()
        };
        let first = u.reduce(x.view()).unwrap();
        let second = u.reduce(x.view()).unwrap();
        assert_eq!(first.dim(), (24, 2));
        assert_eq!(first, second);
        assert!(first.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_distant_blobs_stay_apart() {
        let per_side = 15;
        let x = two_blobs(per_side);
        let u = Umap {
            n_neighbors: 5,
            n_epochs: Some(100),
            ..Umap::default()
        };
        let y = u.reduce(x.view()).unwrap();

        let centroid = |lo: usize, hi: usize| {
            let len = (hi - lo) as f64;
            let mut cx = 0.0;
            let mut cy = 0.0;
            for i in lo..hi {
                cx += y[[i, 0]];
                cy += y[[i, 1]];
            }
            (cx / len, cy / len)
        };
        let a = centroid(0, per_side);
        let b = centroid(per_side, 2 * per_side);
        let gap = ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt();

        let mut intra = 0.0;
        for i in 0..per_side {
            intra += ((y[[i, 0]] - a.0).powi(2) + (y[[i, 1]] - a.1).powi(2)).sqrt();
        }
        intra /= per_side as f64;
        assert!(
            gap > 2.0 * intra,
            "gap {gap} should dominate intra spread {intra}"
        );
    }
}
