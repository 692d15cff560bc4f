//! t-distributed stochastic neighbor embedding.
//!
//! Gaussian affinities in feature space are matched against a Student-t
//! kernel in the plane by gradient descent with momentum and per-coordinate
//! gain adaptation. The quadratic exact gradient and the Barnes-Hut
//! approximation share the optimizer; they differ only in how the pairwise
//! sums are evaluated.
//!
//! Parallel phases compute one row per task and combine scalars
//! sequentially, so a fixed seed reproduces the embedding exactly.

use log::{debug, info};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ReduceError;
use crate::knn::{nearest_neighbors, Metric};
use crate::pca::{Pca, PcaSolver};
use crate::quadtree::QuadTree;
use crate::{check_input, Reducer, EMBEDDING_DIM};

pub const PERPLEXITY_MIN: f64 = 5.0;
pub const PERPLEXITY_MAX: f64 = 50.0;

/// Iterations spent with affinities inflated by `early_exaggeration`.
const EXAGGERATION_ITERS: usize = 250;
const INITIAL_MOMENTUM: f64 = 0.5;
const FINAL_MOMENTUM: f64 = 0.8;
const MIN_GAIN: f64 = 0.01;
/// Stop once the gradient is this flat, after exaggeration settles.
const MIN_GRAD_NORM: f64 = 1e-7;
/// Barnes-Hut cell acceptance threshold.
const THETA: f64 = 0.5;
/// Shortest run the optimizer schedule makes sense for.
const MIN_ITERS: usize = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TsneInit {
    #[default]
    Random,
    Pca,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TsneMethod {
    #[default]
    BarnesHut,
    Exact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tsne {
    /// Effective neighborhood size each point attends to.
    pub perplexity: f64,
    /// Affinity multiplier during the first phase of optimization.
    pub early_exaggeration: f64,
    pub learning_rate: f64,
    pub n_iter: usize,
    pub init: TsneInit,
    pub method: TsneMethod,
    /// Worker threads for the heavy phases. `None` uses the global pool.
    pub n_jobs: Option<usize>,
    pub seed: u64,
}

impl Default for Tsne {
    fn default() -> Self {
        Self {
            perplexity: 30.0,
            early_exaggeration: 12.0,
            learning_rate: 200.0,
            n_iter: 1000,
            init: TsneInit::Random,
            method: TsneMethod::BarnesHut,
            n_jobs: None,
            seed: 42,
        }
    }
}

impl Reducer for Tsne {
    fn name(&self) -> &'static str {
        "t-SNE"
    }

    fn validate(&self, n_items: usize) -> Result<(), ReduceError> {
        if !self.perplexity.is_finite()
            || self.perplexity < PERPLEXITY_MIN
            || self.perplexity > PERPLEXITY_MAX
        {
            return Err(ReduceError::invalid(
                "perplexity",
                format!(
                    "must be within [{PERPLEXITY_MIN}, {PERPLEXITY_MAX}], got {}",
                    self.perplexity
                ),
            ));
        }
        if self.perplexity >= n_items as f64 {
            return Err(ReduceError::invalid(
                "perplexity",
                format!("must be below the number of items ({n_items})"),
            ));
        }
        if !self.early_exaggeration.is_finite() || self.early_exaggeration <= 0.0 {
            return Err(ReduceError::invalid(
                "early_exaggeration",
                format!("must be positive, got {}", self.early_exaggeration),
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(ReduceError::invalid(
                "learning_rate",
                format!("must be positive, got {}", self.learning_rate),
            ));
        }
        if self.n_iter < MIN_ITERS {
            return Err(ReduceError::invalid(
                "n_iter",
                format!("must be at least {MIN_ITERS}, got {}", self.n_iter),
            ));
        }
        if self.n_jobs == Some(0) {
            return Err(ReduceError::invalid("n_jobs", "must be at least 1"));
        }
        Ok(())
    }

    fn reduce(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ReduceError> {
        self.validate(x.nrows())?;
        check_input(&x)?;
        match self.n_jobs {
            None => self.run(x),
            Some(workers) => rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| ReduceError::failure(format!("thread pool: {e}")))?
                .install(|| self.run(x)),
        }
    }
}

impl Tsne {
    fn run(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ReduceError> {
        let n = x.nrows();
        info!(
            "t-sne: {} items, perplexity {}, {:?} gradients",
            n, self.perplexity, self.method
        );
        let affinities = match self.method {
            TsneMethod::Exact => Affinities::Dense(dense_affinities(x, self.perplexity)),
            TsneMethod::BarnesHut => Affinities::Sparse(sparse_affinities(x, self.perplexity)),
        };
        let y = self.initial_embedding(x)?;
        Ok(self.optimize(affinities, y))
    }

    fn initial_embedding(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ReduceError> {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};
        use rand_distr::StandardNormal;

        let n = x.nrows();
        match self.init {
            TsneInit::Random => {
                let mut rng = StdRng::seed_from_u64(self.seed);
                Ok(Array2::from_shape_fn((n, EMBEDDING_DIM), |_| {
                    rng.sample::<f64, _>(StandardNormal) * 1e-4
                }))
            }
            TsneInit::Pca => {
                let scores = Pca {
                    whiten: false,
                    solver: PcaSolver::Auto,
                    seed: self.seed,
                }
                .reduce(x)?;
                // Shrink to the same scale a random start would have.
                let col = scores.column(0);
                let mean = col.sum() / n as f64;
                let std = (col.mapv(|v| (v - mean) * (v - mean)).sum() / n as f64).sqrt();
                if !(std > 0.0) {
                    return Err(ReduceError::failure(
                        "pca initialization collapsed to a point",
                    ));
                }
                Ok(scores * (1e-4 / std))
            }
        }
    }

    fn optimize(&self, mut affinities: Affinities, mut y: Array2<f64>) -> Array2<f64> {
        let n = y.nrows();
        let mut velocity = Array2::<f64>::zeros((n, EMBEDDING_DIM));
        let mut gains = Array2::<f64>::ones((n, EMBEDDING_DIM));

        affinities.scale(self.early_exaggeration);
        for iter in 0..self.n_iter {
            if iter == EXAGGERATION_ITERS {
                affinities.scale(1.0 / self.early_exaggeration);
            }
            let (grad, kl) = affinities.gradient(&y);
            let momentum = if iter < EXAGGERATION_ITERS {
                INITIAL_MOMENTUM
            } else {
                FINAL_MOMENTUM
            };

            ndarray::Zip::from(&mut y)
                .and(&mut velocity)
                .and(&mut gains)
                .and(&grad)
                .for_each(|yv, v, gain, &g| {
                    *gain = if (g > 0.0) == (*v > 0.0) {
                        (*gain * 0.8).max(MIN_GAIN)
                    } else {
                        *gain + 0.2
                    };
                    *v = momentum * *v - self.learning_rate * *gain * g;
                    *yv += *v;
                });
            if let Some(means) = y.mean_axis(Axis(0)) {
                y -= &means;
            }

            let grad_norm = grad.mapv(|g| g * g).sum().sqrt();
            if iter % 50 == 0 || iter + 1 == self.n_iter {
                debug!("t-sne iter {iter}: kl {kl:.4}, grad norm {grad_norm:.3e}");
            }
            if grad_norm < MIN_GRAD_NORM && iter >= EXAGGERATION_ITERS {
                info!("t-sne converged at iter {iter}, grad norm {grad_norm:.3e}");
                break;
            }
        }
        y
    }
}

/// Joint affinities, dense for the exact gradient and row-sparse for
/// Barnes-Hut. Both sum to one over all ordered pairs.
enum Affinities {
    Dense(Array2<f64>),
    Sparse(Vec<Vec<(usize, f64)>>),
}

impl Affinities {
    fn scale(&mut self, factor: f64) {
        match self {
            Affinities::Dense(p) => p.mapv_inplace(|v| v * factor),
            Affinities::Sparse(rows) => {
                for row in rows {
                    for entry in row.iter_mut() {
                        entry.1 *= factor;
                    }
                }
            }
        }
    }

    /// Gradient of the KL divergence at `y`, plus the divergence itself
    /// (approximated over the sparse support in the Barnes-Hut case).
    fn gradient(&self, y: &Array2<f64>) -> (Array2<f64>, f64) {
        match self {
            Affinities::Dense(p) => exact_gradient(p, y),
            Affinities::Sparse(p) => bh_gradient(p, y, THETA),
        }
    }
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Gaussian conditional probabilities for one point given squared distances
/// to the others, with the precision binary-searched until the entropy hits
/// `target_entropy`.
fn conditional_row(d2: &[f64], target_entropy: f64) -> Vec<f64> {
    // Shifting by the closest distance keeps the exponentials in range
    // without changing the normalized probabilities.
    let shift = d2.iter().copied().fold(f64::INFINITY, f64::min);
    let shifted: Vec<f64> = d2.iter().map(|&d| d - shift).collect();

    let mut beta = 1.0_f64;
    let mut beta_min = 0.0_f64;
    let mut beta_max = f64::INFINITY;
    for _ in 0..50 {
        let mut sum = 0.0;
        let mut weighted = 0.0;
        for &d in &shifted {
            let w = (-beta * d).exp();
            sum += w;
            weighted += d * w;
        }
        let entropy = sum.ln() + beta * weighted / sum;
        let diff = entropy - target_entropy;
        if diff.abs() < 1e-5 {
            break;
        }
        if diff > 0.0 {
            beta_min = beta;
            beta = if beta_max.is_finite() {
                (beta + beta_max) / 2.0
            } else {
                beta * 2.0
            };
        } else {
            beta_max = beta;
            beta = (beta + beta_min) / 2.0;
        }
    }

    let mut probs: Vec<f64> = shifted.iter().map(|&d| (-beta * d).exp()).collect();
    let total: f64 = probs.iter().sum();
    if total > 0.0 {
        for p in &mut probs {
            *p /= total;
        }
    }
    probs
}

/// Full symmetric joint affinity matrix with a zero diagonal.
fn dense_affinities(x: ArrayView2<f64>, perplexity: f64) -> Array2<f64> {
    let n = x.nrows();
    let target = perplexity.ln();
    let conditionals: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let d2: Vec<f64> = (0..n)
                .filter(|&j| j != i)
                .map(|j| squared_distance(x.row(i), x.row(j)))
                .collect();
            conditional_row(&d2, target)
        })
        .collect();

    let mut conditional = Array2::<f64>::zeros((n, n));
    for (i, row) in conditionals.into_iter().enumerate() {
        let mut values = row.into_iter();
        for j in 0..n {
            if j == i {
                continue;
            }
            conditional[[i, j]] = values.next().unwrap_or(0.0);
        }
    }

    let mut joint = (&conditional + &conditional.t()) / (2.0 * n as f64);
    for ((i, j), v) in joint.indexed_iter_mut() {
        if i != j {
            *v = v.max(1e-12);
        }
    }
    joint
}

/// Row-sparse joint affinities over each point's nearest neighbors.
fn sparse_affinities(x: ArrayView2<f64>, perplexity: f64) -> Vec<Vec<(usize, f64)>> {
    let n = x.nrows();
    let k = ((3.0 * perplexity) as usize).min(n - 1);
    let graph = nearest_neighbors(x, k, Metric::Euclidean);
    let target = perplexity.ln();

    let conditionals: Vec<Vec<f64>> = graph
        .distances
        .par_iter()
        .map(|dists| {
            let d2: Vec<f64> = dists.iter().map(|&d| d * d).collect();
            conditional_row(&d2, target)
        })
        .collect();

    let norm = 2.0 * n as f64;
    let mut rows: Vec<std::collections::HashMap<usize, f64>> = vec![Default::default(); n];
    for i in 0..n {
        for (slot, &j) in graph.indices[i].iter().enumerate() {
            let w = conditionals[i][slot] / norm;
            *rows[i].entry(j).or_insert(0.0) += w;
            *rows[j].entry(i).or_insert(0.0) += w;
        }
    }
    rows.into_iter()
        .map(|row| {
            let mut entries: Vec<(usize, f64)> = row.into_iter().collect();
            entries.sort_by_key(|&(j, _)| j);
            entries
        })
        .collect()
}

/// Exact KL gradient with quadratic pairwise sums.
fn exact_gradient(p: &Array2<f64>, y: &Array2<f64>) -> (Array2<f64>, f64) {
    let n = y.nrows();
    let points: Vec<(f64, f64)> = (0..n).map(|i| (y[[i, 0]], y[[i, 1]])).collect();

    let num_rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            (0..n)
                .map(|j| {
                    if i == j {
                        0.0
                    } else {
                        let dx = points[i].0 - points[j].0;
                        let dy = points[i].1 - points[j].1;
                        1.0 / (1.0 + dx * dx + dy * dy)
                    }
                })
                .collect()
        })
        .collect();
    let z: f64 = num_rows.iter().map(|r| r.iter().sum::<f64>()).sum();
    let z = z.max(f64::MIN_POSITIVE);

    let per_row: Vec<([f64; 2], f64)> = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut gx = 0.0;
            let mut gy = 0.0;
            let mut kl = 0.0;
            for j in 0..n {
                if j == i {
                    continue;
                }
                let num = num_rows[i][j];
                let pij = p[[i, j]];
                let coeff = (pij - num / z) * num;
                gx += coeff * (points[i].0 - points[j].0);
                gy += coeff * (points[i].1 - points[j].1);
                if pij > 0.0 {
                    kl += pij * (pij.ln() - (num / z).ln());
                }
            }
            ([4.0 * gx, 4.0 * gy], kl)
        })
        .collect();

    let mut grad = Array2::<f64>::zeros((n, EMBEDDING_DIM));
    let mut kl = 0.0;
    for (i, (g, row_kl)) in per_row.into_iter().enumerate() {
        grad[[i, 0]] = g[0];
        grad[[i, 1]] = g[1];
        kl += row_kl;
    }
    (grad, kl)
}

/// Barnes-Hut KL gradient: exact attraction over the sparse affinities,
/// tree-approximated repulsion.
fn bh_gradient(p: &[Vec<(usize, f64)>], y: &Array2<f64>, theta: f64) -> (Array2<f64>, f64) {
    let n = y.nrows();
    let points: Vec<(f64, f64)> = (0..n).map(|i| (y[[i, 0]], y[[i, 1]])).collect();
    let tree = QuadTree::build(&points);

    let repulsion: Vec<(f64, f64, f64)> = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut z_part = 0.0;
            let mut fx = 0.0;
            let mut fy = 0.0;
            tree.for_each_summary(points[i], theta, &mut |mass, dist2, delta| {
                let q = 1.0 / (1.0 + dist2);
                z_part += mass * q;
                fx += mass * q * q * delta.0;
                fy += mass * q * q * delta.1;
            });
            (z_part, fx, fy)
        })
        .collect();
    let z: f64 = repulsion.iter().map(|r| r.0).sum();
    let z = z.max(f64::MIN_POSITIVE);

    let per_row: Vec<([f64; 2], f64)> = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut ax = 0.0;
            let mut ay = 0.0;
            let mut kl = 0.0;
            for &(j, pij) in &p[i] {
                let dx = points[i].0 - points[j].0;
                let dy = points[i].1 - points[j].1;
                let q = 1.0 / (1.0 + dx * dx + dy * dy);
                ax += pij * q * dx;
                ay += pij * q * dy;
                if pij > 0.0 {
                    kl += pij * (pij.ln() - (q / z).ln());
                }
            }
            let (_, rx, ry) = repulsion[i];
            ([4.0 * (ax - rx / z), 4.0 * (ay - ry / z)], kl)
        })
        .collect();

    let mut grad = Array2::<f64>::zeros((n, EMBEDDING_DIM));
    let mut kl = 0.0;
    for (i, (g, row_kl)) in per_row.into_iter().enumerate() {
        grad[[i, 0]] = g[0];
        grad[[i, 1]] = g[1];
        kl += row_kl;
    }
    (grad, kl)
}
