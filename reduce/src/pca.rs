//! Principal component analysis.
//!
//! The feature covariance is diagonalized with nalgebra's symmetric eigen
//! solver and the input is projected onto the two leading components. For
//! wide inputs a seeded randomized subspace iteration stands in for the
//! full decomposition.

use std::cmp::Ordering;

use log::debug;
use nalgebra::{DMatrix, DVector};
use nalgebra::linalg::SymmetricEigen;
use ndarray::{Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::ReduceError;
use crate::{check_input, Reducer, EMBEDDING_DIM};

/// Extra random directions kept beyond the two requested components.
const OVERSAMPLE: usize = 10;
/// Power iterations sharpening the randomized subspace.
const POWER_ITERS: usize = 4;
/// Inputs larger than this on either side get the randomized solver
/// under [`PcaSolver::Auto`].
const AUTO_RANDOMIZED_ABOVE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PcaSolver {
    #[default]
    Auto,
    Full,
    Randomized,
}

impl PcaSolver {
    fn resolve(self, n: usize, d: usize) -> PcaSolver {
        match self {
            PcaSolver::Auto => {
                if n.max(d) > AUTO_RANDOMIZED_ABOVE {
                    PcaSolver::Randomized
                } else {
                    PcaSolver::Full
                }
            }
            other => other,
        }
    }
}

/// Projection onto the two leading principal components.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Pca {
    /// Rescale each component to unit variance.
    pub whiten: bool,
    pub solver: PcaSolver,
    /// Seed for the randomized solver. Ignored by the full solver.
    pub seed: u64,
}

impl Default for Pca {
    fn default() -> Self {
        Self {
            whiten: false,
            solver: PcaSolver::Auto,
            seed: 42,
        }
    }
}

impl Reducer for Pca {
    fn name(&self) -> &'static str {
        "PCA"
    }

    fn validate(&self, _n_items: usize) -> Result<(), ReduceError> {
        // Both flags are total; nothing can be out of range.
        Ok(())
    }

    fn reduce(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ReduceError> {
        self.validate(x.nrows())?;
        check_input(&x)?;
        let n = x.nrows();
        let d = x.ncols();

        let means = x
            .mean_axis(Axis(0))
            .ok_or_else(|| ReduceError::failure("empty feature matrix"))?;
        let centered = &x - &means;
        let cov = centered.t().dot(&centered) / (n - 1) as f64;

        let solver = self.solver.resolve(n, d);
        debug!("pca: {n} x {d} input, {solver:?} solver");
        let (eigenvalues, mut components) = match solver {
            PcaSolver::Full => full_eigen(&cov),
            PcaSolver::Randomized => randomized_eigen(&cov, self.seed),
            PcaSolver::Auto => unreachable!("resolved above"),
        };
        fix_signs(&mut components);

        let mut scores = centered.dot(&components);
        if self.whiten {
            // Threshold relative to total variance, since a collinear input
            // leaves the minor eigenvalue at rounding level rather than zero.
            let total_variance: f64 = cov.diag().sum();
            let floor = (total_variance * 1e-12).max(f64::MIN_POSITIVE);
            for (k, value) in eigenvalues.iter().enumerate() {
                let variance = value.max(0.0);
                if variance <= floor {
                    return Err(ReduceError::failure(format!(
                        "component {k} has vanishing variance, cannot whiten"
                    )));
                }
                scores.column_mut(k).mapv_inplace(|v| v / variance.sqrt());
            }
        }
        Ok(scores)
    }
}

/// Indices of `values` sorted by descending value.
fn descending_order(values: &DVector<f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].partial_cmp(&values[a]).unwrap_or(Ordering::Equal));
    order
}

/// Full symmetric eigendecomposition of the covariance. Returns the two
/// leading eigenvalues and a `d x 2` component matrix.
fn full_eigen(cov: &Array2<f64>) -> ([f64; EMBEDDING_DIM], Array2<f64>) {
    let d = cov.nrows();
    let na_cov = DMatrix::from_fn(d, d, |i, j| cov[[i, j]]);
    let eigen = SymmetricEigen::new(na_cov);
    let order = descending_order(&eigen.eigenvalues);

    let mut eigenvalues = [0.0; EMBEDDING_DIM];
    let components = Array2::from_shape_fn((d, EMBEDDING_DIM), |(r, c)| {
        eigen.eigenvectors.column(order[c])[r]
    });
    for (c, value) in eigenvalues.iter_mut().enumerate() {
        *value = eigen.eigenvalues[order[c]];
    }
    (eigenvalues, components)
}

/// Randomized subspace iteration on the covariance. Seeded, so repeated
/// runs agree exactly.
fn randomized_eigen(cov: &Array2<f64>, seed: u64) -> ([f64; EMBEDDING_DIM], Array2<f64>) {
    let d = cov.nrows();
    let l = (EMBEDDING_DIM + OVERSAMPLE).min(d);
    let na_cov = DMatrix::from_fn(d, d, |i, j| cov[[i, j]]);

    let mut rng = StdRng::seed_from_u64(seed);
    let omega = DMatrix::from_fn(d, l, |_, _| rng.sample::<f64, _>(StandardNormal));
    let mut q = (&na_cov * omega).qr().q();
    for _ in 0..POWER_ITERS {
        q = (&na_cov * q).qr().q();
    }

    let small = q.transpose() * &na_cov * &q;
    let eigen = SymmetricEigen::new(small);
    let order = descending_order(&eigen.eigenvalues);

    let basis = &q * &eigen.eigenvectors;
    let mut eigenvalues = [0.0; EMBEDDING_DIM];
    let components = Array2::from_shape_fn((d, EMBEDDING_DIM), |(r, c)| basis.column(order[c])[r]);
    for (c, value) in eigenvalues.iter_mut().enumerate() {
        *value = eigen.eigenvalues[order[c]];
    }
    (eigenvalues, components)
}

/// Pin each component's sign so the entry of largest magnitude is positive.
/// Eigenvectors are only defined up to sign; without this, repeated runs
/// and the two solvers could disagree by a flip.
fn fix_signs(components: &mut Array2<f64>) {
    for mut col in components.axis_iter_mut(Axis(1)) {
        let mut extreme = 0.0f64;
        for &v in col.iter() {
            if v.abs() > extreme.abs() {
                extreme = v;
            }
        }
        if extreme < 0.0 {
            col.mapv_inplace(|v| -v);
        }
    }
}
