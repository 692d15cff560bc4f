//! Shared fixtures for explorer integration tests.

use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use spectra::SpectrumId;

pub const FIXTURE_SEED: u64 = 42;

/// Synthetic collection of two well-separated blobs with blob-correlated
/// targets, the shape every reduction method should keep apart.
pub struct BlobCollection {
    pub ids: Vec<SpectrumId>,
    pub features: Array2<f64>,
    pub targets: Array1<f64>,
    pub uncertainties: Array1<f64>,
}

pub fn blob_collection(n: usize, n_features: usize) -> BlobCollection {
    let mut rng = ChaCha8Rng::seed_from_u64(FIXTURE_SEED);

    let mut features = Array2::zeros((n, n_features));
    let mut targets = Array1::zeros(n);
    let mut uncertainties = Array1::zeros(n);
    let mut ids = Vec::with_capacity(n);

    for i in 0..n {
        let high = i % 2 == 1;
        let offset = if high { 8.0 } else { 0.0 };
        for j in 0..n_features {
            features[[i, j]] = offset + rng.gen_range(-0.5..0.5);
        }
        targets[i] = if high { 2.0 } else { 0.1 } + rng.gen_range(-0.01..0.01);
        uncertainties[i] = rng.gen_range(0.001..0.02);
        ids.push(SpectrumId::new(4000 + i as i32 / 100, 55_000, i as i32));
    }

    BlobCollection {
        ids,
        features,
        targets,
        uncertainties,
    }
}
