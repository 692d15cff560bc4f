//! Log-wavelength grids and flux-conserving resampling.
//!
//! Archive spectra share a uniform grid in log10 wavelength. Feature vectors
//! live on a shorter uniform grid whose ends are trimmed by [`EDGE_TRIM`] so
//! that every feature bin is fully covered by raw bins and resampling never
//! produces undefined edge values.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use thiserror::Error;

/// Number of raw wavelength bins per archive spectrum.
pub const N_WAVES: usize = 3724;
/// Lower edge of the common grid, log10 Angstrom.
pub const LOGLAM_MIN: f64 = 3.5836;
/// Upper edge of the common grid, log10 Angstrom.
pub const LOGLAM_MAX: f64 = 3.9559;
/// Number of resampled feature bins.
pub const N_FEATURES: usize = 512;
/// Trim applied to both ends of the feature grid, log10 Angstrom.
pub const EDGE_TRIM: f64 = 0.0005;

/// Errors that can occur during flux resampling.
#[derive(Error, Debug)]
pub enum ResampleError {
    #[error("flux length {actual} does not match source grid length {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("target bin {index} spanning [{lo}, {hi}] is not covered by the source grid")]
    Coverage { index: usize, lo: f64, hi: f64 },
}

/// Uniform grid in log10 wavelength.
///
/// Grid points are bin centers; bin edges sit at midpoints between
/// neighboring points, with the first and last bin extended by half a step.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLamGrid {
    start: f64,
    stop: f64,
    len: usize,
}

impl LogLamGrid {
    /// Create a grid of `len` evenly spaced points over `[start, stop]`.
    pub fn new(start: f64, stop: f64, len: usize) -> Self {
        assert!(len >= 2, "grid needs at least 2 points");
        assert!(stop > start, "grid range must be increasing");
        Self { start, stop, len }
    }

    /// The raw archive grid: [`N_WAVES`] points over [[`LOGLAM_MIN`], [`LOGLAM_MAX`]].
    pub fn raw() -> Self {
        Self::new(LOGLAM_MIN, LOGLAM_MAX, N_WAVES)
    }

    /// The feature grid: [`N_FEATURES`] points over the edge-trimmed range.
    pub fn features() -> Self {
        Self::new(LOGLAM_MIN + EDGE_TRIM, LOGLAM_MAX - EDGE_TRIM, N_FEATURES)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Spacing between neighboring grid points.
    pub fn step(&self) -> f64 {
        (self.stop - self.start) / (self.len - 1) as f64
    }

    /// Grid point positions in log10 Angstrom.
    pub fn values(&self) -> Array1<f64> {
        let step = self.step();
        Array1::from_shape_fn(self.len, |i| self.start + i as f64 * step)
    }

    /// Grid point positions in Angstrom.
    pub fn wavelengths(&self) -> Array1<f64> {
        self.values().mapv(|loglam| 10f64.powf(loglam))
    }

    /// Bin edges (length `len + 1`): midpoints between grid points, end bins
    /// extended by half a step.
    fn edges(&self) -> Vec<f64> {
        let step = self.step();
        (0..=self.len)
            .map(|i| self.start + (i as f64 - 0.5) * step)
            .collect()
    }
}

/// Resample one flux vector onto a new grid, conserving flux.
///
/// Each target bin receives the overlap-weighted mean of the source bins it
/// covers, so constant spectra are preserved exactly and the integral over
/// the target support equals the integral of the source over the same
/// support.
///
/// # Arguments
/// * `target` - Grid to resample onto
/// * `source` - Grid the input flux is sampled on
/// * `flux` - Flux values, one per source grid point
///
/// # Returns
/// * `Ok(Array1<f64>)` - Flux values on the target grid
/// * `Err(ResampleError)` - Length mismatch, or a target bin extends outside
///   the source bins (trim the target grid, as the feature grid does)
pub fn resample(
    target: &LogLamGrid,
    source: &LogLamGrid,
    flux: ArrayView1<f64>,
) -> Result<Array1<f64>, ResampleError> {
    if flux.len() != source.len() {
        return Err(ResampleError::LengthMismatch {
            expected: source.len(),
            actual: flux.len(),
        });
    }

    let src_edges = source.edges();
    let dst_edges = target.edges();
    let mut out = Array1::zeros(target.len());

    // Cursor over source bins; both edge lists are ascending.
    let mut start = 0usize;
    for i in 0..target.len() {
        let lo = dst_edges[i];
        let hi = dst_edges[i + 1];
        if lo < src_edges[0] || hi > src_edges[source.len()] {
            return Err(ResampleError::Coverage { index: i, lo, hi });
        }

        while src_edges[start + 1] <= lo {
            start += 1;
        }

        let mut weighted = 0.0;
        let mut width = 0.0;
        let mut j = start;
        while j < source.len() && src_edges[j] < hi {
            let overlap = src_edges[j + 1].min(hi) - src_edges[j].max(lo);
            if overlap > 0.0 {
                weighted += overlap * flux[j];
                width += overlap;
            }
            j += 1;
        }
        out[i] = weighted / width;
    }

    Ok(out)
}

/// Resample every row of a flux matrix onto a new grid in parallel.
///
/// Rows are independent, so they are distributed across the rayon pool.
/// Accumulation runs in f64 even though archive fluxes are stored as f32.
pub fn resample_rows(
    target: &LogLamGrid,
    source: &LogLamGrid,
    fluxes: ArrayView2<f32>,
) -> Result<Array2<f32>, ResampleError> {
    if fluxes.ncols() != source.len() {
        return Err(ResampleError::LengthMismatch {
            expected: source.len(),
            actual: fluxes.ncols(),
        });
    }

    let rows: Vec<_> = fluxes.outer_iter().collect();
    let resampled: Result<Vec<Vec<f32>>, ResampleError> = rows
        .into_par_iter()
        .map(|row| {
            let row64 = row.mapv(f64::from);
            let out = resample(target, source, row64.view())?;
            Ok(out.iter().map(|&v| v as f32).collect())
        })
        .collect();

    let flat: Vec<f32> = resampled?.into_iter().flatten().collect();
    let out = Array2::from_shape_vec((fluxes.nrows(), target.len()), flat)
        .expect("resampled rows have uniform length");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_feature_grid_shape() {
        let grid = LogLamGrid::features();
        assert_eq!(grid.len(), N_FEATURES);
        let values = grid.values();
        assert_relative_eq!(values[0], LOGLAM_MIN + EDGE_TRIM, epsilon = 1e-12);
        assert_relative_eq!(
            values[N_FEATURES - 1],
            LOGLAM_MAX - EDGE_TRIM,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_wavelengths_are_powers_of_ten() {
        let grid = LogLamGrid::new(1.0, 3.0, 3);
        let wave = grid.wavelengths();
        assert_relative_eq!(wave[0], 10.0, epsilon = 1e-9);
        assert_relative_eq!(wave[1], 100.0, epsilon = 1e-9);
        assert_relative_eq!(wave[2], 1000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_resample_preserves_constant() {
        let source = LogLamGrid::new(0.0, 1.0, 21);
        let target = LogLamGrid::new(0.1, 0.9, 7);
        let flux = Array1::from_elem(21, 3.25);
        let out = resample(&target, &source, flux.view()).unwrap();
        for &v in out.iter() {
            assert_relative_eq!(v, 3.25, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_resample_identity_on_same_grid() {
        let grid = LogLamGrid::new(0.0, 1.0, 9);
        let flux = array![1.0, 4.0, 2.0, 8.0, 5.0, 7.0, 3.0, 6.0, 9.0];
        let out = resample(&grid, &grid, flux.view()).unwrap();
        for (a, b) in out.iter().zip(flux.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_resample_ramp_tracks_bin_centers() {
        // A linear ramp on a fine source grid rebinned to a coarse grid
        // should land close to the ramp value at each target bin center.
        let source = LogLamGrid::new(0.0, 1.0, 1001);
        let target = LogLamGrid::new(0.05, 0.95, 10);
        let flux = source.values().mapv(|x| 2.0 * x - 0.5);
        let out = resample(&target, &source, flux.view()).unwrap();
        for (v, x) in out.iter().zip(target.values().iter()) {
            assert_relative_eq!(v, &(2.0 * x - 0.5), epsilon = 1e-3);
        }
    }

    #[test]
    fn test_resample_coverage_error() {
        let source = LogLamGrid::new(0.2, 0.8, 11);
        let target = LogLamGrid::new(0.0, 1.0, 5);
        let flux = Array1::ones(11);
        assert!(matches!(
            resample(&target, &source, flux.view()),
            Err(ResampleError::Coverage { index: 0, .. })
        ));
    }

    #[test]
    fn test_resample_length_mismatch() {
        let source = LogLamGrid::new(0.0, 1.0, 11);
        let target = LogLamGrid::new(0.1, 0.9, 5);
        let flux = Array1::ones(10);
        assert!(matches!(
            resample(&target, &source, flux.view()),
            Err(ResampleError::LengthMismatch {
                expected: 11,
                actual: 10
            })
        ));
    }

    #[test]
    fn test_feature_grid_covered_by_raw_grid() {
        // The trim exists exactly so this resampling is always defined.
        let raw = LogLamGrid::raw();
        let features = LogLamGrid::features();
        let flux = Array1::from_elem(raw.len(), 1.0);
        let out = resample(&features, &raw, flux.view()).unwrap();
        assert_eq!(out.len(), N_FEATURES);
    }

    #[test]
    fn test_resample_rows_matches_single() {
        let source = LogLamGrid::new(0.0, 1.0, 51);
        let target = LogLamGrid::new(0.1, 0.9, 8);
        let row: Array1<f32> = source.values().mapv(|x| (3.0 * x).sin() as f32);
        let mut fluxes = Array2::zeros((3, 51));
        for mut r in fluxes.rows_mut() {
            r.assign(&row);
        }
        let out = resample_rows(&target, &source, fluxes.view()).unwrap();
        let single = resample(&target, &source, row.mapv(f64::from).view()).unwrap();
        assert_eq!(out.dim(), (3, 8));
        for r in 0..3 {
            for c in 0..8 {
                assert_relative_eq!(f64::from(out[[r, c]]), single[c], epsilon = 1e-6);
            }
        }
    }
}
