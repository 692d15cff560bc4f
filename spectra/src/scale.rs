//! Per-spectrum normalization.

use ndarray::Array2;

/// Scale every row of `x` to [-1, 1] using that row's own min and max.
///
/// Feature vectors are normalized per spectrum so that continuum level and
/// exposure differences do not dominate distances between spectra. A constant
/// row has zero range and maps to all -1.
pub fn minmax_rows(x: &mut Array2<f32>) {
    for mut row in x.rows_mut() {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &v in row.iter() {
            min = min.min(v);
            max = max.max(v);
        }
        let range = max - min;
        if range > 0.0 {
            row.mapv_inplace(|v| 2.0 * (v - min) / range - 1.0);
        } else {
            row.fill(-1.0);
        }
    }
}
