//! In-memory session dataset.

use crate::error::SpectraError;
use crate::id::SpectrumId;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// A fixed, ordered collection of spectra for one exploration session.
///
/// Row `i` of the feature matrix, target array and (optional) uncertainty
/// array all describe the spectrum `ids[i]`. Shapes are validated at
/// construction; a `Dataset` that exists is consistent.
#[derive(Debug, Clone)]
pub struct Dataset {
    ids: Vec<SpectrumId>,
    x: Array2<f32>,
    z: Array1<f32>,
    z_std: Option<Array1<f32>>,
}

impl Dataset {
    /// Assemble a dataset, checking that every array has one row per id.
    ///
    /// # Errors
    /// `SpectraError::ShapeMismatch` naming the first offending array; no
    /// partial dataset is ever observable.
    pub fn new(
        ids: Vec<SpectrumId>,
        x: Array2<f32>,
        z: Array1<f32>,
        z_std: Option<Array1<f32>>,
    ) -> Result<Self, SpectraError> {
        let n = ids.len();
        if x.nrows() != n {
            return Err(SpectraError::ShapeMismatch {
                field: "features",
                expected: n,
                actual: x.nrows(),
            });
        }
        if z.len() != n {
            return Err(SpectraError::ShapeMismatch {
                field: "targets",
                expected: n,
                actual: z.len(),
            });
        }
        if let Some(z_std) = &z_std {
            if z_std.len() != n {
                return Err(SpectraError::ShapeMismatch {
                    field: "uncertainties",
                    expected: n,
                    actual: z_std.len(),
                });
            }
        }
        Ok(Self { ids, x, z, z_std })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[SpectrumId] {
        &self.ids
    }

    pub fn features(&self) -> ArrayView2<'_, f32> {
        self.x.view()
    }

    /// Feature matrix widened to f64 for the reducers.
    pub fn features_f64(&self) -> Array2<f64> {
        self.x.mapv(f64::from)
    }

    pub fn targets(&self) -> ArrayView1<'_, f32> {
        self.z.view()
    }

    pub fn uncertainties(&self) -> Option<ArrayView1<'_, f32>> {
        self.z_std.as_ref().map(|a| a.view())
    }

    /// Select a subset of rows by index, preserving order.
    ///
    /// Indices must be in range; this is a programmer error, not an input
    /// error, so it panics like any slice index would.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            ids: indices.iter().map(|&i| self.ids[i]).collect(),
            x: self.x.select(Axis(0), indices),
            z: self.z.select(Axis(0), indices),
            z_std: self.z_std.as_ref().map(|a| a.select(Axis(0), indices)),
        }
    }

    /// Keep only the first `n` rows. Handy for sessions on a sample of a
    /// large archive subset.
    pub fn truncate(&mut self, n: usize) {
        if n >= self.len() {
            return;
        }
        self.ids.truncate(n);
        self.x = self.x.slice(ndarray::s![..n, ..]).to_owned();
        self.z = self.z.slice(ndarray::s![..n]).to_owned();
        self.z_std = self
            .z_std
            .as_ref()
            .map(|a| a.slice(ndarray::s![..n]).to_owned());
    }
}
