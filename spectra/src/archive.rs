//! Per-object archive spectrum files.
//!
//! The archive stores one FITS file per object under
//! `<plate>/spec-<plate>-<mjd>-<fiber>.fits`, with the coadded spectrum in
//! the first table extension (`loglam` and `flux` columns). Ingest reads the
//! rows falling on the common grid range; everything else in those files is
//! ignored.

use crate::error::SpectraError;
use crate::id::SpectrumId;
use fitsio::FitsFile;
use ndarray::Array1;
use std::path::{Path, PathBuf};

/// Path of one object's spectrum file below the archive root.
pub fn object_path(root: &Path, id: SpectrumId) -> PathBuf {
    root.join(format!("{:04}", id.plate)).join(format!(
        "spec-{:04}-{}-{:04}.fits",
        id.plate, id.mjd, id.fiber
    ))
}

/// Read one object's flux restricted to `[lo, hi]` in log10 wavelength.
pub fn read_object_flux(path: &Path, lo: f64, hi: f64) -> Result<Array1<f32>, SpectraError> {
    let mut fptr = FitsFile::open(path)?;
    let hdu = fptr.hdu(1)?;
    let loglam: Vec<f64> = hdu.read_col(&mut fptr, "loglam")?;
    let flux: Vec<f32> = hdu.read_col(&mut fptr, "flux")?;
    let kept: Vec<f32> = loglam
        .iter()
        .zip(flux)
        .filter_map(|(&l, f)| (lo <= l && l <= hi).then_some(f))
        .collect();
    Ok(Array1::from_vec(kept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitsio::tables::{ColumnDataType, ColumnDescription};
    use tempfile::TempDir;

    #[test]
    fn test_object_path_layout() {
        let id = SpectrumId::new(3586, 55181, 10);
        let path = object_path(Path::new("data"), id);
        assert_eq!(
            path,
            Path::new("data").join("3586").join("spec-3586-55181-0010.fits")
        );
    }

    #[test]
    fn test_read_object_flux_masks_to_range() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spec.fits");
        {
            let mut fptr = FitsFile::create(&path).open().unwrap();
            let loglam_col = ColumnDescription::new("loglam")
                .with_type(ColumnDataType::Double)
                .create()
                .unwrap();
            let flux_col = ColumnDescription::new("flux")
                .with_type(ColumnDataType::Float)
                .create()
                .unwrap();
            let hdu = fptr.create_table("COADD", &[loglam_col, flux_col]).unwrap();
            hdu.write_col(&mut fptr, "loglam", &[0.0f64, 0.5, 1.0, 1.5, 2.0])
                .unwrap();
            hdu.write_col(&mut fptr, "flux", &[1.0f32, 2.0, 3.0, 4.0, 5.0])
                .unwrap();
        }

        let flux = read_object_flux(&path, 0.5, 1.5).unwrap();
        assert_eq!(flux.to_vec(), vec![2.0, 3.0, 4.0]);
    }
}
