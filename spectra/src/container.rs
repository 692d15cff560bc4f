//! FITS dataset container.
//!
//! The prepared dataset is a single FITS file with one image HDU per named
//! flat array: `ID` (N x 3 provenance keys), `FLUX` (N x W resampled raw
//! flux), `X` (N x F normalized features), `Z` (N targets) and optionally
//! `Z_STD` (N uncertainties). The train/validation/test subsets are
//! materialized as `ID_TR`/`X_TR`/`Z_TR` and so on, so consumers can load a
//! subset without touching the full arrays. The split seed and subset counts
//! are recorded in the primary header.

use crate::dataset::Dataset;
use crate::error::SpectraError;
use crate::id::SpectrumId;
use crate::split::SplitIndices;
use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::images::{ImageDescription, ImageType};
use fitsio::FitsFile;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use std::path::Path;

pub const HDU_ID: &str = "ID";
pub const HDU_FLUX: &str = "FLUX";
pub const HDU_X: &str = "X";
pub const HDU_Z: &str = "Z";
pub const HDU_Z_STD: &str = "Z_STD";

const KEY_SEED: &str = "SPLSEED";
const KEY_TRAIN: &str = "NTRAIN";
const KEY_VALIDATION: &str = "NVAL";
const KEY_TEST: &str = "NTEST";

/// Split subsets materialized in the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subset {
    Train,
    Validation,
    Test,
}

impl Subset {
    pub const ALL: [Subset; 3] = [Subset::Train, Subset::Validation, Subset::Test];

    pub fn suffix(&self) -> &'static str {
        match self {
            Subset::Train => "TR",
            Subset::Validation => "VA",
            Subset::Test => "TE",
        }
    }

    pub fn hdu_name(&self, base: &str) -> String {
        format!("{base}_{}", self.suffix())
    }

    fn indices<'a>(&self, split: &'a SplitIndices) -> &'a [usize] {
        match self {
            Subset::Train => &split.train,
            Subset::Validation => &split.validation,
            Subset::Test => &split.test,
        }
    }
}

/// Everything the preparation pipeline produces for the archive sample.
#[derive(Debug, Clone)]
pub struct PreparedArrays {
    pub ids: Vec<SpectrumId>,
    pub flux: Array2<f32>,
    pub x: Array2<f32>,
    pub z: Array1<f32>,
    pub z_std: Option<Array1<f32>>,
}

/// Write a prepared dataset and its split subsets to `path`, replacing any
/// existing file.
pub fn write_container(
    path: &Path,
    data: &PreparedArrays,
    split: &SplitIndices,
    seed: u64,
) -> Result<(), SpectraError> {
    let n = data.ids.len();
    check_rows("flux", n, data.flux.nrows())?;
    check_rows("features", n, data.x.nrows())?;
    check_rows("targets", n, data.z.len())?;
    if let Some(z_std) = &data.z_std {
        check_rows("uncertainties", n, z_std.len())?;
    }
    check_rows("split", n, split.total())?;

    let mut fptr = FitsFile::create(path).overwrite().open()?;

    let phdu = fptr.primary_hdu()?;
    phdu.write_key(&mut fptr, KEY_SEED, seed as i64)?;
    phdu.write_key(&mut fptr, KEY_TRAIN, split.train.len() as i64)?;
    phdu.write_key(&mut fptr, KEY_VALIDATION, split.validation.len() as i64)?;
    phdu.write_key(&mut fptr, KEY_TEST, split.test.len() as i64)?;

    write_id_matrix(&mut fptr, HDU_ID, &data.ids)?;
    write_f32_matrix(&mut fptr, HDU_FLUX, data.flux.view())?;
    write_f32_matrix(&mut fptr, HDU_X, data.x.view())?;
    write_f32_vector(&mut fptr, HDU_Z, data.z.view())?;
    if let Some(z_std) = &data.z_std {
        write_f32_vector(&mut fptr, HDU_Z_STD, z_std.view())?;
    }

    for subset in Subset::ALL {
        let idx = subset.indices(split);
        let ids: Vec<SpectrumId> = idx.iter().map(|&i| data.ids[i]).collect();
        write_id_matrix(&mut fptr, &subset.hdu_name(HDU_ID), &ids)?;
        write_f32_matrix(
            &mut fptr,
            &subset.hdu_name(HDU_X),
            data.x.select(Axis(0), idx).view(),
        )?;
        write_f32_vector(
            &mut fptr,
            &subset.hdu_name(HDU_Z),
            data.z.select(Axis(0), idx).view(),
        )?;
    }

    Ok(())
}

/// Load a session [`Dataset`] from a container.
///
/// `None` loads the full sample (with uncertainties when the container has
/// them); `Some(subset)` loads one split subset. Subsets carry no
/// uncertainty column.
pub fn read_subset(path: &Path, subset: Option<Subset>) -> Result<Dataset, SpectraError> {
    let mut fptr = FitsFile::open(path)?;

    let (id_name, x_name, z_name) = match subset {
        None => (HDU_ID.to_string(), HDU_X.to_string(), HDU_Z.to_string()),
        Some(s) => (
            s.hdu_name(HDU_ID),
            s.hdu_name(HDU_X),
            s.hdu_name(HDU_Z),
        ),
    };

    let ids = read_id_matrix(&mut fptr, &id_name)?;
    let x = read_f32_matrix(&mut fptr, &x_name)?;
    let z = read_f32_vector(&mut fptr, &z_name)?;
    let z_std = match subset {
        None if fptr.hdu(HDU_Z_STD).is_ok() => Some(read_f32_vector(&mut fptr, HDU_Z_STD)?),
        _ => None,
    };

    Dataset::new(ids, x, z, z_std)
}

/// Load the identifier and target arrays of a catalog file.
///
/// A catalog is any FITS file carrying `ID` and `Z` extensions in the
/// container layout; the preparation pipeline starts from one.
pub fn read_catalog(path: &Path) -> Result<(Vec<SpectrumId>, Array1<f32>), SpectraError> {
    let mut fptr = FitsFile::open(path)?;
    let ids = read_id_matrix(&mut fptr, HDU_ID)?;
    let z = read_f32_vector(&mut fptr, HDU_Z)?;
    if z.len() != ids.len() {
        return Err(SpectraError::ShapeMismatch {
            field: "targets",
            expected: ids.len(),
            actual: z.len(),
        });
    }
    Ok((ids, z))
}

/// Write a catalog file (`ID` and `Z` extensions only).
pub fn write_catalog(
    path: &Path,
    ids: &[SpectrumId],
    z: ArrayView1<f32>,
) -> Result<(), SpectraError> {
    check_rows("targets", ids.len(), z.len())?;
    let mut fptr = FitsFile::create(path).overwrite().open()?;
    write_id_matrix(&mut fptr, HDU_ID, ids)?;
    write_f32_vector(&mut fptr, HDU_Z, z)?;
    Ok(())
}

/// Split seed recorded when the container was written.
pub fn read_split_seed(path: &Path) -> Result<u64, SpectraError> {
    let mut fptr = FitsFile::open(path)?;
    let phdu = fptr.primary_hdu()?;
    let seed: i64 = phdu.read_key(&mut fptr, KEY_SEED)?;
    Ok(seed as u64)
}

fn check_rows(field: &'static str, expected: usize, actual: usize) -> Result<(), SpectraError> {
    if expected == actual {
        Ok(())
    } else {
        Err(SpectraError::ShapeMismatch {
            field,
            expected,
            actual,
        })
    }
}

fn open_hdu(fptr: &mut FitsFile, name: &str) -> Result<FitsHdu, SpectraError> {
    fptr.hdu(name)
        .map_err(|_| SpectraError::MissingHdu(name.to_string()))
}

fn image_shape(hdu: &FitsHdu, name: &str, ndim: usize) -> Result<Vec<usize>, SpectraError> {
    match &hdu.info {
        HduInfo::ImageInfo { shape, .. } if shape.len() == ndim => Ok(shape.clone()),
        HduInfo::ImageInfo { shape, .. } => Err(SpectraError::HduShape {
            hdu: name.to_string(),
            expected: format!("{ndim}-dimensional image"),
            actual: shape.clone(),
        }),
        _ => Err(SpectraError::HduShape {
            hdu: name.to_string(),
            expected: format!("{ndim}-dimensional image"),
            actual: Vec::new(),
        }),
    }
}

fn write_f32_matrix(
    fptr: &mut FitsFile,
    name: &str,
    data: ArrayView2<f32>,
) -> Result<(), SpectraError> {
    let dims = [data.nrows(), data.ncols()];
    let description = ImageDescription {
        data_type: ImageType::Float,
        dimensions: &dims,
    };
    let hdu = fptr.create_image(name, &description)?;
    let flat: Vec<f32> = data.iter().copied().collect();
    hdu.write_image(fptr, &flat)?;
    Ok(())
}

fn read_f32_matrix(fptr: &mut FitsFile, name: &str) -> Result<Array2<f32>, SpectraError> {
    let hdu = open_hdu(fptr, name)?;
    let shape = image_shape(&hdu, name, 2)?;
    let data: Vec<f32> = hdu.read_image(fptr)?;
    Array2::from_shape_vec((shape[0], shape[1]), data).map_err(|_| SpectraError::HduShape {
        hdu: name.to_string(),
        expected: "data matching the declared shape".to_string(),
        actual: shape,
    })
}

fn write_f32_vector(
    fptr: &mut FitsFile,
    name: &str,
    data: ArrayView1<f32>,
) -> Result<(), SpectraError> {
    let dims = [data.len()];
    let description = ImageDescription {
        data_type: ImageType::Float,
        dimensions: &dims,
    };
    let hdu = fptr.create_image(name, &description)?;
    let flat: Vec<f32> = data.iter().copied().collect();
    hdu.write_image(fptr, &flat)?;
    Ok(())
}

fn read_f32_vector(fptr: &mut FitsFile, name: &str) -> Result<Array1<f32>, SpectraError> {
    let hdu = open_hdu(fptr, name)?;
    image_shape(&hdu, name, 1)?;
    let data: Vec<f32> = hdu.read_image(fptr)?;
    Ok(Array1::from_vec(data))
}

fn write_id_matrix(
    fptr: &mut FitsFile,
    name: &str,
    ids: &[SpectrumId],
) -> Result<(), SpectraError> {
    let dims = [ids.len(), 3];
    let description = ImageDescription {
        data_type: ImageType::Long,
        dimensions: &dims,
    };
    let hdu = fptr.create_image(name, &description)?;
    let flat: Vec<i32> = ids.iter().flat_map(|id| id.to_row()).collect();
    hdu.write_image(fptr, &flat)?;
    Ok(())
}

fn read_id_matrix(fptr: &mut FitsFile, name: &str) -> Result<Vec<SpectrumId>, SpectraError> {
    let hdu = open_hdu(fptr, name)?;
    let shape = image_shape(&hdu, name, 2)?;
    if shape[1] != 3 {
        return Err(SpectraError::HduShape {
            hdu: name.to_string(),
            expected: "N x 3 identifier rows".to_string(),
            actual: shape,
        });
    }
    let data: Vec<i32> = hdu.read_image(fptr)?;
    Ok(data
        .chunks_exact(3)
        .map(|row| SpectrumId::from_row([row[0], row[1], row[2]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::{split_indices, SplitSizes};
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use tempfile::TempDir;

    fn sample_arrays(n: usize) -> PreparedArrays {
        let ids = (0..n)
            .map(|i| SpectrumId::new(4000 + i as i32, 55_123, i as i32 + 1))
            .collect();
        let flux = Array2::from_shape_fn((n, 6), |(r, c)| (r * 10 + c) as f32);
        let x = Array2::from_shape_fn((n, 4), |(r, c)| r as f32 - c as f32 / 10.0);
        let z = Array1::from_shape_fn(n, |i| 0.1 * i as f32);
        let z_std = Some(Array1::from_elem(n, 0.02f32));
        PreparedArrays {
            ids,
            flux,
            x,
            z,
            z_std,
        }
    }

    #[test]
    fn test_container_roundtrip_full() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dataset.fits");
        let data = sample_arrays(8);
        let split = split_indices(
            8,
            SplitSizes {
                validation: 2,
                test: 2,
            },
            83,
        )
        .unwrap();

        write_container(&path, &data, &split, 83).unwrap();
        let ds = read_subset(&path, None).unwrap();

        assert_eq!(ds.len(), 8);
        assert_eq!(ds.ids(), &data.ids[..]);
        assert_relative_eq!(ds.features()[[3, 2]], data.x[[3, 2]]);
        assert_relative_eq!(ds.targets()[5], 0.5);
        assert_relative_eq!(ds.uncertainties().unwrap()[0], 0.02);
        assert_eq!(read_split_seed(&path).unwrap(), 83);
    }

    #[test]
    fn test_roundtrip_is_exact_for_arbitrary_values() {
        // Cell-by-cell equality on random data, not spot checks on a
        // patterned fixture.
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dataset.fits");

        let n = 12;
        let ids: Vec<SpectrumId> = (0..n)
            .map(|i| {
                SpectrumId::new(
                    rng.gen_range(266..12_547),
                    rng.gen_range(51_608..58_932),
                    i as i32 + 1,
                )
            })
            .collect();
        let flux = Array2::from_shape_fn((n, 7), |_| rng.gen_range(-50.0f32..50.0));
        let x = Array2::from_shape_fn((n, 5), |_| rng.gen_range(-1.0f32..1.0));
        let z = Array1::from_shape_fn(n, |_| rng.gen_range(0.0f32..5.0));
        let data = PreparedArrays {
            ids,
            flux,
            x,
            z,
            z_std: None,
        };
        let split = split_indices(
            n,
            SplitSizes {
                validation: 3,
                test: 3,
            },
            83,
        )
        .unwrap();

        write_container(&path, &data, &split, 83).unwrap();
        let ds = read_subset(&path, None).unwrap();

        assert_eq!(ds.ids(), &data.ids[..]);
        assert_eq!(ds.features(), data.x);
        assert_eq!(ds.targets(), data.z);
    }

    #[test]
    fn test_subset_rows_follow_split() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dataset.fits");
        let data = sample_arrays(10);
        let split = split_indices(
            10,
            SplitSizes {
                validation: 3,
                test: 2,
            },
            7,
        )
        .unwrap();

        write_container(&path, &data, &split, 7).unwrap();

        let va = read_subset(&path, Some(Subset::Validation)).unwrap();
        assert_eq!(va.len(), 3);
        for (row, &src) in split.validation.iter().enumerate() {
            assert_eq!(va.ids()[row], data.ids[src]);
            assert_relative_eq!(va.targets()[row], data.z[src]);
            assert_relative_eq!(va.features()[[row, 1]], data.x[[src, 1]]);
        }
        // Subsets never carry the uncertainty column.
        assert!(va.uncertainties().is_none());
    }

    #[test]
    fn test_container_without_uncertainty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dataset.fits");
        let mut data = sample_arrays(6);
        data.z_std = None;
        let split = split_indices(
            6,
            SplitSizes {
                validation: 1,
                test: 1,
            },
            83,
        )
        .unwrap();

        write_container(&path, &data, &split, 83).unwrap();
        let ds = read_subset(&path, None).unwrap();
        assert!(ds.uncertainties().is_none());
    }

    #[test]
    fn test_missing_hdu_is_reported_by_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.fits");
        FitsFile::create(&path).open().unwrap();

        let err = read_subset(&path, None).unwrap_err();
        match err {
            SpectraError::MissingHdu(name) => assert_eq!(name, "ID"),
            other => panic!("expected MissingHdu, got {other:?}"),
        }
    }

    #[test]
    fn test_catalog_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.fits");
        let data = sample_arrays(4);

        write_catalog(&path, &data.ids, data.z.view()).unwrap();
        let (ids, z) = read_catalog(&path).unwrap();

        assert_eq!(ids, data.ids);
        assert_relative_eq!(z[3], 0.3, epsilon = 1e-6);
    }

    #[test]
    fn test_write_rejects_inconsistent_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dataset.fits");
        let mut data = sample_arrays(6);
        data.z = Array1::zeros(5);
        let split = split_indices(
            6,
            SplitSizes {
                validation: 1,
                test: 1,
            },
            83,
        )
        .unwrap();

        let err = write_container(&path, &data, &split, 83).unwrap_err();
        assert!(matches!(
            err,
            SpectraError::ShapeMismatch {
                field: "targets",
                expected: 6,
                actual: 5
            }
        ));
    }
}
