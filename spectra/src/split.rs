//! Seeded train/validation/test splitting.

use crate::error::SpectraError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Seed used for the archived dataset layout.
pub const SPLIT_SEED: u64 = 83;

/// Validation and test row counts; the remainder is the training set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSizes {
    pub validation: usize,
    pub test: usize,
}

impl SplitSizes {
    /// Sizes used for the full archive (50k validation, 50k test).
    pub fn archive() -> Self {
        Self {
            validation: 50_000,
            test: 50_000,
        }
    }
}

/// Row indices of each subset. Subsets are disjoint and cover all rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
    pub test: Vec<usize>,
}

impl SplitIndices {
    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }
}

/// Permute `0..n` with a seeded generator and cut it into train, validation
/// and test index lists (train first, then validation, then test).
///
/// Fails when the validation and test counts leave no training rows.
pub fn split_indices(
    n: usize,
    sizes: SplitSizes,
    seed: u64,
) -> Result<SplitIndices, SpectraError> {
    let held_out = sizes.validation + sizes.test;
    if held_out >= n {
        return Err(SpectraError::SplitTooLarge {
            requested: held_out,
            available: n,
        });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut rng);

    let n_train = n - held_out;
    let test = order.split_off(n_train + sizes.validation);
    let validation = order.split_off(n_train);
    Ok(SplitIndices {
        train: order,
        validation,
        test,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const SIZES: SplitSizes = SplitSizes {
        validation: 25,
        test: 25,
    };

    #[test]
    fn test_subsets_disjoint_and_exhaustive() {
        let split = split_indices(200, SIZES, SPLIT_SEED).unwrap();
        assert_eq!(split.train.len(), 150);
        assert_eq!(split.validation.len(), 25);
        assert_eq!(split.test.len(), 25);

        let mut seen = HashSet::new();
        for &i in split
            .train
            .iter()
            .chain(&split.validation)
            .chain(&split.test)
        {
            assert!(seen.insert(i), "index {i} assigned twice");
            assert!(i < 200);
        }
        assert_eq!(seen.len(), 200);
    }

    #[test]
    fn test_split_reproducible_for_fixed_seed() {
        let a = split_indices(100, SIZES, 83).unwrap();
        let b = split_indices(100, SIZES, 83).unwrap();
        assert_eq!(a, b);

        let c = split_indices(100, SIZES, 84).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_split_actually_permutes() {
        let split = split_indices(1000, SplitSizes { validation: 0, test: 0 }, 1).unwrap();
        assert_ne!(split.train, (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn test_too_large_split_errors() {
        let err = split_indices(40, SIZES, SPLIT_SEED).unwrap_err();
        assert!(matches!(
            err,
            SpectraError::SplitTooLarge {
                requested: 50,
                available: 40
            }
        ));
    }
}
