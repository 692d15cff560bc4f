//! Archive provenance keys for spectra.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one spectrum in the archive by plate, observation MJD and
/// fiber number.
///
/// The triple is the archive's primary key: no two spectra share all three
/// values. Ordering is lexicographic over (plate, mjd, fiber) so sorted id
/// lists group by plate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpectrumId {
    pub plate: i32,
    pub mjd: i32,
    pub fiber: i32,
}

impl SpectrumId {
    pub fn new(plate: i32, mjd: i32, fiber: i32) -> Self {
        Self { plate, mjd, fiber }
    }

    /// Row form used by the container (one `ID` row per spectrum).
    pub fn to_row(self) -> [i32; 3] {
        [self.plate, self.mjd, self.fiber]
    }

    pub fn from_row(row: [i32; 3]) -> Self {
        Self {
            plate: row[0],
            mjd: row[1],
            fiber: row[2],
        }
    }
}

impl fmt::Display for SpectrumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.plate, self.mjd, self.fiber)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let id = SpectrumId::new(7512, 56777, 137);
        assert_eq!(id.to_string(), "7512-56777-137");
    }

    #[test]
    fn test_row_roundtrip() {
        let id = SpectrumId::new(3586, 55181, 10);
        assert_eq!(SpectrumId::from_row(id.to_row()), id);
    }

    #[test]
    fn test_ordering_groups_by_plate() {
        let mut ids = vec![
            SpectrumId::new(4000, 55000, 2),
            SpectrumId::new(3586, 55181, 10),
            SpectrumId::new(4000, 55000, 1),
        ];
        ids.sort();
        assert_eq!(ids[0].plate, 3586);
        assert_eq!(ids[1], SpectrumId::new(4000, 55000, 1));
        assert_eq!(ids[2], SpectrumId::new(4000, 55000, 2));
    }
}
