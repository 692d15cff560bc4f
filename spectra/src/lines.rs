//! Prominent quasar emission lines.
//!
//! Rest-frame wavelengths in Angstrom for the lines a redshift estimate is
//! usually judged against in this wavelength range.

/// Two-sided 95% normal quantile used for uncertainty intervals.
const CI_SIGMA: f64 = 1.96;

/// One emission line, identified by rest-frame wavelength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissionLine {
    pub name: &'static str,
    /// Rest-frame wavelength, Angstrom.
    pub rest: f64,
}

pub const LYALPHA: EmissionLine = EmissionLine {
    name: "Ly-alpha",
    rest: 1216.0,
};
pub const CIV: EmissionLine = EmissionLine {
    name: "C IV",
    rest: 1549.0,
};
pub const CIII: EmissionLine = EmissionLine {
    name: "C III]",
    rest: 1909.0,
};
pub const MGII: EmissionLine = EmissionLine {
    name: "Mg II",
    rest: 2796.0,
};
pub const HBETA: EmissionLine = EmissionLine {
    name: "H-beta",
    rest: 4862.0,
};
pub const HALPHA: EmissionLine = EmissionLine {
    name: "H-alpha",
    rest: 6563.0,
};

/// All lines, ordered by rest wavelength.
pub const LINES: [EmissionLine; 6] = [LYALPHA, CIV, CIII, MGII, HBETA, HALPHA];

impl EmissionLine {
    /// Observed wavelength at redshift `z`.
    pub fn shifted(&self, z: f64) -> f64 {
        (1.0 + z) * self.rest
    }

    /// Observed-wavelength interval covering `z ± 1.96 z_std`.
    pub fn confidence_interval(&self, z: f64, z_std: f64) -> (f64, f64) {
        (
            (1.0 + (z - CI_SIGMA * z_std)) * self.rest,
            (1.0 + (z + CI_SIGMA * z_std)) * self.rest,
        )
    }
}
