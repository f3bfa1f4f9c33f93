//! Unit conversions and small numerical helpers shared by the data model and the fit pipeline.
use uom::si::{
    energy::{electronvolt, joule},
    f64::{Energy, Length},
    length::meter,
};

/// Planck constant in J s.
const PLANCK: f64 = 6.626_070_15e-34;
/// Speed of light in vacuum in m/s.
const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Ratio between the full width at half maximum and the standard deviation of a Gaussian.
///
/// `FWHM = 2 sqrt(2 ln 2) sigma ≈ 2.3548 sigma`
#[must_use]
pub fn fwhm_factor() -> f64 {
    2.0 * (2.0 * std::f64::consts::LN_2).sqrt()
}

/// Full width at half maximum of a Gaussian with the given `sigma`.
#[must_use]
pub fn fwhm_from_sigma(sigma: f64) -> f64 {
    fwhm_factor() * sigma
}

/// Standard deviation of a Gaussian with the given full width at half maximum.
#[must_use]
pub fn sigma_from_fwhm(fwhm: f64) -> f64 {
    fwhm / fwhm_factor()
}

/// Convert a photon energy into its vacuum wavelength (`λ = h c / E`).
///
/// The relation is its own inverse, see [`energy_from_wavelength`].
#[must_use]
pub fn wavelength_from_energy(energy: Energy) -> Length {
    Length::new::<meter>(PLANCK * SPEED_OF_LIGHT / energy.get::<joule>())
}

/// Convert a vacuum wavelength into the corresponding photon energy.
#[must_use]
pub fn energy_from_wavelength(wavelength: Length) -> Energy {
    Energy::new::<joule>(PLANCK * SPEED_OF_LIGHT / wavelength.get::<meter>())
}

/// Convert a slice of photon energies given in eV into wavelengths.
#[must_use]
pub fn wavelengths_from_ev(energies: &[f64]) -> Vec<Length> {
    energies
        .iter()
        .map(|e| wavelength_from_energy(Energy::new::<electronvolt>(*e)))
        .collect()
}

/// Returns the index of the element of `values` closest to `value`.
///
/// Returns `None` for an empty slice. NaN entries are never selected.
#[must_use]
pub fn find_closest_index(values: &[f64], value: f64) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .min_by(|a, b| (a.1 - value).abs().total_cmp(&(b.1 - value).abs()))
        .map(|(i, _)| i)
}

#[must_use]
pub const fn usize_to_f64(value: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let newval = value as f64;
    newval
}
