//! Conversion of beam splitter power readings into power delivered at the sample.
use crate::{
    error::{PlError, PlResult},
    fitter::{CurveFitter, FitRequest},
    lineshape::LineShape,
    measurement::Measurement,
};
use log::info;

/// Ratio between the power at the sample and the power at the beam splitter.
///
/// Both measurements record power vs. half-wave plate position for the same plate settings. The
/// ratio is the slope of a straight line through the origin fitted to sample power vs. beam
/// splitter power.
#[derive(Debug, Clone)]
pub struct PowerCalibration {
    beamsplitter: Measurement,
    sample: Measurement,
    ratio: f64,
    ratio_error: f64,
}

impl PowerCalibration {
    /// Create a new [`PowerCalibration`] from the beam splitter and the sample side measurement.
    ///
    /// # Errors
    ///
    /// This function will return an error if
    ///   - the measurements differ in length ([`PlError::Configuration`]).
    ///   - the proportional fit fails.
    pub fn new(
        beamsplitter: Measurement,
        sample: Measurement,
        fitter: &CurveFitter,
    ) -> PlResult<Self> {
        let (ratio, ratio_error) = calibrate(beamsplitter.y(), sample.y(), fitter)?;
        info!("power calibration ratio: {ratio:.5} ± {ratio_error:.5}");
        Ok(Self {
            beamsplitter,
            sample,
            ratio,
            ratio_error,
        })
    }
    /// Returns the ratio of this [`PowerCalibration`].
    #[must_use]
    pub const fn ratio(&self) -> f64 {
        self.ratio
    }
    /// Returns the one standard deviation error of the ratio.
    #[must_use]
    pub const fn ratio_error(&self) -> f64 {
        self.ratio_error
    }
    /// Returns a reference to the beam splitter side measurement.
    #[must_use]
    pub const fn beamsplitter(&self) -> &Measurement {
        &self.beamsplitter
    }
    /// Returns a reference to the sample side measurement.
    #[must_use]
    pub const fn sample(&self) -> &Measurement {
        &self.sample
    }
    /// Convert a beam splitter power into the power at the sample.
    #[must_use]
    pub fn sample_power(&self, beamsplitter_power: f64) -> f64 {
        beamsplitter_power * self.ratio
    }
}

/// Fit `sample_power = ratio × beamsplitter_power` and return the ratio and its error.
///
/// # Errors
///
/// This function will return an error if
///   - the inputs differ in length or are empty ([`PlError::Configuration`]).
///   - the slope cannot be estimated or fitted (e.g. all beam splitter powers are zero).
pub fn calibrate(
    beamsplitter_power: &[f64],
    sample_power: &[f64],
    fitter: &CurveFitter,
) -> PlResult<(f64, f64)> {
    if beamsplitter_power.len() != sample_power.len() {
        return Err(PlError::Configuration(format!(
            "beam splitter ({}) and sample ({}) calibration data differ in length",
            beamsplitter_power.len(),
            sample_power.len()
        )));
    }
    let request = FitRequest::new(LineShape::Proportional, beamsplitter_power, sample_power)?;
    let result = fitter.fit(&request)?;
    Ok((result.params()[0], result.errors()[0]))
}
