#![warn(missing_docs)]
//! Single PL spectra, dark spectra and the auxiliary measurements used to correct them.
use crate::{
    calibration::PowerCalibration,
    error::{PlError, PlResult},
    fitter::CurveFitter,
    loader::CurveLoader,
    measurement::{FileNameInfo, Measurement, MeasurementInfo},
    resolver::{AuxFileResolver, Search},
    units::wavelengths_from_ev,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc};
use uom::si::f64::Length;

/// Detector signal recorded without excitation.
#[derive(Debug, Clone)]
pub struct DarkSpectrum {
    measurement: Measurement,
}

impl DarkSpectrum {
    /// Creates a new [`DarkSpectrum`].
    #[must_use]
    pub const fn new(measurement: Measurement) -> Self {
        Self { measurement }
    }
    /// Photon energies in eV.
    #[must_use]
    pub fn energy(&self) -> &[f64] {
        self.measurement.x()
    }
    /// Dark counts.
    #[must_use]
    pub fn intensity(&self) -> &[f64] {
        self.measurement.y()
    }
    /// Number of data points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.measurement.len()
    }
    /// Returns `true` if the dark spectrum holds no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.measurement.is_empty()
    }
    /// Returns a reference to the underlying [`Measurement`].
    #[must_use]
    pub const fn measurement(&self) -> &Measurement {
        &self.measurement
    }
}

/// Corrections which have been applied to a spectrum or power series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corrections {
    /// the dark spectrum was subtracted from the raw intensities
    pub dark_subtracted: bool,
    /// sample powers are available through a power calibration
    pub power_calibrated: bool,
}

impl Corrections {
    /// Returns `true` if no correction has been applied.
    #[must_use]
    pub const fn is_uncorrected(&self) -> bool {
        !self.dark_subtracted && !self.power_calibrated
    }
}

/// Dark spectrum and power calibration belonging to a measurement.
///
/// Both are optional. They are loaded once and shared between all spectra of a series.
#[derive(Debug, Clone, Default)]
pub struct Auxiliaries {
    /// dark spectrum to be subtracted
    pub dark: Option<Arc<DarkSpectrum>>,
    /// power calibration
    pub calibration: Option<Arc<PowerCalibration>>,
}

impl Auxiliaries {
    /// Search and load the dark spectrum and power calibration of the measurement stored at `source`.
    ///
    /// Auxiliary files which cannot be found or loaded are reported as a warning and left out.
    ///
    /// # Errors
    ///
    /// This function will return an error if the directory of `source` cannot be read. A directory
    /// outside of the resolver's root boundary is not searched and leaves both auxiliaries out.
    pub fn resolve(
        source: &Path,
        resolver: &AuxFileResolver,
        loader: &dyn CurveLoader,
        fitter: &CurveFitter,
    ) -> PlResult<Self> {
        let directory = source
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let names = FileNameInfo::from_path(source);
        Ok(Self {
            dark: load_dark(directory, &names, resolver, loader)?,
            calibration: load_calibration(directory, resolver, loader, fitter)?,
        })
    }
}

fn load_dark(
    directory: &Path,
    names: &FileNameInfo,
    resolver: &AuxFileResolver,
    loader: &dyn CurveLoader,
) -> PlResult<Option<Arc<DarkSpectrum>>> {
    let Some((integration_time, center_energy)) = names.dark_tokens() else {
        warn!("cannot search dark spectrum without integration time and center energy");
        return Ok(None);
    };
    match resolver.find_dark(directory, integration_time, center_energy)? {
        Search::Found(path) => match loader.load_measurement(&path) {
            Ok(m) => {
                info!("using dark spectrum {}", path.display());
                Ok(Some(Arc::new(DarkSpectrum::new(m))))
            }
            Err(e) => {
                warn!("cannot load dark spectrum {}: {e}", path.display());
                Ok(None)
            }
        },
        Search::NotFound {
            directories_visited,
        } => {
            warn!("no dark spectrum found ({directories_visited} directories searched)");
            Ok(None)
        }
    }
}

fn load_calibration(
    directory: &Path,
    resolver: &AuxFileResolver,
    loader: &dyn CurveLoader,
    fitter: &CurveFitter,
) -> PlResult<Option<Arc<PowerCalibration>>> {
    match resolver.find_power_calibration(directory)? {
        Search::Found(files) => {
            let calibration = loader
                .load_measurement(&files.beamsplitter)
                .and_then(|bs| {
                    let sample = loader.load_measurement(&files.sample)?;
                    PowerCalibration::new(bs, sample, fitter)
                });
            match calibration {
                Ok(c) => {
                    info!("using power calibration {}", files.beamsplitter.display());
                    Ok(Some(Arc::new(c)))
                }
                Err(e) => {
                    warn!("cannot use power calibration: {e}");
                    Ok(None)
                }
            }
        }
        Search::NotFound {
            directories_visited,
        } => {
            warn!("no power calibration found ({directories_visited} directories searched)");
            Ok(None)
        }
    }
}

/// A single PL spectrum.
#[derive(Debug, Clone)]
pub struct Spectrum {
    measurement: Measurement,
    info: MeasurementInfo,
    dark: Option<Arc<DarkSpectrum>>,
    calibration: Option<Arc<PowerCalibration>>,
}

impl Spectrum {
    /// Creates a new uncorrected [`Spectrum`].
    #[must_use]
    pub fn new(measurement: Measurement) -> Self {
        let info = measurement.info();
        Self {
            measurement,
            info,
            dark: None,
            calibration: None,
        }
    }
    /// Attach a dark spectrum which is subtracted from the raw intensity.
    ///
    /// # Errors
    ///
    /// This function will return an [`PlError::Configuration`] if the dark spectrum has a different
    /// number of data points.
    pub fn with_dark(mut self, dark: Arc<DarkSpectrum>) -> PlResult<Self> {
        if dark.len() != self.measurement.len() {
            return Err(PlError::Configuration(format!(
                "dark spectrum has {} points but spectrum has {}",
                dark.len(),
                self.measurement.len()
            )));
        }
        self.dark = Some(dark);
        Ok(self)
    }
    /// Attach a power calibration.
    #[must_use]
    pub fn with_calibration(mut self, calibration: Arc<PowerCalibration>) -> Self {
        self.calibration = Some(calibration);
        self
    }
    /// Attach all available auxiliaries. Missing ones are reported as a warning.
    ///
    /// # Errors
    ///
    /// This function will return an error if the dark spectrum does not fit the spectrum.
    pub fn with_auxiliaries(self, auxiliaries: &Auxiliaries) -> PlResult<Self> {
        let mut spectrum = match &auxiliaries.dark {
            Some(dark) => self.with_dark(dark.clone())?,
            None => {
                warn!("spectrum is not dark corrected");
                self
            }
        };
        match &auxiliaries.calibration {
            Some(c) => spectrum = spectrum.with_calibration(c.clone()),
            None => warn!("spectrum power is not calibrated"),
        }
        Ok(spectrum)
    }
    /// Returns a reference to the underlying [`Measurement`].
    #[must_use]
    pub const fn measurement(&self) -> &Measurement {
        &self.measurement
    }
    /// Decoded header values.
    #[must_use]
    pub const fn info(&self) -> &MeasurementInfo {
        &self.info
    }
    /// Photon energies in eV.
    #[must_use]
    pub fn energy(&self) -> &[f64] {
        self.measurement.x()
    }
    /// Vacuum wavelengths corresponding to the photon energies.
    #[must_use]
    pub fn wavelength(&self) -> Vec<Length> {
        wavelengths_from_ev(self.energy())
    }
    /// Intensity as measured.
    #[must_use]
    pub fn intensity_raw(&self) -> &[f64] {
        self.measurement.y()
    }
    /// Intensity with the dark spectrum subtracted (if available).
    #[must_use]
    pub fn intensity(&self) -> Vec<f64> {
        self.dark.as_ref().map_or_else(
            || self.intensity_raw().to_vec(),
            |dark| {
                self.intensity_raw()
                    .iter()
                    .zip(dark.intensity())
                    .map(|(i, d)| i - d)
                    .collect()
            },
        )
    }
    /// Excitation power at the beam splitter.
    #[must_use]
    pub const fn power_bs(&self) -> Option<f64> {
        self.info.excitation_power
    }
    /// Excitation power at the sample. Requires a power calibration.
    #[must_use]
    pub fn power_sample(&self) -> Option<f64> {
        Some(self.calibration.as_ref()?.sample_power(self.power_bs()?))
    }
    /// Returns the corrections applied to this [`Spectrum`].
    #[must_use]
    pub const fn corrections(&self) -> Corrections {
        Corrections {
            dark_subtracted: self.dark.is_some(),
            power_calibrated: self.calibration.is_some(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        loader::OriginLoader,
        measurement::{Header, RawCurve},
        test_helper::check_warnings,
    };
    use approx::assert_relative_eq;
    use assert_matches::assert_matches;
    use std::fs;
    use tempfile::TempDir;
    use uom::si::length::nanometer;

    fn measurement(y: Vec<f64>) -> Measurement {
        let mut header = Header::default();
        header.insert("Excitation power", "10 uW");
        let x = (0..y.len()).map(|i| 1.0 + 0.1 * i as f64).collect();
        Measurement::from_curve(RawCurve::new(header, x, y).unwrap())
    }
    fn calibration() -> Arc<PowerCalibration> {
        let bs = measurement(vec![1.0, 2.0, 3.0]);
        let sample = measurement(vec![0.2, 0.4, 0.6]);
        Arc::new(PowerCalibration::new(bs, sample, &CurveFitter::default()).unwrap())
    }
    #[test]
    fn uncorrected() {
        let s = Spectrum::new(measurement(vec![5.0, 6.0, 7.0]));
        assert!(s.corrections().is_uncorrected());
        assert_eq!(s.intensity(), vec![5.0, 6.0, 7.0]);
        assert_eq!(s.power_bs(), Some(10.0));
        assert_eq!(s.power_sample(), None);
        assert_eq!(s.energy().len(), 3);
        assert_relative_eq!(
            s.wavelength()[0].get::<nanometer>(),
            1239.841_98,
            epsilon = 1.0E-4
        );
    }
    #[test]
    fn dark_subtraction() {
        let dark = Arc::new(DarkSpectrum::new(measurement(vec![1.0, 1.0, 2.0])));
        let s = Spectrum::new(measurement(vec![5.0, 6.0, 7.0]))
            .with_dark(dark)
            .unwrap();
        assert_eq!(s.intensity(), vec![4.0, 5.0, 5.0]);
        assert_eq!(s.intensity_raw(), &[5.0, 6.0, 7.0]);
        assert!(s.corrections().dark_subtracted);
        assert!(!s.corrections().power_calibrated);
    }
    #[test]
    fn dark_shape_mismatch() {
        let dark = Arc::new(DarkSpectrum::new(measurement(vec![1.0, 1.0])));
        assert_matches!(
            Spectrum::new(measurement(vec![5.0, 6.0, 7.0])).with_dark(dark),
            Err(PlError::Configuration(_))
        );
    }
    #[test]
    fn calibrated_power() {
        let s = Spectrum::new(measurement(vec![5.0, 6.0, 7.0])).with_calibration(calibration());
        assert_relative_eq!(s.power_sample().unwrap(), 2.0, max_relative = 1.0E-9);
        assert!(s.corrections().power_calibrated);
    }
    #[test]
    fn with_auxiliaries() {
        testing_logger::setup();
        let s = Spectrum::new(measurement(vec![5.0, 6.0, 7.0]))
            .with_auxiliaries(&Auxiliaries::default())
            .unwrap();
        assert!(s.corrections().is_uncorrected());
        check_warnings(vec![
            "spectrum is not dark corrected",
            "spectrum power is not calibrated",
        ]);
        let auxiliaries = Auxiliaries {
            dark: Some(Arc::new(DarkSpectrum::new(measurement(vec![1.0, 1.0, 1.0])))),
            calibration: Some(calibration()),
        };
        let s = Spectrum::new(measurement(vec![5.0, 6.0, 7.0]))
            .with_auxiliaries(&auxiliaries)
            .unwrap();
        assert_eq!(
            s.corrections(),
            Corrections {
                dark_subtracted: true,
                power_calibrated: true
            }
        );
    }
    #[test]
    fn dark_spectrum() {
        let d = DarkSpectrum::new(measurement(vec![1.0, 2.0]));
        assert_eq!(d.len(), 2);
        assert!(!d.is_empty());
        assert_eq!(d.intensity(), &[1.0, 2.0]);
        assert_eq!(d.energy(), &[1.0, 1.1]);
        assert!(d.measurement().source().is_none());
    }
    #[test]
    fn resolve_outside_boundary() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("root")).unwrap();
        fs::create_dir_all(tmp.path().join("other")).unwrap();
        fs::write(tmp.path().join("root/dark_1.3eV_0.2s.origin"), "1.0\t1.0\n").unwrap();
        let source = tmp.path().join("other/spl1234_1.3eV_0.2s.origin");
        fs::write(&source, "1.0\t5.0\n").unwrap();
        let resolver = AuxFileResolver::new(&tmp.path().join("root"), 8).unwrap();
        testing_logger::setup();
        let auxiliaries =
            Auxiliaries::resolve(&source, &resolver, &OriginLoader, &CurveFitter::default())
                .unwrap();
        assert!(auxiliaries.dark.is_none());
        assert!(auxiliaries.calibration.is_none());
        let outside = format!(
            "{} is outside of the root boundary {}, auxiliary files are not searched",
            fs::canonicalize(tmp.path().join("other")).unwrap().display(),
            resolver.root_boundary().display()
        );
        check_warnings(vec![
            outside.as_str(),
            "no dark spectrum found (0 directories searched)",
            outside.as_str(),
            "no power calibration found (0 directories searched)",
        ]);
    }
}
