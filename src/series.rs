#![warn(missing_docs)]
//! PL spectra recorded for a sequence of excitation powers.
use crate::{
    calibration::PowerCalibration,
    error::{PlError, PlResult},
    measurement::{FileNameInfo, Header, MeasurementInfo},
    spectrum::{Auxiliaries, Corrections, DarkSpectrum},
    units::wavelengths_from_ev,
};
use log::{info, warn};
use nalgebra::DMatrix;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use uom::si::f64::Length;

/// Power series as read from a file.
///
/// `x` has the shape (n + 1, m): row 0 holds the m excitation powers, rows 1..=n the energy axis of
/// each spectrum. `y` has the shape (n, m), one spectrum per column.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSeries {
    header: Header,
    x: DMatrix<f64>,
    y: DMatrix<f64>,
}

impl RawSeries {
    /// Creates a new [`RawSeries`].
    ///
    /// # Errors
    ///
    /// This function will return an [`PlError::Configuration`] if the shapes of `x` and `y` do not
    /// match or no spectrum is contained.
    pub fn new(header: Header, x: DMatrix<f64>, y: DMatrix<f64>) -> PlResult<Self> {
        if y.ncols() == 0 || y.nrows() == 0 {
            return Err(PlError::Configuration(
                "power series does not contain any data".into(),
            ));
        }
        if x.shape() != (y.nrows() + 1, y.ncols()) {
            return Err(PlError::Configuration(format!(
                "x of shape {:?} does not match y of shape {:?}",
                x.shape(),
                y.shape()
            )));
        }
        Ok(Self { header, x, y })
    }
    /// Returns a reference to the header of this [`RawSeries`].
    #[must_use]
    pub const fn header(&self) -> &Header {
        &self.header
    }
    /// Returns a reference to the x matrix (power row + energy rows).
    #[must_use]
    pub const fn x(&self) -> &DMatrix<f64> {
        &self.x
    }
    /// Returns a reference to the y matrix (intensities).
    #[must_use]
    pub const fn y(&self) -> &DMatrix<f64> {
        &self.y
    }
    /// The excitation powers (row 0 of x).
    #[must_use]
    pub fn powers(&self) -> Vec<f64> {
        self.x.row(0).iter().copied().collect()
    }
}

/// A power series ordered by decreasing excitation power.
#[derive(Debug, Clone)]
pub struct PowerSeries {
    source: Option<PathBuf>,
    names: FileNameInfo,
    header: Header,
    info: MeasurementInfo,
    x: DMatrix<f64>,
    y: DMatrix<f64>,
    dark: Option<Arc<DarkSpectrum>>,
    calibration: Option<Arc<PowerCalibration>>,
}

impl PowerSeries {
    /// Create a new [`PowerSeries`] from its raw data.
    ///
    /// Spectra are reordered by decreasing power if the source stores them with ascending power.
    #[must_use]
    pub fn new(raw: RawSeries) -> Self {
        let RawSeries { header, mut x, mut y } = raw;
        let m = x.ncols();
        if m > 1 && x[(0, 0)] < x[(0, m - 1)] {
            reverse_columns(&mut x);
            reverse_columns(&mut y);
        }
        let info = MeasurementInfo::from_header(&header);
        Self {
            source: None,
            names: FileNameInfo::default(),
            header,
            info,
            x,
            y,
            dark: None,
            calibration: None,
        }
    }
    /// Create a new [`PowerSeries`] loaded from `source`.
    #[must_use]
    pub fn from_source(source: &Path, raw: RawSeries) -> Self {
        let mut series = Self::new(raw);
        series.source = Some(source.to_path_buf());
        series.names = FileNameInfo::from_path(source);
        series
    }
    /// Attach a dark spectrum which is subtracted from every spectrum of the series.
    ///
    /// # Errors
    ///
    /// This function will return an [`PlError::Configuration`] if the dark spectrum length differs
    /// from the number of energies of the series.
    pub fn with_dark(mut self, dark: Arc<DarkSpectrum>) -> PlResult<Self> {
        if dark.len() != self.nenergies() {
            return Err(PlError::Configuration(format!(
                "dark spectrum has {} points but the series spectra have {}",
                dark.len(),
                self.nenergies()
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
    /// This function will return an error if the dark spectrum does not fit the series.
    pub fn with_auxiliaries(self, auxiliaries: &Auxiliaries) -> PlResult<Self> {
        let mut series = match &auxiliaries.dark {
            Some(dark) => self.with_dark(dark.clone())?,
            None => {
                warn!("power series is not dark corrected");
                self
            }
        };
        match &auxiliaries.calibration {
            Some(c) => series = series.with_calibration(c.clone()),
            None => warn!("power series is not power calibrated"),
        }
        info!(
            "power series with {} spectra of {} points, corrections: {:?}",
            series.npowers(),
            series.nenergies(),
            series.corrections()
        );
        Ok(series)
    }
    /// Returns the file this [`PowerSeries`] was loaded from.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
    /// Returns the identifiers parsed from the file name.
    #[must_use]
    pub const fn names(&self) -> &FileNameInfo {
        &self.names
    }
    /// Returns a reference to the header of this [`PowerSeries`].
    #[must_use]
    pub const fn header(&self) -> &Header {
        &self.header
    }
    /// Decoded header values.
    #[must_use]
    pub const fn info(&self) -> &MeasurementInfo {
        &self.info
    }
    /// Number of spectra (m).
    #[must_use]
    pub fn npowers(&self) -> usize {
        self.y.ncols()
    }
    /// Number of data points per spectrum (n).
    #[must_use]
    pub fn nenergies(&self) -> usize {
        self.y.nrows()
    }
    /// Excitation powers at the beam splitter, decreasing.
    #[must_use]
    pub fn power_bs(&self) -> Vec<f64> {
        self.x.row(0).iter().copied().collect()
    }
    /// Excitation powers at the sample. Requires a power calibration.
    #[must_use]
    pub fn power_sample(&self) -> Option<Vec<f64>> {
        let calibration = self.calibration.as_ref()?;
        Some(
            self.power_bs()
                .iter()
                .map(|p| calibration.sample_power(*p))
                .collect(),
        )
    }
    /// Photon energies of all spectra, shape (n, m).
    #[must_use]
    pub fn energy(&self) -> DMatrix<f64> {
        self.x.rows(1, self.nenergies()).into_owned()
    }
    /// Photon energies of spectrum `column`.
    ///
    /// # Panics
    ///
    /// Panics if `column` is out of range.
    #[must_use]
    pub fn energy_column(&self, column: usize) -> Vec<f64> {
        self.x.column(column).iter().skip(1).copied().collect()
    }
    /// Wavelengths of spectrum `column`.
    ///
    /// # Panics
    ///
    /// Panics if `column` is out of range.
    #[must_use]
    pub fn wavelength_column(&self, column: usize) -> Vec<Length> {
        wavelengths_from_ev(&self.energy_column(column))
    }
    /// Intensities as measured, shape (n, m).
    #[must_use]
    pub const fn intensity_raw(&self) -> &DMatrix<f64> {
        &self.y
    }
    /// Intensities with the dark spectrum subtracted from every column (if available).
    #[must_use]
    pub fn intensity(&self) -> DMatrix<f64> {
        let mut intensity = self.y.clone();
        if let Some(dark) = &self.dark {
            for mut column in intensity.column_iter_mut() {
                for (value, d) in column.iter_mut().zip(dark.intensity()) {
                    *value -= d;
                }
            }
        }
        intensity
    }
    /// Dark corrected intensities of spectrum `column`.
    ///
    /// # Panics
    ///
    /// Panics if `column` is out of range.
    #[must_use]
    pub fn intensity_column(&self, column: usize) -> Vec<f64> {
        let raw = self.y.column(column);
        self.dark.as_ref().map_or_else(
            || raw.iter().copied().collect(),
            |dark| {
                raw.iter()
                    .zip(dark.intensity())
                    .map(|(i, d)| i - d)
                    .collect()
            },
        )
    }
    /// Returns the corrections applied to this [`PowerSeries`].
    #[must_use]
    pub const fn corrections(&self) -> Corrections {
        Corrections {
            dark_subtracted: self.dark.is_some(),
            power_calibrated: self.calibration.is_some(),
        }
    }
}

fn reverse_columns(matrix: &mut DMatrix<f64>) {
    let m = matrix.ncols();
    for j in 0..m / 2 {
        matrix.swap_columns(j, m - 1 - j);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        fitter::CurveFitter,
        loader::{CurveLoader, OriginLoader},
        measurement::{Measurement, RawCurve},
        resolver::AuxFileResolver,
        test_helper::check_warnings,
    };
    use approx::assert_relative_eq;
    use assert_matches::assert_matches;
    use std::fs;
    use tempfile::TempDir;

    fn raw(powers: &[f64]) -> RawSeries {
        let energies = [1.0, 1.1, 1.2];
        let m = powers.len();
        let x = DMatrix::from_fn(4, m, |i, j| if i == 0 { powers[j] } else { energies[i - 1] });
        let y = DMatrix::from_fn(3, m, |i, j| (10 * j + i) as f64);
        RawSeries::new(Header::default(), x, y).unwrap()
    }
    fn curve(y: Vec<f64>) -> Measurement {
        let x = (0..y.len()).map(|i| i as f64).collect();
        Measurement::from_curve(RawCurve::new(Header::default(), x, y).unwrap())
    }
    #[test]
    fn raw_series_shapes() {
        assert_matches!(
            RawSeries::new(Header::default(), DMatrix::zeros(3, 2), DMatrix::zeros(3, 2)),
            Err(PlError::Configuration(_))
        );
        assert_matches!(
            RawSeries::new(Header::default(), DMatrix::zeros(1, 0), DMatrix::zeros(0, 0)),
            Err(PlError::Configuration(_))
        );
        assert!(RawSeries::new(Header::default(), DMatrix::zeros(4, 2), DMatrix::zeros(3, 2)).is_ok());
    }
    #[test]
    fn descending_kept() {
        let s = PowerSeries::new(raw(&[30.0, 20.0, 10.0]));
        assert_eq!(s.power_bs(), vec![30.0, 20.0, 10.0]);
        assert_eq!(s.intensity_raw()[(0, 0)], 0.0);
        assert_eq!(s.npowers(), 3);
        assert_eq!(s.nenergies(), 3);
    }
    #[test]
    fn ascending_reversed() {
        let s = PowerSeries::new(raw(&[10.0, 20.0, 30.0]));
        assert_eq!(s.power_bs(), vec![30.0, 20.0, 10.0]);
        assert_eq!(s.intensity_column(0), vec![20.0, 21.0, 22.0]);
        assert_eq!(s.intensity_column(2), vec![0.0, 1.0, 2.0]);
        assert_eq!(s.energy_column(1), vec![1.0, 1.1, 1.2]);
        assert_eq!(s.energy().shape(), (3, 3));
        assert_eq!(s.wavelength_column(0).len(), 3);
    }
    #[test]
    fn dark_subtraction() {
        let dark = Arc::new(DarkSpectrum::new(curve(vec![1.0, 2.0, 3.0])));
        let s = PowerSeries::new(raw(&[30.0, 20.0]))
            .with_dark(dark)
            .unwrap();
        let intensity = s.intensity();
        assert_eq!(intensity[(0, 0)], -1.0);
        assert_eq!(intensity[(2, 1)], 9.0);
        assert_eq!(s.intensity_column(1), vec![9.0, 9.0, 9.0]);
        assert!(s.corrections().dark_subtracted);
    }
    #[test]
    fn dark_shape_mismatch() {
        let dark = Arc::new(DarkSpectrum::new(curve(vec![1.0, 2.0])));
        assert_matches!(
            PowerSeries::new(raw(&[30.0, 20.0])).with_dark(dark),
            Err(PlError::Configuration(_))
        );
    }
    #[test]
    fn sample_power() {
        let calibration = PowerCalibration::new(
            curve(vec![1.0, 2.0, 4.0]),
            curve(vec![0.1, 0.2, 0.4]),
            &CurveFitter::default(),
        )
        .unwrap();
        let s = PowerSeries::new(raw(&[30.0, 20.0]));
        assert_eq!(s.power_sample(), None);
        let s = s.with_calibration(Arc::new(calibration));
        let power = s.power_sample().unwrap();
        assert_relative_eq!(power[0], 3.0, max_relative = 1.0E-9);
        assert_relative_eq!(power[1], 2.0, max_relative = 1.0E-9);
    }
    #[test]
    fn unresolved_auxiliaries() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("spl1234_NW3_1.3eV_0.2s.origin");
        fs::write(&path, "10.0\t20.0\n1.0\t1.0\t2.0\n1.1\t3.0\t4.0\n").unwrap();
        let resolver = AuxFileResolver::new(root.path(), 8).unwrap();
        testing_logger::setup();
        let auxiliaries =
            Auxiliaries::resolve(&path, &resolver, &OriginLoader, &CurveFitter::default())
                .unwrap();
        assert!(auxiliaries.dark.is_none());
        assert!(auxiliaries.calibration.is_none());
        let series = PowerSeries::from_source(&path, OriginLoader.load_series(&path).unwrap())
            .with_auxiliaries(&auxiliaries)
            .unwrap();
        assert!(series.corrections().is_uncorrected());
        assert_eq!(series.names().nanowire.as_deref(), Some("NW3"));
        assert_eq!(series.source(), Some(path.as_path()));
        check_warnings(vec![
            "no dark spectrum found (1 directories searched)",
            "no power calibration found (1 directories searched)",
            "power series is not dark corrected",
            "power series is not power calibrated",
        ]);
    }
    #[test]
    fn resolved_auxiliaries() {
        let root = TempDir::new().unwrap();
        let series_path = root.path().join("data/spl1234_NW3_1.3eV_0.2s.origin");
        fs::create_dir_all(root.path().join("data")).unwrap();
        fs::write(&series_path, "20.0\t10.0\n1.0\t5.0\t6.0\n1.1\t7.0\t8.0\n").unwrap();
        fs::write(root.path().join("dark_1.3eV_0.2s.origin"), "1.0\t1.0\n1.1\t2.0\n").unwrap();
        fs::write(
            root.path().join("calibration_atbs.origin"),
            "0\t1.0\n10\t2.0\n20\t3.0\n",
        )
        .unwrap();
        fs::write(
            root.path().join("calibration_atsample.origin"),
            "0\t0.5\n10\t1.0\n20\t1.5\n",
        )
        .unwrap();
        let resolver = AuxFileResolver::new(root.path(), 8).unwrap();
        let auxiliaries = Auxiliaries::resolve(
            &series_path,
            &resolver,
            &OriginLoader,
            &CurveFitter::default(),
        )
        .unwrap();
        let series =
            PowerSeries::from_source(&series_path, OriginLoader.load_series(&series_path).unwrap())
                .with_auxiliaries(&auxiliaries)
                .unwrap();
        assert_eq!(
            series.corrections(),
            Corrections {
                dark_subtracted: true,
                power_calibrated: true
            }
        );
        assert_eq!(series.intensity_column(0), vec![4.0, 5.0]);
        assert_relative_eq!(series.power_sample().unwrap()[0], 10.0, max_relative = 1.0E-9);
    }
}
