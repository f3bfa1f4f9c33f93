#![warn(missing_docs)]
//! Tracking of spectral peaks through a power series.
//!
//! Every peak is seeded once at a reference power level with a position and a fit window. At each
//! power level the peak is fitted inside the current window and the window for the next level is
//! derived from the fit: `[position - c sigma, position + c sigma]`. Starting at the reference
//! level, the series is processed towards the last column and, if the reference level is not the
//! first column, towards the first column as well.
//!
//! A failed fit is retried once in a widened window. If this also fails, the level is left empty,
//! the failure is recorded and the last successful window is used for the next level.
use crate::{
    error::{PlError, PlResult},
    fitter::{CurveFitter, FitRequest, FitWindow},
    lineshape::LineShape,
    series::PowerSeries,
    spectrum::Corrections,
};
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{
    f64::consts::PI,
    fmt::Write as _,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

/// Start position and fit window of a peak at the reference power level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakSeed {
    position: f64,
    lower: f64,
    upper: f64,
}

impl PeakSeed {
    /// Seed at `position` with the window `[position - half_span, position + half_span]`.
    ///
    /// # Errors
    ///
    /// This function will return an [`PlError::Configuration`] if `position` is not finite or
    /// `half_span` is not positive.
    pub fn new(position: f64, half_span: f64) -> PlResult<Self> {
        if !half_span.is_finite() || half_span <= 0.0 {
            return Err(PlError::Configuration(format!(
                "half span of a peak window must be positive but is {half_span}"
            )));
        }
        Self::with_window(position, position - half_span, position + half_span)
    }
    /// Seed at `position` with the explicit window `[lower, upper]`.
    ///
    /// # Errors
    ///
    /// This function will return an [`PlError::Configuration`] if any value is not finite or
    /// `lower > upper`.
    pub fn with_window(position: f64, lower: f64, upper: f64) -> PlResult<Self> {
        if !position.is_finite() || !lower.is_finite() || !upper.is_finite() {
            return Err(PlError::Configuration(
                "peak seed values must be finite".into(),
            ));
        }
        if lower > upper {
            return Err(PlError::Configuration(format!(
                "peak window lower bound {lower} is above upper bound {upper}"
            )));
        }
        Ok(Self {
            position,
            lower,
            upper,
        })
    }
    /// Returns the position of this [`PeakSeed`].
    #[must_use]
    pub const fn position(&self) -> f64 {
        self.position
    }
    /// Returns the window bounds of this [`PeakSeed`].
    #[must_use]
    pub const fn window(&self) -> (f64, f64) {
        (self.lower, self.upper)
    }
}

/// Parameters of the peak tracking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// lineshape fitted to each peak
    pub lineshape: LineShape,
    /// half width of the propagated window in units of the fitted sigma
    pub window_multiplier: f64,
    /// half width of the window around a seeded position if no window was selected
    pub default_half_span: f64,
    /// factor by which a window is widened for the retry of a failed fit
    pub retry_widen_factor: f64,
    /// power level (column) at which the peaks are seeded
    pub reference_index: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            lineshape: LineShape::GaussianConstBg,
            window_multiplier: 2.5,
            default_half_span: 0.05,
            retry_widen_factor: 1.5,
            reference_index: 0,
        }
    }
}

impl TrackingConfig {
    /// Check the parameters for consistency.
    ///
    /// # Errors
    ///
    /// This function will return an [`PlError::Configuration`] if
    ///   - the lineshape does not describe a peak.
    ///   - the window multiplier or default half span is not positive.
    ///   - the retry widening factor is not larger than 1.
    pub fn validate(&self) -> PlResult<()> {
        if !self.lineshape.is_peak() {
            return Err(PlError::Configuration(format!(
                "lineshape {} cannot be used for peak tracking",
                self.lineshape
            )));
        }
        if !(self.window_multiplier.is_finite() && self.window_multiplier > 0.0) {
            return Err(PlError::Configuration(
                "window multiplier must be positive".into(),
            ));
        }
        if !(self.default_half_span.is_finite() && self.default_half_span > 0.0) {
            return Err(PlError::Configuration(
                "default half span must be positive".into(),
            ));
        }
        if !(self.retry_widen_factor.is_finite() && self.retry_widen_factor > 1.0) {
            return Err(PlError::Configuration(
                "retry widening factor must be larger than 1".into(),
            ));
        }
        Ok(())
    }
}

/// Fit result of one peak at one power level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakTrack {
    /// fitted peak position
    pub position: f64,
    /// one standard deviation error of the position
    pub position_error: f64,
    /// peak height above background
    pub amplitude: f64,
    /// integrated peak area `a sigma sqrt(2 pi)`
    pub area: f64,
    /// full width at half maximum
    pub fwhm: f64,
    /// one standard deviation error of the FWHM
    pub fwhm_error: f64,
    /// standard deviation of the Gaussian
    pub sigma: f64,
    /// index window used for the fit
    pub fit_window: FitWindow,
    /// physical bounds of the fit window
    pub window_bounds: (f64, f64),
    /// reduced chi-square of the fit
    pub reduced_chi_square: f64,
}

/// A (power level, peak) pair that could not be fitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitFailure {
    /// power level (column index)
    pub power_index: usize,
    /// peak index
    pub peak_index: usize,
    /// error of the final attempt
    pub reason: String,
}

/// Outcome of a tracking run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingReport {
    power_bs: Vec<f64>,
    power_sample: Option<Vec<f64>>,
    corrections: Corrections,
    tracks: Vec<Vec<Option<PeakTrack>>>,
    failures: Vec<FitFailure>,
}

impl TrackingReport {
    /// Number of power levels.
    #[must_use]
    pub fn npowers(&self) -> usize {
        self.tracks.len()
    }
    /// Number of tracked peaks.
    #[must_use]
    pub fn npeaks(&self) -> usize {
        self.tracks.first().map_or(0, Vec::len)
    }
    /// Fit result of `peak` at power level `power`. `None` if the fit failed or is out of range.
    #[must_use]
    pub fn track(&self, power: usize, peak: usize) -> Option<&PeakTrack> {
        self.tracks.get(power)?.get(peak)?.as_ref()
    }
    /// All tracks with shape (npowers, npeaks).
    #[must_use]
    pub fn tracks(&self) -> &[Vec<Option<PeakTrack>>] {
        &self.tracks
    }
    /// All failed (power, peak) pairs.
    #[must_use]
    pub fn failures(&self) -> &[FitFailure] {
        &self.failures
    }
    /// Returns `true` if every (power, peak) pair was fitted successfully.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
    /// Excitation powers at the beam splitter.
    #[must_use]
    pub fn power_bs(&self) -> &[f64] {
        &self.power_bs
    }
    /// Excitation powers at the sample, if the series was power calibrated.
    #[must_use]
    pub fn power_sample(&self) -> Option<&[f64]> {
        self.power_sample.as_deref()
    }
    /// Returns the corrections applied to the analyzed series.
    #[must_use]
    pub const fn corrections(&self) -> Corrections {
        self.corrections
    }
    /// Human readable summary of the run.
    #[must_use]
    pub fn summary(&self) -> String {
        let total = self.npowers() * self.npeaks();
        let mut summary = format!(
            "{} peak(s) tracked over {} power levels: {}/{total} fits succeeded",
            self.npeaks(),
            self.npowers(),
            total - self.failures.len()
        );
        if !self.corrections.dark_subtracted {
            summary.push_str("\n  spectra are not dark corrected");
        }
        if !self.corrections.power_calibrated {
            summary.push_str("\n  powers are not calibrated (beam splitter values)");
        }
        for failure in &self.failures {
            let _ = write!(
                summary,
                "\n  power level {} ({}), peak {}: {}",
                failure.power_index,
                self.power_bs
                    .get(failure.power_index)
                    .copied()
                    .unwrap_or(f64::NAN),
                failure.peak_index,
                failure.reason
            );
        }
        summary
    }
    /// Write one CSV row per power level and peak. Failed fits have empty fit columns.
    ///
    /// # Errors
    ///
    /// This function will return an error if writing fails.
    pub fn write_csv<W: Write>(&self, writer: W) -> PlResult<()> {
        let mut writer = csv::Writer::from_writer(writer);
        for (power_index, row) in self.tracks.iter().enumerate() {
            for (peak_index, track) in row.iter().enumerate() {
                let record = CsvRecord {
                    power_index,
                    peak_index,
                    power_bs: self.power_bs[power_index],
                    power_sample: self
                        .power_sample
                        .as_ref()
                        .map(|p| p[power_index]),
                    position: track.as_ref().map(|t| t.position),
                    position_error: track.as_ref().map(|t| t.position_error),
                    amplitude: track.as_ref().map(|t| t.amplitude),
                    area: track.as_ref().map(|t| t.area),
                    fwhm: track.as_ref().map(|t| t.fwhm),
                    fwhm_error: track.as_ref().map(|t| t.fwhm_error),
                    window_lower: track.as_ref().map(|t| t.window_bounds.0),
                    window_upper: track.as_ref().map(|t| t.window_bounds.1),
                    reduced_chi_square: track.as_ref().map(|t| t.reduced_chi_square),
                };
                writer
                    .serialize(record)
                    .map_err(|e| PlError::Io(format!("writing csv record failed: {e}")))?;
            }
        }
        writer
            .flush()
            .map_err(|e| PlError::Io(format!("writing csv failed: {e}")))
    }
    /// Write the report as pretty printed JSON.
    ///
    /// # Errors
    ///
    /// This function will return an error if serialization or writing fails.
    pub fn write_json<W: Write>(&self, writer: W) -> PlResult<()> {
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| PlError::Io(format!("writing json failed: {e}")))
    }
    /// Write `tracks.csv` and `tracks.json` into `directory`.
    ///
    /// # Errors
    ///
    /// This function will return an error if the files cannot be created or written.
    pub fn export(&self, directory: &Path) -> PlResult<()> {
        let create = |name: &str| {
            File::create(directory.join(name))
                .map(BufWriter::new)
                .map_err(|e| PlError::Io(format!("{name} file creation failed: {e}")))
        };
        self.write_csv(create("tracks.csv")?)?;
        self.write_json(create("tracks.json")?)?;
        info!("tracks written to {}", directory.display());
        Ok(())
    }
}

#[derive(Serialize)]
struct CsvRecord {
    power_index: usize,
    peak_index: usize,
    power_bs: f64,
    power_sample: Option<f64>,
    position: Option<f64>,
    position_error: Option<f64>,
    amplitude: Option<f64>,
    area: Option<f64>,
    fwhm: Option<f64>,
    fwhm_error: Option<f64>,
    window_lower: Option<f64>,
    window_upper: Option<f64>,
    reduced_chi_square: Option<f64>,
}

/// Runs the peak tracking with a fixed fitter and configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeakTracker {
    fitter: CurveFitter,
    config: TrackingConfig,
}

impl PeakTracker {
    /// Create a new [`PeakTracker`].
    ///
    /// # Errors
    ///
    /// This function will return an error if the configuration is invalid.
    pub fn new(fitter: CurveFitter, config: TrackingConfig) -> PlResult<Self> {
        config.validate()?;
        Ok(Self { fitter, config })
    }
    /// Returns a reference to the config of this [`PeakTracker`].
    #[must_use]
    pub const fn config(&self) -> &TrackingConfig {
        &self.config
    }
    /// Track all seeded peaks through `series`.
    ///
    /// Peaks are processed in parallel. The run always completes, failed levels are reported in
    /// [`TrackingReport::failures`].
    ///
    /// # Errors
    ///
    /// This function will return an [`PlError::Configuration`] if the reference index is outside of
    /// the series.
    pub fn fit_peaks(&self, series: &PowerSeries, seeds: &[PeakSeed]) -> PlResult<TrackingReport> {
        let npowers = series.npowers();
        let reference = self.config.reference_index;
        if reference >= npowers {
            return Err(PlError::Configuration(format!(
                "reference index {reference} is outside of the series with {npowers} power levels"
            )));
        }
        let columns: Vec<(Vec<f64>, Vec<f64>)> = (0..npowers)
            .map(|j| (series.energy_column(j), series.intensity_column(j)))
            .collect();
        let per_peak: Vec<Vec<Result<PeakTrack, String>>> = seeds
            .par_iter()
            .enumerate()
            .map(|(peak, seed)| self.track_peak(&columns, reference, peak, seed))
            .collect();
        let mut tracks = vec![vec![None; seeds.len()]; npowers];
        let mut failures = Vec::new();
        for (peak_index, levels) in per_peak.into_iter().enumerate() {
            for (power_index, level) in levels.into_iter().enumerate() {
                match level {
                    Ok(track) => tracks[power_index][peak_index] = Some(track),
                    Err(reason) => failures.push(FitFailure {
                        power_index,
                        peak_index,
                        reason,
                    }),
                }
            }
        }
        failures.sort_by_key(|f| (f.power_index, f.peak_index));
        let report = TrackingReport {
            power_bs: series.power_bs(),
            power_sample: series.power_sample(),
            corrections: series.corrections(),
            tracks,
            failures,
        };
        info!("{}", report.summary());
        Ok(report)
    }
    fn track_peak(
        &self,
        columns: &[(Vec<f64>, Vec<f64>)],
        reference: usize,
        peak: usize,
        seed: &PeakSeed,
    ) -> Vec<Result<PeakTrack, String>> {
        let mut levels: Vec<Result<PeakTrack, String>> =
            vec![Err("not processed".into()); columns.len()];
        let upwards: Vec<usize> = (reference..columns.len()).collect();
        let downwards: Vec<usize> = (0..reference).rev().collect();
        for direction in [upwards, downwards] {
            let mut window = seed.window();
            for j in direction {
                let (x, y) = &columns[j];
                match self.fit_level(x, y, window) {
                    Ok(track) => {
                        let half = self.config.window_multiplier * track.sigma;
                        window = (track.position - half, track.position + half);
                        levels[j] = Ok(track);
                    }
                    Err(e) => {
                        warn!("peak {peak} at power level {j} could not be fitted: {e}");
                        levels[j] = Err(e.to_string());
                    }
                }
            }
        }
        levels
    }
    fn fit_level(&self, x: &[f64], y: &[f64], window: (f64, f64)) -> PlResult<PeakTrack> {
        self.fit_window(x, y, window).or_else(|e| {
            if e.is_retryable() {
                let center = 0.5 * (window.0 + window.1);
                let half = 0.5 * (window.1 - window.0) * self.config.retry_widen_factor;
                self.fit_window(x, y, (center - half, center + half))
            } else {
                Err(e)
            }
        })
    }
    fn fit_window(&self, x: &[f64], y: &[f64], bounds: (f64, f64)) -> PlResult<PeakTrack> {
        let window = FitWindow::from_bounds(x, bounds.0, bounds.1)?;
        let request = FitRequest::new(self.config.lineshape, x, y)?.with_window(window)?;
        let result = self.fitter.fit(&request)?;
        let (Some(peak), Some((fwhm, fwhm_error))) = (result.peak(), result.fwhm()) else {
            return Err(PlError::Configuration(format!(
                "lineshape {} does not describe a peak",
                self.config.lineshape
            )));
        };
        if !(peak.sigma.is_finite() && peak.sigma > 0.0 && peak.center.is_finite()) {
            return Err(PlError::FitConvergence(format!(
                "fit converged to a degenerate peak at {} with sigma {}",
                peak.center, peak.sigma
            )));
        }
        Ok(PeakTrack {
            position: peak.center,
            position_error: result.errors()[1],
            amplitude: peak.amplitude,
            area: peak.amplitude * peak.sigma * (2.0 * PI).sqrt(),
            fwhm,
            fwhm_error,
            sigma: peak.sigma,
            fit_window: window,
            window_bounds: bounds,
            reduced_chi_square: result.reduced_chi_square(),
        })
    }
}
