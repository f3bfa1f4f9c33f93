#![warn(missing_docs)]
//! Single measurement curves and the metadata attached to them.
//!
//! A [`Measurement`] is a [`RawCurve`] (header + x/y data) together with the identifiers encoded in
//! its file name. The kind specific views ([`Spectrum`](crate::spectrum::Spectrum),
//! [`DarkSpectrum`](crate::spectrum::DarkSpectrum),
//! [`PowerCalibration`](crate::calibration::PowerCalibration)) are built on top of it.
use crate::error::{PlError, PlResult};
use chrono::NaiveDate;
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    fmt::Display,
    path::{Path, PathBuf},
};
use strum::{Display as StrumDisplay, EnumIter};

/// Ordered key/value header of a measurement file.
///
/// Keys are unique. Inserting an existing key replaces its value but keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header(Vec<(String, String)>);

impl Header {
    /// Insert a key/value pair. An existing value of `key` is overwritten.
    pub fn insert(&mut self, key: &str, value: &str) {
        if let Some(entry) = self.0.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value.to_owned();
        } else {
            self.0.push((key.to_owned(), value.to_owned()));
        }
    }
    /// Value stored for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
    /// Iterate over all entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
    /// Returns `true` if the header has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Header and x/y data of a single measurement curve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCurve {
    header: Header,
    x: Vec<f64>,
    y: Vec<f64>,
}

impl RawCurve {
    /// Creates a new [`RawCurve`].
    ///
    /// # Errors
    ///
    /// This function will return an [`PlError::Configuration`] if `x` and `y` differ in length.
    pub fn new(header: Header, x: Vec<f64>, y: Vec<f64>) -> PlResult<Self> {
        if x.len() != y.len() {
            return Err(PlError::Configuration(format!(
                "x ({}) and y ({}) of a curve differ in length",
                x.len(),
                y.len()
            )));
        }
        Ok(Self { header, x, y })
    }
    /// Returns a reference to the header of this [`RawCurve`].
    #[must_use]
    pub const fn header(&self) -> &Header {
        &self.header
    }
    /// Returns the x values of this [`RawCurve`].
    #[must_use]
    pub fn x(&self) -> &[f64] {
        &self.x
    }
    /// Returns the y values of this [`RawCurve`].
    #[must_use]
    pub fn y(&self) -> &[f64] {
        &self.y
    }
    /// Number of data points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len()
    }
    /// Returns `true` if the curve contains no data points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
    /// Reverse the order of the data points.
    pub fn reverse(&mut self) {
        self.x.reverse();
        self.y.reverse();
    }
}

/// Kind of a measurement file as stated in its `Measurement type` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, EnumIter)]
pub enum MeasurementKind {
    /// a single PL spectrum
    Spectrum,
    /// PL spectra for several excitation powers
    PowerSeries,
    /// power vs. half-wave plate position
    PowerCalibration,
}

impl MeasurementKind {
    /// Decode the value of a `Measurement type` header.
    #[must_use]
    pub fn from_type(measurement_type: &str) -> Option<Self> {
        match measurement_type.trim() {
            "Photoluminescence" => Some(Self::Spectrum),
            "X vs Y/Power HWP position vs. Photoluminescence" => Some(Self::PowerSeries),
            "X vs Y/Power HWP position vs. Power" => Some(Self::PowerCalibration),
            _ => None,
        }
    }
}

/// Identifiers encoded in a measurement file name, e.g. `spl1234_Epi0815_NW3_1.3eV_0.2s.origin`.
///
/// The file stem is split at `_`. Every identifier is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNameInfo {
    /// sample number (part containing `spl`)
    pub sample: Option<String>,
    /// growth number (part containing `Epi`)
    pub growth: Option<String>,
    /// nanowire number (part containing `NW`)
    pub nanowire: Option<String>,
    /// center energy token (part containing `ev`, case-insensitive)
    pub center_energy: Option<String>,
    /// integration time token (e.g. `0.2s`)
    pub integration_time: Option<String>,
}

impl FileNameInfo {
    /// Extract the identifiers from the file name of `path`.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let mut info = Self::default();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return info;
        };
        let time_pattern = Regex::new(r"^\d+\.?\d*s$").ok();
        for part in stem.split('_') {
            if part.contains("spl") {
                info.sample = Some(part.to_owned());
            }
            if part.contains("Epi") {
                info.growth = Some(part.to_owned());
            }
            if part.contains("NW") {
                info.nanowire = Some(part.to_owned());
            }
            if part.to_lowercase().contains("ev") {
                info.center_energy = Some(part.to_owned());
            }
            if time_pattern.as_ref().is_some_and(|re| re.is_match(part)) {
                info.integration_time = Some(part.to_owned());
            }
        }
        info
    }
    /// Returns the integration time and center energy tokens needed for a dark search.
    ///
    /// Logs a warning for each missing token.
    #[must_use]
    pub fn dark_tokens(&self) -> Option<(&str, &str)> {
        if self.integration_time.is_none() {
            warn!("integration time not found in file name");
        }
        if self.center_energy.is_none() {
            warn!("center energy not found in file name");
        }
        Some((
            self.integration_time.as_deref()?,
            self.center_energy.as_deref()?,
        ))
    }
}

/// A single measurement curve together with its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    source: Option<PathBuf>,
    names: FileNameInfo,
    curve: RawCurve,
}

impl Measurement {
    /// Create a [`Measurement`] loaded from `source`.
    #[must_use]
    pub fn new(source: &Path, curve: RawCurve) -> Self {
        Self {
            source: Some(source.to_path_buf()),
            names: FileNameInfo::from_path(source),
            curve,
        }
    }
    /// Create a [`Measurement`] which was not loaded from a file.
    #[must_use]
    pub fn from_curve(curve: RawCurve) -> Self {
        Self {
            source: None,
            names: FileNameInfo::default(),
            curve,
        }
    }
    /// Returns the file this [`Measurement`] was loaded from.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
    /// Returns the identifiers parsed from the file name.
    #[must_use]
    pub const fn names(&self) -> &FileNameInfo {
        &self.names
    }
    /// Returns a reference to the header of this [`Measurement`].
    #[must_use]
    pub const fn header(&self) -> &Header {
        self.curve.header()
    }
    /// Returns the x values of this [`Measurement`].
    #[must_use]
    pub fn x(&self) -> &[f64] {
        self.curve.x()
    }
    /// Returns the y values of this [`Measurement`].
    #[must_use]
    pub fn y(&self) -> &[f64] {
        self.curve.y()
    }
    /// Number of data points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.curve.len()
    }
    /// Returns `true` if the measurement has no data points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.curve.is_empty()
    }
    /// Decoded header values.
    #[must_use]
    pub fn info(&self) -> MeasurementInfo {
        MeasurementInfo::from_header(self.header())
    }
    /// Returns the measurement with its data points in reverse order.
    #[must_use]
    pub fn reversed(mut self) -> Self {
        self.curve.reverse();
        self
    }
}

impl Display for Measurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let unknown = |v: &Option<String>| v.clone().unwrap_or_else(|| "unknown".into());
        writeln!(
            f,
            "location: {}",
            self.source
                .as_ref()
                .map_or_else(|| "none".into(), |p| p.display().to_string())
        )?;
        writeln!(f, "spl-number: {}", unknown(&self.names.sample))?;
        writeln!(f, "Epi-number: {}", unknown(&self.names.growth))?;
        writeln!(f, "NW: {}", unknown(&self.names.nanowire))?;
        for (key, value) in self.header().iter() {
            writeln!(f, "{key}: {value}")?;
        }
        Ok(())
    }
}

/// Header keys with a known meaning.
pub mod keys {
    /// measurement date
    pub const DATE: &str = "Date";
    /// kind of the measurement
    pub const MEASUREMENT_TYPE: &str = "Measurement type";
    /// sample temperature
    pub const TEMPERATURE: &str = "Temperature";
    /// detector integration time
    pub const INTEGRATION_TIME: &str = "Integration time";
    /// excitation power measured at the beam splitter
    pub const EXCITATION_POWER: &str = "Excitation power";
    /// monochromator entrance slit
    pub const ENTRANCE_SLIT_WIDTH: &str = "Entrance slit width";
    /// monochromator exit slit
    pub const EXIT_SLIT_WIDTH: &str = "Exit slit width";
    /// monochromator center position
    pub const CENTER_WAVELENGTH: &str = "Center wavelength";
    /// spectral window of the detector
    pub const DISPERSION_WINDOW: &str = "Dispersion window";
}

/// Header values decoded into typed quantities.
///
/// Values which are absent or cannot be decoded are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementInfo {
    /// date as written in the file
    pub date_text: Option<String>,
    /// parsed date
    pub date: Option<NaiveDate>,
    /// value of the `Measurement type` header
    pub measurement_type: Option<String>,
    /// sample temperature
    pub temperature: Option<f64>,
    /// integration time
    pub integration_time: Option<f64>,
    /// excitation power at the beam splitter
    pub excitation_power: Option<f64>,
    /// entrance slit width
    pub entrance_slit_width: Option<f64>,
    /// exit slit width
    pub exit_slit_width: Option<f64>,
    /// center wavelength (second of the `a / b` values)
    pub center_wavelength: Option<f64>,
    /// dispersion window (second of the `a / b` values)
    pub dispersion_window: Option<f64>,
}

impl MeasurementInfo {
    /// Decode the known entries of `header`.
    #[must_use]
    pub fn from_header(header: &Header) -> Self {
        let leading = |key: &str| decode(header, key, leading_number);
        let after_slash = |key: &str| decode(header, key, number_after_slash);
        let date_text = header.get(keys::DATE).map(str::to_owned);
        Self {
            date: date_text.as_deref().and_then(parse_date),
            date_text,
            measurement_type: header.get(keys::MEASUREMENT_TYPE).map(str::to_owned),
            temperature: leading(keys::TEMPERATURE),
            integration_time: leading(keys::INTEGRATION_TIME),
            excitation_power: leading(keys::EXCITATION_POWER),
            entrance_slit_width: leading(keys::ENTRANCE_SLIT_WIDTH),
            exit_slit_width: leading(keys::EXIT_SLIT_WIDTH),
            center_wavelength: after_slash(keys::CENTER_WAVELENGTH),
            dispersion_window: after_slash(keys::DISPERSION_WINDOW),
        }
    }
    /// Measurement kind derived from the `Measurement type` header.
    #[must_use]
    pub fn kind(&self) -> Option<MeasurementKind> {
        self.measurement_type
            .as_deref()
            .and_then(MeasurementKind::from_type)
    }
}

fn decode(header: &Header, key: &str, decoder: fn(&str) -> Option<f64>) -> Option<f64> {
    let value = header.get(key)?;
    let decoded = decoder(value);
    if decoded.is_none() {
        debug!("cannot decode header entry {key}: {value}");
    }
    decoded
}

fn leading_number(value: &str) -> Option<f64> {
    value.split_whitespace().next()?.parse().ok()
}

fn number_after_slash(value: &str) -> Option<f64> {
    let (_, second) = value.split_once('/')?;
    leading_number(second)
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    ["%d.%m.%Y", "%Y-%m-%d", "%d/%m/%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text.trim(), format).ok())
}
