#![warn(missing_docs)]
//! Loading of measurement files.
//!
//! The rest of the crate only depends on the [`CurveLoader`] trait. [`OriginLoader`] implements it
//! for the tab separated `.origin` text export of the measurement software:
//!
//! ```text
//! Date: 12.03.2024
//! Measurement type: Photoluminescence
//! Integration time: 0.2 s
//! Energy  Intensity
//! (eV)    (counts/s)
//! 1.30    1532.0
//! 1.31    1544.5
//! ```
//!
//! Power series files start their data block with a row of the m excitation powers followed by rows
//! of one energy and m intensities each.
use crate::{
    error::{PlError, PlResult},
    measurement::{keys, Header, Measurement, MeasurementKind, RawCurve},
    series::RawSeries,
};
use csv::{ReaderBuilder, StringRecord};
use itertools::Itertools;
use log::warn;
use nalgebra::DMatrix;
use std::{fs, path::Path};

/// Parser for measurement files.
pub trait CurveLoader: Send + Sync {
    /// Load a single curve (header and two data columns).
    ///
    /// # Errors
    ///
    /// This function will return an error if the file cannot be read or holds no valid data.
    fn load_curve(&self, path: &Path) -> PlResult<RawCurve>;
    /// Load a power series (header, power row and energy/intensity rows).
    ///
    /// # Errors
    ///
    /// This function will return an error if the file cannot be read or holds no valid data.
    fn load_series(&self, path: &Path) -> PlResult<RawSeries>;
    /// Load a single curve as [`Measurement`] including the identifiers of its file name.
    ///
    /// # Errors
    ///
    /// This function will return an error if the curve cannot be loaded.
    fn load_measurement(&self, path: &Path) -> PlResult<Measurement> {
        Ok(Measurement::new(path, self.load_curve(path)?))
    }
}

/// Loader for `.origin` text files.
#[derive(Debug, Default, Clone, Copy)]
pub struct OriginLoader;

/// Header and the raw data block of a file.
struct Sections {
    header: Header,
    /// tab separated data lines with their (1-based) line number
    data: Vec<(usize, String)>,
}

impl OriginLoader {
    /// Determine the kind of measurement stored in a file from its `Measurement type` header.
    ///
    /// # Errors
    ///
    /// This function will return an [`PlError::Io`] if the file cannot be read.
    pub fn measurement_kind(&self, path: &Path) -> PlResult<Option<MeasurementKind>> {
        let sections = read_sections(path)?;
        Ok(sections
            .header
            .get(keys::MEASUREMENT_TYPE)
            .and_then(MeasurementKind::from_type))
    }
}

impl CurveLoader for OriginLoader {
    fn load_curve(&self, path: &Path) -> PlResult<RawCurve> {
        let sections = read_sections(path)?;
        let mut x = Vec::new();
        let mut y = Vec::new();
        for (line_no, record) in records(&sections.data)? {
            match parse_row(&record) {
                Some(values) if values.len() >= 2 => {
                    x.push(values[0]);
                    y.push(values[1]);
                }
                _ => warn!("{}: skipping data line {line_no}", path.display()),
            }
        }
        if x.is_empty() {
            return Err(PlError::Parse(format!(
                "{}: no data found in file",
                path.display()
            )));
        }
        RawCurve::new(sections.header, x, y)
    }
    fn load_series(&self, path: &Path) -> PlResult<RawSeries> {
        let sections = read_sections(path)?;
        let mut rows = records(&sections.data)?.into_iter();
        let powers = rows
            .next()
            .and_then(|(_, record)| parse_row(&record))
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                PlError::Parse(format!("{}: no power row found in file", path.display()))
            })?;
        let m = powers.len();
        let mut energies = Vec::new();
        let mut intensities = Vec::new();
        for (line_no, record) in rows {
            match parse_row(&record) {
                Some(values) if values.len() == m + 1 => {
                    energies.push(values[0]);
                    intensities.extend_from_slice(&values[1..]);
                }
                _ => warn!(
                    "{}: skipping data line {line_no}, expected one energy and {m} intensities",
                    path.display()
                ),
            }
        }
        let n = energies.len();
        if n == 0 {
            return Err(PlError::Parse(format!(
                "{}: no spectra found in file",
                path.display()
            )));
        }
        let x = DMatrix::from_fn(n + 1, m, |i, j| if i == 0 { powers[j] } else { energies[i - 1] });
        let y = DMatrix::from_row_slice(n, m, &intensities);
        RawSeries::new(sections.header, x, y)
    }
}

fn read_sections(path: &Path) -> PlResult<Sections> {
    let bytes = fs::read(path)
        .map_err(|e| PlError::Io(format!("cannot read {}: {e}", path.display())))?;
    let content = String::from_utf8_lossy(&bytes);
    let mut header = Header::default();
    let mut data = Vec::new();
    let mut in_data = false;
    for (i, line) in content.lines().enumerate() {
        let line_no = i + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !in_data && starts_with_number(line) {
            in_data = true;
        }
        if in_data {
            data.push((line_no, line.split_whitespace().join("\t")));
            continue;
        }
        if line.starts_with('(') || line.starts_with("Energy") {
            continue;
        }
        match line.split_once(':') {
            Some((key, value)) => header.insert(key.trim(), value.trim()),
            None => warn!(
                "{}: skipping header line {line_no}, no key/value pair found",
                path.display()
            ),
        }
    }
    Ok(Sections { header, data })
}

fn starts_with_number(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .is_some_and(|token| token.parse::<f64>().is_ok())
}

fn records(data: &[(usize, String)]) -> PlResult<Vec<(usize, StringRecord)>> {
    let block = data.iter().map(|(_, line)| line).join("\n");
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .flexible(true)
        .from_reader(block.as_bytes());
    let mut records = Vec::with_capacity(data.len());
    for ((line_no, _), record) in data.iter().zip(reader.records()) {
        let record = record.map_err(|e| PlError::Parse(format!("line {line_no}: {e}")))?;
        records.push((*line_no, record));
    }
    Ok(records)
}

fn parse_row(record: &StringRecord) -> Option<Vec<f64>> {
    record.iter().map(|field| field.parse::<f64>().ok()).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_helper::check_warnings;
    use assert_matches::assert_matches;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }
    const SPECTRUM: &str = "Date: 12.03.2024\n\
        Measurement type:\tPhotoluminescence\n\
        Integration time: 0.2 s\n\
        Center wavelength 1.3 eV / 953.7 nm\n\
        \n\
        Energy\tIntensity\n\
        (eV)\t(counts/s)\n\
        1.30\t1532.0\n\
        1.31 1544.5\n\
        oops\n\
        1.32\t1560.25\n";
    const SERIES: &str = "Measurement type: X vs Y/Power HWP position vs. Photoluminescence\n\
        Energy\n\
        10.0\t20.0\t30.0\n\
        1.30\t1.0\t2.0\t3.0\n\
        1.31\t4.0\t5.0\n\
        1.32\t7.0\t8.0\t9.0\n";

    #[test]
    fn load_curve() {
        testing_logger::setup();
        let file = file_with(SPECTRUM);
        let curve = OriginLoader.load_curve(file.path()).unwrap();
        assert_eq!(curve.x(), &[1.30, 1.31, 1.32]);
        assert_eq!(curve.y(), &[1532.0, 1544.5, 1560.25]);
        assert_eq!(curve.header().get("Date"), Some("12.03.2024"));
        assert_eq!(
            curve.header().get("Measurement type"),
            Some("Photoluminescence")
        );
        assert_eq!(curve.header().len(), 3);
        let path = file.path().display();
        check_warnings(vec![
            format!("{path}: skipping header line 4, no key/value pair found").as_str(),
            format!("{path}: skipping data line 10").as_str(),
        ]);
    }
    #[test]
    fn load_measurement() {
        let file = file_with(SPECTRUM);
        let m = OriginLoader.load_measurement(file.path()).unwrap();
        assert_eq!(m.source(), Some(file.path()));
        assert_eq!(m.info().integration_time, Some(0.2));
    }
    #[test]
    fn load_curve_without_data() {
        let file = file_with("Date: 12.03.2024\n");
        assert_matches!(OriginLoader.load_curve(file.path()), Err(PlError::Parse(_)));
        assert_matches!(
            OriginLoader.load_curve(Path::new("./invalid_file_path/nothing.origin")),
            Err(PlError::Io(_))
        );
    }
    #[test]
    fn load_series() {
        testing_logger::setup();
        let file = file_with(SERIES);
        let series = OriginLoader.load_series(file.path()).unwrap();
        assert_eq!(series.x().shape(), (3, 3));
        assert_eq!(series.y().shape(), (2, 3));
        assert_eq!(series.powers(), vec![10.0, 20.0, 30.0]);
        assert_eq!(series.x()[(2, 1)], 1.32);
        assert_eq!(series.y()[(1, 2)], 9.0);
        let path = file.path().display();
        check_warnings(vec![format!(
            "{path}: skipping data line 5, expected one energy and 3 intensities"
        )
        .as_str()]);
    }
    #[test]
    fn load_series_without_spectra() {
        let file = file_with("10.0\t20.0\n");
        assert_matches!(OriginLoader.load_series(file.path()), Err(PlError::Parse(_)));
        let file = file_with("Date: today\n");
        assert_matches!(OriginLoader.load_series(file.path()), Err(PlError::Parse(_)));
    }
    #[test]
    fn measurement_kind() {
        let file = file_with(SERIES);
        assert_eq!(
            OriginLoader.measurement_kind(file.path()).unwrap(),
            Some(MeasurementKind::PowerSeries)
        );
        let file = file_with(SPECTRUM);
        assert_eq!(
            OriginLoader.measurement_kind(file.path()).unwrap(),
            Some(MeasurementKind::Spectrum)
        );
        let file = file_with("Date: today\n");
        assert_eq!(OriginLoader.measurement_kind(file.path()).unwrap(), None);
    }
}
