#![warn(missing_docs)]
//! Operator interaction for seeding peaks.
//!
//! The tracking only needs two kinds of answers from an operator: a list of peak positions and a
//! fit window (x span) per peak. Both are requested through the [`Selector`] trait. Cancelling a
//! selection is not an error: an empty point list means "no (further) peaks", a `None` span means
//! "keep the default window".
use crate::{
    error::{PlError, PlResult},
    series::PowerSeries,
    tracking::PeakSeed,
};
use itertools::Itertools;
use log::info;
use rprompt::prompt_reply_from_bufread;
use std::{
    collections::VecDeque,
    io::{BufRead, Write},
};

/// Source of operator selections.
pub trait Selector {
    /// Select peak positions in the curve `(x, y)`.
    ///
    /// # Errors
    ///
    /// This function will return an error if the interaction itself fails.
    fn select_points(&mut self, x: &[f64], y: &[f64], title: &str) -> PlResult<Vec<f64>>;
    /// Select an x span `(lower, upper)` in the curve `(x, y)`. `None` if the selection was skipped.
    ///
    /// # Errors
    ///
    /// This function will return an error if the interaction itself fails.
    fn select_span(&mut self, x: &[f64], y: &[f64], title: &str) -> PlResult<Option<(f64, f64)>>;
}

/// Seed the peaks of `series` at the power level `reference_index`.
///
/// The operator first selects all peak positions, then a fit window for each of them. Peaks without
/// a selected window get `[position - default_half_span, position + default_half_span]`.
///
/// # Errors
///
/// This function will return an error if
///   - `reference_index` is outside of the series ([`PlError::Configuration`]).
///   - a selection fails or yields an invalid window.
pub fn seed_peaks(
    selector: &mut dyn Selector,
    series: &PowerSeries,
    reference_index: usize,
    default_half_span: f64,
) -> PlResult<Vec<PeakSeed>> {
    if reference_index >= series.npowers() {
        return Err(PlError::Configuration(format!(
            "reference index {reference_index} is outside of the series with {} power levels",
            series.npowers()
        )));
    }
    let x = series.energy_column(reference_index);
    let y = series.intensity_column(reference_index);
    let title = format!(
        "Select peaks at power level {reference_index} ({})",
        series.power_bs()[reference_index]
    );
    let positions = selector.select_points(&x, &y, &title)?;
    let mut seeds = Vec::with_capacity(positions.len());
    for position in positions {
        let title = format!("Select fit window for peak at {position:.4}");
        let seed = match selector.select_span(&x, &y, &title)? {
            Some((lower, upper)) => PeakSeed::with_window(position, lower, upper)?,
            None => PeakSeed::new(position, default_half_span)?,
        };
        info!("peak seeded at {position:.4}, window {:?}", seed.window());
        seeds.push(seed);
    }
    Ok(seeds)
}

/// Text based [`Selector`] reading answers from `reader` and writing prompts to `writer`.
///
/// Usually used with `stdin` and `stdout`. Numbers are separated by commas and/or whitespace. An
/// empty answer cancels a selection, invalid answers are asked again.
pub struct ConsolePrompt<R: BufRead, W: Write> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    /// Creates a new [`ConsolePrompt`].
    pub const fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
    fn ask(&mut self, prompt: String) -> PlResult<String> {
        prompt_reply_from_bufread(&mut self.reader, &mut self.writer, prompt)
            .map_err(|e| PlError::Console(format!("reading operator input failed: {e}")))
    }
    fn ask_numbers(
        &mut self,
        prompt: &str,
        accept: fn(&[f64]) -> bool,
    ) -> PlResult<Option<Vec<f64>>> {
        let mut prefix = "";
        loop {
            let reply = self.ask(format!("{prefix}{prompt}"))?;
            if reply.trim().is_empty() {
                return Ok(None);
            }
            if let Some(numbers) = parse_numbers(&reply).filter(|n| accept(n)) {
                return Ok(Some(numbers));
            }
            prefix = "Invalid input!\n";
        }
    }
}

fn data_summary(x: &[f64], y: &[f64]) -> String {
    let (Some(x_min), Some(x_max)) = (
        x.iter().copied().reduce(f64::min),
        x.iter().copied().reduce(f64::max),
    ) else {
        return "no data\n".into();
    };
    let maximum = x
        .iter()
        .zip(y)
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map_or(String::new(), |(x, y)| format!(", maximum {y:.4} at {x:.4}"));
    format!("data from {x_min:.4} to {x_max:.4}{maximum}\n")
}

fn parse_numbers(text: &str) -> Option<Vec<f64>> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect()
}

impl<R: BufRead, W: Write> Selector for ConsolePrompt<R, W> {
    fn select_points(&mut self, x: &[f64], y: &[f64], title: &str) -> PlResult<Vec<f64>> {
        let prompt = format!(
            "{title}\n{}Please insert peak positions or nothing to finish:\n",
            data_summary(x, y)
        );
        Ok(self.ask_numbers(&prompt, |_| true)?.unwrap_or_default())
    }
    fn select_span(&mut self, x: &[f64], y: &[f64], title: &str) -> PlResult<Option<(f64, f64)>> {
        let prompt = format!(
            "{title}\n{}Please insert lower and upper bound or nothing to keep the default window:\n",
            data_summary(x, y)
        );
        let span = self.ask_numbers(&prompt, |n| n.len() == 2 && n[0] < n[1])?;
        Ok(span.map(|n| (n[0], n[1])))
    }
}

/// [`Selector`] replaying prepared answers.
///
/// Useful for scripted (non-interactive) runs. Once all spans are used up, further span requests
/// are answered with `None`.
#[derive(Debug, Clone, Default)]
pub struct PresetSelector {
    points: Vec<f64>,
    spans: VecDeque<Option<(f64, f64)>>,
    requests: Vec<String>,
}

impl PresetSelector {
    /// Answer the point selection with `points`.
    #[must_use]
    pub fn with_points(mut self, points: &[f64]) -> Self {
        self.points = points.to_vec();
        self
    }
    /// Append an answer to the queue of span selections.
    #[must_use]
    pub fn with_span(mut self, span: Option<(f64, f64)>) -> Self {
        self.spans.push_back(span);
        self
    }
    /// Titles of all selections requested so far.
    #[must_use]
    pub fn requests(&self) -> &[String] {
        &self.requests
    }
}

impl Selector for PresetSelector {
    fn select_points(&mut self, _x: &[f64], _y: &[f64], title: &str) -> PlResult<Vec<f64>> {
        self.requests.push(title.to_owned());
        Ok(self.points.clone())
    }
    fn select_span(&mut self, _x: &[f64], _y: &[f64], title: &str) -> PlResult<Option<(f64, f64)>> {
        self.requests.push(title.to_owned());
        Ok(self.spans.pop_front().flatten())
    }
}

impl std::fmt::Display for PresetSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "points [{}], {} span(s) left",
            self.points.iter().join(", "),
            self.spans.len()
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{measurement::Header, series::RawSeries};
    use assert_matches::assert_matches;
    use nalgebra::DMatrix;

    fn series() -> PowerSeries {
        let x = DMatrix::from_row_slice(4, 2, &[20.0, 10.0, 1.0, 1.0, 1.1, 1.1, 1.2, 1.2]);
        let y = DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 5.0, 3.0, 2.0, 1.0]);
        PowerSeries::new(RawSeries::new(Header::default(), x, y).unwrap())
    }
    #[test]
    fn numbers() {
        assert_eq!(parse_numbers("1.2, 1.3 1.4"), Some(vec![1.2, 1.3, 1.4]));
        assert_eq!(parse_numbers("  "), Some(vec![]));
        assert_eq!(parse_numbers("1.2, x"), None);
        assert_eq!(parse_numbers("inf"), None);
    }
    #[test]
    fn summary() {
        assert_eq!(
            data_summary(&[1.0, 1.1, 1.2], &[1.0, 5.0, 2.0]),
            "data from 1.0000 to 1.2000, maximum 5.0000 at 1.1000\n"
        );
        assert_eq!(data_summary(&[], &[]), "no data\n");
    }
    #[test]
    fn console_points() {
        let mut output = Vec::new();
        let mut prompt = ConsolePrompt::new("1.1, 1.15\n".as_bytes(), &mut output);
        let points = prompt.select_points(&[1.0, 1.2], &[0.0, 1.0], "Peaks").unwrap();
        assert_eq!(points, vec![1.1, 1.15]);
        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with("Peaks\ndata from 1.0000 to 1.2000"));
    }
    #[test]
    fn console_retry_and_cancel() {
        let mut output = Vec::new();
        let mut prompt = ConsolePrompt::new("abc\n1.3 1.1\n1.1 1.3\n\n".as_bytes(), &mut output);
        let span = prompt.select_span(&[1.0, 1.4], &[0.0, 0.0], "Window").unwrap();
        assert_eq!(span, Some((1.1, 1.3)));
        let span = prompt.select_span(&[1.0, 1.4], &[0.0, 0.0], "Window").unwrap();
        assert_eq!(span, None);
        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.matches("Invalid input!").count(), 2);
    }
    #[test]
    fn console_empty_points() {
        let mut output = Vec::new();
        let mut prompt = ConsolePrompt::new("\n".as_bytes(), &mut output);
        assert!(prompt.select_points(&[1.0], &[1.0], "Peaks").unwrap().is_empty());
    }
    #[test]
    fn preset() {
        let mut selector = PresetSelector::default()
            .with_points(&[1.1])
            .with_span(Some((1.0, 1.2)));
        assert_eq!(format!("{selector}"), "points [1.1], 1 span(s) left");
        assert_eq!(selector.select_points(&[], &[], "a").unwrap(), vec![1.1]);
        assert_eq!(selector.select_span(&[], &[], "b").unwrap(), Some((1.0, 1.2)));
        assert_eq!(selector.select_span(&[], &[], "c").unwrap(), None);
        assert_eq!(selector.requests(), &["a", "b", "c"]);
    }
    #[test]
    fn seed() {
        let mut selector = PresetSelector::default()
            .with_points(&[1.1, 1.15])
            .with_span(Some((1.05, 1.18)));
        let seeds = seed_peaks(&mut selector, &series(), 0, 0.05).unwrap();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].window(), (1.05, 1.18));
        assert_eq!(seeds[1].position(), 1.15);
        assert_eq!(seeds[1], PeakSeed::new(1.15, 0.05).unwrap());
        assert_eq!(selector.requests()[0], "Select peaks at power level 0 (20)");
    }
    #[test]
    fn seed_nothing() {
        let mut selector = PresetSelector::default();
        assert!(seed_peaks(&mut selector, &series(), 1, 0.05).unwrap().is_empty());
    }
    #[test]
    fn seed_invalid() {
        let mut selector = PresetSelector::default().with_points(&[1.1]);
        assert_matches!(
            seed_peaks(&mut selector, &series(), 2, 0.05),
            Err(PlError::Configuration(_))
        );
        let mut selector = PresetSelector::default().with_points(&[1.1]);
        assert_matches!(
            seed_peaks(&mut selector, &series(), 0, 0.0),
            Err(PlError::Configuration(_))
        );
    }
}
