//! This is the documentation for the **plpower** software package. **plpower** tracks the peaks of
//! photoluminescence (PL) power series.
//!
//! A power series is a set of PL spectra of the same sample taken at decreasing excitation powers.
//! After the operator seeded the peaks at one reference power level, every peak is fitted at all
//! other power levels by following it from level to level. Dark spectra and power calibrations
//! are looked up automatically in the directory tree around the measurement file.
//!
//! The main building blocks are
//!   - the [`loader`] reading measurement files,
//!   - the [`resolver`] searching for auxiliary files,
//!   - the [`fitter`] (Levenberg-Marquardt) together with the [`guess`] of start parameters,
//!   - the data model ([`measurement`], [`spectrum`], [`series`], [`calibration`]),
//!   - the peak [`tracking`] itself and the operator [`interactor`].
#![allow(clippy::module_name_repetitions)]

pub mod calibration;
pub mod config;
pub mod console;
pub mod error;
pub mod fitter;
pub mod guess;
pub mod interactor;
pub mod lineshape;
pub mod loader;
pub mod measurement;
pub mod resolver;
pub mod series;
pub mod spectrum;
pub mod tracking;
pub mod units;

#[cfg(test)]
mod test_helper;

/// Return the version information of the currently built plpower executable.
#[must_use]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_owned()
}
