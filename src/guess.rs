//! Estimation of start parameters for the fitter.
//!
//! The estimates are heuristics on the windowed data only. They do not have to be good, they just
//! have to be close enough for the Levenberg-Marquardt iteration to converge.
use crate::{
    error::{PlError, PlResult},
    lineshape::LineShape,
    units::usize_to_f64,
};
use itertools::Itertools;
use kahan::KahanSummator;
use log::warn;

/// Fraction of the window (on either side) in which a detected maximum triggers a warning.
const EDGE_FRACTION: f64 = 0.1;

/// Create an initial parameter guess for `shape` from the windowed data `x` and `y`.
///
/// For Gaussian lineshapes the background is estimated from the window endpoints (mean for a
/// constant background, secant for a linear one), the amplitude and center from the maximum above
/// this background and `sigma` from the closest half-maximum crossing next to the maximum. The
/// half-maximum scan only depends on distances along x and therefore works for ascending as well as
/// descending x values. A warning is logged if the maximum lies within the outer 10 % of the window.
///
/// # Errors
///
/// This function will return
///   - [`PlError::Configuration`] if `x` and `y` differ in length.
///   - [`PlError::InitialGuess`] if the window holds fewer points than the lineshape has parameters,
///     if no peak above the background is found or if the data never drops below half maximum
///     inside the window.
pub fn guess(shape: LineShape, x: &[f64], y: &[f64]) -> PlResult<Vec<f64>> {
    if x.len() != y.len() {
        return Err(PlError::Configuration(format!(
            "x ({}) and y ({}) of the fit window differ in length",
            x.len(),
            y.len()
        )));
    }
    if x.len() < shape.param_count().max(2) {
        return Err(PlError::InitialGuess(format!(
            "fit window contains {} points, {shape} needs at least {}",
            x.len(),
            shape.param_count().max(2)
        )));
    }
    match shape {
        LineShape::GaussianConstBg => {
            let offset = 0.5 * (y[0] + y[y.len() - 1]);
            let residual: Vec<f64> = y.iter().map(|y| y - offset).collect();
            let (imax, amplitude, sigma) = peak_estimate(x, &residual)?;
            Ok(vec![amplitude, x[imax], sigma, offset])
        }
        LineShape::GaussianLinearBg => {
            let (m, t) = secant(x, y);
            let residual: Vec<f64> = x
                .iter()
                .zip(y)
                .map(|(x, y)| y - m.mul_add(*x, t))
                .collect();
            let (imax, amplitude, sigma) = peak_estimate(x, &residual)?;
            Ok(vec![amplitude, x[imax], sigma, m, t])
        }
        LineShape::Linear => {
            let (m, t) = secant(x, y);
            Ok(vec![m, t])
        }
        LineShape::Proportional => {
            let xy: Vec<f64> = x.iter().zip(y).map(|(x, y)| x * y).collect();
            let xx: Vec<f64> = x.iter().map(|x| x * x).collect();
            let sum_xy: kahan::KahanSum<f64> = xy.iter().kahan_sum();
            let sum_xx: kahan::KahanSum<f64> = xx.iter().kahan_sum();
            if sum_xx.sum() == 0.0 {
                return Err(PlError::InitialGuess(
                    "all x values are zero, slope through origin undefined".into(),
                ));
            }
            Ok(vec![sum_xy.sum() / sum_xx.sum()])
        }
        LineShape::Sigmoid | LineShape::Tanh => {
            let (lo, hi) = x_extremes(x)?;
            let (x_lo, y_lo) = (x[lo], y[lo]);
            let (x_hi, y_hi) = (x[hi], y[hi]);
            let steepness = 4.0 / (x_hi - x_lo);
            let midpoint = 0.5 * (x_lo + x_hi);
            if shape == LineShape::Sigmoid {
                Ok(vec![y_hi - y_lo, steepness, steepness * midpoint, y_lo])
            } else {
                Ok(vec![
                    0.5 * (y_hi - y_lo),
                    steepness,
                    -steepness * midpoint,
                    0.5 * (y_hi + y_lo),
                ])
            }
        }
    }
}

/// Slope and intercept of the line through the first and last point of the window.
fn secant(x: &[f64], y: &[f64]) -> (f64, f64) {
    let (x0, x1) = (x[0], x[x.len() - 1]);
    let (y0, y1) = (y[0], y[y.len() - 1]);
    #[allow(clippy::float_cmp)]
    let m = if x1 == x0 { 0.0 } else { (y1 - y0) / (x1 - x0) };
    (m, m.mul_add(-x0, y0))
}

/// Indices of the smallest and the largest x value.
fn x_extremes(x: &[f64]) -> PlResult<(usize, usize)> {
    match x.iter().position_minmax_by(|a, b| a.total_cmp(b)) {
        itertools::MinMaxResult::MinMax(lo, hi) if x[lo] < x[hi] => Ok((lo, hi)),
        _ => Err(PlError::InitialGuess(
            "fit window has no extent along x".into(),
        )),
    }
}

/// Estimate index of maximum, amplitude and sigma of a peak in background-free data.
fn peak_estimate(x: &[f64], residual: &[f64]) -> PlResult<(usize, f64, f64)> {
    let imax = residual
        .iter()
        .position_max_by(|a, b| a.total_cmp(b))
        .ok_or_else(|| PlError::InitialGuess("empty fit window".into()))?;
    let amplitude = residual[imax];
    if amplitude <= 0.0 || !amplitude.is_finite() {
        return Err(PlError::InitialGuess(
            "no maximum above background found in fit window".into(),
        ));
    }
    let relative_position = usize_to_f64(imax) / usize_to_f64(residual.len() - 1);
    if relative_position < EDGE_FRACTION || relative_position > 1.0 - EDGE_FRACTION {
        warn!(
            "maximum found at the edge of the fit window (x = {:.4}). The window might not bracket the peak.",
            x[imax]
        );
    }
    let half = 0.5 * amplitude;
    let half_width = [
        half_max_distance(x, residual, imax, half, false),
        half_max_distance(x, residual, imax, half, true),
    ]
    .into_iter()
    .flatten()
    .min_by(f64::total_cmp)
    .ok_or_else(|| PlError::InitialGuess("half maximum not reached within fit window".into()))?;
    if half_width <= 0.0 {
        return Err(PlError::InitialGuess(
            "degenerate half width at half maximum".into(),
        ));
    }
    Ok((imax, amplitude, half_width / (2.0 * std::f64::consts::LN_2).sqrt()))
}

/// Distance along x between the maximum and the first half-maximum crossing found when walking
/// away from the maximum in one direction.
///
/// The walk is bounded by the window; `None` is returned if the data never drops below `half`.
fn half_max_distance(
    x: &[f64],
    residual: &[f64],
    imax: usize,
    half: f64,
    forward: bool,
) -> Option<f64> {
    let indices: Box<dyn Iterator<Item = usize>> = if forward {
        Box::new(imax + 1..residual.len())
    } else {
        Box::new((0..imax).rev())
    };
    let mut previous = imax;
    for i in indices {
        if residual[i] < half {
            let (y_in, y_out) = (residual[previous], residual[i]);
            let ratio = (y_in - half) / (y_in - y_out);
            let crossing = ratio.mul_add(x[i] - x[previous], x[previous]);
            return Some((x[imax] - crossing).abs());
        }
        previous = i;
    }
    None
}
