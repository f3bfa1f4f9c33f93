#![warn(missing_docs)]
//! Parametric lineshapes used for fitting spectral peaks and calibration curves.
//!
//! All lineshapes are pure functions `f(x; p)`. The parameter order of each variant is documented
//! on the variant and returned by [`LineShape::param_names`].
use crate::error::{PlError, PlResult};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// The family of model functions known to the fitter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumIter, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LineShape {
    /// single Gaussian on a constant background: `a exp(-(x - x0)² / (2 sigma²)) + offset`
    ///
    /// parameters: `[a, x0, sigma, offset]`
    #[default]
    GaussianConstBg,
    /// single Gaussian on a linear background: `a exp(-(x - x0)² / (2 sigma²)) + m x + t`
    ///
    /// parameters: `[a, x0, sigma, m, t]`
    GaussianLinearBg,
    /// straight line `a x + b`
    ///
    /// parameters: `[a, b]`
    Linear,
    /// straight line through the origin `a x`
    ///
    /// parameters: `[a]`
    Proportional,
    /// logistic step `a / (1 + exp(-b x + c)) + d`
    ///
    /// parameters: `[a, b, c, d]`
    Sigmoid,
    /// hyperbolic tangent step `a tanh(b x + c) + d`
    ///
    /// parameters: `[a, b, c, d]`
    Tanh,
}

/// Peak related parameters of a fitted peak lineshape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakParams {
    /// height of the peak above the background
    pub amplitude: f64,
    /// peak position
    pub center: f64,
    /// standard deviation of the Gaussian
    pub sigma: f64,
}

impl LineShape {
    /// Number of free parameters of this lineshape.
    #[must_use]
    pub const fn param_count(self) -> usize {
        match self {
            Self::GaussianConstBg | Self::Sigmoid | Self::Tanh => 4,
            Self::GaussianLinearBg => 5,
            Self::Linear => 2,
            Self::Proportional => 1,
        }
    }
    /// Names of the parameters in the order expected by [`LineShape::eval`].
    #[must_use]
    pub const fn param_names(self) -> &'static [&'static str] {
        match self {
            Self::GaussianConstBg => &["a", "x0", "sigma", "offset"],
            Self::GaussianLinearBg => &["a", "x0", "sigma", "m", "t"],
            Self::Linear => &["a", "b"],
            Self::Proportional => &["a"],
            Self::Sigmoid | Self::Tanh => &["a", "b", "c", "d"],
        }
    }
    /// Returns `true` for lineshapes describing a single peak.
    #[must_use]
    pub const fn is_peak(self) -> bool {
        matches!(self, Self::GaussianConstBg | Self::GaussianLinearBg)
    }
    /// Check that `params` has the number of entries this lineshape expects.
    ///
    /// # Errors
    ///
    /// This function returns a [`PlError::Configuration`] on a parameter count mismatch.
    pub fn check_arity(self, params: &[f64]) -> PlResult<()> {
        if params.len() == self.param_count() {
            Ok(())
        } else {
            Err(PlError::Configuration(format!(
                "lineshape {self} expects {} parameters but {} were given",
                self.param_count(),
                params.len()
            )))
        }
    }
    /// Evaluate the lineshape at `x`.
    ///
    /// The caller is responsible for passing the correct number of parameters (see
    /// [`LineShape::check_arity`]). Missing parameters are treated as zero.
    #[must_use]
    pub fn eval(self, x: f64, params: &[f64]) -> f64 {
        let p = |i: usize| params.get(i).copied().unwrap_or(0.0);
        match self {
            Self::GaussianConstBg => gaussian(x, p(0), p(1), p(2)) + p(3),
            Self::GaussianLinearBg => p(3).mul_add(x, gaussian(x, p(0), p(1), p(2)) + p(4)),
            Self::Linear => p(0).mul_add(x, p(1)),
            Self::Proportional => p(0) * x,
            Self::Sigmoid => p(0) / (1.0 + (-x).mul_add(p(1), p(2)).exp()) + p(3),
            Self::Tanh => p(0).mul_add(p(1).mul_add(x, p(2)).tanh(), p(3)),
        }
    }
    /// Evaluate the lineshape for every element of `x`.
    #[must_use]
    pub fn eval_all(self, x: &[f64], params: &[f64]) -> Vec<f64> {
        x.iter().map(|x| self.eval(*x, params)).collect()
    }
    /// Partial derivatives of the lineshape with respect to each parameter at `x`.
    #[must_use]
    pub fn gradient(self, x: f64, params: &[f64]) -> Vec<f64> {
        let p = |i: usize| params.get(i).copied().unwrap_or(0.0);
        match self {
            Self::GaussianConstBg | Self::GaussianLinearBg => {
                let (a, x0, sigma) = (p(0), p(1), p(2));
                let g = gaussian(x, 1.0, x0, sigma);
                let dx = x - x0;
                let sigma2 = sigma * sigma;
                let mut grad = vec![g, a * g * dx / sigma2, a * g * dx * dx / (sigma2 * sigma)];
                if self == Self::GaussianConstBg {
                    grad.push(1.0);
                } else {
                    grad.push(x);
                    grad.push(1.0);
                }
                grad
            }
            Self::Linear => vec![x, 1.0],
            Self::Proportional => vec![x],
            Self::Sigmoid => {
                let s = 1.0 / (1.0 + (-x).mul_add(p(1), p(2)).exp());
                let ds = s * (1.0 - s);
                vec![s, p(0) * ds * x, -p(0) * ds, 1.0]
            }
            Self::Tanh => {
                let t = p(1).mul_add(x, p(2)).tanh();
                let dt = t.mul_add(-t, 1.0);
                vec![t, p(0) * dt * x, p(0) * dt, 1.0]
            }
        }
    }
    /// Extract amplitude, center and width of a peak lineshape.
    ///
    /// Returns `None` for lineshapes which do not describe a peak or on a parameter count mismatch.
    /// The width is reported as a positive value even if the fit converged to a negative `sigma`.
    #[must_use]
    pub fn peak_params(self, params: &[f64]) -> Option<PeakParams> {
        if !self.is_peak() || params.len() != self.param_count() {
            return None;
        }
        Some(PeakParams {
            amplitude: params[0],
            center: params[1],
            sigma: params[2].abs(),
        })
    }
}

/// Plain Gaussian `a exp(-(x - x0)² / (2 sigma²))` without background.
#[must_use]
pub fn gaussian(x: f64, a: f64, x0: f64, sigma: f64) -> f64 {
    let dx = x - x0;
    a * (-dx * dx / (2.0 * sigma * sigma)).exp()
}
