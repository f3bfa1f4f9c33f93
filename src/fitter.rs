#![warn(missing_docs)]
//! Nonlinear least-squares fitting of [`LineShape`]s.
//!
//! A fit is described by a [`FitRequest`]: the model, the full data arrays, optional y errors, the
//! window (index range) to be fitted and the initial guess. The [`CurveFitter`] itself holds only
//! its numerical settings, so one fitter can serve any number of (also concurrent) requests.
use crate::{
    error::{PlError, PlResult},
    guess::guess,
    interactor::Selector,
    lineshape::{LineShape, PeakParams},
    units::{find_closest_index, fwhm_factor, usize_to_f64},
};
use kahan::KahanSummator;
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use log::debug;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

/// Index range `[lower_index, upper_index]` (both inclusive) into the x array of a spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitWindow {
    lower_index: usize,
    upper_index: usize,
}

impl FitWindow {
    /// Creates a new [`FitWindow`] for data of length `len`.
    ///
    /// # Errors
    ///
    /// This function will return an [`PlError::Configuration`] if
    ///   - `lower_index > upper_index`
    ///   - `upper_index` is not a valid index for data of length `len`
    pub fn new(lower_index: usize, upper_index: usize, len: usize) -> PlResult<Self> {
        if lower_index > upper_index {
            return Err(PlError::Configuration(format!(
                "fit window lower index {lower_index} is above upper index {upper_index}"
            )));
        }
        if upper_index >= len {
            return Err(PlError::Configuration(format!(
                "fit window upper index {upper_index} is outside of data with {len} points"
            )));
        }
        Ok(Self {
            lower_index,
            upper_index,
        })
    }
    /// Window spanning all data of length `len`.
    ///
    /// # Errors
    ///
    /// This function will return an [`PlError::Configuration`] if `len` is zero.
    pub fn full(len: usize) -> PlResult<Self> {
        if len == 0 {
            return Err(PlError::Configuration(
                "cannot create a fit window for empty data".into(),
            ));
        }
        Self::new(0, len - 1, len)
    }
    /// Convert a window given in physical x units into an index window.
    ///
    /// Both bounds are mapped onto the closest x value. Since x might be ordered descending, the
    /// resulting indices are sorted.
    ///
    /// # Errors
    ///
    /// This function will return an [`PlError::Configuration`] if
    ///   - `lower > upper` or one of the bounds is not finite.
    ///   - `x` is empty.
    pub fn from_bounds(x: &[f64], lower: f64, upper: f64) -> PlResult<Self> {
        if !lower.is_finite() || !upper.is_finite() {
            return Err(PlError::Configuration(
                "fit window bounds must be finite".into(),
            ));
        }
        if lower > upper {
            return Err(PlError::Configuration(format!(
                "fit window lower bound {lower} is above upper bound {upper}"
            )));
        }
        let (Some(i_low), Some(i_up)) = (find_closest_index(x, lower), find_closest_index(x, upper))
        else {
            return Err(PlError::Configuration(
                "cannot create a fit window for empty data".into(),
            ));
        };
        Self::new(i_low.min(i_up), i_low.max(i_up), x.len())
    }
    /// Returns the lower index of this [`FitWindow`].
    #[must_use]
    pub const fn lower_index(&self) -> usize {
        self.lower_index
    }
    /// Returns the upper index of this [`FitWindow`].
    #[must_use]
    pub const fn upper_index(&self) -> usize {
        self.upper_index
    }
    /// Number of data points inside the window.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.upper_index - self.lower_index + 1
    }
    /// A window always contains at least one point.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
    /// The part of `data` covered by this window.
    ///
    /// # Panics
    ///
    /// Panics if `data` is shorter than the data this window was created for.
    #[must_use]
    pub fn slice<'a>(&self, data: &'a [f64]) -> &'a [f64] {
        &data[self.lower_index..=self.upper_index]
    }
}

/// Signature of an initial guess generator.
pub type GuessFn = fn(LineShape, &[f64], &[f64]) -> PlResult<Vec<f64>>;

/// Start parameters of a fit.
#[derive(Debug, Clone)]
pub enum InitialGuess {
    /// explicitly given parameters
    Fixed(Vec<f64>),
    /// parameters computed from the windowed data
    Computed(GuessFn),
}

impl Default for InitialGuess {
    fn default() -> Self {
        Self::Computed(guess)
    }
}

/// Data range to be used for a fit, resolved into a [`FitWindow`] before fitting.
pub enum FitRange<'a> {
    /// all data points
    Full,
    /// an explicit index window
    Indices(FitWindow),
    /// a window given in physical x units
    Bounds(f64, f64),
    /// a window selected by an operator. A cancelled selection falls back to all data points.
    Interactive(&'a mut dyn Selector),
}

impl FitRange<'_> {
    /// Resolve this range into a concrete [`FitWindow`] for the data `x` and `y`.
    ///
    /// # Errors
    ///
    /// This function will return an error if the window is malformed or the operator interaction
    /// fails.
    pub fn resolve(self, x: &[f64], y: &[f64]) -> PlResult<FitWindow> {
        match self {
            Self::Full => FitWindow::full(x.len()),
            Self::Indices(window) => FitWindow::new(window.lower_index, window.upper_index, x.len()),
            Self::Bounds(lower, upper) => FitWindow::from_bounds(x, lower, upper),
            Self::Interactive(selector) => match selector.select_span(x, y, "Select fit range")? {
                Some((lower, upper)) => FitWindow::from_bounds(x, lower, upper),
                None => FitWindow::full(x.len()),
            },
        }
    }
}

/// Everything needed to perform a single fit.
#[derive(Debug, Clone)]
pub struct FitRequest<'a> {
    lineshape: LineShape,
    x: &'a [f64],
    y: &'a [f64],
    sigma: Option<&'a [f64]>,
    window: FitWindow,
    guess: InitialGuess,
}

impl<'a> FitRequest<'a> {
    /// Create a new [`FitRequest`] over all data points with a computed initial guess.
    ///
    /// # Errors
    ///
    /// This function will return an [`PlError::Configuration`] if `x` and `y` differ in length or
    /// are empty.
    pub fn new(lineshape: LineShape, x: &'a [f64], y: &'a [f64]) -> PlResult<Self> {
        if x.len() != y.len() {
            return Err(PlError::Configuration(format!(
                "x ({}) and y ({}) differ in length",
                x.len(),
                y.len()
            )));
        }
        Ok(Self {
            lineshape,
            x,
            y,
            sigma: None,
            window: FitWindow::full(x.len())?,
            guess: InitialGuess::default(),
        })
    }
    /// Use the given y errors for weighting the residuals.
    ///
    /// # Errors
    ///
    /// This function will return an [`PlError::Configuration`] if the errors differ in length from
    /// the data or are not all positive and finite.
    pub fn with_sigma(mut self, sigma: &'a [f64]) -> PlResult<Self> {
        if sigma.len() != self.y.len() {
            return Err(PlError::Configuration(format!(
                "y errors ({}) and y ({}) differ in length",
                sigma.len(),
                self.y.len()
            )));
        }
        if sigma.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(PlError::Configuration(
                "y errors must be positive and finite".into(),
            ));
        }
        self.sigma = Some(sigma);
        Ok(self)
    }
    /// Restrict the fit to `window`.
    ///
    /// # Errors
    ///
    /// This function will return an [`PlError::Configuration`] if the window does not fit the data.
    pub fn with_window(mut self, window: FitWindow) -> PlResult<Self> {
        self.window = FitWindow::new(window.lower_index, window.upper_index, self.x.len())?;
        Ok(self)
    }
    /// Restrict the fit to a window resolved from `range`.
    ///
    /// # Errors
    ///
    /// This function will return an error if the range cannot be resolved.
    pub fn with_range(mut self, range: FitRange<'_>) -> PlResult<Self> {
        self.window = range.resolve(self.x, self.y)?;
        Ok(self)
    }
    /// Set the initial guess.
    #[must_use]
    pub fn with_guess(mut self, guess: InitialGuess) -> Self {
        self.guess = guess;
        self
    }
    /// Returns the lineshape of this [`FitRequest`].
    #[must_use]
    pub const fn lineshape(&self) -> LineShape {
        self.lineshape
    }
    /// Returns the window of this [`FitRequest`].
    #[must_use]
    pub const fn window(&self) -> FitWindow {
        self.window
    }
    /// x values inside the fit window.
    #[must_use]
    pub fn x_window(&self) -> &'a [f64] {
        self.window.slice(self.x)
    }
    /// y values inside the fit window.
    #[must_use]
    pub fn y_window(&self) -> &'a [f64] {
        self.window.slice(self.y)
    }
    fn sigma_window(&self) -> Option<&'a [f64]> {
        self.sigma.map(|s| self.window.slice(s))
    }
    /// Resolve the initial guess into concrete start parameters.
    ///
    /// # Errors
    ///
    /// This function will return
    ///   - any error of the guess generator.
    ///   - [`PlError::Configuration`] if the number of parameters does not match the lineshape.
    pub fn initial_params(&self) -> PlResult<Vec<f64>> {
        let params = match &self.guess {
            InitialGuess::Fixed(p) => p.clone(),
            InitialGuess::Computed(f) => f(self.lineshape, self.x_window(), self.y_window())?,
        };
        self.lineshape.check_arity(&params)?;
        Ok(params)
    }
}

/// Outcome of a successful fit.
#[derive(Debug, Clone)]
pub struct FitResult {
    lineshape: LineShape,
    params: Vec<f64>,
    covariance: DMatrix<f64>,
    chi_square: f64,
    degrees_of_freedom: usize,
    iterations: usize,
    window: FitWindow,
}

impl FitResult {
    /// Returns the lineshape that was fitted.
    #[must_use]
    pub const fn lineshape(&self) -> LineShape {
        self.lineshape
    }
    /// Optimized parameters.
    #[must_use]
    pub fn params(&self) -> &[f64] {
        &self.params
    }
    /// Covariance matrix of the optimized parameters.
    #[must_use]
    pub const fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }
    /// One standard deviation errors of the parameters: `sqrt(diag(covariance))`.
    #[must_use]
    pub fn errors(&self) -> Vec<f64> {
        self.covariance
            .diagonal()
            .iter()
            .map(|v| v.max(0.0).sqrt())
            .collect()
    }
    /// Weighted sum of squared residuals at the optimum.
    #[must_use]
    pub const fn chi_square(&self) -> f64 {
        self.chi_square
    }
    /// Chi-square per degree of freedom (`NaN` without degrees of freedom).
    #[must_use]
    pub fn reduced_chi_square(&self) -> f64 {
        if self.degrees_of_freedom == 0 {
            f64::NAN
        } else {
            self.chi_square / usize_to_f64(self.degrees_of_freedom)
        }
    }
    /// Number of model evaluations the optimizer needed.
    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.iterations
    }
    /// The window the fit was performed on.
    #[must_use]
    pub const fn window(&self) -> FitWindow {
        self.window
    }
    /// Peak parameters if a peak lineshape was fitted.
    #[must_use]
    pub fn peak(&self) -> Option<PeakParams> {
        self.lineshape.peak_params(&self.params)
    }
    /// Full width at half maximum and its error if a peak lineshape was fitted.
    #[must_use]
    pub fn fwhm(&self) -> Option<(f64, f64)> {
        let peak = self.peak()?;
        let errors = self.errors();
        Some((fwhm_factor() * peak.sigma, fwhm_factor() * errors[2]))
    }
}

/// Levenberg-Marquardt least-squares fitter.
///
/// Minimizes `Σ (y_i − f(x_i; p))² / σ_i²` over the fit window of a [`FitRequest`]. Without y errors
/// all σ_i are 1 and the covariance is scaled with the reduced chi-square (relative weights).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveFitter {
    max_iterations: usize,
    tolerance: f64,
}

impl Default for CurveFitter {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1.0E-10,
        }
    }
}

impl CurveFitter {
    /// Create a new [`CurveFitter`] with the given iteration limit and relative tolerance.
    ///
    /// The iteration limit is handed to the optimizer as its patience: at most
    /// `max_iterations * (n_params + 1)` model evaluations are performed.
    ///
    /// # Errors
    ///
    /// This function will return an [`PlError::Configuration`] if `max_iterations` is zero or the
    /// tolerance is not positive and finite.
    pub fn new(max_iterations: usize, tolerance: f64) -> PlResult<Self> {
        if max_iterations == 0 {
            return Err(PlError::Configuration(
                "maximum number of iterations must be positive".into(),
            ));
        }
        if !tolerance.is_normal() || tolerance.is_sign_negative() {
            return Err(PlError::Configuration(
                "fit tolerance must be positive and finite".into(),
            ));
        }
        Ok(Self {
            max_iterations,
            tolerance,
        })
    }
    /// Returns the maximum number of iterations of this [`CurveFitter`].
    #[must_use]
    pub const fn max_iterations(&self) -> usize {
        self.max_iterations
    }
    /// Perform the fit described by `request`.
    ///
    /// # Errors
    ///
    /// This function will return
    ///   - [`PlError::Configuration`] if the parameter count does not match the lineshape or the
    ///     window holds fewer points than parameters.
    ///   - [`PlError::InitialGuess`] if a computed initial guess fails.
    ///   - [`PlError::FitConvergence`] if `JᵀJ` at the solution is singular, values become
    ///     non-finite or the iteration limit is reached.
    pub fn fit(&self, request: &FitRequest<'_>) -> PlResult<FitResult> {
        let shape = request.lineshape();
        let x = request.x_window();
        let y = request.y_window();
        let weights: Vec<f64> = request.sigma_window().map_or_else(
            || vec![1.0; x.len()],
            |s| s.iter().map(|s| 1.0 / s).collect(),
        );
        let params = request.initial_params()?;
        let n_params = params.len();
        if x.len() < n_params {
            return Err(PlError::Configuration(format!(
                "fit window contains {} points but {shape} has {n_params} parameters",
                x.len()
            )));
        }
        if params.iter().any(|p| !p.is_finite()) {
            return Err(PlError::FitConvergence(format!(
                "initial parameters {params:?} are not finite"
            )));
        }
        if !weighted_chi_square(shape, x, y, &weights, &params).is_finite() {
            return Err(PlError::FitConvergence(
                "residuals at initial parameters are not finite".into(),
            ));
        }
        let problem = LineShapeProblem {
            shape,
            x,
            y,
            weights: &weights,
            params: DVector::from_vec(params),
        };
        let (problem, report) = LevenbergMarquardt::new()
            .with_ftol(self.tolerance)
            .with_xtol(self.tolerance)
            .with_patience(self.max_iterations)
            .minimize(problem);
        if !report.termination.was_successful() {
            match &report.termination {
                // the optimizer cannot find a downhill step anymore: we sit in the minimum
                TerminationReason::NoImprovementPossible(reason) => {
                    debug!("{shape} fit stopped without further improvement ({reason})");
                }
                TerminationReason::LostPatience => {
                    return Err(PlError::FitConvergence(format!(
                        "no convergence within {} iterations",
                        self.max_iterations
                    )));
                }
                other => {
                    return Err(PlError::FitConvergence(format!(
                        "optimizer failed: {other:?}"
                    )));
                }
            }
        }
        let params: Vec<f64> = problem.params.iter().copied().collect();
        let chi_square = weighted_chi_square(shape, x, y, &weights, &params);
        if !chi_square.is_finite() || params.iter().any(|p| !p.is_finite()) {
            return Err(PlError::FitConvergence(
                "fit converged to non-finite values".into(),
            ));
        }
        let mut covariance = covariance(&weighted_jacobian(shape, x, &weights, &params))?;
        let degrees_of_freedom = x.len() - n_params;
        if request.sigma.is_none() && degrees_of_freedom > 0 {
            let scale = chi_square / usize_to_f64(degrees_of_freedom);
            covariance *= scale;
        }
        let iterations = report.number_of_evaluations;
        debug!("{shape} fit converged after {iterations} evaluations: {params:?}");
        Ok(FitResult {
            lineshape: shape,
            params,
            covariance,
            chi_square,
            degrees_of_freedom,
            iterations,
            window: request.window(),
        })
    }
}

/// Weighted residuals `(f(x_i; p) − y_i) / σ_i` of a lineshape as seen by the optimizer.
struct LineShapeProblem<'a> {
    shape: LineShape,
    x: &'a [f64],
    y: &'a [f64],
    weights: &'a [f64],
    params: DVector<f64>,
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for LineShapeProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, params: &DVector<f64>) {
        self.params.copy_from(params);
    }
    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }
    fn residuals(&self) -> Option<DVector<f64>> {
        let residuals =
            weighted_residuals(self.shape, self.x, self.y, self.weights, self.params.as_slice());
        residuals.iter().all(|r| r.is_finite()).then_some(residuals)
    }
    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let jacobian = weighted_jacobian(self.shape, self.x, self.weights, self.params.as_slice());
        jacobian.iter().all(|v| v.is_finite()).then_some(jacobian)
    }
}

/// Relative size of the smallest singular value of `JᵀJ` below which it counts as singular.
const SINGULAR_THRESHOLD: f64 = 1.0E-14;

/// Unscaled covariance `(JᵀWJ)⁻¹` from the weighted Jacobian at the optimum.
fn covariance(jacobian: &DMatrix<f64>) -> PlResult<DMatrix<f64>> {
    let normal = jacobian.tr_mul(jacobian);
    let singular_values = normal.clone().svd(false, false).singular_values;
    let largest = singular_values.max();
    let smallest = singular_values.min();
    if !(largest.is_finite() && smallest > SINGULAR_THRESHOLD * largest) {
        return Err(PlError::FitConvergence(
            "covariance matrix could not be estimated (singular)".into(),
        ));
    }
    normal.try_inverse().ok_or_else(|| {
        PlError::FitConvergence("covariance matrix could not be estimated (singular)".into())
    })
}

fn weighted_residuals(
    shape: LineShape,
    x: &[f64],
    y: &[f64],
    weights: &[f64],
    params: &[f64],
) -> DVector<f64> {
    DVector::from_iterator(
        x.len(),
        x.iter()
            .zip(y)
            .zip(weights)
            .map(|((x, y), w)| (shape.eval(*x, params) - y) * w),
    )
}

fn weighted_chi_square(
    shape: LineShape,
    x: &[f64],
    y: &[f64],
    weights: &[f64],
    params: &[f64],
) -> f64 {
    let squares: Vec<f64> = weighted_residuals(shape, x, y, weights, params)
        .iter()
        .map(|r| r * r)
        .collect();
    let sum: kahan::KahanSum<f64> = squares.iter().kahan_sum();
    sum.sum()
}

fn weighted_jacobian(shape: LineShape, x: &[f64], weights: &[f64], params: &[f64]) -> DMatrix<f64> {
    let rows: Vec<Vec<f64>> = x.iter().map(|x| shape.gradient(*x, params)).collect();
    DMatrix::from_fn(x.len(), params.len(), |i, j| rows[i][j] * weights[i])
}
