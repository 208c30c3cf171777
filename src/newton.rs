use crate::calculus::{approximate_jacobian_into, DifferentiableVectorFunction, VectorFunction};
use crate::Real;
use log::debug;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut, Scalar};
use numeric_literals::replace_float_literals;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

#[derive(Debug, Clone)]
pub struct NewtonResult<T>
where
    T: Scalar,
{
    pub solution: DVector<T>,
    /// The number of Newton steps taken to reach `solution`.
    pub iterations: usize,
}

/// Settings for [`Newton`].
///
/// The iteration stops once `|f(x)|_2 < tolerance`.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NewtonSettings<T> {
    pub tolerance: T,
    pub max_iterations: usize,
    /// Step size used when the Jacobian is approximated with finite differences.
    pub finite_difference_step: T,
    /// If set, the solve fails as soon as an iterate is farther than this from the initial guess.
    pub max_radius: Option<T>,
}

impl<T> Default for NewtonSettings<T>
where
    T: Real,
{
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 20,
            finite_difference_step: 1e-6,
            max_radius: None,
        }
    }
}

#[derive(Debug)]
pub enum NewtonError<T> {
    /// The Jacobian system could not be solved, because the Jacobian is (numerically) singular.
    SingularJacobian,
    /// An iterate moved farther from the initial guess than the allowed radius.
    RadiusExceeded { iteration: usize, distance: T, radius: T },
    /// The procedure failed because the maximum number of iterations was reached.
    MaximumIterationsReached(usize),
    /// Evaluating the function failed.
    FunctionError(eyre::Report),
    /// Evaluating the analytic Jacobian failed.
    JacobianError(eyre::Report),
}

impl<T> Display for NewtonError<T>
where
    T: Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            NewtonError::SingularJacobian => {
                write!(f, "Failed to solve Jacobian system. Jacobian is singular.")
            }
            NewtonError::RadiusExceeded {
                iteration,
                distance,
                radius,
            } => {
                write!(
                    f,
                    "Iterate at iteration {} is at distance {} from the initial guess, \
                    exceeding the permitted radius {}.",
                    iteration, distance, radius
                )
            }
            NewtonError::MaximumIterationsReached(maxit) => {
                write!(f, "Failed to converge within maximum number of iterations ({}).", maxit)
            }
            NewtonError::FunctionError(err) => {
                write!(f, "Failed to evaluate function. Error: {}", err)
            }
            NewtonError::JacobianError(err) => {
                write!(f, "Failed to evaluate Jacobian. Error: {}", err)
            }
        }
    }
}

impl<T> Error for NewtonError<T>
where
    T: fmt::Debug + Display,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NewtonError::FunctionError(err) | NewtonError::JacobianError(err) => Some(&**err),
            _ => None,
        }
    }
}

/// Determines how [`Newton`] obtains the Jacobian of its function.
pub trait JacobianStrategy<T, F>
where
    T: Scalar,
{
    fn jacobian_into(
        &self,
        jacobian: &mut DMatrix<T>,
        function: &F,
        x: &DVectorView<T>,
        settings: &NewtonSettings<T>,
    ) -> Result<(), NewtonError<T>>;
}

/// Approximates the Jacobian with forward finite differences,
/// see [`approximate_jacobian`](crate::calculus::approximate_jacobian).
#[derive(Debug, Copy, Clone, Default)]
pub struct FiniteDifference;

impl<T, F> JacobianStrategy<T, F> for FiniteDifference
where
    T: Real,
    F: VectorFunction<T>,
{
    fn jacobian_into(
        &self,
        jacobian: &mut DMatrix<T>,
        function: &F,
        x: &DVectorView<T>,
        settings: &NewtonSettings<T>,
    ) -> Result<(), NewtonError<T>> {
        approximate_jacobian_into(&mut *jacobian, function, x, settings.finite_difference_step)
            .map_err(NewtonError::FunctionError)
    }
}

/// Uses the Jacobian provided by a [`DifferentiableVectorFunction`].
#[derive(Debug, Copy, Clone, Default)]
pub struct AnalyticJacobian;

impl<T, F> JacobianStrategy<T, F> for AnalyticJacobian
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
{
    fn jacobian_into(
        &self,
        jacobian: &mut DMatrix<T>,
        function: &F,
        x: &DVectorView<T>,
        _settings: &NewtonSettings<T>,
    ) -> Result<(), NewtonError<T>> {
        function
            .eval_jacobian_into(&mut DMatrixViewMut::from(jacobian), x)
            .map_err(NewtonError::JacobianError)
    }
}

/// Newton-Raphson solver for the non-linear equation `f(x) = 0`, with `f: R^n -> R^n`.
///
/// The solver itself holds no per-solve state: [`solve`](Self::solve) and [`step`](Self::step)
/// may be called any number of times, also concurrently if `F` is `Sync`.
#[derive(Debug, Clone)]
pub struct Newton<T, F, J = FiniteDifference>
where
    T: Scalar,
{
    function: F,
    settings: NewtonSettings<T>,
    jacobian: J,
}

impl<T, F> Newton<T, F, FiniteDifference>
where
    T: Real,
    F: VectorFunction<T>,
{
    /// A solver which approximates the Jacobian with finite differences.
    pub fn new(function: F, settings: NewtonSettings<T>) -> Self {
        Self {
            function,
            settings,
            jacobian: FiniteDifference,
        }
    }
}

impl<T, F> Newton<T, F, AnalyticJacobian>
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
{
    /// A solver which uses the analytic Jacobian of `function`.
    pub fn with_analytic_jacobian(function: F, settings: NewtonSettings<T>) -> Self {
        Self {
            function,
            settings,
            jacobian: AnalyticJacobian,
        }
    }
}

impl<T, F, J> Newton<T, F, J>
where
    T: Real,
    F: VectorFunction<T>,
    J: JacobianStrategy<T, F>,
{
    pub fn settings(&self) -> &NewtonSettings<T> {
        &self.settings
    }

    pub fn function(&self) -> &F {
        &self.function
    }

    /// Attempts to find a root of `f`, starting from the initial guess `x0`.
    ///
    /// The residual is checked before each step, so a root given as `x0` is returned as-is.
    /// After `max_iterations` steps, the last computed residual is compared against the
    /// tolerance once more (inclusively) before giving up.
    ///
    /// Panics if the dimension of `x0` does not match the dimension of the function.
    pub fn solve<'a>(&self, x0: impl Into<DVectorView<'a, T>>) -> Result<NewtonResult<T>, NewtonError<T>> {
        let x0 = x0.into();
        assert_eq!(
            x0.len(),
            self.function.dimension(),
            "Initial guess must have the same dimension as the function"
        );
        let settings = &self.settings;

        let mut x = x0.clone_owned();
        let mut fx = None;

        for iteration in 0..settings.max_iterations {
            let fx_k = self.residual(&DVectorView::from(&x))?;
            let residual_norm = fx_k.norm();
            debug!("Newton residual norm at iter {}: {}", iteration, residual_norm);
            if residual_norm < settings.tolerance {
                return Ok(NewtonResult {
                    solution: x,
                    iterations: iteration,
                });
            }

            x = self.step(&x, Some(&fx_k)).map_err(|err| {
                debug!("Newton step failed at iter {}: {}", iteration, err);
                err
            })?;
            fx = Some(fx_k);

            if let Some(radius) = settings.max_radius {
                let distance = (&x - &x0).norm();
                if distance > radius {
                    debug!(
                        "Newton iterate at iter {} left permitted radius {} (distance {})",
                        iteration, radius, distance
                    );
                    return Err(NewtonError::RadiusExceeded {
                        iteration,
                        distance,
                        radius,
                    });
                }
            }
        }

        // The residual checked here is the last one computed in the loop, i.e. the residual
        // *before* the final step. It can only pass if its norm equals the tolerance exactly.
        // Without any iterations, the residual at x0 is used instead.
        let fx = match fx {
            Some(fx) => fx,
            None => self.residual(&DVectorView::from(&x))?,
        };
        let residual_norm = fx.norm();
        if residual_norm <= settings.tolerance {
            Ok(NewtonResult {
                solution: x,
                iterations: settings.max_iterations,
            })
        } else {
            // Also reached for a NaN residual
            debug!(
                "Newton failed to converge within {} iterations (residual norm {})",
                settings.max_iterations, residual_norm
            );
            Err(NewtonError::MaximumIterationsReached(settings.max_iterations))
        }
    }

    /// Takes a single Newton step from `x`, returning `x - J(x)^{-1} f(x)`.
    ///
    /// If `fx` is provided, it is assumed that `fx = f(x)`.
    pub fn step<'a>(
        &self,
        x: impl Into<DVectorView<'a, T>>,
        fx: Option<&DVector<T>>,
    ) -> Result<DVector<T>, NewtonError<T>> {
        let x = x.into();
        let n = self.function.dimension();
        assert_eq!(x.len(), n, "x must have the same dimension as the function");

        let computed_fx;
        let fx = match fx {
            Some(fx) => fx,
            None => {
                computed_fx = self.residual(&x)?;
                &computed_fx
            }
        };
        assert_eq!(fx.len(), n, "f(x) must have the same dimension as the function");

        let mut jacobian = DMatrix::zeros(n, n);
        self.jacobian
            .jacobian_into(&mut jacobian, &self.function, &x, &self.settings)?;

        // Solve the system J h = f(x). An exactly zero pivot makes the LU solve fail,
        // a nearly zero pivot shows up as a non-finite step.
        let h = jacobian
            .lu()
            .solve(fx)
            .filter(|h| h.iter().all(|h_i| h_i.is_finite()))
            .ok_or(NewtonError::SingularJacobian)?;

        Ok(&x - &h)
    }

    fn residual(&self, x: &DVectorView<T>) -> Result<DVector<T>, NewtonError<T>> {
        let mut fx = DVector::zeros(self.function.dimension());
        self.function
            .eval_into(&mut DVectorViewMut::from(&mut fx), x)
            .map_err(NewtonError::FunctionError)?;
        Ok(fx)
    }
}
