use crate::calculus::{DifferentiableVectorFunction, VectorFunction};
use crate::Real;
use nalgebra::{DMatrixViewMut, DVectorView, DVectorViewMut};
use std::fmt;

/// A polynomial in a single variable.
///
/// Coefficients are stored with the highest degree first, so that
/// `Polynomial::new(vec![1.0, 2.0, 3.0])` represents `p(x) = x^2 + 2x + 3`.
///
/// As a [`VectorFunction`], the polynomial is a function `R^1 -> R^1`
/// and its Jacobian is the 1x1 matrix `[p'(x)]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial<T> {
    coefficients: Vec<T>,
}

impl<T> Polynomial<T>
where
    T: Real,
{
    pub fn new(coefficients: impl Into<Vec<T>>) -> Self {
        Self {
            coefficients: coefficients.into(),
        }
    }

    pub fn coefficients(&self) -> &[T] {
        &self.coefficients
    }

    /// The degree of the polynomial, as given by the number of stored coefficients.
    ///
    /// Leading zero coefficients are not stripped. The empty polynomial has degree zero.
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    /// Evaluates `p(x)` with Horner's scheme.
    pub fn eval(&self, x: T) -> T {
        match self.coefficients.split_first() {
            Some((&leading, rest)) => rest.iter().fold(leading, |p, &c| p * x + c),
            None => T::zero(),
        }
    }

    /// Evaluates `p(x)` and `p'(x)` in a single Horner pass.
    pub fn eval_with_derivative(&self, x: T) -> (T, T) {
        match self.coefficients.split_first() {
            Some((&leading, rest)) => rest.iter().fold((leading, T::zero()), |(p, dp), &c| {
                (p * x + c, dp * x + p)
            }),
            None => (T::zero(), T::zero()),
        }
    }

    pub fn derivative(&self) -> Self {
        let degree = self.degree();
        let coefficients = self
            .coefficients
            .iter()
            .take(degree)
            .enumerate()
            .map(|(i, &c)| c * nalgebra::convert::<f64, T>((degree - i) as f64))
            .collect::<Vec<_>>();
        Self { coefficients }
    }
}

impl<T> fmt::Display for Polynomial<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Polynomial(")?;
        for (i, c) in self.coefficients.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, ")")
    }
}

impl<T> VectorFunction<T> for Polynomial<T>
where
    T: Real,
{
    fn dimension(&self) -> usize {
        1
    }

    fn eval_into(&self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) -> eyre::Result<()> {
        f[0] = self.eval(x[0]);
        Ok(())
    }
}

impl<T> DifferentiableVectorFunction<T> for Polynomial<T>
where
    T: Real,
{
    fn eval_jacobian_into(&self, jacobian: &mut DMatrixViewMut<T>, x: &DVectorView<T>) -> eyre::Result<()> {
        let (_, dp_dx) = self.eval_with_derivative(x[0]);
        jacobian[(0, 0)] = dp_dx;
        Ok(())
    }
}
