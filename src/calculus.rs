use crate::Real;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut, Scalar};

/// A function `f: R^n -> R^m`.
///
/// Evaluation takes `&self`: a function must not depend on mutable state, so that repeated
/// evaluations at the same point give the same result.
pub trait VectorFunction<T>
where
    T: Scalar,
{
    fn dimension(&self) -> usize;
    fn eval_into(&self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) -> eyre::Result<()>;
}

impl<T, X> VectorFunction<T> for &X
where
    T: Scalar,
    X: VectorFunction<T> + ?Sized,
{
    fn dimension(&self) -> usize {
        X::dimension(self)
    }

    fn eval_into(&self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) -> eyre::Result<()> {
        X::eval_into(self, f, x)
    }
}

/// A vector function with an analytically known Jacobian.
pub trait DifferentiableVectorFunction<T>: VectorFunction<T>
where
    T: Scalar,
{
    /// Evaluates the Jacobian `J_ij = df_i / dx_j` at `x`.
    fn eval_jacobian_into(&self, jacobian: &mut DMatrixViewMut<T>, x: &DVectorView<T>) -> eyre::Result<()>;
}

impl<T, X> DifferentiableVectorFunction<T> for &X
where
    T: Scalar,
    X: DifferentiableVectorFunction<T> + ?Sized,
{
    fn eval_jacobian_into(&self, jacobian: &mut DMatrixViewMut<T>, x: &DVectorView<T>) -> eyre::Result<()> {
        X::eval_jacobian_into(self, jacobian, x)
    }
}

/// Builds vector functions from closures.
///
/// ```
/// use nrsolve::calculus::VectorFunctionBuilder;
/// use nalgebra::{DVectorView, DVectorViewMut};
///
/// // f(x) = 3x + 6
/// let f = VectorFunctionBuilder::with_dimension(1)
///     .with_function(|f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>| {
///         f[0] = 3.0 * x[0] + 6.0;
///         Ok(())
///     });
/// # let _ = f;
/// ```
#[derive(Debug, Clone)]
pub struct VectorFunctionBuilder {
    dimension: usize,
}

#[derive(Debug, Clone)]
pub struct ConcreteVectorFunction<F, J> {
    dimension: usize,
    function: F,
    jacobian: J,
}

impl VectorFunctionBuilder {
    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn with_function<F, T>(self, function: F) -> ConcreteVectorFunction<F, ()>
    where
        T: Scalar,
        F: Fn(&mut DVectorViewMut<T>, &DVectorView<T>) -> eyre::Result<()>,
    {
        ConcreteVectorFunction {
            dimension: self.dimension,
            function,
            jacobian: (),
        }
    }
}

impl<F> ConcreteVectorFunction<F, ()> {
    pub fn with_jacobian<J, T>(self, jacobian: J) -> ConcreteVectorFunction<F, J>
    where
        T: Scalar,
        J: Fn(&mut DMatrixViewMut<T>, &DVectorView<T>) -> eyre::Result<()>,
    {
        ConcreteVectorFunction {
            dimension: self.dimension,
            function: self.function,
            jacobian,
        }
    }
}

impl<F, J, T> VectorFunction<T> for ConcreteVectorFunction<F, J>
where
    T: Scalar,
    F: Fn(&mut DVectorViewMut<T>, &DVectorView<T>) -> eyre::Result<()>,
{
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn eval_into(&self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) -> eyre::Result<()> {
        (self.function)(f, x)
    }
}

impl<F, J, T> DifferentiableVectorFunction<T> for ConcreteVectorFunction<F, J>
where
    T: Scalar,
    F: Fn(&mut DVectorViewMut<T>, &DVectorView<T>) -> eyre::Result<()>,
    J: Fn(&mut DMatrixViewMut<T>, &DVectorView<T>) -> eyre::Result<()>,
{
    fn eval_jacobian_into(&self, jacobian: &mut DMatrixViewMut<T>, x: &DVectorView<T>) -> eyre::Result<()> {
        (self.jacobian)(jacobian, x)
    }
}

/// Approximates the Jacobian of a vector function evaluated at `x`, using
/// forward finite differences with step size `dx`.
///
/// The Jacobian is the $m \times n$ matrix whose column $j$ is approximated by
/// $$ \frac{f(x + dx \, e_j) - f(x)}{dx}, $$
/// with $e_j$ the $j$-th basis vector. The approximation is first-order accurate in `dx`.
///
/// Errors returned by `f` are propagated unchanged.
pub fn approximate_jacobian<'a, T>(
    f: impl VectorFunction<T>,
    x: impl Into<DVectorView<'a, T>>,
    dx: T,
) -> eyre::Result<DMatrix<T>>
where
    T: Real,
{
    let x = x.into();
    let mut jacobian = DMatrix::zeros(f.dimension(), x.len());
    approximate_jacobian_into(&mut jacobian, f, x, dx)?;
    Ok(jacobian)
}

/// Same as [`approximate_jacobian`], but stores the result in the provided output matrix.
pub fn approximate_jacobian_into<'a, 'b, T>(
    jacobian: impl Into<DMatrixViewMut<'b, T>>,
    f: impl VectorFunction<T>,
    x: impl Into<DVectorView<'a, T>>,
    dx: T,
) -> eyre::Result<()>
where
    T: Real,
{
    let mut jacobian = jacobian.into();
    let x = x.into();
    let m = f.dimension();
    let n = x.len();
    assert_eq!(jacobian.nrows(), m, "Jacobian must have as many rows as the function dimension");
    assert_eq!(jacobian.ncols(), n, "Jacobian must have as many columns as x has entries");

    // f(x) is shared by every column
    let mut fx = DVector::zeros(m);
    f.eval_into(&mut DVectorViewMut::from(&mut fx), &x)?;

    let mut x_plus = x.clone_owned();
    let mut f_plus = DVector::zeros(m);

    for j in 0..n {
        let x_j = x_plus[j];
        x_plus[j] = x_j + dx;
        f.eval_into(&mut DVectorViewMut::from(&mut f_plus), &DVectorView::from(&x_plus))?;
        x_plus[j] = x_j;

        // J[.., j] := (f(x + dx e_j) - f(x)) / dx
        let mut df_dxj = jacobian.column_mut(j);
        df_dxj.copy_from(&f_plus);
        df_dxj -= &fx;
        df_dxj /= dx;
    }

    Ok(())
}
