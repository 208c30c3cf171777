use crate::unit_tests::linspace;
use eyre::eyre;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use nrsolve::calculus::*;
use nrsolve::polynomial::Polynomial;
use proptest::prelude::*;
use std::cell::Cell;

fn affine_function(a: DMatrix<f64>, b: DVector<f64>) -> impl VectorFunction<f64> {
    VectorFunctionBuilder::with_dimension(b.len()).with_function(
        move |f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>| {
            f.copy_from(&(&a * x + &b));
            Ok(())
        },
    )
}

#[test]
fn approximate_jacobian_scalar_affine_function() {
    let slope = 3.0;
    let f = VectorFunctionBuilder::with_dimension(1).with_function(
        |f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>| {
            f[0] = slope * x[0] + 6.0;
            Ok(())
        },
    );

    let x = DVector::from_column_slice(&[2.0]);
    let j = approximate_jacobian(&f, &x, 1e-3).unwrap();

    assert_eq!(j.shape(), (1, 1));
    assert_scalar_eq!(j[(0, 0)], slope, comp = abs, tol = 1e-3);
}

#[test]
fn approximate_jacobian_linear_function() {
    #[rustfmt::skip]
    let a = DMatrix::from_row_slice(2, 2,
                                    &[1.0, 2.0,
                                      3.0, 4.0]);
    let f = affine_function(a.clone(), DVector::zeros(2));

    let x = DVector::from_column_slice(&[5.0, 6.0]);
    let j = approximate_jacobian(&f, &x, 1e-6).unwrap();

    assert_eq!(j.shape(), (2, 2));
    assert_matrix_eq!(j, a, comp = abs, tol = 1e-6);
}

#[test]
fn approximate_jacobian_simple_function() {
    let f = VectorFunctionBuilder::with_dimension(2).with_function(
        |f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>| {
            let (x1, x2) = (x[0], x[1]);
            f[0] = x1 * x2 + 3.0;
            f[1] = x1 * x1 + x2 * x2 + x1 + 5.0;
            Ok(())
        },
    );

    let x = DVector::from_column_slice(&[3.0, 4.0]);
    let j = approximate_jacobian(&f, &x, 1e-6).unwrap();

    // J = [   x2           x1 ]
    //     [ 2*x1 + 1     2*x2 ]

    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(2, 2,
                                           &[4.0, 3.0,
                                             7.0, 8.0]);

    assert_matrix_eq!(j, expected, comp = abs, tol = 1e-4);
}

#[test]
fn approximate_jacobian_polynomial() {
    // p(x) = x^2 + 2x + 3
    let p = Polynomial::new(vec![1.0, 2.0, 3.0]);
    let dp_dx = Polynomial::new(vec![2.0, 2.0]);

    for x in linspace(-2.0, 2.0, 11) {
        let j = approximate_jacobian(&p, &DVector::from_column_slice(&[x]), 1e-6).unwrap();
        assert_eq!(j.shape(), (1, 1));
        assert_scalar_eq!(j[(0, 0)], dp_dx.eval(x), comp = abs, tol = 1e-5);
    }
}

#[test]
fn approximate_jacobian_separable_nonlinear_function() {
    let p = Polynomial::new(vec![2.0, -3.0, 0.0, 8.0]);
    let dp_dx = p.derivative();

    let f = VectorFunctionBuilder::with_dimension(2).with_function(
        |f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>| {
            f[0] = x[0].cos();
            f[1] = p.eval(x[1]);
            Ok(())
        },
    );

    for &(x1, x2) in &[(1.0, 1.0), (0.0, 3.0), (3.0, 0.0), (2.0, -3.0), (0.0, 0.0)] {
        let x = DVector::from_column_slice(&[x1, x2]);
        let j = approximate_jacobian(&f, &x, 1e-6).unwrap();

        #[rustfmt::skip]
        let expected = DMatrix::from_row_slice(2, 2,
                                               &[-x1.sin(), 0.0,
                                                 0.0,       dp_dx.eval(x2)]);
        assert_matrix_eq!(j, expected, comp = abs, tol = 1e-4);
    }
}

#[test]
fn approximate_jacobian_coupled_nonlinear_function() {
    let p = Polynomial::new(vec![2.0, -3.0, 0.0, 8.0]);
    let dp_dx = p.derivative();

    let f = VectorFunctionBuilder::with_dimension(2).with_function(
        |f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>| {
            f[0] = x[1] * x[0].cos();
            f[1] = x[0] * p.eval(x[1]);
            Ok(())
        },
    );

    for &(x1, x2) in &[(1.0, 1.0), (0.0, 3.0), (3.0, 0.0), (2.0, -3.0), (0.0, 0.0)] {
        let x = DVector::from_column_slice(&[x1, x2]);
        let j = approximate_jacobian(&f, &x, 1e-6).unwrap();

        #[rustfmt::skip]
        let expected = DMatrix::from_row_slice(2, 2,
                                               &[-x2 * x1.sin(), x1.cos(),
                                                 p.eval(x2),     x1 * dp_dx.eval(x2)]);
        assert_matrix_eq!(j, expected, comp = abs, tol = 1e-4);
    }
}

#[test]
fn approximate_jacobian_composed_function() {
    let f = VectorFunctionBuilder::with_dimension(1).with_function(
        |f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>| {
            let x = x[0];
            f[0] = (x * x).sin() + x * x.cos();
            Ok(())
        },
    );
    let df_dx = |x: f64| 2.0 * x * (x * x).cos() + x.cos() - x * x.sin();

    for x in linspace(-2.0, 2.0, 11) {
        let j = approximate_jacobian(&f, &DVector::from_column_slice(&[x]), 1e-6).unwrap();
        assert_scalar_eq!(j[(0, 0)], df_dx(x), comp = abs, tol = 1e-4);
    }
}

#[test]
fn approximate_jacobian_evaluates_baseline_once() {
    let evaluations = Cell::new(0);
    let f = VectorFunctionBuilder::with_dimension(3).with_function(
        |f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>| {
            evaluations.set(evaluations.get() + 1);
            f.copy_from(&x.map(|x_i| x_i * x_i));
            Ok(())
        },
    );

    let x = DVector::from_column_slice(&[1.0, 2.0, 3.0]);
    approximate_jacobian(&f, &x, 1e-6).unwrap();

    // One baseline evaluation plus one per column
    assert_eq!(evaluations.get(), 4);
}

#[test]
fn approximate_jacobian_into_overwrites_output() {
    let f = affine_function(DMatrix::identity(2, 2), DVector::zeros(2));
    let x = DVector::from_column_slice(&[1.0, -1.0]);

    let mut j = DMatrix::repeat(2, 2, 100.0);
    approximate_jacobian_into(&mut j, &f, &x, 1e-6).unwrap();

    assert_matrix_eq!(j, DMatrix::<f64>::identity(2, 2), comp = abs, tol = 1e-6);
}

#[test]
fn approximate_jacobian_propagates_function_error() {
    let f = VectorFunctionBuilder::with_dimension(1).with_function(
        |_: &mut DVectorViewMut<f64>, x: &DVectorView<f64>| {
            if x[0] > 1.0 {
                Err(eyre!("outside of domain"))
            } else {
                Ok(())
            }
        },
    );

    let err = approximate_jacobian(&f, &DVector::from_column_slice(&[1.0]), 1e-3).unwrap_err();
    assert_eq!(err.to_string(), "outside of domain");
}

#[test]
#[should_panic]
fn approximate_jacobian_into_panics_on_wrong_output_shape() {
    let f = affine_function(DMatrix::identity(2, 2), DVector::zeros(2));
    let mut j = DMatrix::zeros(3, 2);
    let _ = approximate_jacobian_into(&mut j, &f, &DVector::from_column_slice(&[0.0, 0.0]), 1e-6);
}

proptest! {
    #[test]
    fn approximate_jacobian_of_affine_function_is_its_matrix(x1 in -10.0..10.0, x2 in -10.0..10.0) {
        #[rustfmt::skip]
        let a = DMatrix::from_row_slice(2, 2,
                                        &[4.0, 1.0,
                                          2.0, 3.0]);
        let f = affine_function(a.clone(), DVector::from_column_slice(&[1.0, -2.0]));
        let x = DVector::from_column_slice(&[x1, x2]);
        let j = approximate_jacobian(&f, &x, 1e-6).unwrap();
        prop_assert!((j - a).norm() < 1e-6);
    }
}
