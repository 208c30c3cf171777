//! Newton-Raphson root finding for functions `f: R^n -> R^n`.
//!
//! The solver in [`newton`] repeatedly linearizes `f` around the current iterate and solves
//! the resulting dense linear system. The Jacobian is either supplied analytically or
//! approximated with forward finite differences, see [`calculus::approximate_jacobian`].
use nalgebra::RealField;

/// Function capabilities and numerical differentiation
pub mod calculus;
/// The Newton-Raphson solver
pub mod newton;
/// Callable polynomials evaluated with Horner's scheme
pub mod polynomial;

pub extern crate nalgebra;

/// Scalar type used throughout the crate.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}
