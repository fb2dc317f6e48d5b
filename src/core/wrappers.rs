//! Wrappers for faer dense matrices, closures and inner products.
//!
//! This module provides implementations of the core operator traits for `faer::Mat`, `faer::MatRef`
//! and plain closures, enabling their use as the operator argument of the φ-function kernels. It also
//! provides the serial and the distributed (augmented) inner products used by every orthogonalization.
//!
//! # Features
//! - Matrix-vector multiplication for `faer` dense matrices.
//! - Closure operators through [`FnOperator`].
//! - Serial inner product and norm for slices, with optional Rayon parallelism.
//! - [`AugmentedInnerProduct`]: distributed inner product over a sharded state followed by a
//!   replicated augmentation tail.
//!
//! # References
//! - [faer crate documentation](https://docs.rs/faer)
//! - [num-traits crate documentation](https://docs.rs/num-traits)

use crate::core::traits::{InnerProduct, LinearOperator};
use crate::parallel::Comm;
use faer::{Mat, MatRef};
use num_traits::Float;

/// Implements matrix-vector multiplication for `faer::Mat`.
///
/// Computes `y = A * x` where `A` is a dense matrix, `x` and `y` are vectors.
impl<T: Float> LinearOperator<T> for Mat<T> {
    fn apply(&self, x: &[T], y: &mut [T]) {
        self.as_ref().apply(x, y)
    }
}

/// Implements matrix-vector multiplication for a matrix reference (`faer::MatRef`).
impl<'a, T: Float> LinearOperator<T> for MatRef<'a, T> {
    fn apply(&self, x: &[T], y: &mut [T]) {
        assert_eq!(self.nrows(), y.len(), "Output vector y has incorrect length");
        assert_eq!(self.ncols(), x.len(), "Input vector x has incorrect length");
        for i in 0..self.nrows() {
            y[i] = T::zero();
            for j in 0..self.ncols() {
                y[i] = y[i] + self[(i, j)] * x[j];
            }
        }
    }
}

/// Operator defined by a closure `|x, y| { ... }` writing A·x into `y`.
pub struct FnOperator<F>(pub F);

impl<F> LinearOperator<f64> for FnOperator<F>
where
    F: Fn(&[f64], &mut [f64]),
{
    fn apply(&self, x: &[f64], y: &mut [f64]) {
        (self.0)(x, y)
    }
}

/// Serial inner product for slices.
///
/// If the `rayon` feature is enabled, uses parallel iterators for performance.
impl InnerProduct for () {
    fn dot(&self, x: &[f64], y: &[f64]) -> f64 {
        assert_eq!(x.len(), y.len(), "Vectors must have the same length");
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            x.par_iter()
                .zip(y.par_iter())
                .map(|(xi, yi)| xi * yi)
                .sum()
        }
        #[cfg(not(feature = "rayon"))]
        {
            x.iter().zip(y.iter()).map(|(xi, yi)| xi * yi).sum()
        }
    }
}

/// Distributed inner product on augmented vectors.
///
/// The first `n` entries of every vector are this process' shard of the global state and are
/// reduced across processes; the trailing entries are the augmentation tail, replicated on every
/// process, and are added once after the reduction. Each call is one synchronization point.
pub struct AugmentedInnerProduct<'a, C: Comm + ?Sized> {
    /// Communicator performing the global sum.
    pub comm: &'a C,
    /// Local length of the distributed part.
    pub n: usize,
}

impl<'a, C: Comm + ?Sized> AugmentedInnerProduct<'a, C> {
    pub fn new(comm: &'a C, n: usize) -> Self {
        Self { comm, n }
    }
}

impl<C: Comm + ?Sized> InnerProduct for AugmentedInnerProduct<'_, C> {
    fn dot(&self, x: &[f64], y: &[f64]) -> f64 {
        assert_eq!(x.len(), y.len(), "Vectors must have the same length");
        let n = self.n.min(x.len());
        let shard = self.comm.dot(&x[..n], &y[..n]);
        let tail: f64 = x[n..].iter().zip(&y[n..]).map(|(a, b)| a * b).sum();
        shard + tail
    }
}
