//! Core operator traits for kiops.

/// Operator action: y ← A x.
///
/// The kernel treats implementations as pure mappings between vectors of the
/// same length. An implementation may perform its own collective communication
/// (halo exchange, for instance); that is invisible at this layer.
pub trait LinearOperator<T = f64> {
    /// Compute y = A · x.
    fn apply(&self, x: &[T], y: &mut [T]);
}

/// Inner products & norms.
pub trait InnerProduct {
    /// Compute dot(x, y).
    fn dot(&self, x: &[f64], y: &[f64]) -> f64;
    /// Compute ‖x‖₂.
    fn norm(&self, x: &[f64]) -> f64 {
        self.dot(x, x).sqrt()
    }
}

/// Step-scaled operator used by the implicit correction of the IMEX integrator.
///
/// Acts on augmented vectors (state rows followed by the augmentation tail).
pub trait ImplicitOperator {
    /// Compute y = M(tau) · x.
    fn apply_scaled(&self, tau: f64, x: &[f64], y: &mut [f64]);
}

impl<T, A: LinearOperator<T> + ?Sized> LinearOperator<T> for &A {
    fn apply(&self, x: &[T], y: &mut [T]) {
        (**self).apply(x, y)
    }
}
