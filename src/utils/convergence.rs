//! Convergence tracking & tolerance checks for iterative solvers.

/// Stopping criteria & stats.
#[derive(Clone, Debug)]
pub struct Convergence<T> {
    pub tol: T,
    pub max_iters: usize,
}

/// Outcome of a linear solve: iteration count, residual estimate and convergence flag.
#[derive(Clone, Debug, PartialEq)]
pub struct SolveStats<T> {
    pub iterations: usize,
    pub final_residual: T,
    pub converged: bool,
}

impl<T: Copy + num_traits::Float> Convergence<T> {
    /// Returns (should_stop, stats) given current `res_norm` and iteration `i`.
    ///
    /// Hitting `max_iters` stops the iteration but does not count as convergence.
    pub fn check(
        &self,
        res_norm: T,
        res0_norm: T,
        i: usize,
    ) -> (bool, SolveStats<T>) {
        let rel = if res0_norm > T::zero() { res_norm / res0_norm } else { res_norm };
        let converged = rel <= self.tol;
        (
            converged || i >= self.max_iters,
            SolveStats {
                iterations: i,
                final_residual: res_norm,
                converged,
            },
        )
    }
}
