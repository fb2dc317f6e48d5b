//! Options for the φ-function kernels.
//!
//! [`KiopsOptions`] configures the adaptive Krylov kernel and [`ImexOptions`] the fixed-step IMEX
//! companion. Both are plain data with builder-style setters; `validate` is called by the solvers
//! before any work is done.

use crate::error::KError;

/// Adaptive Krylov kernel parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct KiopsOptions {
    /// Local error tolerance per unit time
    pub tol: f64,
    /// Initial estimate of the Krylov subspace size
    pub m_init: usize,
    /// Smallest subspace size the controller may choose
    pub mmin: usize,
    /// Largest subspace size the controller may choose. At least 2: with a single basis vector the
    /// error estimate does not depend on the step size.
    pub mmax: usize,
    /// Orthogonalization window of the incomplete Arnoldi process
    pub iop: usize,
    /// Divide each output by its output time
    pub rescale_by_time: bool,
    /// Cap on controller decisions (accepted + rejected)
    pub max_iterations: usize,
    /// Cap on consecutive rejections
    pub max_rejections: usize,
}

impl Default for KiopsOptions {
    fn default() -> Self {
        Self {
            tol: 1e-7,
            m_init: 10,
            mmin: 10,
            mmax: 128,
            iop: 2,
            rescale_by_time: false,
            max_iterations: 10_000,
            max_rejections: 64,
        }
    }
}

impl KiopsOptions {
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set the admissible subspace sizes.
    pub fn with_subspace_bounds(mut self, mmin: usize, mmax: usize) -> Self {
        self.mmin = mmin;
        self.mmax = mmax;
        self
    }

    pub fn with_initial_subspace(mut self, m_init: usize) -> Self {
        self.m_init = m_init;
        self
    }

    pub fn with_orthogonalization_window(mut self, iop: usize) -> Self {
        self.iop = iop;
        self
    }

    pub fn with_rescale_by_time(mut self, rescale: bool) -> Self {
        self.rescale_by_time = rescale;
        self
    }

    pub fn with_limits(mut self, max_iterations: usize, max_rejections: usize) -> Self {
        self.max_iterations = max_iterations;
        self.max_rejections = max_rejections;
        self
    }

    /// Starting subspace size, clamped to `[mmin, mmax]`.
    pub fn initial_m(&self) -> usize {
        self.m_init.clamp(self.mmin, self.mmax)
    }

    pub fn validate(&self) -> Result<(), KError> {
        if self.tol.is_nan() || self.tol <= 0.0 || self.tol.is_infinite() {
            return Err(KError::InvalidInput(format!("tolerance must be positive, got {}", self.tol)));
        }
        if self.mmin == 0 || self.mmin > self.mmax || self.mmax < 2 {
            return Err(KError::InvalidInput(format!(
                "subspace bounds must satisfy 1 <= mmin <= mmax and mmax >= 2, got mmin = {}, mmax = {}",
                self.mmin, self.mmax
            )));
        }
        if self.iop == 0 {
            return Err(KError::InvalidInput("orthogonalization window must be at least 1".into()));
        }
        if self.max_iterations == 0 {
            return Err(KError::InvalidInput("max_iterations must be at least 1".into()));
        }
        Ok(())
    }
}

/// Fixed-step IMEX parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ImexOptions {
    /// Number of substeps across the whole span
    pub n_steps: usize,
    /// Divide each output by its output time
    pub rescale_by_time: bool,
}

impl Default for ImexOptions {
    fn default() -> Self {
        Self { n_steps: 200, rescale_by_time: false }
    }
}

impl ImexOptions {
    pub fn with_steps(mut self, n_steps: usize) -> Self {
        self.n_steps = n_steps;
        self
    }

    pub fn with_rescale_by_time(mut self, rescale: bool) -> Self {
        self.rescale_by_time = rescale;
        self
    }

    pub fn validate(&self) -> Result<(), KError> {
        if self.n_steps == 0 {
            return Err(KError::InvalidInput("IMEX needs at least one step".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = KiopsOptions::default();
        assert_eq!(opts.tol, 1e-7);
        assert_eq!((opts.mmin, opts.mmax, opts.iop), (10, 128, 2));
        assert_eq!(opts.initial_m(), 10);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn initial_m_is_clamped() {
        let opts = KiopsOptions::default().with_subspace_bounds(4, 8).with_initial_subspace(50);
        assert_eq!(opts.initial_m(), 8);
        let opts = opts.with_initial_subspace(1);
        assert_eq!(opts.initial_m(), 4);
    }

    #[test]
    fn rejects_bad_bounds() {
        let opts = KiopsOptions::default().with_subspace_bounds(20, 10);
        assert!(matches!(opts.validate(), Err(KError::InvalidInput(_))));
        let opts = KiopsOptions::default().with_subspace_bounds(1, 1);
        assert!(matches!(opts.validate(), Err(KError::InvalidInput(_))));
        assert!(KiopsOptions::default().with_subspace_bounds(1, 2).validate().is_ok());
        let opts = KiopsOptions::default().with_tol(0.0);
        assert!(opts.validate().is_err());
        let opts = KiopsOptions::default().with_orthogonalization_window(0);
        assert!(opts.validate().is_err());
        assert!(ImexOptions::default().with_steps(0).validate().is_err());
    }
}
