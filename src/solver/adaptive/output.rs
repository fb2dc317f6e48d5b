//! Output accumulation for the requested times.
//!
//! Each requested time is written exactly once, in order. An accepted step may jump over several
//! requested times; those are recovered from the same Krylov basis with the exponential of the
//! j×j projected block evaluated at the intermediate offset.

use crate::error::KError;
use crate::matrix::expm;
use crate::solver::augmented::{TimeSpan, rescale_outputs};
use crate::solver::adaptive::basis::KrylovBasis;
use faer::Mat;

pub struct OutputCompositor<'t> {
    times: &'t [f64],
    span: TimeSpan,
    outputs: Vec<Vec<f64>>,
    next: usize,
    current: Vec<f64>,
}

impl<'t> OutputCompositor<'t> {
    /// Start from the initial state `u0` at τ = 0.
    pub fn new(times: &'t [f64], span: TimeSpan, u0: &[f64]) -> Self {
        Self {
            times,
            span,
            outputs: Vec::with_capacity(times.len()),
            next: 0,
            current: u0.to_vec(),
        }
    }

    /// State at the current τ_now.
    pub fn current(&self) -> &[f64] {
        &self.current
    }

    /// Number of outputs already written.
    pub fn written(&self) -> usize {
        self.next
    }

    /// Record an accepted step from `tau_now` to `tau_now + tau`.
    ///
    /// `f` is the exponential of the (j+1)×(j+1) projected block for the full step.
    pub fn advance(
        &mut self,
        basis: &KrylovBasis,
        tau_now: f64,
        tau: f64,
        f: &Mat<f64>,
    ) -> Result<(), KError> {
        let j = basis.size();
        let step_end = tau_now + tau;
        let n = self.current.len();

        while self.next < self.times.len() && self.times[self.next].abs() < step_end {
            let offset = self.times[self.next].abs() - tau_now;
            let f2 = expm(basis.leading_block(self.span.sign * offset).as_ref())?;
            let coeffs: Vec<f64> = (0..j).map(|i| f2[(i, 0)]).collect();
            let mut w = vec![0.0; n];
            basis.combine(&coeffs, &mut w);
            log::trace!("kiops output {} reached inside step at offset {:.6e}", self.next, offset);
            self.outputs.push(w);
            self.next += 1;
        }

        let coeffs: Vec<f64> = (0..j).map(|i| f[(i, 0)]).collect();
        basis.combine(&coeffs, &mut self.current);
        Ok(())
    }

    /// Assign the final state to every output not yet written and apply the optional rescaling.
    pub fn finish(mut self, rescale_by_time: bool) -> Vec<Vec<f64>> {
        while self.outputs.len() < self.times.len() {
            self.outputs.push(self.current.clone());
        }
        if rescale_by_time {
            rescale_outputs(&mut self.outputs, self.times);
        }
        self.outputs
    }
}
