//! Augmented-operator form of a φ-function combination.
//!
//! The combination `w(t) = φ₀(tA)u₀ + t φ₁(tA)u₁ + … + tᵖ φₚ(tA)uₚ` is the solution of a homogeneous
//! linear ODE in n + p unknowns. The state rows evolve under `A` plus the higher input columns
//! (flipped, scaled by ν) weighted by a polynomial tail; the tail rows shift up by one each
//! application. [`PhiInputs`] owns that construction so both the adaptive kernel and the IMEX
//! integrator apply exactly the same augmented operator.

use crate::core::traits::LinearOperator;
use crate::error::KError;
use crate::parallel::Comm;

/// Flipped, normalized higher-order inputs and the matching tail scaling.
pub struct PhiInputs {
    /// Local state length
    pub n: usize,
    /// Number of augmentation rows (at least one)
    pub p: usize,
    /// Scaling of the flipped columns, 2^-⌈log₂‖u₁..ₚ‖₁⌉
    pub nu: f64,
    /// Scaling of the tail, 1/ν; zero when every higher column vanishes
    pub mu: f64,
    /// `u_flip[k] = ν·u[p - k]`
    pub u_flip: Vec<Vec<f64>>,
}

impl PhiInputs {
    /// Check the input columns, compute the global 1-norm of the higher-order columns and
    /// build the flipped block. One collective (`all_reduce_slice`) when p ≥ 1.
    pub fn new<V, C>(u: &[V], comm: &C) -> Result<Self, KError>
    where
        V: AsRef<[f64]>,
        C: Comm + ?Sized,
    {
        let first = u
            .first()
            .ok_or_else(|| KError::InvalidInput("at least one input vector is required".into()))?;
        let n = first.as_ref().len();
        if n == 0 {
            return Err(KError::InvalidInput("input vectors must not be empty".into()));
        }
        for col in u {
            if col.as_ref().len() != n {
                return Err(KError::DimensionMismatch { expected: n, found: col.as_ref().len() });
            }
        }

        let ppo = u.len();
        // p = 0 is padded with one zero column
        let p = (ppo - 1).max(1);

        let mut col_sums: Vec<f64> = u[1..]
            .iter()
            .map(|c| c.as_ref().iter().map(|x| x.abs()).sum())
            .collect();
        let norm_u = if col_sums.is_empty() {
            0.0
        } else {
            comm.all_reduce_slice(&mut col_sums);
            col_sums.iter().copied().fold(0.0, f64::max)
        };
        if !norm_u.is_finite() {
            return Err(KError::NonFinite("1-norm of the input columns"));
        }

        let (nu, mu) = if norm_u > 0.0 {
            let ex = norm_u.log2().ceil() as i32;
            (2f64.powi(-ex), 2f64.powi(ex))
        } else {
            (1.0, 0.0)
        };

        let u_flip = (0..p)
            .map(|k| {
                let col = p - k;
                if col < ppo {
                    u[col].as_ref().iter().map(|x| nu * x).collect()
                } else {
                    vec![0.0; n]
                }
            })
            .collect();

        Ok(Self { n, p, nu, mu, u_flip })
    }

    /// Augmented length n + p.
    pub fn len(&self) -> usize {
        self.n + self.p
    }

    /// Tail at time `tau_now`: `μ·τᵢ/i!` with i = p-1-k, the last entry being μ.
    pub fn tail(&self, tau_now: f64, out: &mut [f64]) {
        let p = self.p;
        for (k, slot) in out.iter_mut().enumerate().take(p) {
            let i = p - 1 - k;
            *slot = self.mu * tau_now.powi(i as i32) / factorial(i);
        }
    }

    /// y = Â x for the augmented operator Â = [[A, U_flip], [0, shift]].
    pub fn apply<A: LinearOperator<f64> + ?Sized>(&self, a: &A, x: &[f64], y: &mut [f64]) {
        let (n, p) = (self.n, self.p);
        a.apply(&x[..n], &mut y[..n]);
        for (k, col) in self.u_flip.iter().enumerate() {
            let coef = x[n + k];
            if coef != 0.0 {
                for (yi, ci) in y[..n].iter_mut().zip(col) {
                    *yi += coef * ci;
                }
            }
        }
        y[n..n + p - 1].copy_from_slice(&x[n + 1..n + p]);
        y[n + p - 1] = 0.0;
    }
}

fn factorial(i: usize) -> f64 {
    (1..=i).map(|k| k as f64).product()
}

/// Validated output times: target |t_end| and the common sign.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSpan {
    pub tau_end: f64,
    pub sign: f64,
}

/// Output times must be non-empty, finite, share one sign and be ordered by magnitude.
pub fn validate_times(times: &[f64], rescale_by_time: bool) -> Result<TimeSpan, KError> {
    let last = *times
        .last()
        .ok_or_else(|| KError::InvalidInput("at least one output time is required".into()))?;
    if times.iter().any(|t| !t.is_finite()) {
        return Err(KError::InvalidInput("output times must be finite".into()));
    }
    let sign = if last < 0.0 { -1.0 } else { 1.0 };
    if times.iter().any(|&t| t * sign < 0.0) {
        return Err(KError::InvalidInput("output times must share a common sign".into()));
    }
    if times.windows(2).any(|w| w[1].abs() < w[0].abs()) {
        return Err(KError::InvalidInput("output times must be ordered".into()));
    }
    if rescale_by_time && times.iter().any(|&t| t == 0.0) {
        return Err(KError::InvalidInput("cannot rescale an output at time zero".into()));
    }
    Ok(TimeSpan { tau_end: last.abs(), sign })
}

/// Divide each output by its (signed) output time.
pub fn rescale_outputs(w: &mut [Vec<f64>], times: &[f64]) {
    for (wk, &t) in w.iter_mut().zip(times) {
        for x in wk.iter_mut() {
            *x /= t;
        }
    }
}
