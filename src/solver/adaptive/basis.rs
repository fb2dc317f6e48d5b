//! Incomplete orthogonalization (IOM) of the augmented Krylov subspace.
//!
//! [`KrylovBasis`] is a reusable arena holding up to `mmax + 1` basis vectors of length n + p and the
//! `(mmax + 1) × (mmax + 1)` projected operator. It is seeded at the start of every attempt and then
//! grown one vector at a time: each candidate is orthogonalized against the last `iop` vectors only,
//! so a Krylov step costs at most `iop + 1` global reductions regardless of the subspace size.
//!
//! # References
//! - Gaudreault, S., Rainwater, G. and Tokman, M. (2018). KIOPS: A fast adaptive Krylov subspace
//!   solver for exponential integrators. J. Comput. Phys. 372, 236–255.
//! - Saad, Y. (2003). Iterative Methods for Sparse Linear Systems, 2nd Edition. SIAM. §6.4.2

use crate::core::traits::{InnerProduct, LinearOperator};
use crate::error::KError;
use crate::solver::augmented::PhiInputs;
use faer::{Mat, MatRef};

/// How basis growth stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    /// Reached the requested size.
    Full,
    /// The candidate vector vanished: the subspace is invariant.
    HappyBreakdown,
}

/// Krylov basis and projected operator storage.
pub struct KrylovBasis {
    n: usize,
    p: usize,
    mmax: usize,
    v: Vec<Vec<f64>>,
    h: Mat<f64>,
    j: usize,
    used: usize,
    beta: f64,
}

impl KrylovBasis {
    pub fn new(n: usize, p: usize, mmax: usize) -> Self {
        Self {
            n,
            p,
            mmax,
            v: vec![vec![0.0; n + p]; mmax + 1],
            h: Mat::zeros(mmax + 1, mmax + 1),
            j: 0,
            used: mmax + 1,
            beta: 0.0,
        }
    }

    /// True if the arena can be reused for a problem of this shape.
    pub fn fits(&self, n: usize, p: usize, mmax: usize) -> bool {
        self.n == n && self.p == p && self.mmax == mmax
    }

    /// Current basis size j (index of the last candidate built).
    pub fn size(&self) -> usize {
        self.j
    }

    /// Norm of the seed vector.
    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn vector(&self, i: usize) -> &[f64] {
        &self.v[i]
    }

    pub fn hessenberg(&self) -> MatRef<'_, f64> {
        self.h.as_ref()
    }

    /// Seed the basis with `[state; tail] / β` and clear the projected operator.
    ///
    /// Returns β, the global norm of the seed. A zero β leaves the basis empty.
    pub fn seed<IP: InnerProduct + ?Sized>(
        &mut self,
        state: &[f64],
        tail: &[f64],
        ip: &IP,
    ) -> Result<f64, KError> {
        for col in 0..self.used {
            for row in 0..self.used {
                self.h[(row, col)] = 0.0;
            }
        }
        self.used = 0;
        self.j = 0;

        let n = self.n;
        let v0 = &mut self.v[0];
        v0[..n].copy_from_slice(state);
        v0[n..].copy_from_slice(tail);
        let beta = ip.norm(&v0[..]);
        if !beta.is_finite() {
            return Err(KError::NonFinite("norm of the Krylov seed vector"));
        }
        self.beta = beta;
        if beta > 0.0 {
            let inv = 1.0 / beta;
            v0.iter_mut().for_each(|x| *x *= inv);
        }
        Ok(beta)
    }

    /// Grow the basis until it holds `m` new vectors or breaks down.
    ///
    /// Returns how growth stopped and the number of completed (normalized) Krylov steps.
    pub fn grow<A, IP>(
        &mut self,
        a: &A,
        inputs: &PhiInputs,
        m: usize,
        iop: usize,
        tol: f64,
        ip: &IP,
    ) -> Result<(Growth, usize), KError>
    where
        A: LinearOperator<f64> + ?Sized,
        IP: InnerProduct + ?Sized,
    {
        let m = m.min(self.mmax);
        let mut steps = 0;
        while self.j < m {
            self.j += 1;
            let j = self.j;
            self.used = j + 1;
            let (done, rest) = self.v.split_at_mut(j);
            let next = &mut rest[0];
            inputs.apply(a, &done[j - 1], next);

            // Modified Gram-Schmidt against the window
            for (i, vi) in done.iter().enumerate().skip(j.saturating_sub(iop)) {
                let hij = ip.dot(vi, &next[..]);
                self.h[(i, j - 1)] = hij;
                for (nk, vik) in next.iter_mut().zip(vi) {
                    *nk -= hij * vik;
                }
            }

            let nrm = ip.norm(&next[..]);
            log::trace!("kiops krylov step {}: norm = {:.6e}", j, nrm);
            if !nrm.is_finite() {
                return Err(KError::NonFinite("Krylov vector norm"));
            }
            if nrm < tol {
                return Ok((Growth::HappyBreakdown, steps));
            }
            self.h[(j, j - 1)] = nrm;
            let inv = 1.0 / nrm;
            next.iter_mut().for_each(|x| *x *= inv);
            steps += 1;
        }
        Ok((Growth::Full, steps))
    }

    /// Coefficient h_{j, j-1} linking the subspace to the next, unbuilt vector.
    pub fn exit_coefficient(&self) -> f64 {
        if self.j == 0 { 0.0 } else { self.h[(self.j, self.j - 1)] }
    }

    /// `scale · Ĥ` for the (j+1)×(j+1) leading block, where Ĥ is the projected operator with the
    /// exit coefficient removed and a unit entry at (0, j) exposing φ₁ for the error estimate.
    pub fn projected(&self, scale: f64) -> Mat<f64> {
        let j = self.j;
        Mat::from_fn(j + 1, j + 1, |r, c| {
            if r == 0 && c == j {
                scale
            } else if r == j && c + 1 == j {
                0.0
            } else {
                scale * self.h[(r, c)]
            }
        })
    }

    /// `scale · H` for the j×j leading block.
    pub fn leading_block(&self, scale: f64) -> Mat<f64> {
        let j = self.j;
        Mat::from_fn(j, j, |r, c| scale * self.h[(r, c)])
    }

    /// out = β · V[:n, :len] · coeffs
    pub fn combine(&self, coeffs: &[f64], out: &mut [f64]) {
        let n = self.n;
        out.iter_mut().for_each(|x| *x = 0.0);
        for (c, vc) in coeffs.iter().zip(&self.v) {
            let s = self.beta * c;
            for (o, x) in out.iter_mut().zip(&vc[..n]) {
                *o += s * x;
            }
        }
    }
}
