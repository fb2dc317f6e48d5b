//! Dense matrix exponential on top of Faer.
//!
//! Scaling and squaring with diagonal Padé approximants of degree 3, 5, 7, 9 or 13, selected from
//! the 1-norm of the argument. The projected operators handled by the Krylov kernels are at most a
//! few hundred rows, so every product here is a plain dense `faer` multiply and the rational
//! approximant is resolved with a partial-pivoting LU.
//!
//! # References
//! - Higham, N. J. (2005). The scaling and squaring method for the matrix exponential revisited.
//!   SIAM J. Matrix Anal. Appl. 26(4), 1179–1193.

use crate::error::KError;
use faer::prelude::*;
use faer::{Mat, MatRef};

const PADE3: [f64; 4] = [120.0, 60.0, 12.0, 1.0];
const PADE5: [f64; 6] = [30240.0, 15120.0, 3360.0, 420.0, 30.0, 1.0];
const PADE7: [f64; 8] = [17297280.0, 8648640.0, 1995840.0, 277200.0, 25200.0, 1512.0, 56.0, 1.0];
const PADE9: [f64; 10] = [
    17643225600.0, 8821612800.0, 2075673600.0, 302702400.0, 30270240.0, 2162160.0, 110880.0,
    3960.0, 90.0, 1.0,
];
const PADE13: [f64; 14] = [
    64764752532480000.0, 32382376266240000.0, 7771770303897600.0, 1187353796428800.0,
    129060195264000.0, 10559470521600.0, 670442572800.0, 33522128640.0, 1323241920.0,
    40840800.0, 960960.0, 16380.0, 182.0, 1.0,
];

// Largest 1-norm for which each degree reaches double-precision backward error.
const THETA3: f64 = 1.495585217958292e-2;
const THETA5: f64 = 2.539398330063230e-1;
const THETA7: f64 = 9.504178996162932e-1;
const THETA9: f64 = 2.097847961257068e0;
const THETA13: f64 = 5.371920351148152e0;

/// Maximum absolute column sum.
pub fn norm1(a: MatRef<'_, f64>) -> f64 {
    (0..a.ncols())
        .map(|j| (0..a.nrows()).map(|i| a[(i, j)].abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// Compute exp(A) for a square dense matrix.
pub fn expm(a: MatRef<'_, f64>) -> Result<Mat<f64>, KError> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(KError::DimensionMismatch { expected: n, found: a.ncols() });
    }
    if n == 0 {
        return Ok(Mat::zeros(0, 0));
    }
    let nrm = norm1(a);
    if !nrm.is_finite() {
        return Err(KError::NonFinite("dense exponential argument"));
    }

    let a = a.to_owned();
    if nrm <= THETA3 {
        return pade_low(&a, &PADE3);
    }
    if nrm <= THETA5 {
        return pade_low(&a, &PADE5);
    }
    if nrm <= THETA7 {
        return pade_low(&a, &PADE7);
    }
    if nrm <= THETA9 {
        return pade_low(&a, &PADE9);
    }

    let s = (nrm / THETA13).log2().ceil().max(0.0) as i32;
    let scale = 2f64.powi(-s);
    let scaled = Mat::from_fn(n, n, |i, j| scale * a[(i, j)]);
    let mut x = pade13(&scaled)?;
    for _ in 0..s {
        x = &x * &x;
    }
    Ok(x)
}

fn combine(n: usize, terms: &[(f64, &Mat<f64>)]) -> Mat<f64> {
    Mat::from_fn(n, n, |i, j| terms.iter().map(|(c, m)| c * m[(i, j)]).sum())
}

/// Diagonal Padé approximant of degree `b.len() - 1` (odd, at most 9).
fn pade_low(a: &Mat<f64>, b: &[f64]) -> Result<Mat<f64>, KError> {
    let n = a.nrows();
    let a2 = a * a;
    // even powers I, A², A⁴, ...
    let mut powers = vec![Mat::<f64>::identity(n, n), a2.clone()];
    while powers.len() < b.len() / 2 {
        let next = powers.last().map(|p| p * &a2).unwrap_or_else(|| a2.clone());
        powers.push(next);
    }
    let odd: Vec<(f64, &Mat<f64>)> = powers.iter().enumerate().map(|(k, p)| (b[2 * k + 1], p)).collect();
    let even: Vec<(f64, &Mat<f64>)> = powers.iter().enumerate().map(|(k, p)| (b[2 * k], p)).collect();
    let odd_sum = combine(n, &odd);
    let u = a * &odd_sum;
    let v = combine(n, &even);
    solve_pade(&u, &v)
}

fn pade13(a: &Mat<f64>) -> Result<Mat<f64>, KError> {
    let n = a.nrows();
    let b = &PADE13;
    let id = Mat::<f64>::identity(n, n);
    let a2 = a * a;
    let a4 = &a2 * &a2;
    let a6 = &a4 * &a2;
    let u_hi = combine(n, &[(b[13], &a6), (b[11], &a4), (b[9], &a2)]);
    let u_lo = combine(n, &[(b[7], &a6), (b[5], &a4), (b[3], &a2), (b[1], &id)]);
    let inner = &(&a6 * &u_hi) + &u_lo;
    let u = a * &inner;
    let v_hi = combine(n, &[(b[12], &a6), (b[10], &a4), (b[8], &a2)]);
    let v_lo = combine(n, &[(b[6], &a6), (b[4], &a4), (b[2], &a2), (b[0], &id)]);
    let v = &(&a6 * &v_hi) + &v_lo;
    solve_pade(&u, &v)
}

/// Solve (V - U) X = (V + U).
fn solve_pade(u: &Mat<f64>, v: &Mat<f64>) -> Result<Mat<f64>, KError> {
    let n = u.nrows();
    let q = Mat::from_fn(n, n, |i, j| v[(i, j)] - u[(i, j)]);
    let rhs = Mat::from_fn(n, n, |i, j| v[(i, j)] + u[(i, j)]);
    let x = q.as_ref().partial_piv_lu().solve(&rhs);
    for j in 0..n {
        for i in 0..n {
            if !x[(i, j)].is_finite() {
                return Err(KError::NonFinite("Padé denominator solve"));
            }
        }
    }
    Ok(x)
}
