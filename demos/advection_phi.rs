//! 1-D periodic advection–diffusion: one exponential-Euler step with KIOPS, compared with the
//! fixed-step IMEX integrator treating diffusion implicitly.
//!
//! Run with `cargo run --example advection_phi`. Install any `log` backend to see the controller
//! decisions.

use kiops::parallel::{Comm, UniverseComm};
use kiops::{BackwardEuler, ComplexStepJacobian, FnOperator, ImexOptions, KiopsOptions, KiopsSolver, phi_imex};
use num_complex::Complex64;
use std::ops::{Add, Mul, Sub};

const N: usize = 128;
const SPEED: f64 = 1.0;
const NU: f64 = 5e-3;

/// Full right-hand side, generic so the complex-step Jacobian can evaluate it off the real axis.
fn rhs<T>(q: &[T], out: &mut [T])
where
    T: Copy + Add<Output = T> + Sub<Output = T> + Mul<f64, Output = T>,
{
    let dx = 1.0 / N as f64;
    for i in 0..N {
        let (l, r) = ((i + N - 1) % N, (i + 1) % N);
        let adv = (q[r] - q[l]) * (-SPEED / (2.0 * dx));
        let diff = (q[l] + q[r] - q[i] * 2.0) * (NU / (dx * dx));
        out[i] = adv + diff;
    }
}

fn diffusion(q: &[f64], out: &mut [f64]) {
    let dx = 1.0 / N as f64;
    for i in 0..N {
        let (l, r) = ((i + N - 1) % N, (i + 1) % N);
        out[i] = NU * (q[l] - 2.0 * q[i] + q[r]) / (dx * dx);
    }
}

fn advection(q: &[f64], out: &mut [f64]) {
    let dx = 1.0 / N as f64;
    for i in 0..N {
        let (l, r) = ((i + N - 1) % N, (i + 1) % N);
        out[i] = -SPEED * (q[r] - q[l]) / (2.0 * dx);
    }
}

fn main() -> Result<(), kiops::KError> {
    let comm = UniverseComm::from_features()?;
    let dt = 0.05;
    let q0: Vec<f64> = (0..N)
        .map(|i| {
            let x = i as f64 / N as f64 - 0.5;
            (-200.0 * x * x).exp()
        })
        .collect();

    // exponential Euler q1 = q0 + φ₁(dt·J)·dt·F(q0), evaluated at t = 1 with the operator dt·J
    let jac = ComplexStepJacobian::new(rhs::<Complex64>, q0.clone(), dt);
    let forcing: Vec<f64> = jac.rhs_at_point().iter().map(|f| dt * f).collect();
    let mut solver = KiopsSolver::new(KiopsOptions::default().with_tol(1e-9));
    let out = solver.solve(&[1.0], &jac, &[vec![0.0; N], forcing], &comm)?;
    let q_exp: Vec<f64> = q0.iter().zip(&out.w[0]).map(|(q, d)| q + d).collect();
    println!("kiops stats: {:?}", out.stats);

    // IMEX: advection explicit, diffusion implicit
    let imp = BackwardEuler::new(FnOperator(diffusion), N);
    let imex = phi_imex(&[dt], &FnOperator(advection), &imp, &[q0.clone()], &ImexOptions::default(), &comm)?;
    println!("imex stats: {:?}", imex.stats);

    let diff = q_exp
        .iter()
        .zip(&imex.w[0])
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    let mass0: f64 = comm.all_reduce(q0.iter().sum::<f64>());
    let mass1: f64 = comm.all_reduce(q_exp.iter().sum::<f64>());
    println!("max |kiops - imex| = {:.3e}", diff);
    println!("mass before = {:.6}, after = {:.6}", mass0, mass1);
    Ok(())
}
