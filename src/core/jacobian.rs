//! Jacobian-vector products built from a nonlinear right-hand side.
//!
//! Exponential integrators never form the Jacobian of the right-hand side; they only need its
//! action on Krylov vectors, taken at a frozen linearization point:
//!
//! - [`ComplexStepJacobian`] evaluates a complex-valued right-hand side at `q + iεv`. There is no
//!   subtractive cancellation, so ε can be tiny and the product is accurate to roundoff.
//! - [`FiniteDifferenceJacobian`] needs only a real right-hand side, at the price of an O(ε)
//!   truncation error.
//!
//! [`RationalOperator`] gives `v − ½·dt·J v` for the rational (Crank-Nicolson type) schemes, and
//! [`BackwardEuler`] turns any linear operator into the step-scaled operator solved by the implicit
//! correction of the IMEX integrator.

use crate::core::traits::{ImplicitOperator, LinearOperator};
use num_complex::Complex64;

/// Complex-step approximation of `v ↦ dt · J(q) v`: `dt · Im(rhs(q + iεv)) / ε`.
///
/// `rhs` must be the complex extension of the real right-hand side, i.e. built from operations
/// that are analytic in each entry.
pub struct ComplexStepJacobian<F> {
    rhs: F,
    q: Vec<f64>,
    rhs_q: Vec<f64>,
    dt: f64,
    epsilon: f64,
}

impl<F> ComplexStepJacobian<F>
where
    F: Fn(&[Complex64], &mut [Complex64]),
{
    /// Linearize `rhs` around `q`. `rhs(q)` is evaluated once here.
    pub fn new(rhs: F, q: Vec<f64>, dt: f64) -> Self {
        let qc: Vec<Complex64> = q.iter().map(|&qi| Complex64::new(qi, 0.0)).collect();
        let mut out = vec![Complex64::new(0.0, 0.0); q.len()];
        rhs(&qc, &mut out);
        Self {
            rhs,
            q,
            rhs_q: out.iter().map(|z| z.re).collect(),
            dt,
            epsilon: f64::EPSILON.sqrt(),
        }
    }

    /// Override the perturbation size.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Right-hand side evaluated at the linearization point.
    pub fn rhs_at_point(&self) -> &[f64] {
        &self.rhs_q
    }
}

impl<F> LinearOperator<f64> for ComplexStepJacobian<F>
where
    F: Fn(&[Complex64], &mut [Complex64]),
{
    fn apply(&self, x: &[f64], y: &mut [f64]) {
        let perturbed: Vec<Complex64> = self
            .q
            .iter()
            .zip(x)
            .map(|(&qi, &xi)| Complex64::new(qi, self.epsilon * xi))
            .collect();
        let mut out = vec![Complex64::new(0.0, 0.0); y.len()];
        (self.rhs)(&perturbed, &mut out);
        let scale = self.dt / self.epsilon;
        for (yi, zi) in y.iter_mut().zip(&out) {
            *yi = scale * zi.im;
        }
    }
}

/// Forward-difference approximation of `v ↦ dt · J(q) v`, where `J` is the Jacobian of `rhs`.
pub struct FiniteDifferenceJacobian<F> {
    rhs: F,
    q: Vec<f64>,
    rhs_q: Vec<f64>,
    dt: f64,
    epsilon: f64,
}

impl<F> FiniteDifferenceJacobian<F>
where
    F: Fn(&[f64], &mut [f64]),
{
    /// Linearize `rhs` around `q`. `rhs(q)` is evaluated once here.
    pub fn new(rhs: F, q: Vec<f64>, dt: f64) -> Self {
        let mut rhs_q = vec![0.0; q.len()];
        rhs(&q, &mut rhs_q);
        Self {
            rhs,
            q,
            rhs_q,
            dt,
            epsilon: (f32::EPSILON as f64).sqrt(),
        }
    }

    /// Override the perturbation size.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Right-hand side evaluated at the linearization point.
    pub fn rhs_at_point(&self) -> &[f64] {
        &self.rhs_q
    }
}

impl<F> LinearOperator<f64> for FiniteDifferenceJacobian<F>
where
    F: Fn(&[f64], &mut [f64]),
{
    fn apply(&self, x: &[f64], y: &mut [f64]) {
        let perturbed: Vec<f64> = self
            .q
            .iter()
            .zip(x)
            .map(|(qi, xi)| qi + self.epsilon * xi)
            .collect();
        (self.rhs)(&perturbed, y);
        let scale = self.dt / self.epsilon;
        for (yi, ri) in y.iter_mut().zip(&self.rhs_q) {
            *yi = scale * (*yi - ri);
        }
    }
}

/// `v ↦ v − ½·(dt·J) v`, where `jac` already applies `dt·J`.
pub struct RationalOperator<A> {
    pub jac: A,
}

impl<A: LinearOperator<f64>> RationalOperator<A> {
    pub fn new(jac: A) -> Self {
        Self { jac }
    }
}

impl<A: LinearOperator<f64>> LinearOperator<f64> for RationalOperator<A> {
    fn apply(&self, x: &[f64], y: &mut [f64]) {
        self.jac.apply(x, y);
        for (yi, xi) in y.iter_mut().zip(x) {
            *yi = xi - 0.5 * *yi;
        }
    }
}

/// `x ↦ x − τ·J(x_state)` on the first `n` rows, identity on the augmentation rows.
pub struct BackwardEuler<A> {
    pub jac: A,
    pub n: usize,
}

impl<A: LinearOperator<f64>> BackwardEuler<A> {
    pub fn new(jac: A, n: usize) -> Self {
        Self { jac, n }
    }
}

impl<A: LinearOperator<f64>> ImplicitOperator for BackwardEuler<A> {
    fn apply_scaled(&self, tau: f64, x: &[f64], y: &mut [f64]) {
        let n = self.n;
        self.jac.apply(&x[..n], &mut y[..n]);
        for (yi, xi) in y[..n].iter_mut().zip(&x[..n]) {
            *yi = xi - tau * *yi;
        }
        y[n..].copy_from_slice(&x[n..]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn finite_difference_matches_linear_rhs() {
        // rhs(q) = [2 q0 - q1, q0 + 3 q1]; Jacobian is constant
        let rhs = |q: &[f64], out: &mut [f64]| {
            out[0] = 2.0 * q[0] - q[1];
            out[1] = q[0] + 3.0 * q[1];
        };
        let jac = FiniteDifferenceJacobian::new(rhs, vec![0.3, -0.7], 0.5);
        let mut y = vec![0.0; 2];
        jac.apply(&[1.0, 2.0], &mut y);
        assert_abs_diff_eq!(y[0], 0.5 * 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y[1], 0.5 * 7.0, epsilon = 1e-6);
    }

    #[test]
    fn finite_difference_quadratic_rhs() {
        let rhs = |q: &[f64], out: &mut [f64]| {
            out[0] = q[0] * q[0];
        };
        let jac = FiniteDifferenceJacobian::new(rhs, vec![2.0], 1.0).with_epsilon(1e-7);
        let mut y = vec![0.0];
        jac.apply(&[1.0], &mut y);
        assert_abs_diff_eq!(y[0], 4.0, epsilon = 1e-5);
        assert_abs_diff_eq!(jac.rhs_at_point()[0], 4.0, epsilon = 1e-15);
    }

    // rhs(q) = [q0² q1, sin q1 + q0]; J = [[2 q0 q1, q0²], [1, cos q1]]
    fn nonlinear_complex(q: &[Complex64], out: &mut [Complex64]) {
        out[0] = q[0] * q[0] * q[1];
        out[1] = q[1].sin() + q[0];
    }

    #[test]
    fn complex_step_matches_closed_form_jacobian() {
        let (q0, q1, dt) = (1.5, 0.4, 0.25);
        let jac = ComplexStepJacobian::new(nonlinear_complex, vec![q0, q1], dt);
        let v = [0.7, -1.3];
        let mut y = vec![0.0; 2];
        jac.apply(&v, &mut y);
        let expected = [
            dt * (2.0 * q0 * q1 * v[0] + q0 * q0 * v[1]),
            dt * (v[0] + q1.cos() * v[1]),
        ];
        // no cancellation: agreement to roundoff
        assert_abs_diff_eq!(y[0], expected[0], epsilon = 1e-14);
        assert_abs_diff_eq!(y[1], expected[1], epsilon = 1e-14);
        assert_abs_diff_eq!(jac.rhs_at_point()[0], q0 * q0 * q1, epsilon = 1e-15);
        assert_abs_diff_eq!(jac.rhs_at_point()[1], q1.sin() + q0, epsilon = 1e-15);
    }

    #[test]
    fn complex_step_is_linear_in_the_direction() {
        let jac = ComplexStepJacobian::new(nonlinear_complex, vec![-0.8, 2.0], 1.0).with_epsilon(1e-20);
        let (mut ya, mut yb, mut ysum) = (vec![0.0; 2], vec![0.0; 2], vec![0.0; 2]);
        jac.apply(&[1.0, 0.0], &mut ya);
        jac.apply(&[0.0, 3.0], &mut yb);
        jac.apply(&[1.0, 3.0], &mut ysum);
        for i in 0..2 {
            assert_abs_diff_eq!(ysum[i], ya[i] + yb[i], epsilon = 1e-13);
        }
    }

    #[test]
    fn rational_operator_matches_closed_form() {
        let (q0, q1, dt) = (0.9, -0.3, 0.5);
        let inner = ComplexStepJacobian::new(nonlinear_complex, vec![q0, q1], dt);
        let rat = RationalOperator::new(inner);
        let v = [2.0, 1.0];
        let mut y = vec![0.0; 2];
        rat.apply(&v, &mut y);
        let jv = [2.0 * q0 * q1 * v[0] + q0 * q0 * v[1], v[0] + q1.cos() * v[1]];
        assert_abs_diff_eq!(y[0], v[0] - 0.5 * dt * jv[0], epsilon = 1e-14);
        assert_abs_diff_eq!(y[1], v[1] - 0.5 * dt * jv[1], epsilon = 1e-14);

        // forward differences carry an O(ε) truncation error
        let real_rhs = move |q: &[f64], out: &mut [f64]| {
            out[0] = q[0] * q[0] * q[1];
            out[1] = q[1].sin() + q[0];
        };
        let fd = RationalOperator::new(FiniteDifferenceJacobian::new(real_rhs, vec![q0, q1], dt));
        let mut z = vec![0.0; 2];
        fd.apply(&v, &mut z);
        assert_abs_diff_eq!(z[0], y[0], epsilon = 1e-3);
        assert_abs_diff_eq!(z[1], y[1], epsilon = 1e-3);
    }

    #[test]
    fn backward_euler_leaves_tail_untouched() {
        let jac = crate::core::FnOperator(|x: &[f64], y: &mut [f64]| {
            for (yi, xi) in y.iter_mut().zip(x) {
                *yi = -2.0 * xi;
            }
        });
        let be = BackwardEuler::new(jac, 2);
        let mut y = vec![0.0; 3];
        be.apply_scaled(0.1, &[1.0, 2.0, 5.0], &mut y);
        assert_abs_diff_eq!(y[0], 1.2, epsilon = 1e-14);
        assert_abs_diff_eq!(y[1], 2.4, epsilon = 1e-14);
        assert_eq!(y[2], 5.0);
    }
}
