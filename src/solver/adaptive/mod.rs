//! Adaptive Krylov evaluation of φ-function combinations (KIOPS).
//!
//! Computes, for every requested output time tₖ,
//!
//! ```text
//! w(tₖ) = φ₀(tₖA)u₀ + tₖ φ₁(tₖA)u₁ + tₖ² φ₂(tₖA)u₂ + … + tₖᵖ φₚ(tₖA)uₚ
//! ```
//!
//! by integrating the equivalent augmented linear ODE with substeps whose length τ and Krylov
//! subspace size m are both chosen adaptively. Each attempt
//!
//! 1. seeds an augmented basis from the current state and the polynomial tail,
//! 2. grows it by incomplete orthogonalization until j = m or a happy breakdown,
//! 3. exponentiates the small projected operator, and
//! 4. hands the error estimate to the controller, which accepts (advancing τ_now and filling
//!    every output time crossed) or rejects (retrying with a new τ or m).
//!
//! The loop is bounded by [`KiopsOptions::max_iterations`] and
//! [`KiopsOptions::max_rejections`]; running out of either is a [`KError::ConvergenceFailure`].
//!
//! # Example
//! ```rust
//! use kiops::{KiopsOptions, KiopsSolver, parallel::UniverseComm};
//! use faer::Mat;
//!
//! let a = Mat::from_fn(4, 4, |i, j| if i == j { -1.0 } else { 0.0 });
//! let u = vec![vec![1.0; 4]];
//! let mut solver = KiopsSolver::new(KiopsOptions::default().with_tol(1e-10));
//! let out = solver.solve(&[1.0], &a, &u, &UniverseComm::Serial).unwrap();
//! assert!((out.w[0][0] - (-1.0f64).exp()).abs() < 1e-9);
//! ```
//!
//! # References
//! - Gaudreault, S., Rainwater, G. and Tokman, M. (2018). KIOPS: A fast adaptive Krylov subspace
//!   solver for exponential integrators. J. Comput. Phys. 372, 236–255.
//! - Niesen, J. and Wright, W. M. (2012). Algorithm 919. ACM TOMS 38(3), 22.

pub mod basis;
pub mod controller;
pub mod output;

use crate::config::KiopsOptions;
use crate::core::traits::LinearOperator;
use crate::core::wrappers::AugmentedInnerProduct;
use crate::error::KError;
use crate::matrix::expm;
use crate::parallel::Comm;
use crate::solver::augmented::{PhiInputs, TimeSpan, validate_times};
use basis::{Growth, KrylovBasis};
use controller::{AdaptivityHistory, Attempt, Controller};
use output::OutputCompositor;

/// Run statistics.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KiopsStats {
    pub accepted_steps: usize,
    pub rejected_steps: usize,
    pub krylov_steps: usize,
    /// Projected exponentials evaluated at decision points
    pub exponential_evaluations: usize,
    pub cumulative_error_estimate: f64,
    pub final_subspace_size: usize,
}

/// One result vector per requested time, plus statistics.
#[derive(Clone, Debug)]
pub struct KiopsOutput {
    pub w: Vec<Vec<f64>>,
    pub stats: KiopsStats,
}

/// Snapshot handed to the monitor at every controller decision.
#[derive(Clone, Debug, PartialEq)]
pub struct StepReport {
    /// 1-based decision counter
    pub decision: usize,
    pub tau_now: f64,
    pub tau: f64,
    pub m: usize,
    pub j: usize,
    pub omega: f64,
    pub error: f64,
    pub accepted: bool,
    pub happy: bool,
}

/// Adaptive φ-function solver. Keeps its Krylov workspace between calls.
pub struct KiopsSolver {
    pub opts: KiopsOptions,
    /// Optional callback invoked at every controller decision
    pub monitor: Option<Box<dyn FnMut(&StepReport)>>,
    workspace: Option<KrylovBasis>,
}

impl KiopsSolver {
    pub fn new(opts: KiopsOptions) -> Self {
        Self { opts, monitor: None, workspace: None }
    }

    pub fn with_monitor(mut self, monitor: impl FnMut(&StepReport) + 'static) -> Self {
        self.monitor = Some(Box::new(monitor));
        self
    }

    /// Evaluate the φ-combination of the columns `u` at every time in `output_times`.
    ///
    /// # Arguments
    /// * `output_times` - Non-empty, same-signed times ordered by magnitude; the last is the target
    /// * `a` - Operator argument of the φ-functions
    /// * `u` - Columns u₀..uₚ, all of this process' local length n
    /// * `comm` - Reduction backend shared by all processes holding a shard
    ///
    /// # Returns
    /// * `Ok(KiopsOutput)` with `w[k] ≈ Σᵢ tₖⁱ φᵢ(tₖA) uᵢ` (divided by tₖ in rescale mode)
    /// * `Err(KError)` on invalid input or when the adaptive loop exhausts its limits
    pub fn solve<A, C, V>(
        &mut self,
        output_times: &[f64],
        a: &A,
        u: &[V],
        comm: &C,
    ) -> Result<KiopsOutput, KError>
    where
        A: LinearOperator<f64> + ?Sized,
        C: Comm + ?Sized,
        V: AsRef<[f64]>,
    {
        self.opts.validate()?;
        let span = validate_times(output_times, self.opts.rescale_by_time)?;
        let inputs = PhiInputs::new(u, comm)?;
        let (n, p) = (inputs.n, inputs.p);

        let mut basis = match self.workspace.take() {
            Some(b) if b.fits(n, p, self.opts.mmax) => b,
            _ => KrylovBasis::new(n, p, self.opts.mmax),
        };
        let result = self.integrate(output_times, span, a, u[0].as_ref(), &inputs, comm, &mut basis);
        self.workspace = Some(basis);
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn integrate<A, C>(
        &mut self,
        output_times: &[f64],
        span: TimeSpan,
        a: &A,
        u0: &[f64],
        inputs: &PhiInputs,
        comm: &C,
        basis: &mut KrylovBasis,
    ) -> Result<KiopsOutput, KError>
    where
        A: LinearOperator<f64> + ?Sized,
        C: Comm + ?Sized,
    {
        let opts = &self.opts;
        let ip = AugmentedInnerProduct::new(comm, inputs.n);
        let tau_end = span.tau_end;
        let controller = Controller::new(opts, tau_end);
        let mut history = AdaptivityHistory::default();
        let mut outputs = OutputCompositor::new(output_times, span, u0);
        let mut stats = KiopsStats::default();

        let mut tau_now = 0.0;
        let mut tau = tau_end;
        let mut m = opts.initial_m();
        let mut rejections = 0;
        let mut decisions = 0;
        let mut tail = vec![0.0; inputs.p];

        while tau_now < tau_end {
            if decisions >= opts.max_iterations
                || rejections > opts.max_rejections
                || tau.is_nan()
                || tau <= 0.0
                || tau.is_infinite()
            {
                log::warn!(
                    "kiops giving up at tau = {:e} / {:e} after {} decisions ({} consecutive rejections, tau = {:e})",
                    tau_now, tau_end, decisions, rejections, tau
                );
                return Err(KError::ConvergenceFailure {
                    iterations: decisions,
                    rejections,
                    tau_now,
                    tau_end,
                });
            }

            inputs.tail(span.sign * tau_now, &mut tail);
            let beta = basis.seed(outputs.current(), &tail, &ip)?;
            if beta == 0.0 {
                // zero state and no forcing: nothing evolves
                break;
            }

            let (growth, steps) = basis.grow(a, inputs, m, opts.iop, opts.tol, &ip)?;
            stats.krylov_steps += steps;
            let happy = growth == Growth::HappyBreakdown;
            let j = basis.size();

            let f = expm(basis.projected(span.sign * tau).as_ref())?;
            stats.exponential_evaluations += 1;
            decisions += 1;

            let attempt = Attempt {
                tau_now,
                tau,
                m,
                j,
                rejections,
                happy,
                error: beta * basis.exit_coefficient() * f[(j - 1, j)],
            };
            let (decision, next_history) = controller.decide(history, &attempt);
            history = next_history;

            log::debug!(
                "kiops decision {}: tau_now = {:.6e}, tau = {:.6e}, m = {}, j = {}, omega = {:.3e}, {}",
                decisions,
                tau_now,
                tau,
                m,
                j,
                decision.omega,
                if decision.accepted { "accepted" } else { "rejected" }
            );
            if let Some(monitor) = self.monitor.as_mut() {
                monitor(&StepReport {
                    decision: decisions,
                    tau_now,
                    tau,
                    m,
                    j,
                    omega: decision.omega,
                    error: decision.error,
                    accepted: decision.accepted,
                    happy,
                });
            }

            if decision.accepted {
                outputs.advance(basis, tau_now, tau, &f)?;
                tau_now += tau;
                if tau_end - tau_now <= 4.0 * f64::EPSILON * tau_end {
                    tau_now = tau_end;
                }
                stats.accepted_steps += 1;
                stats.cumulative_error_estimate += decision.error;
                rejections = 0;
            } else {
                stats.rejected_steps += 1;
                rejections += 1;
            }

            tau = decision.tau_next;
            m = decision.m_next;
        }

        stats.final_subspace_size = m;
        Ok(KiopsOutput {
            w: outputs.finish(self.opts.rescale_by_time),
            stats,
        })
    }
}

/// One-shot convenience wrapper around [`KiopsSolver`].
pub fn kiops<A, C, V>(
    output_times: &[f64],
    a: &A,
    u: &[V],
    opts: &KiopsOptions,
    comm: &C,
) -> Result<KiopsOutput, KError>
where
    A: LinearOperator<f64> + ?Sized,
    C: Comm + ?Sized,
    V: AsRef<[f64]>,
{
    KiopsSolver::new(opts.clone()).solve(output_times, a, u, comm)
}
