//! Step-size and subspace-size adaptivity.
//!
//! After every evaluation of the projected exponential the controller turns the local error estimate
//! into a growth indicator ω = τ_end · err / (τ · tol), decides acceptance (ω ≤ δ), and proposes the
//! next (τ, m). The convergence order in τ and the error reduction per extra Krylov vector are
//! estimated from consecutive attempts and carried in an explicit [`AdaptivityHistory`].
//!
//! # References
//! - Niesen, J. and Wright, W. M. (2012). Algorithm 919: A Krylov subspace algorithm for evaluating
//!   the φ-functions appearing in exponential integrators. ACM TOMS 38(3), 22.

use crate::config::KiopsOptions;

/// Acceptance threshold on ω.
const DELTA: f64 = 1.4;

/// Estimates carried from one controller decision to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptivityHistory {
    /// Subspace size of the previous attempt
    pub prev_m: Option<usize>,
    /// Step of the previous attempt
    pub prev_tau: f64,
    /// ω of the previous attempt
    pub omega: f64,
    /// Estimated convergence order in τ
    pub order: f64,
    /// Estimated error reduction per Krylov vector
    pub kest: f64,
    order_stale: bool,
    kest_stale: bool,
}

impl Default for AdaptivityHistory {
    fn default() -> Self {
        Self {
            prev_m: None,
            prev_tau: f64::NAN,
            omega: f64::NAN,
            order: 1.0,
            kest: 2.0,
            order_stale: true,
            kest_stale: true,
        }
    }
}

/// What the controller sees after one evaluation.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub tau_now: f64,
    pub tau: f64,
    /// Target subspace size
    pub m: usize,
    /// Basis size reached
    pub j: usize,
    /// Consecutive rejections before this attempt
    pub rejections: usize,
    pub happy: bool,
    /// β · h_{j+1,j} · F[j-1, j]
    pub error: f64,
}

/// Controller verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub accepted: bool,
    pub omega: f64,
    pub error: f64,
    pub tau_next: f64,
    pub m_next: usize,
}

/// Safety factors and bounds for one integration.
#[derive(Debug, Clone)]
pub struct Controller {
    tol: f64,
    tau_end: f64,
    mmin: usize,
    mmax: usize,
    gamma: f64,
    gamma_mmax: f64,
}

impl Controller {
    pub fn new(opts: &KiopsOptions, tau_end: f64) -> Self {
        // long spans get more conservative safety factors
        let (gamma, gamma_mmax) = if tau_end > 1.0 { (0.2, 0.1) } else { (0.9, 0.6) };
        Self {
            tol: opts.tol,
            tau_end,
            mmin: opts.mmin,
            mmax: opts.mmax,
            gamma,
            gamma_mmax,
        }
    }

    pub fn decide(&self, mut hist: AdaptivityHistory, at: &Attempt) -> (Decision, AdaptivityHistory) {
        let tau = at.tau;
        let m = at.m;

        if at.happy {
            let decision = Decision {
                accepted: true,
                omega: 0.0,
                error: 0.0,
                tau_next: (self.tau_end - (at.tau_now + tau)).min(tau),
                m_next: m,
            };
            hist.omega = 0.0;
            hist.prev_tau = tau;
            hist.prev_m = Some(m);
            return (decision, hist);
        }

        let err = at.error.abs();
        let old_omega = hist.omega;
        let omega = self.tau_end * err / (tau * self.tol);
        let retry = at.rejections >= 1;

        if hist.prev_m == Some(m) && tau != hist.prev_tau && retry {
            hist.order = ((omega / old_omega).ln() / (tau / hist.prev_tau).ln()).max(1.0);
            hist.order_stale = false;
        } else if hist.order_stale || at.rejections == 0 {
            hist.order_stale = true;
            hist.order = at.j as f64 / 4.0;
        } else {
            hist.order_stale = true;
        }

        match hist.prev_m {
            Some(pm) if pm != m && tau == hist.prev_tau && retry => {
                let exponent = 1.0 / (pm as f64 - m as f64);
                hist.kest = (omega / old_omega).powf(exponent).max(1.1);
                hist.kest_stale = false;
            }
            _ if hist.kest_stale || at.rejections == 0 => {
                hist.kest_stale = true;
                hist.kest = 2.0;
            }
            _ => hist.kest_stale = true,
        }

        let accepted = omega <= DELTA;
        let remaining = if accepted {
            self.tau_end - (at.tau_now + tau)
        } else {
            self.tau_end - at.tau_now
        };

        let same_tau = remaining.min(tau);
        let tau_opt = tau * (self.gamma / omega).powf(1.0 / hist.order);
        let tau_opt = remaining.min((tau / 5.0).max((5.0 * tau).min(tau_opt)));

        let m_opt = (at.j as f64 + (omega / self.gamma).ln() / hist.kest.ln()).ceil();
        let m_lo = (0.75 * m as f64).floor();
        let m_hi = (4.0 / 3.0 * m as f64).ceil();
        let m_opt = (m_lo.max(m_opt.min(m_hi)) as usize).clamp(self.mmin, self.mmax);

        let (tau_next, m_next) = if at.j == self.mmax {
            if omega > DELTA {
                // subspace is maxed out, only the step can shrink
                let t = tau * (self.gamma_mmax / omega).powf(1.0 / hist.order);
                ((self.tau_end - at.tau_now).min((tau / 5.0).max(t)), at.j)
            } else {
                (tau_opt, m)
            }
        } else {
            (same_tau, m_opt)
        };

        hist.omega = omega;
        hist.prev_tau = tau;
        hist.prev_m = Some(m);

        let decision = Decision {
            accepted,
            omega,
            error: err,
            tau_next,
            m_next,
        };
        (decision, hist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(mmin: usize, mmax: usize, tau_end: f64) -> Controller {
        let opts = KiopsOptions::default().with_subspace_bounds(mmin, mmax).with_tol(1e-8);
        Controller::new(&opts, tau_end)
    }

    fn attempt(tau: f64, m: usize, j: usize, rejections: usize, error: f64) -> Attempt {
        Attempt { tau_now: 0.0, tau, m, j, rejections, happy: false, error }
    }

    #[test]
    fn happy_breakdown_is_accepted_with_zero_error() {
        let c = controller(2, 20, 1.0);
        let at = Attempt { tau_now: 0.25, tau: 0.5, m: 6, j: 1, rejections: 0, happy: true, error: 1.0 };
        let (d, hist) = c.decide(AdaptivityHistory::default(), &at);
        assert!(d.accepted);
        assert_eq!(d.error, 0.0);
        assert_eq!(d.omega, 0.0);
        assert_eq!(d.m_next, 6);
        assert_eq!(d.tau_next, 0.25);
        assert_eq!(hist.prev_m, Some(6));
    }

    #[test]
    fn large_error_rejects_and_grows_subspace() {
        let c = controller(2, 20, 1.0);
        let (d, hist) = c.decide(AdaptivityHistory::default(), &attempt(1.0, 6, 6, 0, 1e-3));
        assert!(!d.accepted);
        assert!(d.m_next > 6 && d.m_next <= 8);
        assert_eq!(d.tau_next, 1.0);
        assert!(hist.omega > DELTA);
    }

    #[test]
    fn small_error_accepts_and_may_shrink_subspace() {
        let c = controller(2, 20, 2.0);
        let (d, _) = c.decide(AdaptivityHistory::default(), &attempt(0.5, 8, 8, 0, 1e-14));
        assert!(d.accepted);
        assert!(d.m_next >= 6 && d.m_next <= 8);
        assert_eq!(d.tau_next, 0.5);
    }

    #[test]
    fn maxed_subspace_shrinks_step() {
        let c = controller(2, 10, 1.0);
        let (d, _) = c.decide(AdaptivityHistory::default(), &attempt(1.0, 10, 10, 0, 1e-2));
        assert!(!d.accepted);
        assert_eq!(d.m_next, 10);
        assert!(d.tau_next < 1.0 && d.tau_next >= 0.2);
    }

    #[test]
    fn order_estimate_uses_previous_attempt() {
        let c = controller(2, 10, 1.0);
        let (_, hist) = c.decide(AdaptivityHistory::default(), &attempt(1.0, 10, 10, 0, 1e-2));
        // halving tau with the same m reduced the error by 2^4
        let (_, hist) = c.decide(hist, &attempt(0.5, 10, 10, 1, 1e-2 / 16.0));
        // ω carries one extra factor 2 from the τ in its denominator
        assert!((hist.order - 3.0).abs() < 1e-12);
    }

    #[test]
    fn subspace_size_stays_in_bounds() {
        let c = controller(3, 12, 1.0);
        let mut hist = AdaptivityHistory::default();
        for (k, err) in [1e2, 1e-20, 1.0, 1e-9, 5.0].into_iter().enumerate() {
            let (d, h) = c.decide(hist, &attempt(0.3, 6, 6, k % 2, err));
            assert!(d.m_next >= 3 && d.m_next <= 12);
            assert!(d.tau_next > 0.0);
            hist = h;
        }
    }
}
