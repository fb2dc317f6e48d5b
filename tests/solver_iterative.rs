//! Tests for the GMRES corrector vs direct solvers on random matrices.
//!
//! The IMEX integrator delegates its implicit correction to a [`LinearSolver`]; these tests verify
//! that the default GMRES produces solutions that closely match faer's dense LU on small random
//! systems, with both the serial and the augmented inner product.

use approx::assert_abs_diff_eq;
use faer::Mat;
use faer::linalg::solvers::SolveCore;
use kiops::parallel::UniverseComm;
use kiops::{AugmentedInnerProduct, GmresSolver, LinearSolver};
use rand::Rng;

/// Random non-symmetric matrix `A = M + n·I` (safely nonsingular) and right-hand side `b`.
fn random_nonsymmetric(n: usize) -> (Mat<f64>, Vec<f64>) {
    let mut rng = rand::thread_rng();
    let data: Vec<f64> = (0..n * n).map(|_| rng.r#gen()).collect();
    let a = Mat::from_fn(n, n, |i, j| data[j * n + i] + if i == j { n as f64 } else { 0.0 });
    let b: Vec<f64> = (0..n).map(|_| rng.r#gen()).collect();
    (a, b)
}

fn direct_solve(a: &Mat<f64>, b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut x = b.to_vec();
    let lu = faer::linalg::solvers::FullPivLu::new(a.as_ref());
    let x_mat = faer::MatMut::from_column_major_slice_mut(&mut x, n, 1);
    lu.solve_in_place_with_conj(faer::Conj::No, x_mat);
    x
}

/// Full (unrestarted) GMRES must agree with LU.
#[test]
fn gmres_vs_direct_on_nonsymmetric() {
    let n = 10;
    let (a, b) = random_nonsymmetric(n);
    let mut x_gmres = vec![0.0; n];
    let mut solver = GmresSolver::new(n, 1e-10, 1000);
    let stats = solver.solve(&a, &(), &b, &mut x_gmres).unwrap();
    assert!(stats.converged);
    assert!(stats.iterations <= n);
    let x_direct = direct_solve(&a, &b);
    for i in 0..n {
        assert_abs_diff_eq!(x_gmres[i], x_direct[i], epsilon = 1e-8);
    }
}

/// Restarted GMRES on a larger system, through the augmented inner product.
#[test]
fn restarted_gmres_with_augmented_inner_product() {
    let n = 40;
    let (a, b) = random_nonsymmetric(n);
    let comm = UniverseComm::Serial;
    // the whole vector is state: no augmentation tail
    let ip = AugmentedInnerProduct::new(&comm, n);
    let mut x = vec![0.0; n];
    let mut solver = GmresSolver::new(8, 1e-10, 2000);
    let stats = solver.solve(&a, &ip, &b, &mut x).unwrap();
    assert!(stats.converged, "final residual {}", stats.final_residual);
    let x_direct = direct_solve(&a, &b);
    for i in 0..n {
        assert_abs_diff_eq!(x[i], x_direct[i], epsilon = 1e-8);
    }
}
