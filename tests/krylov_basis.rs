//! Tests for the incomplete-orthogonalization basis: orthogonality, the Arnoldi relation, and the
//! number of global reductions per Krylov step.

use approx::assert_abs_diff_eq;
use faer::Mat;
use kiops::parallel::{Comm, UniverseComm};
use kiops::solver::adaptive::basis::{Growth, KrylovBasis};
use kiops::{AugmentedInnerProduct, PhiInputs};
use std::cell::Cell;

/// Serial communicator that counts reductions.
#[derive(Default)]
struct CountingComm {
    reductions: Cell<usize>,
}

impl Comm for CountingComm {
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn barrier(&self) {}
    fn all_reduce(&self, x: f64) -> f64 {
        self.reductions.set(self.reductions.get() + 1);
        x
    }
    fn all_reduce_max(&self, x: f64) -> f64 {
        self.reductions.set(self.reductions.get() + 1);
        x
    }
    fn all_reduce_slice(&self, _xs: &mut [f64]) {
        self.reductions.set(self.reductions.get() + 1);
    }
}

fn tridiag(n: usize) -> Mat<f64> {
    Mat::from_fn(n, n, |i, j| {
        if i == j {
            2.0
        } else if i.abs_diff(j) == 1 {
            -1.0
        } else {
            0.0
        }
    })
}

fn dot(x: &[f64], y: &[f64]) -> f64 {
    x.iter().zip(y).map(|(a, b)| a * b).sum()
}

#[test]
fn symmetric_operator_gives_orthonormal_basis() {
    let n = 6;
    let a = tridiag(n);
    let u0: Vec<f64> = (1..=n).map(|i| i as f64).collect();
    let comm = UniverseComm::Serial;
    let inputs = PhiInputs::new(&[u0.clone()], &comm).unwrap();
    let ip = AugmentedInnerProduct::new(&comm, n);
    let mut basis = KrylovBasis::new(n, inputs.p, 5);
    basis.seed(&u0, &[0.0], &ip).unwrap();
    let (growth, steps) = basis.grow(&a, &inputs, 5, 2, 1e-12, &ip).unwrap();
    assert_eq!(growth, Growth::Full);
    assert_eq!(steps, 5);

    for i in 0..=5 {
        for k in 0..=5 {
            let expected = if i == k { 1.0 } else { 0.0 };
            assert_abs_diff_eq!(dot(basis.vector(i), basis.vector(k)), expected, epsilon = 1e-8);
        }
    }

    // outside the window the projected operator is never written
    let h = basis.hessenberg();
    for col in 0usize..5 {
        for row in 0..col.saturating_sub(1) {
            assert_eq!(h[(row, col)], 0.0);
        }
    }
}

#[test]
fn arnoldi_relation_holds_for_nonsymmetric_operator() {
    let n = 7;
    let a = Mat::from_fn(n, n, |i, j| 1.0 / (1.0 + i as f64 + 2.0 * j as f64) - if i == j + 1 { 0.5 } else { 0.0 });
    let u0: Vec<f64> = (0..n).map(|i| (i as f64).sin() + 1.0).collect();
    let comm = UniverseComm::Serial;
    let inputs = PhiInputs::new(&[u0.clone()], &comm).unwrap();
    let ip = AugmentedInnerProduct::new(&comm, n);
    let m = 5;
    let mut basis = KrylovBasis::new(n, inputs.p, m);
    basis.seed(&u0, &[0.0], &ip).unwrap();
    basis.grow(&a, &inputs, m, 2, 1e-12, &ip).unwrap();

    // Â v_k = Σ_i h[i, k] v_i for every completed column
    let h = basis.hessenberg();
    let len = inputs.len();
    for k in 0..m {
        let mut av = vec![0.0; len];
        inputs.apply(&a, basis.vector(k), &mut av);
        for r in 0..len {
            let combo: f64 = (0..=k + 1).map(|i| h[(i, k)] * basis.vector(i)[r]).sum();
            assert_abs_diff_eq!(av[r], combo, epsilon = 1e-12);
        }
    }
}

#[test]
fn reductions_per_krylov_step_are_bounded_by_window() {
    let n = 6;
    let a = tridiag(n);
    let u0: Vec<f64> = (1..=n).map(|i| i as f64).collect();
    let comm = CountingComm::default();
    let inputs = PhiInputs::new(&[u0.clone()], &comm).unwrap();
    // a single input column needs no norm reduction
    assert_eq!(comm.reductions.get(), 0);

    let ip = AugmentedInnerProduct::new(&comm, n);
    let mut basis = KrylovBasis::new(n, inputs.p, 5);
    basis.seed(&u0, &[0.0], &ip).unwrap();
    assert_eq!(comm.reductions.get(), 1);

    basis.grow(&a, &inputs, 5, 2, 1e-12, &ip).unwrap();
    // step 1: one projection + norm; steps 2..5: two projections + norm
    assert_eq!(comm.reductions.get(), 1 + 2 + 4 * 3);
}

#[test]
fn higher_columns_cost_one_reduction() {
    let comm = CountingComm::default();
    let u = vec![vec![1.0; 4], vec![2.0; 4], vec![-1.0; 4]];
    let inputs = PhiInputs::new(&u, &comm).unwrap();
    assert_eq!(comm.reductions.get(), 1);
    assert_eq!(inputs.p, 2);
}
