// rayon-based shared-memory communication

use rayon::prelude::*;

/// Single-process backend: reductions are the identity, local dot products run on the rayon pool.
pub struct RayonComm;

impl RayonComm {
    pub fn new() -> Self {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_cpus::get())
            .build_global()
            .ok();
        RayonComm
    }
}

impl Default for RayonComm {
    fn default() -> Self {
        Self::new()
    }
}

impl super::Comm for RayonComm {
    fn rank(&self) -> usize { 0 }
    fn size(&self) -> usize { 1 }
    fn barrier(&self) { rayon::scope(|_| {}); }
    fn all_reduce(&self, x: f64) -> f64 {
        x // No-op for shared memory
    }
    fn all_reduce_max(&self, x: f64) -> f64 {
        x
    }
    fn all_reduce_slice(&self, _xs: &mut [f64]) {}
    fn local_dot(&self, a: &[f64], b: &[f64]) -> f64 {
        assert_eq!(a.len(), b.len());
        a.par_iter().zip(b.par_iter()).map(|(x, y)| x * y).sum()
    }
}
