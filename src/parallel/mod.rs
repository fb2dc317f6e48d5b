//! Reduction backends for the φ-function kernels.
//!
//! Every inner product and norm computed by the kernels is a global collective. The [`Comm`]
//! trait hides the substrate so the same code runs on one process (identity reduction) or on a
//! distributed domain decomposition.

pub trait Comm {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn barrier(&self);
    /// Global sum of one scalar.
    fn all_reduce(&self, x: f64) -> f64;
    /// Global maximum of one scalar.
    fn all_reduce_max(&self, x: f64) -> f64;
    /// Component-wise global sum, in place.
    fn all_reduce_slice(&self, xs: &mut [f64]) {
        for x in xs.iter_mut() {
            *x = self.all_reduce(*x);
        }
    }
    /// Local (shard) dot product; no communication.
    fn local_dot(&self, a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(&x, &y)| x * y).sum::<f64>()
    }
    fn dot(&self, a: &[f64], b: &[f64]) -> f64 {
        let local = self.local_dot(a, b);
        self.all_reduce(local)
    }
}

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;

#[cfg(feature = "rayon")]
pub mod rayon_comm;
#[cfg(feature = "rayon")]
pub use rayon_comm::RayonComm;

pub enum UniverseComm {
    #[cfg(feature = "mpi")]
    Mpi(MpiComm),
    #[cfg(feature = "rayon")]
    Rayon(RayonComm),
    Serial,
}

impl UniverseComm {
    /// Pick the widest backend compiled in.
    pub fn from_features() -> Result<Self, crate::error::KError> {
        #[cfg(feature = "mpi")]
        {
            return MpiComm::new().map(UniverseComm::Mpi);
        }
        #[cfg(all(feature = "rayon", not(feature = "mpi")))]
        {
            return Ok(UniverseComm::Rayon(RayonComm::new()));
        }
        #[cfg(not(any(feature = "mpi", feature = "rayon")))]
        {
            Ok(UniverseComm::Serial)
        }
    }
}

impl Comm for UniverseComm {
    fn rank(&self) -> usize {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.rank(),
            #[cfg(feature = "rayon")]
            UniverseComm::Rayon(comm) => comm.rank(),
            UniverseComm::Serial => 0,
        }
    }
    fn size(&self) -> usize {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.size(),
            #[cfg(feature = "rayon")]
            UniverseComm::Rayon(comm) => comm.size(),
            UniverseComm::Serial => 1,
        }
    }
    fn barrier(&self) {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.barrier(),
            #[cfg(feature = "rayon")]
            UniverseComm::Rayon(comm) => comm.barrier(),
            UniverseComm::Serial => {}
        }
    }
    fn all_reduce(&self, x: f64) -> f64 {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_reduce(x),
            #[cfg(feature = "rayon")]
            UniverseComm::Rayon(comm) => comm.all_reduce(x),
            UniverseComm::Serial => x,
        }
    }
    fn all_reduce_max(&self, x: f64) -> f64 {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_reduce_max(x),
            #[cfg(feature = "rayon")]
            UniverseComm::Rayon(comm) => comm.all_reduce_max(x),
            UniverseComm::Serial => x,
        }
    }
    fn all_reduce_slice(&self, xs: &mut [f64]) {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_reduce_slice(xs),
            #[cfg(feature = "rayon")]
            UniverseComm::Rayon(comm) => comm.all_reduce_slice(xs),
            UniverseComm::Serial => {}
        }
    }
    fn local_dot(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.local_dot(a, b),
            #[cfg(feature = "rayon")]
            UniverseComm::Rayon(comm) => comm.local_dot(a, b),
            UniverseComm::Serial => a.iter().zip(b).map(|(&x, &y)| x * y).sum(),
        }
    }
}
