//! MPI-based parallel communication module.
//!
//! This module provides an implementation of the `Comm` trait using the MPI (Message Passing Interface)
//! backend for distributed-memory parallelism. Each process owns a shard of the global state vector;
//! the kernels call the all-reduce operations below for every inner product and norm.
//!
//! # Usage
//!
//! - The `MpiComm` struct owns the MPI universe and exposes the collective operations.
//! - The `Comm` trait is implemented for `MpiComm`, allowing it to be used as a drop-in replacement
//!   for the serial or shared-memory backends.
//!
//! # References
//! - [MPI Standard](https://www.mpi-forum.org/)
//!
//! # Example
//! ```no_run
//! # #[cfg(feature = "mpi")]
//! # {
//! use kiops::parallel::{Comm, MpiComm};
//! let comm = MpiComm::new().unwrap();
//! println!("Rank: {} / {}", comm.rank(), comm.size());
//! comm.barrier();
//! # }
//! ```

use crate::error::KError;
use mpi::collective::SystemOperation;
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

/// MPI communicator wrapper for distributed parallelism.
///
/// Holds the MPI universe (finalized on drop), the world communicator, the rank of the current
/// process, and the total number of processes.
pub struct MpiComm {
    _universe: Universe,
    /// The MPI world communicator (all processes in the job).
    pub world: SimpleCommunicator,
    /// The rank (ID) of this process within the communicator.
    pub rank: usize,
    /// The total number of processes in the communicator.
    pub size: usize,
}

impl MpiComm {
    /// Initializes MPI and constructs a new `MpiComm` instance.
    ///
    /// Fails if MPI was already initialized by someone else.
    pub fn new() -> Result<Self, KError> {
        let universe = mpi::initialize().ok_or(KError::Unsupported("MPI already initialized"))?;
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        Ok(MpiComm { _universe: universe, world, rank, size })
    }
}

impl super::Comm for MpiComm {
    /// Returns the rank (ID) of this process.
    fn rank(&self) -> usize { self.rank }
    /// Returns the total number of processes in the communicator.
    fn size(&self) -> usize { self.size }
    /// Synchronizes all processes at a barrier.
    fn barrier(&self) { self.world.barrier(); }

    /// Performs an all-reduce sum operation across all processes.
    fn all_reduce(&self, x: f64) -> f64 {
        let mut y = 0.0;
        self.world.all_reduce_into(&x, &mut y, SystemOperation::sum());
        y
    }

    /// Performs an all-reduce max operation across all processes.
    fn all_reduce_max(&self, x: f64) -> f64 {
        let mut y = 0.0;
        self.world.all_reduce_into(&x, &mut y, SystemOperation::max());
        y
    }

    /// Component-wise sum in a single collective.
    fn all_reduce_slice(&self, xs: &mut [f64]) {
        let local = xs.to_vec();
        self.world.all_reduce_into(&local[..], xs, SystemOperation::sum());
    }
}
