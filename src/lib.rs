//! kiops: adaptive Krylov evaluation of φ-function combinations over Faer
//!
//! This crate computes `w(t) = φ₀(tA)u₀ + t φ₁(tA)u₁ + … + tᵖ φₚ(tA)uₚ` at a list of output
//! times with the KIOPS algorithm (adaptive step and subspace size, incomplete
//! orthogonalization), plus a fixed-step IMEX companion that corrects each explicit prediction
//! with an implicit linear solve. Vectors may be sharded across processes; all global reductions
//! go through the [`parallel::Comm`] backend.

pub mod parallel;

pub mod config;
pub mod core;
pub mod error;
pub mod matrix;
pub mod solver;
pub mod utils;

// Re-exports for convenience
pub use crate::config::*;
pub use crate::core::*;
pub use crate::error::*;
pub use crate::matrix::*;
pub use crate::solver::*;

// Re-export SolveStats at the crate root for convenience
pub use utils::convergence::SolveStats;
