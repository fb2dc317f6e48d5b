//! φ-function kernels and the linear solver they delegate to.

use crate::core::traits::{InnerProduct, LinearOperator};
use crate::error::KError;
use crate::utils::convergence::SolveStats;

/// Common interface for the linear-solve collaborator of the IMEX integrator.
pub trait LinearSolver {
    /// Solve A·x = b, using `x` as the initial guess and writing the result into it.
    /// Returns iteration stats (including convergence info).
    fn solve(
        &mut self,
        a: &dyn LinearOperator<f64>,
        ip: &dyn InnerProduct,
        b: &[f64],
        x: &mut [f64],
    ) -> Result<SolveStats<f64>, KError>;
}

pub mod augmented;
pub use augmented::{PhiInputs, TimeSpan};

pub mod gmres;
pub use gmres::GmresSolver;

pub mod imex;
pub use imex::{ImexOutput, ImexStats, PhiImexSolver, phi_imex};

pub mod adaptive;
pub use adaptive::{KiopsOutput, KiopsSolver, KiopsStats, StepReport, kiops};
