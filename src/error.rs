use thiserror::Error;

// Unified error type for kiops

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("dimension mismatch: expected length {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error(
        "adaptive integration failed after {iterations} decisions ({rejections} consecutive rejections) at tau = {tau_now:e} of {tau_end:e}"
    )]
    ConvergenceFailure {
        iterations: usize,
        rejections: usize,
        tau_now: f64,
        tau_end: f64,
    },
    #[error("non-finite value encountered in {0}")]
    NonFinite(&'static str),
    #[error("solve error: {0}")]
    SolveError(String),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}
