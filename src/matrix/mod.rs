//! Matrix module: dense kernels for the small projected problems.

pub mod expm;
pub use expm::{expm, norm1};
