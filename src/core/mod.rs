//! Operator abstraction: traits, matrix/closure wrappers and Jacobian-vector products.

pub mod jacobian;
pub mod traits;
pub mod wrappers;

pub use jacobian::{BackwardEuler, ComplexStepJacobian, FiniteDifferenceJacobian, RationalOperator};
pub use traits::{ImplicitOperator, InnerProduct, LinearOperator};
pub use wrappers::{AugmentedInnerProduct, FnOperator};
