pub mod options;
pub use options::{ImexOptions, KiopsOptions};
