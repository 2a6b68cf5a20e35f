//! Uncertainty propagation and multi-source fusion
//!
//! - Delta-method conversion of a volume into calories
//! - Inverse-variance fusion of independent calorie estimates

pub mod fusion;
pub mod propagation;

pub use fusion::fuse_estimates;
pub use propagation::{propagate_calories, relative_uncertainty};
