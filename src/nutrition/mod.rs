//! Household units for reported portions
//!
//! Renders integrated volumes the way a person would measure them.

pub mod units;

pub use units::{household_measure, mass_grams, ml_per_unit, volume_to_ml};
