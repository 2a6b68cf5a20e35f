//! Robust statistics module
//!
//! Order statistics over noisy depth samples.

pub mod robust;

pub use robust::{
    height_band, iqr, iqr_sorted, median, median_sorted, percentile, percentile_sorted,
    sorted_copy,
};
