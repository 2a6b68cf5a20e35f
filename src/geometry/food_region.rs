//! Food-region detection
//!
//! A supplied segmentation mask is authoritative. Without one, pixels whose
//! depth falls in a near-percentile band of the valid depths are counted as
//! food: nearer than most of the background, but excluding extreme-near
//! outliers. The heuristic assumes food sits measurably closer to the camera
//! than the surface around it.

use serde::Serialize;

use crate::config::{GeometryConfig, RegionConfig};
use crate::models::{DepthFrame, FoodRegionMask};
use crate::stats::robust::percentile_index;
use crate::stats::sorted_copy;

/// Where the area fraction came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionSource {
    Mask,
    DepthPercentile,
    /// Heuristic judged failed; fallback constant
    Fallback,
}

/// Result of food-region detection over one frame
#[derive(Debug, Clone, PartialEq)]
pub struct FoodRegion {
    /// Fraction of valid pixels attributed to food, after soft caps
    pub area_fraction: f64,
    /// Fraction before caps (the mask box area when a mask was supplied)
    pub raw_fraction: f64,
    pub source: RegionSource,
    /// Soft cap applied
    pub clamped: bool,
    /// Depth band `[near, far)` used for the heuristic, meters
    pub band: (f64, f64),
    sorted_depths: Vec<f64>,
    subset_start: usize,
    subset_end: usize,
}

impl FoodRegion {
    /// Valid depths, ascending
    pub fn valid_depths(&self) -> &[f64] {
        &self.sorted_depths
    }

    pub fn valid_pixel_count(&self) -> usize {
        self.sorted_depths.len()
    }

    /// Valid depths between the band's percentile ranks (inclusive), ascending
    pub fn food_subset(&self) -> &[f64] {
        &self.sorted_depths[self.subset_start..=self.subset_end]
    }
}

/// Apply the failure and soft-cap rules to a heuristic fraction
///
/// Returns `(fraction, source, clamped)`.
pub fn apply_soft_caps(raw_fraction: f64, config: &RegionConfig) -> (f64, RegionSource, bool) {
    if raw_fraction > config.failure_fraction {
        (config.fallback_fraction, RegionSource::Fallback, false)
    } else if raw_fraction > config.clamp_fraction {
        (config.clamped_value, RegionSource::DepthPercentile, true)
    } else {
        (raw_fraction, RegionSource::DepthPercentile, false)
    }
}

/// Detect the food region of a frame
///
/// Returns `None` when the frame has no valid depth sample.
pub fn detect_food_region(
    frame: &DepthFrame,
    mask: Option<&FoodRegionMask>,
    config: &GeometryConfig,
) -> Option<FoodRegion> {
    let sorted = sorted_copy(&frame.valid_depths(
        config.depth.min_valid_depth_m,
        config.depth.max_valid_depth_m,
    ));
    if sorted.is_empty() {
        return None;
    }

    let n = sorted.len();
    let region = &config.region;
    let subset_start = percentile_index(n, region.lower_percentile);
    let subset_end = percentile_index(n, region.upper_percentile).max(subset_start);
    let near = sorted[subset_start];
    let far = sorted[subset_end];

    // Half-open so a background plateau sitting exactly at the far edge is excluded
    let in_band = sorted.iter().filter(|&&d| d >= near && d < far).count();
    let heuristic_fraction = in_band as f64 / n as f64;

    let (area_fraction, raw_fraction, source, clamped) = match mask {
        Some(m) => {
            let area = m.bounding_box.area();
            (area, area, RegionSource::Mask, false)
        }
        None => {
            let (fraction, source, clamped) = apply_soft_caps(heuristic_fraction, region);
            if source == RegionSource::Fallback {
                tracing::warn!(
                    "Depth-band food area {:.3} exceeds {:.2}; using fallback {:.2}",
                    heuristic_fraction,
                    region.failure_fraction,
                    region.fallback_fraction
                );
            }
            (fraction, heuristic_fraction, source, clamped)
        }
    };

    tracing::debug!(
        valid = n,
        near,
        far,
        raw_fraction,
        area_fraction,
        "food region detected"
    );

    Some(FoodRegion {
        area_fraction,
        raw_fraction,
        source,
        clamped,
        band: (near, far),
        sorted_depths: sorted,
        subset_start,
        subset_end,
    })
}
