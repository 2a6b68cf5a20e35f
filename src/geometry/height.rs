//! Relief height of the food above its surroundings
//!
//! IQR banding over the percentile-filtered subset rather than min/max, so a
//! single noisy extreme pixel cannot stretch the estimate.

use crate::config::HeightConfig;
use crate::stats::robust::height_band_sorted;

/// Height (m) from an ascending food-depth subset, clamped to `[0, max_height_m]`
pub fn estimate_height(sorted_subset: &[f64], config: &HeightConfig) -> f64 {
    if sorted_subset.is_empty() {
        return 0.0;
    }
    let (lower, upper) = height_band_sorted(
        sorted_subset,
        config.lower_iqr_multiplier,
        config.upper_iqr_multiplier,
    );
    (upper - lower).clamp(0.0, config.max_height_m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeometryConfig;
    use crate::geometry::food_region::detect_food_region;
    use crate::geometry::food_region::tests::two_level_frame;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_two_level_scene_hits_height_cap() {
        let config = GeometryConfig::default();
        let frame = two_level_frame(1000, 0.8, 1.0);
        let region = detect_food_region(&frame, None, &config).unwrap();
        let height = estimate_height(region.food_subset(), &config.height);
        assert_abs_diff_eq!(height, 0.20, epsilon = 1e-12);
    }

    #[test]
    fn test_uncapped_height() {
        // median 0.5, iqr = 0.52 - 0.48 = 0.04, band width 3 * 0.04
        let subset = [0.46, 0.47, 0.48, 0.49, 0.50, 0.51, 0.52, 0.53, 0.54];
        let height = estimate_height(&subset, &HeightConfig::default());
        assert_abs_diff_eq!(height, 0.12, epsilon = 1e-9);
    }

    #[test]
    fn test_single_outlier_does_not_stretch_height() {
        let mut subset = vec![0.50f64; 40];
        subset.push(0.05);
        subset.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(estimate_height(&subset, &HeightConfig::default()), 0.0);
    }

    #[test]
    fn test_empty_subset() {
        assert_eq!(estimate_height(&[], &HeightConfig::default()), 0.0);
    }
}
