//! Real-world footprint of one depth pixel
//!
//! Footprint grows with the square of distance; without that scaling volume
//! estimates swing with camera-to-plate distance.

use crate::config::PixelAreaConfig;
use crate::models::CameraIntrinsics;

/// Area (m²) covered by one pixel at `depth_m`
///
/// Pinhole projection `(d / fx) * (d / fy)` when usable intrinsics are known,
/// otherwise the calibrated reference area scaled by `(d / reference_depth)²`.
pub fn pixel_area_m2(
    depth_m: f64,
    intrinsics: Option<&CameraIntrinsics>,
    config: &PixelAreaConfig,
) -> f64 {
    if !depth_m.is_finite() || depth_m <= 0.0 {
        return 0.0;
    }
    match intrinsics.filter(|k| k.is_valid()) {
        Some(k) => (depth_m / k.fx) * (depth_m / k.fy),
        None => {
            let ratio = depth_m / config.reference_depth_m;
            config.reference_pixel_area_m2 * ratio * ratio
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pinhole_area() {
        let k = CameraIntrinsics {
            fx: 200.0,
            fy: 200.0,
            cx: 128.0,
            cy: 96.0,
            image_width: 256,
            image_height: 192,
        };
        let area = pixel_area_m2(0.5, Some(&k), &PixelAreaConfig::default());
        assert_relative_eq!(area, (0.5f64 / 200.0).powi(2), max_relative = 1e-12);
    }

    #[test]
    fn test_reference_area_scales_quadratically() {
        let config = PixelAreaConfig::default();
        let at_ref = pixel_area_m2(0.5, None, &config);
        let at_double = pixel_area_m2(1.0, None, &config);
        assert_relative_eq!(at_ref, config.reference_pixel_area_m2, max_relative = 1e-12);
        assert_relative_eq!(at_double, 4.0 * at_ref, max_relative = 1e-12);
    }

    #[test]
    fn test_invalid_intrinsics_fall_back() {
        let k = CameraIntrinsics {
            fx: 0.0,
            fy: 0.0,
            cx: 0.0,
            cy: 0.0,
            image_width: 0,
            image_height: 0,
        };
        let config = PixelAreaConfig::default();
        assert_eq!(pixel_area_m2(0.5, Some(&k), &config), pixel_area_m2(0.5, None, &config));
    }

    #[test]
    fn test_non_positive_depth() {
        assert_eq!(pixel_area_m2(0.0, None, &PixelAreaConfig::default()), 0.0);
        assert_eq!(pixel_area_m2(f64::NAN, None, &PixelAreaConfig::default()), 0.0);
    }
}
