//! Volume integration
//!
//! Two fidelity tiers behind one strategy trait:
//! - [`CoarseIntegrator`]: height x valid pixels x pixel area x food fraction
//! - [`PerPixelIntegrator`]: unprojects every masked pixel and integrates its
//!   height above a reference plane, propagating per-sensor depth noise.

use crate::config::{GeometryConfig, VolumeConfig};
use crate::geometry::food_region::FoodRegion;
use crate::geometry::pixel_area::pixel_area_m2;
use crate::geometry::temporal::FrameObservation;
use crate::models::{
    is_valid_depth, CameraIntrinsics, DepthFrame, EvidenceTag, FoodRegionMask, IntegrationMethod,
    ReferencePlane, VolumeEstimate,
};
use crate::stats::median;

const ML_PER_M3: f64 = 1e6;

/// Everything an integrator may draw on for one frame
#[derive(Debug, Clone, Copy)]
pub struct VolumeInputs<'a> {
    pub frame: &'a DepthFrame,
    /// Already scaled to the depth map's resolution
    pub intrinsics: Option<&'a CameraIntrinsics>,
    pub mask: Option<&'a FoodRegionMask>,
    pub reference_plane: Option<&'a ReferencePlane>,
    pub region: &'a FoodRegion,
    /// Area/depth/height after temporal resolution
    pub observation: FrameObservation,
}

/// Volume plus the evidence the integrator relied on
#[derive(Debug, Clone, PartialEq)]
pub struct IntegratedVolume {
    pub estimate: VolumeEstimate,
    /// Relief height the volume was integrated from, when the integrator
    /// measures one itself; the depth-band height applies otherwise
    pub height_m: Option<f64>,
    pub evidence: Vec<EvidenceTag>,
}

/// Strategy for turning a frame into a volume
///
/// Returns `None` when the strategy's inputs are not available, letting the
/// caller fall through to the next one.
pub trait VolumeEstimator: Send + Sync {
    fn name(&self) -> &'static str;

    fn estimate(&self, inputs: &VolumeInputs<'_>, config: &GeometryConfig)
        -> Option<IntegratedVolume>;
}

/// Area x height integration
#[derive(Debug, Clone, Copy, Default)]
pub struct CoarseIntegrator;

impl VolumeEstimator for CoarseIntegrator {
    fn name(&self) -> &'static str {
        "coarse"
    }

    fn estimate(
        &self,
        inputs: &VolumeInputs<'_>,
        config: &GeometryConfig,
    ) -> Option<IntegratedVolume> {
        let valid_pixels = inputs.region.valid_pixel_count();
        if valid_pixels == 0 {
            return None;
        }
        let obs = inputs.observation;
        let usable = inputs.intrinsics.filter(|k| k.is_valid());
        let area = pixel_area_m2(obs.median_depth_m, usable, &config.pixel_area);

        let raw_ml =
            obs.height_m * valid_pixels as f64 * area * obs.area_fraction * ML_PER_M3;
        let volume_ml = raw_ml.max(config.volume.volume_floor_ml);
        let sigma_ml = (config.volume.relative_sigma_for(volume_ml) * volume_ml)
            .max(config.volume.sigma_floor(volume_ml));

        let area_tag = if usable.is_some() {
            EvidenceTag::CameraIntrinsics
        } else {
            EvidenceTag::ReferencePixelArea
        };

        Some(IntegratedVolume {
            estimate: VolumeEstimate {
                mu_ml: volume_ml,
                sigma_ml,
                method: IntegrationMethod::Coarse,
                pixel_count: valid_pixels,
            },
            height_m: None,
            evidence: vec![EvidenceTag::CoarseIntegration, area_tag],
        })
    }
}

/// Per-pixel unprojection against a reference plane
#[derive(Debug, Clone, Copy, Default)]
pub struct PerPixelIntegrator;

impl PerPixelIntegrator {
    /// Plate plane from the nearest valid depth in the bottom band of the mask box
    pub fn estimate_plate_plane(
        frame: &DepthFrame,
        mask: &FoodRegionMask,
        config: &GeometryConfig,
    ) -> Option<ReferencePlane> {
        let (x0, y0, x1, y1) = mask.bounding_box.pixel_bounds(frame.width(), frame.height());
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        let band_rows = ((y1 - y0) as f64 * config.volume.plate_band_fraction).ceil() as usize;
        let band_start = y1 - band_rows.clamp(1, y1 - y0);

        let mut nearest: Option<f64> = None;
        for y in band_start..y1 {
            for x in x0..x1 {
                let d = frame.depth_at(x, y);
                if is_valid_depth(d, config.depth.min_valid_depth_m, config.depth.max_valid_depth_m)
                {
                    nearest = Some(nearest.map_or(d, |n: f64| n.min(d)));
                }
            }
        }
        nearest.map(ReferencePlane::flat_at_depth)
    }

    fn integrate(
        frame: &DepthFrame,
        intrinsics: &CameraIntrinsics,
        mask: &FoodRegionMask,
        plane: &ReferencePlane,
        config: &GeometryConfig,
    ) -> Option<(VolumeEstimate, f64)> {
        let vc: &VolumeConfig = &config.volume;
        let (w, h) = (frame.width(), frame.height());
        let mut volume_m3 = 0.0;
        let mut variance_m6 = 0.0;
        let mut heights = Vec::new();

        for y in 0..h {
            for x in 0..w {
                if !mask.contains(x, y, w, h, vc.mask_inside_threshold) {
                    continue;
                }
                let depth = frame.depth_at(x, y);
                if !is_valid_depth(depth, config.depth.min_valid_depth_m, config.depth.max_valid_depth_m)
                {
                    continue;
                }
                let confidence = frame.confidence_at(x, y);
                if !(confidence >= vc.min_confidence) || confidence <= 0.0 {
                    continue;
                }

                let point = intrinsics.unproject(x as f64, y as f64, depth);
                let height = plane.height_of(point).max(0.0);
                let area = (depth / intrinsics.fx) * (depth / intrinsics.fy);
                let depth_sigma = vc.sensor_noise.depth_uncertainty(depth, frame.source());

                volume_m3 += area * height;
                let pixel_sigma = area * depth_sigma / confidence;
                variance_m6 += pixel_sigma * pixel_sigma;
                heights.push(height);
            }
        }

        let count = heights.len();
        if count == 0 {
            return None;
        }
        let height_m = median(&heights).min(config.height.max_height_m);

        let volume_ml = (volume_m3 * ML_PER_M3).max(vc.volume_floor_ml);
        let mut sigma_ml = variance_m6.sqrt() * ML_PER_M3;
        if count < vc.min_pixels_full_confidence {
            sigma_ml *= vc.min_pixels_full_confidence as f64 / count as f64;
        }
        sigma_ml = sigma_ml.max(vc.sigma_floor(volume_ml));

        Some((
            VolumeEstimate {
                mu_ml: volume_ml,
                sigma_ml,
                method: IntegrationMethod::PerPixel,
                pixel_count: count,
            },
            height_m,
        ))
    }
}

impl VolumeEstimator for PerPixelIntegrator {
    fn name(&self) -> &'static str {
        "per_pixel"
    }

    fn estimate(
        &self,
        inputs: &VolumeInputs<'_>,
        config: &GeometryConfig,
    ) -> Option<IntegratedVolume> {
        let intrinsics = inputs.intrinsics.filter(|k| k.is_valid())?;
        let mask = inputs.mask?;

        let mut evidence = vec![EvidenceTag::PerPixelIntegration, EvidenceTag::CameraIntrinsics];
        let plane = match inputs.reference_plane {
            Some(plane) => *plane,
            None => match Self::estimate_plate_plane(inputs.frame, mask, config) {
                Some(plane) => {
                    evidence.push(EvidenceTag::EstimatedPlatePlane);
                    plane
                }
                None => {
                    tracing::warn!(
                        "No valid plate depth under mask; assuming plate at {:.2} m",
                        config.volume.default_plate_depth_m
                    );
                    evidence.push(EvidenceTag::DefaultPlatePlane);
                    ReferencePlane::flat_at_depth(config.volume.default_plate_depth_m)
                }
            },
        };

        let (estimate, height_m) = Self::integrate(inputs.frame, intrinsics, mask, &plane, config)?;
        tracing::debug!(
            volume_ml = estimate.mu_ml,
            sigma_ml = estimate.sigma_ml,
            pixels = estimate.pixel_count,
            height_m,
            "per-pixel integration"
        );
        Some(IntegratedVolume {
            estimate,
            height_m: Some(height_m),
            evidence,
        })
    }
}
