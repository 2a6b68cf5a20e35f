//! Estimate types returned by the pipeline
//!
//! Nothing here is retained between calls.

use serde::{Deserialize, Serialize};

/// Which integrator produced a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationMethod {
    /// Area x height
    Coarse,
    /// Per-pixel unprojection against a reference plane
    PerPixel,
}

/// Volume in milliliters with one-sigma uncertainty
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeEstimate {
    pub mu_ml: f64,
    pub sigma_ml: f64,
    pub method: IntegrationMethod,
    /// Pixels that contributed to the integral
    pub pixel_count: usize,
}

/// Where an independent calorie estimate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EstimateSource {
    #[default]
    Geometry,
    VisionService,
    FoodDatabase,
    UserReported,
    Fused,
}

impl EstimateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EstimateSource::Geometry => "geometry",
            EstimateSource::VisionService => "vision_service",
            EstimateSource::FoodDatabase => "food_database",
            EstimateSource::UserReported => "user_reported",
            EstimateSource::Fused => "fused",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "vision_service" | "vision" => EstimateSource::VisionService,
            "food_database" | "database" => EstimateSource::FoodDatabase,
            "user_reported" | "user" => EstimateSource::UserReported,
            "fused" => EstimateSource::Fused,
            _ => EstimateSource::Geometry,
        }
    }
}

/// Calorie estimate (kcal) with one-sigma uncertainty
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalorieEstimate {
    pub mu: f64,
    pub sigma: f64,
    #[serde(default)]
    pub source: EstimateSource,
}

impl CalorieEstimate {
    pub fn new(mu: f64, sigma: f64, source: EstimateSource) -> Self {
        Self {
            mu,
            sigma: sigma.abs(),
            source,
        }
    }
}

/// Evidence that shaped a geometry estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceTag {
    /// Food area taken from a supplied segmentation mask
    SegmentationMask,
    /// Food area inferred from the depth-percentile band
    DepthPercentileBand,
    /// Heuristic area above the failure threshold; fallback constant used
    AreaFallback,
    /// Heuristic area soft-capped
    AreaClamped,
    /// Pixel area from camera intrinsics
    CameraIntrinsics,
    /// Pixel area from the calibrated reference area
    ReferencePixelArea,
    /// Area/depth/height smoothed across frames
    TemporallySmoothed,
    CoarseIntegration,
    PerPixelIntegration,
    /// Reference plane estimated from the mask's bottom band
    EstimatedPlatePlane,
    /// Neither supplied nor estimable; default plate depth used
    DefaultPlatePlane,
    /// Uncertainty inflated for low plausibility
    LowPlausibility,
    /// Density/energy priors supplied by a classifier
    ClassifierPriors,
    DefaultPriors,
}

/// A complete geometry-derived estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryEstimate {
    pub label: String,
    pub volume_ml: f64,
    pub volume_sigma_ml: f64,
    pub mass_g: f64,
    pub calories: f64,
    pub sigma: f64,
    pub height_m: f64,
    pub area_fraction: f64,
    pub plausibility: f64,
    pub household_measure: String,
    pub evidence: Vec<EvidenceTag>,
}

impl GeometryEstimate {
    /// The calorie part, ready for source fusion
    pub fn calorie_estimate(&self) -> CalorieEstimate {
        CalorieEstimate::new(self.calories, self.sigma, EstimateSource::Geometry)
    }
}

/// Why no geometry estimate was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbsentReason {
    /// Depth frame absent or empty
    MissingInput,
    /// No depth sample inside the validity interval
    NoValidDepth,
    /// No measurable relief between food and background
    FlatScene,
    /// Height or volume beyond the hard z-score threshold
    ExtremeOutlier { height_z: f64, volume_z: f64 },
}

impl AbsentReason {
    pub fn describe(&self) -> String {
        match self {
            AbsentReason::MissingInput => "no depth frame supplied".to_string(),
            AbsentReason::NoValidDepth => "no valid depth samples in frame".to_string(),
            AbsentReason::FlatScene => {
                "food is not measurably above the surrounding surface".to_string()
            }
            AbsentReason::ExtremeOutlier { height_z, volume_z } => format!(
                "implausible geometry (height z={:.1}, volume z={:.1})",
                height_z, volume_z
            ),
        }
    }
}

/// Estimate or explicit absence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GeometryOutcome {
    Estimate(GeometryEstimate),
    Absent(AbsentReason),
}

impl GeometryOutcome {
    pub fn estimate(&self) -> Option<&GeometryEstimate> {
        match self {
            GeometryOutcome::Estimate(e) => Some(e),
            GeometryOutcome::Absent(_) => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, GeometryOutcome::Absent(_))
    }
}
