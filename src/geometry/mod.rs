//! Depth geometry
//!
//! From a depth frame to a validated volume:
//! pixel area, food region, height, temporal smoothing, plausibility,
//! volume integration, and the pipeline tying them together.

pub mod food_region;
pub mod height;
pub mod pipeline;
pub mod pixel_area;
pub mod plausibility;
pub mod temporal;
pub mod volume;

pub use food_region::{apply_soft_caps, detect_food_region, FoodRegion, RegionSource};
pub use height::estimate_height;
pub use pipeline::{
    Classification, DefaultPriorsClassifier, FoodClassifier, FrameInput, NoSegmenter,
    PortionEstimator, Segmenter,
};
pub use pixel_area::pixel_area_m2;
pub use plausibility::{plausibility, z_score, PlausibilityAssessment, PlausibilityValidator};
pub use temporal::{FrameObservation, TemporalFusionState};
pub use volume::{CoarseIntegrator, IntegratedVolume, PerPixelIntegrator, VolumeEstimator, VolumeInputs};
