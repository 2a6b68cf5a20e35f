//! Data models
//!
//! Value types flowing through the estimation pipeline.

mod camera;
mod estimate;
mod frame;
mod mask;
mod priors;

pub use camera::{CameraIntrinsics, ReferencePlane};
pub use estimate::{
    AbsentReason, CalorieEstimate, EstimateSource, EvidenceTag, GeometryEstimate,
    GeometryOutcome, IntegrationMethod, VolumeEstimate,
};
pub use frame::{is_valid_depth, DepthFrame, FrameError, SensorSource};
pub use mask::{FoodRegionMask, MaskBitmap, MaskError, NormalizedRect};
pub use priors::{FoodPriors, PriorStat};
