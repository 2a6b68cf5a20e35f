//! Estimation MCP Tools
//!
//! Capture sessions, one-shot estimates, volume conversion and source fusion.

use serde::Serialize;

use crate::config::GeometryConfig;
use crate::geometry::{FrameInput, PortionEstimator};
use crate::models::{
    CalorieEstimate, FoodPriors, FoodRegionMask, GeometryEstimate, GeometryOutcome, MaskBitmap,
    NormalizedRect, PriorStat,
};
use crate::nutrition::{household_measure, mass_grams, volume_to_ml};
use crate::tools::sessions::{SessionRegistry, SessionSummary};
use crate::uncertainty::{fuse_estimates, propagate_calories, relative_uncertainty};

const FULL_FRAME: NormalizedRect = NormalizedRect {
    x: 0.0,
    y: 0.0,
    width: 1.0,
    height: 1.0,
};

/// Build a mask from a box, a grayscale image, or both
///
/// An image without a box gets the box around its bright pixels.
pub fn load_mask(
    bounding_box: Option<NormalizedRect>,
    png_path: Option<&str>,
    confidence: f64,
    threshold: f64,
) -> Result<Option<FoodRegionMask>, String> {
    let bitmap = match png_path {
        Some(path) => {
            let bitmap = MaskBitmap::from_image_file(path)
                .map_err(|e| format!("Failed to load mask {}: {}", path, e))?;
            tracing::debug!(
                path,
                width = bitmap.width(),
                height = bitmap.height(),
                "loaded mask bitmap"
            );
            Some(bitmap)
        }
        None => None,
    };
    let bounding_box = match (bounding_box, bitmap.as_ref()) {
        (Some(rect), _) => rect,
        (None, Some(bitmap)) => bitmap.bounding_box(threshold).unwrap_or(FULL_FRAME),
        (None, None) => return Ok(None),
    };
    Ok(Some(FoodRegionMask {
        bounding_box,
        bitmap,
        confidence: confidence.clamp(0.0, 1.0),
    }))
}

/// Outcome plus a plain-language note when no estimate was produced
#[derive(Debug, Serialize)]
pub struct EstimateResponse {
    pub outcome: GeometryOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<GeometryOutcome> for EstimateResponse {
    fn from(outcome: GeometryOutcome) -> Self {
        let message = match outcome {
            GeometryOutcome::Absent(ref reason) => Some(reason.describe()),
            GeometryOutcome::Estimate(_) => None,
        };
        Self { outcome, message }
    }
}

/// Response for start_capture_session
#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: u64,
    pub min_frames_for_smoothing: u32,
    pub message: String,
}

/// Response for submit_depth_frame
#[derive(Debug, Serialize)]
pub struct SubmitFrameResponse {
    pub session_id: u64,
    pub frame_number: u32,
    pub smoothing_ready: bool,
    pub outcome: GeometryOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response for end_capture_session
#[derive(Debug, Serialize)]
pub struct EndSessionResponse {
    pub summary: SessionSummary,
    pub final_estimate: Option<GeometryEstimate>,
    pub calories: Option<CalorieEstimate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_absent_reason: Option<String>,
}

/// Response for convert_volume_to_calories
#[derive(Debug, Serialize)]
pub struct VolumeConversionResponse {
    pub volume_ml: f64,
    pub volume_sigma_ml: f64,
    pub household_measure: String,
    pub mass_g: f64,
    pub calories: CalorieEstimate,
    pub relative_uncertainty: f64,
}

/// Response for fuse_calorie_estimates
#[derive(Debug, Serialize)]
pub struct FusionResponse {
    pub fused: CalorieEstimate,
    pub sources_used: usize,
    pub sources_skipped: usize,
    pub correlation_penalty: f64,
}

/// Response for get_geometry_config
#[derive(Debug, Serialize)]
pub struct ConfigResponse<'a> {
    pub source: String,
    pub config: &'a GeometryConfig,
}

/// Estimate a single frame with no session history
pub fn estimate_portion(
    estimator: &PortionEstimator,
    input: &FrameInput,
) -> Result<EstimateResponse, String> {
    Ok(estimator.estimate_once(input).into())
}

/// Open a new capture session
pub fn start_capture_session(
    registry: &mut SessionRegistry,
    estimator: &PortionEstimator,
) -> Result<StartSessionResponse, String> {
    let session_id = registry.start(estimator.new_session());
    let min_frames = estimator.config().temporal.min_frames;
    Ok(StartSessionResponse {
        session_id,
        min_frames_for_smoothing: min_frames,
        message: format!(
            "Session {} started. Submit frames of the same plate; smoothing starts at frame {}.",
            session_id, min_frames
        ),
    })
}

/// Run one frame through a session's smoothing state
pub fn submit_depth_frame(
    registry: &mut SessionRegistry,
    estimator: &PortionEstimator,
    session_id: u64,
    input: &FrameInput,
) -> Result<SubmitFrameResponse, String> {
    let session = registry
        .get_mut(session_id)
        .ok_or_else(|| format!("Capture session {} not found", session_id))?;

    let outcome = estimator.estimate_frame(input, &mut session.state);
    session.record(&outcome);

    let EstimateResponse { outcome, message } = outcome.into();
    Ok(SubmitFrameResponse {
        session_id,
        frame_number: session.frames_submitted,
        smoothing_ready: session.state.is_ready(),
        outcome,
        message,
    })
}

/// Close a session and report its last accepted estimate
pub fn end_capture_session(
    registry: &mut SessionRegistry,
    session_id: u64,
) -> Result<EndSessionResponse, String> {
    let session = registry
        .end(session_id)
        .ok_or_else(|| format!("Capture session {} not found", session_id))?;

    let calories = session.last_estimate.as_ref().map(|e| e.calorie_estimate());
    Ok(EndSessionResponse {
        summary: session.summary(),
        calories,
        last_absent_reason: session.last_absent.as_ref().map(|r| r.describe()),
        final_estimate: session.last_estimate,
    })
}

/// Calories for a volume measured some other way
pub fn convert_volume_to_calories(
    amount: f64,
    sigma: f64,
    unit: &str,
    priors: Option<FoodPriors>,
    config: &GeometryConfig,
) -> Result<VolumeConversionResponse, String> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(format!("Volume must be a non-negative number, got {}", amount));
    }
    let volume_ml = volume_to_ml(amount, unit).ok_or_else(|| {
        format!(
            "Unknown volume unit '{}'. Use ml, l, tsp, tbsp, fl oz, or cup.",
            unit
        )
    })?;
    let volume_sigma_ml = volume_to_ml(sigma.abs(), unit).unwrap_or(0.0);
    let priors = priors.unwrap_or(config.default_priors);

    let calories = propagate_calories(
        PriorStat::new(volume_ml, volume_sigma_ml),
        &priors,
        config.uncertainty.min_calorie_sigma_kcal,
    );

    Ok(VolumeConversionResponse {
        volume_ml,
        volume_sigma_ml,
        household_measure: household_measure(volume_ml),
        mass_g: mass_grams(volume_ml, priors.density.mu),
        relative_uncertainty: relative_uncertainty(calories.mu, calories.sigma),
        calories,
    })
}

/// Inverse-variance fusion of independent calorie estimates
pub fn fuse_calorie_estimates(
    estimates: &[CalorieEstimate],
    correlation_penalty: Option<f64>,
    config: &GeometryConfig,
) -> Result<FusionResponse, String> {
    let penalty = correlation_penalty
        .unwrap_or(config.uncertainty.correlation_penalty)
        .max(1.0);
    let usable = estimates
        .iter()
        .filter(|e| e.mu.is_finite() && e.sigma.is_finite() && e.sigma > 0.0)
        .count();
    let fused = fuse_estimates(estimates, penalty)
        .ok_or_else(|| "No estimate with a positive, finite sigma to fuse".to_string())?;

    Ok(FusionResponse {
        fused,
        sources_used: usable,
        sources_skipped: estimates.len() - usable,
        correlation_penalty: penalty,
    })
}

/// The active configuration and where it came from
pub fn get_geometry_config<'a>(
    config: &'a GeometryConfig,
    source: String,
) -> Result<ConfigResponse<'a>, String> {
    Ok(ConfigResponse { source, config })
}
