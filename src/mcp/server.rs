//! Portion Geometry MCP Server Implementation
//!
//! Implements the MCP server with all estimation tools.

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::{schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::GeometryConfig;
use crate::geometry::{FrameInput, PortionEstimator};
use crate::models::{
    CalorieEstimate, CameraIntrinsics, DepthFrame, EstimateSource, FoodPriors, NormalizedRect,
    PriorStat, ReferencePlane, SensorSource,
};
use crate::tools::estimation;
use crate::tools::sessions::SessionRegistry;
use crate::tools::status::StatusTracker;

/// Portion Geometry MCP Service
#[derive(Clone)]
pub struct GeometryService {
    status_tracker: Arc<Mutex<StatusTracker>>,
    estimator: Arc<PortionEstimator>,
    sessions: Arc<std::sync::Mutex<SessionRegistry>>,
    tool_router: ToolRouter<GeometryService>,
}

impl GeometryService {
    pub fn new(config: GeometryConfig, config_path: Option<PathBuf>) -> Self {
        let sessions = SessionRegistry::with_limits(&config.sessions);
        Self {
            status_tracker: Arc::new(Mutex::new(StatusTracker::new(config_path))),
            estimator: Arc::new(PortionEstimator::new(Arc::new(config))),
            sessions: Arc::new(std::sync::Mutex::new(sessions)),
            tool_router: Self::tool_router(),
        }
    }

    fn lock_sessions(&self) -> Result<std::sync::MutexGuard<'_, SessionRegistry>, McpError> {
        self.sessions
            .lock()
            .map_err(|e| McpError::internal_error(format!("Session registry poisoned: {}", e), None))
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("Serialization error: {}", e), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

// ============================================================================
// Frame Parameter Structs
// ============================================================================

#[derive(Debug, Clone, Copy, Deserialize, schemars::JsonSchema)]
pub struct IntrinsicsParams {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// Resolution the intrinsics were calibrated at
    pub image_width: usize,
    pub image_height: usize,
}

#[derive(Debug, Clone, Copy, Deserialize, schemars::JsonSchema)]
pub struct BoxParams {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, Deserialize, schemars::JsonSchema)]
pub struct PriorParams {
    pub mean: f64,
    pub sigma: f64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FrameParams {
    pub width: usize,
    pub height: usize,
    /// Row-major depth in meters
    pub depth: Vec<f32>,
    #[serde(default)]
    pub confidence: Option<Vec<f32>>,
    /// lidar, stereo, structure_from_motion, monocular
    #[serde(default)]
    pub sensor: Option<String>,
    #[serde(default)]
    pub intrinsics: Option<IntrinsicsParams>,
    #[serde(default)]
    pub mask_box: Option<BoxParams>,
    #[serde(default)]
    pub mask_png_path: Option<String>,
    #[serde(default = "default_mask_confidence")]
    pub mask_confidence: f64,
    #[serde(default)]
    pub plate_depth_m: Option<f64>,
    #[serde(default)]
    pub label: Option<String>,
    /// g/mL
    #[serde(default)]
    pub density: Option<PriorParams>,
    /// kcal/g
    #[serde(default)]
    pub energy_density: Option<PriorParams>,
}

fn default_mask_confidence() -> f64 { 1.0 }

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SubmitFrameParams {
    pub session_id: u64,
    #[serde(flatten)]
    pub frame: FrameParams,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SessionIdParams {
    pub session_id: u64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ConvertVolumeParams {
    pub volume: f64,
    #[serde(default)]
    pub volume_sigma: f64,
    #[serde(default = "default_volume_unit")]
    pub unit: String,
    #[serde(default)]
    pub density: Option<PriorParams>,
    #[serde(default)]
    pub energy_density: Option<PriorParams>,
}

fn default_volume_unit() -> String { "ml".to_string() }

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CalorieSourceParams {
    pub calories: f64,
    pub sigma: f64,
    /// geometry, vision_service, food_database, user_reported
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FuseEstimatesParams {
    pub estimates: Vec<CalorieSourceParams>,
    /// >= 1; larger when sources share upstream evidence
    #[serde(default)]
    pub correlation_penalty: Option<f64>,
}

fn priors_from(
    density: Option<PriorParams>,
    energy_density: Option<PriorParams>,
    defaults: &FoodPriors,
) -> Option<FoodPriors> {
    if density.is_none() && energy_density.is_none() {
        return None;
    }
    let stat = |p: Option<PriorParams>, fallback: PriorStat| {
        p.map(|p| PriorStat::new(p.mean, p.sigma)).unwrap_or(fallback)
    };
    Some(FoodPriors::new(
        stat(density, defaults.density),
        stat(energy_density, defaults.energy_density),
    ))
}

impl GeometryService {
    fn frame_input(&self, p: FrameParams) -> Result<FrameInput, McpError> {
        let config = self.estimator.config();
        let source = match p.sensor.as_deref() {
            Some(s) => SensorSource::from_str(s).ok_or_else(|| {
                McpError::invalid_params(format!("Unknown sensor source '{}'", s), None)
            })?,
            None => SensorSource::default(),
        };
        let frame = DepthFrame::from_f32(p.width, p.height, &p.depth, p.confidence.as_deref(), source)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;

        let mask = estimation::load_mask(
            p.mask_box.map(|b| NormalizedRect { x: b.x, y: b.y, width: b.width, height: b.height }),
            p.mask_png_path.as_deref(),
            p.mask_confidence,
            config.volume.mask_inside_threshold,
        )
        .map_err(|e| McpError::invalid_params(e, None))?;

        Ok(FrameInput {
            frame: Some(frame),
            intrinsics: p.intrinsics.map(|k| CameraIntrinsics {
                fx: k.fx,
                fy: k.fy,
                cx: k.cx,
                cy: k.cy,
                image_width: k.image_width,
                image_height: k.image_height,
            }),
            mask,
            priors: priors_from(p.density, p.energy_density, &config.default_priors),
            label: p.label,
            reference_plane: p.plate_depth_m.map(ReferencePlane::flat_at_depth),
        })
    }
}

// ============================================================================
// Tool Router
// ============================================================================

#[tool_router]
impl GeometryService {
    // --- Status ---

    #[tool(description = "Get the current status of the Portion Geometry service including build info, configuration source, open capture sessions, and process information")]
    async fn geometry_status(&self) -> Result<CallToolResult, McpError> {
        let active = self.lock_sessions()?.active_count();
        let tracker = self.status_tracker.lock().await;
        to_json(&tracker.get_status(active))
    }

    #[tool(description = "Get step-by-step instructions for capturing depth frames and reporting calorie estimates with uncertainty. Call this before the first estimate in a conversation.")]
    fn estimation_instructions(&self) -> Result<CallToolResult, McpError> {
        use crate::tools::status::ESTIMATION_INSTRUCTIONS;
        Ok(CallToolResult::success(vec![Content::text(ESTIMATION_INSTRUCTIONS)]))
    }

    #[tool(description = "Get the active estimator configuration (thresholds, smoothing, calibration, uncertainty settings) and where it was loaded from")]
    async fn get_geometry_config(&self) -> Result<CallToolResult, McpError> {
        let source = self.status_tracker.lock().await.config_source();
        let result = estimation::get_geometry_config(self.estimator.config(), source)
            .map_err(|e| McpError::internal_error(e, None))?;
        to_json(&result)
    }

    // --- Capture Sessions ---

    #[tool(description = "Start a capture session for one plate. Frames submitted to the session are smoothed together.")]
    fn start_capture_session(&self) -> Result<CallToolResult, McpError> {
        let mut sessions = self.lock_sessions()?;
        let result = estimation::start_capture_session(&mut sessions, &self.estimator)
            .map_err(|e| McpError::internal_error(e, None))?;
        to_json(&result)
    }

    #[tool(description = "Submit one depth frame to a capture session. Returns a calorie estimate with sigma, or the reason no estimate could be made.")]
    fn submit_depth_frame(&self, Parameters(p): Parameters<SubmitFrameParams>) -> Result<CallToolResult, McpError> {
        let input = self.frame_input(p.frame)?;
        let mut sessions = self.lock_sessions()?;
        let result = estimation::submit_depth_frame(&mut sessions, &self.estimator, p.session_id, &input)
            .map_err(|e| McpError::internal_error(e, None))?;
        to_json(&result)
    }

    #[tool(description = "End a capture session and return its last accepted estimate")]
    fn end_capture_session(&self, Parameters(p): Parameters<SessionIdParams>) -> Result<CallToolResult, McpError> {
        let mut sessions = self.lock_sessions()?;
        let result = estimation::end_capture_session(&mut sessions, p.session_id)
            .map_err(|e| McpError::internal_error(e, None))?;
        to_json(&result)
    }

    // --- One-shot Estimation ---

    #[tool(description = "Estimate volume, mass and calories from a single depth frame without a session")]
    fn estimate_portion(&self, Parameters(p): Parameters<FrameParams>) -> Result<CallToolResult, McpError> {
        let input = self.frame_input(p)?;
        let result = estimation::estimate_portion(&self.estimator, &input)
            .map_err(|e| McpError::internal_error(e, None))?;
        to_json(&result)
    }

    #[tool(description = "Convert a known volume (ml, l, tsp, tbsp, fl oz, cup) into calories with propagated uncertainty")]
    fn convert_volume_to_calories(&self, Parameters(p): Parameters<ConvertVolumeParams>) -> Result<CallToolResult, McpError> {
        let config = self.estimator.config();
        let priors = priors_from(p.density, p.energy_density, &config.default_priors);
        let result = estimation::convert_volume_to_calories(p.volume, p.volume_sigma, &p.unit, priors, config)
            .map_err(|e| McpError::internal_error(e, None))?;
        to_json(&result)
    }

    #[tool(description = "Fuse independent calorie estimates (mean and sigma each) into one by inverse-variance weighting")]
    fn fuse_calorie_estimates(&self, Parameters(p): Parameters<FuseEstimatesParams>) -> Result<CallToolResult, McpError> {
        let estimates: Vec<CalorieEstimate> = p
            .estimates
            .iter()
            .map(|e| {
                let source = e.source.as_deref().map(EstimateSource::from_str).unwrap_or_default();
                CalorieEstimate::new(e.calories, e.sigma, source)
            })
            .collect();
        let result = estimation::fuse_calorie_estimates(&estimates, p.correlation_penalty, self.estimator.config())
            .map_err(|e| McpError::internal_error(e, None))?;
        to_json(&result)
    }
}

#[tool_handler]
impl ServerHandler for GeometryService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "portion-geometry".into(),
                version: crate::build_info::VERSION.into(),
                title: Some("Portion Geometry".into()),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Portion Geometry - food volume and calorie estimation from depth frames, with uncertainty. \
                 IMPORTANT: Call estimation_instructions first. Always report calories as mean ± sigma. \
                 Sessions: start_capture_session, submit_depth_frame (repeat), end_capture_session. \
                 One-shot: estimate_portion. \
                 Conversion: convert_volume_to_calories. \
                 Fusion: fuse_calorie_estimates. \
                 Status: geometry_status, get_geometry_config."
                    .into(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priors_from_partial_params() {
        let defaults = FoodPriors::default();
        assert!(priors_from(None, None, &defaults).is_none());

        let priors = priors_from(Some(PriorParams { mean: 0.8, sigma: -0.1 }), None, &defaults).unwrap();
        assert_eq!(priors.density, PriorStat::new(0.8, 0.1));
        assert_eq!(priors.energy_density, defaults.energy_density);
    }

    #[test]
    fn test_frame_input_conversion() {
        let service = GeometryService::new(GeometryConfig::default(), None);
        let params: FrameParams = serde_json::from_value(serde_json::json!({
            "width": 2,
            "height": 1,
            "depth": [0.5, 0.6],
            "sensor": "stereo",
            "mask_box": {"x": 0.0, "y": 0.0, "width": 0.5, "height": 1.0},
            "plate_depth_m": 0.6
        }))
        .unwrap();
        let input = service.frame_input(params).unwrap();
        let frame = input.frame.unwrap();
        assert_eq!(frame.source(), SensorSource::Stereo);
        assert_eq!(input.mask.unwrap().confidence, 1.0);
        assert_eq!(input.reference_plane, Some(ReferencePlane::flat_at_depth(0.6)));
        assert!(input.priors.is_none());
    }

    #[test]
    fn test_frame_input_rejects_bad_sensor_and_length() {
        let service = GeometryService::new(GeometryConfig::default(), None);
        let bad_sensor: FrameParams = serde_json::from_value(serde_json::json!({
            "width": 1, "height": 1, "depth": [0.5], "sensor": "sonar"
        }))
        .unwrap();
        assert!(service.frame_input(bad_sensor).is_err());

        let short: FrameParams = serde_json::from_value(serde_json::json!({
            "width": 2, "height": 2, "depth": [0.5]
        }))
        .unwrap();
        assert!(service.frame_input(short).is_err());
    }
}
