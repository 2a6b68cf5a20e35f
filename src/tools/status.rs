//! Portion Geometry Status Tool
//!
//! Provides runtime status information about the estimator service.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::build_info::BuildInfo;

/// Capture and estimation workflow for AI assistants
pub const ESTIMATION_INSTRUCTIONS: &str = r#"
# Portion Geometry Estimation Instructions

This guide explains how to turn depth captures into calorie estimates with
the Portion Geometry tools.

## Overview

Every estimate is a **mean and a one-sigma uncertainty**. Never report the
calorie number without its sigma.

1. **Capture session** - several depth frames of the same plate, smoothed together
2. **One-shot estimate** - a single frame, no smoothing
3. **Fusion** - combine the geometry estimate with other independent sources

---

## Capture Session Workflow

1. `start_capture_session` - returns a `session_id`
2. `submit_depth_frame` for each frame (same plate, camera roughly still)
   - The first frame reports raw per-frame values
   - From the second frame on, area, depth and height are smoothed
3. `end_capture_session` - returns the last accepted estimate and frame counts

Sessions are independent. Start a new session for every plate.

## Frame Fields

| Field | Required | Notes |
|-------|----------|-------|
| width, height | yes | depth map dimensions |
| depth | yes | row-major meters, `width * height` values |
| confidence | no | per-pixel 0..1; pixels below 0.3 are ignored |
| sensor | no | lidar (default), stereo, structure_from_motion, monocular |
| intrinsics | no | fx, fy, cx, cy, image_width, image_height |
| mask_box | no | normalized x, y, width, height of the food |
| mask_png_path | no | grayscale mask image; bright = food |
| plate_depth_m | no | known plate distance; otherwise estimated |
| label, density, energy_density | no | food name and priors (mean + sigma) |

**Best accuracy:** intrinsics + mask. Without them the estimator falls back to
a depth-percentile heuristic and a coarse area x height volume.

---

## Outcomes

| Outcome | Meaning | What to do |
|---------|---------|------------|
| `estimate` | volume, mass, calories, sigma, evidence | report mean ± sigma |
| `absent: missing_input` | no depth frame | use non-geometric evidence |
| `absent: no_valid_depth` | every pixel invalid | recapture |
| `absent: flat_scene` | food not above the plate by depth | supply a mask or recapture at an angle |
| `absent: extreme_outlier` | implausible height or volume | recapture; do not report |

The `evidence` list says how the estimate was built (mask vs. heuristic,
per-pixel vs. coarse, plate plane estimated, low plausibility, ...).
`low_plausibility` means sigma was widened, not that the estimate is wrong.

---

## Combining Sources

Use `fuse_calorie_estimates` with the geometry estimate plus any independent
estimates (vision service, food database, user report). Sources that share
upstream evidence are not independent: pass `correlation_penalty` > 1.

Use `convert_volume_to_calories` when a volume is known some other way
(e.g. "about 1.5 cups").
"#;

/// Runtime status of the estimator service
#[derive(Debug, Clone, Serialize)]
pub struct GeometryStatus {
    /// Build information
    pub build_number: u64,
    pub build_timestamp: &'static str,
    pub build_profile: &'static str,
    pub version: &'static str,

    /// Configuration information
    pub config_source: String,
    pub active_sessions: usize,

    /// Process information
    pub uptime_seconds: u64,
    pub process_id: u32,
    pub memory_usage_bytes: u64,
}

/// Status tracker for collecting runtime information
pub struct StatusTracker {
    start_time: Instant,
    config_path: Option<PathBuf>,
}

impl StatusTracker {
    /// Create a new status tracker
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self {
            start_time: Instant::now(),
            config_path,
        }
    }

    /// Where the active configuration came from
    pub fn config_source(&self) -> String {
        match self.config_path {
            Some(ref path) => path.display().to_string(),
            None => "built-in defaults".to_string(),
        }
    }

    /// Get the current status
    pub fn get_status(&self, active_sessions: usize) -> GeometryStatus {
        let build_info = BuildInfo::current();

        let pid = std::process::id();
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]));

        let memory_usage_bytes = sys
            .process(Pid::from_u32(pid))
            .map(|p| p.memory())
            .unwrap_or(0);

        GeometryStatus {
            build_number: build_info.build_number,
            build_timestamp: build_info.build_timestamp,
            build_profile: build_info.profile,
            version: build_info.version,
            config_source: self.config_source(),
            active_sessions,
            uptime_seconds: self.start_time.elapsed().as_secs(),
            process_id: pid,
            memory_usage_bytes,
        }
    }
}
