//! Replay a recorded capture session through the estimator
//!
//! Usage: replay_capture <recording.json> [config.json]
//!
//! Prints one line per frame and a final estimate fused with any other
//! sources stored in the recording.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use portion_geometry::config::GeometryConfig;
use portion_geometry::geometry::{FrameInput, PortionEstimator};
use portion_geometry::models::{
    CalorieEstimate, CameraIntrinsics, DepthFrame, FoodPriors, FoodRegionMask, GeometryOutcome,
    ReferencePlane, SensorSource,
};
use portion_geometry::uncertainty::fuse_estimates;

#[derive(Debug, Deserialize)]
struct Recording {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    intrinsics: Option<CameraIntrinsics>,
    #[serde(default)]
    priors: Option<FoodPriors>,
    #[serde(default)]
    sensor: SensorSource,
    frames: Vec<RecordedFrame>,
    /// Independent estimates to fuse with the geometry result
    #[serde(default)]
    other_estimates: Vec<CalorieEstimate>,
}

#[derive(Debug, Deserialize)]
struct RecordedFrame {
    width: usize,
    height: usize,
    depth: Vec<f32>,
    #[serde(default)]
    confidence: Option<Vec<f32>>,
    #[serde(default)]
    mask: Option<FoodRegionMask>,
    #[serde(default)]
    plate_depth_m: Option<f64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("portion_geometry=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let recording_path = match args.next() {
        Some(path) => PathBuf::from(path),
        None => {
            eprintln!("Usage: replay_capture <recording.json> [config.json]");
            std::process::exit(2);
        }
    };
    let config = match args.next() {
        Some(path) => GeometryConfig::load(&path)?,
        None => GeometryConfig::from_env()?.0,
    };

    let recording: Recording = serde_json::from_str(&std::fs::read_to_string(&recording_path)?)?;
    println!("Recording: {} ({} frames)", recording_path.display(), recording.frames.len());

    let estimator = PortionEstimator::new(Arc::new(config));
    let mut session = estimator.new_session();
    let mut last_estimate = None;

    for (i, recorded) in recording.frames.into_iter().enumerate() {
        let frame = DepthFrame::from_f32(
            recorded.width,
            recorded.height,
            &recorded.depth,
            recorded.confidence.as_deref(),
            recording.sensor,
        )?;
        let input = FrameInput {
            frame: Some(frame),
            intrinsics: recording.intrinsics,
            mask: recorded.mask,
            priors: recording.priors,
            label: recording.label.clone(),
            reference_plane: recorded.plate_depth_m.map(ReferencePlane::flat_at_depth),
        };

        match estimator.estimate_frame(&input, &mut session) {
            GeometryOutcome::Estimate(estimate) => {
                println!(
                    "  frame {:>3}: {:.0} mL ({}) -> {:.0} ± {:.0} kcal, plausibility {:.2}",
                    i + 1,
                    estimate.volume_ml,
                    estimate.household_measure,
                    estimate.calories,
                    estimate.sigma,
                    estimate.plausibility
                );
                last_estimate = Some(estimate);
            }
            GeometryOutcome::Absent(reason) => {
                println!("  frame {:>3}: no estimate ({})", i + 1, reason.describe());
            }
        }
    }

    let Some(estimate) = last_estimate else {
        println!("No frame produced an estimate.");
        return Ok(());
    };
    println!(
        "Geometry: {} {:.0} ± {:.0} kcal",
        estimate.label, estimate.calories, estimate.sigma
    );

    let mut sources = vec![estimate.calorie_estimate()];
    sources.extend(recording.other_estimates);
    if sources.len() > 1 {
        let penalty = estimator.config().uncertainty.correlation_penalty;
        match fuse_estimates(&sources, penalty) {
            Some(fused) => println!(
                "Fused ({} sources): {:.0} ± {:.0} kcal",
                sources.len(),
                fused.mu,
                fused.sigma
            ),
            None => println!("No usable sources to fuse."),
        }
    }

    Ok(())
}
