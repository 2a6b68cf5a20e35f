//! Depth frame model
//!
//! One sensor capture. Widened to f64 on construction; never persisted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Frame construction errors
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("Depth frame has zero width or height ({width}x{height})")]
    EmptyDimensions { width: usize, height: usize },

    #[error("Depth buffer has {actual} samples, expected {expected}")]
    DepthLength { expected: usize, actual: usize },

    #[error("Confidence buffer has {actual} samples, expected {expected}")]
    ConfidenceLength { expected: usize, actual: usize },

    #[error("Depth frame dimensions {width}x{height} overflow the pixel count")]
    TooLarge { width: usize, height: usize },
}

/// Depth sensing technology that produced a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SensorSource {
    #[default]
    Lidar,
    Stereo,
    StructureFromMotion,
    Monocular,
}

impl SensorSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorSource::Lidar => "lidar",
            SensorSource::Stereo => "stereo",
            SensorSource::StructureFromMotion => "structure_from_motion",
            SensorSource::Monocular => "monocular",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "lidar" => Some(SensorSource::Lidar),
            "stereo" => Some(SensorSource::Stereo),
            "structure_from_motion" | "sfm" => Some(SensorSource::StructureFromMotion),
            "monocular" | "mono" => Some(SensorSource::Monocular),
            _ => None,
        }
    }
}

/// A single depth capture in meters, row-major
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDepthFrame")]
pub struct DepthFrame {
    width: usize,
    height: usize,
    depth: Vec<f64>,
    confidence: Option<Vec<f64>>,
    source: SensorSource,
}

/// Wire shape of [`DepthFrame`]; deserialization goes through [`DepthFrame::new`]
#[derive(Deserialize)]
struct RawDepthFrame {
    width: usize,
    height: usize,
    depth: Vec<f64>,
    #[serde(default)]
    confidence: Option<Vec<f64>>,
    #[serde(default)]
    source: SensorSource,
}

impl TryFrom<RawDepthFrame> for DepthFrame {
    type Error = FrameError;

    fn try_from(raw: RawDepthFrame) -> Result<Self, Self::Error> {
        DepthFrame::new(raw.width, raw.height, raw.depth, raw.confidence, raw.source)
    }
}

impl DepthFrame {
    /// Build a frame from sensor-width buffers
    pub fn from_f32(
        width: usize,
        height: usize,
        depth: &[f32],
        confidence: Option<&[f32]>,
        source: SensorSource,
    ) -> Result<Self, FrameError> {
        Self::new(
            width,
            height,
            depth.iter().map(|&d| f64::from(d)).collect(),
            confidence.map(|c| c.iter().map(|&v| f64::from(v)).collect()),
            source,
        )
    }

    /// Build a frame from f64 buffers
    pub fn new(
        width: usize,
        height: usize,
        depth: Vec<f64>,
        confidence: Option<Vec<f64>>,
        source: SensorSource,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyDimensions { width, height });
        }
        let expected = width
            .checked_mul(height)
            .ok_or(FrameError::TooLarge { width, height })?;
        if depth.len() != expected {
            return Err(FrameError::DepthLength {
                expected,
                actual: depth.len(),
            });
        }
        if let Some(ref conf) = confidence {
            if conf.len() != expected {
                return Err(FrameError::ConfidenceLength {
                    expected,
                    actual: conf.len(),
                });
            }
        }
        Ok(Self {
            width,
            height,
            depth,
            confidence,
            source,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn source(&self) -> SensorSource {
        self.source
    }

    pub fn depth(&self) -> &[f64] {
        &self.depth
    }

    pub fn has_confidence(&self) -> bool {
        self.confidence.is_some()
    }

    /// Depth at pixel (x, y)
    pub fn depth_at(&self, x: usize, y: usize) -> f64 {
        self.depth[y * self.width + x]
    }

    /// Confidence at pixel (x, y); 1.0 when the frame has no confidence map
    pub fn confidence_at(&self, x: usize, y: usize) -> f64 {
        self.confidence
            .as_ref()
            .map(|c| c[y * self.width + x])
            .unwrap_or(1.0)
    }

    /// Depths inside the open interval (min, max), in pixel order
    pub fn valid_depths(&self, min_depth_m: f64, max_depth_m: f64) -> Vec<f64> {
        self.depth
            .iter()
            .copied()
            .filter(|&d| is_valid_depth(d, min_depth_m, max_depth_m))
            .collect()
    }
}

/// Whether a depth sample lies inside the open validity interval
pub fn is_valid_depth(depth: f64, min_depth_m: f64, max_depth_m: f64) -> bool {
    depth.is_finite() && depth > min_depth_m && depth < max_depth_m
}
