//! Geometry configuration
//!
//! Every tunable threshold of the estimator in one serializable bundle.
//! Built once at startup, clamped once in [`GeometryConfig::validated`], then
//! shared read-only across capture sessions.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{FoodPriors, SensorSource};

/// Environment variable naming a JSON config file
pub const CONFIG_PATH_ENV: &str = "PORTION_GEOMETRY_CONFIG";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Depth validity interval (exclusive bounds, meters)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthValidity {
    pub min_valid_depth_m: f64,
    pub max_valid_depth_m: f64,
}

impl Default for DepthValidity {
    fn default() -> Self {
        Self {
            min_valid_depth_m: 0.01,
            max_valid_depth_m: 5.0,
        }
    }
}

/// Depth-percentile food-region heuristic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Near edge of the food band, as a percentile of valid depths
    pub lower_percentile: f64,
    /// Far edge of the food band
    pub upper_percentile: f64,
    /// Heuristic fractions above this are treated as a failed detection
    pub failure_fraction: f64,
    /// Fractions above this (up to `failure_fraction`) are soft-capped
    pub clamp_fraction: f64,
    /// Value used by the soft cap
    pub clamped_value: f64,
    /// Fraction used when detection failed
    pub fallback_fraction: f64,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            lower_percentile: 0.05,
            upper_percentile: 0.20,
            failure_fraction: 0.50,
            clamp_fraction: 0.30,
            clamped_value: 0.30,
            fallback_fraction: 0.15,
        }
    }
}

/// Relief height estimation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeightConfig {
    pub lower_iqr_multiplier: f64,
    pub upper_iqr_multiplier: f64,
    pub max_height_m: f64,
}

impl Default for HeightConfig {
    fn default() -> Self {
        Self {
            lower_iqr_multiplier: 1.5,
            upper_iqr_multiplier: 1.5,
            max_height_m: 0.20,
        }
    }
}

/// Pixel footprint when no intrinsics are available
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelAreaConfig {
    pub reference_depth_m: f64,
    /// Real-world area of one depth pixel at `reference_depth_m`
    pub reference_pixel_area_m2: f64,
}

impl Default for PixelAreaConfig {
    fn default() -> Self {
        Self {
            reference_depth_m: 0.5,
            reference_pixel_area_m2: 5.5e-6,
        }
    }
}

/// Cross-frame exponential smoothing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalConfig {
    pub area_alpha: f64,
    pub depth_alpha: f64,
    pub height_alpha: f64,
    /// Frames required before smoothed values replace per-frame ones
    pub min_frames: u32,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            area_alpha: 0.3,
            depth_alpha: 0.4,
            height_alpha: 0.3,
            min_frames: 2,
        }
    }
}

/// Normal calibration distribution N(mean, std)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub mean: f64,
    pub std: f64,
}

/// Plausibility scoring and rejection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Height calibration, meters
    pub height: Calibration,
    /// Volume calibration, mL
    pub volume: Calibration,
    /// Hard rejection when either |z| exceeds this
    pub reject_z: f64,
    /// Combined scores below this inflate the reported sigma
    pub low_plausibility: f64,
    pub sigma_inflation: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            height: Calibration {
                mean: 0.05,
                std: 0.03,
            },
            volume: Calibration {
                mean: 500.0,
                std: 300.0,
            },
            reject_z: 5.0,
            low_plausibility: 0.3,
            sigma_inflation: 1.5,
        }
    }
}

/// Relative depth noise per sensing technology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorNoise {
    pub lidar: f64,
    pub stereo: f64,
    pub structure_from_motion: f64,
    pub monocular: f64,
}

impl SensorNoise {
    /// One-sigma depth uncertainty (meters) at `depth_m`
    pub fn depth_uncertainty(&self, depth_m: f64, source: SensorSource) -> f64 {
        let relative = match source {
            SensorSource::Lidar => self.lidar,
            SensorSource::Stereo => self.stereo,
            SensorSource::StructureFromMotion => self.structure_from_motion,
            SensorSource::Monocular => self.monocular,
        };
        relative * depth_m.abs()
    }
}

impl Default for SensorNoise {
    fn default() -> Self {
        Self {
            lidar: 0.02,
            stereo: 0.04,
            structure_from_motion: 0.075,
            monocular: 0.15,
        }
    }
}

/// Relative sigma applied to coarse volumes up to `max_volume_ml`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SigmaBucket {
    pub max_volume_ml: f64,
    pub relative_sigma: f64,
}

/// Volume integration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Smallest volume ever reported
    pub volume_floor_ml: f64,
    /// Per-pixel integration skips pixels below this confidence
    pub min_confidence: f64,
    /// Mask luma above this fraction of full scale counts as inside
    pub mask_inside_threshold: f64,
    /// Bottom fraction of the mask box searched for the plate depth
    pub plate_band_fraction: f64,
    pub default_plate_depth_m: f64,
    /// Fewer contributing pixels than this inflate sigma by count/min
    pub min_pixels_full_confidence: usize,
    pub min_sigma_ml: f64,
    pub min_relative_sigma: f64,
    pub sensor_noise: SensorNoise,
    /// Coarse-tier relative sigma by volume, ascending
    pub sigma_buckets: Vec<SigmaBucket>,
    pub overflow_relative_sigma: f64,
}

impl VolumeConfig {
    /// Relative sigma for a coarse volume
    pub fn relative_sigma_for(&self, volume_ml: f64) -> f64 {
        self.sigma_buckets
            .iter()
            .find(|b| volume_ml <= b.max_volume_ml)
            .map(|b| b.relative_sigma)
            .unwrap_or(self.overflow_relative_sigma)
    }

    /// Absolute sigma floor for a volume
    pub fn sigma_floor(&self, volume_ml: f64) -> f64 {
        self.min_sigma_ml.max(self.min_relative_sigma * volume_ml.abs())
    }
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            volume_floor_ml: 1.0,
            min_confidence: 0.3,
            mask_inside_threshold: 0.5,
            plate_band_fraction: 0.2,
            default_plate_depth_m: 0.5,
            min_pixels_full_confidence: 100,
            min_sigma_ml: 1.0,
            min_relative_sigma: 0.05,
            sensor_noise: SensorNoise::default(),
            sigma_buckets: vec![
                SigmaBucket {
                    max_volume_ml: 150.0,
                    relative_sigma: 0.40,
                },
                SigmaBucket {
                    max_volume_ml: 400.0,
                    relative_sigma: 0.30,
                },
                SigmaBucket {
                    max_volume_ml: 1000.0,
                    relative_sigma: 0.25,
                },
            ],
            overflow_relative_sigma: 0.30,
        }
    }
}

/// Calorie propagation and source fusion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyConfig {
    pub min_calorie_sigma_kcal: f64,
    /// Weight deflation for sources sharing upstream evidence (>= 1)
    pub correlation_penalty: f64,
}

impl Default for UncertaintyConfig {
    fn default() -> Self {
        Self {
            min_calorie_sigma_kcal: 1.0,
            correlation_penalty: 1.0,
        }
    }
}

/// Capture-session housekeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sessions with no submitted frame for this long are dropped
    pub idle_timeout_secs: u64,
    /// Opening a session beyond this evicts the least recently active one
    pub max_open: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 900,
            max_open: 64,
        }
    }
}

/// Complete estimator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GeometryConfig {
    pub depth: DepthValidity,
    pub region: RegionConfig,
    pub height: HeightConfig,
    pub pixel_area: PixelAreaConfig,
    pub temporal: TemporalConfig,
    pub validation: ValidationConfig,
    pub volume: VolumeConfig,
    pub uncertainty: UncertaintyConfig,
    pub default_priors: FoodPriors,
    pub sessions: SessionConfig,
}

fn unit(v: f64, fallback: f64) -> f64 {
    if v.is_nan() {
        fallback
    } else {
        v.clamp(0.0, 1.0)
    }
}

fn non_negative(v: f64, fallback: f64) -> f64 {
    if v.is_nan() {
        fallback
    } else {
        v.max(0.0)
    }
}

fn at_least_one(v: f64) -> f64 {
    if v.is_nan() {
        1.0
    } else {
        v.max(1.0)
    }
}

impl GeometryConfig {
    /// Clamp every weight and threshold into its valid range
    pub fn validated(mut self) -> Self {
        let defaults = GeometryConfig::default();

        let d = &mut self.depth;
        d.min_valid_depth_m = non_negative(d.min_valid_depth_m, defaults.depth.min_valid_depth_m);
        if !(d.max_valid_depth_m > d.min_valid_depth_m) {
            *d = defaults.depth.clone();
        }

        let r = &mut self.region;
        r.lower_percentile = unit(r.lower_percentile, defaults.region.lower_percentile);
        r.upper_percentile = unit(r.upper_percentile, defaults.region.upper_percentile);
        if r.lower_percentile > r.upper_percentile {
            std::mem::swap(&mut r.lower_percentile, &mut r.upper_percentile);
        } else if r.lower_percentile == r.upper_percentile {
            r.lower_percentile = defaults.region.lower_percentile;
            r.upper_percentile = defaults.region.upper_percentile;
        }
        r.failure_fraction = unit(r.failure_fraction, defaults.region.failure_fraction);
        r.clamp_fraction = unit(r.clamp_fraction, defaults.region.clamp_fraction)
            .min(r.failure_fraction);
        r.clamped_value = unit(r.clamped_value, defaults.region.clamped_value);
        r.fallback_fraction = unit(r.fallback_fraction, defaults.region.fallback_fraction);

        let h = &mut self.height;
        h.lower_iqr_multiplier =
            non_negative(h.lower_iqr_multiplier, defaults.height.lower_iqr_multiplier);
        h.upper_iqr_multiplier =
            non_negative(h.upper_iqr_multiplier, defaults.height.upper_iqr_multiplier);
        h.max_height_m = non_negative(h.max_height_m, defaults.height.max_height_m);

        let p = &mut self.pixel_area;
        if !(p.reference_depth_m > 0.0) {
            p.reference_depth_m = defaults.pixel_area.reference_depth_m;
        }
        p.reference_pixel_area_m2 = non_negative(
            p.reference_pixel_area_m2,
            defaults.pixel_area.reference_pixel_area_m2,
        );

        let t = &mut self.temporal;
        t.area_alpha = unit(t.area_alpha, defaults.temporal.area_alpha);
        t.depth_alpha = unit(t.depth_alpha, defaults.temporal.depth_alpha);
        t.height_alpha = unit(t.height_alpha, defaults.temporal.height_alpha);

        let v = &mut self.validation;
        v.height.std = non_negative(v.height.std, defaults.validation.height.std);
        v.volume.std = non_negative(v.volume.std, defaults.validation.volume.std);
        v.reject_z = non_negative(v.reject_z, defaults.validation.reject_z);
        v.low_plausibility = unit(v.low_plausibility, defaults.validation.low_plausibility);
        v.sigma_inflation = at_least_one(v.sigma_inflation);

        let vol = &mut self.volume;
        if !(vol.volume_floor_ml > 0.0) {
            vol.volume_floor_ml = defaults.volume.volume_floor_ml;
        }
        vol.min_confidence = unit(vol.min_confidence, defaults.volume.min_confidence);
        vol.mask_inside_threshold =
            unit(vol.mask_inside_threshold, defaults.volume.mask_inside_threshold);
        vol.plate_band_fraction =
            unit(vol.plate_band_fraction, defaults.volume.plate_band_fraction);
        if !(vol.default_plate_depth_m > 0.0) {
            vol.default_plate_depth_m = defaults.volume.default_plate_depth_m;
        }
        vol.min_sigma_ml = non_negative(vol.min_sigma_ml, defaults.volume.min_sigma_ml);
        vol.min_relative_sigma =
            non_negative(vol.min_relative_sigma, defaults.volume.min_relative_sigma);
        let noise = &mut vol.sensor_noise;
        noise.lidar = non_negative(noise.lidar, defaults.volume.sensor_noise.lidar);
        noise.stereo = non_negative(noise.stereo, defaults.volume.sensor_noise.stereo);
        noise.structure_from_motion = non_negative(
            noise.structure_from_motion,
            defaults.volume.sensor_noise.structure_from_motion,
        );
        noise.monocular = non_negative(noise.monocular, defaults.volume.sensor_noise.monocular);
        vol.sigma_buckets.retain(|b| !b.max_volume_ml.is_nan());
        for bucket in vol.sigma_buckets.iter_mut() {
            bucket.relative_sigma = non_negative(bucket.relative_sigma, 0.0);
        }
        vol.sigma_buckets
            .sort_by(|a, b| a.max_volume_ml.total_cmp(&b.max_volume_ml));
        vol.overflow_relative_sigma = non_negative(
            vol.overflow_relative_sigma,
            defaults.volume.overflow_relative_sigma,
        );

        let u = &mut self.uncertainty;
        u.min_calorie_sigma_kcal = non_negative(
            u.min_calorie_sigma_kcal,
            defaults.uncertainty.min_calorie_sigma_kcal,
        );
        u.correlation_penalty = at_least_one(u.correlation_penalty);

        let sess = &mut self.sessions;
        if sess.idle_timeout_secs == 0 {
            sess.idle_timeout_secs = defaults.sessions.idle_timeout_secs;
        }
        sess.max_open = sess.max_open.max(1);

        let priors = &mut self.default_priors;
        priors.density.sigma = priors.density.sigma.abs();
        priors.energy_density.sigma = priors.energy_density.sigma.abs();

        self
    }

    /// Parse and validate a JSON document; missing sections take defaults
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: GeometryConfig = serde_json::from_str(json)?;
        Ok(config.validated())
    }

    /// Load and validate a JSON config file
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Load from the file named by [`CONFIG_PATH_ENV`], or defaults when unset
    pub fn from_env() -> ConfigResult<(Self, Option<PathBuf>)> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                let path = PathBuf::from(path);
                let config = Self::load(&path)?;
                Ok((config, Some(path)))
            }
            _ => Ok((Self::default(), None)),
        }
    }

    /// Pretty JSON rendering
    pub fn to_json_pretty(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
