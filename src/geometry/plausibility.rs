//! Plausibility validation of height and volume
//!
//! Soft scoring against calibration distributions, with a single hard
//! rejection for extreme outliers. Low-but-not-extreme plausibility keeps the
//! estimate and widens its uncertainty instead.

use serde::Serialize;

use crate::config::{Calibration, ValidationConfig};

/// |x - mean| / std; 0 when std is not positive
pub fn z_score(x: f64, calibration: &Calibration) -> f64 {
    if calibration.std <= 0.0 || !calibration.std.is_finite() {
        return 0.0;
    }
    (x - calibration.mean).abs() / calibration.std
}

/// Gaussian plausibility exp(-z²/2): 1.0 at the mean, ~0.011 at z = 3
pub fn plausibility(z: f64) -> f64 {
    (-0.5 * z * z).exp()
}

/// Scores for one height/volume pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlausibilityAssessment {
    pub height_z: f64,
    pub volume_z: f64,
    pub height_score: f64,
    pub volume_score: f64,
    /// Geometric mean of the two scores
    pub combined: f64,
    pub reject: bool,
    pub low_plausibility: bool,
}

/// Scores heights (m) and volumes (mL) against the configured calibrations
#[derive(Debug, Clone)]
pub struct PlausibilityValidator<'a> {
    config: &'a ValidationConfig,
}

impl<'a> PlausibilityValidator<'a> {
    pub fn new(config: &'a ValidationConfig) -> Self {
        Self { config }
    }

    pub fn assess(&self, height_m: f64, volume_ml: f64) -> PlausibilityAssessment {
        let height_z = z_score(height_m, &self.config.height);
        let volume_z = z_score(volume_ml, &self.config.volume);
        let height_score = plausibility(height_z);
        let volume_score = plausibility(volume_z);
        let combined = (height_score * volume_score).sqrt();
        let reject = height_z > self.config.reject_z || volume_z > self.config.reject_z;

        PlausibilityAssessment {
            height_z,
            volume_z,
            height_score,
            volume_score,
            combined,
            reject,
            low_plausibility: !reject && combined < self.config.low_plausibility,
        }
    }

    /// Hard rejection: either z beyond the threshold
    pub fn should_reject(&self, height_m: f64, volume_ml: f64) -> bool {
        self.assess(height_m, volume_ml).reject
    }

    /// Sigma to report for an accepted estimate
    pub fn inflate_sigma(&self, sigma: f64, assessment: &PlausibilityAssessment) -> f64 {
        if assessment.low_plausibility {
            sigma * self.config.sigma_inflation
        } else {
            sigma
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_plausibility_at_mean_and_three_sigma() {
        assert_eq!(plausibility(0.0), 1.0);
        assert_abs_diff_eq!(plausibility(3.0), 0.011109, epsilon = 1e-5);
    }

    #[test]
    fn test_zero_std_gives_zero_z() {
        let calibration = Calibration { mean: 5.0, std: 0.0 };
        assert_eq!(z_score(100.0, &calibration), 0.0);
    }

    #[test]
    fn test_should_reject_against_defaults() {
        let config = ValidationConfig::default();
        let validator = PlausibilityValidator::new(&config);
        assert!(validator.should_reject(0.50, 5000.0));
        assert!(!validator.should_reject(0.05, 500.0));
    }

    #[test]
    fn test_single_axis_rejection() {
        let config = ValidationConfig::default();
        let validator = PlausibilityValidator::new(&config);
        assert!(validator.should_reject(0.05, 3000.0));
        assert!(validator.should_reject(0.30, 500.0));
    }

    #[test]
    fn test_combined_is_geometric_mean() {
        let config = ValidationConfig::default();
        let validator = PlausibilityValidator::new(&config);
        let a = validator.assess(0.08, 200.0);
        assert_abs_diff_eq!(a.height_z, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(a.volume_z, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(a.combined, (-0.5f64).exp(), epsilon = 1e-9);
        assert!(!a.low_plausibility);
    }

    #[test]
    fn test_low_plausibility_inflates_sigma() {
        let config = ValidationConfig::default();
        let validator = PlausibilityValidator::new(&config);
        // height z = 2, volume z = 2 -> combined exp(-2) ~ 0.135
        let a = validator.assess(0.11, 1100.0);
        assert!(!a.reject);
        assert!(a.low_plausibility);
        assert_abs_diff_eq!(validator.inflate_sigma(40.0, &a), 60.0, epsilon = 1e-9);

        let ok = validator.assess(0.05, 500.0);
        assert_eq!(validator.inflate_sigma(40.0, &ok), 40.0);
    }
}
