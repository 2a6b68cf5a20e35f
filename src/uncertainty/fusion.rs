//! Inverse-variance fusion of independent calorie estimates

use crate::models::{CalorieEstimate, EstimateSource};

/// Precision-weighted combination of calorie estimates
///
/// Sources with a non-finite mean or a sigma that is non-finite or not
/// positive are skipped. `correlation_penalty` (clamped to >= 1) divides the
/// total weight to account for sources sharing upstream evidence.
/// Returns `None` when no usable source remains.
pub fn fuse_estimates(
    estimates: &[CalorieEstimate],
    correlation_penalty: f64,
) -> Option<CalorieEstimate> {
    let mut weight_sum = 0.0;
    let mut weighted_mu = 0.0;

    for estimate in estimates {
        if !estimate.mu.is_finite() || !estimate.sigma.is_finite() || estimate.sigma <= 0.0 {
            tracing::warn!(
                "Skipping {} estimate in fusion: mu={}, sigma={}",
                estimate.source.as_str(),
                estimate.mu,
                estimate.sigma
            );
            continue;
        }
        let weight = 1.0 / (estimate.sigma * estimate.sigma);
        weight_sum += weight;
        weighted_mu += estimate.mu * weight;
    }

    if weight_sum <= 0.0 {
        return None;
    }

    let penalty = if correlation_penalty.is_finite() {
        correlation_penalty.max(1.0)
    } else {
        1.0
    };
    let mu = weighted_mu / weight_sum;
    let sigma = 1.0 / (weight_sum / penalty).sqrt();

    Some(CalorieEstimate::new(mu, sigma, EstimateSource::Fused))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn est(mu: f64, sigma: f64, source: EstimateSource) -> CalorieEstimate {
        CalorieEstimate::new(mu, sigma, source)
    }

    #[test]
    fn test_two_source_worked_example() {
        let fused = fuse_estimates(
            &[
                est(100.0, 10.0, EstimateSource::Geometry),
                est(200.0, 20.0, EstimateSource::VisionService),
            ],
            1.0,
        )
        .unwrap();
        assert_abs_diff_eq!(fused.mu, 120.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fused.sigma, 8.944, epsilon = 1e-3);
        assert_eq!(fused.source, EstimateSource::Fused);
    }

    #[test]
    fn test_single_source_passes_through() {
        let fused = fuse_estimates(&[est(340.0, 25.0, EstimateSource::FoodDatabase)], 1.0).unwrap();
        assert_abs_diff_eq!(fused.mu, 340.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fused.sigma, 25.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_sigma_sources_skipped() {
        let fused = fuse_estimates(
            &[
                est(999.0, 0.0, EstimateSource::UserReported),
                est(100.0, 10.0, EstimateSource::Geometry),
                est(f64::NAN, 5.0, EstimateSource::VisionService),
            ],
            1.0,
        )
        .unwrap();
        assert_abs_diff_eq!(fused.mu, 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fused.sigma, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_nothing_usable() {
        assert!(fuse_estimates(&[], 1.0).is_none());
        assert!(fuse_estimates(&[est(10.0, 0.0, EstimateSource::Geometry)], 1.0).is_none());
    }

    #[test]
    fn test_correlation_penalty_inflates_sigma() {
        let sources = [
            est(100.0, 10.0, EstimateSource::Geometry),
            est(200.0, 20.0, EstimateSource::VisionService),
        ];
        let independent = fuse_estimates(&sources, 1.0).unwrap();
        let correlated = fuse_estimates(&sources, 2.0).unwrap();
        assert_abs_diff_eq!(correlated.mu, independent.mu, epsilon = 1e-9);
        assert_abs_diff_eq!(correlated.sigma, independent.sigma * 2f64.sqrt(), epsilon = 1e-9);

        // below 1 is treated as independent
        let clamped = fuse_estimates(&sources, 0.5).unwrap();
        assert_abs_diff_eq!(clamped.sigma, independent.sigma, epsilon = 1e-12);
    }

    #[test]
    fn test_fused_sigma_below_smallest_input() {
        let fused = fuse_estimates(
            &[
                est(410.0, 60.0, EstimateSource::Geometry),
                est(380.0, 45.0, EstimateSource::VisionService),
                est(450.0, 90.0, EstimateSource::FoodDatabase),
            ],
            1.0,
        )
        .unwrap();
        assert!(fused.sigma < 45.0);
        assert!(fused.mu > 380.0 && fused.mu < 450.0);
    }
}
