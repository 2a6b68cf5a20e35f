//! Portion estimation pipeline
//!
//! Wires region detection, height, temporal smoothing, volume integration,
//! plausibility validation and calorie propagation into one call per frame.
//! Segmentation, classification and integration are trait objects so hosts
//! and tests can swap them.

use std::sync::Arc;

use crate::config::GeometryConfig;
use crate::geometry::food_region::{detect_food_region, RegionSource};
use crate::geometry::height::estimate_height;
use crate::geometry::plausibility::PlausibilityValidator;
use crate::geometry::temporal::{FrameObservation, TemporalFusionState};
use crate::geometry::volume::{CoarseIntegrator, PerPixelIntegrator, VolumeEstimator, VolumeInputs};
use crate::models::{
    AbsentReason, CameraIntrinsics, DepthFrame, EvidenceTag, FoodPriors, FoodRegionMask,
    GeometryEstimate, GeometryOutcome, PriorStat, ReferencePlane,
};
use crate::nutrition::{household_measure, mass_grams};
use crate::stats::median_sorted;
use crate::uncertainty::propagate_calories;

const DEFAULT_LABEL: &str = "food";

/// Produces a food mask when the caller did not supply one
pub trait Segmenter: Send + Sync {
    fn segment(&self, frame: &DepthFrame) -> Option<FoodRegionMask>;
}

/// What a classifier knows about the food in a frame
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    /// `None` when the classifier has no calibrated priors for the label
    pub priors: Option<FoodPriors>,
}

/// Names the food and, optionally, supplies density/energy priors
pub trait FoodClassifier: Send + Sync {
    fn classify(&self, frame: &DepthFrame, mask: Option<&FoodRegionMask>) -> Classification;
}

/// Never segments; the depth heuristic takes over
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSegmenter;

impl Segmenter for NoSegmenter {
    fn segment(&self, _frame: &DepthFrame) -> Option<FoodRegionMask> {
        None
    }
}

/// Generic label without priors; configured defaults apply
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPriorsClassifier;

impl FoodClassifier for DefaultPriorsClassifier {
    fn classify(&self, _frame: &DepthFrame, _mask: Option<&FoodRegionMask>) -> Classification {
        Classification {
            label: DEFAULT_LABEL.to_string(),
            priors: None,
        }
    }
}

/// One frame plus whatever side evidence came with it
#[derive(Debug, Clone, Default)]
pub struct FrameInput {
    pub frame: Option<DepthFrame>,
    /// At RGB or depth resolution; rescaled to the depth map internally
    pub intrinsics: Option<CameraIntrinsics>,
    pub mask: Option<FoodRegionMask>,
    /// Externally supplied priors take precedence over the classifier's
    pub priors: Option<FoodPriors>,
    pub label: Option<String>,
    pub reference_plane: Option<ReferencePlane>,
}

/// Frame-to-estimate orchestrator
///
/// Holds only immutable configuration and strategies, so one instance can
/// serve many sessions; per-session memory lives in [`TemporalFusionState`].
pub struct PortionEstimator {
    config: Arc<GeometryConfig>,
    segmenter: Box<dyn Segmenter>,
    classifier: Box<dyn FoodClassifier>,
    integrators: Vec<Box<dyn VolumeEstimator>>,
}

impl PortionEstimator {
    /// Default strategies: no segmenter, default priors, per-pixel then coarse
    pub fn new(config: Arc<GeometryConfig>) -> Self {
        Self {
            config,
            segmenter: Box::new(NoSegmenter),
            classifier: Box::new(DefaultPriorsClassifier),
            integrators: vec![Box::new(PerPixelIntegrator), Box::new(CoarseIntegrator)],
        }
    }

    pub fn with_segmenter(mut self, segmenter: Box<dyn Segmenter>) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub fn with_classifier(mut self, classifier: Box<dyn FoodClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replace the integrator chain; tried in order until one yields a volume
    pub fn with_integrators(mut self, integrators: Vec<Box<dyn VolumeEstimator>>) -> Self {
        self.integrators = integrators;
        self
    }

    pub fn config(&self) -> &GeometryConfig {
        &self.config
    }

    /// Fresh smoothing state for a new capture session
    pub fn new_session(&self) -> TemporalFusionState {
        TemporalFusionState::new(&self.config.temporal)
    }

    /// Single frame with no session history
    pub fn estimate_once(&self, input: &FrameInput) -> GeometryOutcome {
        let mut state = self.new_session();
        self.estimate_frame(input, &mut state)
    }

    /// Estimate one frame of a capture session
    pub fn estimate_frame(
        &self,
        input: &FrameInput,
        state: &mut TemporalFusionState,
    ) -> GeometryOutcome {
        let config = self.config.as_ref();
        let Some(frame) = input.frame.as_ref() else {
            tracing::warn!("No depth frame supplied; geometry estimate unavailable");
            return GeometryOutcome::Absent(AbsentReason::MissingInput);
        };

        let mask = input.mask.clone().or_else(|| self.segmenter.segment(frame));

        let Some(region) = detect_food_region(frame, mask.as_ref(), config) else {
            tracing::warn!(
                width = frame.width(),
                height = frame.height(),
                "Depth frame has no valid samples"
            );
            return GeometryOutcome::Absent(AbsentReason::NoValidDepth);
        };

        let mut evidence = Vec::new();
        match region.source {
            RegionSource::Mask => evidence.push(EvidenceTag::SegmentationMask),
            RegionSource::DepthPercentile => {
                evidence.push(EvidenceTag::DepthPercentileBand);
                if region.clamped {
                    evidence.push(EvidenceTag::AreaClamped);
                }
            }
            RegionSource::Fallback => {
                evidence.push(EvidenceTag::DepthPercentileBand);
                evidence.push(EvidenceTag::AreaFallback);
            }
        }

        let subset = region.food_subset();
        let raw = FrameObservation {
            area_fraction: region.area_fraction,
            median_depth_m: median_sorted(subset),
            height_m: estimate_height(subset, &config.height),
        };

        if region.source != RegionSource::Mask && (region.raw_fraction <= 0.0 || raw.height_m <= 0.0)
        {
            tracing::warn!(
                band_near = region.band.0,
                band_far = region.band.1,
                "Food is not separable from the surrounding surface by depth"
            );
            return GeometryOutcome::Absent(AbsentReason::FlatScene);
        }

        // Folded into the session only once the frame passes validation
        let mut candidate = state.clone();
        let (observation, smoothed) = candidate.resolve(raw);
        if smoothed {
            evidence.push(EvidenceTag::TemporallySmoothed);
        }

        let intrinsics = input
            .intrinsics
            .map(|k| k.scaled_to(frame.width(), frame.height()));
        let inputs = VolumeInputs {
            frame,
            intrinsics: intrinsics.as_ref(),
            mask: mask.as_ref(),
            reference_plane: input.reference_plane.as_ref(),
            region: &region,
            observation,
        };
        let Some(integrated) = self
            .integrators
            .iter()
            .find_map(|integrator| integrator.estimate(&inputs, config))
        else {
            tracing::warn!("No volume integrator produced an estimate");
            return GeometryOutcome::Absent(AbsentReason::NoValidDepth);
        };
        evidence.extend(integrated.evidence.iter().copied());
        let volume = integrated.estimate;
        let height_m = integrated.height_m.unwrap_or(observation.height_m);

        let validator = PlausibilityValidator::new(&config.validation);
        let assessment = validator.assess(height_m, volume.mu_ml);
        if assessment.reject {
            tracing::warn!(
                height_m,
                volume_ml = volume.mu_ml,
                height_z = assessment.height_z,
                volume_z = assessment.volume_z,
                "Rejecting implausible geometry"
            );
            return GeometryOutcome::Absent(AbsentReason::ExtremeOutlier {
                height_z: assessment.height_z,
                volume_z: assessment.volume_z,
            });
        }
        *state = candidate;
        let volume_sigma_ml = validator.inflate_sigma(volume.sigma_ml, &assessment);
        if assessment.low_plausibility {
            evidence.push(EvidenceTag::LowPlausibility);
        }

        let classification = self.classifier.classify(frame, mask.as_ref());
        let priors = match input.priors.or(classification.priors) {
            Some(priors) => {
                evidence.push(EvidenceTag::ClassifierPriors);
                priors
            }
            None => {
                evidence.push(EvidenceTag::DefaultPriors);
                config.default_priors
            }
        };
        let label = input.label.clone().unwrap_or(classification.label);

        let calories = propagate_calories(
            PriorStat::new(volume.mu_ml, volume_sigma_ml),
            &priors,
            config.uncertainty.min_calorie_sigma_kcal,
        );

        tracing::debug!(
            label = %label,
            volume_ml = volume.mu_ml,
            volume_sigma_ml,
            calories = calories.mu,
            sigma = calories.sigma,
            plausibility = assessment.combined,
            "geometry estimate"
        );

        GeometryOutcome::Estimate(GeometryEstimate {
            label,
            volume_ml: volume.mu_ml,
            volume_sigma_ml,
            mass_g: mass_grams(volume.mu_ml, priors.density.mu),
            calories: calories.mu,
            sigma: calories.sigma,
            height_m,
            area_fraction: observation.area_fraction,
            plausibility: assessment.combined,
            household_measure: household_measure(volume.mu_ml),
            evidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::food_region::tests::two_level_frame;
    use crate::geometry::volume::IntegratedVolume;
    use crate::models::{IntegrationMethod, MaskBitmap, NormalizedRect, SensorSource, VolumeEstimate};
    use approx::assert_abs_diff_eq;

    fn intrinsics() -> CameraIntrinsics {
        // RGB resolution, twice the depth map
        CameraIntrinsics {
            fx: 200.0,
            fy: 200.0,
            cx: 100.0,
            cy: 100.0,
            image_width: 200,
            image_height: 200,
        }
    }

    /// Plate at 0.5 m, 20x20 food block 5 cm tall
    fn plated_frame() -> DepthFrame {
        let mut depth = vec![0.5; 100 * 100];
        for y in 20..40 {
            for x in 20..40 {
                depth[y * 100 + x] = 0.45;
            }
        }
        DepthFrame::new(100, 100, depth, None, SensorSource::Lidar).unwrap()
    }

    fn food_mask() -> FoodRegionMask {
        let mut data = vec![0u8; 100 * 100];
        for y in 20..40 {
            for x in 20..40 {
                data[y * 100 + x] = 255;
            }
        }
        FoodRegionMask {
            bounding_box: NormalizedRect { x: 0.18, y: 0.18, width: 0.3, height: 0.32 },
            bitmap: Some(MaskBitmap::new(100, 100, data).unwrap()),
            confidence: 0.95,
        }
    }

    fn estimator() -> PortionEstimator {
        PortionEstimator::new(Arc::new(GeometryConfig::default()))
    }

    struct FixedSegmenter(FoodRegionMask);

    impl Segmenter for FixedSegmenter {
        fn segment(&self, _frame: &DepthFrame) -> Option<FoodRegionMask> {
            Some(self.0.clone())
        }
    }

    struct RiceClassifier;

    impl FoodClassifier for RiceClassifier {
        fn classify(&self, _frame: &DepthFrame, mask: Option<&FoodRegionMask>) -> Classification {
            assert!(mask.is_some());
            Classification {
                label: "rice".to_string(),
                priors: Some(FoodPriors::new(PriorStat::new(0.8, 0.1), PriorStat::new(1.3, 0.1))),
            }
        }
    }

    struct FixedVolume(f64, f64);

    impl VolumeEstimator for FixedVolume {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn estimate(
            &self,
            _inputs: &VolumeInputs<'_>,
            _config: &GeometryConfig,
        ) -> Option<IntegratedVolume> {
            Some(IntegratedVolume {
                estimate: VolumeEstimate {
                    mu_ml: self.0,
                    sigma_ml: self.1,
                    method: IntegrationMethod::Coarse,
                    pixel_count: 1,
                },
                height_m: None,
                evidence: vec![],
            })
        }
    }

    struct Declines;

    impl VolumeEstimator for Declines {
        fn name(&self) -> &'static str {
            "declines"
        }

        fn estimate(
            &self,
            _inputs: &VolumeInputs<'_>,
            _config: &GeometryConfig,
        ) -> Option<IntegratedVolume> {
            None
        }
    }

    fn plated_input() -> FrameInput {
        FrameInput {
            frame: Some(plated_frame()),
            intrinsics: Some(intrinsics()),
            mask: Some(food_mask()),
            reference_plane: Some(ReferencePlane::flat_at_depth(0.5)),
            ..FrameInput::default()
        }
    }

    #[test]
    fn test_missing_frame_is_absent() {
        let outcome = estimator().estimate_once(&FrameInput::default());
        assert_eq!(outcome, GeometryOutcome::Absent(AbsentReason::MissingInput));
    }

    #[test]
    fn test_no_valid_depth_is_absent() {
        let input = FrameInput {
            frame: Some(two_level_frame(0, 0.0, 0.0)),
            ..FrameInput::default()
        };
        let outcome = estimator().estimate_once(&input);
        assert_eq!(outcome, GeometryOutcome::Absent(AbsentReason::NoValidDepth));
    }

    #[test]
    fn test_flat_scene_without_mask_is_absent() {
        let input = FrameInput {
            frame: Some(two_level_frame(0, 0.5, 0.5)),
            ..FrameInput::default()
        };
        let outcome = estimator().estimate_once(&input);
        assert_eq!(outcome, GeometryOutcome::Absent(AbsentReason::FlatScene));
    }

    #[test]
    fn test_synthetic_two_level_scene_rejected_as_outlier() {
        // 0.2 m tall over 10% of a 1 m distant frame is far outside calibration
        let input = FrameInput {
            frame: Some(two_level_frame(1000, 0.8, 1.0)),
            ..FrameInput::default()
        };
        match estimator().estimate_once(&input) {
            GeometryOutcome::Absent(AbsentReason::ExtremeOutlier { volume_z, .. }) => {
                assert!(volume_z > 5.0);
            }
            other => panic!("expected outlier rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_per_pixel_estimate_with_default_priors() {
        let outcome = estimator().estimate_once(&plated_input());
        let estimate = outcome.estimate().unwrap();

        assert_eq!(estimate.label, "food");
        assert_abs_diff_eq!(estimate.volume_ml, 405.0, epsilon = 1e-6);
        assert_abs_diff_eq!(estimate.calories, 607.5, epsilon = 1e-6);
        assert_abs_diff_eq!(estimate.mass_g, 405.0, epsilon = 1e-6);
        assert_eq!(estimate.household_measure, "1 3/4 cups");
        assert!(estimate.evidence.contains(&EvidenceTag::SegmentationMask));
        assert!(estimate.evidence.contains(&EvidenceTag::PerPixelIntegration));
        assert!(estimate.evidence.contains(&EvidenceTag::DefaultPriors));
        assert!(!estimate.evidence.contains(&EvidenceTag::TemporallySmoothed));
        assert!(estimate.sigma > 0.0);
    }

    #[test]
    fn test_per_pixel_height_is_reported_and_validated() {
        let estimate = estimator().estimate_once(&plated_input()).estimate().cloned().unwrap();
        // 5 cm block: height z = 0, 405 mL: volume z ~ -0.32
        assert_abs_diff_eq!(estimate.height_m, 0.05, epsilon = 1e-9);
        assert!(estimate.plausibility > 0.95);
        assert!(!estimate.evidence.contains(&EvidenceTag::LowPlausibility));
        assert_abs_diff_eq!(estimate.volume_sigma_ml, 20.25, epsilon = 1e-6);
    }

    #[test]
    fn test_segmenter_and_classifier_are_used() {
        let estimator = estimator()
            .with_segmenter(Box::new(FixedSegmenter(food_mask())))
            .with_classifier(Box::new(RiceClassifier));
        let input = FrameInput {
            mask: None,
            ..plated_input()
        };
        let estimate = estimator.estimate_once(&input).estimate().cloned().unwrap();

        assert_eq!(estimate.label, "rice");
        assert_abs_diff_eq!(estimate.mass_g, 324.0, epsilon = 1e-6);
        assert_abs_diff_eq!(estimate.calories, 405.0 * 0.8 * 1.3, epsilon = 1e-6);
        assert!(estimate.evidence.contains(&EvidenceTag::SegmentationMask));
        assert!(estimate.evidence.contains(&EvidenceTag::ClassifierPriors));
    }

    #[test]
    fn test_supplied_priors_and_label_win() {
        let estimator = estimator().with_classifier(Box::new(RiceClassifier));
        let input = FrameInput {
            label: Some("lentil stew".to_string()),
            priors: Some(FoodPriors::new(PriorStat::new(1.1, 0.05), PriorStat::new(1.0, 0.1))),
            ..plated_input()
        };
        let estimate = estimator.estimate_once(&input).estimate().cloned().unwrap();
        assert_eq!(estimate.label, "lentil stew");
        assert_abs_diff_eq!(estimate.mass_g, 445.5, epsilon = 1e-6);
    }

    #[test]
    fn test_coarse_fallback_without_intrinsics() {
        let input = FrameInput {
            intrinsics: None,
            ..plated_input()
        };
        let estimate = estimator().estimate_once(&input).estimate().cloned().unwrap();
        assert!(estimate.evidence.contains(&EvidenceTag::CoarseIntegration));
        assert!(!estimate.evidence.contains(&EvidenceTag::PerPixelIntegration));
    }

    #[test]
    fn test_integrator_chain_falls_through() {
        let estimator = estimator()
            .with_integrators(vec![Box::new(Declines), Box::new(FixedVolume(450.0, 40.0))]);
        let estimate = estimator.estimate_once(&plated_input()).estimate().cloned().unwrap();
        assert_eq!(estimate.volume_ml, 450.0);
        assert_eq!(estimate.volume_sigma_ml, 40.0);
    }

    #[test]
    fn test_low_plausibility_inflates_volume_sigma() {
        // no integrator height, so the depth-band height 0 applies (z ~1.67);
        // 1100 mL (z = 2): combined ~0.18
        let estimator = estimator().with_integrators(vec![Box::new(FixedVolume(1100.0, 40.0))]);
        let estimate = estimator.estimate_once(&plated_input()).estimate().cloned().unwrap();
        assert!(estimate.evidence.contains(&EvidenceTag::LowPlausibility));
        assert_abs_diff_eq!(estimate.volume_sigma_ml, 60.0, epsilon = 1e-9);
    }

    #[test]
    fn test_session_smooths_after_min_frames() {
        let estimator = estimator();
        let mut session = estimator.new_session();
        let first = estimator.estimate_frame(&plated_input(), &mut session);
        let second = estimator.estimate_frame(&plated_input(), &mut session);

        assert_eq!(session.frame_count(), 2);
        assert!(!first.estimate().unwrap().evidence.contains(&EvidenceTag::TemporallySmoothed));
        assert!(second.estimate().unwrap().evidence.contains(&EvidenceTag::TemporallySmoothed));
    }

    #[test]
    fn test_rejected_frame_leaves_session_untouched() {
        let estimator = estimator();
        let mut session = estimator.new_session();
        let outlier = FrameInput {
            frame: Some(two_level_frame(1000, 0.8, 1.0)),
            ..FrameInput::default()
        };
        let rejected = estimator.estimate_frame(&outlier, &mut session);
        assert!(matches!(
            rejected,
            GeometryOutcome::Absent(AbsentReason::ExtremeOutlier { .. })
        ));
        assert_eq!(session.frame_count(), 0);
        assert_eq!(session, estimator.new_session());

        let outcome = estimator.estimate_frame(&plated_input(), &mut session);
        assert_eq!(session.frame_count(), 1);
        assert_eq!(outcome, estimator.estimate_once(&plated_input()));
    }

    #[test]
    fn test_sessions_are_independent() {
        let estimator = estimator();
        let mut busy = estimator.new_session();
        for _ in 0..3 {
            estimator.estimate_frame(&plated_input(), &mut busy);
        }
        let mut fresh = estimator.new_session();
        let outcome = estimator.estimate_frame(&plated_input(), &mut fresh);
        assert_eq!(fresh.frame_count(), 1);
        assert_eq!(outcome, estimator.estimate_once(&plated_input()));
    }
}
