//! Cross-frame smoothing for one capture session
//!
//! Each quantity keeps an optional running value updated as
//! `alpha * observed + (1 - alpha) * previous`; the first observation is
//! stored as-is. One instance per session, reset once at session start.

use serde::Serialize;

use crate::config::TemporalConfig;

/// Per-frame measurements subject to smoothing
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameObservation {
    pub area_fraction: f64,
    pub median_depth_m: f64,
    pub height_m: f64,
}

/// Smoothing memory for a capture session
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalFusionState {
    config: TemporalConfig,
    area_fraction: Option<f64>,
    median_depth_m: Option<f64>,
    height_m: Option<f64>,
    frame_count: u32,
}

fn ema(previous: Option<f64>, observed: f64, alpha: f64) -> f64 {
    match previous {
        Some(prev) => alpha * observed + (1.0 - alpha) * prev,
        None => observed,
    }
}

impl TemporalFusionState {
    pub fn new(config: &TemporalConfig) -> Self {
        Self {
            config: config.clone(),
            area_fraction: None,
            median_depth_m: None,
            height_m: None,
            frame_count: 0,
        }
    }

    /// Clear all running values and the frame counter
    pub fn reset(&mut self) {
        self.area_fraction = None;
        self.median_depth_m = None;
        self.height_m = None;
        self.frame_count = 0;
    }

    /// Fold one frame in and return the smoothed values
    pub fn update(&mut self, observed: FrameObservation) -> FrameObservation {
        let area = ema(self.area_fraction, observed.area_fraction, self.config.area_alpha);
        let depth = ema(self.median_depth_m, observed.median_depth_m, self.config.depth_alpha);
        let height = ema(self.height_m, observed.height_m, self.config.height_alpha);

        self.area_fraction = Some(area);
        self.median_depth_m = Some(depth);
        self.height_m = Some(height);
        self.frame_count = self.frame_count.saturating_add(1);

        FrameObservation {
            area_fraction: area,
            median_depth_m: depth,
            height_m: height,
        }
    }

    /// Enough frames seen for smoothed values to be trusted
    pub fn is_ready(&self) -> bool {
        self.frame_count >= self.config.min_frames
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Smoothed values, once at least one frame was observed
    pub fn current(&self) -> Option<FrameObservation> {
        Some(FrameObservation {
            area_fraction: self.area_fraction?,
            median_depth_m: self.median_depth_m?,
            height_m: self.height_m?,
        })
    }

    /// Update with a raw frame and pick what the estimator should use:
    /// smoothed values once ready, the raw frame before that.
    ///
    /// Returns `(values, smoothed)`.
    pub fn resolve(&mut self, raw: FrameObservation) -> (FrameObservation, bool) {
        let smoothed = self.update(raw);
        if self.is_ready() {
            (smoothed, true)
        } else {
            (raw, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn obs(area: f64, depth: f64, height: f64) -> FrameObservation {
        FrameObservation {
            area_fraction: area,
            median_depth_m: depth,
            height_m: height,
        }
    }

    #[test]
    fn test_first_observation_stored_as_is() {
        let mut state = TemporalFusionState::new(&TemporalConfig::default());
        assert_eq!(state.current(), None);
        let out = state.update(obs(0.2, 0.6, 0.04));
        assert_eq!(out, obs(0.2, 0.6, 0.04));
        assert_eq!(state.frame_count(), 1);
        assert!(!state.is_ready());
    }

    #[test]
    fn test_ema_per_quantity_alpha() {
        let mut state = TemporalFusionState::new(&TemporalConfig::default());
        state.update(obs(0.2, 0.6, 0.04));
        let out = state.update(obs(0.3, 0.7, 0.06));
        assert_abs_diff_eq!(out.area_fraction, 0.3 * 0.3 + 0.7 * 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(out.median_depth_m, 0.4 * 0.7 + 0.6 * 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(out.height_m, 0.3 * 0.06 + 0.7 * 0.04, epsilon = 1e-12);
        assert!(state.is_ready());
    }

    #[test]
    fn test_resolve_ramps_from_raw_to_smoothed() {
        let mut state = TemporalFusionState::new(&TemporalConfig::default());
        let (first, smoothed) = state.resolve(obs(0.2, 0.6, 0.04));
        assert!(!smoothed);
        assert_eq!(first, obs(0.2, 0.6, 0.04));

        let (second, smoothed) = state.resolve(obs(0.4, 0.6, 0.04));
        assert!(smoothed);
        assert_abs_diff_eq!(second.area_fraction, 0.26, epsilon = 1e-12);
    }

    #[test]
    fn test_reset_matches_fresh_state() {
        let config = TemporalConfig::default();
        let mut reused = TemporalFusionState::new(&config);
        reused.update(obs(0.5, 1.2, 0.15));
        reused.update(obs(0.1, 0.9, 0.02));
        reused.reset();
        assert_eq!(reused.frame_count(), 0);
        assert_eq!(reused.current(), None);

        let mut fresh = TemporalFusionState::new(&config);
        let observation = obs(0.18, 0.55, 0.035);
        assert_eq!(reused.update(observation), fresh.update(observation));
        assert_eq!(reused, fresh);
    }

    #[test]
    fn test_frame_count_monotonic() {
        let mut state = TemporalFusionState::new(&TemporalConfig::default());
        let mut last = state.frame_count();
        for i in 0..5 {
            state.update(obs(0.1 * i as f64, 0.5, 0.03));
            assert!(state.frame_count() > last);
            last = state.frame_count();
        }
    }
}
