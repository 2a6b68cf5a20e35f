//! Capture sessions
//!
//! One temporal smoothing state per session id. Sessions never share state,
//! so several can be open at once. Idle sessions expire, and the number open
//! at once is capped.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::SessionConfig;
use crate::geometry::TemporalFusionState;
use crate::models::{AbsentReason, GeometryEstimate, GeometryOutcome};

/// One open capture session
#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub id: u64,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub state: TemporalFusionState,
    pub frames_submitted: u32,
    pub estimates_produced: u32,
    pub last_estimate: Option<GeometryEstimate>,
    pub last_absent: Option<AbsentReason>,
}

impl CaptureSession {
    /// Remember the outcome of one submitted frame
    pub fn record(&mut self, outcome: &GeometryOutcome) {
        self.last_activity = Utc::now();
        self.frames_submitted = self.frames_submitted.saturating_add(1);
        match outcome {
            GeometryOutcome::Estimate(estimate) => {
                self.estimates_produced = self.estimates_produced.saturating_add(1);
                self.last_estimate = Some(estimate.clone());
            }
            GeometryOutcome::Absent(reason) => {
                self.last_absent = Some(reason.clone());
            }
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id,
            started_at: self.started_at.to_rfc3339(),
            duration_seconds: (Utc::now() - self.started_at).num_milliseconds() as f64 / 1000.0,
            frames_submitted: self.frames_submitted,
            frames_smoothed: self.state.frame_count(),
            estimates_produced: self.estimates_produced,
        }
    }
}

/// Counters for a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: u64,
    pub started_at: String,
    pub duration_seconds: f64,
    pub frames_submitted: u32,
    /// Frames folded into the smoothing state
    pub frames_smoothed: u32,
    pub estimates_produced: u32,
}

/// All open sessions, keyed by id
#[derive(Debug)]
pub struct SessionRegistry {
    next_id: u64,
    sessions: HashMap<u64, CaptureSession>,
    idle_timeout_secs: i64,
    max_open: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_limits(&SessionConfig::default())
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: &SessionConfig) -> Self {
        Self {
            next_id: 0,
            sessions: HashMap::new(),
            idle_timeout_secs: i64::try_from(limits.idle_timeout_secs).unwrap_or(i64::MAX),
            max_open: limits.max_open.max(1),
        }
    }

    /// Open a session around `state`, which is reset first
    pub fn start(&mut self, state: TemporalFusionState) -> u64 {
        self.start_at(state, Utc::now())
    }

    fn start_at(&mut self, mut state: TemporalFusionState, now: DateTime<Utc>) -> u64 {
        self.prune_idle(now);
        while self.sessions.len() >= self.max_open {
            let Some(oldest) = self
                .sessions
                .values()
                .min_by_key(|s| (s.last_activity, s.id))
                .map(|s| s.id)
            else {
                break;
            };
            self.sessions.remove(&oldest);
            tracing::warn!(
                session_id = oldest,
                max_open = self.max_open,
                "Too many open capture sessions; evicted the least recently active"
            );
        }

        state.reset();
        self.next_id += 1;
        let id = self.next_id;
        self.sessions.insert(
            id,
            CaptureSession {
                id,
                started_at: now,
                last_activity: now,
                state,
                frames_submitted: 0,
                estimates_produced: 0,
                last_estimate: None,
                last_absent: None,
            },
        );
        tracing::info!(session_id = id, "capture session started");
        id
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut CaptureSession> {
        self.prune_idle(Utc::now());
        self.sessions.get_mut(&id)
    }

    /// Close a session and hand it back
    pub fn end(&mut self, id: u64) -> Option<CaptureSession> {
        let session = self.sessions.remove(&id)?;
        tracing::info!(
            session_id = id,
            frames = session.frames_submitted,
            estimates = session.estimates_produced,
            "capture session ended"
        );
        Some(session)
    }

    /// Drop sessions idle for longer than the timeout; returns how many went
    pub fn prune_idle(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        let timeout = self.idle_timeout_secs;
        self.sessions
            .retain(|_, s| (now - s.last_activity).num_seconds() <= timeout);
        let expired = before - self.sessions.len();
        if expired > 0 {
            tracing::info!(expired, "expired idle capture sessions");
        }
        expired
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemporalConfig;
    use crate::geometry::FrameObservation;
    use chrono::Duration;

    fn state() -> TemporalFusionState {
        TemporalFusionState::new(&TemporalConfig::default())
    }

    #[test]
    fn test_ids_are_unique() {
        let mut registry = SessionRegistry::new();
        let a = registry.start(state());
        let b = registry.start(state());
        assert_ne!(a, b);
        assert_eq!(registry.active_count(), 2);
    }

    #[test]
    fn test_start_resets_state() {
        let mut used = state();
        used.update(FrameObservation {
            area_fraction: 0.2,
            median_depth_m: 0.5,
            height_m: 0.04,
        });
        let mut registry = SessionRegistry::new();
        let id = registry.start(used);
        let session = registry.get_mut(id).unwrap();
        assert_eq!(session.state.frame_count(), 0);
        assert_eq!(session.state.current(), None);
    }

    #[test]
    fn test_end_removes_session() {
        let mut registry = SessionRegistry::new();
        let id = registry.start(state());
        assert!(registry.end(id).is_some());
        assert!(registry.end(id).is_none());
        assert!(registry.get_mut(id).is_none());
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn test_idle_sessions_expire() {
        let limits = SessionConfig {
            idle_timeout_secs: 600,
            max_open: 8,
        };
        let mut registry = SessionRegistry::with_limits(&limits);
        let t0 = Utc::now();
        let stale = registry.start_at(state(), t0);
        let recent = registry.start_at(state(), t0 + Duration::seconds(300));

        assert_eq!(registry.prune_idle(t0 + Duration::seconds(601)), 1);
        assert!(registry.end(stale).is_none());
        assert!(registry.end(recent).is_some());
    }

    #[test]
    fn test_cap_evicts_least_recently_active() {
        let limits = SessionConfig {
            idle_timeout_secs: 600,
            max_open: 2,
        };
        let mut registry = SessionRegistry::with_limits(&limits);
        let t0 = Utc::now();
        let first = registry.start_at(state(), t0);
        let second = registry.start_at(state(), t0 + Duration::seconds(1));
        let third = registry.start_at(state(), t0 + Duration::seconds(2));

        assert_eq!(registry.active_count(), 2);
        assert!(registry.end(first).is_none());
        assert!(registry.end(second).is_some());
        assert!(registry.end(third).is_some());
    }

    #[test]
    fn test_record_counts_outcomes() {
        let mut registry = SessionRegistry::new();
        let id = registry.start(state());
        let session = registry.get_mut(id).unwrap();
        session.record(&GeometryOutcome::Absent(AbsentReason::FlatScene));
        assert_eq!(session.frames_submitted, 1);
        assert_eq!(session.estimates_produced, 0);
        assert_eq!(session.last_absent, Some(AbsentReason::FlatScene));
        assert_eq!(session.summary().session_id, id);
    }
}
