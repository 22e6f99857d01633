//! Recompute scheduling.
//!
//! All triggers that can invalidate the map funnel through one scheduler:
//! roster refreshes, radius changes, tracking and privacy toggles, self
//! movement. The scheduler enforces leading+trailing debounce semantics (the
//! first trigger in a burst runs promptly, the rest coalesce into a single
//! trailing run reflecting the latest state) and change detection so that a
//! trigger whose inputs hash identically to the previous run is skipped.
//!
//! The core is a pure state machine over injected instants; the async driver
//! in the controller owns the actual timers, so teardown cancels everything
//! by simply dropping the pending sleep.

use proximap_core::models::ActorId;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

/// Why a recompute was requested. Carried for tracing only; every reason
/// flows through the same pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeReason {
    RosterChanged,
    RadiusChanged,
    TrackingToggled,
    PrivacyToggled,
    SelfMoved,
    SelectionChanged,
    PermissionChanged,
}

/// What the caller should do with a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Execute immediately (leading edge)
    RunNow,
    /// A trailing execution was scheduled for the given deadline
    Deferred(Instant),
    /// A trailing execution is already pending; this trigger folded into it
    Coalesced,
}

#[derive(Debug)]
pub struct UpdateScheduler {
    window: Duration,
    last_run: Option<Instant>,
    pending: Option<Instant>,
    last_signature: Option<u64>,
}

impl UpdateScheduler {
    pub fn new(window: Duration) -> Self {
        Self { window, last_run: None, pending: None, last_signature: None }
    }

    /// Register a trigger at `now`
    pub fn request(&mut self, reason: RecomputeReason, now: Instant) -> ThrottleDecision {
        tracing::trace!(?reason, "recompute requested");

        if self.pending.is_some() {
            return ThrottleDecision::Coalesced;
        }

        match self.last_run {
            Some(last) if now.duration_since(last) < self.window => {
                let deadline = last + self.window;
                self.pending = Some(deadline);
                ThrottleDecision::Deferred(deadline)
            }
            _ => {
                self.last_run = Some(now);
                ThrottleDecision::RunNow
            }
        }
    }

    /// The deadline of the pending trailing execution, if any
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.pending
    }

    /// Consume the pending execution if its deadline has passed. Returns true
    /// when the caller should recompute now.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.pending {
            Some(deadline) if deadline <= now => {
                self.pending = None;
                self.last_run = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Drop any pending trailing execution, as on teardown
    pub fn cancel_pending(&mut self) {
        self.pending = None;
    }

    /// Change detection: returns true when `signature` differs from the one
    /// seen at the previous recompute, recording it either way.
    pub fn should_recompute(&mut self, signature: u64) -> bool {
        let changed = self.last_signature != Some(signature);
        self.last_signature = Some(signature);
        if !changed {
            tracing::debug!("recompute skipped: inputs unchanged");
        }
        changed
    }

    /// Forget the recorded signature so the next recompute always runs
    pub fn invalidate(&mut self) {
        self.last_signature = None;
    }
}

/// Fingerprint of everything that feeds the filter/cluster/marker pipeline.
///
/// Covers the roster ids (sorted, so snapshot ordering is irrelevant), the
/// self id, the tracking and privacy flags, plus the effective radius and
/// self position, since those change the rendered output too.
pub fn recompute_signature(
    roster_ids: &mut Vec<ActorId>,
    self_id: ActorId,
    is_tracking: bool,
    is_privacy_enabled: bool,
    radius_km: f64,
    self_pos: Option<proximap_core::models::GeoPoint>,
) -> u64 {
    roster_ids.sort_unstable();

    let mut hasher = DefaultHasher::new();
    roster_ids.hash(&mut hasher);
    self_id.hash(&mut hasher);
    is_tracking.hash(&mut hasher);
    is_privacy_enabled.hash(&mut hasher);
    radius_km.to_bits().hash(&mut hasher);
    if let Some(p) = self_pos {
        p.lat.to_bits().hash(&mut hasher);
        p.lng.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(120);

    #[test]
    fn test_leading_edge_runs_promptly() {
        let mut scheduler = UpdateScheduler::new(WINDOW);
        let t0 = Instant::now();
        assert_eq!(
            scheduler.request(RecomputeReason::RosterChanged, t0),
            ThrottleDecision::RunNow
        );
    }

    #[test]
    fn test_burst_coalesces_into_one_trailing_run() {
        let mut scheduler = UpdateScheduler::new(WINDOW);
        let t0 = Instant::now();

        assert_eq!(scheduler.request(RecomputeReason::RosterChanged, t0), ThrottleDecision::RunNow);

        // Second trigger inside the window defers to the trailing edge
        let t1 = t0 + Duration::from_millis(30);
        let decision = scheduler.request(RecomputeReason::RadiusChanged, t1);
        assert_eq!(decision, ThrottleDecision::Deferred(t0 + WINDOW));

        // Further triggers fold into the already pending run
        let t2 = t0 + Duration::from_millis(60);
        assert_eq!(
            scheduler.request(RecomputeReason::PrivacyToggled, t2),
            ThrottleDecision::Coalesced
        );

        // Not due before the deadline, due after
        assert!(!scheduler.take_due(t0 + Duration::from_millis(100)));
        assert!(scheduler.take_due(t0 + WINDOW));
        // And only once
        assert!(!scheduler.take_due(t0 + WINDOW + Duration::from_millis(1)));
    }

    #[test]
    fn test_trigger_after_quiet_window_runs_promptly() {
        let mut scheduler = UpdateScheduler::new(WINDOW);
        let t0 = Instant::now();
        scheduler.request(RecomputeReason::RosterChanged, t0);

        let later = t0 + Duration::from_millis(500);
        assert_eq!(
            scheduler.request(RecomputeReason::RosterChanged, later),
            ThrottleDecision::RunNow
        );
    }

    #[test]
    fn test_cancel_pending() {
        let mut scheduler = UpdateScheduler::new(WINDOW);
        let t0 = Instant::now();
        scheduler.request(RecomputeReason::RosterChanged, t0);
        scheduler.request(RecomputeReason::RosterChanged, t0 + Duration::from_millis(10));
        assert!(scheduler.pending_deadline().is_some());

        scheduler.cancel_pending();
        assert!(scheduler.pending_deadline().is_none());
        assert!(!scheduler.take_due(t0 + WINDOW * 2));
    }

    #[test]
    fn test_signature_change_detection() {
        let mut scheduler = UpdateScheduler::new(WINDOW);
        let a = ActorId::new();
        let b = ActorId::new();
        let me = ActorId::new();

        let sig = |ids: &[ActorId], tracking: bool| {
            recompute_signature(&mut ids.to_vec(), me, tracking, false, 10.0, None)
        };

        assert!(scheduler.should_recompute(sig(&[a, b], true)));
        // Same inputs, different roster order: identical signature, skipped
        assert!(!scheduler.should_recompute(sig(&[b, a], true)));
        // Flag flip changes the signature
        assert!(scheduler.should_recompute(sig(&[a, b], false)));
        // Roster membership change too
        assert!(scheduler.should_recompute(sig(&[a], false)));

        scheduler.invalidate();
        assert!(scheduler.should_recompute(sig(&[a], false)));
    }

    #[test]
    fn test_signature_covers_radius_and_position() {
        let me = ActorId::new();
        let a = ActorId::new();
        let p = proximap_core::models::GeoPoint { lat: 1.0, lng: 2.0 };

        let s1 = recompute_signature(&mut vec![a], me, true, false, 10.0, Some(p));
        let s2 = recompute_signature(&mut vec![a], me, true, false, 20.0, Some(p));
        let s3 = recompute_signature(&mut vec![a], me, true, false, 10.0, None);
        assert_ne!(s1, s2);
        assert_ne!(s1, s3);
    }
}
