//! Selection bookkeeping and the ephemeral meeting animation.
//!
//! `SelectionState` holds which actor is selected plus the moving/completed
//! tracking sets. The two sets are disjoint at all times; every mutation in
//! this module re-establishes that invariant.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use super::actor::ActorId;
use super::geo::GeoPoint;

/// Which actor is selected and which actors have an active or finished
/// meeting animation.
#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    pub selected: Option<ActorId>,
    pub moving: HashSet<ActorId>,
    pub completed: HashSet<ActorId>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select an actor. Re-selecting the current id is a no-op.
    ///
    /// On a selection *change* the newly selected id is eagerly purged from
    /// both tracking sets, so a stale animation state never reappears against
    /// a fresh selection. The purge deliberately touches only the new id: a
    /// just-confirmed meeting for a different actor keeps running.
    pub fn select(&mut self, id: ActorId) {
        if self.selected == Some(id) {
            return;
        }
        self.moving.remove(&id);
        self.completed.remove(&id);
        self.selected = Some(id);
        debug_assert!(self.sets_disjoint());
    }

    /// Clear the selection without touching the tracking sets
    pub fn deselect(&mut self) {
        self.selected = None;
    }

    /// Mark an actor's meeting animation as running
    pub fn begin_moving(&mut self, id: ActorId) {
        self.completed.remove(&id);
        self.moving.insert(id);
        debug_assert!(self.sets_disjoint());
    }

    /// Migrate an actor from moving to completed. Returns false if the actor
    /// was not moving (e.g. purged by a selection change mid-animation).
    pub fn finish_moving(&mut self, id: ActorId) -> bool {
        if self.moving.remove(&id) {
            self.completed.insert(id);
            debug_assert!(self.sets_disjoint());
            true
        } else {
            false
        }
    }

    pub fn is_moving(&self, id: ActorId) -> bool {
        self.moving.contains(&id)
    }

    pub fn is_completed(&self, id: ActorId) -> bool {
        self.completed.contains(&id)
    }

    /// Invariant: an id appears in at most one of the two sets
    pub fn sets_disjoint(&self) -> bool {
        self.moving.is_disjoint(&self.completed)
    }
}

/// An in-flight meeting animation. Created on request confirmation,
/// destroyed on completion; never persisted.
#[derive(Debug, Clone)]
pub struct MeetingAnimation {
    pub actor_id: ActorId,
    pub start: GeoPoint,
    pub end: GeoPoint,
    pub started_at: Instant,
    pub duration: Duration,
}

impl MeetingAnimation {
    /// Vertical bounce amplitude in degrees of latitude (~5.5 m)
    const BOUNCE_AMPLITUDE_DEG: f64 = 0.00005;
    /// Full bounce cycles over the animation
    const BOUNCE_CYCLES: f64 = 3.0;

    pub fn new(
        actor_id: ActorId,
        start: GeoPoint,
        end: GeoPoint,
        started_at: Instant,
        duration: Duration,
    ) -> Self {
        Self { actor_id, start, end, started_at, duration }
    }

    /// Normalized progress in [0, 1]
    pub fn progress_at(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started_at);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        self.progress_at(now) >= 1.0
    }

    /// Interpolated position with a small sinusoidal bounce. Pure; calling it
    /// has no effect on the animation itself.
    pub fn position_at(&self, now: Instant) -> GeoPoint {
        let t = self.progress_at(now);
        let bounce =
            (t * std::f64::consts::PI * Self::BOUNCE_CYCLES).sin().abs() * Self::BOUNCE_AMPLITUDE_DEG;
        GeoPoint {
            lat: self.start.lat + (self.end.lat - self.start.lat) * t + bounce,
            lng: self.start.lng + (self.end.lng - self.start.lng) * t,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint { lat, lng }
    }

    #[test]
    fn test_select_purges_new_id_only() {
        let a = ActorId::new();
        let b = ActorId::new();
        let mut state = SelectionState::new();
        state.begin_moving(a);
        state.begin_moving(b);

        state.select(a);
        assert!(!state.is_moving(a), "newly selected id must leave moving");
        assert!(state.is_moving(b), "other animations keep running");
        assert!(state.sets_disjoint());
    }

    #[test]
    fn test_reselect_is_noop() {
        let a = ActorId::new();
        let mut state = SelectionState::new();
        state.select(a);
        state.begin_moving(a);

        // Clicking the already selected actor again must not purge its
        // freshly confirmed animation.
        state.select(a);
        assert!(state.is_moving(a));
        assert_eq!(state.selected, Some(a));
    }

    #[test]
    fn test_moving_completed_disjoint() {
        let a = ActorId::new();
        let mut state = SelectionState::new();
        state.begin_moving(a);
        assert!(state.finish_moving(a));
        assert!(!state.is_moving(a));
        assert!(state.is_completed(a));
        assert!(state.sets_disjoint());

        // Restarting a meeting pulls the id back out of completed.
        state.begin_moving(a);
        assert!(state.is_moving(a));
        assert!(!state.is_completed(a));
        assert!(state.sets_disjoint());
    }

    #[test]
    fn test_animation_endpoints() {
        let start = Instant::now();
        let anim = MeetingAnimation::new(
            ActorId::new(),
            p(0.0, 0.0),
            p(0.0, 1.0),
            start,
            Duration::from_secs(3),
        );

        let at_start = anim.position_at(start);
        assert!((at_start.lng - 0.0).abs() < 1e-9);

        let at_end = anim.position_at(start + Duration::from_secs(3));
        assert!((at_end.lng - 1.0).abs() < 1e-9);
        // Bounce vanishes at integral half-cycles, so the endpoint is exact.
        assert!((at_end.lat - 0.0).abs() < 1e-6);
        assert!(anim.is_finished(start + Duration::from_secs(3)));
        assert!(!anim.is_finished(start + Duration::from_secs(1)));
    }
}
