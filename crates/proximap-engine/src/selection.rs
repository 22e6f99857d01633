//! Selection and meeting state.
//!
//! Tracks which actor is selected on the map and whether a meeting request
//! for them is pending, animating, or completed. The surrounding UI shows a
//! different action card per phase. Transitions:
//! `Idle → Selected → (PendingRequest | Moving) → Completed → Idle`.

use proximap_core::models::{
    ActorId, GeoPoint, MapFeature, MeetingAnimation, SelectionState,
};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// The selection phase driving the UI's action card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPhase {
    Idle,
    Selected(ActorId),
    PendingRequest(ActorId),
    Moving(ActorId),
    Completed(ActorId),
}

/// What a click did
#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    /// A selectable actor was hit and is now selected
    Selected(ActorId),
    /// The selected actor already has an outbound meeting request
    PendingRequest(ActorId),
    /// An aggregate marker was hit; the caller typically zooms into it
    ClusterClicked {
        position: GeoPoint,
        member_ids: Vec<ActorId>,
    },
    /// Empty space beyond the hit-test buffer: the selection was cleared
    Deselected,
    /// Nothing actionable (near-miss on a feature, circle, self marker, or
    /// an actor that is mid-animation)
    Ignored,
}

/// Result of advancing the animation clock
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationTick {
    /// Actors whose meeting animation finished on this tick
    pub completed: Vec<ActorId>,
    /// Current interpolated positions of still-running animations
    pub positions: Vec<(ActorId, GeoPoint)>,
}

pub struct SelectionStateMachine {
    state: SelectionState,
    pending_request: Option<ActorId>,
    animations: Vec<MeetingAnimation>,
    animation_duration: Duration,
}

impl SelectionStateMachine {
    pub fn new(animation_duration: Duration) -> Self {
        Self {
            state: SelectionState::new(),
            pending_request: None,
            animations: Vec::new(),
            animation_duration,
        }
    }

    /// The moving/completed bookkeeping, for marker styling
    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn phase(&self) -> SelectionPhase {
        match self.state.selected {
            None => SelectionPhase::Idle,
            Some(id) if self.state.is_moving(id) => SelectionPhase::Moving(id),
            Some(id) if self.state.is_completed(id) => SelectionPhase::Completed(id),
            Some(id) if self.pending_request == Some(id) => SelectionPhase::PendingRequest(id),
            Some(id) => SelectionPhase::Selected(id),
        }
    }

    /// Process the hit-test result of a click.
    ///
    /// `hits` is what the surface found within the hit-test buffer around the
    /// click, nearest first. An empty result means the click landed on empty
    /// space beyond the buffer and clears the selection; a non-empty result
    /// with nothing selectable (circles, self, a mid-animation actor) leaves
    /// the selection alone, so clicking *near* a marker never spuriously
    /// deselects it.
    pub fn handle_click(
        &mut self,
        hits: &[(proximap_core::models::FeatureId, MapFeature)],
        outbound_requests: &HashSet<ActorId>,
    ) -> ClickOutcome {
        if hits.is_empty() {
            if self.state.selected.take().is_some() {
                self.pending_request = None;
                tracing::debug!("selection cleared by empty-space click");
                return ClickOutcome::Deselected;
            }
            return ClickOutcome::Ignored;
        }

        for (_, feature) in hits {
            match feature {
                MapFeature::Other { actor_id, .. }
                | MapFeature::OtherPrivacy { actor_id, .. } => {
                    let id = *actor_id;
                    if self.state.is_moving(id) || self.state.is_completed(id) {
                        continue;
                    }
                    if self.state.selected == Some(id) {
                        // Idempotent: re-selecting is a no-op, not a toggle
                        return ClickOutcome::Ignored;
                    }
                    self.state.select(id);
                    if outbound_requests.contains(&id) {
                        self.pending_request = Some(id);
                        return ClickOutcome::PendingRequest(id);
                    }
                    self.pending_request = None;
                    return ClickOutcome::Selected(id);
                }
                MapFeature::Cluster { position, member_ids } => {
                    return ClickOutcome::ClusterClicked {
                        position: *position,
                        member_ids: member_ids.clone(),
                    };
                }
                // Circles and the self marker are not selectable
                _ => continue,
            }
        }

        ClickOutcome::Ignored
    }

    /// Programmatic selection, e.g. a "show on map" action from outside the
    /// map. Applies the same eager purge as a click: the newly selected id
    /// leaves both tracking sets before the phase is evaluated.
    pub fn select_actor(&mut self, id: ActorId) {
        if self.state.selected == Some(id) {
            return;
        }
        self.state.select(id);
        self.pending_request = None;
    }

    /// The local actor confirmed a meeting with the selected actor: mark them
    /// moving and start the animation toward the meeting point.
    pub fn confirm_meeting(
        &mut self,
        actor_id: ActorId,
        from: GeoPoint,
        meeting_point: GeoPoint,
        now: Instant,
    ) {
        self.state.begin_moving(actor_id);
        self.pending_request = None;
        // A restarted meeting replaces any leftover animation for the actor
        self.animations.retain(|a| a.actor_id != actor_id);
        self.animations.push(MeetingAnimation::new(
            actor_id,
            from,
            meeting_point,
            now,
            self.animation_duration,
        ));
        tracing::debug!(actor_id = %actor_id, "meeting confirmed, animation started");
    }

    /// Advance animations to `now`: finished ones migrate their actor from
    /// moving to completed, running ones report their interpolated position.
    pub fn tick(&mut self, now: Instant) -> AnimationTick {
        let mut outcome = AnimationTick::default();

        self.animations.retain(|anim| {
            // A selection change may have purged the actor from the moving
            // set mid-flight; its animation is abandoned without completing.
            if !self.state.is_moving(anim.actor_id) {
                return false;
            }
            if anim.is_finished(now) {
                if self.state.finish_moving(anim.actor_id) {
                    outcome.completed.push(anim.actor_id);
                }
                return false;
            }
            outcome.positions.push((anim.actor_id, anim.position_at(now)));
            true
        });

        outcome
    }

    /// When the earliest running animation finishes, if any
    pub fn next_animation_deadline(&self) -> Option<Instant> {
        self.animations
            .iter()
            .filter(|a| self.state.is_moving(a.actor_id))
            .map(|a| a.started_at + a.duration)
            .min()
    }

    pub fn has_running_animations(&self) -> bool {
        !self.animations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proximap_core::models::FeatureId;

    fn p(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint { lat, lng }
    }

    fn other_feature(actor_id: ActorId) -> (FeatureId, MapFeature) {
        (
            FeatureId::new(),
            MapFeature::Other {
                actor_id,
                position: p(0.0, 0.0),
                name: String::new(),
                business: false,
                moving: false,
                completed: false,
            },
        )
    }

    fn privacy_feature(actor_id: ActorId) -> (FeatureId, MapFeature) {
        (
            FeatureId::new(),
            MapFeature::OtherPrivacy {
                actor_id,
                center: p(0.0, 0.0),
                radius_km: 5.0,
                name: String::new(),
            },
        )
    }

    fn machine() -> SelectionStateMachine {
        SelectionStateMachine::new(Duration::from_secs(3))
    }

    #[test]
    fn test_idle_to_selected_to_idle() {
        let mut sm = machine();
        let a = ActorId::new();
        let none = HashSet::new();

        assert_eq!(sm.phase(), SelectionPhase::Idle);
        assert_eq!(sm.handle_click(&[other_feature(a)], &none), ClickOutcome::Selected(a));
        assert_eq!(sm.phase(), SelectionPhase::Selected(a));

        // Empty space beyond the buffer clears the selection
        assert_eq!(sm.handle_click(&[], &none), ClickOutcome::Deselected);
        assert_eq!(sm.phase(), SelectionPhase::Idle);
    }

    #[test]
    fn test_near_miss_keeps_selection() {
        let mut sm = machine();
        let a = ActorId::new();
        let none = HashSet::new();
        sm.handle_click(&[other_feature(a)], &none);

        // The click landed near a circle feature: hits are non-empty but
        // nothing is selectable, so the selection must survive.
        let circle = (
            FeatureId::new(),
            MapFeature::RadiusCircle { center: p(0.0, 0.0), radius_km: 10.0 },
        );
        assert_eq!(sm.handle_click(&[circle], &none), ClickOutcome::Ignored);
        assert_eq!(sm.phase(), SelectionPhase::Selected(a));
    }

    #[test]
    fn test_presence_disk_marker_selectable() {
        let mut sm = machine();
        let a = ActorId::new();
        let none = HashSet::new();

        // A privacy-enabled actor's decorative marker selects like any other
        assert_eq!(sm.handle_click(&[privacy_feature(a)], &none), ClickOutcome::Selected(a));
        assert_eq!(sm.phase(), SelectionPhase::Selected(a));
    }

    #[test]
    fn test_pending_request_detected() {
        let mut sm = machine();
        let a = ActorId::new();
        let outbound: HashSet<ActorId> = [a].into_iter().collect();

        assert_eq!(sm.handle_click(&[other_feature(a)], &outbound), ClickOutcome::PendingRequest(a));
        assert_eq!(sm.phase(), SelectionPhase::PendingRequest(a));
    }

    #[test]
    fn test_meeting_lifecycle() {
        let mut sm = machine();
        let a = ActorId::new();
        let none = HashSet::new();
        sm.handle_click(&[other_feature(a)], &none);

        let t0 = Instant::now();
        sm.confirm_meeting(a, p(0.0, 0.0), p(0.0, 0.01), t0);
        assert_eq!(sm.phase(), SelectionPhase::Moving(a));
        assert!(sm.state().sets_disjoint());

        // Mid-flight: position reported, nothing completed
        let mid = sm.tick(t0 + Duration::from_secs(1));
        assert!(mid.completed.is_empty());
        assert_eq!(mid.positions.len(), 1);
        assert_eq!(mid.positions[0].0, a);

        // Past the duration: actor migrates moving -> completed
        let done = sm.tick(t0 + Duration::from_secs(4));
        assert_eq!(done.completed, vec![a]);
        assert!(done.positions.is_empty());
        assert_eq!(sm.phase(), SelectionPhase::Completed(a));
        assert!(!sm.state().is_moving(a));
        assert!(sm.state().is_completed(a));
        assert!(sm.state().sets_disjoint());
    }

    #[test]
    fn test_moving_actor_not_reselectable() {
        let mut sm = machine();
        let a = ActorId::new();
        let b = ActorId::new();
        let none = HashSet::new();

        sm.handle_click(&[other_feature(a)], &none);
        sm.confirm_meeting(a, p(0.0, 0.0), p(0.0, 0.01), Instant::now());

        // While `a` is mid-animation, selecting `b` works but clicking `a`
        // again is ignored; `b`'s selection also must not disturb `a`.
        assert_eq!(sm.handle_click(&[other_feature(b)], &none), ClickOutcome::Selected(b));
        assert!(sm.state().is_moving(a), "other actor's animation untouched");
        assert_eq!(sm.handle_click(&[other_feature(a)], &none), ClickOutcome::Ignored);
    }

    #[test]
    fn test_selection_change_purges_new_id_mid_animation() {
        let mut sm = machine();
        let a = ActorId::new();
        let b = ActorId::new();
        let none = HashSet::new();

        let t0 = Instant::now();
        sm.handle_click(&[other_feature(a)], &none);
        sm.confirm_meeting(a, p(0.0, 0.0), p(0.0, 0.01), t0);
        sm.handle_click(&[other_feature(b)], &none);

        // Programmatically selecting `a` again purges it from moving; its
        // abandoned animation is dropped on the next tick without completing.
        sm.select_actor(a);
        let tick = sm.tick(t0 + Duration::from_secs(10));
        assert!(tick.completed.is_empty());
        assert!(!sm.state().is_completed(a));
        assert!(sm.state().sets_disjoint());
    }

    #[test]
    fn test_cluster_click() {
        let mut sm = machine();
        let members = vec![ActorId::new(), ActorId::new()];
        let none = HashSet::new();
        let cluster = (
            FeatureId::new(),
            MapFeature::Cluster { position: p(1.0, 1.0), member_ids: members.clone() },
        );

        assert_eq!(
            sm.handle_click(&[cluster], &none),
            ClickOutcome::ClusterClicked { position: p(1.0, 1.0), member_ids: members }
        );
        assert_eq!(sm.phase(), SelectionPhase::Idle);
    }
}
