//! Marker lifecycle.
//!
//! `MarkerStore` is the authoritative mapping from actor/cluster identity to
//! a renderable feature, and the only component permitted to mutate the map
//! surface's feature collection. Actor and cluster markers are replaced
//! wholesale on every sync (clear relevant, re-add); the radius and privacy
//! circles persist across recomputes and are updated in place through their
//! own paths.

use proximap_core::models::{
    ActorId, ClusterGroup, FeatureId, GeoPoint, MapFeature, SelectionState,
};
use proximap_core::Result;
use std::collections::HashMap;
use std::sync::Arc;

use crate::ports::MapSurface;
use crate::privacy::{DisplayLocation, PrivacyObfuscator};

/// The local actor's state as the marker store needs it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelfView {
    pub position: Option<GeoPoint>,
    pub is_tracking: bool,
    pub privacy_enabled: bool,
}

impl SelfView {
    /// The self marker is omitted when tracking is off or privacy is on.
    /// Tracking only controls exposure of the local actor; other actors'
    /// markers are unaffected.
    pub fn shows_self_marker(&self) -> bool {
        self.is_tracking && !self.privacy_enabled && self.position.is_some()
    }
}

/// In-place update spec for the privacy circle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrivacyCircleSpec {
    pub center: GeoPoint,
    pub radius_km: f64,
    pub opacity: f64,
}

pub struct MarkerStore<M> {
    surface: Arc<M>,
    features: HashMap<FeatureId, MapFeature>,
    actor_index: HashMap<ActorId, FeatureId>,
    self_marker: Option<FeatureId>,
    radius_circle: Option<FeatureId>,
    privacy_circle: Option<FeatureId>,
}

impl<M: MapSurface> MarkerStore<M> {
    pub fn new(surface: Arc<M>) -> Self {
        Self {
            surface,
            features: HashMap::new(),
            actor_index: HashMap::new(),
            self_marker: None,
            radius_circle: None,
            privacy_circle: None,
        }
    }

    pub fn surface(&self) -> &Arc<M> {
        &self.surface
    }

    /// All features currently owned by the store
    pub fn features(&self) -> &HashMap<FeatureId, MapFeature> {
        &self.features
    }

    /// The feature rendering a given actor, if it is on the map individually
    pub fn feature_for_actor(&self, actor_id: ActorId) -> Option<FeatureId> {
        self.actor_index.get(&actor_id).copied()
    }

    pub fn has_self_marker(&self) -> bool {
        self.self_marker.is_some()
    }

    pub fn has_privacy_circle(&self) -> bool {
        self.privacy_circle.is_some()
    }

    /// Replace every actor/cluster marker with a fresh batch computed from
    /// the given clusters and self view. Singleton members go through the
    /// obfuscator: a privacy-enabled actor gets a presence disk, never a
    /// precise marker.
    ///
    /// Postcondition: exactly one feature per surviving cluster/actor, at
    /// most one self marker, no duplicate ids, no stale features. The circle
    /// features are untouched.
    pub async fn sync(
        &mut self,
        clusters: &[ClusterGroup],
        self_view: SelfView,
        selection: &SelectionState,
        obfuscator: &PrivacyObfuscator,
    ) -> Result<()> {
        // Clear: drop every non-circle feature
        let stale: Vec<FeatureId> = self
            .features
            .iter()
            .filter(|(_, f)| f.is_actor_marker())
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            self.surface.remove_feature(id).await?;
            self.features.remove(&id);
        }
        self.actor_index.clear();
        self.self_marker = None;

        // Re-add: one feature per cluster group
        for group in clusters {
            if group.is_empty() {
                continue;
            }
            let feature = if group.is_singleton() {
                let member = &group.members[0];
                let Some(display) = obfuscator.display_location_for(member) else {
                    continue;
                };
                match display {
                    DisplayLocation::Exact(position) => MapFeature::Other {
                        actor_id: member.id,
                        position,
                        name: member.name.clone(),
                        business: member.business,
                        moving: selection.is_moving(member.id),
                        completed: selection.is_completed(member.id),
                    },
                    DisplayLocation::Obfuscated { center, radius_km } => {
                        MapFeature::OtherPrivacy {
                            actor_id: member.id,
                            center,
                            radius_km,
                            name: member.name.clone(),
                        }
                    }
                }
            } else {
                MapFeature::Cluster {
                    position: group.center,
                    member_ids: group.members.iter().map(|m| m.id).collect(),
                }
            };

            let id = FeatureId::new();
            self.surface.add_feature(id, feature.clone()).await?;
            if let Some(actor_id) = feature.actor_id() {
                self.actor_index.insert(actor_id, id);
            }
            self.features.insert(id, feature);
        }

        // Self marker, unless suppressed by the tracking flag or privacy
        if self_view.shows_self_marker() {
            if let Some(position) = self_view.position {
                let id = FeatureId::new();
                let feature = MapFeature::SelfMarker { position };
                self.surface.add_feature(id, feature.clone()).await?;
                self.features.insert(id, feature);
                self.self_marker = Some(id);
            }
        }

        tracing::debug!(
            clusters = clusters.len(),
            features = self.features.len(),
            self_marker = self.self_marker.is_some(),
            "marker sync complete"
        );
        Ok(())
    }

    /// Move a single actor marker, keeping its feature id stable. Used by the
    /// meeting animation loop.
    pub async fn update_actor_position(
        &mut self,
        actor_id: ActorId,
        position: GeoPoint,
        moving: bool,
    ) -> Result<()> {
        let Some(id) = self.actor_index.get(&actor_id).copied() else {
            return Ok(());
        };
        if let Some(MapFeature::Other {
            position: stored_pos,
            moving: stored_moving,
            ..
        }) = self.features.get_mut(&id)
        {
            *stored_pos = position;
            *stored_moving = moving;
            let feature = self.features[&id].clone();
            self.surface.update_feature(id, feature).await?;
        }
        Ok(())
    }

    /// Update the proximity radius circle in place, creating it on first use
    pub async fn update_radius_circle(&mut self, center: GeoPoint, radius_km: f64) -> Result<()> {
        let feature = MapFeature::RadiusCircle { center, radius_km };
        match self.radius_circle {
            Some(id) => {
                self.surface.update_feature(id, feature.clone()).await?;
                self.features.insert(id, feature);
            }
            None => {
                let id = FeatureId::new();
                self.surface.add_feature(id, feature.clone()).await?;
                self.features.insert(id, feature);
                self.radius_circle = Some(id);
            }
        }
        Ok(())
    }

    /// Update or remove the privacy circle in place.
    ///
    /// Passing `None` removes it (privacy disabled); passing `Some` creates
    /// or updates it. The caller guarantees the self marker is suppressed
    /// whenever a spec is passed, preserving the mutual exclusion invariant.
    pub async fn update_privacy_circle(&mut self, spec: Option<PrivacyCircleSpec>) -> Result<()> {
        match (spec, self.privacy_circle) {
            (Some(spec), Some(id)) => {
                let feature = MapFeature::PrivacyCircle {
                    center: spec.center,
                    radius_km: spec.radius_km,
                    opacity: spec.opacity,
                };
                self.surface.update_feature(id, feature.clone()).await?;
                self.features.insert(id, feature);
            }
            (Some(spec), None) => {
                let id = FeatureId::new();
                let feature = MapFeature::PrivacyCircle {
                    center: spec.center,
                    radius_km: spec.radius_km,
                    opacity: spec.opacity,
                };
                self.surface.add_feature(id, feature.clone()).await?;
                self.features.insert(id, feature);
                self.privacy_circle = Some(id);
            }
            (None, Some(id)) => {
                self.surface.remove_feature(id).await?;
                self.features.remove(&id);
                self.privacy_circle = None;
            }
            (None, None) => {}
        }
        Ok(())
    }

    /// Remove everything the store owns, as on map teardown
    pub async fn clear(&mut self) -> Result<()> {
        for id in self.features.keys().copied().collect::<Vec<_>>() {
            self.surface.remove_feature(id).await?;
        }
        self.features.clear();
        self.actor_index.clear();
        self.self_marker = None;
        self.radius_circle = None;
        self.privacy_circle = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryMapSurface;
    use proximap_core::config::EngineConfig;
    use proximap_core::models::ActorPresence;

    fn p(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint { lat, lng }
    }

    fn obf() -> PrivacyObfuscator {
        PrivacyObfuscator::new(&EngineConfig::with_defaults())
    }

    fn group_of(actors: Vec<ActorPresence>) -> ClusterGroup {
        let center = actors[0].location.unwrap();
        ClusterGroup { center, members: actors, radius_km: 0.3 }
    }

    fn tracking_self(position: GeoPoint) -> SelfView {
        SelfView { position: Some(position), is_tracking: true, privacy_enabled: false }
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let surface = Arc::new(MemoryMapSurface::new());
        let mut store = MarkerStore::new(surface.clone());
        let selection = SelectionState::new();

        let clusters = vec![
            group_of(vec![ActorPresence::at(ActorId::new(), p(0.0, 0.01))]),
            group_of(vec![
                ActorPresence::at(ActorId::new(), p(0.0, 0.02)),
                ActorPresence::at(ActorId::new(), p(0.0, 0.021)),
            ]),
        ];
        let self_view = tracking_self(p(0.0, 0.0));

        store.sync(&clusters, self_view, &selection, &obf()).await.unwrap();
        let first_count = surface.feature_count().await;
        // One singleton marker, one cluster marker, one self marker
        assert_eq!(first_count, 3);

        store.sync(&clusters, self_view, &selection, &obf()).await.unwrap();
        assert_eq!(surface.feature_count().await, first_count, "no leaked features");
        assert_eq!(store.features().len(), first_count);
    }

    #[tokio::test]
    async fn test_self_marker_suppression() {
        let surface = Arc::new(MemoryMapSurface::new());
        let mut store = MarkerStore::new(surface.clone());
        let selection = SelectionState::new();

        // Tracking off: no self marker, others still visible
        let clusters = vec![group_of(vec![ActorPresence::at(ActorId::new(), p(0.0, 0.01))])];
        let view = SelfView { position: Some(p(0.0, 0.0)), is_tracking: false, privacy_enabled: false };
        store.sync(&clusters, view, &selection, &obf()).await.unwrap();
        assert!(!store.has_self_marker());
        assert_eq!(store.features().len(), 1);

        // Privacy on: self marker suppressed even while tracking
        let view = SelfView { position: Some(p(0.0, 0.0)), is_tracking: true, privacy_enabled: true };
        store.sync(&clusters, view, &selection, &obf()).await.unwrap();
        assert!(!store.has_self_marker());

        // Tracking on, privacy off: marker appears
        store.sync(&clusters, tracking_self(p(0.0, 0.0)), &selection, &obf()).await.unwrap();
        assert!(store.has_self_marker());
    }

    #[tokio::test]
    async fn test_circles_survive_sync() {
        let surface = Arc::new(MemoryMapSurface::new());
        let mut store = MarkerStore::new(surface.clone());
        let selection = SelectionState::new();

        store.update_radius_circle(p(0.0, 0.0), 10.0).await.unwrap();
        store
            .update_privacy_circle(Some(PrivacyCircleSpec {
                center: p(0.0, 0.0),
                radius_km: 5.0,
                opacity: 0.2,
            }))
            .await
            .unwrap();

        let view = SelfView { position: Some(p(0.0, 0.0)), is_tracking: true, privacy_enabled: true };
        store.sync(&[], view, &selection, &obf()).await.unwrap();

        // Both circles still present; privacy excludes the self marker
        assert!(store.has_privacy_circle());
        assert!(!store.has_self_marker());
        assert_eq!(surface.feature_count().await, 2);

        // In-place update keeps the same feature id
        let before: Vec<FeatureId> = store.features().keys().copied().collect();
        store.update_radius_circle(p(1.0, 1.0), 25.0).await.unwrap();
        let after: Vec<FeatureId> = store.features().keys().copied().collect();
        assert_eq!(
            {
                let mut b = before;
                b.sort_by_key(|id| id.0);
                b
            },
            {
                let mut a = after;
                a.sort_by_key(|id| id.0);
                a
            }
        );

        // Disabling privacy removes the circle
        store.update_privacy_circle(None).await.unwrap();
        assert!(!store.has_privacy_circle());
        assert_eq!(surface.feature_count().await, 1);
    }

    #[tokio::test]
    async fn test_privacy_enabled_actor_gets_disk_not_precise_marker() {
        let surface = Arc::new(MemoryMapSurface::new());
        let mut store = MarkerStore::new(surface.clone());
        let selection = SelectionState::new();

        let mut hidden = ActorPresence::at(ActorId::new(), p(0.01, 0.0));
        hidden.privacy_enabled = true;
        let visible = ActorPresence::at(ActorId::new(), p(0.0, 0.01));
        let clusters = vec![group_of(vec![hidden.clone()]), group_of(vec![visible.clone()])];

        store.sync(&clusters, tracking_self(p(0.0, 0.0)), &selection, &obf()).await.unwrap();

        // The hidden actor renders as a fixed-radius presence disk; their
        // exact point never reaches the surface as a precise marker.
        let id = store.feature_for_actor(hidden.id).unwrap();
        match &store.features()[&id] {
            MapFeature::OtherPrivacy { center, radius_km, .. } => {
                assert_eq!(*center, p(0.01, 0.0));
                assert_eq!(*radius_km, 5.0);
            }
            other => panic!("expected presence disk, got {:?}", other),
        }
        assert!(
            !surface
                .snapshot()
                .values()
                .any(|f| matches!(f, MapFeature::Other { actor_id, .. } if *actor_id == hidden.id)),
            "no precise marker for a privacy-enabled actor"
        );

        // The visible actor still gets a precise marker
        let id = store.feature_for_actor(visible.id).unwrap();
        assert!(matches!(&store.features()[&id], MapFeature::Other { .. }));
    }

    #[tokio::test]
    async fn test_animated_position_update_in_place() {
        let surface = Arc::new(MemoryMapSurface::new());
        let mut store = MarkerStore::new(surface.clone());
        let selection = SelectionState::new();

        let actor = ActorPresence::at(ActorId::new(), p(0.0, 0.01));
        let clusters = vec![group_of(vec![actor.clone()])];
        store.sync(&clusters, tracking_self(p(0.0, 0.0)), &selection, &obf()).await.unwrap();

        let id = store.feature_for_actor(actor.id).unwrap();
        store.update_actor_position(actor.id, p(0.0, 0.015), true).await.unwrap();

        assert_eq!(store.feature_for_actor(actor.id), Some(id), "feature id stays stable");
        match &store.features()[&id] {
            MapFeature::Other { position, moving, .. } => {
                assert_eq!(*position, p(0.0, 0.015));
                assert!(*moving);
            }
            other => panic!("expected Other feature, got {:?}", other),
        }
    }
}
