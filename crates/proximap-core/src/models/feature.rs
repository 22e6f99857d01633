//! Renderable map features and spatial cluster groups.
//!
//! `MapFeature` is a tagged variant rather than a property bag: each kind
//! carries exactly the fields its styling and hit-testing need, and consumers
//! match on it exhaustively.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::actor::{ActorId, ActorPresence};
use super::geo::GeoPoint;

/// Unique identifier for a feature on the map surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureId(pub Uuid);

impl FeatureId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FeatureId {
    fn default() -> Self {
        Self::new()
    }
}

/// A group of actors rendered as one aggregate marker.
///
/// The partition produced by the cluster engine is exhaustive and disjoint:
/// every filtered actor belongs to exactly one group. A group with a single
/// member renders identically to an unclustered actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterGroup {
    /// Seed position the group was opened at
    pub center: GeoPoint,

    /// Member snapshots, seed first
    pub members: Vec<ActorPresence>,

    /// Absorption radius the group was built with, in kilometers
    pub radius_km: f64,
}

impl ClusterGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Groups of one are rendered as a plain actor marker
    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }
}

/// A renderable feature owned by the marker store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MapFeature {
    /// The local actor's exact marker. At most one exists at a time.
    SelfMarker { position: GeoPoint },

    /// Another actor's precise marker. Only emitted for actors without
    /// privacy enabled.
    Other {
        actor_id: ActorId,
        position: GeoPoint,
        name: String,
        business: bool,
        moving: bool,
        completed: bool,
    },

    /// A privacy-enabled actor's presence: a fixed-radius disk plus a
    /// decorative "someone online" marker at its center. Stands in for the
    /// precise marker, which must never exist for such an actor.
    OtherPrivacy {
        actor_id: ActorId,
        center: GeoPoint,
        radius_km: f64,
        name: String,
    },

    /// An aggregate marker for a cluster of actors
    Cluster {
        position: GeoPoint,
        member_ids: Vec<ActorId>,
    },

    /// The proximity radius circle. Singleton per map instance.
    RadiusCircle { center: GeoPoint, radius_km: f64 },

    /// The privacy circle drawn in place of the local actor's exact marker.
    /// Singleton per map instance; `opacity` carries the pulse animation.
    PrivacyCircle {
        center: GeoPoint,
        radius_km: f64,
        opacity: f64,
    },
}

impl MapFeature {
    /// Whether this feature is an actor or cluster marker (the kinds replaced
    /// wholesale on every recompute, as opposed to the persistent circles)
    pub fn is_actor_marker(&self) -> bool {
        matches!(
            self,
            MapFeature::SelfMarker { .. }
                | MapFeature::Other { .. }
                | MapFeature::OtherPrivacy { .. }
                | MapFeature::Cluster { .. }
        )
    }

    /// Whether this feature is one of the singleton circles
    pub fn is_circle(&self) -> bool {
        matches!(
            self,
            MapFeature::RadiusCircle { .. } | MapFeature::PrivacyCircle { .. }
        )
    }

    /// The geographic anchor of the feature
    pub fn position(&self) -> GeoPoint {
        match self {
            MapFeature::SelfMarker { position } => *position,
            MapFeature::Other { position, .. } => *position,
            MapFeature::OtherPrivacy { center, .. } => *center,
            MapFeature::Cluster { position, .. } => *position,
            MapFeature::RadiusCircle { center, .. } => *center,
            MapFeature::PrivacyCircle { center, .. } => *center,
        }
    }

    /// The actor this feature represents, for single-actor markers
    pub fn actor_id(&self) -> Option<ActorId> {
        match self {
            MapFeature::Other { actor_id, .. } | MapFeature::OtherPrivacy { actor_id, .. } => {
                Some(*actor_id)
            }
            _ => None,
        }
    }
}
