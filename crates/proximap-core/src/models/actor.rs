//! Actor presence snapshots and the UI-owned tracking configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use super::geo::GeoPoint;

/// Unique identifier for an actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub Uuid);

impl ActorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A read-only snapshot of one actor as emitted by the roster collaborator.
///
/// Snapshots are never mutated in place; a roster refresh replaces the whole
/// record (replace-on-update semantics).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorPresence {
    /// Unique identifier
    pub id: ActorId,

    /// Last known position, if the actor has ever shared one
    pub location: Option<GeoPoint>,

    /// Whether the actor is currently online
    pub online: bool,

    /// Whether the actor hides their exact position behind a privacy circle
    pub privacy_enabled: bool,

    /// Whether the actor is a business account (styled differently)
    pub business: bool,

    /// Actors that have blocked this actor
    pub blocked_by: HashSet<ActorId>,

    /// Display name
    pub name: String,
}

impl ActorPresence {
    /// Minimal online presence at a position; test and adapter convenience
    pub fn at(id: ActorId, location: GeoPoint) -> Self {
        Self {
            id,
            location: Some(location),
            online: true,
            privacy_enabled: false,
            business: false,
            blocked_by: HashSet::new(),
            name: String::new(),
        }
    }

    /// Whether this record carries a usable position
    pub fn has_usable_location(&self) -> bool {
        self.location.map(|p| p.is_valid()).unwrap_or(false)
    }
}

/// Map tracking configuration owned by the UI layer.
///
/// The engine only ever reads this; it must tolerate the value changing
/// between any two ticks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Proximity radius in kilometers, clamped to [1, 100]
    pub radius_km: f64,

    /// Whether the local actor exposes their own position on the map
    pub is_tracking: bool,

    /// Whether the position is supplied manually (map click) instead of
    /// acquired from the geolocation source
    pub is_manual_mode: bool,

    /// Whether the local actor hides behind a privacy circle
    pub is_privacy_enabled: bool,
}

impl TrackingConfig {
    pub const MIN_RADIUS_KM: f64 = 1.0;
    pub const MAX_RADIUS_KM: f64 = 100.0;

    /// The radius clamped into the allowed range
    pub fn effective_radius_km(&self) -> f64 {
        self.radius_km.clamp(Self::MIN_RADIUS_KM, Self::MAX_RADIUS_KM)
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            radius_km: 10.0,
            is_tracking: true,
            is_manual_mode: false,
            is_privacy_enabled: false,
        }
    }
}
