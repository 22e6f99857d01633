//! Port trait definitions
//!
//! These traits define the interfaces the engine's external collaborators
//! must implement: the geolocation source, the map rendering surface, and the
//! self-location persistence sink. Roster snapshots arrive over a plain
//! `watch` channel rather than a trait, since the engine only ever treats a
//! new snapshot as an opaque recompute trigger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use proximap_core::models::{ActorPresence, FeatureId, GeoPoint, MapFeature};
use proximap_core::{LocationError, Result};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Platform geolocation permission state. Transitions are external events;
/// the engine only observes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Prompt,
    Granted,
    Denied,
}

/// Options forwarded to the platform geolocation source
#[derive(Debug, Clone, Copy)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    pub timeout: Duration,
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::ZERO,
        }
    }
}

/// A single geolocation reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub point: GeoPoint,
    /// Reported accuracy radius in meters, when the platform provides one
    pub accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// A position on the rendering surface, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: ScreenPoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Stream of fixes (or errors) from an active watch subscription
pub type FixStream = mpsc::Receiver<std::result::Result<PositionFix, LocationError>>;

/// Roster snapshots from the external roster collaborator
pub type RosterReceiver = watch::Receiver<Vec<ActorPresence>>;

/// Port for the platform geolocation source
#[async_trait]
pub trait GeolocationSource: Send + Sync {
    /// Acquire a single fix
    async fn current_position(
        &self,
        options: PositionOptions,
    ) -> std::result::Result<PositionFix, LocationError>;

    /// Open a continuous fix subscription. Dropping the stream cancels it.
    async fn watch_positions(
        &self,
        options: PositionOptions,
    ) -> std::result::Result<FixStream, LocationError>;

    /// Subscribe to permission state changes
    fn permission_state(&self) -> watch::Receiver<PermissionState>;
}

/// Port for the map rendering surface.
///
/// The engine's marker store is the only component that calls the feature
/// mutation methods; everything else treats the surface as read-only.
#[async_trait]
pub trait MapSurface: Send + Sync {
    /// Add a feature under the given id
    async fn add_feature(&self, id: FeatureId, feature: MapFeature) -> Result<()>;

    /// Replace the feature stored under an existing id, keeping the id stable
    async fn update_feature(&self, id: FeatureId, feature: MapFeature) -> Result<()>;

    /// Remove a feature. Removing an unknown id is not an error.
    async fn remove_feature(&self, id: FeatureId) -> Result<()>;

    /// Ids of all features currently on the surface
    async fn feature_ids(&self) -> Result<Vec<FeatureId>>;

    /// Screen projection of a geographic point
    fn project(&self, point: GeoPoint) -> ScreenPoint;

    /// Features whose projected position lies within `tolerance_px` of the
    /// pixel, nearest first
    async fn hit_test(
        &self,
        pixel: ScreenPoint,
        tolerance_px: f64,
    ) -> Result<Vec<(FeatureId, MapFeature)>>;

    /// Animate the viewport to a point
    async fn animate_view_to(&self, point: GeoPoint, zoom: f64, duration: Duration) -> Result<()>;
}

/// Port for persisting the local actor's position
#[async_trait]
pub trait LocationSink: Send + Sync {
    /// Persist the self location. `hide_exact` reflects the privacy flag at
    /// the time of the write.
    async fn save_self_location(&self, point: GeoPoint, hide_exact: bool) -> Result<()>;
}
