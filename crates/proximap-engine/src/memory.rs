//! In-memory collaborator implementations for development and testing.
//!
//! These implementations use `RwLock::unwrap()` intentionally. Lock poisoning
//! only occurs when another thread panicked while holding the lock, which is
//! an unrecoverable state. Production deployments bind the port traits to the
//! real platform geolocation API, map renderer, and backend instead.

use async_trait::async_trait;
use chrono::Utc;
use proximap_core::models::{FeatureId, GeoPoint, MapFeature};
use proximap_core::{LocationError, ProximapError, Result};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use crate::ports::{
    FixStream, GeolocationSource, LocationSink, MapSurface, PermissionState, PositionFix,
    PositionOptions, ScreenPoint,
};

/// A feature projected to screen space, indexed for hit-testing
#[derive(Debug, Clone, PartialEq)]
struct ProjectedFeature {
    id: FeatureId,
    px: [f64; 2],
}

impl RTreeObject for ProjectedFeature {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.px)
    }
}

impl PointDistance for ProjectedFeature {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        (self.px[0] - point[0]).powi(2) + (self.px[1] - point[1]).powi(2)
    }
}

/// In-memory map surface with an equirectangular projection and an R-tree
/// backed hit test.
#[derive(Debug, Clone)]
pub struct MemoryMapSurface {
    features: Arc<RwLock<HashMap<FeatureId, MapFeature>>>,
    view_animations: Arc<RwLock<Vec<(GeoPoint, f64)>>>,
    origin: GeoPoint,
    px_per_degree: f64,
}

impl MemoryMapSurface {
    pub fn new() -> Self {
        Self::with_projection(GeoPoint { lat: 0.0, lng: 0.0 }, 1000.0)
    }

    /// A surface projecting around `origin` at `px_per_degree` pixels per
    /// degree, screen y growing southward
    pub fn with_projection(origin: GeoPoint, px_per_degree: f64) -> Self {
        Self {
            features: Arc::new(RwLock::new(HashMap::new())),
            view_animations: Arc::new(RwLock::new(Vec::new())),
            origin,
            px_per_degree,
        }
    }

    pub async fn feature_count(&self) -> usize {
        self.features.read().unwrap().len()
    }

    pub fn snapshot(&self) -> HashMap<FeatureId, MapFeature> {
        self.features.read().unwrap().clone()
    }

    /// Viewport animations requested so far, oldest first
    pub fn view_animations(&self) -> Vec<(GeoPoint, f64)> {
        self.view_animations.read().unwrap().clone()
    }
}

impl Default for MemoryMapSurface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MapSurface for MemoryMapSurface {
    async fn add_feature(&self, id: FeatureId, feature: MapFeature) -> Result<()> {
        let mut features = self.features.write().unwrap();
        if features.contains_key(&id) {
            return Err(ProximapError::SurfaceRejected {
                reason: format!("duplicate feature id {:?}", id.0),
            });
        }
        features.insert(id, feature);
        Ok(())
    }

    async fn update_feature(&self, id: FeatureId, feature: MapFeature) -> Result<()> {
        let mut features = self.features.write().unwrap();
        match features.get_mut(&id) {
            Some(existing) => {
                *existing = feature;
                Ok(())
            }
            None => Err(ProximapError::SurfaceRejected {
                reason: format!("update of unknown feature id {:?}", id.0),
            }),
        }
    }

    async fn remove_feature(&self, id: FeatureId) -> Result<()> {
        self.features.write().unwrap().remove(&id);
        Ok(())
    }

    async fn feature_ids(&self) -> Result<Vec<FeatureId>> {
        Ok(self.features.read().unwrap().keys().copied().collect())
    }

    fn project(&self, point: GeoPoint) -> ScreenPoint {
        ScreenPoint {
            x: (point.lng - self.origin.lng) * self.px_per_degree,
            y: (self.origin.lat - point.lat) * self.px_per_degree,
        }
    }

    async fn hit_test(
        &self,
        pixel: ScreenPoint,
        tolerance_px: f64,
    ) -> Result<Vec<(FeatureId, MapFeature)>> {
        let features = self.features.read().unwrap().clone();

        let projected: Vec<ProjectedFeature> = features
            .iter()
            .map(|(id, feature)| {
                let px = self.project(feature.position());
                ProjectedFeature { id: *id, px: [px.x, px.y] }
            })
            .collect();
        let tree = RTree::bulk_load(projected);

        let mut hits: Vec<(f64, FeatureId)> = tree
            .locate_within_distance([pixel.x, pixel.y], tolerance_px * tolerance_px)
            .map(|p| (ScreenPoint::new(p.px[0], p.px[1]).distance_to(pixel), p.id))
            .collect();
        hits.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(hits
            .into_iter()
            .filter_map(|(_, id)| features.get(&id).map(|f| (id, f.clone())))
            .collect())
    }

    async fn animate_view_to(&self, point: GeoPoint, zoom: f64, _duration: Duration) -> Result<()> {
        self.view_animations.write().unwrap().push((point, zoom));
        Ok(())
    }
}

type ScriptedResponse = std::result::Result<PositionFix, LocationError>;

/// Scripted geolocation source: tests queue one-shot responses and push
/// watch fixes explicitly. An empty one-shot script leaves the request
/// pending, which exercises the provider's timeout path.
pub struct ScriptedGeolocation {
    one_shots: Mutex<VecDeque<ScriptedResponse>>,
    one_shot_requests: Mutex<usize>,
    watch_senders: Mutex<Vec<mpsc::Sender<ScriptedResponse>>>,
    permission_tx: watch::Sender<PermissionState>,
    permission_rx: watch::Receiver<PermissionState>,
}

impl ScriptedGeolocation {
    pub fn new() -> Self {
        let (permission_tx, permission_rx) = watch::channel(PermissionState::Prompt);
        Self {
            one_shots: Mutex::new(VecDeque::new()),
            one_shot_requests: Mutex::new(0),
            watch_senders: Mutex::new(Vec::new()),
            permission_tx,
            permission_rx,
        }
    }

    pub fn push_fix(&self, point: GeoPoint) {
        self.one_shots.lock().unwrap().push_back(Ok(PositionFix {
            point,
            accuracy_m: Some(5.0),
            timestamp: Utc::now(),
        }));
    }

    pub fn push_error(&self, error: LocationError) {
        self.one_shots.lock().unwrap().push_back(Err(error));
    }

    /// Number of one-shot acquisitions attempted against this source
    pub fn one_shot_requests(&self) -> usize {
        *self.one_shot_requests.lock().unwrap()
    }

    pub fn set_permission(&self, state: PermissionState) {
        // send only fails when every receiver is gone, which a test tearing
        // down is allowed to do
        let _ = self.permission_tx.send(state);
    }

    /// Push a fix to every open watch subscription
    pub async fn emit_fix(&self, point: GeoPoint) {
        self.emit(Ok(PositionFix { point, accuracy_m: Some(5.0), timestamp: Utc::now() })).await;
    }

    /// Push an error to every open watch subscription
    pub async fn emit_error(&self, error: LocationError) {
        self.emit(Err(error)).await;
    }

    async fn emit(&self, response: ScriptedResponse) {
        let senders: Vec<_> = self.watch_senders.lock().unwrap().clone();
        for sender in senders {
            let _ = sender.send(response.clone()).await;
        }
    }
}

impl Default for ScriptedGeolocation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GeolocationSource for ScriptedGeolocation {
    async fn current_position(&self, _options: PositionOptions) -> ScriptedResponse {
        *self.one_shot_requests.lock().unwrap() += 1;
        let next = self.one_shots.lock().unwrap().pop_front();
        match next {
            Some(response) => response,
            // No scripted response: hang until the caller's timeout fires
            None => futures::future::pending().await,
        }
    }

    async fn watch_positions(
        &self,
        _options: PositionOptions,
    ) -> std::result::Result<FixStream, LocationError> {
        let (tx, rx) = mpsc::channel(32);
        self.watch_senders.lock().unwrap().push(tx);
        Ok(rx)
    }

    fn permission_state(&self) -> watch::Receiver<PermissionState> {
        self.permission_rx.clone()
    }
}

/// Records persisted self locations for assertions
#[derive(Debug, Default)]
pub struct MemoryLocationSink {
    saves: RwLock<Vec<(GeoPoint, bool)>>,
}

impl MemoryLocationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saves(&self) -> Vec<(GeoPoint, bool)> {
        self.saves.read().unwrap().clone()
    }
}

#[async_trait]
impl LocationSink for MemoryLocationSink {
    async fn save_self_location(&self, point: GeoPoint, hide_exact: bool) -> Result<()> {
        self.saves.write().unwrap().push((point, hide_exact));
        Ok(())
    }
}
