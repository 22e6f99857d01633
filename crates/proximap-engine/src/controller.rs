//! Engine wiring.
//!
//! `MapController` owns the single recompute pipeline: every trigger source
//! (roster snapshots, tracking config changes, permission transitions,
//! location fixes, UI commands) funnels into the update scheduler, and the
//! scheduler's decisions drive filter → cluster → marker sync. Within one
//! debounce window the last observed state wins; across windows executions
//! are strictly sequential. Dropping out of the run loop cancels every
//! pending timer and the location watch.

use proximap_core::config::EngineConfig;
use proximap_core::models::{ActorId, ActorPresence, GeoPoint, TrackingConfig};
use proximap_core::{LocationError, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

use crate::location::{GetOnceOutcome, LocationEvent, LocationProvider, WatchHandle};
use crate::markers::{MarkerStore, PrivacyCircleSpec, SelfView};
use crate::ports::{
    GeolocationSource, LocationSink, MapSurface, PermissionState, RosterReceiver, ScreenPoint,
};
use crate::privacy::{DisplayLocation, PrivacyObfuscator, PrivacyPulse};
use crate::scheduler::{recompute_signature, RecomputeReason, ThrottleDecision, UpdateScheduler};
use crate::selection::{ClickOutcome, SelectionPhase, SelectionStateMachine};
use proximap_geo::{cluster_actors, filter_roster};

const RECENTER_ZOOM: f64 = 14.0;
const CLUSTER_ZOOM: f64 = 15.0;
const RECENTER_DURATION: Duration = Duration::from_millis(500);
const FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// Commands the surrounding UI sends into the engine
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// A click landed on the map at this pixel
    Click(ScreenPoint),
    /// The local actor confirmed a meeting with an actor at a meeting point
    ConfirmMeeting {
        actor_id: ActorId,
        meeting_point: GeoPoint,
    },
    /// Manual-mode position supplied from a map click
    SetManualPosition(GeoPoint),
    /// Actors with an outbound meeting request, as known to the external
    /// request workflow
    SetOutboundRequests(HashSet<ActorId>),
    /// Programmatic selection from outside the map
    SelectActor(ActorId),
    /// Explicit recompute trigger
    RequestRecompute(RecomputeReason),
    Shutdown,
}

/// Events the engine surfaces back to the UI
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Acquisition failed and the default position was applied. Emitted at
    /// most once per session.
    FallbackNotice {
        error: LocationError,
        position: GeoPoint,
    },
    /// Outcome of a processed click
    Clicked(ClickOutcome),
}

/// Channels the host application uses to talk to a running controller
pub struct EngineHandle {
    pub commands: mpsc::Sender<EngineCommand>,
    pub events: mpsc::Receiver<EngineEvent>,
    /// The current selection phase, driving which action card the UI shows
    pub phase: watch::Receiver<SelectionPhase>,
}

pub struct MapController<G, M, S> {
    commands: mpsc::Receiver<EngineCommand>,
    roster_rx: RosterReceiver,
    tracking_rx: watch::Receiver<TrackingConfig>,
    permission_rx: watch::Receiver<PermissionState>,
    location_events: mpsc::Receiver<LocationEvent>,
    core: EngineCore<G, M, S>,
}

impl<G, M, S> MapController<G, M, S>
where
    G: GeolocationSource + 'static,
    M: MapSurface + 'static,
    S: LocationSink + 'static,
{
    pub fn new(
        local: ActorPresence,
        source: Arc<G>,
        surface: Arc<M>,
        sink: Arc<S>,
        roster_rx: RosterReceiver,
        tracking_rx: watch::Receiver<TrackingConfig>,
        config: EngineConfig,
    ) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (event_tx, event_rx) = mpsc::channel(32);
        let (location_tx, location_rx) = mpsc::channel(32);
        let (phase_tx, phase_rx) = watch::channel(SelectionPhase::Idle);

        let provider = LocationProvider::new(source, sink, &config);
        let permission_rx = provider.permission_state();
        let now = now_std();

        let core = EngineCore {
            local,
            provider,
            markers: MarkerStore::new(surface.clone()),
            surface,
            selection: SelectionStateMachine::new(config.meeting_animation_duration()),
            scheduler: UpdateScheduler::new(config.debounce_window()),
            obfuscator: PrivacyObfuscator::new(&config),
            pulse: PrivacyPulse::new(&config, now),
            last_tracking: *tracking_rx.borrow(),
            tracking_rx: tracking_rx.clone(),
            roster_rx: roster_rx.clone(),
            config,
            self_pos: None,
            outbound_requests: HashSet::new(),
            watch: None,
            location_tx,
            events: event_tx,
            phase_tx,
        };

        let controller = Self {
            commands: command_rx,
            roster_rx,
            tracking_rx,
            permission_rx,
            location_events: location_rx,
            core,
        };
        let handle = EngineHandle {
            commands: command_tx,
            events: event_rx,
            phase: phase_rx,
        };
        (controller, handle)
    }

    /// Drive the engine until shutdown. Teardown cancels the pending debounce
    /// timer and the location watch before returning.
    pub async fn run(self) -> Result<()> {
        let Self {
            mut commands,
            mut roster_rx,
            mut tracking_rx,
            mut permission_rx,
            mut location_events,
            mut core,
        } = self;

        core.startup().await?;

        let mut frames = tokio::time::interval(FRAME_INTERVAL);
        frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            let pending = core
                .scheduler
                .pending_deadline()
                .map(tokio::time::Instant::from_std);
            let debounce_deadline = pending
                .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(3600));
            let frames_needed = core.needs_frames();

            tokio::select! {
                command = commands.recv() => {
                    match command {
                        None | Some(EngineCommand::Shutdown) => break,
                        Some(command) => core.handle_command(command).await?,
                    }
                }
                changed = roster_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    core.request(RecomputeReason::RosterChanged).await?;
                }
                changed = tracking_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    core.on_tracking_changed().await?;
                }
                changed = permission_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *permission_rx.borrow();
                    core.on_permission_changed(state).await?;
                }
                event = location_events.recv() => {
                    if let Some(event) = event {
                        core.on_location_event(event).await?;
                    }
                }
                _ = tokio::time::sleep_until(debounce_deadline), if pending.is_some() => {
                    core.on_debounce_deadline().await?;
                }
                _ = frames.tick(), if frames_needed => {
                    core.on_frame().await?;
                }
            }
        }

        core.teardown().await
    }
}

/// Instants coherent with the tokio clock (and therefore with paused-time
/// tests), in the std representation the pure state machines use.
fn now_std() -> Instant {
    tokio::time::Instant::now().into_std()
}

struct EngineCore<G, M, S> {
    local: ActorPresence,
    provider: LocationProvider<G, S>,
    markers: MarkerStore<M>,
    surface: Arc<M>,
    selection: SelectionStateMachine,
    scheduler: UpdateScheduler,
    obfuscator: PrivacyObfuscator,
    pulse: PrivacyPulse,
    last_tracking: TrackingConfig,
    tracking_rx: watch::Receiver<TrackingConfig>,
    roster_rx: RosterReceiver,
    config: EngineConfig,
    self_pos: Option<GeoPoint>,
    outbound_requests: HashSet<ActorId>,
    watch: Option<WatchHandle>,
    location_tx: mpsc::Sender<LocationEvent>,
    events: mpsc::Sender<EngineEvent>,
    phase_tx: watch::Sender<SelectionPhase>,
}

impl<G, M, S> EngineCore<G, M, S>
where
    G: GeolocationSource + 'static,
    M: MapSurface + 'static,
    S: LocationSink + 'static,
{
    async fn startup(&mut self) -> Result<()> {
        let tracking = *self.tracking_rx.borrow();
        self.provider.set_manual_mode(tracking.is_manual_mode);

        let outcome = self.provider.get_once().await;
        self.apply_fix_outcome(outcome).await?;
        self.sync_watch_state(tracking).await;
        self.request(RecomputeReason::TrackingToggled).await
    }

    fn needs_frames(&self) -> bool {
        self.selection.has_running_animations() || self.privacy_active()
    }

    fn privacy_active(&self) -> bool {
        self.tracking_rx.borrow().is_privacy_enabled && self.self_pos.is_some()
    }

    async fn handle_command(&mut self, command: EngineCommand) -> Result<()> {
        match command {
            EngineCommand::Click(pixel) => self.on_click(pixel).await,
            EngineCommand::ConfirmMeeting { actor_id, meeting_point } => {
                self.on_confirm_meeting(actor_id, meeting_point).await
            }
            EngineCommand::SetManualPosition(point) => self.on_manual_position(point).await,
            EngineCommand::SetOutboundRequests(requests) => {
                self.outbound_requests = requests;
                Ok(())
            }
            EngineCommand::SelectActor(id) => {
                self.selection.select_actor(id);
                self.broadcast_phase();
                self.scheduler.invalidate();
                self.request(RecomputeReason::SelectionChanged).await
            }
            EngineCommand::RequestRecompute(reason) => self.request(reason).await,
            EngineCommand::Shutdown => Ok(()),
        }
    }

    async fn on_click(&mut self, pixel: ScreenPoint) -> Result<()> {
        let tolerance = self.config.hit_tolerance_px.value;
        let hits = self.surface.hit_test(pixel, tolerance).await?;
        let outcome = self.selection.handle_click(&hits, &self.outbound_requests);

        if let ClickOutcome::ClusterClicked { position, .. } = &outcome {
            self.surface
                .animate_view_to(*position, CLUSTER_ZOOM, RECENTER_DURATION)
                .await?;
        }

        self.broadcast_phase();
        let _ = self.events.send(EngineEvent::Clicked(outcome)).await;
        // Selection affects marker styling, which the signature cannot see
        self.scheduler.invalidate();
        self.request(RecomputeReason::SelectionChanged).await
    }

    async fn on_confirm_meeting(
        &mut self,
        actor_id: ActorId,
        meeting_point: GeoPoint,
    ) -> Result<()> {
        let from = self
            .roster_rx
            .borrow()
            .iter()
            .find(|a| a.id == actor_id)
            .and_then(|a| a.location)
            .unwrap_or(meeting_point);

        self.selection.confirm_meeting(actor_id, from, meeting_point, now_std());
        self.broadcast_phase();
        self.scheduler.invalidate();
        self.request(RecomputeReason::SelectionChanged).await
    }

    async fn on_manual_position(&mut self, point: GeoPoint) -> Result<()> {
        let tracking = *self.tracking_rx.borrow();
        if !tracking.is_manual_mode {
            tracing::debug!("manual position ignored outside manual mode");
            return Ok(());
        }
        self.provider
            .set_manual_position(point, tracking.is_privacy_enabled)
            .await?;
        self.set_self_position(point).await
    }

    async fn on_tracking_changed(&mut self) -> Result<()> {
        let tracking = *self.tracking_rx.borrow();
        let previous = self.last_tracking;
        self.last_tracking = tracking;

        self.provider.set_manual_mode(tracking.is_manual_mode);
        self.sync_watch_state(tracking).await;

        let reason = if tracking.is_privacy_enabled != previous.is_privacy_enabled {
            // The pulse restarts cleanly on every privacy toggle
            self.pulse.restart(now_std());
            RecomputeReason::PrivacyToggled
        } else if tracking.radius_km != previous.radius_km {
            RecomputeReason::RadiusChanged
        } else {
            RecomputeReason::TrackingToggled
        };
        self.request(reason).await
    }

    /// Keep the continuous watch aligned with the tracking config: active
    /// only while tracking and not in manual mode.
    async fn sync_watch_state(&mut self, tracking: TrackingConfig) {
        let should_watch = tracking.is_tracking && !tracking.is_manual_mode;
        if should_watch && self.watch.is_none() {
            match self
                .provider
                .start_watch(self.location_tx.clone(), self.tracking_rx.clone())
                .await
            {
                Ok(handle) => self.watch = Some(handle),
                Err(error) => {
                    tracing::warn!(error = %error, "could not start location watch")
                }
            }
        } else if !should_watch {
            if let Some(handle) = self.watch.take() {
                self.provider.stop_watch(handle);
            }
        }
    }

    async fn on_permission_changed(&mut self, state: PermissionState) -> Result<()> {
        tracing::info!(?state, "geolocation permission changed");
        if state == PermissionState::Granted {
            let outcome = self.provider.get_once().await;
            self.apply_fix_outcome(outcome).await?;
        }
        self.request(RecomputeReason::PermissionChanged).await
    }

    async fn on_location_event(&mut self, event: LocationEvent) -> Result<()> {
        match event {
            LocationEvent::Fix(point) => self.set_self_position(point).await,
            LocationEvent::Fallback { error, position, notify_user } => {
                if notify_user {
                    let _ = self
                        .events
                        .send(EngineEvent::FallbackNotice { error, position })
                        .await;
                }
                self.set_self_position(position).await
            }
        }
    }

    async fn apply_fix_outcome(&mut self, outcome: GetOnceOutcome) -> Result<()> {
        match outcome {
            GetOnceOutcome::Fix(point) => self.set_self_position(point).await,
            GetOnceOutcome::Suppressed => Ok(()),
            GetOnceOutcome::Fallback { error, position, notify_user } => {
                if notify_user {
                    let _ = self
                        .events
                        .send(EngineEvent::FallbackNotice { error, position })
                        .await;
                }
                self.set_self_position(position).await
            }
        }
    }

    /// Record a new self position: recentre the viewport on every raw fix,
    /// restart the privacy pulse, and trigger a recompute.
    async fn set_self_position(&mut self, point: GeoPoint) -> Result<()> {
        if self.self_pos == Some(point) {
            return Ok(());
        }
        self.self_pos = Some(point);
        self.pulse.restart(now_std());
        self.surface
            .animate_view_to(point, RECENTER_ZOOM, RECENTER_DURATION)
            .await?;
        self.request(RecomputeReason::SelfMoved).await
    }

    async fn request(&mut self, reason: RecomputeReason) -> Result<()> {
        let now = now_std();
        match self.scheduler.request(reason, now) {
            ThrottleDecision::RunNow => self.recompute(now).await,
            ThrottleDecision::Deferred(_) | ThrottleDecision::Coalesced => Ok(()),
        }
    }

    async fn on_debounce_deadline(&mut self) -> Result<()> {
        let now = now_std();
        if self.scheduler.take_due(now) {
            self.recompute(now).await?;
        }
        Ok(())
    }

    /// One pass of the filter → cluster → marker pipeline, reflecting the
    /// latest roster, tracking config, and self position.
    async fn recompute(&mut self, now: Instant) -> Result<()> {
        let tracking = *self.tracking_rx.borrow();
        let roster = self.roster_rx.borrow().clone();
        let radius_km = tracking.effective_radius_km();

        let mut roster_ids: Vec<ActorId> = roster.iter().map(|a| a.id).collect();
        let signature = recompute_signature(
            &mut roster_ids,
            self.local.id,
            tracking.is_tracking,
            tracking.is_privacy_enabled,
            radius_km,
            self.self_pos,
        );
        if !self.scheduler.should_recompute(signature) {
            return Ok(());
        }

        let Some(self_pos) = self.self_pos else {
            tracing::debug!("recompute deferred: no self position yet");
            return Ok(());
        };

        let filtered = filter_roster(&roster, &self.local, self_pos, radius_km);
        let clusters = cluster_actors(
            &filtered,
            self.config.cluster_radius_km.value,
            self.config.cluster_threshold.value,
        );
        tracing::debug!(
            roster = roster.len(),
            filtered = filtered.len(),
            clusters = clusters.len(),
            radius_km,
            "recompute"
        );

        let self_view = SelfView {
            position: Some(self_pos),
            is_tracking: tracking.is_tracking,
            privacy_enabled: tracking.is_privacy_enabled,
        };
        self.markers
            .sync(&clusters, self_view, self.selection.state(), &self.obfuscator)
            .await?;
        self.markers.update_radius_circle(self_pos, radius_km).await?;

        match self.obfuscator.display_self(self_pos, tracking.is_privacy_enabled) {
            DisplayLocation::Obfuscated { center, radius_km } => {
                self.markers
                    .update_privacy_circle(Some(PrivacyCircleSpec {
                        center,
                        radius_km,
                        opacity: self.pulse.opacity_at(now),
                    }))
                    .await?;
            }
            DisplayLocation::Exact(_) => {
                self.markers.update_privacy_circle(None).await?;
            }
        }

        Ok(())
    }

    /// Animation frame: advance meeting animations and the privacy pulse
    async fn on_frame(&mut self) -> Result<()> {
        let now = now_std();

        let tick = self.selection.tick(now);
        for (actor_id, position) in &tick.positions {
            self.markers.update_actor_position(*actor_id, *position, true).await?;
        }
        if !tick.completed.is_empty() {
            tracing::debug!(completed = tick.completed.len(), "meeting animations finished");
            self.broadcast_phase();
            self.scheduler.invalidate();
            self.request(RecomputeReason::SelectionChanged).await?;
        }

        if self.privacy_active() {
            if let Some(center) = self.self_pos {
                self.markers
                    .update_privacy_circle(Some(PrivacyCircleSpec {
                        center,
                        radius_km: self.obfuscator.radius_km(),
                        opacity: self.pulse.opacity_at(now),
                    }))
                    .await?;
            }
        }

        Ok(())
    }

    fn broadcast_phase(&self) {
        self.phase_tx.send_replace(self.selection.phase());
    }

    async fn teardown(mut self) -> Result<()> {
        self.scheduler.cancel_pending();
        if let Some(handle) = self.watch.take() {
            self.provider.stop_watch(handle);
        }
        self.markers.clear().await?;
        tracing::info!("map engine shut down");
        Ok(())
    }
}
