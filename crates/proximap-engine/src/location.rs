//! Location acquisition for the local actor.
//!
//! `LocationProvider` owns the local actor's live position lifecycle:
//! one-shot fixes with in-flight suppression and a minimum acceptance
//! interval, a continuous watch that recentres on every raw fix while
//! rate-limiting persisted writes, and the once-per-session fallback to the
//! configured default position when acquisition fails.

use proximap_core::config::EngineConfig;
use proximap_core::models::{GeoPoint, TrackingConfig};
use proximap_core::{LocationError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::ports::{GeolocationSource, LocationSink, PermissionState, PositionOptions};

/// Events emitted by an active watch subscription
#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    /// A raw fix arrived; the map should recentre on it
    Fix(GeoPoint),
    /// Acquisition failed and the default position was substituted.
    /// `notify_user` is true on the first fallback of the session only.
    Fallback {
        error: LocationError,
        position: GeoPoint,
        notify_user: bool,
    },
}

/// Outcome of a one-shot acquisition.
///
/// Acquisition failures are recovered here, not propagated: the engine never
/// treats a missing fix as fatal, so errors surface as `Fallback` with the
/// substituted default position.
#[derive(Debug, Clone, PartialEq)]
pub enum GetOnceOutcome {
    Fix(GeoPoint),
    /// A request was already in flight, or the acceptance interval since the
    /// previous request has not elapsed. Callers treat this as "no new fix".
    Suppressed,
    Fallback {
        error: LocationError,
        position: GeoPoint,
        notify_user: bool,
    },
}

/// Session-scoped provider state. Reset only on provider re-initialization.
#[derive(Debug, Default)]
struct SessionState {
    last_accepted: Option<Instant>,
    fallback_notified: bool,
    manual_position: Option<GeoPoint>,
}

/// Handle to an active continuous-geolocation subscription. Dropping it (or
/// calling `stop`) cancels the underlying task.
#[derive(Debug)]
pub struct WatchHandle {
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct LocationProvider<G, S> {
    source: Arc<G>,
    sink: Arc<S>,
    options: PositionOptions,
    min_fix_interval: Duration,
    min_persist_interval: Duration,
    fix_timeout: Duration,
    default_position: GeoPoint,
    manual_mode: bool,
    // The lock doubles as the in-flight guard: a one-shot request holds it
    // across the await, so a concurrent `get_once` sees `try_lock` fail and
    // is suppressed instead of stacking a second platform request.
    session: Arc<Mutex<SessionState>>,
}

impl<G, S> LocationProvider<G, S>
where
    G: GeolocationSource + 'static,
    S: LocationSink + 'static,
{
    pub fn new(source: Arc<G>, sink: Arc<S>, config: &EngineConfig) -> Self {
        let fix_timeout = config.fix_timeout();
        Self {
            source,
            sink,
            options: PositionOptions {
                timeout: fix_timeout,
                ..PositionOptions::default()
            },
            min_fix_interval: config.min_fix_interval(),
            min_persist_interval: config.min_persist_interval(),
            fix_timeout,
            default_position: config.default_position.value,
            manual_mode: false,
            session: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    /// Subscribe to the platform permission state
    pub fn permission_state(&self) -> watch::Receiver<PermissionState> {
        self.source.permission_state()
    }

    /// Enable or disable manual mode. While manual, the provider performs no
    /// acquisition at all; the caller supplies points from map clicks.
    pub fn set_manual_mode(&mut self, manual: bool) {
        self.manual_mode = manual;
    }

    pub fn is_manual_mode(&self) -> bool {
        self.manual_mode
    }

    /// Record a manually supplied position and persist it
    pub async fn set_manual_position(&self, point: GeoPoint, hide_exact: bool) -> Result<()> {
        self.session.lock().await.manual_position = Some(point);
        self.sink.save_self_location(point, hide_exact).await
    }

    /// Reset session-scoped state (acceptance interval, fallback notice,
    /// manual position), as on provider re-initialization
    pub async fn reset_session(&self) {
        *self.session.lock().await = SessionState::default();
    }

    /// Acquire a single fix.
    ///
    /// Suppressed when a request is in flight or when called again within the
    /// acceptance interval, so UI re-renders cannot hammer the platform API.
    pub async fn get_once(&self) -> GetOnceOutcome {
        if self.manual_mode {
            return match self.session.lock().await.manual_position {
                Some(point) => GetOnceOutcome::Fix(point),
                None => GetOnceOutcome::Suppressed,
            };
        }

        let Ok(mut session) = self.session.try_lock() else {
            tracing::debug!("one-shot fix suppressed: request in flight");
            return GetOnceOutcome::Suppressed;
        };

        let now = Instant::now();
        if let Some(last) = session.last_accepted {
            if now.duration_since(last) < self.min_fix_interval {
                tracing::debug!("one-shot fix suppressed: inside acceptance interval");
                return GetOnceOutcome::Suppressed;
            }
        }
        session.last_accepted = Some(now);

        match tokio::time::timeout(self.fix_timeout, self.source.current_position(self.options))
            .await
        {
            Ok(Ok(fix)) => GetOnceOutcome::Fix(fix.point),
            Ok(Err(error)) => self.fall_back(&mut session, error),
            Err(_) => self.fall_back(
                &mut session,
                LocationError::Timeout {
                    seconds: self.fix_timeout.as_secs(),
                },
            ),
        }
    }

    fn fall_back(&self, session: &mut SessionState, error: LocationError) -> GetOnceOutcome {
        let notify_user = !session.fallback_notified;
        session.fallback_notified = true;
        tracing::warn!(error = %error, "location acquisition failed, using default position");
        GetOnceOutcome::Fallback {
            error,
            position: self.default_position,
            notify_user,
        }
    }

    /// Start a continuous watch.
    ///
    /// Every raw fix is forwarded on `events` so the map can recentre, but
    /// writes through the persistence sink are limited to one per
    /// `min_persist_interval`. `tracking_rx` supplies the privacy flag read
    /// at each persist.
    pub async fn start_watch(
        &self,
        events: mpsc::Sender<LocationEvent>,
        tracking_rx: watch::Receiver<TrackingConfig>,
    ) -> std::result::Result<WatchHandle, LocationError> {
        if self.manual_mode {
            return Err(LocationError::Unsupported);
        }

        let mut stream = self.source.watch_positions(self.options).await?;
        let sink = self.sink.clone();
        let session = self.session.clone();
        let min_persist = self.min_persist_interval;
        let default_position = self.default_position;

        let task = tokio::spawn(async move {
            let mut last_persist: Option<Instant> = None;
            while let Some(item) = stream.recv().await {
                match item {
                    Ok(fix) => {
                        if events.send(LocationEvent::Fix(fix.point)).await.is_err() {
                            break;
                        }
                        let now = Instant::now();
                        let due = last_persist
                            .map(|t| now.duration_since(t) >= min_persist)
                            .unwrap_or(true);
                        if due {
                            let hide_exact = tracking_rx.borrow().is_privacy_enabled;
                            match sink.save_self_location(fix.point, hide_exact).await {
                                Ok(()) => last_persist = Some(now),
                                Err(e) => {
                                    tracing::warn!(error = %e, "failed to persist watch fix")
                                }
                            }
                        }
                    }
                    Err(error) => {
                        let notify_user = {
                            let mut s = session.lock().await;
                            let notify = !s.fallback_notified;
                            s.fallback_notified = true;
                            notify
                        };
                        tracing::warn!(error = %error, "watch fix failed, using default position");
                        let event = LocationEvent::Fallback {
                            error,
                            position: default_position,
                            notify_user,
                        };
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(WatchHandle { task })
    }

    /// Stop an active watch
    pub fn stop_watch(&self, handle: WatchHandle) {
        handle.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryLocationSink, ScriptedGeolocation};
    use proximap_core::models::GeoPoint;

    fn p(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint { lat, lng }
    }

    fn provider(
        source: Arc<ScriptedGeolocation>,
    ) -> (LocationProvider<ScriptedGeolocation, MemoryLocationSink>, Arc<MemoryLocationSink>) {
        let sink = Arc::new(MemoryLocationSink::new());
        let config = EngineConfig::with_defaults();
        (LocationProvider::new(source, sink.clone(), &config), sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_once_returns_fix() {
        let source = Arc::new(ScriptedGeolocation::new());
        source.push_fix(p(1.0, 2.0));
        let (provider, _) = provider(source);

        assert_eq!(provider.get_once().await, GetOnceOutcome::Fix(p(1.0, 2.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acceptance_interval_suppresses() {
        let source = Arc::new(ScriptedGeolocation::new());
        source.push_fix(p(1.0, 2.0));
        source.push_fix(p(3.0, 4.0));
        let (provider, _) = provider(source);

        assert_eq!(provider.get_once().await, GetOnceOutcome::Fix(p(1.0, 2.0)));
        // Immediately again: inside the 2s acceptance interval
        assert_eq!(provider.get_once().await, GetOnceOutcome::Suppressed);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(provider.get_once().await, GetOnceOutcome::Fix(p(3.0, 4.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_notifies_once_per_session() {
        let source = Arc::new(ScriptedGeolocation::new());
        source.push_error(LocationError::PermissionDenied);
        source.push_error(LocationError::PermissionDenied);
        let (provider, _) = provider(source);
        let default = EngineConfig::with_defaults().default_position.value;

        let first = provider.get_once().await;
        assert_eq!(
            first,
            GetOnceOutcome::Fallback {
                error: LocationError::PermissionDenied,
                position: default,
                notify_user: true,
            }
        );

        tokio::time::advance(Duration::from_secs(3)).await;
        let second = provider.get_once().await;
        assert_eq!(
            second,
            GetOnceOutcome::Fallback {
                error: LocationError::PermissionDenied,
                position: default,
                notify_user: false,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back() {
        let source = Arc::new(ScriptedGeolocation::new());
        // No scripted response: the request hangs until the 10s timeout
        let (provider, _) = provider(source);

        let outcome = provider.get_once().await;
        match outcome {
            GetOnceOutcome::Fallback {
                error: LocationError::Timeout { seconds },
                notify_user: true,
                ..
            } => assert_eq!(seconds, 10),
            other => panic!("expected timeout fallback, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_mode_performs_no_acquisition() {
        let source = Arc::new(ScriptedGeolocation::new());
        source.push_fix(p(9.0, 9.0));
        let (mut provider, sink) = provider(source.clone());
        provider.set_manual_mode(true);

        // No manual position yet: nothing to report, nothing acquired
        assert_eq!(provider.get_once().await, GetOnceOutcome::Suppressed);
        assert_eq!(source.one_shot_requests(), 0);

        provider.set_manual_position(p(5.0, 6.0), false).await.unwrap();
        assert_eq!(provider.get_once().await, GetOnceOutcome::Fix(p(5.0, 6.0)));
        assert_eq!(sink.saves(), vec![(p(5.0, 6.0), false)]);
        assert_eq!(source.one_shot_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_rate_limits_persisted_writes() {
        let source = Arc::new(ScriptedGeolocation::new());
        let (provider, sink) = provider(source.clone());
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (_cfg_tx, cfg_rx) = watch::channel(TrackingConfig::default());

        let handle = provider.start_watch(events_tx, cfg_rx).await.unwrap();

        // Three raw fixes inside one persist interval
        source.emit_fix(p(0.0, 0.0)).await;
        source.emit_fix(p(0.0, 0.001)).await;
        source.emit_fix(p(0.0, 0.002)).await;
        tokio::task::yield_now().await;

        // Every raw fix recentres
        for expected in [p(0.0, 0.0), p(0.0, 0.001), p(0.0, 0.002)] {
            assert_eq!(events_rx.recv().await, Some(LocationEvent::Fix(expected)));
        }
        // Only the first write went through within the 3s window
        assert_eq!(sink.saves().len(), 1);

        tokio::time::advance(Duration::from_secs(4)).await;
        source.emit_fix(p(0.0, 0.003)).await;
        assert_eq!(events_rx.recv().await, Some(LocationEvent::Fix(p(0.0, 0.003))));
        assert_eq!(sink.saves().len(), 2);

        provider.stop_watch(handle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_error_falls_back_once() {
        let source = Arc::new(ScriptedGeolocation::new());
        let (provider, _) = provider(source.clone());
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (_cfg_tx, cfg_rx) = watch::channel(TrackingConfig::default());

        let _handle = provider.start_watch(events_tx, cfg_rx).await.unwrap();

        source
            .emit_error(LocationError::PositionUnavailable { reason: "no signal".into() })
            .await;
        match events_rx.recv().await {
            Some(LocationEvent::Fallback { notify_user, .. }) => assert!(notify_user),
            other => panic!("expected fallback event, got {:?}", other),
        }

        source
            .emit_error(LocationError::PositionUnavailable { reason: "no signal".into() })
            .await;
        match events_rx.recv().await {
            Some(LocationEvent::Fallback { notify_user, .. }) => assert!(!notify_user),
            other => panic!("expected fallback event, got {:?}", other),
        }
    }
}
