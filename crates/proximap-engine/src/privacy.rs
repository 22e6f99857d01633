//! Privacy-aware display geometry.
//!
//! For a privacy-enabled actor the engine never exposes the exact point as a
//! precise marker: the display geometry is a fixed-radius disk centered on
//! the true point, plus styling that renders only a decorative "someone
//! online" marker. The disk's opacity pulse is a pure animation concern and
//! never touches the underlying data.

use proximap_core::config::EngineConfig;
use proximap_core::models::{ActorPresence, GeoPoint};
use std::time::{Duration, Instant};

/// How an actor's position may be shown on the map
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisplayLocation {
    /// The exact point may be rendered as a precise marker
    Exact(GeoPoint),
    /// Only a fixed-radius disk centered on the point may be rendered
    Obfuscated { center: GeoPoint, radius_km: f64 },
}

impl DisplayLocation {
    pub fn center(&self) -> GeoPoint {
        match self {
            DisplayLocation::Exact(p) => *p,
            DisplayLocation::Obfuscated { center, .. } => *center,
        }
    }
}

/// Decides per actor whether to expose an exact point or a privacy disk
#[derive(Debug, Clone, Copy)]
pub struct PrivacyObfuscator {
    radius_km: f64,
}

impl PrivacyObfuscator {
    pub fn new(config: &EngineConfig) -> Self {
        Self { radius_km: config.privacy_radius_km.value }
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    /// Display geometry for a roster actor. None if the actor has no
    /// usable location.
    pub fn display_location_for(&self, actor: &ActorPresence) -> Option<DisplayLocation> {
        let point = actor.location.filter(|p| p.is_valid())?;
        Some(if actor.privacy_enabled {
            DisplayLocation::Obfuscated { center: point, radius_km: self.radius_km }
        } else {
            DisplayLocation::Exact(point)
        })
    }

    /// Display geometry for the local actor
    pub fn display_self(&self, position: GeoPoint, privacy_enabled: bool) -> DisplayLocation {
        if privacy_enabled {
            DisplayLocation::Obfuscated { center: position, radius_km: self.radius_km }
        } else {
            DisplayLocation::Exact(position)
        }
    }
}

/// Continuous opacity pulse for the privacy circle.
///
/// Oscillates between the configured min and max over a fixed period.
/// `opacity_at` is pure; `restart` resets the phase, which must happen
/// whenever privacy is toggled or the self location changes so the pulse
/// starts cleanly from its minimum.
#[derive(Debug, Clone)]
pub struct PrivacyPulse {
    period: Duration,
    min_opacity: f64,
    max_opacity: f64,
    epoch: Instant,
}

impl PrivacyPulse {
    pub fn new(config: &EngineConfig, now: Instant) -> Self {
        Self {
            period: config.pulse_period(),
            min_opacity: config.pulse_min_opacity.value,
            max_opacity: config.pulse_max_opacity.value,
            epoch: now,
        }
    }

    /// Restart the pulse from its minimum
    pub fn restart(&mut self, now: Instant) {
        self.epoch = now;
    }

    /// Opacity at a point in time, always inside [min, max]
    pub fn opacity_at(&self, now: Instant) -> f64 {
        if self.period.is_zero() {
            return self.min_opacity;
        }
        let elapsed = now.saturating_duration_since(self.epoch).as_secs_f64();
        let phase = (elapsed / self.period.as_secs_f64()) * std::f64::consts::TAU;
        // Raised cosine: starts at min, peaks at max mid-period
        let t = 0.5 * (1.0 - phase.cos());
        self.min_opacity + (self.max_opacity - self.min_opacity) * t
    }
}
