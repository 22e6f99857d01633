use crate::error::{ProximapError, Result};
use crate::models::GeoPoint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Configuration source for tracking where values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default value
    Default,
    /// Loaded from config file
    File,
    /// Loaded from environment variable
    Environment,
    /// Provided programmatically by the host application
    Override,
}

impl ConfigSource {
    /// Returns the precedence level (higher = higher priority)
    pub fn precedence(&self) -> u8 {
        match self {
            ConfigSource::Default => 0,
            ConfigSource::File => 1,
            ConfigSource::Environment => 2,
            ConfigSource::Override => 3,
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    /// Update the value if the new source has higher precedence
    pub fn update(&mut self, value: T, source: ConfigSource) {
        if source.precedence() > self.source.precedence() {
            self.value = value;
            self.source = source;
        }
    }
}

/// Layered configuration for the proximity map engine.
///
/// Precedence: host overrides > environment > config file > defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Proximity radius in kilometers, clamped to [1, 100] by consumers
    pub radius_km: ConfigValue<f64>,
    /// Cluster absorption radius in kilometers
    pub cluster_radius_km: ConfigValue<f64>,
    /// Roster size above which clustering engages
    pub cluster_threshold: ConfigValue<usize>,
    /// Fixed privacy circle radius in kilometers
    pub privacy_radius_km: ConfigValue<f64>,
    /// Recompute debounce window in milliseconds
    pub debounce_ms: ConfigValue<u64>,
    /// Minimum interval between accepted one-shot fixes, seconds
    pub min_fix_interval_secs: ConfigValue<u64>,
    /// Minimum interval between persisted watch updates, seconds
    pub min_persist_interval_secs: ConfigValue<u64>,
    /// Geolocation request timeout, seconds
    pub fix_timeout_secs: ConfigValue<u64>,
    /// Meeting animation duration in milliseconds
    pub meeting_animation_ms: ConfigValue<u64>,
    /// Click hit-test tolerance in pixels
    pub hit_tolerance_px: ConfigValue<f64>,
    /// Fallback position when acquisition fails
    pub default_position: ConfigValue<GeoPoint>,
    /// Privacy circle pulse period in milliseconds
    pub pulse_period_ms: ConfigValue<u64>,
    /// Privacy circle pulse opacity bounds
    pub pulse_min_opacity: ConfigValue<f64>,
    pub pulse_max_opacity: ConfigValue<f64>,
}

impl EngineConfig {
    /// Create a new configuration with default values
    pub fn with_defaults() -> Self {
        let d = ConfigSource::Default;
        Self {
            radius_km: ConfigValue::new(10.0, d),
            cluster_radius_km: ConfigValue::new(0.3, d),
            cluster_threshold: ConfigValue::new(10, d),
            privacy_radius_km: ConfigValue::new(5.0, d),
            debounce_ms: ConfigValue::new(120, d),
            min_fix_interval_secs: ConfigValue::new(2, d),
            min_persist_interval_secs: ConfigValue::new(3, d),
            fix_timeout_secs: ConfigValue::new(10, d),
            meeting_animation_ms: ConfigValue::new(3000, d),
            hit_tolerance_px: ConfigValue::new(20.0, d),
            default_position: ConfigValue::new(GeoPoint { lat: -8.5069, lng: 115.2625 }, d),
            pulse_period_ms: ConfigValue::new(2000, d),
            pulse_min_opacity: ConfigValue::new(0.15, d),
            pulse_max_opacity: ConfigValue::new(0.45, d),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ProximapError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to read config file: {}", e),
            })?;

        let file_config: FileConfig =
            toml::from_str(&content).map_err(|e| ProximapError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to parse TOML: {}", e),
            })?;

        let s = ConfigSource::File;
        if let Some(v) = file_config.radius_km {
            self.radius_km.update(v, s);
        }
        if let Some(v) = file_config.cluster_radius_km {
            self.cluster_radius_km.update(v, s);
        }
        if let Some(v) = file_config.cluster_threshold {
            self.cluster_threshold.update(v, s);
        }
        if let Some(v) = file_config.privacy_radius_km {
            self.privacy_radius_km.update(v, s);
        }
        if let Some(v) = file_config.debounce_ms {
            self.debounce_ms.update(v, s);
        }
        if let Some(v) = file_config.min_fix_interval_secs {
            self.min_fix_interval_secs.update(v, s);
        }
        if let Some(v) = file_config.min_persist_interval_secs {
            self.min_persist_interval_secs.update(v, s);
        }
        if let Some(v) = file_config.fix_timeout_secs {
            self.fix_timeout_secs.update(v, s);
        }
        if let Some(v) = file_config.meeting_animation_ms {
            self.meeting_animation_ms.update(v, s);
        }
        if let Some(v) = file_config.hit_tolerance_px {
            self.hit_tolerance_px.update(v, s);
        }
        if let (Some(lat), Some(lng)) = (file_config.default_lat, file_config.default_lng) {
            let point = GeoPoint::new(lat, lng)?;
            self.default_position.update(point, s);
        }
        if let Some(v) = file_config.pulse_period_ms {
            self.pulse_period_ms.update(v, s);
        }
        if let Some(v) = file_config.pulse_min_opacity {
            self.pulse_min_opacity.update(v, s);
        }
        if let Some(v) = file_config.pulse_max_opacity {
            self.pulse_max_opacity.update(v, s);
        }

        Ok(self)
    }

    /// Load configuration from `PROXIMAP_*` environment variables
    pub fn load_from_env(mut self) -> Self {
        let s = ConfigSource::Environment;

        if let Ok(raw) = env::var("PROXIMAP_RADIUS_KM") {
            match raw.parse::<f64>() {
                Ok(v) => self.radius_km.update(v, s),
                Err(_) => tracing::warn!(
                    "Invalid PROXIMAP_RADIUS_KM value '{}': expected float kilometers",
                    raw
                ),
            }
        }

        if let Ok(raw) = env::var("PROXIMAP_CLUSTER_RADIUS_KM") {
            match raw.parse::<f64>() {
                Ok(v) => self.cluster_radius_km.update(v, s),
                Err(_) => tracing::warn!(
                    "Invalid PROXIMAP_CLUSTER_RADIUS_KM value '{}': expected float kilometers",
                    raw
                ),
            }
        }

        if let Ok(raw) = env::var("PROXIMAP_CLUSTER_THRESHOLD") {
            match raw.parse::<usize>() {
                Ok(v) => self.cluster_threshold.update(v, s),
                Err(_) => tracing::warn!(
                    "Invalid PROXIMAP_CLUSTER_THRESHOLD value '{}': expected integer",
                    raw
                ),
            }
        }

        if let Ok(raw) = env::var("PROXIMAP_PRIVACY_RADIUS_KM") {
            match raw.parse::<f64>() {
                Ok(v) => self.privacy_radius_km.update(v, s),
                Err(_) => tracing::warn!(
                    "Invalid PROXIMAP_PRIVACY_RADIUS_KM value '{}': expected float kilometers",
                    raw
                ),
            }
        }

        if let Ok(raw) = env::var("PROXIMAP_DEBOUNCE_MS") {
            match raw.parse::<u64>() {
                Ok(v) => self.debounce_ms.update(v, s),
                Err(_) => tracing::warn!(
                    "Invalid PROXIMAP_DEBOUNCE_MS value '{}': expected integer milliseconds",
                    raw
                ),
            }
        }

        if let Ok(raw) = env::var("PROXIMAP_HIT_TOLERANCE_PX") {
            match raw.parse::<f64>() {
                Ok(v) => self.hit_tolerance_px.update(v, s),
                Err(_) => tracing::warn!(
                    "Invalid PROXIMAP_HIT_TOLERANCE_PX value '{}': expected float pixels",
                    raw
                ),
            }
        }

        self
    }

    /// Apply programmatic overrides from the host application
    pub fn apply_overrides(&mut self, overrides: EngineOverrides) {
        let s = ConfigSource::Override;
        if let Some(v) = overrides.radius_km {
            self.radius_km.update(v, s);
        }
        if let Some(v) = overrides.cluster_radius_km {
            self.cluster_radius_km.update(v, s);
        }
        if let Some(v) = overrides.cluster_threshold {
            self.cluster_threshold.update(v, s);
        }
        if let Some(v) = overrides.privacy_radius_km {
            self.privacy_radius_km.update(v, s);
        }
        if let Some(v) = overrides.debounce_ms {
            self.debounce_ms.update(v, s);
        }
        if let Some(v) = overrides.default_position {
            self.default_position.update(v, s);
        }
    }

    /// Debounce window as a duration
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.value)
    }

    /// Minimum interval between accepted one-shot fixes
    pub fn min_fix_interval(&self) -> Duration {
        Duration::from_secs(self.min_fix_interval_secs.value)
    }

    /// Minimum interval between persisted watch updates
    pub fn min_persist_interval(&self) -> Duration {
        Duration::from_secs(self.min_persist_interval_secs.value)
    }

    /// Geolocation request timeout
    pub fn fix_timeout(&self) -> Duration {
        Duration::from_secs(self.fix_timeout_secs.value)
    }

    /// Meeting animation duration
    pub fn meeting_animation_duration(&self) -> Duration {
        Duration::from_millis(self.meeting_animation_ms.value)
    }

    /// Privacy pulse period
    pub fn pulse_period(&self) -> Duration {
        Duration::from_millis(self.pulse_period_ms.value)
    }

    /// Get all configuration values as a map for inspection
    pub fn to_inspection_map(&self) -> HashMap<String, (String, ConfigSource)> {
        let mut map = HashMap::new();

        map.insert(
            "radius_km".to_string(),
            (format!("{}", self.radius_km.value), self.radius_km.source),
        );
        map.insert(
            "cluster_radius_km".to_string(),
            (format!("{}", self.cluster_radius_km.value), self.cluster_radius_km.source),
        );
        map.insert(
            "cluster_threshold".to_string(),
            (format!("{}", self.cluster_threshold.value), self.cluster_threshold.source),
        );
        map.insert(
            "privacy_radius_km".to_string(),
            (format!("{}", self.privacy_radius_km.value), self.privacy_radius_km.source),
        );
        map.insert(
            "debounce_ms".to_string(),
            (format!("{}", self.debounce_ms.value), self.debounce_ms.source),
        );
        map.insert(
            "hit_tolerance_px".to_string(),
            (format!("{}", self.hit_tolerance_px.value), self.hit_tolerance_px.source),
        );
        map.insert(
            "default_position".to_string(),
            (
                format!(
                    "{},{}",
                    self.default_position.value.lat, self.default_position.value.lng
                ),
                self.default_position.source,
            ),
        );

        map
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Configuration loaded from TOML file
#[derive(Debug, Deserialize, Serialize, Default)]
struct FileConfig {
    radius_km: Option<f64>,
    cluster_radius_km: Option<f64>,
    cluster_threshold: Option<usize>,
    privacy_radius_km: Option<f64>,
    debounce_ms: Option<u64>,
    min_fix_interval_secs: Option<u64>,
    min_persist_interval_secs: Option<u64>,
    fix_timeout_secs: Option<u64>,
    meeting_animation_ms: Option<u64>,
    hit_tolerance_px: Option<f64>,
    default_lat: Option<f64>,
    default_lng: Option<f64>,
    pulse_period_ms: Option<u64>,
    pulse_min_opacity: Option<f64>,
    pulse_max_opacity: Option<f64>,
}

/// Programmatic configuration overrides
#[derive(Debug, Default)]
pub struct EngineOverrides {
    pub radius_km: Option<f64>,
    pub cluster_radius_km: Option<f64>,
    pub cluster_threshold: Option<usize>,
    pub privacy_radius_km: Option<f64>,
    pub debounce_ms: Option<u64>,
    pub default_position: Option<GeoPoint>,
}
