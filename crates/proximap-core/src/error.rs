//! Error types for proximap

use thiserror::Error;

/// Geolocation acquisition errors, mirroring the platform taxonomy.
///
/// None of these are fatal: the provider recovers by falling back to the
/// configured default position and surfaces a notice to the user once per
/// session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Geolocation permission denied")]
    PermissionDenied,

    #[error("Position unavailable: {reason}")]
    PositionUnavailable { reason: String },

    #[error("Geolocation request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Geolocation is not supported on this platform")]
    Unsupported,
}

#[derive(Debug, Error)]
pub enum ProximapError {
    // Geolocation errors
    #[error(transparent)]
    Location(#[from] LocationError),

    // Roster errors
    #[error("Roster fetch failed: {reason}")]
    RosterFetchFailed { reason: String },

    #[error("Invalid actor record {actor_id}: {reason}")]
    InvalidActorRecord { actor_id: String, reason: String },

    // Geometry errors
    #[error("Coordinate out of range: lat={lat}, lng={lng}")]
    CoordinateOutOfRange { lat: f64, lng: f64 },

    // Map surface errors
    #[error("Map surface rejected operation: {reason}")]
    SurfaceRejected { reason: String },

    // Persistence errors
    #[error("Failed to persist self location: {reason}")]
    PersistFailed { reason: String },

    // Configuration errors
    #[error("Missing required configuration: {key}")]
    ConfigMissing { key: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProximapError>;
