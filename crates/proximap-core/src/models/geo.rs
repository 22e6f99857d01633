//! Geographic point type used across all proximap crates.
//!
//! `GeoPoint` bridges serde serialization and the computational `geo` crate
//! types. Coordinates are WGS 84 degrees.

use crate::error::{ProximapError, Result};
use serde::{Deserialize, Serialize};

/// A point on the globe in WGS 84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Create a point, validating the coordinate ranges
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(ProximapError::CoordinateOutOfRange { lat, lng });
        }
        // NaN fails both range checks above, so coordinates here are finite.
        Ok(Self { lat, lng })
    }

    /// Whether the coordinates are inside the valid WGS 84 ranges
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }

    /// Convert to a `geo::Point` (x = longitude, y = latitude)
    pub fn to_geo(&self) -> geo::Point {
        geo::Point::new(self.lng, self.lat)
    }
}

impl From<geo::Point> for GeoPoint {
    fn from(p: geo::Point) -> Self {
        Self { lat: p.y(), lng: p.x() }
    }
}
