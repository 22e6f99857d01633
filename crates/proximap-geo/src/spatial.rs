//! Great-circle distance helpers.
//!
//! All proximity decisions in the engine go through `haversine_km`, which
//! delegates to the `geo` crate's Haversine implementation so there is a
//! single source of truth for the sphere model.

use geo::{Distance, Haversine};
use proximap_core::models::GeoPoint;

/// Great-circle distance between two points in kilometers
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    Haversine.distance(a.to_geo(), b.to_geo()) / 1000.0
}

/// Whether two points are within `radius_km` of each other
pub fn within_km(a: GeoPoint, b: GeoPoint, radius_km: f64) -> bool {
    haversine_km(a, b) <= radius_km
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn p(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint { lat, lng }
    }

    #[test]
    fn test_known_distance() {
        // Paris to London is approximately 344 km
        let paris = p(48.8566, 2.3522);
        let london = p(51.5074, -0.1276);

        let d = haversine_km(paris, london);
        assert!(d > 339.0 && d < 349.0, "Paris-London distance {} should be ~344km", d);
    }

    #[test]
    fn test_one_km_east_at_equator() {
        // 0.0089 degrees of longitude at the equator is ~0.99 km
        let origin = p(0.0, 0.0);
        let east = p(0.0, 0.0089);

        let d = haversine_km(origin, east);
        assert!((d - 0.99).abs() < 0.01, "expected ~0.99km, got {}", d);
        assert!(within_km(origin, east, 5.0));
        assert!(!within_km(origin, east, 0.5));
    }

    proptest! {
        #[test]
        fn prop_distance_symmetric(
            lat1 in -90.0f64..90.0, lng1 in -180.0f64..180.0,
            lat2 in -90.0f64..90.0, lng2 in -180.0f64..180.0,
        ) {
            let a = p(lat1, lng1);
            let b = p(lat2, lng2);
            let ab = haversine_km(a, b);
            let ba = haversine_km(b, a);
            prop_assert!((ab - ba).abs() < 1e-9);
        }

        #[test]
        fn prop_distance_identity(lat in -90.0f64..90.0, lng in -180.0f64..180.0) {
            let a = p(lat, lng);
            prop_assert!(haversine_km(a, a).abs() < 1e-9);
        }

        #[test]
        fn prop_distance_nonnegative(
            lat1 in -90.0f64..90.0, lng1 in -180.0f64..180.0,
            lat2 in -90.0f64..90.0, lng2 in -180.0f64..180.0,
        ) {
            prop_assert!(haversine_km(p(lat1, lng1), p(lat2, lng2)) >= 0.0);
        }
    }
}
