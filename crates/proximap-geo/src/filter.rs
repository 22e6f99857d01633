//! Roster proximity filtering.
//!
//! The filter runs in a fixed order where every step strictly narrows the
//! set: self id, then missing/invalid locations, then block relationships in
//! either direction, then the proximity radius. Malformed records are dropped
//! silently; nothing in this stage is a fatal error.

use proximap_core::models::{ActorPresence, GeoPoint};

use crate::spatial::haversine_km;

/// Filter a roster snapshot down to the actors the map should consider.
///
/// `local` is the local actor's own presence record (its id and block set
/// drive the exclusion steps); `self_pos` is the position distances are
/// measured from, which may differ from `local.location` in manual mode.
pub fn filter_roster(
    roster: &[ActorPresence],
    local: &ActorPresence,
    self_pos: GeoPoint,
    radius_km: f64,
) -> Vec<ActorPresence> {
    roster
        .iter()
        // Step 1: never show the local actor in their own roster
        .filter(|actor| actor.id != local.id)
        // Step 2: drop records without a usable location
        .filter(|actor| {
            let usable = actor.has_usable_location();
            if !usable {
                tracing::debug!(actor_id = %actor.id, "dropping actor without usable location");
            }
            usable
        })
        // Step 3: drop block relationships in either direction
        .filter(|actor| {
            !actor.blocked_by.contains(&local.id) && !local.blocked_by.contains(&actor.id)
        })
        // Step 4: drop actors beyond the proximity radius
        .filter(|actor| {
            // Step 2 guarantees the location is present
            let location = match actor.location {
                Some(location) => location,
                None => return false,
            };
            haversine_km(self_pos, location) <= radius_km
        })
        .cloned()
        .collect()
}
