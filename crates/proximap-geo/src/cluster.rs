//! Greedy spatial clustering.
//!
//! Dense areas render as one aggregate marker instead of a pile of
//! overlapping ones. The pass is greedy and seed-anchored: actors are visited
//! in input order, each unprocessed actor opens a group at its own location,
//! and every remaining unprocessed actor within the absorption radius *of the
//! seed* joins that group. O(n²), fine for rosters in the low hundreds.

use proximap_core::models::{ActorPresence, ClusterGroup};

use crate::spatial::haversine_km;

/// Partition filtered actors into cluster groups.
///
/// Clustering only engages above `threshold` actors; sparse rosters come back
/// as singleton groups so each actor renders individually. The output is an
/// exhaustive, disjoint partition of the input; its ordering is unspecified.
pub fn cluster_actors(
    actors: &[ActorPresence],
    cluster_radius_km: f64,
    threshold: usize,
) -> Vec<ClusterGroup> {
    if actors.len() <= threshold {
        return singleton_groups(actors, cluster_radius_km);
    }

    let mut groups = Vec::new();
    let mut assigned = vec![false; actors.len()];

    for i in 0..actors.len() {
        if assigned[i] {
            continue;
        }
        let seed = &actors[i];
        let seed_pos = match seed.location {
            Some(pos) => pos,
            // Filtered actors always carry a location; skip defensively
            // rather than panic if a caller bypassed the filter.
            None => continue,
        };
        assigned[i] = true;

        let mut members = vec![seed.clone()];
        for j in (i + 1)..actors.len() {
            if assigned[j] {
                continue;
            }
            let Some(pos) = actors[j].location else {
                continue;
            };
            // Absorption is measured against the seed, not a running
            // centroid, so group membership is independent of join order.
            if haversine_km(seed_pos, pos) <= cluster_radius_km {
                assigned[j] = true;
                members.push(actors[j].clone());
            }
        }

        groups.push(ClusterGroup {
            center: seed_pos,
            members,
            radius_km: cluster_radius_km,
        });
    }

    groups
}

fn singleton_groups(actors: &[ActorPresence], cluster_radius_km: f64) -> Vec<ClusterGroup> {
    actors
        .iter()
        .filter_map(|actor| {
            let pos = actor.location?;
            Some(ClusterGroup {
                center: pos,
                members: vec![actor.clone()],
                radius_km: cluster_radius_km,
            })
        })
        .collect()
}
