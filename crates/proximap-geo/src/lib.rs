//! Proximap Geo - Distance, proximity filtering, and spatial clustering
//!
//! This crate holds the pure geospatial stages of the map pipeline: the
//! great-circle distance used everywhere, the roster proximity filter, and
//! the greedy cluster engine.

pub mod cluster;
pub mod filter;
pub mod spatial;

pub use cluster::cluster_actors;
pub use filter::filter_roster;
pub use spatial::{haversine_km, within_km};
