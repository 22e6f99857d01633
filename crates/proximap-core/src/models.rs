pub mod actor;
pub mod feature;
pub mod geo;
pub mod selection;

pub use actor::{ActorId, ActorPresence, TrackingConfig};
pub use feature::{ClusterGroup, FeatureId, MapFeature};
pub use geo::GeoPoint;
pub use selection::{MeetingAnimation, SelectionState};
