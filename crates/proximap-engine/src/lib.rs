//! Proximap Engine - Runtime orchestration
//!
//! This crate implements the live map engine: location acquisition with
//! fallback, the privacy obfuscation layer, the debounced update scheduler,
//! the marker store, the selection state machine, and the controller that
//! wires them into one recompute pipeline. External collaborators plug in
//! through the port traits in [`ports`]; in-memory adapters for tests live
//! in [`memory`].

pub mod controller;
pub mod location;
pub mod markers;
pub mod memory;
pub mod ports;
pub mod privacy;
pub mod scheduler;
pub mod selection;

pub use controller::{EngineCommand, EngineEvent, EngineHandle, MapController};
pub use location::{GetOnceOutcome, LocationEvent, LocationProvider, WatchHandle};
pub use markers::{MarkerStore, PrivacyCircleSpec, SelfView};
pub use ports::{
    FixStream, GeolocationSource, LocationSink, MapSurface, PermissionState, PositionFix,
    PositionOptions, RosterReceiver, ScreenPoint,
};
pub use privacy::{DisplayLocation, PrivacyObfuscator, PrivacyPulse};
pub use scheduler::{RecomputeReason, ThrottleDecision, UpdateScheduler};
pub use selection::{ClickOutcome, SelectionPhase, SelectionStateMachine};
