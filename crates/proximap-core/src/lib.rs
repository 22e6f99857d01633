//! Proximap Core - Domain models, errors, and engine configuration
//!
//! This crate contains the domain types shared by every proximap crate:
//! geographic points, actor presence snapshots, map features, selection
//! state, and the layered engine configuration.

pub mod config;
pub mod error;
pub mod models;

pub use error::{LocationError, ProximapError, Result};
