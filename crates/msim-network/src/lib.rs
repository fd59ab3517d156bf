//! `msim-network` — the geospatial road network.
//!
//! The network is loaded once from the persistent store, validated, and
//! shared read-only (no locks) for the rest of the run.  Topology editing
//! after initialization is deliberately unsupported.
//!
//! # Units
//!
//! The store provides meters; everything in this crate is **centimeters**
//! (speeds in cm/s).  The ×100 conversion happens exactly once, in the
//! loader — the core never re-converts.

pub mod error;
pub mod loader;
pub mod network;
pub mod types;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use error::{NetworkError, NetworkResult};
pub use loader::load_network;
pub use network::{RoadNetwork, RoadNetworkBuilder};
pub use types::{Crossing, Lane, Node, Point, RoadSegment, SignalPlan, Turning};
