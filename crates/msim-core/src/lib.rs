//! `msim-core` — foundational types for the `rust_msim` traffic
//! microsimulator.
//!
//! This crate is a dependency of every other `msim-*` crate.  It has no
//! `msim-*` dependencies and minimal external ones (`rand`, `serde`,
//! `thiserror`).
//!
//! # What lives here
//!
//! | Module       | Contents                                                |
//! |--------------|---------------------------------------------------------|
//! | [`ids`]      | `EntityId` allocator, `NodeId`, `SegmentId`, `LaneId`, …|
//! | [`time`]     | `Tick`, `TickClock`, `DailyTime`, half-hour windows     |
//! | [`buffered`] | Double-buffered cells and subscription lists            |
//! | [`mode`]     | `TravelMode` enum                                       |
//! | [`config`]   | `SimulationConfig` and work-group settings              |
//! | [`rng`]      | `SimRng` (seeded, deterministic)                        |
//! | [`error`]    | `CoreError`, `CoreResult`                               |

pub mod buffered;
pub mod config;
pub mod error;
pub mod ids;
pub mod mode;
pub mod rng;
pub mod time;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use buffered::{Buffered, BufferedBase, SubscriptionList};
pub use config::{MutexStrategy, ProcedureMap, SimulationConfig, WorkGroupConfig};
pub use error::{CoreError, CoreResult};
pub use ids::{EntityId, LaneId, NodeId, SegmentId, SignalId};
pub use mode::TravelMode;
pub use rng::SimRng;
pub use time::{half_hour_window, DailyTime, Tick, TickClock};
