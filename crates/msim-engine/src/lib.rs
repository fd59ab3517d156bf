//! `msim-engine` — the tick-driven parallel execution engine.
//!
//! # One base tick
//!
//! ```text
//! driver:  loader check → pending dispatch → DistributeMessages
//!          → stage groups (signals → shortest-path → agents)
//!          → frame barrier ─┐
//! workers:                  ├─ dispatch input queues, integrate staged
//!                           │  agents, update phase (skipped on ticks not
//!                           │  aligned to the group's granularity)
//!          update barrier ──┤
//!                           ├─ flip subscribed cells, collect agents whose
//!                           │  removal flag is set (destruction deferred
//!                           │  one tick)
//!          flip barrier ────┘
//! driver:  fault check → statistics (post-warmup) → advance clock
//! ```
//!
//! All workers of all groups plus the driver participate in every barrier
//! on every base tick; groups with coarser granularities do no useful work
//! on non-aligned ticks but keep the global barrier pair unified.  All
//! driver-side mutation of worker state happens while the workers are
//! parked at the frame barrier.

pub mod driver;
pub mod error;
pub mod observer;
pub mod worker;
pub mod workgroup;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use driver::{GroupKind, Simulation, SimulationBuilder};
pub use error::{EngineError, EngineResult};
pub use observer::{NoopObserver, SimObserver};
pub use workgroup::{TickCallback, WorkGroup, WorkGroupManager};
