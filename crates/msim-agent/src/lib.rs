//! `msim-agent` — agents, persons, roles, and the periodic person loader.
//!
//! # The entity stack
//!
//! - [`Agent`] is the contract the scheduler drives: stable id, start
//!   time, removal flag, per-tick `update`, and a subscription list of
//!   buffered cells for the worker's flip set.
//! - [`Person`] is the agent that owns a trip chain and realizes it by
//!   swapping [`Role`]s as the plan progresses.
//! - Roles supply `init`/`tick`/`output` plus their own buffered cells;
//!   they never block, and their errors are isolated to the one person
//!   (unless strict mode re-raises them).
//! - [`BusStopAgent`] is the representative message-bus consumer: bay
//!   capacity accounting and the two-phase boarding protocol.
//! - [`PeriodicPersonLoader`] pulls activity-schedule windows from the
//!   store and materializes persons on a construction pool.

pub mod agent;
pub mod bus_stop;
pub mod error;
pub mod loader;
pub mod person;
pub mod role;
pub mod roles;
pub mod signal;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use agent::{Agent, AgentBase, FrameParams, UpdateState, UpdateStatus};
pub use bus_stop::{stop_messages, BusStopAgent, BusStopHost, DriverRef};
pub use error::{AgentError, AgentResult};
pub use loader::PeriodicPersonLoader;
pub use person::{Mailbox, Person};
pub use role::{Role, RoleContext, RoleType};
pub use signal::SignalAgent;
