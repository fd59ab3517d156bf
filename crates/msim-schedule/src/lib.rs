//! `msim-schedule` — trip chains, the pending queue, and the activity
//! schedule store.
//!
//! A *trip chain* is a person's ordered plan for the simulated day: an
//! alternating sequence of trips (each a list of mode-homogeneous
//! sub-trips) and activities.  Chains are immutable after load; the person
//! only moves cursors over them.
//!
//! The *pending queue* holds constructed entities whose start time lies in
//! the future, ordered by start time; the driver drains it at the top of
//! every base tick.
//!
//! The *schedule store* yields `day_activity_schedule` rows for a
//! half-hour-window range; see [`das`] for the row shape and the window
//! encoding.

pub mod das;
pub mod error;
pub mod pending;
pub mod tripchain;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use das::{DasRow, InMemoryScheduleStore, ScheduleStore, SqliteScheduleStore};
pub use error::{ScheduleError, ScheduleResult};
pub use pending::{Schedulable, StartTimeQueue};
pub use tripchain::{Activity, SubTrip, Trip, TripChainItem};
