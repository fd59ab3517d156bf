//! Agent-layer errors.
//!
//! Errors within one agent are isolated to that agent: the person logs
//! them (with origin/destination ids) and marks itself for removal.
//! `SchedulingOutOfOrder` and `StartMissed` are scheduler-contract
//! violations and always fatal; `RoleFailure` escapes only in strict mode.

use thiserror::Error;

use msim_core::{EntityId, NodeId};
use msim_messaging::MessagingError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("agent {agent} updated at {now_ms} ms before its start time {start_ms} ms with dynamic dispatch disabled")]
    SchedulingOutOfOrder {
        agent: EntityId,
        start_ms: u64,
        now_ms: u64,
    },

    #[error("agent {agent} was not started within one tick of its start time (start {start_ms} ms, now {now_ms} ms)")]
    StartMissed {
        agent: EntityId,
        start_ms: u64,
        now_ms: u64,
    },

    #[error("unknown travel mode {mode:?}")]
    UnknownMode { mode: String },

    #[error("no role available for travel mode {mode:?}")]
    UnsupportedRole { mode: String },

    #[error("bus stop {stop} over-committed: {requested_cm} cm requested, {available_cm} cm available")]
    CapacityExceeded {
        stop: EntityId,
        requested_cm: f64,
        available_cm: f64,
    },

    #[error("role failure in agent {agent} (from {origin} to {dest}): {source}")]
    RoleFailure {
        agent: EntityId,
        origin: NodeId,
        dest: NodeId,
        #[source]
        source: Box<AgentError>,
    },

    #[error(transparent)]
    Messaging(#[from] MessagingError),
}

pub type AgentResult<T> = Result<T, AgentError>;
