//! Output row types.

use serde::Serialize;

/// One row per post-warmup base tick.
#[derive(Clone, Debug, Serialize)]
pub struct TickSummaryRow {
    pub tick: u64,
    /// Simulated milliseconds since tick 0.
    pub sim_ms: u64,
    pub active_agents: u64,
    pub pending_agents: u64,
}

/// Position snapshot of one agent at one tick (centimeters).
#[derive(Clone, Debug, Serialize)]
pub struct AgentSnapshotRow {
    pub agent_id: u64,
    pub tick: u64,
    pub x_cm: f64,
    pub y_cm: f64,
}
