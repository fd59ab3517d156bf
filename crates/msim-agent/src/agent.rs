//! The `Agent` contract and the state every agent carries.

use std::any::Any;
use std::sync::Arc;

use msim_core::{Buffered, EntityId, SubscriptionList, Tick};
use msim_messaging::MessageBus;

use crate::error::AgentResult;

// ── FrameParams ───────────────────────────────────────────────────────────────

/// Per-tick inputs handed to every agent by its worker.
pub struct FrameParams<'a> {
    pub tick: Tick,
    /// Simulated milliseconds since tick 0.
    pub now_ms: u64,
    pub base_gran_ms: u32,
    /// Time of day at tick 0, milliseconds since midnight.
    pub sim_start_ms: u32,
    pub dynamic_dispatch: bool,
    /// Strict mode: role failures propagate instead of removing the agent.
    pub strict: bool,
    pub bus: &'a MessageBus,
}

impl FrameParams<'_> {
    /// Time of day for the current tick, milliseconds since midnight
    /// (not wrapped — a run crossing midnight keeps counting up).
    #[inline]
    pub fn now_day_ms(&self) -> u64 {
        self.sim_start_ms as u64 + self.now_ms
    }
}

// ── UpdateStatus ──────────────────────────────────────────────────────────────

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum UpdateState {
    /// Keep updating this agent.
    Continue,
    /// The agent is finished; the worker removes it after the flip.
    Done,
}

/// Result of one `update` call.
///
/// When a person swaps roles, the cell diff tells the worker how to adjust
/// its flip set without rebuilding it from scratch.
pub struct UpdateStatus {
    pub state: UpdateState,
    pub cells_removed: SubscriptionList,
    pub cells_added: SubscriptionList,
}

impl UpdateStatus {
    pub fn proceed() -> Self {
        Self {
            state: UpdateState::Continue,
            cells_removed: Vec::new(),
            cells_added: Vec::new(),
        }
    }

    pub fn done() -> Self {
        Self {
            state: UpdateState::Done,
            cells_removed: Vec::new(),
            cells_added: Vec::new(),
        }
    }

    pub fn with_cell_diff(removed: SubscriptionList, added: SubscriptionList) -> Self {
        Self {
            state: UpdateState::Continue,
            cells_removed: removed,
            cells_added: added,
        }
    }
}

// ── Agent ─────────────────────────────────────────────────────────────────────

/// An entity driven by the tick scheduler.
///
/// Lifecycle on a worker: `on_worker_enter` when the agent lands on the
/// worker's thread (register handlers there), `update` once per aligned
/// tick while `start_time_ms` has been reached, `on_worker_exit` when the
/// agent is destroyed.  Migration to another worker calls
/// `on_worker_enter` again from the new thread.
pub trait Agent: Send {
    fn id(&self) -> EntityId;

    fn start_time_ms(&self) -> u64;

    /// Cooperative removal flag; observed by the worker after each update.
    fn is_to_be_removed(&self) -> bool;

    fn update(&mut self, params: &FrameParams<'_>) -> AgentResult<UpdateStatus>;

    /// The buffered cells the worker must flip for this agent: the agent's
    /// own plus the current role's.
    fn build_subscription_list(&self) -> SubscriptionList;

    fn on_worker_enter(&mut self, _bus: &MessageBus) {}

    fn on_worker_exit(&mut self, _bus: &MessageBus) {}

    /// Committed position in centimeters, for output sinks.  `None` for
    /// non-spatial agents.
    fn position_cm(&self) -> Option<(f64, f64)> {
        None
    }

    /// Concrete-type access for inspection (tests, output writers).
    fn as_any(&self) -> &dyn Any;
}

// ── AgentBase ─────────────────────────────────────────────────────────────────

/// State shared by all agents: identity, start time, published position,
/// and the removal flag.
pub struct AgentBase {
    id: EntityId,
    start_time_ms: u64,
    /// Published position, centimeters.  Written tentatively during the
    /// update phase, promoted at the flip barrier.
    pub x_pos: Arc<Buffered<f64>>,
    pub y_pos: Arc<Buffered<f64>>,
    to_be_removed: bool,
}

impl AgentBase {
    pub fn new(start_time_ms: u64) -> Self {
        Self {
            id: EntityId::next(),
            start_time_ms,
            x_pos: Buffered::shared(0.0),
            y_pos: Buffered::shared(0.0),
            to_be_removed: false,
        }
    }

    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }

    #[inline]
    pub fn start_time_ms(&self) -> u64 {
        self.start_time_ms
    }

    pub fn set_start_time(&mut self, ms: u64) {
        self.start_time_ms = ms;
    }

    #[inline]
    pub fn is_to_be_removed(&self) -> bool {
        self.to_be_removed
    }

    pub fn set_to_be_removed(&mut self) {
        self.to_be_removed = true;
    }

    pub fn clear_to_be_removed(&mut self) {
        self.to_be_removed = false;
    }

    /// The base cells every agent publishes.
    pub fn subscription_list(&self) -> SubscriptionList {
        vec![self.x_pos.clone(), self.y_pos.clone()]
    }
}
