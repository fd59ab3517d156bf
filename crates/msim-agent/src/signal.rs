//! `SignalAgent` — fixed-cycle signal controller entity.
//!
//! One per [`SignalPlan`] in the network, driven by the signals
//! work-group (typically at a coarser granularity than the agents group).
//! The current phase is published through a buffered cell and, on every
//! change, as a contextual event keyed by the signal id.

use std::sync::Arc;

use msim_core::{Buffered, EntityId, SubscriptionList};
use msim_messaging::{EventCtx, EventId, Message, MessageBus};
use msim_network::SignalPlan;

use crate::agent::{Agent, AgentBase, FrameParams, UpdateStatus};
use crate::error::AgentResult;

/// Published when a signal moves to a new phase.  Event context is the
/// signal id; args are a [`PhaseChange`].
pub const SIGNAL_PHASE_CHANGED: EventId = 2_101;

#[derive(Copy, Clone, Debug)]
pub struct PhaseChange {
    pub signal: u32,
    pub phase: u8,
}

pub struct SignalAgent {
    base: AgentBase,
    plan: SignalPlan,
    phase: Arc<Buffered<u8>>,
    last_phase: Option<usize>,
}

impl SignalAgent {
    pub fn new(plan: SignalPlan, pos: msim_network::Point) -> Self {
        let base = AgentBase::new(0);
        base.x_pos.force(pos.x);
        base.y_pos.force(pos.y);
        Self {
            base,
            plan,
            phase: Buffered::shared(0),
            last_phase: None,
        }
    }

    /// The published phase cell (committed side).
    pub fn phase_cell(&self) -> Arc<Buffered<u8>> {
        self.phase.clone()
    }
}

impl Agent for SignalAgent {
    fn id(&self) -> EntityId {
        self.base.id()
    }

    fn start_time_ms(&self) -> u64 {
        0
    }

    fn is_to_be_removed(&self) -> bool {
        self.base.is_to_be_removed()
    }

    fn update(&mut self, params: &FrameParams<'_>) -> AgentResult<UpdateStatus> {
        let elapsed_secs = params.now_ms / 1_000;
        let phase = self.plan.phase_at(elapsed_secs);
        if self.last_phase != Some(phase) {
            self.last_phase = Some(phase);
            self.phase.set(phase as u8);
            let args: Arc<dyn Message> = Arc::new(PhaseChange {
                signal: self.plan.id.0,
                phase: phase as u8,
            });
            params.bus.publish_event_ctx(
                SIGNAL_PHASE_CHANGED,
                EventCtx(self.plan.id.0 as u64),
                args,
            )?;
        }
        Ok(UpdateStatus::proceed())
    }

    fn build_subscription_list(&self) -> SubscriptionList {
        let mut cells = self.base.subscription_list();
        cells.push(self.phase.clone());
        cells
    }

    fn on_worker_enter(&mut self, _bus: &MessageBus) {}

    fn position_cm(&self) -> Option<(f64, f64)> {
        Some((self.base.x_pos.get(), self.base.y_pos.get()))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
