//! The `Role` contract.
//!
//! A role is the pluggable behavior a person performs for one trip-chain
//! item: pedestrians walk, activity performers stay put, bus drivers serve
//! stops.  Roles hold their own state machine across ticks; the engine is
//! a plain tick loop and offers no coroutine-like control flow.

use std::sync::Arc;

use msim_core::{NodeId, SimRng, SubscriptionList};
use msim_messaging::{HandlerId, Message, MessageType};
use msim_network::RoadNetwork;

use crate::agent::{AgentBase, FrameParams};
use crate::error::AgentResult;

// ── RoleType ──────────────────────────────────────────────────────────────────

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum RoleType {
    Driver,
    Pedestrian,
    BusDriver,
    WaitBusActivity,
    Passenger,
    ActivityPerformer,
}

// ── RoleContext ───────────────────────────────────────────────────────────────

/// The slice of person state a role may touch during a hook call.
///
/// Split out of `Person` so the borrow of the boxed role and the borrow of
/// the person's state are disjoint.
pub struct PersonCore {
    pub base: AgentBase,
    pub origin: NodeId,
    pub dest: NodeId,
    pub network: Arc<RoadNetwork>,
    /// The person's mailbox registration, once it has entered a worker.
    pub handler: Option<HandlerId>,
    pub rng: SimRng,
}

pub struct RoleContext<'a, 'f> {
    pub frame: &'a FrameParams<'f>,
    pub person: &'a mut PersonCore,
}

// ── Role ──────────────────────────────────────────────────────────────────────

pub trait Role: Send {
    fn role_type(&self) -> RoleType;

    /// First-tick setup.  Runs exactly once, on the tick the person's
    /// start time is reached (and again after each role change, on the new
    /// role).
    fn init(&mut self, ctx: &mut RoleContext<'_, '_>) -> AgentResult<()>;

    /// Main per-tick behavior.  Set the removal flag on the person's base
    /// to request a trip-chain advance.
    fn tick(&mut self, ctx: &mut RoleContext<'_, '_>) -> AgentResult<()>;

    /// Per-tick output hook; skipped when `tick` requested removal.
    fn output(&mut self, _ctx: &mut RoleContext<'_, '_>) {}

    /// Cells this role publishes, merged into the person's subscription
    /// list while the role is current.
    fn subscription_cells(&self) -> SubscriptionList {
        Vec::new()
    }

    /// A message addressed to the person arrived; invoked while the
    /// person's mailbox drains at the start of its update.
    fn on_message(
        &mut self,
        _ctx: &mut RoleContext<'_, '_>,
        _message_type: MessageType,
        _message: &Arc<dyn Message>,
    ) {
    }
}
