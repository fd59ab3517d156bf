//! `Person` — the agent that owns a trip chain and realizes it through
//! roles.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use msim_core::{DailyTime, EntityId, NodeId, SimRng, SubscriptionList};
use msim_messaging::{Message, MessageBus, MessageHandler, MessageType};
use msim_network::{Point, RoadNetwork};
use msim_schedule::{Schedulable, SubTrip, Trip, TripChainItem};

use crate::agent::{Agent, AgentBase, FrameParams, UpdateStatus};
use crate::error::{AgentError, AgentResult};
use crate::role::{PersonCore, Role, RoleContext, RoleType};
use crate::roles;

// ── Mailbox ───────────────────────────────────────────────────────────────────

/// The person's message-bus endpoint.
///
/// Messages addressed to a person are queued here by the bus dispatch on
/// the person's worker thread and folded into the current role at the
/// person's next update — which runs on that same thread, so the role
/// never sees a message from a foreign context.
#[derive(Default)]
pub struct Mailbox {
    queue: Mutex<Vec<(MessageType, Arc<dyn Message>)>>,
}

impl Mailbox {
    pub fn drain(&self) -> Vec<(MessageType, Arc<dyn Message>)> {
        std::mem::take(&mut self.queue.lock())
    }
}

impl MessageHandler for Mailbox {
    fn handle_message(&self, message_type: MessageType, message: Arc<dyn Message>) {
        self.queue.lock().push((message_type, message));
    }
}

// ── Person ────────────────────────────────────────────────────────────────────

pub struct Person {
    pub core: PersonCore,
    db_id: String,
    trip_chain: Vec<TripChainItem>,
    curr_item: usize,
    curr_sub_trip: usize,
    curr_role: Option<Box<dyn Role>>,
    /// Kept one generation so cross-tick reads through still-in-flight
    /// messages stay valid; dropped at the next role change.
    prev_role: Option<Box<dyn Role>>,
    first_tick: bool,
    config_props: HashMap<String, String>,
    mailbox: Arc<Mailbox>,
}

impl Person {
    /// Construct a person from a loaded trip chain.  The start time is the
    /// first item's start, relative to the simulation's start of day.
    pub fn new(
        db_id: impl Into<String>,
        trip_chain: Vec<TripChainItem>,
        network: Arc<RoadNetwork>,
        sim_start: DailyTime,
    ) -> AgentResult<Person> {
        let db_id = db_id.into();
        let first = trip_chain
            .first()
            .ok_or_else(|| AgentError::Config(format!("person {db_id} has an empty trip chain")))?;

        let start_ms = (first.start_time().offset_ms() as u64)
            .saturating_sub(sim_start.offset_ms() as u64);
        let (origin, dest) = item_od(first, 0);
        let role = roles::build_role(first, 0, &network)?;

        let base = AgentBase::new(start_ms);
        let rng = SimRng::new(base.id().0);
        Ok(Person {
            core: PersonCore { base, origin, dest, network, handler: None, rng },
            db_id,
            trip_chain,
            curr_item: 0,
            curr_sub_trip: 0,
            curr_role: Some(role),
            prev_role: None,
            first_tick: true,
            config_props: HashMap::new(),
            mailbox: Arc::new(Mailbox::default()),
        })
    }

    /// Construct a person with an explicit role and no trip chain — used
    /// for entities whose plan is not schedule-driven (bus drivers,
    /// waiting passengers) and in tests.
    pub fn with_role(
        db_id: impl Into<String>,
        role: Box<dyn Role>,
        start_ms: u64,
        origin: NodeId,
        dest: NodeId,
        network: Arc<RoadNetwork>,
    ) -> Person {
        let base = AgentBase::new(start_ms);
        let rng = SimRng::new(base.id().0);
        Person {
            core: PersonCore { base, origin, dest, network, handler: None, rng },
            db_id: db_id.into(),
            trip_chain: Vec::new(),
            curr_item: 0,
            curr_sub_trip: 0,
            curr_role: Some(role),
            prev_role: None,
            first_tick: true,
            config_props: HashMap::new(),
            mailbox: Arc::new(Mailbox::default()),
        }
    }

    /// Construct a person whose plan comes from configuration properties;
    /// the trip chain is materialized by [`load`](Self::load) at dispatch
    /// time.
    pub fn pending(
        db_id: impl Into<String>,
        start_ms: u64,
        config_props: HashMap<String, String>,
        network: Arc<RoadNetwork>,
    ) -> Person {
        let base = AgentBase::new(start_ms);
        let rng = SimRng::new(base.id().0);
        Person {
            core: PersonCore {
                base,
                origin: NodeId::INVALID,
                dest: NodeId::INVALID,
                network,
                handler: None,
                rng,
            },
            db_id: db_id.into(),
            trip_chain: Vec::new(),
            curr_item: 0,
            curr_sub_trip: 0,
            curr_role: None,
            prev_role: None,
            first_tick: true,
            config_props,
            mailbox: Arc::new(Mailbox::default()),
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn db_id(&self) -> &str {
        &self.db_id
    }

    pub fn origin(&self) -> NodeId {
        self.core.origin
    }

    pub fn dest(&self) -> NodeId {
        self.core.dest
    }

    pub fn role_type(&self) -> Option<RoleType> {
        self.curr_role.as_ref().map(|r| r.role_type())
    }

    pub fn trip_chain(&self) -> &[TripChainItem] {
        &self.trip_chain
    }

    pub fn config_props(&self) -> &HashMap<String, String> {
        &self.config_props
    }

    pub fn set_start_time(&mut self, ms: u64) {
        self.core.base.set_start_time(ms);
    }

    // ── Loading ───────────────────────────────────────────────────────────

    /// Materialize a placeholder trip chain from configuration properties
    /// (`originPos`/`destPos` as `"x,y"` centimeters, plus `mode`).
    /// Called by the driver when the person is dispatched from the pending
    /// queue; a person that already has a plan loads as a no-op.
    pub fn load(&mut self) -> AgentResult<()> {
        if self.curr_role.is_some() {
            return Ok(());
        }
        let mode = self
            .config_props
            .get("mode")
            .ok_or_else(|| {
                AgentError::Config(format!("person {} load: missing mode", self.db_id))
            })?
            .clone();
        let origin_pos = parse_pos(self.config_props.get("originPos"), &self.db_id, "originPos")?;
        let dest_pos = parse_pos(self.config_props.get("destPos"), &self.db_id, "destPos")?;

        let network = self.core.network.clone();
        let origin = network.snap_to_node(origin_pos).ok_or_else(|| {
            AgentError::Config(format!("person {}: empty network, cannot snap", self.db_id))
        })?;
        let dest = network.snap_to_node(dest_pos).ok_or_else(|| {
            AgentError::Config(format!("person {}: empty network, cannot snap", self.db_id))
        })?;
        if origin == dest {
            return Err(AgentError::Config(format!(
                "person {}: origin and destination snap to the same node {origin}",
                self.db_id
            )));
        }

        let start = DailyTime::from_ms(self.core.base.start_time_ms() as u32);
        let sub = SubTrip {
            from: origin,
            to: dest,
            mode: mode.clone(),
            is_primary_mode: true,
            pt_line_id: None,
            start_time: start,
        };
        let trip = Trip {
            trip_id: "pseudo-1".into(),
            person_id: self.db_id.clone(),
            sequence_number: 1,
            from: origin,
            to: dest,
            start_time: start,
            sub_trips: vec![sub],
        };
        self.trip_chain = vec![TripChainItem::Trip(trip)];
        self.curr_item = 0;
        self.curr_sub_trip = 0;
        self.curr_role = Some(roles::build_role(
            &self.trip_chain[0],
            0,
            &self.core.network,
        )?);
        self.core.origin = origin;
        self.core.dest = dest;
        self.config_props.clear();
        Ok(())
    }

    // ── Update machinery ──────────────────────────────────────────────────

    fn update_inner(&mut self, params: &FrameParams<'_>) -> AgentResult<UpdateStatus> {
        let now = params.now_ms;
        let start = self.core.base.start_time_ms();

        // Called before the start time: silently skip when dynamic
        // dispatch covers it, scheduling error otherwise.
        if now < start {
            return if params.dynamic_dispatch {
                Ok(UpdateStatus::proceed())
            } else {
                Err(AgentError::SchedulingOutOfOrder {
                    agent: self.core.base.id(),
                    start_ms: start,
                    now_ms: now,
                })
            };
        }

        // Already finished but not yet collected by the worker.
        if self.core.base.is_to_be_removed() {
            return Ok(UpdateStatus::done());
        }

        let mut role = match self.curr_role.take() {
            Some(role) => role,
            None => {
                warn!(agent = %self.core.base.id(), db_id = %self.db_id,
                      "person has no role; removing");
                self.core.base.set_to_be_removed();
                return Ok(UpdateStatus::done());
            }
        };
        let result = self.drive_role(role.as_mut(), params);
        self.curr_role = Some(role);
        result?;

        if self.core.base.is_to_be_removed() {
            return self.advance_trip_chain(params);
        }
        Ok(UpdateStatus::proceed())
    }

    fn drive_role(&mut self, role: &mut dyn Role, params: &FrameParams<'_>) -> AgentResult<()> {
        if self.first_tick {
            // Consistency check: the worker must reach a dispatched agent
            // within one granularity of its requested start.
            if params.dynamic_dispatch {
                let start = self.core.base.start_time_ms();
                if params.now_ms.abs_diff(start) >= params.base_gran_ms as u64 {
                    return Err(AgentError::StartMissed {
                        agent: self.core.base.id(),
                        start_ms: start,
                        now_ms: params.now_ms,
                    });
                }
            }
            let mut ctx = RoleContext { frame: params, person: &mut self.core };
            role.init(&mut ctx)?;
            self.first_tick = false;
        }

        let mut ctx = RoleContext { frame: params, person: &mut self.core };
        for (message_type, message) in self.mailbox.drain() {
            role.on_message(&mut ctx, message_type, &message);
        }
        if !ctx.person.base.is_to_be_removed() {
            role.tick(&mut ctx)?;
        }
        if !ctx.person.base.is_to_be_removed() {
            role.output(&mut ctx);
        }
        Ok(())
    }

    /// React to a role's removal request by moving to the next plan item.
    fn advance_trip_chain(&mut self, params: &FrameParams<'_>) -> AgentResult<UpdateStatus> {
        // Advance the sub-trip cursor within the current trip; when
        // exhausted, move to the next trip-chain item.
        let within_trip = match self.trip_chain.get(self.curr_item) {
            Some(TripChainItem::Trip(t)) => self.curr_sub_trip + 1 < t.sub_trips.len(),
            _ => false,
        };
        if within_trip {
            self.curr_sub_trip += 1;
        } else {
            self.curr_item += 1;
            self.curr_sub_trip = 0;
        }

        if self.curr_item >= self.trip_chain.len() {
            debug!(agent = %self.core.base.id(), db_id = %self.db_id, "trip chain exhausted");
            return Ok(UpdateStatus::done());
        }

        let item = &self.trip_chain[self.curr_item];
        let new_role = match roles::build_role(item, self.curr_sub_trip, &self.core.network) {
            Ok(role) => role,
            Err(err) => {
                // Unknown or unsupported modes mark the person for removal
                // with a logged reason; they are not simulation-fatal.
                warn!(agent = %self.core.base.id(), db_id = %self.db_id, %err,
                      "trip-chain advance failed; removing person");
                return Ok(UpdateStatus::done());
            }
        };

        let old_role = self.curr_role.take();
        let removed_cells: SubscriptionList = old_role
            .as_ref()
            .map(|r| r.subscription_cells())
            .unwrap_or_default();
        let added_cells = new_role.subscription_cells();

        // Previous role is disposed lazily: one generation survives.
        self.prev_role = old_role;
        self.curr_role = Some(new_role);

        let (origin, dest) = item_od(item, self.curr_sub_trip);
        self.core.origin = origin;
        self.core.dest = dest;

        // Restart protocol: the next tick re-enters init.
        self.core.base.clear_to_be_removed();
        self.core
            .base
            .set_start_time(params.now_ms + params.base_gran_ms as u64);
        self.first_tick = true;

        Ok(UpdateStatus::with_cell_diff(removed_cells, added_cells))
    }
}

/// Origin/destination of a trip-chain item, sub-trip aware.
fn item_od(item: &TripChainItem, sub_trip_idx: usize) -> (NodeId, NodeId) {
    match item {
        TripChainItem::Trip(t) => match t.sub_trips.get(sub_trip_idx) {
            Some(s) => (s.from, s.to),
            None => (t.from, t.to),
        },
        TripChainItem::Activity(a) => (a.location, a.location),
    }
}

fn parse_pos(
    raw: Option<&String>,
    db_id: &str,
    key: &str,
) -> AgentResult<Point> {
    let raw = raw.ok_or_else(|| {
        AgentError::Config(format!("person {db_id} load: missing {key}"))
    })?;
    let (x, y) = raw.split_once(',').ok_or_else(|| {
        AgentError::Config(format!("person {db_id} load: malformed {key} {raw:?}"))
    })?;
    let parse = |s: &str| {
        s.trim().parse::<f64>().map_err(|_| {
            AgentError::Config(format!("person {db_id} load: malformed {key} {raw:?}"))
        })
    };
    Ok(Point::new(parse(x)?, parse(y)?))
}

// ── Agent impl ────────────────────────────────────────────────────────────────

impl Agent for Person {
    fn id(&self) -> EntityId {
        self.core.base.id()
    }

    fn start_time_ms(&self) -> u64 {
        self.core.base.start_time_ms()
    }

    fn is_to_be_removed(&self) -> bool {
        self.core.base.is_to_be_removed()
    }

    fn update(&mut self, params: &FrameParams<'_>) -> AgentResult<UpdateStatus> {
        match self.update_inner(params) {
            Ok(status) => Ok(status),

            // Scheduler-contract violations are fatal regardless of mode.
            Err(err @ (AgentError::SchedulingOutOfOrder { .. } | AgentError::StartMissed { .. })) => {
                Err(err)
            }

            Err(err) => {
                if params.strict {
                    return Err(AgentError::RoleFailure {
                        agent: self.core.base.id(),
                        origin: self.core.origin,
                        dest: self.core.dest,
                        source: Box::new(err),
                    });
                }
                error!(
                    agent = %self.core.base.id(),
                    db_id = %self.db_id,
                    origin = %self.core.origin,
                    dest = %self.core.dest,
                    %err,
                    "agent error; removing from simulation"
                );
                self.core.base.set_to_be_removed();
                Ok(UpdateStatus::done())
            }
        }
    }

    fn build_subscription_list(&self) -> SubscriptionList {
        let mut cells = self.core.base.subscription_list();
        if let Some(role) = &self.curr_role {
            cells.extend(role.subscription_cells());
        }
        cells
    }

    fn on_worker_enter(&mut self, bus: &MessageBus) {
        let as_handler: Arc<dyn MessageHandler> = self.mailbox.clone();
        match self.core.handler {
            None => {
                if let Ok(id) = bus.register_handler(as_handler) {
                    self.core.handler = Some(id);
                }
            }
            Some(id) => {
                if let Some(ctx) = bus.current_context() {
                    let _ = bus.re_register_handler(id, ctx);
                }
            }
        }
    }

    fn on_worker_exit(&mut self, bus: &MessageBus) {
        if let Some(id) = self.core.handler.take() {
            let _ = bus.unregister_handler(id);
        }
    }

    fn position_cm(&self) -> Option<(f64, f64)> {
        Some((self.core.base.x_pos.get(), self.core.base.y_pos.get()))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl Schedulable for Person {
    fn start_time_ms(&self) -> u64 {
        self.core.base.start_time_ms()
    }
}
