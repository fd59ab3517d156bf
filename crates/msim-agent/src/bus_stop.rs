//! `BusStopAgent` — the representative message-bus consumer.
//!
//! The stop owns a bay of `capacity_cm` centimeters.  Arriving buses are
//! accepted while their length fits, otherwise they queue and are retried
//! in arrival order whenever a serving bus departs.  Boarding is a
//! two-phase protocol per `BOARD_BUS` round: every waiter first decides
//! against the announcing driver (line match), then deciders are moved
//! into the bus while the bus accepts them; a refused waiter stays put.
//!
//! The sum of serving-bus lengths never exceeds the bay capacity; an
//! acceptance that would break that is a fatal `CapacityExceeded`,
//! surfaced through the host agent's next update.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use msim_core::{EntityId, SubscriptionList};
use msim_messaging::{downcast, HandlerId, Message, MessageBus, MessageHandler, MessageType};
use msim_network::Point;

use crate::agent::{Agent, AgentBase, FrameParams, UpdateStatus};
use crate::error::{AgentError, AgentResult};

// ── Message vocabulary ────────────────────────────────────────────────────────

pub mod stop_messages {
    use msim_messaging::MessageType;

    /// Bus announces itself at the stop (payload [`DriverRef`](super::DriverRef)).
    pub const BUS_ARRIVAL: MessageType = 1_001;
    /// Bus leaves the stop (payload `DriverRef`).
    pub const BUS_DEPARTURE: MessageType = 1_002;
    /// Bus opens its doors for one boarding round (payload `DriverRef`).
    pub const BOARD_BUS: MessageType = 1_003;
    /// A person starts waiting (payload [`WaitingPersonMsg`](super::WaitingPersonMsg)).
    pub const WAITING_PERSON_ARRIVAL: MessageType = 1_004;
    /// Stop → waiter: you are on the bus.
    pub const BOARDING_ACCEPTED: MessageType = 1_005;
    /// Stop → driver: one boarder moved in.
    pub const PASSENGER_BOARDED: MessageType = 1_006;
    /// Driver/test → stop: this passenger alights here (payload
    /// [`PassengerAlightingMsg`](super::PassengerAlightingMsg)).
    pub const PASSENGER_ALIGHTING: MessageType = 1_007;
    /// Stop → passenger: leave the bus.
    pub const ALIGHT_PASSENGER: MessageType = 1_008;
}

// ── Payloads ──────────────────────────────────────────────────────────────────

/// Everything a stop needs to know about an announcing bus driver.
#[derive(Clone, Debug)]
pub struct DriverRef {
    pub person: EntityId,
    /// The driver person's mailbox.
    pub handler: HandlerId,
    pub line: String,
    pub length_cm: f64,
    pub capacity: usize,
    /// Passengers on board as of this announcement.
    pub occupancy: usize,
}

#[derive(Clone, Debug)]
pub struct WaitingPersonMsg {
    pub person: EntityId,
    pub handler: HandlerId,
    /// Line the waiter wants; empty boards anything.
    pub line: String,
}

#[derive(Clone, Debug)]
pub struct PassengerAlightingMsg {
    pub person: EntityId,
    pub handler: HandlerId,
}

// ── Stop state ────────────────────────────────────────────────────────────────

struct WaitingEntry {
    person: EntityId,
    handler: HandlerId,
    line: String,
    will_board: bool,
}

struct StopState {
    available_cm: f64,
    serving: Vec<DriverRef>,
    /// Buses that did not fit, retried FIFO on departures.
    queued: Vec<DriverRef>,
    waiting: Vec<WaitingEntry>,
    alighting: Vec<PassengerAlightingMsg>,
    /// Boarders moved in during each driver's last boarding round.
    last_boarding: HashMap<EntityId, usize>,
    /// A broken invariant, surfaced through the host's next update.
    fatal: Option<AgentError>,
}

/// The stop itself: shared with the bus as a handler (`Arc`), hosted on a
/// worker by [`BusStopHost`].
pub struct BusStopAgent {
    id: EntityId,
    pos: Point,
    capacity_cm: f64,
    bus: Arc<MessageBus>,
    handler: Mutex<Option<HandlerId>>,
    state: Mutex<StopState>,
}

impl BusStopAgent {
    pub fn new(pos: Point, capacity_cm: f64, bus: Arc<MessageBus>) -> Arc<Self> {
        Arc::new(Self {
            id: EntityId::next(),
            pos,
            capacity_cm,
            bus,
            handler: Mutex::new(None),
            state: Mutex::new(StopState {
                available_cm: capacity_cm,
                serving: Vec::new(),
                queued: Vec::new(),
                waiting: Vec::new(),
                alighting: Vec::new(),
                last_boarding: HashMap::new(),
                fatal: None,
            }),
        })
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// The stop's bus-bus address, once registered.
    pub fn handler(&self) -> Option<HandlerId> {
        *self.handler.lock()
    }

    pub fn set_handler(&self, id: HandlerId) {
        *self.handler.lock() = Some(id);
    }

    pub fn available_cm(&self) -> f64 {
        self.state.lock().available_cm
    }

    pub fn serving_count(&self) -> usize {
        self.state.lock().serving.len()
    }

    pub fn waiting_count(&self) -> usize {
        self.state.lock().waiting.len()
    }

    /// `true` while a bus of `length_cm` would be accepted.
    pub fn can_accommodate(&self, length_cm: f64) -> bool {
        self.state.lock().available_cm >= length_cm
    }

    /// Boarders moved in during `driver`'s last boarding round.
    pub fn boarding_count(&self, driver: EntityId) -> usize {
        self.state.lock().last_boarding.get(&driver).copied().unwrap_or(0)
    }

    fn take_fatal(&self) -> Option<AgentError> {
        self.state.lock().fatal.take()
    }

    // ── Capacity accounting ───────────────────────────────────────────────

    fn accept_driver(&self, state: &mut StopState, driver: DriverRef) {
        if state.available_cm < driver.length_cm {
            // Callers only accept after a fit check, so reaching this is a
            // broken bay invariant, not a rejected bus.
            state.fatal = Some(AgentError::CapacityExceeded {
                stop: self.id,
                requested_cm: driver.length_cm,
                available_cm: state.available_cm,
            });
            return;
        }
        state.available_cm -= driver.length_cm;
        debug!(stop = %self.id, driver = %driver.person, available = state.available_cm,
               "bus accepted");
        state.serving.push(driver);
    }

    fn on_bus_arrival(&self, driver: DriverRef) {
        let mut state = self.state.lock();
        if state.available_cm >= driver.length_cm {
            self.accept_driver(&mut state, driver);
        } else {
            info!(stop = %self.id, driver = %driver.person, length = driver.length_cm,
                  available = state.available_cm, "bus queued: bay full");
            state.queued.push(driver);
        }
    }

    fn on_bus_departure(&self, driver: &DriverRef) {
        let mut state = self.state.lock();
        let before = state.serving.len();
        let mut freed = 0.0;
        state.serving.retain(|d| {
            if d.person == driver.person {
                freed += d.length_cm;
                false
            } else {
                true
            }
        });
        if state.serving.len() == before {
            debug!(stop = %self.id, driver = %driver.person, "departure for unknown bus");
            return;
        }
        state.available_cm += freed;

        // Retry queued buses in arrival order; stop at the first misfit to
        // keep the queue fair.
        while let Some(next) = state.queued.first() {
            if state.available_cm < next.length_cm {
                break;
            }
            let next = state.queued.remove(0);
            self.accept_driver(&mut state, next);
        }
    }

    /// The two-phase boarding round.
    fn on_board_bus(&self, driver: &DriverRef) {
        let mut state = self.state.lock();
        if !state.serving.iter().any(|d| d.person == driver.person) {
            debug!(stop = %self.id, driver = %driver.person, "boarding round for non-serving bus");
            return;
        }

        // Phase 1: every waiter decides against this driver.
        for entry in state.waiting.iter_mut() {
            entry.will_board = entry.line.is_empty() || entry.line == driver.line;
        }

        // Phase 2: move deciders in while the bus accepts them.  A refusal
        // (bus full) keeps the waiter in place for the next bus.
        let mut free_seats = driver.capacity.saturating_sub(driver.occupancy);
        let mut boarded = 0usize;
        let mut remaining = Vec::with_capacity(state.waiting.len());
        for mut entry in state.waiting.drain(..) {
            if entry.will_board && free_seats > 0 {
                free_seats -= 1;
                boarded += 1;
                let accept: Arc<dyn Message> = Arc::new(driver.clone());
                let _ = self.bus.send_message(
                    entry.handler,
                    stop_messages::BOARDING_ACCEPTED,
                    accept,
                );
                let boarded_msg: Arc<dyn Message> = Arc::new(entry.person);
                let _ = self.bus.send_message(
                    driver.handler,
                    stop_messages::PASSENGER_BOARDED,
                    boarded_msg,
                );
            } else {
                entry.will_board = false;
                remaining.push(entry);
            }
        }
        state.waiting = remaining;
        state.last_boarding.insert(driver.person, boarded);
    }

    /// Per-tick work, run by the host on its worker: hand alighting
    /// passengers back to their own update loops.
    pub(crate) fn frame_tick(&self, _params: &FrameParams<'_>) {
        let drained: Vec<PassengerAlightingMsg> =
            std::mem::take(&mut self.state.lock().alighting);
        for passenger in drained {
            let msg: Arc<dyn Message> = Arc::new(passenger.clone());
            let _ = self
                .bus
                .send_message(passenger.handler, stop_messages::ALIGHT_PASSENGER, msg);
        }
    }
}

impl MessageHandler for BusStopAgent {
    fn handle_message(&self, message_type: MessageType, message: Arc<dyn Message>) {
        match message_type {
            stop_messages::BUS_ARRIVAL => {
                if let Some(driver) = downcast::<DriverRef>(&*message) {
                    self.on_bus_arrival(driver.clone());
                }
            }
            stop_messages::BUS_DEPARTURE => {
                if let Some(driver) = downcast::<DriverRef>(&*message) {
                    self.on_bus_departure(driver);
                }
            }
            stop_messages::BOARD_BUS => {
                if let Some(driver) = downcast::<DriverRef>(&*message) {
                    self.on_board_bus(driver);
                }
            }
            stop_messages::WAITING_PERSON_ARRIVAL => {
                if let Some(msg) = downcast::<WaitingPersonMsg>(&*message) {
                    self.state.lock().waiting.push(WaitingEntry {
                        person: msg.person,
                        handler: msg.handler,
                        line: msg.line.clone(),
                        will_board: false,
                    });
                }
            }
            stop_messages::PASSENGER_ALIGHTING => {
                if let Some(msg) = downcast::<PassengerAlightingMsg>(&*message) {
                    self.state.lock().alighting.push(msg.clone());
                }
            }
            _ => {}
        }
    }
}

// ── BusStopHost ───────────────────────────────────────────────────────────────

/// Hosts a [`BusStopAgent`] on a worker: registers it with the bus on the
/// owning thread, runs its per-tick work, and surfaces fatal errors.
pub struct BusStopHost {
    stop: Arc<BusStopAgent>,
    base: AgentBase,
}

impl BusStopHost {
    pub fn new(stop: Arc<BusStopAgent>) -> Self {
        let base = AgentBase::new(0);
        stop_position(&stop, &base);
        Self { stop, base }
    }

    pub fn stop(&self) -> &Arc<BusStopAgent> {
        &self.stop
    }
}

fn stop_position(stop: &BusStopAgent, base: &AgentBase) {
    base.x_pos.force(stop.pos.x);
    base.y_pos.force(stop.pos.y);
}

impl Agent for BusStopHost {
    fn id(&self) -> EntityId {
        self.stop.id
    }

    fn start_time_ms(&self) -> u64 {
        self.base.start_time_ms()
    }

    fn is_to_be_removed(&self) -> bool {
        self.base.is_to_be_removed()
    }

    fn update(&mut self, params: &FrameParams<'_>) -> AgentResult<UpdateStatus> {
        if let Some(fatal) = self.stop.take_fatal() {
            return Err(fatal);
        }
        self.stop.frame_tick(params);
        Ok(UpdateStatus::proceed())
    }

    fn build_subscription_list(&self) -> SubscriptionList {
        self.base.subscription_list()
    }

    fn on_worker_enter(&mut self, bus: &MessageBus) {
        let as_handler: Arc<dyn MessageHandler> = self.stop.clone();
        match self.stop.handler() {
            None => {
                if let Ok(id) = bus.register_handler(as_handler) {
                    self.stop.set_handler(id);
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
        if let Some(id) = self.stop.handler() {
            let _ = bus.unregister_handler(id);
        }
    }

    fn position_cm(&self) -> Option<(f64, f64)> {
        Some((self.base.x_pos.get(), self.base.y_pos.get()))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
