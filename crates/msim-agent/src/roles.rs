//! Concrete roles.
//!
//! These are deliberately simple realizations of the role contract — the
//! interesting machinery is the contract itself (subscription cells, the
//! removal-flag handshake, mailbox messages), not car-following physics.

use std::sync::Arc;

use tracing::debug;

use msim_core::{Buffered, SubscriptionList, TravelMode};
use msim_messaging::{HandlerId, Message, MessageType};
use msim_network::{Point, RoadNetwork};
use msim_schedule::TripChainItem;

use crate::bus_stop::{stop_messages, DriverRef, WaitingPersonMsg};
use crate::error::{AgentError, AgentResult};
use crate::role::{Role, RoleContext, RoleType};

/// Walking speed, cm/s (≈ 5 km/h).
const WALK_SPEED_CM_S: f64 = 140.0;

// ── Role construction ─────────────────────────────────────────────────────────

/// Build the role realizing one trip-chain item (the sub-trip cursor
/// selects the leg within a trip).
pub fn build_role(
    item: &TripChainItem,
    sub_trip_idx: usize,
    network: &RoadNetwork,
) -> AgentResult<Box<dyn Role>> {
    match item {
        TripChainItem::Activity(activity) => {
            let location = network.node_pos(activity.location).ok_or_else(|| {
                AgentError::Config(format!(
                    "activity location {} not in network",
                    activity.location
                ))
            })?;
            Ok(Box::new(ActivityPerformer::new(
                location,
                activity.end_time.offset_ms() as u64,
            )))
        }

        TripChainItem::Trip(trip) => {
            let sub = trip.sub_trips.get(sub_trip_idx).ok_or_else(|| {
                AgentError::Config(format!("trip {} has no sub-trip {sub_trip_idx}", trip.trip_id))
            })?;
            let lookup = |node| {
                network.node_pos(node).ok_or_else(|| {
                    AgentError::Config(format!("sub-trip endpoint {node} not in network"))
                })
            };
            match TravelMode::parse(&sub.mode) {
                Some(TravelMode::Walk) => {
                    Ok(Box::new(Pedestrian::new(lookup(sub.from)?, lookup(sub.to)?)))
                }
                Some(TravelMode::Car) => {
                    Err(AgentError::UnsupportedRole { mode: sub.mode.clone() })
                }
                _ => Err(AgentError::UnknownMode { mode: sub.mode.clone() }),
            }
        }
    }
}

// ── Pedestrian ────────────────────────────────────────────────────────────────

/// Walks a straight line from origin to destination at a constant speed
/// and requests removal on arrival.
pub struct Pedestrian {
    from: Point,
    to: Point,
    total_cm: f64,
    walked_cm: f64,
    /// Published journey fraction in [0, 1].
    progress: Arc<Buffered<f64>>,
}

impl Pedestrian {
    pub fn new(from: Point, to: Point) -> Self {
        Self {
            from,
            to,
            total_cm: from.distance(to),
            walked_cm: 0.0,
            progress: Buffered::shared(0.0),
        }
    }
}

impl Role for Pedestrian {
    fn role_type(&self) -> RoleType {
        RoleType::Pedestrian
    }

    fn init(&mut self, ctx: &mut RoleContext<'_, '_>) -> AgentResult<()> {
        ctx.person.base.x_pos.set(self.from.x);
        ctx.person.base.y_pos.set(self.from.y);
        self.progress.set(0.0);
        Ok(())
    }

    fn tick(&mut self, ctx: &mut RoleContext<'_, '_>) -> AgentResult<()> {
        let dt_s = ctx.frame.base_gran_ms as f64 / 1_000.0;
        self.walked_cm += WALK_SPEED_CM_S * dt_s;

        if self.walked_cm >= self.total_cm {
            ctx.person.base.x_pos.set(self.to.x);
            ctx.person.base.y_pos.set(self.to.y);
            self.progress.set(1.0);
            ctx.person.base.set_to_be_removed();
            return Ok(());
        }

        let t = if self.total_cm > 0.0 { self.walked_cm / self.total_cm } else { 1.0 };
        let pos = self.from.lerp(self.to, t);
        ctx.person.base.x_pos.set(pos.x);
        ctx.person.base.y_pos.set(pos.y);
        self.progress.set(t);
        Ok(())
    }

    fn output(&mut self, ctx: &mut RoleContext<'_, '_>) {
        debug!(
            agent = %ctx.person.base.id(),
            progress = self.progress.get(),
            "pedestrian step"
        );
    }

    fn subscription_cells(&self) -> SubscriptionList {
        vec![self.progress.clone()]
    }
}

// ── ActivityPerformer ─────────────────────────────────────────────────────────

/// Stays at the activity location until the activity's end time.
pub struct ActivityPerformer {
    location: Point,
    /// End of the activity, milliseconds since midnight.
    end_day_ms: u64,
}

impl ActivityPerformer {
    pub fn new(location: Point, end_day_ms: u64) -> Self {
        Self { location, end_day_ms }
    }
}

impl Role for ActivityPerformer {
    fn role_type(&self) -> RoleType {
        RoleType::ActivityPerformer
    }

    fn init(&mut self, ctx: &mut RoleContext<'_, '_>) -> AgentResult<()> {
        ctx.person.base.x_pos.set(self.location.x);
        ctx.person.base.y_pos.set(self.location.y);
        Ok(())
    }

    fn tick(&mut self, ctx: &mut RoleContext<'_, '_>) -> AgentResult<()> {
        if ctx.frame.now_day_ms() >= self.end_day_ms {
            ctx.person.base.set_to_be_removed();
        }
        Ok(())
    }
}

// ── BusDriver ─────────────────────────────────────────────────────────────────

#[derive(Copy, Clone)]
enum DriverState {
    Arriving,
    Serving { ticks_left: u64 },
    Departed,
}

/// Serves one bus stop: announces arrival, opens boarding, departs after a
/// dwell, and tracks occupancy as the stop moves boarders in.
pub struct BusDriver {
    line: String,
    length_cm: f64,
    capacity: usize,
    occupancy: usize,
    dwell_ticks: u64,
    stop: HandlerId,
    state: DriverState,
}

impl BusDriver {
    pub fn new(
        line: impl Into<String>,
        length_cm: f64,
        capacity: usize,
        dwell_ticks: u64,
        stop: HandlerId,
    ) -> Self {
        Self {
            line: line.into(),
            length_cm,
            capacity,
            occupancy: 0,
            dwell_ticks,
            stop,
            state: DriverState::Arriving,
        }
    }

    pub fn occupancy(&self) -> usize {
        self.occupancy
    }

    fn driver_ref(&self, ctx: &RoleContext<'_, '_>) -> DriverRef {
        DriverRef {
            person: ctx.person.base.id(),
            handler: ctx.person.handler.expect("driver updates after worker entry"),
            line: self.line.clone(),
            length_cm: self.length_cm,
            capacity: self.capacity,
            occupancy: self.occupancy,
        }
    }
}

impl Role for BusDriver {
    fn role_type(&self) -> RoleType {
        RoleType::BusDriver
    }

    fn init(&mut self, _ctx: &mut RoleContext<'_, '_>) -> AgentResult<()> {
        Ok(())
    }

    fn tick(&mut self, ctx: &mut RoleContext<'_, '_>) -> AgentResult<()> {
        match self.state {
            DriverState::Arriving => {
                let msg: Arc<dyn Message> = Arc::new(self.driver_ref(ctx));
                ctx.frame
                    .bus
                    .send_message(self.stop, stop_messages::BUS_ARRIVAL, msg)?;
                self.state = DriverState::Serving { ticks_left: self.dwell_ticks };
            }

            DriverState::Serving { ticks_left } => {
                if ticks_left > 0 {
                    // Ask the stop to run a boarding round each dwell tick.
                    let msg: Arc<dyn Message> = Arc::new(self.driver_ref(ctx));
                    ctx.frame
                        .bus
                        .send_message(self.stop, stop_messages::BOARD_BUS, msg)?;
                    self.state = DriverState::Serving { ticks_left: ticks_left - 1 };
                } else {
                    let msg: Arc<dyn Message> = Arc::new(self.driver_ref(ctx));
                    ctx.frame
                        .bus
                        .send_message(self.stop, stop_messages::BUS_DEPARTURE, msg)?;
                    self.state = DriverState::Departed;
                    ctx.person.base.set_to_be_removed();
                }
            }

            DriverState::Departed => {}
        }
        Ok(())
    }

    fn on_message(
        &mut self,
        _ctx: &mut RoleContext<'_, '_>,
        message_type: MessageType,
        _message: &Arc<dyn Message>,
    ) {
        if message_type == stop_messages::PASSENGER_BOARDED {
            self.occupancy += 1;
        }
    }
}

// ── WaitBusActivity ───────────────────────────────────────────────────────────

/// Waits at a bus stop for a line, announcing itself to the stop agent and
/// leaving once a boarding is accepted.
pub struct WaitBusActivity {
    line: String,
    stop: HandlerId,
    announced: bool,
    boarded: bool,
}

impl WaitBusActivity {
    /// An empty `line` boards the first bus that opens its doors.
    pub fn new(line: impl Into<String>, stop: HandlerId) -> Self {
        Self {
            line: line.into(),
            stop,
            announced: false,
            boarded: false,
        }
    }

    pub fn has_boarded(&self) -> bool {
        self.boarded
    }
}

impl Role for WaitBusActivity {
    fn role_type(&self) -> RoleType {
        RoleType::WaitBusActivity
    }

    fn init(&mut self, _ctx: &mut RoleContext<'_, '_>) -> AgentResult<()> {
        Ok(())
    }

    fn tick(&mut self, ctx: &mut RoleContext<'_, '_>) -> AgentResult<()> {
        if !self.announced {
            let msg: Arc<dyn Message> = Arc::new(WaitingPersonMsg {
                person: ctx.person.base.id(),
                handler: ctx.person.handler.expect("waiter updates after worker entry"),
                line: self.line.clone(),
            });
            ctx.frame.bus.send_message(
                self.stop,
                stop_messages::WAITING_PERSON_ARRIVAL,
                msg,
            )?;
            self.announced = true;
        }
        Ok(())
    }

    fn on_message(
        &mut self,
        ctx: &mut RoleContext<'_, '_>,
        message_type: MessageType,
        _message: &Arc<dyn Message>,
    ) {
        if message_type == stop_messages::BOARDING_ACCEPTED {
            self.boarded = true;
            ctx.person.base.set_to_be_removed();
        }
    }
}

// ── Passenger ─────────────────────────────────────────────────────────────────

/// Rides a bus until told to alight.
pub struct Passenger {
    alighted: bool,
}

impl Passenger {
    pub fn new() -> Self {
        Self { alighted: false }
    }
}

impl Default for Passenger {
    fn default() -> Self {
        Self::new()
    }
}

impl Role for Passenger {
    fn role_type(&self) -> RoleType {
        RoleType::Passenger
    }

    fn init(&mut self, _ctx: &mut RoleContext<'_, '_>) -> AgentResult<()> {
        Ok(())
    }

    fn tick(&mut self, _ctx: &mut RoleContext<'_, '_>) -> AgentResult<()> {
        Ok(())
    }

    fn on_message(
        &mut self,
        ctx: &mut RoleContext<'_, '_>,
        message_type: MessageType,
        _message: &Arc<dyn Message>,
    ) {
        if message_type == stop_messages::ALIGHT_PASSENGER {
            self.alighted = true;
            ctx.person.base.set_to_be_removed();
        }
    }
}
