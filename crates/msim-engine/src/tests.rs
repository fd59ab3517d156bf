//! Integration tests for the engine: barrier-synchronized scheduling,
//! pending dispatch, messaging, and the bus-stop protocol end to end.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use msim_agent::roles::{BusDriver, WaitBusActivity};
use msim_agent::{
    Agent, BusStopAgent, BusStopHost, FrameParams, Person, Role, RoleContext, RoleType,
    UpdateStatus,
};
use msim_core::{
    Buffered, DailyTime, EntityId, MutexStrategy, NodeId, SegmentId, SimulationConfig,
    SubscriptionList, Tick, WorkGroupConfig,
};
use msim_messaging::{HandlerId, Message, MessageHandler};
use msim_network::{Point, RoadNetwork, RoadNetworkBuilder};
use msim_schedule::{SubTrip, Trip, TripChainItem};

use crate::driver::{GroupKind, Simulation};
use crate::observer::{NoopObserver, SimObserver};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn test_config(total_ticks: u64) -> SimulationConfig {
    SimulationConfig {
        base_gran_ms: 100,
        total_runtime_ticks: total_ticks,
        total_warmup_ticks: 0,
        sim_start_time: "03:00:00".into(),
        seed: 42,
        dynamic_dispatch: true,
        strict_agent_errors: false,
        mutex_strategy: MutexStrategy::Buffered,
        database: String::new(),
        load_interval_secs: 3_600,
        agents_workgroup: WorkGroupConfig::new(2, 1),
        signals_workgroup: WorkGroupConfig::new(1, 5),
        shortest_path_workgroup: WorkGroupConfig::new(1, 10),
        procedures: Default::default(),
        output_dir: None,
    }
}

fn line_network(dist_cm: f64) -> Arc<RoadNetwork> {
    let mut b = RoadNetworkBuilder::new();
    b.add_node(NodeId(1), Point::new(0.0, 0.0), false);
    b.add_node(NodeId(2), Point::new(dist_cm, 0.0), false);
    b.add_link(SegmentId(1), NodeId(1), NodeId(2), dist_cm);
    Arc::new(b.build().unwrap())
}

fn walk_person(network: Arc<RoadNetwork>) -> Person {
    let start = DailyTime::parse("03:00:00").unwrap();
    let trip = TripChainItem::Trip(Trip {
        trip_id: "101".into(),
        person_id: "walker".into(),
        sequence_number: 1,
        from: NodeId(1),
        to: NodeId(2),
        start_time: start,
        sub_trips: vec![SubTrip {
            from: NodeId(1),
            to: NodeId(2),
            mode: "Walk".into(),
            is_primary_mode: true,
            pt_line_id: None,
            start_time: start,
        }],
    });
    Person::new("walker", vec![trip], network, start).unwrap()
}

/// Records population numbers per post-warmup tick.
#[derive(Default)]
struct RecordingObserver {
    active: Vec<usize>,
    pending: Vec<usize>,
}

impl SimObserver for RecordingObserver {
    fn on_tick_end(&mut self, _tick: Tick, active: usize, pending: usize) {
        self.active.push(active);
        self.pending.push(pending);
    }
}

/// An immortal probe counting how many times its worker updated it.
struct CountingAgent {
    id: EntityId,
    count: Arc<AtomicUsize>,
}

impl CountingAgent {
    fn new(count: Arc<AtomicUsize>) -> Self {
        Self { id: EntityId::next(), count }
    }
}

impl Agent for CountingAgent {
    fn id(&self) -> EntityId {
        self.id
    }
    fn start_time_ms(&self) -> u64 {
        0
    }
    fn is_to_be_removed(&self) -> bool {
        false
    }
    fn update(&mut self, _params: &FrameParams<'_>) -> msim_agent::AgentResult<UpdateStatus> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(UpdateStatus::proceed())
    }
    fn build_subscription_list(&self) -> SubscriptionList {
        Vec::new()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ── Scenario 1: one pedestrian, start to removal ──────────────────────────────

#[test]
fn pedestrian_runs_and_is_removed_when_trip_completes() {
    // 140 cm at 140 cm/s with 100 ms ticks: arrival on tick 9.
    let mut sim = Simulation::builder(test_config(20))
        .network(line_network(140.0))
        .build()
        .unwrap();
    sim.add_or_stash(walk_person(sim.network().clone()));

    let mut obs = RecordingObserver::default();
    sim.run(&mut obs).unwrap();

    assert_eq!(obs.active.len(), 20);
    assert!(
        obs.active[..10].iter().all(|&a| a == 1),
        "agent active through its walk: {:?}",
        obs.active
    );
    assert!(
        obs.active[10..].iter().all(|&a| a == 0),
        "agent gone from all worker sets after removal: {:?}",
        obs.active
    );
    assert_eq!(sim.group(GroupKind::Agents).agent_count(), 0);
}

// ── Scenario 2: heterogeneous granularities ───────────────────────────────────

#[test]
fn coarse_groups_update_only_on_aligned_ticks() {
    let mut sim = Simulation::builder(test_config(10)).build().unwrap();

    let fine = Arc::new(AtomicUsize::new(0));
    let coarse = Arc::new(AtomicUsize::new(0));
    sim.add_agent(GroupKind::Agents, Box::new(CountingAgent::new(fine.clone())));
    sim.add_agent(GroupKind::Signals, Box::new(CountingAgent::new(coarse.clone())));

    sim.run(&mut NoopObserver).unwrap();

    assert_eq!(fine.load(Ordering::SeqCst), 10, "granularity 1: every tick");
    assert_eq!(coarse.load(Ordering::SeqCst), 2, "granularity 5: ticks 0 and 5");
}

#[test]
fn per_tick_callbacks_run_on_aligned_ticks_per_worker() {
    let mut sim = Simulation::builder(test_config(10)).build().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let probe = calls.clone();
    sim.group_mut(GroupKind::Signals)
        .init_workers(Some(Arc::new(move |_params: &FrameParams<'_>| {
            probe.fetch_add(1, Ordering::SeqCst);
        })));

    sim.run(&mut NoopObserver).unwrap();
    // 1 signals worker × aligned ticks {0, 5}.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ── Scenario 3: pending queue dispatch ────────────────────────────────────────

/// A role that stays put forever (an activity with no end).
fn immortal_person(name: &str, start_ms: u64) -> Person {
    Person::with_role(
        name,
        Box::new(msim_agent::roles::ActivityPerformer::new(
            Point::new(0.0, 0.0),
            u64::MAX,
        )),
        start_ms,
        NodeId(1),
        NodeId(1),
        Arc::new(RoadNetwork::empty()),
    )
}

#[test]
fn pending_persons_activate_at_their_start_ticks() {
    let mut sim = Simulation::builder(test_config(30)).build().unwrap();
    sim.add_or_stash(immortal_person("p1", 0));
    sim.add_or_stash(immortal_person("p2", 500));
    sim.add_or_stash(immortal_person("p3", 1_700));
    assert_eq!(sim.pending_count(), 2);

    let mut obs = RecordingObserver::default();
    sim.run(&mut obs).unwrap();

    assert_eq!(obs.active[0], 1, "only p1 active at tick 0");
    assert_eq!(obs.active[4], 1);
    assert_eq!(obs.active[5], 2, "p2 activates at 500 ms / 100 ms = tick 5");
    assert_eq!(obs.active[16], 2);
    assert_eq!(obs.active[17], 3, "p3 activates at tick 17");
    assert!(obs.active[17..].iter().all(|&a| a == 3));

    // Every loaded agent activated → pending queue drained.
    assert_eq!(*obs.pending.last().unwrap(), 0);
    assert!(obs.pending[..5].iter().all(|&p| p > 0));
}

// ── Scenario: buffered cells commit exactly at the barrier ────────────────────

struct CellAgent {
    id: EntityId,
    cell: Arc<Buffered<u64>>,
}

impl Agent for CellAgent {
    fn id(&self) -> EntityId {
        self.id
    }
    fn start_time_ms(&self) -> u64 {
        0
    }
    fn is_to_be_removed(&self) -> bool {
        false
    }
    fn update(&mut self, params: &FrameParams<'_>) -> msim_agent::AgentResult<UpdateStatus> {
        // Writes are tentative until this worker's flip phase.
        self.cell.set(params.tick.0 + 1);
        assert!(
            self.cell.get() == params.tick.0,
            "own committed value lags one tick behind"
        );
        Ok(UpdateStatus::proceed())
    }
    fn build_subscription_list(&self) -> SubscriptionList {
        vec![self.cell.clone()]
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn subscribed_cells_commit_each_tick() {
    let mut sim = Simulation::builder(test_config(7)).build().unwrap();
    let cell = Buffered::shared(0u64);
    sim.add_agent(
        GroupKind::Agents,
        Box::new(CellAgent { id: EntityId::next(), cell: cell.clone() }),
    );

    sim.run(&mut NoopObserver).unwrap();
    assert_eq!(cell.get(), 7, "last tentative write (tick 6 + 1) committed");
}

// ── Scenario: cross-worker message delivery ───────────────────────────────────

struct ReceiverRole {
    slot: Arc<Mutex<Option<HandlerId>>>,
    received_at: Arc<AtomicU64>,
}

impl Role for ReceiverRole {
    fn role_type(&self) -> RoleType {
        RoleType::ActivityPerformer
    }
    fn init(&mut self, ctx: &mut RoleContext<'_, '_>) -> msim_agent::AgentResult<()> {
        *self.slot.lock() = ctx.person.handler;
        Ok(())
    }
    fn tick(&mut self, _ctx: &mut RoleContext<'_, '_>) -> msim_agent::AgentResult<()> {
        Ok(())
    }
    fn on_message(
        &mut self,
        ctx: &mut RoleContext<'_, '_>,
        _message_type: msim_messaging::MessageType,
        _message: &Arc<dyn Message>,
    ) {
        self.received_at.store(ctx.frame.tick.0 + 1, Ordering::SeqCst);
    }
}

struct SenderRole {
    slot: Arc<Mutex<Option<HandlerId>>>,
    sent: bool,
    sent_at: Arc<AtomicU64>,
}

impl Role for SenderRole {
    fn role_type(&self) -> RoleType {
        RoleType::ActivityPerformer
    }
    fn init(&mut self, _ctx: &mut RoleContext<'_, '_>) -> msim_agent::AgentResult<()> {
        Ok(())
    }
    fn tick(&mut self, ctx: &mut RoleContext<'_, '_>) -> msim_agent::AgentResult<()> {
        if !self.sent {
            if let Some(target) = *self.slot.lock() {
                let msg: Arc<dyn Message> = Arc::new("ping".to_owned());
                ctx.frame.bus.send_message(target, 777, msg)?;
                self.sent_at.store(ctx.frame.tick.0 + 1, Ordering::SeqCst);
                self.sent = true;
            }
        }
        Ok(())
    }
}

#[test]
fn messages_cross_workers_via_the_distribution_cycle() {
    let mut sim = Simulation::builder(test_config(10)).build().unwrap();
    let slot = Arc::new(Mutex::new(None));
    let received_at = Arc::new(AtomicU64::new(0));
    let sent_at = Arc::new(AtomicU64::new(0));

    let receiver = Person::with_role(
        "receiver",
        Box::new(ReceiverRole { slot: slot.clone(), received_at: received_at.clone() }),
        0,
        NodeId(1),
        NodeId(1),
        Arc::new(RoadNetwork::empty()),
    );
    let sender = Person::with_role(
        "sender",
        Box::new(SenderRole { slot: slot.clone(), sent: false, sent_at: sent_at.clone() }),
        0,
        NodeId(1),
        NodeId(1),
        Arc::new(RoadNetwork::empty()),
    );
    sim.add_or_stash(receiver);
    sim.add_or_stash(sender);

    sim.run(&mut NoopObserver).unwrap();

    let sent = sent_at.load(Ordering::SeqCst);
    let received = received_at.load(Ordering::SeqCst);
    assert!(sent > 0, "sender found the receiver's handler");
    assert!(received > 0, "receiver got the message");
    assert!(
        received >= sent,
        "delivery is never earlier than the send (sent tick {}, received tick {})",
        sent - 1,
        received - 1
    );
}

// ── Scenario 4/5: bus stop protocol end to end ────────────────────────────────

#[test]
fn bus_stop_boarding_protocol_end_to_end() {
    let mut sim = Simulation::builder(test_config(14)).build().unwrap();

    let stop = BusStopAgent::new(Point::new(0.0, 0.0), 3_000.0, sim.bus().clone());
    let as_handler: Arc<dyn MessageHandler> = stop.clone();
    let stop_handler = sim.bus().register_handler(as_handler).unwrap();
    stop.set_handler(stop_handler);
    sim.add_agent(GroupKind::Agents, Box::new(BusStopHost::new(stop.clone())));

    let driver = Person::with_role(
        "bus-1",
        Box::new(BusDriver::new("L1", 1_200.0, 40, 3, stop_handler)),
        0,
        NodeId(1),
        NodeId(1),
        Arc::new(RoadNetwork::empty()),
    );
    let waiter = Person::with_role(
        "rider-1",
        Box::new(WaitBusActivity::new("L1", stop_handler)),
        0,
        NodeId(1),
        NodeId(1),
        Arc::new(RoadNetwork::empty()),
    );
    sim.add_or_stash(driver);
    sim.add_or_stash(waiter);

    let mut obs = RecordingObserver::default();
    sim.run(&mut obs).unwrap();

    assert_eq!(stop.waiting_count(), 0, "the waiter boarded");
    assert_eq!(stop.serving_count(), 0, "the bus departed");
    assert_eq!(
        sim.group(GroupKind::Agents).agent_count(),
        1,
        "only the stop host remains"
    );
}

// ── Fatal errors terminate the run ────────────────────────────────────────────

struct ExplodingAgent {
    id: EntityId,
    fired: Arc<AtomicBool>,
}

impl Agent for ExplodingAgent {
    fn id(&self) -> EntityId {
        self.id
    }
    fn start_time_ms(&self) -> u64 {
        0
    }
    fn is_to_be_removed(&self) -> bool {
        false
    }
    fn update(&mut self, _params: &FrameParams<'_>) -> msim_agent::AgentResult<UpdateStatus> {
        self.fired.store(true, Ordering::SeqCst);
        Err(msim_agent::AgentError::Config("engine fault injection".into()))
    }
    fn build_subscription_list(&self) -> SubscriptionList {
        Vec::new()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn worker_faults_stop_the_simulation() {
    let mut sim = Simulation::builder(test_config(50)).build().unwrap();
    let fired = Arc::new(AtomicBool::new(false));
    sim.add_agent(
        GroupKind::Agents,
        Box::new(ExplodingAgent { id: EntityId::next(), fired: fired.clone() }),
    );

    let mut obs = RecordingObserver::default();
    let result = sim.run(&mut obs);
    assert!(result.is_err());
    assert!(fired.load(Ordering::SeqCst));
    assert!(
        obs.active.len() < 50,
        "terminated early after the fault, not at tick 50"
    );
}
