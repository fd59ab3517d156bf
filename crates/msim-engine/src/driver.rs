//! The `Simulation` driver: the outer tick loop and everything it owns.

use std::sync::Arc;

use tracing::{error, info, warn};

use msim_agent::{Agent, PeriodicPersonLoader, Person, SignalAgent};
use msim_core::{SimulationConfig, Tick, TickClock};
use msim_messaging::MessageBus;
use msim_network::RoadNetwork;
use msim_schedule::{Schedulable, ScheduleStore, StartTimeQueue};

use crate::error::EngineResult;
use crate::observer::SimObserver;
use crate::workgroup::WorkGroupManager;

/// The three standard work-groups, in their driver-enforced staging order.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum GroupKind {
    Signals,
    ShortestPath,
    Agents,
}

// ── Simulation ────────────────────────────────────────────────────────────────

/// Owns the work-groups, the pending queue, the periodic loader, and the
/// message bus; runs the outer tick loop.
///
/// Create through [`Simulation::builder`].
pub struct Simulation {
    config: SimulationConfig,
    clock: TickClock,
    bus: Arc<MessageBus>,
    network: Arc<RoadNetwork>,
    manager: WorkGroupManager,
    signals_group: usize,
    path_group: usize,
    agents_group: usize,
    pending: StartTimeQueue<Person>,
    loader: Option<PeriodicPersonLoader>,
}

impl Simulation {
    pub fn builder(config: SimulationConfig) -> SimulationBuilder {
        SimulationBuilder {
            config,
            network: None,
            store: None,
        }
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn network(&self) -> &Arc<RoadNetwork> {
        &self.network
    }

    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn group(&self, kind: GroupKind) -> &crate::WorkGroup {
        self.manager.group(self.group_idx(kind))
    }

    pub fn group_mut(&mut self, kind: GroupKind) -> &mut crate::WorkGroup {
        let idx = self.group_idx(kind);
        self.manager.group_mut(idx)
    }

    fn group_idx(&self, kind: GroupKind) -> usize {
        match kind {
            GroupKind::Signals => self.signals_group,
            GroupKind::ShortestPath => self.path_group,
            GroupKind::Agents => self.agents_group,
        }
    }

    // ── Population management ─────────────────────────────────────────────

    /// Activate a person now (start time zero) or stash it in the pending
    /// queue for the dispatcher.
    pub fn add_or_stash(&mut self, mut person: Person) {
        if Schedulable::start_time_ms(&person) == 0 {
            match person.load() {
                Ok(()) => self.group(GroupKind::Agents).assign(Box::new(person)),
                Err(err) => {
                    warn!(person = %person.db_id(), %err, "person load failed; dropped")
                }
            }
        } else {
            self.pending.push(person);
        }
    }

    /// Stage an arbitrary agent into one of the groups (round-robin by
    /// entity id).
    pub fn add_agent(&mut self, kind: GroupKind, agent: Box<dyn Agent>) {
        self.group(kind).assign(agent);
    }

    /// Pop everything due from the pending queue and migrate it into the
    /// agents work-group.
    fn dispatch_pending(&mut self) {
        let now = self.clock.now_ms();
        while let Some(mut person) = self.pending.pop_due(now) {
            match person.load() {
                Ok(()) => self.group(GroupKind::Agents).assign(Box::new(person)),
                Err(err) => {
                    warn!(person = %person.db_id(), %err, "person load failed; dropped")
                }
            }
        }
    }

    // ── The outer loop ────────────────────────────────────────────────────

    /// Run `total_runtime_ticks` base ticks (or stop early on a fatal
    /// error).  Work-group threads are started on the first call and torn
    /// down, along with the message bus, before this returns.
    pub fn run(&mut self, observer: &mut dyn SimObserver) -> EngineResult<()> {
        self.manager.start_all(&self.bus)?;
        let result = self.run_loop(observer);
        self.manager.shutdown();
        self.bus.shutdown();
        observer.on_sim_end(self.clock.current_tick);
        if let Err(err) = &result {
            error!(%err, "simulation terminated on fatal error");
        }
        result
    }

    fn run_loop(&mut self, observer: &mut dyn SimObserver) -> EngineResult<()> {
        for t in 0..self.config.total_runtime_ticks {
            let tick = Tick(t);
            observer.on_tick_start(tick);

            // Periodic loader: batch in new persons ahead of the interval.
            if let Some(loader) = &mut self.loader {
                if loader.check_time_for_next_load() {
                    let batch = loader.load_activity_schedules()?;
                    for person in batch {
                        self.add_or_stash(person);
                    }
                }
            }

            self.dispatch_pending();

            // Exact population numbers, captured while workers are parked.
            let active = self.group(GroupKind::Agents).agent_count();
            let pending = self.pending.len();

            self.bus.distribute_messages(self.clock.now_ms())?;

            // Fixed staging order: signals, then shortest-path, then agents.
            self.manager.group(self.signals_group).stage();
            self.manager.group(self.path_group).stage();
            self.manager.group(self.agents_group).stage();

            self.manager.wait_all_groups(tick)?;

            if let Some(fault) = self.manager.take_fault() {
                return Err(fault.into());
            }

            if t >= self.config.total_warmup_ticks {
                observer.on_tick_end(tick, active, pending);
            }

            self.clock.advance();
        }

        info!(ticks = self.config.total_runtime_ticks, "simulation complete");
        Ok(())
    }
}

// ── SimulationBuilder ─────────────────────────────────────────────────────────

/// Builder for [`Simulation`].
///
/// # Required
///
/// - a validated [`SimulationConfig`]
///
/// # Optional
///
/// | Method              | Default                                   |
/// |---------------------|-------------------------------------------|
/// | `.network(n)`       | [`RoadNetwork::empty`]                    |
/// | `.schedule_store(s)`| no periodic loader                        |
pub struct SimulationBuilder {
    config: SimulationConfig,
    network: Option<Arc<RoadNetwork>>,
    store: Option<Box<dyn ScheduleStore>>,
}

impl SimulationBuilder {
    pub fn network(mut self, network: Arc<RoadNetwork>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn schedule_store(mut self, store: Box<dyn ScheduleStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validate the configuration, create the bus (registering the calling
    /// thread as its main thread), build the three work-groups, and seed
    /// signal agents from the network.
    pub fn build(self) -> EngineResult<Simulation> {
        self.config.validate()?;
        let sim_start = self.config.start_time()?;

        let bus = Arc::new(MessageBus::new());
        bus.register_main_thread()?;

        let network = self.network.unwrap_or_else(|| Arc::new(RoadNetwork::empty()));

        let mut manager = WorkGroupManager::new(
            self.config.base_gran_ms,
            sim_start.offset_ms(),
            self.config.dynamic_dispatch,
            self.config.strict_agent_errors,
        );
        let signals_group = manager.create_group("signals", self.config.signals_workgroup);
        let path_group = manager.create_group("shortest-path", self.config.shortest_path_workgroup);
        let agents_group = manager.create_group("agents", self.config.agents_workgroup);

        // One signal agent per plan, driven at the signals granularity.
        for plan in network.signals() {
            let pos = network.node_pos(plan.node).unwrap_or_default();
            let agent = SignalAgent::new(plan.clone(), pos);
            manager.group(signals_group).assign(Box::new(agent));
        }

        let loader = self.store.map(|store| {
            PeriodicPersonLoader::new(
                store,
                network.clone(),
                sim_start,
                self.config.base_gran_ms,
                self.config.load_interval_secs,
                self.config.seed,
            )
        });

        Ok(Simulation {
            clock: TickClock::new(self.config.base_gran_ms, sim_start),
            config: self.config,
            bus,
            network,
            manager,
            signals_group,
            path_group,
            agents_group,
            pending: StartTimeQueue::new(),
            loader,
        })
    }
}
