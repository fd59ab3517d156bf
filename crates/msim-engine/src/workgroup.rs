//! Work-groups and their manager.
//!
//! A [`WorkGroup`] is a set of workers sharing a tick granularity.  The
//! [`WorkGroupManager`] owns the global barrier trio (sized all workers
//! plus the driver) and completes one base tick per
//! [`wait_all_groups`](WorkGroupManager::wait_all_groups) call.  The
//! driver calls each group's [`stage`](WorkGroup::stage) in a fixed order
//! first — that order is the only cross-group sequencing the engine
//! guarantees; frame execution is concurrent across groups.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{info, warn};

use msim_agent::{Agent, AgentError, FrameParams};
use msim_core::{EntityId, Tick, WorkGroupConfig};
use msim_messaging::MessageBus;

use crate::error::{EngineError, EngineResult};
use crate::worker::{worker_main, EngineCtrl, FrameBarriers, WorkerShared};

/// Optional per-tick callback run by each worker on aligned ticks, before
/// its agents update.  Used for ad-hoc setup work (the zero-time loading
/// step) without dedicated agent types.
pub type TickCallback = Arc<dyn Fn(&FrameParams<'_>) + Send + Sync>;

// ── WorkGroup ─────────────────────────────────────────────────────────────────

pub struct WorkGroup {
    name: String,
    granularity: u64,
    callback: Option<TickCallback>,
    workers: Vec<Arc<WorkerShared>>,
    /// (agent, from worker, to worker) transfers applied at the next
    /// `stage` call.
    pending_migrations: Mutex<Vec<(EntityId, usize, usize)>>,
}

impl WorkGroup {
    fn new(name: impl Into<String>, config: WorkGroupConfig) -> Self {
        let workers = (0..config.workers)
            .map(|_| Arc::new(WorkerShared::default()))
            .collect();
        Self {
            name: name.into(),
            granularity: config.granularity_ticks,
            callback: None,
            workers,
            pending_migrations: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn granularity(&self) -> u64 {
        self.granularity
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Population across all workers, staged agents included.
    pub fn agent_count(&self) -> usize {
        self.workers.iter().map(|w| w.agent_count()).sum()
    }

    /// Assign an optional per-tick callback to every worker.  Must be
    /// called before the groups are started.
    pub fn init_workers(&mut self, callback: Option<TickCallback>) {
        self.callback = callback;
    }

    /// Stage `agent` onto a specific worker.  The worker integrates it at
    /// its next frame start (calling `on_worker_enter` on its own thread).
    pub fn add_agent(&self, agent: Box<dyn Agent>, worker_idx: usize) {
        let idx = worker_idx % self.workers.len();
        self.workers[idx].inbox.lock().push(agent);
    }

    /// Stage `agent` round-robin by its entity id.
    pub fn assign(&self, agent: Box<dyn Agent>) {
        let idx = (agent.id().0 % self.workers.len() as u64) as usize;
        self.add_agent(agent, idx);
    }

    /// Request a transfer of `agent` between two of this group's workers.
    /// Executed at the start of the next tick, while no worker is between
    /// the barriers.
    pub fn migrate(&self, agent: EntityId, from_worker: usize, to_worker: usize) {
        self.pending_migrations
            .lock()
            .push((agent, from_worker, to_worker));
    }

    /// Driver-side pre-frame bookkeeping: apply pending migrations.
    /// Legal only while workers are parked at the frame barrier.
    pub fn stage(&self) {
        let migrations: Vec<_> = std::mem::take(&mut *self.pending_migrations.lock());
        for (agent_id, from, to) in migrations {
            let from = from % self.workers.len();
            let to = to % self.workers.len();
            let mut source = self.workers[from].agents.lock();
            match source.iter().position(|e| e.agent.id() == agent_id) {
                Some(idx) => {
                    let entry = source.remove(idx);
                    drop(source);
                    // Cells rebuilt and handlers re-registered when the
                    // destination worker integrates the agent.
                    self.workers[to].inbox.lock().push(entry.agent);
                }
                None => {
                    warn!(agent = %agent_id, group = %self.name, from, to,
                          "migration source does not hold the agent; skipped");
                }
            }
        }
    }

    /// Run `f` over every agent currently integrated in this group.
    /// Intended for inspection after the run (output writers, tests).
    pub fn for_each_agent(&self, mut f: impl FnMut(&dyn Agent)) {
        for worker in &self.workers {
            for entry in worker.agents.lock().iter() {
                f(entry.agent.as_ref());
            }
        }
    }
}

// ── WorkGroupManager ──────────────────────────────────────────────────────────

pub struct WorkGroupManager {
    groups: Vec<WorkGroup>,
    ctrl: Arc<EngineCtrl>,
    barriers: Option<Arc<FrameBarriers>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkGroupManager {
    pub fn new(
        base_gran_ms: u32,
        sim_start_ms: u32,
        dynamic_dispatch: bool,
        strict: bool,
    ) -> Self {
        Self {
            groups: Vec::new(),
            ctrl: Arc::new(EngineCtrl {
                current_tick: AtomicU64::new(0),
                shutdown: AtomicBool::new(false),
                fault: Mutex::new(None),
                base_gran_ms,
                sim_start_ms,
                dynamic_dispatch,
                strict,
            }),
            barriers: None,
            handles: Vec::new(),
        }
    }

    pub fn create_group(&mut self, name: impl Into<String>, config: WorkGroupConfig) -> usize {
        self.groups.push(WorkGroup::new(name, config));
        self.groups.len() - 1
    }

    pub fn group(&self, idx: usize) -> &WorkGroup {
        &self.groups[idx]
    }

    pub fn group_mut(&mut self, idx: usize) -> &mut WorkGroup {
        &mut self.groups[idx]
    }

    pub fn is_started(&self) -> bool {
        self.barriers.is_some()
    }

    /// Spawn every worker thread.  Workers immediately park at the frame
    /// barrier and wait for the first `wait_all_groups`.
    pub fn start_all(&mut self, bus: &Arc<MessageBus>) -> EngineResult<()> {
        if self.barriers.is_some() {
            return Ok(());
        }
        let total_workers: usize = self.groups.iter().map(|g| g.worker_count()).sum();
        let barriers = Arc::new(FrameBarriers {
            frame: Barrier::new(total_workers + 1),
            update: Barrier::new(total_workers + 1),
            flip: Barrier::new(total_workers + 1),
        });

        for group in &self.groups {
            for (idx, shared) in group.workers.iter().enumerate() {
                let shared = shared.clone();
                let granularity = group.granularity;
                let callback = group.callback.clone();
                let barriers = barriers.clone();
                let ctrl = self.ctrl.clone();
                let bus = bus.clone();
                let handle = std::thread::Builder::new()
                    .name(format!("{}-{idx}", group.name))
                    .spawn(move || {
                        worker_main(shared, granularity, callback, barriers, ctrl, bus)
                    })
                    .expect("spawn worker thread");
                self.handles.push(handle);
            }
        }

        info!(
            groups = self.groups.len(),
            workers = total_workers,
            "work groups started"
        );
        self.barriers = Some(barriers);
        Ok(())
    }

    /// Complete one base tick: release the frame and see all workers
    /// through both phase barriers.
    pub fn wait_all_groups(&self, tick: Tick) -> EngineResult<()> {
        let barriers = self.barriers.as_ref().ok_or(EngineError::NotStarted)?;
        self.ctrl.current_tick.store(tick.0, Ordering::Release);
        barriers.frame.wait();
        barriers.update.wait();
        barriers.flip.wait();
        Ok(())
    }

    /// First fatal agent error recorded by any worker this run, if any.
    pub fn take_fault(&self) -> Option<AgentError> {
        self.ctrl.fault.lock().take()
    }

    /// Release the workers one last time with the shutdown flag set; they
    /// drain nothing further, clear the frame barrier, and exit.
    pub fn shutdown(&mut self) {
        let Some(barriers) = self.barriers.take() else {
            return;
        };
        self.ctrl.shutdown.store(true, Ordering::Release);
        barriers.frame.wait();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkGroupManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
