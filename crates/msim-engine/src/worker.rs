//! The worker thread loop.
//!
//! One OS thread per worker.  The worker owns its agents exclusively
//! between the frame barrier and the flip barrier; the driver touches a
//! worker's collections only while the worker is parked at the frame
//! barrier, so the mutexes here are uncontended in steady state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Barrier};

use parking_lot::Mutex;
use tracing::error;

use msim_agent::{Agent, AgentError, FrameParams, UpdateStatus};
use msim_core::{SubscriptionList, Tick};
use msim_messaging::MessageBus;

use crate::workgroup::TickCallback;

// ── Shared control state ──────────────────────────────────────────────────────

/// State shared between the driver and every worker thread.
pub(crate) struct EngineCtrl {
    /// Tick being executed; stored by the driver before the frame barrier.
    pub current_tick: AtomicU64,
    pub shutdown: AtomicBool,
    /// First fatal agent error; checked by the driver after each frame.
    pub fault: Mutex<Option<AgentError>>,
    pub base_gran_ms: u32,
    pub sim_start_ms: u32,
    pub dynamic_dispatch: bool,
    pub strict: bool,
}

/// The two phase barriers plus the frame rendezvous, shared by all workers
/// of all groups and the driver.
pub(crate) struct FrameBarriers {
    pub frame: Barrier,
    pub update: Barrier,
    pub flip: Barrier,
}

// ── Per-worker state ──────────────────────────────────────────────────────────

pub(crate) struct ManagedEntry {
    pub agent: Box<dyn Agent>,
    /// The flip set for this agent; adjusted from update-status cell diffs.
    pub cells: SubscriptionList,
    /// Set when the agent's update returned a fatal error; the entry is
    /// dropped at the end of the frame without being asked again.
    pub dead: bool,
}

/// The collections both sides need to see: the worker thread drives them,
/// the driver stages into them at frame boundaries.
#[derive(Default)]
pub(crate) struct WorkerShared {
    pub agents: Mutex<Vec<ManagedEntry>>,
    /// Agents staged for this worker; integrated (and announced via
    /// `on_worker_enter`) on the worker's own thread at frame start.
    pub inbox: Mutex<Vec<Box<dyn Agent>>>,
}

impl WorkerShared {
    /// Current population including not-yet-integrated staged agents.
    pub fn agent_count(&self) -> usize {
        self.agents.lock().len() + self.inbox.lock().len()
    }
}

// ── Worker main loop ──────────────────────────────────────────────────────────

pub(crate) fn worker_main(
    shared: Arc<WorkerShared>,
    granularity: u64,
    callback: Option<TickCallback>,
    barriers: Arc<FrameBarriers>,
    ctrl: Arc<EngineCtrl>,
    bus: Arc<MessageBus>,
) {
    let _ = bus.register_thread();
    // Agents removed last frame; kept one extra frame so in-flight message
    // references stay valid, dropped here.
    let mut graveyard: Vec<ManagedEntry> = Vec::new();

    loop {
        barriers.frame.wait();
        if ctrl.shutdown.load(Ordering::Acquire) {
            let _ = bus.unregister_thread();
            return;
        }
        graveyard.clear();

        let _ = bus.thread_dispatch_messages();

        // Integrate staged agents on this thread, so their handlers land
        // in this worker's bus context.
        let additions: Vec<Box<dyn Agent>> = std::mem::take(&mut *shared.inbox.lock());
        if !additions.is_empty() {
            let mut agents = shared.agents.lock();
            for mut agent in additions {
                agent.on_worker_enter(&bus);
                let cells = agent.build_subscription_list();
                agents.push(ManagedEntry { agent, cells, dead: false });
            }
        }

        let tick = Tick(ctrl.current_tick.load(Ordering::Acquire));
        let aligned = tick.is_aligned(granularity);
        let params = FrameParams {
            tick,
            now_ms: tick.0 * ctrl.base_gran_ms as u64,
            base_gran_ms: ctrl.base_gran_ms,
            sim_start_ms: ctrl.sim_start_ms,
            dynamic_dispatch: ctrl.dynamic_dispatch,
            strict: ctrl.strict,
            bus: &bus,
        };

        // ── Update phase ──────────────────────────────────────────────────
        if aligned {
            if let Some(callback) = &callback {
                callback(&params);
            }
            let mut agents = shared.agents.lock();
            for entry in agents.iter_mut() {
                if entry.dead || entry.agent.start_time_ms() > params.now_ms {
                    continue;
                }
                match entry.agent.update(&params) {
                    Ok(status) => apply_cell_diff(&mut entry.cells, status),
                    Err(err) => {
                        error!(agent = %entry.agent.id(), %err, "fatal agent error");
                        let mut fault = ctrl.fault.lock();
                        if fault.is_none() {
                            *fault = Some(err);
                        }
                        entry.dead = true;
                    }
                }
            }
        }

        barriers.update.wait();

        // ── Flip phase ────────────────────────────────────────────────────
        if aligned {
            let agents = shared.agents.lock();
            for entry in agents.iter() {
                if entry.dead {
                    continue;
                }
                for cell in &entry.cells {
                    cell.flip();
                }
            }
        }

        // ── Removal ───────────────────────────────────────────────────────
        //
        // Collected before the flip barrier so that once the driver clears
        // it, no worker touches its collections again this frame.
        {
            let mut agents = shared.agents.lock();
            let mut kept = Vec::with_capacity(agents.len());
            for mut entry in agents.drain(..) {
                if entry.dead || entry.agent.is_to_be_removed() {
                    entry.agent.on_worker_exit(&bus);
                    graveyard.push(entry);
                } else {
                    kept.push(entry);
                }
            }
            *agents = kept;
        }

        barriers.flip.wait();
    }
}

fn apply_cell_diff(cells: &mut SubscriptionList, status: UpdateStatus) {
    for removed in &status.cells_removed {
        cells.retain(|cell| !Arc::ptr_eq(cell, removed));
    }
    cells.extend(status.cells_added);
}
