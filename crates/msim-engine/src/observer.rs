//! Driver observer trait for progress reporting and data collection.

use msim_core::Tick;

/// Callbacks invoked by [`Simulation::run`][crate::Simulation::run] at key
/// points of the outer loop.  All methods default to no-ops.
pub trait SimObserver {
    /// Start of every base tick, before any processing.
    fn on_tick_start(&mut self, _tick: Tick) {}

    /// End of a base tick, once the warmup period is over.
    ///
    /// `active` is the agents-group population and `pending` the pending
    /// queue length, both captured at the top of the tick (while workers
    /// were parked), so the numbers are exact.
    fn on_tick_end(&mut self, _tick: Tick, _active: usize, _pending: usize) {}

    /// After the final tick, once workers have exited.
    fn on_sim_end(&mut self, _final_tick: Tick) {}
}

/// A [`SimObserver`] that does nothing.
pub struct NoopObserver;

impl SimObserver for NoopObserver {}
