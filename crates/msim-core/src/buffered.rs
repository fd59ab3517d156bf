//! Double-buffered cells and subscription lists.
//!
//! # Read-committed semantics
//!
//! A [`Buffered`] cell holds two copies of its value: the *committed* copy
//! that every reader observes, and the *tentative* copy the owning agent
//! writes during its update phase.  At the worker's flip barrier every
//! cell in the worker's flip set is promoted (`tentative → committed`) in
//! one pass, so observers never see a half-updated tick.
//!
//! # Phase discipline
//!
//! Correctness rests entirely on the barrier protocol, not on locks:
//!
//! - `set` is called only by the owning agent, and only between the update
//!   and flip barriers of that agent's worker.
//! - `flip` is called only by the owning worker, after the update barrier,
//!   while no thread is in its update phase.
//! - `get` from other threads happens only outside that window (i.e. after
//!   the flip barrier of the previous tick and before the update barrier
//!   of the current one).
//!
//! Flipping twice without an interleaving `set` is idempotent.

use std::cell::UnsafeCell;
use std::sync::Arc;

// ── BufferedBase ──────────────────────────────────────────────────────────────

/// Object-safe flip handle, so cells of different value types can share one
/// subscription list.
pub trait BufferedBase: Send + Sync {
    /// Promote the tentative value to the committed value.
    fn flip(&self);
}

/// The ordered set of cells a worker flips for one agent: the agent's own
/// cells plus the current role's cells.  Rebuilt when the role changes.
pub type SubscriptionList = Vec<Arc<dyn BufferedBase>>;

// ── Buffered ──────────────────────────────────────────────────────────────────

/// A double-buffered value cell.
pub struct Buffered<T: Copy> {
    committed: UnsafeCell<T>,
    tentative: UnsafeCell<T>,
}

// SAFETY: All mutation goes through `set` (owner thread, update phase) and
// `flip` (owner worker, flip phase); cross-thread `get` calls are confined
// to the opposite side of the barrier pair.  The barrier protocol therefore
// guarantees no read overlaps any write, which is exactly the contract
// `Sync` needs here.
unsafe impl<T: Copy + Send> Sync for Buffered<T> {}

impl<T: Copy + Send> Buffered<T> {
    pub fn new(value: T) -> Self {
        Self {
            committed: UnsafeCell::new(value),
            tentative: UnsafeCell::new(value),
        }
    }

    /// Shared-cell constructor; the common case, since readers hold `Arc`
    /// clones while the owner keeps the original.
    pub fn shared(value: T) -> Arc<Self> {
        Arc::new(Self::new(value))
    }

    /// The committed value, as promoted by the most recent flip.
    #[inline]
    pub fn get(&self) -> T {
        // SAFETY: see the `Sync` impl — no writer is active while readers run.
        unsafe { *self.committed.get() }
    }

    /// Write the tentative value.  Owner-only; visible to readers after the
    /// next flip.
    #[inline]
    pub fn set(&self, value: T) {
        // SAFETY: only the owning agent's thread calls `set`, and only
        // during its update phase, when no reader or flipper touches
        // `tentative`.
        unsafe { *self.tentative.get() = value }
    }

    /// Set both copies at once.  For initialization before the simulation
    /// starts, when no other thread can observe the cell.
    pub fn force(&self, value: T) {
        // SAFETY: single-threaded initialization window.
        unsafe {
            *self.committed.get() = value;
            *self.tentative.get() = value;
        }
    }
}

impl<T: Copy + Send> BufferedBase for Buffered<T> {
    #[inline]
    fn flip(&self) {
        // SAFETY: called only by the owning worker between the update and
        // flip barriers; no concurrent `get`/`set` on this cell.
        unsafe { *self.committed.get() = *self.tentative.get() }
    }
}

impl<T: Copy + Send + std::fmt::Debug> std::fmt::Debug for Buffered<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffered").field("committed", &self.get()).finish()
    }
}
