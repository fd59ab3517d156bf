//! `msim-messaging` — the thread-context message bus.
//!
//! The bus routes typed messages between handlers and carries
//! publish/subscribe events.  Every participating thread registers a
//! *context*; handlers are bound to the context of the thread that
//! registers them, and a handler only ever runs on that thread (the one
//! exception is `process_on_main`, which the main thread executes during
//! distribution).
//!
//! # Delivery protocol
//!
//! One cycle per base tick, interleaved with the scheduler's barriers:
//!
//! 1. Worker threads post messages into their context's outgoing queue at
//!    any point during their update phase.
//! 2. The main thread calls [`MessageBus::distribute_messages`] while all
//!    workers are parked at the frame barrier.  Outgoing queues drain into
//!    the global queue; overdue time-offset messages rejoin it; the queue
//!    is stable-sorted by priority (internal > event > custom, FIFO within
//!    a priority); internal and `process_on_main` entries run in place;
//!    the rest land in per-target-thread input queues.
//! 3. Each worker calls [`MessageBus::thread_dispatch_messages`] at the
//!    top of its next frame, draining its input queue in FIFO order.
//!
//! Instantaneous sends bypass the queues entirely and are legal only when
//! sender and receiver share a context.
//!
//! The bus is created once by the driver before workers start and shut
//! down after the final tick.  It is deliberately an instance service
//! (`Arc<MessageBus>`) rather than a process-wide singleton so that
//! concurrently running simulations — the test suite, if nothing else —
//! cannot observe each other's contexts.

pub mod bus;
pub mod error;
pub mod events;
pub mod message;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use bus::{ContextId, MessageBus};
pub use error::{MessagingError, MessagingResult};
pub use events::{EventCtx, EventId, EventListener};
pub use message::{
    downcast, HandlerId, Message, MessageHandler, MessageOptions, MessageType,
    PRIORITY_CUSTOM, PRIORITY_EVENT, PRIORITY_INTERNAL,
};
