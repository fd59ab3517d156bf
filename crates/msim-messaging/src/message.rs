//! Message payloads, handler contract, and queue priorities.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Application-chosen numeric tag routed alongside every message.
/// Consumers switch on it before downcasting the payload.
pub type MessageType = u32;

// ── Priorities ────────────────────────────────────────────────────────────────
//
// The global queue is stable-sorted by descending priority at distribution
// time, so internal control messages (unsubscribe-all) outrank event
// publications, which outrank ordinary handler messages.  FIFO order is
// preserved within a priority.

pub const PRIORITY_INTERNAL: u32 = 7;
pub const PRIORITY_EVENT: u32 = 6;
/// Minimum (and default) priority for custom handler messages.
pub const PRIORITY_CUSTOM: u32 = 5;

// ── Message ───────────────────────────────────────────────────────────────────

/// Any `'static + Send + Sync` value can travel the bus; receivers recover
/// the concrete type with [`downcast`].
pub trait Message: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync> Message for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Recover the concrete payload type, or `None` when the message type tag
/// lied about the payload.
pub fn downcast<T: Any>(message: &dyn Message) -> Option<&T> {
    message.as_any().downcast_ref::<T>()
}

// ── MessageHandler ────────────────────────────────────────────────────────────

/// A message-bus endpoint.
///
/// `handle_message` runs on the thread owning the context the handler was
/// registered to (or on the main thread for `process_on_main` messages),
/// so implementations keep their mutable state behind cheap interior
/// mutability and never block.  The payload arrives as an `Arc` so
/// mailbox-style handlers can retain it beyond the call.
pub trait MessageHandler: Send + Sync {
    fn handle_message(&self, message_type: MessageType, message: Arc<dyn Message>);
}

/// Stable identity of a registered handler; the addressing token for
/// `post_message`/`send_message` targets.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct HandlerId(pub u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H{}", self.0)
    }
}

// ── MessageOptions ────────────────────────────────────────────────────────────

/// Delivery options for [`MessageBus::post_message`][crate::MessageBus::post_message].
#[derive(Copy, Clone, Debug, Default)]
pub struct MessageOptions {
    /// Execute on the main thread during distribution, before any
    /// per-thread dispatch.
    pub process_on_main: bool,
    /// Defer delivery until the simulation clock reaches
    /// `posted_at + time_offset_ms`.
    pub time_offset_ms: u64,
}

impl MessageOptions {
    pub fn on_main() -> Self {
        Self { process_on_main: true, time_offset_ms: 0 }
    }

    pub fn deferred(time_offset_ms: u64) -> Self {
        Self { process_on_main: false, time_offset_ms }
    }
}
