//! Event identifiers and the listener contract.
//!
//! Events are fire-and-forget publications routed through the same queue
//! cycle as messages.  A listener can hold two kinds of bindings per event
//! id: a *global* binding (receives every publication of that id) and any
//! number of *contextual* bindings (receive only publications carrying the
//! matching [`EventCtx`]).  A listener bound both ways receives one
//! publication at most twice — once per binding.

use std::fmt;

use crate::message::Message;

/// Application-chosen numeric event identifier.
pub type EventId = u32;

/// Publisher context key for contextual subscriptions — typically the
/// publishing entity's id.  Distinct from thread contexts: this scopes
/// *which* publications a listener sees, not *where* they are delivered.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct EventCtx(pub u64);

impl fmt::Display for EventCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx{}", self.0)
    }
}

/// An event-bus endpoint.  `on_event` runs on the thread owning the
/// context the listener subscribed from (instantaneous publications run
/// inline on the publisher's thread, which the bus verifies is the same).
pub trait EventListener: Send + Sync {
    fn on_event(&self, id: EventId, ctx: Option<EventCtx>, args: &dyn Message);
}
