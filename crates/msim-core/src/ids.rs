//! Strongly typed identifier wrappers and the entity-id allocator.
//!
//! Network element ids (`NodeId`, `SegmentId`, …) wrap the numeric ids of
//! the persistent store; they are `Copy + Ord + Hash` so they work as map
//! keys without ceremony.  `EntityId` is different: it identifies a live
//! simulation entity (person, bus stop, signal) and is handed out by a
//! process-wide monotonic allocator at construction time, so ids are
//! unique across loaders and never reused within a run.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Generate a typed id wrapper around a primitive integer.
macro_rules! network_id {
    ($(#[$attr:meta])* $vis:vis struct $name:ident($inner:ty);) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
        #[derive(serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        $vis struct $name(pub $inner);

        impl $name {
            /// Sentinel meaning "no valid id".
            pub const INVALID: $name = $name(<$inner>::MAX);

            /// `true` unless this is the `INVALID` sentinel.
            #[inline(always)]
            pub fn is_valid(self) -> bool {
                self != Self::INVALID
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

network_id! {
    /// Store id of a road-network node (intersection or segment endpoint).
    pub struct NodeId(u32);
}

network_id! {
    /// Store id of a directed road segment.
    pub struct SegmentId(u32);
}

network_id! {
    /// Store id of a lane within a segment.
    pub struct LaneId(u32);
}

network_id! {
    /// Store id of a signalised intersection's controller.
    pub struct SignalId(u32);
}

// ── EntityId ──────────────────────────────────────────────────────────────────

/// Identity of a live simulation entity.
///
/// 64-bit, assigned monotonically at construction via [`EntityId::next`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct EntityId(pub u64);

/// Global monotonic counter backing [`EntityId::next`].
static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

impl EntityId {
    /// Allocate the next unused entity id.
    ///
    /// Safe to call from any thread; the loader's construction pool
    /// allocates concurrently.
    pub fn next() -> EntityId {
        EntityId(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}
