//! Trip-chain data model.
//!
//! Items are a tagged variant — consumers match on [`TripChainItem`], never
//! on runtime type information.  All types here are immutable after load;
//! the person that references a chain only advances cursors over it.

use msim_core::{DailyTime, NodeId};

// ── SubTrip ───────────────────────────────────────────────────────────────────

/// One mode-homogeneous leg of a trip.
#[derive(Clone, Debug)]
pub struct SubTrip {
    pub from: NodeId,
    pub to: NodeId,
    /// Store mode string (`"Walk"`, `"Car"`, `"Bus"`, …).  Classified by
    /// `TravelMode::parse` when a role is built, so unknown modes surface
    /// as errors at the point the plan is acted on.
    pub mode: String,
    pub is_primary_mode: bool,
    /// Public-transit line for bus legs.
    pub pt_line_id: Option<String>,
    pub start_time: DailyTime,
}

// ── Trip ──────────────────────────────────────────────────────────────────────

/// A movement from one location to another, as one or more sub-trips.
#[derive(Clone, Debug)]
pub struct Trip {
    /// Unique within the person (derived from tour and stop numbers).
    pub trip_id: String,
    pub person_id: String,
    pub sequence_number: u32,
    pub from: NodeId,
    pub to: NodeId,
    pub start_time: DailyTime,
    pub sub_trips: Vec<SubTrip>,
}

// ── Activity ──────────────────────────────────────────────────────────────────

/// A stay at one location for a time span.
#[derive(Clone, Debug)]
pub struct Activity {
    pub person_id: String,
    pub sequence_number: u32,
    /// Store activity type (`"Home"`, `"Work"`, …).
    pub description: String,
    pub location: NodeId,
    pub is_primary: bool,
    pub is_flexible: bool,
    pub is_mandatory: bool,
    pub start_time: DailyTime,
    pub end_time: DailyTime,
}

// ── TripChainItem ─────────────────────────────────────────────────────────────

/// One entry of a person's day plan.
#[derive(Clone, Debug)]
pub enum TripChainItem {
    Trip(Trip),
    Activity(Activity),
}

impl TripChainItem {
    pub fn sequence_number(&self) -> u32 {
        match self {
            TripChainItem::Trip(t) => t.sequence_number,
            TripChainItem::Activity(a) => a.sequence_number,
        }
    }

    pub fn start_time(&self) -> DailyTime {
        match self {
            TripChainItem::Trip(t) => t.start_time,
            TripChainItem::Activity(a) => a.start_time,
        }
    }

    /// Origin of this item.  An activity "originates" at its own location.
    pub fn from_location(&self) -> NodeId {
        match self {
            TripChainItem::Trip(t) => t.from,
            TripChainItem::Activity(a) => a.location,
        }
    }

    /// Destination of this item.
    pub fn to_location(&self) -> NodeId {
        match self {
            TripChainItem::Trip(t) => t.to,
            TripChainItem::Activity(a) => a.location,
        }
    }
}
