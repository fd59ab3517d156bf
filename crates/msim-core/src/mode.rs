//! Travel mode enum shared across the trip-chain and role crates.
//!
//! Sub-trips carry their mode as the raw store string; [`TravelMode::parse`]
//! classifies it when a role has to be built.  Unrecognised strings are
//! reported by the caller (trip-chain advance raises its unknown-mode
//! error there, with the offending string attached).

/// The means by which a person travels one sub-trip.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum TravelMode {
    /// On foot.
    Walk,
    /// Private car.
    Car,
    /// Scheduled public bus.
    Bus,
    /// Taxi / hired car.
    Taxi,
}

impl TravelMode {
    /// Classify a store mode string.  Returns `None` for modes this
    /// simulator does not know about.
    pub fn parse(s: &str) -> Option<TravelMode> {
        match s {
            "Walk" => Some(TravelMode::Walk),
            "Car" => Some(TravelMode::Car),
            "Bus" | "BusTravel" => Some(TravelMode::Bus),
            "Taxi" => Some(TravelMode::Taxi),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TravelMode::Walk => "Walk",
            TravelMode::Car => "Car",
            TravelMode::Bus => "Bus",
            TravelMode::Taxi => "Taxi",
        }
    }
}

impl std::fmt::Display for TravelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
