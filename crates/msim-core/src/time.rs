//! Simulation time model.
//!
//! # Design
//!
//! Time is a monotonically increasing `Tick` counter.  One tick represents
//! `base_gran_ms` milliseconds of simulated time (typically 100 ms); the
//! mapping is held in [`TickClock`].  Using an integer tick as the
//! canonical unit keeps schedule arithmetic exact and comparisons O(1).
//!
//! Two auxiliary representations come from the activity-schedule domain:
//!
//! - [`DailyTime`] — a time of day in milliseconds since midnight, parsed
//!   from `HH:MM:SS` (24-hour) or `DD-MM-YYYY HH:MM` strings.
//! - **Half-hour windows** — the schedule store encodes times as a numeric
//!   30-minute bucket on the interval `[3.25, 26.75]`, spanning a 24-hour
//!   day that starts at 03:00.  `3.25` is 03:00–03:29, `3.75` is
//!   03:30–03:59, …, `24.25` is 00:00–00:29 of the next day, and `26.75`
//!   (02:30–02:59) is the last window of the day.

use std::fmt;

use crate::rng::SimRng;
use crate::{CoreError, CoreResult};

pub const MS_PER_SEC: u64 = 1_000;
pub const SECS_PER_HOUR: u32 = 3_600;
pub const MS_PER_DAY: u32 = 24 * 3_600 * 1_000;

/// Last 30-minute window of the activity-schedule day (02:30–02:59).
pub const LAST_WINDOW_OF_DAY: f64 = 26.75;
/// First 30-minute window of the activity-schedule day (03:00–03:29).
pub const FIRST_WINDOW_OF_DAY: f64 = 3.25;

// ── Tick ─────────────────────────────────────────────────────────────────────

/// An absolute simulation tick counter.
///
/// Stored as `u64`: at 100 ms per tick a u64 outlasts any conceivable run.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Tick(pub u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    /// Return the tick `n` steps after `self`.
    #[inline]
    pub fn offset(self, n: u64) -> Tick {
        Tick(self.0 + n)
    }

    /// `true` on ticks where a work-group with granularity `gran` performs
    /// useful work (`t mod gran == 0`, epoch at tick 0).
    #[inline]
    pub fn is_aligned(self, gran: u64) -> bool {
        gran <= 1 || self.0 % gran == 0
    }
}

impl std::ops::Add<u64> for Tick {
    type Output = Tick;
    #[inline]
    fn add(self, rhs: u64) -> Tick {
        Tick(self.0 + rhs)
    }
}

impl std::ops::Sub for Tick {
    type Output = u64;
    #[inline]
    fn sub(self, rhs: Tick) -> u64 {
        self.0 - rhs.0
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

// ── TickClock ─────────────────────────────────────────────────────────────────

/// Converts between tick counts and simulated milliseconds.
///
/// Cheap to copy; holds no heap data.
#[derive(Copy, Clone, Debug)]
pub struct TickClock {
    /// Milliseconds of simulated time per tick.
    pub base_gran_ms: u32,
    /// Time of day at tick 0, in milliseconds since midnight.
    pub start_ms: u32,
    /// The current tick — advanced by [`TickClock::advance`].
    pub current_tick: Tick,
}

impl TickClock {
    pub fn new(base_gran_ms: u32, start: DailyTime) -> Self {
        Self {
            base_gran_ms,
            start_ms: start.offset_ms(),
            current_tick: Tick::ZERO,
        }
    }

    /// Advance the clock by one tick.
    #[inline]
    pub fn advance(&mut self) {
        self.current_tick = Tick(self.current_tick.0 + 1);
    }

    /// Elapsed simulated milliseconds since tick 0.
    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.current_tick.0 * self.base_gran_ms as u64
    }

    /// Simulated milliseconds at an arbitrary tick.
    #[inline]
    pub fn ms_at(&self, tick: Tick) -> u64 {
        tick.0 * self.base_gran_ms as u64
    }

    /// Base-gran seconds represented by one tick (fractional).
    #[inline]
    pub fn base_gran_secs(&self) -> f64 {
        self.base_gran_ms as f64 / 1_000.0
    }

    /// Wall-clock time of day corresponding to the current tick.
    pub fn daily_time(&self) -> DailyTime {
        let ms = (self.start_ms as u64 + self.now_ms()) % MS_PER_DAY as u64;
        DailyTime::from_ms(ms as u32)
    }
}

// ── DailyTime ─────────────────────────────────────────────────────────────────

/// A time of day, stored as milliseconds since midnight.
///
/// Parses `HH:MM:SS` (24-hour) and `DD-MM-YYYY HH:MM` (the date part is
/// accepted and discarded — the simulator models a single day).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct DailyTime(u32);

impl DailyTime {
    pub const MIDNIGHT: DailyTime = DailyTime(0);

    #[inline]
    pub fn from_ms(ms: u32) -> Self {
        DailyTime(ms % MS_PER_DAY)
    }

    pub fn from_hms(hour: u32, minute: u32, second: u32) -> Self {
        DailyTime(((hour % 24) * 3_600 + minute * 60 + second) * 1_000)
    }

    /// Milliseconds since midnight.
    #[inline]
    pub fn offset_ms(self) -> u32 {
        self.0
    }

    /// Seconds since midnight.
    #[inline]
    pub fn offset_secs(self) -> u32 {
        self.0 / 1_000
    }

    /// Parse either supported textual format.
    pub fn parse(s: &str) -> CoreResult<Self> {
        let s = s.trim();
        // "DD-MM-YYYY HH:MM" — split on the space and keep the time part.
        if let Some((date, time)) = s.split_once(' ') {
            if date.split('-').count() != 3 {
                return Err(CoreError::Parse(format!("invalid daily time {s:?}")));
            }
            let (h, m) = time
                .split_once(':')
                .ok_or_else(|| CoreError::Parse(format!("invalid daily time {s:?}")))?;
            return Self::from_fields(h, m, "0", s);
        }
        let mut parts = s.split(':');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(m), Some(sec), None) => Self::from_fields(h, m, sec, s),
            _ => Err(CoreError::Parse(format!("invalid daily time {s:?}"))),
        }
    }

    fn from_fields(h: &str, m: &str, sec: &str, orig: &str) -> CoreResult<Self> {
        let parse = |field: &str| {
            field
                .parse::<u32>()
                .map_err(|_| CoreError::Parse(format!("invalid daily time {orig:?}")))
        };
        let (h, m, sec) = (parse(h)?, parse(m)?, parse(sec)?);
        if h > 23 || m > 59 || sec > 59 {
            return Err(CoreError::Parse(format!("daily time out of range {orig:?}")));
        }
        Ok(Self::from_hms(h, m, sec))
    }
}

impl fmt::Display for DailyTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0 / 1_000;
        write!(
            f,
            "{:02}:{:02}:{:02}",
            secs / 3_600,
            (secs % 3_600) / 60,
            secs % 60
        )
    }
}

// ── Half-hour windows ─────────────────────────────────────────────────────────

/// Map seconds-since-midnight to the activity schedule's numeric half-hour
/// window.
///
/// The 48 windows run `3.25, 3.75, …, 26.75`: hours before 03:00 belong to
/// the *next* schedule day, so hour `h < 3` maps to `h + 24`.  The first
/// half of an hour is `h + 0.25`, the second half `h + 0.75`.
pub fn half_hour_window(secs_since_midnight: u32) -> f64 {
    let mut hour = secs_since_midnight / SECS_PER_HOUR;
    let minutes = (secs_since_midnight % SECS_PER_HOUR) / 60;
    if hour < 3 {
        hour += 24;
    }
    if minutes < 30 {
        hour as f64 + 0.25
    } else {
        hour as f64 + 0.75
    }
}

/// Draw a uniform random time inside a half-hour window.
///
/// With `first_fifteen_only`, the draw is restricted to the window's first
/// 15 minutes — used when an activity's arrival and departure share a
/// window, so the arrival can land in the first half and the departure in
/// the second.
pub fn random_time_in_window(rng: &mut SimRng, window: f64, first_fifteen_only: bool) -> DailyTime {
    let hour = window.floor() as u32;
    let max_minute = if first_fifteen_only { 14 } else { 29 };
    // `window - hour` is 0.25 for the first half-hour and 0.75 for the
    // second; shift the minute draw into the right half.
    let half_offset = ((window - hour as f64 - 0.25) * 60.0).round() as u32;
    let minute = rng.gen_range(0..=max_minute) + half_offset;
    let second = rng.gen_range(0..=59u32);
    DailyTime::from_hms(hour % 24, minute, second)
}
