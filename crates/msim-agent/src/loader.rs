//! `PeriodicPersonLoader` — periodic materialization of persons from the
//! activity-schedule store.
//!
//! Every `load_interval` of simulated time the driver asks the loader for
//! the next half-hour-window batch.  Rows are grouped by person, turned
//! into trip chains (one trip per row, plus the destination activity
//! except for the terminal home row), and constructed into `Person`s on a
//! rayon pool to amortize construction cost over cores.  The driver then
//! activates persons whose start time is zero and stashes the rest in the
//! pending queue.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{info, warn};

use msim_core::time::{
    half_hour_window, random_time_in_window, DailyTime, FIRST_WINDOW_OF_DAY, LAST_WINDOW_OF_DAY,
};
use msim_core::SimRng;
use msim_network::RoadNetwork;
use msim_schedule::{Activity, DasRow, ScheduleStore, SubTrip, Trip, TripChainItem};

use crate::error::AgentResult;
use crate::person::Person;

/// Span of one load query in window units: `[start, start + 1.0)` covers
/// two half-hour windows — one hour per load.
const LOAD_WINDOW_SPAN: f64 = 1.0;

const HOME_ACTIVITY_TYPE: &str = "Home";

pub struct PeriodicPersonLoader {
    store: Box<dyn ScheduleStore>,
    network: Arc<RoadNetwork>,
    sim_start: DailyTime,
    base_gran_ms: u32,
    load_interval_ms: u64,
    elapsed_ms: u64,
    next_load_start: f64,
    rng: SimRng,
}

impl PeriodicPersonLoader {
    pub fn new(
        store: Box<dyn ScheduleStore>,
        network: Arc<RoadNetwork>,
        sim_start: DailyTime,
        base_gran_ms: u32,
        load_interval_secs: u32,
        seed: u64,
    ) -> Self {
        Self {
            store,
            network,
            sim_start,
            base_gran_ms,
            load_interval_ms: load_interval_secs as u64 * 1_000,
            // Pre-charged with one tick so every load happens one tick
            // ahead of the interval boundary it serves.
            elapsed_ms: base_gran_ms as u64,
            next_load_start: half_hour_window(sim_start.offset_secs()),
            rng: SimRng::new(seed),
        }
    }

    /// Advance the interval clock by one base tick; `true` when a load is
    /// due.
    pub fn check_time_for_next_load(&mut self) -> bool {
        self.elapsed_ms += self.base_gran_ms as u64;
        if self.elapsed_ms >= self.load_interval_ms {
            self.elapsed_ms = 0;
            true
        } else {
            false
        }
    }

    /// The window the next load will query (exposed for progress output).
    pub fn next_load_start(&self) -> f64 {
        self.next_load_start
    }

    /// Query the next window and materialize its persons.
    pub fn load_activity_schedules(&mut self) -> AgentResult<Vec<Person>> {
        let start = self.next_load_start;
        let end = start + LOAD_WINDOW_SPAN;
        let rows = self
            .store
            .load_window(start, end)
            .map_err(|e| crate::error::AgentError::Config(format!("schedule store: {e}")))?;

        // Group rows into per-person trip chains.  Rows arrive ordered by
        // person, so a chain is extended while the person id repeats.
        let mut chains: Vec<(String, Vec<TripChainItem>)> = Vec::new();
        let mut activity_count = 0usize;
        for row in rows {
            if self.network.node_pos(row.origin_node).is_none()
                || self.network.node_pos(row.dest_node).is_none()
            {
                warn!(person = %row.person_id, origin = %row.origin_node,
                      dest = %row.dest_node, "schedule row references unknown nodes; skipped");
                continue;
            }
            if row.origin_node == row.dest_node {
                continue;
            }

            let is_last_in_schedule = row.departure_window == LAST_WINDOW_OF_DAY
                && row.activity_type == HOME_ACTIVITY_TYPE;

            if chains.last().map(|(id, _)| id.as_str()) != Some(row.person_id.as_str()) {
                chains.push((row.person_id.clone(), Vec::new()));
            }
            let chain = &mut chains.last_mut().expect("just pushed").1;

            let seq = chain.len() as u32 + 1;
            chain.push(TripChainItem::Trip(self.make_trip(&row, seq)));
            if !is_last_in_schedule {
                chain.push(TripChainItem::Activity(self.make_activity(&row, seq + 1)));
            }
            activity_count += 1;
        }

        // Construction pool: persons are independent, so build them in
        // parallel.
        let network = &self.network;
        let sim_start = self.sim_start;
        let persons: Vec<Person> = chains
            .into_par_iter()
            .filter_map(|(person_id, chain)| {
                match Person::new(&person_id, chain, network.clone(), sim_start) {
                    Ok(person) => Some(person),
                    Err(err) => {
                        warn!(person = %person_id, %err, "person construction failed; skipped");
                        None
                    }
                }
            })
            .collect();

        info!(
            window_start = start,
            window_end = end,
            rows = activity_count,
            persons = persons.len(),
            "activity schedules loaded"
        );

        // The day wraps: past the last window, restart at the first.
        self.next_load_start = end;
        if self.next_load_start > LAST_WINDOW_OF_DAY {
            self.next_load_start -= 24.0;
            debug_assert!(self.next_load_start >= FIRST_WINDOW_OF_DAY);
        }

        Ok(persons)
    }

    // ── Row → trip-chain items ────────────────────────────────────────────

    fn make_trip(&mut self, row: &DasRow, seq: u32) -> Trip {
        let start = random_time_in_window(&mut self.rng, row.trip_start_window, false);
        let sub = SubTrip {
            from: row.origin_node,
            to: row.dest_node,
            mode: row.mode.clone(),
            is_primary_mode: row.is_primary_mode,
            pt_line_id: None,
            start_time: start,
        };
        Trip {
            // Tour and stop numbers make the id unique within the person.
            trip_id: (row.tour_no * 100 + row.stop_no).to_string(),
            person_id: row.person_id.clone(),
            sequence_number: seq,
            from: row.origin_node,
            to: row.dest_node,
            start_time: start,
            sub_trips: vec![sub],
        }
    }

    fn make_activity(&mut self, row: &DasRow, seq: u32) -> Activity {
        // Arrival is drawn from the window's first fifteen minutes so a
        // departure sharing the window always lands after it.
        let start = random_time_in_window(&mut self.rng, row.arrival_window, true);
        let end = random_time_in_window(&mut self.rng, row.departure_window, false);
        Activity {
            person_id: row.person_id.clone(),
            sequence_number: seq,
            description: row.activity_type.clone(),
            location: row.dest_node,
            is_primary: row.is_primary_mode,
            is_flexible: false,
            is_mandatory: true,
            start_time: start,
            end_time: end,
        }
    }
}
