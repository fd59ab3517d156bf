//! `day_activity_schedule` rows and the store behind them.
//!
//! # Row shape (columns by index)
//!
//! | Index | Column                     |
//! |-------|----------------------------|
//! | 0     | person id                  |
//! | 1     | tour number                |
//! | 2     | (unused)                   |
//! | 3     | stop number                |
//! | 4     | activity type              |
//! | 5     | destination node           |
//! | 6     | mode                       |
//! | 7     | is primary mode            |
//! | 8     | activity arrival window    |
//! | 9     | activity departure window  |
//! | 10    | origin node                |
//! | 11    | trip start window          |
//!
//! Time windows use the half-hour representation (`3.25 … 26.75`, see
//! `msim_core::time`).  The SQLite implementation additionally relies on
//! the *names* `person_id`, `tour_no`, `stop_no`, and `trip_start_window`
//! for its WHERE/ORDER clauses.

use rusqlite::Connection;

use msim_core::NodeId;

use crate::error::ScheduleResult;

// ── DasRow ────────────────────────────────────────────────────────────────────

/// One row of the day activity schedule: one trip plus (usually) the
/// activity at its destination.
#[derive(Clone, Debug)]
pub struct DasRow {
    pub person_id: String,
    pub tour_no: u32,
    pub stop_no: u32,
    pub activity_type: String,
    pub dest_node: NodeId,
    pub mode: String,
    pub is_primary_mode: bool,
    pub arrival_window: f64,
    pub departure_window: f64,
    pub origin_node: NodeId,
    pub trip_start_window: f64,
}

// ── ScheduleStore ─────────────────────────────────────────────────────────────

/// Source of schedule rows for a half-hour-window range.
///
/// Implementations return rows with `start <= trip_start_window < end`,
/// grouped-friendly ordering (person id, then tour, then stop).
pub trait ScheduleStore: Send {
    fn load_window(&mut self, start: f64, end: f64) -> ScheduleResult<Vec<DasRow>>;
}

// ── SqliteScheduleStore ───────────────────────────────────────────────────────

/// Schedule store backed by the relational store; `proc` is the configured
/// stored-procedure (table/view) name for `day_activity_schedule`.
pub struct SqliteScheduleStore {
    conn: Connection,
    proc: String,
}

impl SqliteScheduleStore {
    pub fn new(conn: Connection, proc: impl Into<String>) -> Self {
        Self { conn, proc: proc.into() }
    }
}

impl ScheduleStore for SqliteScheduleStore {
    fn load_window(&mut self, start: f64, end: f64) -> ScheduleResult<Vec<DasRow>> {
        let sql = format!(
            "SELECT * FROM {} WHERE trip_start_window >= ?1 AND trip_start_window < ?2 \
             ORDER BY person_id, tour_no, stop_no",
            self.proc
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params![start, end])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(DasRow {
                person_id: row.get::<_, String>(0)?,
                tour_no: row.get::<_, i64>(1)? as u32,
                stop_no: row.get::<_, i64>(3)? as u32,
                activity_type: row.get::<_, String>(4)?,
                dest_node: NodeId(row.get::<_, i64>(5)? as u32),
                mode: row.get::<_, String>(6)?,
                is_primary_mode: row.get::<_, i64>(7)? != 0,
                arrival_window: row.get::<_, f64>(8)?,
                departure_window: row.get::<_, f64>(9)?,
                origin_node: NodeId(row.get::<_, i64>(10)? as u32),
                trip_start_window: row.get::<_, f64>(11)?,
            });
        }
        Ok(out)
    }
}

// ── InMemoryScheduleStore ─────────────────────────────────────────────────────

/// Vec-backed store for tests and synthetic populations.
#[derive(Default)]
pub struct InMemoryScheduleStore {
    rows: Vec<DasRow>,
}

impl InMemoryScheduleStore {
    pub fn new(rows: Vec<DasRow>) -> Self {
        Self { rows }
    }
}

impl ScheduleStore for InMemoryScheduleStore {
    fn load_window(&mut self, start: f64, end: f64) -> ScheduleResult<Vec<DasRow>> {
        let mut out: Vec<DasRow> = self
            .rows
            .iter()
            .filter(|r| r.trip_start_window >= start && r.trip_start_window < end)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            (&a.person_id, a.tour_no, a.stop_no).cmp(&(&b.person_id, b.tour_no, b.stop_no))
        });
        Ok(out)
    }
}
