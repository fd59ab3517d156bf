//! Relational-store network loader.
//!
//! Every load path is gated on the configured stored-procedure map: the
//! procedure name is the table (or view) queried, and an unset/empty name
//! disables that path — silently, except for `signal`, which warns.
//! `node` and `section` are mandatory.
//!
//! # Store layout (columns by index)
//!
//! | Entity     | Columns                                                          |
//! |------------|------------------------------------------------------------------|
//! | `node`     | 0=id, 1=x (m), 2=y (m), 3=is_intersection                        |
//! | `section`  | 0=id, 1=from_node, 2=to_node, 3=length (m), 4=speed_limit (m/s)  |
//! | `lane`     | 0=id, 1=section, 2=index, 3=width (m)                            |
//! | `crossing` | 0=section, 1..8=near/far line endpoints (m)                      |
//! | `turning`  | 0=from_section, 1=to_section, 2=from_lane, 3=to_lane, 4=dx, 5=dy |
//! | `polyline` | 0=section, 1=seq, 2=x (m), 3=y (m)                               |
//! | `signal`   | 0=id, 1=node, 2=phase seconds (comma-separated)                  |
//!
//! All distances arrive in meters and leave this module in centimeters
//! (×100); the turning offsets arrive in centimeters already, since they
//! replace what used to be in-core geometry patches.

use rusqlite::Connection;
use tracing::{info, warn};

use msim_core::{LaneId, NodeId, ProcedureMap, SegmentId, SignalId};

use crate::error::{NetworkError, NetworkResult};
use crate::network::{RoadNetwork, RoadNetworkBuilder};
use crate::types::{Crossing, Lane, Point, RoadSegment, SignalPlan, Turning};

/// Meters → centimeters; applied here and nowhere else.
const CM_PER_M: f64 = 100.0;

/// Load, convert, and validate the road network.
pub fn load_network(conn: &Connection, procs: &ProcedureMap) -> NetworkResult<RoadNetwork> {
    let node_proc = procs.get("node").ok_or(NetworkError::MissingProcedure("node"))?;
    let section_proc = procs
        .get("section")
        .ok_or(NetworkError::MissingProcedure("section"))?;

    let mut builder = RoadNetworkBuilder::new();

    // ── Nodes ─────────────────────────────────────────────────────────────
    let mut stmt = conn.prepare(&format!("SELECT * FROM {node_proc}"))?;
    let mut rows = stmt.query([])?;
    let mut node_count = 0usize;
    while let Some(row) = rows.next()? {
        let id = NodeId(row.get::<_, i64>(0)? as u32);
        let pos = Point::new(row.get::<_, f64>(1)? * CM_PER_M, row.get::<_, f64>(2)? * CM_PER_M);
        let is_intersection = row.get::<_, i64>(3)? != 0;
        builder.add_node(id, pos, is_intersection);
        node_count += 1;
    }

    // ── Sections (+ polylines + lanes) ────────────────────────────────────
    let polylines = load_polylines(conn, procs)?;
    let lane_lists = load_lane_lists(conn, procs, &mut builder)?;

    let mut stmt = conn.prepare(&format!("SELECT * FROM {section_proc}"))?;
    let mut rows = stmt.query([])?;
    let mut segment_count = 0usize;
    while let Some(row) = rows.next()? {
        let id = SegmentId(row.get::<_, i64>(0)? as u32);
        builder.add_segment(RoadSegment {
            id,
            from: NodeId(row.get::<_, i64>(1)? as u32),
            to: NodeId(row.get::<_, i64>(2)? as u32),
            length_cm: row.get::<_, f64>(3)? * CM_PER_M,
            speed_limit_cm_s: row.get::<_, f64>(4)? * CM_PER_M,
            polyline: polylines.get(&id).cloned().unwrap_or_default(),
            lanes: lane_lists.get(&id).cloned().unwrap_or_default(),
        });
        segment_count += 1;
    }

    // ── Crossings ─────────────────────────────────────────────────────────
    if let Some(proc) = procs.get("crossing") {
        let mut stmt = conn.prepare(&format!("SELECT * FROM {proc}"))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let p = |i: usize| -> rusqlite::Result<f64> {
                Ok(row.get::<_, f64>(i)? * CM_PER_M)
            };
            builder.add_crossing(Crossing {
                segment: SegmentId(row.get::<_, i64>(0)? as u32),
                near: (Point::new(p(1)?, p(2)?), Point::new(p(3)?, p(4)?)),
                far: (Point::new(p(5)?, p(6)?), Point::new(p(7)?, p(8)?)),
            });
        }
    }

    // ── Turnings (offsets already in cm — store-side patch data) ──────────
    if let Some(proc) = procs.get("turning") {
        let mut stmt = conn.prepare(&format!("SELECT * FROM {proc}"))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            builder.add_turning(Turning {
                from_segment: SegmentId(row.get::<_, i64>(0)? as u32),
                to_segment: SegmentId(row.get::<_, i64>(1)? as u32),
                from_lane: LaneId(row.get::<_, i64>(2)? as u32),
                to_lane: LaneId(row.get::<_, i64>(3)? as u32),
                offset: Point::new(row.get::<_, f64>(4)?, row.get::<_, f64>(5)?),
            });
        }
    }

    // ── Signals ───────────────────────────────────────────────────────────
    match procs.get("signal") {
        None => warn!("signal stored procedure not configured; no signals loaded"),
        Some(proc) => {
            let mut stmt = conn.prepare(&format!("SELECT * FROM {proc}"))?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let phases: Vec<u32> = row
                    .get::<_, String>(2)?
                    .split(',')
                    .filter_map(|s| s.trim().parse().ok())
                    .collect();
                builder.add_signal(SignalPlan {
                    id: SignalId(row.get::<_, i64>(0)? as u32),
                    node: NodeId(row.get::<_, i64>(1)? as u32),
                    phase_secs: phases,
                });
            }
        }
    }

    let network = builder.build()?;
    info!(
        nodes = node_count,
        segments = segment_count,
        signals = network.signals().len(),
        "road network loaded"
    );
    Ok(network)
}

// ── Helpers ───────────────────────────────────────────────────────────────────

type PolylineMap = std::collections::HashMap<SegmentId, Vec<Point>>;

fn load_polylines(conn: &Connection, procs: &ProcedureMap) -> NetworkResult<PolylineMap> {
    let mut map = PolylineMap::new();
    let Some(proc) = procs.get("polyline") else {
        return Ok(map);
    };
    let mut stmt = conn.prepare(&format!("SELECT * FROM {proc} ORDER BY 1, 2"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let segment = SegmentId(row.get::<_, i64>(0)? as u32);
        let point = Point::new(
            row.get::<_, f64>(2)? * CM_PER_M,
            row.get::<_, f64>(3)? * CM_PER_M,
        );
        map.entry(segment).or_default().push(point);
    }
    Ok(map)
}

type LaneListMap = std::collections::HashMap<SegmentId, Vec<LaneId>>;

fn load_lane_lists(
    conn: &Connection,
    procs: &ProcedureMap,
    builder: &mut RoadNetworkBuilder,
) -> NetworkResult<LaneListMap> {
    let mut map = LaneListMap::new();
    let Some(proc) = procs.get("lane") else {
        return Ok(map);
    };
    let mut stmt = conn.prepare(&format!("SELECT * FROM {proc} ORDER BY 2, 3"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let id = LaneId(row.get::<_, i64>(0)? as u32);
        let segment = SegmentId(row.get::<_, i64>(1)? as u32);
        builder.add_lane(Lane {
            id,
            segment,
            index: row.get::<_, i64>(2)? as u8,
            width_cm: row.get::<_, f64>(3)? * CM_PER_M,
        });
        map.entry(segment).or_default().push(id);
    }
    Ok(map)
}
