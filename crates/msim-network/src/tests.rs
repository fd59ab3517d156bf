//! Unit tests for the network crate.

use rusqlite::Connection;

use msim_core::{LaneId, NodeId, ProcedureMap, SegmentId, SignalId};

use crate::loader::load_network;
use crate::network::RoadNetworkBuilder;
use crate::types::{Lane, Point, SignalPlan};
use crate::NetworkError;

// ── Builder validation ────────────────────────────────────────────────────────

mod builder_tests {
    use super::*;

    #[test]
    fn consistent_network_builds() {
        let mut b = RoadNetworkBuilder::new();
        b.add_node(NodeId(1), Point::new(0.0, 0.0), true);
        b.add_node(NodeId(2), Point::new(10_000.0, 0.0), true);
        b.add_link(SegmentId(10), NodeId(1), NodeId(2), 10_000.0);
        let net = b.build().unwrap();
        assert_eq!(net.node_count(), 2);
        assert_eq!(net.segment_count(), 1);
        assert_eq!(net.outgoing_segments(NodeId(1)), &[SegmentId(10)]);
    }

    #[test]
    fn dangling_segment_endpoint_is_fatal() {
        let mut b = RoadNetworkBuilder::new();
        b.add_node(NodeId(1), Point::new(0.0, 0.0), false);
        b.add_link(SegmentId(10), NodeId(1), NodeId(99), 500.0);
        assert!(matches!(b.build(), Err(NetworkError::Inconsistent(_))));
    }

    #[test]
    fn dangling_lane_reference_is_fatal() {
        let mut b = RoadNetworkBuilder::new();
        b.add_node(NodeId(1), Point::new(0.0, 0.0), false);
        b.add_node(NodeId(2), Point::new(100.0, 0.0), false);
        b.add_link(SegmentId(1), NodeId(1), NodeId(2), 100.0);
        b.add_lane(Lane {
            id: LaneId(7),
            segment: SegmentId(999),
            index: 0,
            width_cm: 350.0,
        });
        assert!(matches!(b.build(), Err(NetworkError::Inconsistent(_))));
    }

    #[test]
    fn dangling_signal_node_is_fatal() {
        let mut b = RoadNetworkBuilder::new();
        b.add_node(NodeId(1), Point::new(0.0, 0.0), true);
        b.add_signal(SignalPlan {
            id: SignalId(1),
            node: NodeId(404),
            phase_secs: vec![30, 30],
        });
        assert!(matches!(b.build(), Err(NetworkError::Inconsistent(_))));
    }

    #[test]
    fn snap_finds_nearest_node() {
        let mut b = RoadNetworkBuilder::new();
        b.add_node(NodeId(1), Point::new(0.0, 0.0), false);
        b.add_node(NodeId(2), Point::new(50_000.0, 0.0), false);
        b.add_node(NodeId(3), Point::new(0.0, 50_000.0), false);
        let net = b.build().unwrap();
        assert_eq!(net.snap_to_node(Point::new(100.0, 200.0)), Some(NodeId(1)));
        assert_eq!(net.snap_to_node(Point::new(49_000.0, 100.0)), Some(NodeId(2)));
        assert_eq!(crate::RoadNetwork::empty().snap_to_node(Point::new(0.0, 0.0)), None);
    }
}

// ── Signal plan phases ────────────────────────────────────────────────────────

#[test]
fn signal_phase_cycles() {
    let plan = SignalPlan {
        id: SignalId(1),
        node: NodeId(1),
        phase_secs: vec![30, 20, 10],
    };
    assert_eq!(plan.phase_at(0), 0);
    assert_eq!(plan.phase_at(29), 0);
    assert_eq!(plan.phase_at(30), 1);
    assert_eq!(plan.phase_at(49), 1);
    assert_eq!(plan.phase_at(50), 2);
    assert_eq!(plan.phase_at(60), 0, "wraps after a full 60 s cycle");
}

// ── Store loader ──────────────────────────────────────────────────────────────

mod loader_tests {
    use super::*;

    fn seeded_store() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE get_nodes (id INTEGER, x REAL, y REAL, is_intersection INTEGER);
             CREATE TABLE get_sections (id INTEGER, from_node INTEGER, to_node INTEGER,
                                        length REAL, speed_limit REAL);
             CREATE TABLE get_signals (id INTEGER, node_id INTEGER, phase_secs TEXT);
             INSERT INTO get_nodes VALUES (1, 0.0, 0.0, 1);
             INSERT INTO get_nodes VALUES (2, 120.5, 0.0, 0);
             INSERT INTO get_sections VALUES (10, 1, 2, 120.5, 13.89);
             INSERT INTO get_signals VALUES (5, 1, '30,20,30');",
        )
        .unwrap();
        conn
    }

    fn procs(signal: bool) -> ProcedureMap {
        let mut map = ProcedureMap::default();
        map.0.insert("node".into(), "get_nodes".into());
        map.0.insert("section".into(), "get_sections".into());
        if signal {
            map.0.insert("signal".into(), "get_signals".into());
        }
        map
    }

    #[test]
    fn loads_and_converts_meters_to_centimeters() {
        let conn = seeded_store();
        let net = load_network(&conn, &procs(true)).unwrap();

        let pos = net.node_pos(NodeId(2)).unwrap();
        assert_eq!(pos.x, 12_050.0, "120.5 m -> 12050 cm");

        let seg = net.segment(SegmentId(10)).unwrap();
        assert_eq!(seg.length_cm, 12_050.0);
        assert!((seg.speed_limit_cm_s - 1_389.0).abs() < 1e-9);

        assert_eq!(net.signals().len(), 1);
        assert_eq!(net.signals()[0].phase_secs, vec![30, 20, 30]);
    }

    #[test]
    fn empty_signal_procedure_skips_signals() {
        let conn = seeded_store();
        let net = load_network(&conn, &procs(false)).unwrap();
        assert!(net.signals().is_empty());
    }

    #[test]
    fn missing_node_procedure_is_an_error() {
        let conn = seeded_store();
        let mut map = ProcedureMap::default();
        map.0.insert("section".into(), "get_sections".into());
        assert!(matches!(
            load_network(&conn, &map),
            Err(NetworkError::MissingProcedure("node"))
        ));
    }

    #[test]
    fn dangling_store_reference_is_fatal() {
        let conn = seeded_store();
        conn.execute("INSERT INTO get_sections VALUES (11, 1, 404, 50.0, 13.89)", [])
            .unwrap();
        assert!(matches!(
            load_network(&conn, &procs(false)),
            Err(NetworkError::Inconsistent(_))
        ));
    }
}
