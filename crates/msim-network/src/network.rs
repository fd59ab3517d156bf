//! `RoadNetwork` and its builder.
//!
//! The builder accepts elements in any order and validates referential
//! integrity once, in [`RoadNetworkBuilder::build`]; a dangling reference
//! anywhere fails the whole load.  The built network carries an R-tree
//! over node positions so free positions (`originPos`/`destPos` person
//! properties) can be snapped to the graph.

use std::collections::HashMap;

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use msim_core::{LaneId, NodeId, SegmentId, SignalId};

use crate::error::{NetworkError, NetworkResult};
use crate::types::{Crossing, Lane, Node, Point, RoadSegment, SignalPlan, Turning};

// ── R-tree entry ──────────────────────────────────────────────────────────────

#[derive(Clone)]
struct NodeEntry {
    point: [f64; 2],
    id: NodeId,
}

impl RTreeObject for NodeEntry {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for NodeEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.point[0] - point[0];
        let dy = self.point[1] - point[1];
        dx * dx + dy * dy
    }
}

// ── RoadNetwork ───────────────────────────────────────────────────────────────

/// The loaded, validated, read-only road graph.
///
/// Construct through [`RoadNetworkBuilder`]; never mutated afterwards, so
/// it is shared across worker threads without locks.
pub struct RoadNetwork {
    nodes: HashMap<NodeId, Node>,
    segments: HashMap<SegmentId, RoadSegment>,
    lanes: HashMap<LaneId, Lane>,
    crossings: Vec<Crossing>,
    turnings: Vec<Turning>,
    signals: Vec<SignalPlan>,
    /// Outgoing segments per node.
    outgoing: HashMap<NodeId, Vec<SegmentId>>,
    spatial_idx: RTree<NodeEntry>,
}

impl RoadNetwork {
    /// An empty network.  Placeholder for runs that never route (message
    /// bus tests, pure-activity populations).
    pub fn empty() -> Self {
        RoadNetworkBuilder::new().build().expect("empty network is consistent")
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn segment(&self, id: SegmentId) -> Option<&RoadSegment> {
        self.segments.get(&id)
    }

    pub fn lane(&self, id: LaneId) -> Option<&Lane> {
        self.lanes.get(&id)
    }

    pub fn signals(&self) -> &[SignalPlan] {
        &self.signals
    }

    pub fn crossings(&self) -> &[Crossing] {
        &self.crossings
    }

    pub fn turnings(&self) -> &[Turning] {
        &self.turnings
    }

    /// Segments leaving `node`.
    pub fn outgoing_segments(&self, node: NodeId) -> &[SegmentId] {
        self.outgoing.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Position of a node; `None` for unknown ids.
    pub fn node_pos(&self, id: NodeId) -> Option<Point> {
        self.nodes.get(&id).map(|n| n.pos)
    }

    /// Nearest node to a free position, or `None` on an empty network.
    pub fn snap_to_node(&self, pos: Point) -> Option<NodeId> {
        self.spatial_idx
            .nearest_neighbor(&[pos.x, pos.y])
            .map(|e| e.id)
    }
}

// ── RoadNetworkBuilder ────────────────────────────────────────────────────────

/// Incremental construction of a [`RoadNetwork`].
#[derive(Default)]
pub struct RoadNetworkBuilder {
    nodes: Vec<Node>,
    segments: Vec<RoadSegment>,
    lanes: Vec<Lane>,
    crossings: Vec<Crossing>,
    turnings: Vec<Turning>,
    signals: Vec<SignalPlan>,
}

impl RoadNetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: NodeId, pos: Point, is_intersection: bool) -> &mut Self {
        self.nodes.push(Node { id, pos, is_intersection });
        self
    }

    pub fn add_segment(&mut self, segment: RoadSegment) -> &mut Self {
        self.segments.push(segment);
        self
    }

    /// Convenience for tests and generated networks: a straight
    /// lane-less segment between two nodes.
    pub fn add_link(
        &mut self,
        id: SegmentId,
        from: NodeId,
        to: NodeId,
        length_cm: f64,
    ) -> &mut Self {
        self.add_segment(RoadSegment {
            id,
            from,
            to,
            length_cm,
            speed_limit_cm_s: 1_389.0, // 50 km/h
            polyline: Vec::new(),
            lanes: Vec::new(),
        })
    }

    pub fn add_lane(&mut self, lane: Lane) -> &mut Self {
        self.lanes.push(lane);
        self
    }

    pub fn add_crossing(&mut self, crossing: Crossing) -> &mut Self {
        self.crossings.push(crossing);
        self
    }

    pub fn add_turning(&mut self, turning: Turning) -> &mut Self {
        self.turnings.push(turning);
        self
    }

    pub fn add_signal(&mut self, signal: SignalPlan) -> &mut Self {
        self.signals.push(signal);
        self
    }

    /// Validate referential integrity and produce the network.
    pub fn build(self) -> NetworkResult<RoadNetwork> {
        let nodes: HashMap<NodeId, Node> =
            self.nodes.into_iter().map(|n| (n.id, n)).collect();

        let mut outgoing: HashMap<NodeId, Vec<SegmentId>> = HashMap::new();
        let mut segments: HashMap<SegmentId, RoadSegment> = HashMap::new();
        for seg in self.segments {
            for end in [seg.from, seg.to] {
                if !nodes.contains_key(&end) {
                    return Err(NetworkError::Inconsistent(format!(
                        "segment {} references unknown node {end}",
                        seg.id
                    )));
                }
            }
            outgoing.entry(seg.from).or_default().push(seg.id);
            segments.insert(seg.id, seg);
        }

        let mut lanes: HashMap<LaneId, Lane> = HashMap::new();
        for lane in self.lanes {
            if !segments.contains_key(&lane.segment) {
                return Err(NetworkError::Inconsistent(format!(
                    "lane {} references unknown segment {}",
                    lane.id, lane.segment
                )));
            }
            lanes.insert(lane.id, lane);
        }
        for seg in segments.values() {
            for lane in &seg.lanes {
                if !lanes.contains_key(lane) {
                    return Err(NetworkError::Inconsistent(format!(
                        "segment {} lists unknown lane {lane}",
                        seg.id
                    )));
                }
            }
        }

        for crossing in &self.crossings {
            if !segments.contains_key(&crossing.segment) {
                return Err(NetworkError::Inconsistent(format!(
                    "crossing references unknown segment {}",
                    crossing.segment
                )));
            }
        }

        for turning in &self.turnings {
            for seg in [turning.from_segment, turning.to_segment] {
                if !segments.contains_key(&seg) {
                    return Err(NetworkError::Inconsistent(format!(
                        "turning references unknown segment {seg}"
                    )));
                }
            }
            for lane in [turning.from_lane, turning.to_lane] {
                if lane.is_valid() && !lanes.contains_key(&lane) {
                    return Err(NetworkError::Inconsistent(format!(
                        "turning references unknown lane {lane}"
                    )));
                }
            }
        }

        let mut seen_signals: HashMap<SignalId, ()> = HashMap::new();
        for signal in &self.signals {
            if !nodes.contains_key(&signal.node) {
                return Err(NetworkError::Inconsistent(format!(
                    "signal {} references unknown node {}",
                    signal.id, signal.node
                )));
            }
            if seen_signals.insert(signal.id, ()).is_some() {
                return Err(NetworkError::Inconsistent(format!(
                    "duplicate signal id {}",
                    signal.id
                )));
            }
        }

        let entries: Vec<NodeEntry> = nodes
            .values()
            .map(|n| NodeEntry { point: [n.pos.x, n.pos.y], id: n.id })
            .collect();
        let spatial_idx = RTree::bulk_load(entries);

        Ok(RoadNetwork {
            nodes,
            segments,
            lanes,
            crossings: self.crossings,
            turnings: self.turnings,
            signals: self.signals,
            outgoing,
            spatial_idx,
        })
    }
}
