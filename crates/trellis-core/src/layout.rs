//! Auto-layout.
//!
//! [`LayoutEngine`] is the seam to whatever computes pixel positions for a
//! graph. [`LayeredLayout`] is a small built-in layered engine: longest-path
//! ranking (cycles broken deterministically), one barycenter ordering sweep,
//! rank-centered placement and orthogonal bend points.

use crate::id::ElementId;
use crate::model::{Direction, Graph, LayoutEdge, LayoutNode, LayoutResult};
use crate::shape::port_toward;
use kurbo::{Point, Rect};
use petgraph::Direction::{Incoming, Outgoing};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Computes node positions and edge routes for a graph.
pub trait LayoutEngine {
    fn layout(&self, graph: &Graph) -> Result<LayoutResult, String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayeredLayoutConfig {
    pub node_width: f64,
    pub node_height: f64,
    /// Gap between neighbors within a rank.
    pub node_spacing: f64,
    /// Gap between consecutive ranks.
    pub layer_spacing: f64,
}

impl Default for LayeredLayoutConfig {
    fn default() -> Self {
        Self {
            node_width: 160.0,
            node_height: 70.0,
            node_spacing: 50.0,
            layer_spacing: 80.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LayeredLayout {
    pub config: LayeredLayoutConfig,
}

impl LayeredLayout {
    pub fn new(config: LayeredLayoutConfig) -> Self {
        Self { config }
    }
}

impl LayoutEngine for LayeredLayout {
    fn layout(&self, graph: &Graph) -> Result<LayoutResult, String> {
        let mut dag: DiGraph<ElementId, ElementId> = DiGraph::new();
        let mut index: HashMap<ElementId, NodeIndex> = HashMap::new();
        for node in &graph.nodes {
            if index.insert(node.id, dag.add_node(node.id)).is_some() {
                return Err(format!("duplicate node id '{}'", node.id));
            }
        }
        for edge in &graph.edges {
            if let (Some(&s), Some(&t)) = (index.get(&edge.source), index.get(&edge.target)) {
                dag.add_edge(s, t, edge.id);
            }
        }

        let ranks = assign_ranks(&dag);
        let layers = order_layers(&dag, &ranks);
        let frame = Frame::new(graph.direction, &self.config, &layers);

        let mut result = LayoutResult::default();
        let mut boxes: HashMap<NodeIndex, Box2> = HashMap::new();
        for (rank, layer) in layers.iter().enumerate() {
            for (slot, &idx) in layer.iter().enumerate() {
                let b = frame.node_box(rank, slot, layer.len());
                let (x, y, width, height) = frame.to_screen_rect(&b);
                result.nodes.push(LayoutNode {
                    id: dag[idx],
                    x,
                    y,
                    width,
                    height,
                });
                boxes.insert(idx, b);
            }
        }
        // Emit nodes in declaration order.
        result
            .nodes
            .sort_by_key(|n| index.get(&n.id).map_or(usize::MAX, |i| i.index()));

        for e in dag.edge_indices() {
            let Some((s, t)) = dag.edge_endpoints(e) else {
                continue;
            };
            let bend_points = match (boxes.get(&s), boxes.get(&t)) {
                (Some(sb), Some(tb)) if s != t => {
                    let mut points: Vec<Point> = route(sb, tb)
                        .into_iter()
                        .map(|(c, f)| frame.to_screen(c, f))
                        .collect();
                    snap_ends_to_ports(&mut points, frame.screen_rect(sb), frame.screen_rect(tb));
                    points
                }
                _ => Vec::new(),
            };
            result.edges.push(LayoutEdge {
                id: dag[e],
                source: dag[s],
                target: dag[t],
                bend_points,
            });
        }

        let (width, height) = frame.extent();
        result.width = width;
        result.height = height;
        log::debug!(
            "layered layout: {} nodes in {} ranks, {:.0}x{:.0}",
            result.nodes.len(),
            layers.len(),
            width,
            height
        );
        Ok(result)
    }
}

// ─── Ranking ─────────────────────────────────────────────────────────────

/// Longest-path ranks via Kahn's algorithm. When only cycles remain, the
/// unranked node with the fewest unranked predecessors (first in declaration
/// order on ties) is released and its remaining in-edges are ignored.
fn assign_ranks(dag: &DiGraph<ElementId, ElementId>) -> Vec<usize> {
    let n = dag.node_count();
    let mut in_degree: Vec<usize> = dag
        .node_indices()
        .map(|v| dag.neighbors_directed(v, Incoming).filter(|&u| u != v).count())
        .collect();
    let mut ranks = vec![0usize; n];
    let mut done = vec![false; n];
    let mut queue: Vec<NodeIndex> = dag.node_indices().filter(|v| in_degree[v.index()] == 0).collect();
    let mut processed = 0;

    while processed < n {
        if queue.is_empty() {
            let breaker = dag
                .node_indices()
                .filter(|v| !done[v.index()])
                .min_by_key(|v| (in_degree[v.index()], v.index()));
            match breaker {
                Some(v) => {
                    in_degree[v.index()] = 0;
                    queue.push(v);
                }
                None => break,
            }
        }
        let u = queue.remove(0);
        if done[u.index()] {
            continue;
        }
        done[u.index()] = true;
        processed += 1;

        let mut successors: Vec<NodeIndex> = dag.neighbors_directed(u, Outgoing).collect();
        successors.sort();
        successors.dedup();
        for v in successors {
            if v == u || done[v.index()] {
                continue;
            }
            let parallel = dag.edges_connecting(u, v).count();
            ranks[v.index()] = ranks[v.index()].max(ranks[u.index()] + 1);
            in_degree[v.index()] = in_degree[v.index()].saturating_sub(parallel);
            if in_degree[v.index()] == 0 {
                queue.push(v);
            }
        }
    }
    ranks
}

/// Bucket nodes by rank, then reorder each rank by the mean slot of its
/// predecessors in the rank above (one top-down sweep).
fn order_layers(dag: &DiGraph<ElementId, ElementId>, ranks: &[usize]) -> Vec<Vec<NodeIndex>> {
    let depth = ranks.iter().copied().max().map_or(0, |m| m + 1);
    let mut layers: Vec<Vec<NodeIndex>> = vec![Vec::new(); depth];
    for v in dag.node_indices() {
        layers[ranks[v.index()]].push(v);
    }

    for r in 1..layers.len() {
        let slots: HashMap<NodeIndex, usize> =
            layers[r - 1].iter().enumerate().map(|(i, &v)| (v, i)).collect();
        let mut keyed: Vec<(f64, usize, NodeIndex)> = layers[r]
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let preds: HashSet<usize> = dag
                    .neighbors_directed(v, Incoming)
                    .filter_map(|u| slots.get(&u).copied())
                    .collect();
                let key = if preds.is_empty() {
                    i as f64
                } else {
                    preds.iter().sum::<usize>() as f64 / preds.len() as f64
                };
                (key, i, v)
            })
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        layers[r] = keyed.into_iter().map(|(_, _, v)| v).collect();
    }
    layers
}

// ─── Geometry ────────────────────────────────────────────────────────────

/// A node box in flow space: `c` runs across ranks, `f` along the flow.
#[derive(Debug, Clone, Copy)]
struct Box2 {
    c0: f64,
    c1: f64,
    f0: f64,
    f1: f64,
}

impl Box2 {
    fn c_mid(&self) -> f64 {
        (self.c0 + self.c1) / 2.0
    }

    fn f_mid(&self) -> f64 {
        (self.f0 + self.f1) / 2.0
    }
}

/// Pin the route's ends to the cardinal ports facing the adjacent bend.
fn snap_ends_to_ports(points: &mut [Point], source: Rect, target: Rect) {
    let n = points.len();
    if n < 2 {
        return;
    }
    points[0] = port_toward(source, points[1]).1;
    points[n - 1] = port_toward(target, points[n - 2]).1;
}

/// `[source side, bends..., target side]` in flow space.
fn route(s: &Box2, t: &Box2) -> Vec<(f64, f64)> {
    if s.f0 == t.f0 {
        // Same rank: connect facing sides.
        let (sc, tc) = if s.c1 <= t.c0 { (s.c1, t.c0) } else { (s.c0, t.c1) };
        return vec![(sc, s.f_mid()), (tc, t.f_mid())];
    }
    let (sf, tf) = if s.f0 < t.f0 { (s.f1, t.f0) } else { (s.f0, t.f1) };
    let (sc, tc) = (s.c_mid(), t.c_mid());
    if sc == tc {
        return vec![(sc, sf), (tc, tf)];
    }
    let mid = (sf + tf) / 2.0;
    vec![(sc, sf), (sc, mid), (tc, mid), (tc, tf)]
}

/// Maps flow space onto screen space for one direction.
struct Frame {
    direction: Direction,
    cross_size: f64,
    flow_size: f64,
    node_spacing: f64,
    layer_pitch: f64,
    cross_total: f64,
    flow_total: f64,
}

impl Frame {
    fn new(direction: Direction, config: &LayeredLayoutConfig, layers: &[Vec<NodeIndex>]) -> Self {
        let (cross_size, flow_size) = if is_horizontal(direction) {
            (config.node_height, config.node_width)
        } else {
            (config.node_width, config.node_height)
        };
        let widest = layers.iter().map(Vec::len).max().unwrap_or(0);
        let cross_total = span(widest, cross_size, config.node_spacing);
        let flow_total = span(layers.len(), flow_size, config.layer_spacing);
        Self {
            direction,
            cross_size,
            flow_size,
            node_spacing: config.node_spacing,
            layer_pitch: flow_size + config.layer_spacing,
            cross_total,
            flow_total,
        }
    }

    fn node_box(&self, rank: usize, slot: usize, rank_len: usize) -> Box2 {
        let offset = (self.cross_total - span(rank_len, self.cross_size, self.node_spacing)) / 2.0;
        let c0 = offset + slot as f64 * (self.cross_size + self.node_spacing);
        let f0 = rank as f64 * self.layer_pitch;
        Box2 {
            c0,
            c1: c0 + self.cross_size,
            f0,
            f1: f0 + self.flow_size,
        }
    }

    fn to_screen(&self, c: f64, f: f64) -> Point {
        match self.direction {
            Direction::TD | Direction::TB => Point::new(c, f),
            Direction::BT => Point::new(c, self.flow_total - f),
            Direction::LR => Point::new(f, c),
            Direction::RL => Point::new(self.flow_total - f, c),
        }
    }

    fn screen_rect(&self, b: &Box2) -> Rect {
        let (x, y, w, h) = self.to_screen_rect(b);
        Rect::new(x, y, x + w, y + h)
    }

    fn to_screen_rect(&self, b: &Box2) -> (f64, f64, f64, f64) {
        let p = self.to_screen(b.c0, b.f0);
        let q = self.to_screen(b.c1, b.f1);
        (p.x.min(q.x), p.y.min(q.y), (q.x - p.x).abs(), (q.y - p.y).abs())
    }

    fn extent(&self) -> (f64, f64) {
        if is_horizontal(self.direction) {
            (self.flow_total, self.cross_total)
        } else {
            (self.cross_total, self.flow_total)
        }
    }
}

fn is_horizontal(direction: Direction) -> bool {
    matches!(direction, Direction::LR | Direction::RL)
}

fn span(count: usize, size: f64, gap: f64) -> f64 {
    if count == 0 {
        0.0
    } else {
        count as f64 * size + (count - 1) as f64 * gap
    }
}
