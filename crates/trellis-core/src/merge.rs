//! Reconciliation: combine a parsed graph, the user's overlay and a fresh
//! auto-layout into one consistent set of placements.
//!
//! Placement priority per node:
//!
//! 1. overlay entry (the user's placement always wins)
//! 2. layout result (provisional placement for a brand-new node)
//! 3. neither: the node is staged and never auto-placed
//!
//! [`merge`] is pure. Callers apply the returned sets to the live canvas and
//! purge the overlay in the same pass.

use crate::id::ElementId;
use crate::model::{
    Color, CurveType, EdgeArrows, Graph, GraphNode, LayoutResult, ShapeColor, ShapeKind,
    Waypoints,
};
use crate::overlay::Overlay;
use kurbo::Rect;
use std::collections::{HashMap, HashSet};

/// Where a positioned node's geometry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementSource {
    Overlay,
    Layout,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionedNode {
    pub node_id: ElementId,
    pub label: String,
    pub shape: ShapeKind,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub color: ShapeColor,
    pub source: PlacementSource,
}

impl PositionedNode {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.w, self.y + self.h)
    }
}

/// A graph edge with both endpoints present, plus its routing.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedEdge {
    pub edge_id: ElementId,
    pub source: ElementId,
    pub target: ElementId,
    pub label: String,
    pub waypoints: Waypoints,
    pub curve_type: CurveType,
    /// Styling carried over from the overlay entry, if any.
    pub color: Option<Color>,
    pub arrows: Option<EdgeArrows>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeResult {
    pub positioned_nodes: Vec<PositionedNode>,
    pub staged_nodes: Vec<GraphNode>,
    pub edges: Vec<MergedEdge>,
    /// Overlay node keys absent from the graph, sorted.
    pub removed_node_ids: Vec<ElementId>,
    /// Overlay edge keys absent from the graph, sorted. Hand-drawn edges are
    /// never graph-derived and never reported here.
    pub removed_edge_ids: Vec<ElementId>,
}

/// Merge `graph` with `overlay` and `layout`. Inputs are not modified.
///
/// `removed_edge_ids` covers graph-derived overlay entries only. Manual edge
/// entries have no graph counterpart and stay in the overlay until the user
/// deletes them.
pub fn merge(graph: &Graph, overlay: &Overlay, layout: &LayoutResult) -> MergeResult {
    let layout_nodes: HashMap<ElementId, _> = layout.nodes.iter().map(|n| (n.id, n)).collect();
    let layout_edges: HashMap<ElementId, _> = layout.edges.iter().map(|e| (e.id, e)).collect();

    let mut result = MergeResult::default();

    for node in &graph.nodes {
        if let Some(entry) = overlay.nodes.get(&node.id) {
            result.positioned_nodes.push(PositionedNode {
                node_id: node.id,
                label: node.label.clone(),
                shape: node.shape,
                x: entry.x,
                y: entry.y,
                w: entry.w,
                h: entry.h,
                color: entry.color.unwrap_or_default(),
                source: PlacementSource::Overlay,
            });
        } else if let Some(placed) = layout_nodes.get(&node.id) {
            result.positioned_nodes.push(PositionedNode {
                node_id: node.id,
                label: node.label.clone(),
                shape: node.shape,
                x: placed.x,
                y: placed.y,
                w: placed.width,
                h: placed.height,
                color: ShapeColor::default(),
                source: PlacementSource::Layout,
            });
        } else {
            result.staged_nodes.push(node.clone());
        }
    }

    let node_ids = graph.node_ids();
    for edge in &graph.edges {
        if !node_ids.contains(&edge.source) || !node_ids.contains(&edge.target) {
            continue;
        }

        let (waypoints, curve_type, color, arrows) = match overlay.edges.get(&edge.id) {
            Some(entry) => (
                entry.waypoints.clone(),
                entry.curve_type,
                entry.color,
                entry.arrows,
            ),
            None => {
                let (waypoints, curve_type) = layout_edges
                    .get(&edge.id)
                    .map(|e| route_from_bends(&e.bend_points))
                    .unwrap_or_default();
                (waypoints, curve_type, None, None)
            }
        };

        result.edges.push(MergedEdge {
            edge_id: edge.id,
            source: edge.source,
            target: edge.target,
            label: edge.label.clone(),
            waypoints,
            curve_type,
            color,
            arrows,
        });
    }

    (result.removed_node_ids, result.removed_edge_ids) = stale_overlay_ids(graph, overlay);

    log::debug!(
        "merge: {} positioned, {} staged, {} edges, {} nodes removed, {} edges removed",
        result.positioned_nodes.len(),
        result.staged_nodes.len(),
        result.edges.len(),
        result.removed_node_ids.len(),
        result.removed_edge_ids.len()
    );

    result
}

/// Interior bend points routed orthogonally, or the empty bezier fallback
/// when the layout gives no interior points.
fn route_from_bends(bends: &[kurbo::Point]) -> (Waypoints, CurveType) {
    if bends.len() >= 3 {
        let interior = bends[1..bends.len() - 1].iter().copied().collect();
        (interior, CurveType::Orthogonal)
    } else {
        (Waypoints::new(), CurveType::Bezier)
    }
}

/// Overlay node and edge keys that `graph` no longer names, both sorted.
/// Manual edge entries are never stale.
pub fn stale_overlay_ids(graph: &Graph, overlay: &Overlay) -> (Vec<ElementId>, Vec<ElementId>) {
    let edge_ids: HashSet<ElementId> = graph
        .edge_ids()
        .into_iter()
        .chain(overlay.manual_edge_ids())
        .collect();
    (
        stale_keys(overlay.nodes.keys().copied(), &graph.node_ids()),
        stale_keys(overlay.edges.keys().copied(), &edge_ids),
    )
}

fn stale_keys(
    keys: impl Iterator<Item = ElementId>,
    live: &HashSet<ElementId>,
) -> Vec<ElementId> {
    let mut stale: Vec<ElementId> = keys.filter(|id| !live.contains(id)).collect();
    stale.sort();
    stale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Direction, LayoutEdge, LayoutNode};
    use crate::overlay::{EdgeOverlay, NodeOverlayPatch};
    use kurbo::Point;
    use pretty_assertions::assert_eq;

    fn two_nodes() -> Graph {
        Graph::new(Direction::TD)
            .with_node("A", "Start", ShapeKind::Box)
            .with_node("B", "End", ShapeKind::Diamond)
            .with_edge("A", "B", "")
    }

    fn layout_ab(bends: Vec<Point>) -> LayoutResult {
        LayoutResult {
            nodes: vec![
                LayoutNode {
                    id: ElementId::intern("A"),
                    x: 0.0,
                    y: 0.0,
                    width: 160.0,
                    height: 70.0,
                },
                LayoutNode {
                    id: ElementId::intern("B"),
                    x: 0.0,
                    y: 150.0,
                    width: 160.0,
                    height: 70.0,
                },
            ],
            edges: vec![LayoutEdge {
                id: ElementId::intern("A->B"),
                source: ElementId::intern("A"),
                target: ElementId::intern("B"),
                bend_points: bends,
            }],
            width: 160.0,
            height: 220.0,
        }
    }

    #[test]
    fn layout_places_nodes_without_overlay() {
        let result = merge(&two_nodes(), &Overlay::new(), &layout_ab(vec![]));
        assert_eq!(result.positioned_nodes.len(), 2);
        assert!(result.positioned_nodes.iter().all(|n| n.source == PlacementSource::Layout));
        assert_eq!(result.positioned_nodes[1].y, 150.0);
        assert!(result.staged_nodes.is_empty());
    }

    #[test]
    fn overlay_wins_over_layout() {
        let mut overlay = Overlay::new();
        overlay.update_node(ElementId::intern("A"), NodeOverlayPatch::rect(500.0, 600.0, 200.0, 80.0));
        let result = merge(&two_nodes(), &overlay, &layout_ab(vec![]));
        let a = &result.positioned_nodes[0];
        assert_eq!((a.x, a.y, a.w, a.h), (500.0, 600.0, 200.0, 80.0));
        assert_eq!(a.source, PlacementSource::Overlay);
    }

    #[test]
    fn nodes_without_any_position_are_staged() {
        let graph = two_nodes().with_node("C", "New", ShapeKind::Circle);
        let result = merge(&graph, &Overlay::new(), &layout_ab(vec![]));
        assert_eq!(result.staged_nodes.len(), 1);
        assert_eq!(result.staged_nodes[0].id.as_str(), "C");
    }

    #[test]
    fn three_bend_points_route_orthogonally() {
        let bends = vec![
            Point::new(80.0, 70.0),
            Point::new(80.0, 110.0),
            Point::new(80.0, 150.0),
        ];
        let result = merge(&two_nodes(), &Overlay::new(), &layout_ab(bends));
        assert_eq!(result.edges[0].curve_type, CurveType::Orthogonal);
        assert_eq!(result.edges[0].waypoints.as_slice(), &[Point::new(80.0, 110.0)]);
    }

    #[test]
    fn overlay_routing_wins_over_layout() {
        let mut overlay = Overlay::new();
        overlay.edges.insert(
            ElementId::intern("A->B"),
            EdgeOverlay {
                curve_type: CurveType::Straight,
                ..Default::default()
            },
        );
        let bends = vec![Point::ZERO, Point::new(1.0, 1.0), Point::new(2.0, 2.0)];
        let result = merge(&two_nodes(), &overlay, &layout_ab(bends));
        assert_eq!(result.edges[0].curve_type, CurveType::Straight);
        assert!(result.edges[0].waypoints.is_empty());
    }

    #[test]
    fn dangling_edges_are_dropped() {
        let mut graph = two_nodes();
        graph.nodes.retain(|n| n.id.as_str() != "B");
        let result = merge(&graph, &Overlay::new(), &layout_ab(vec![]));
        assert!(result.edges.is_empty());
    }

    #[test]
    fn manual_edges_are_not_removed() {
        let mut overlay = Overlay::new();
        overlay.add_manual_edge(ElementId::intern("freehand::merge"), EdgeOverlay::default());
        overlay.update_edge(ElementId::intern("Z->Y"), Default::default());
        let result = merge(&two_nodes(), &overlay, &layout_ab(vec![]));
        assert_eq!(result.removed_edge_ids, vec![ElementId::intern("Z->Y")]);
    }
}
