//! Live canvas state: the overlay plus the rendered node and edge records.

use crate::id::{CanvasId, ElementId};
use crate::model::{CanvasEdge, CanvasNode};
use crate::overlay::Overlay;
use std::collections::HashMap;

/// Everything the history manager snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanvasState {
    pub overlay: Overlay,
    pub nodes: HashMap<CanvasId, CanvasNode>,
    pub edges: HashMap<CanvasId, CanvasEdge>,
}

impl CanvasState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Structural copy: every map, record and point list is duplicated, so
    /// the copy shares no mutable data with `self`.
    pub fn snapshot(&self) -> Self {
        Self {
            overlay: self.overlay.clone(),
            nodes: self
                .nodes
                .iter()
                .map(|(&id, node)| (id, node.clone()))
                .collect(),
            edges: self
                .edges
                .iter()
                .map(|(&id, edge)| (id, edge.clone()))
                .collect(),
        }
    }

    pub fn node_by_element(&self, node_id: ElementId) -> Option<&CanvasNode> {
        self.nodes.values().find(|n| n.node_id == node_id)
    }

    pub fn edge_by_element(&self, edge_id: ElementId) -> Option<&CanvasEdge> {
        self.edges.values().find(|e| e.edge_id == edge_id)
    }

    /// Canvas ids of edges attached to any of `node_ids`.
    pub fn edges_touching(&self, node_ids: &[ElementId]) -> Vec<CanvasId> {
        let mut ids: Vec<CanvasId> = self
            .edges
            .values()
            .filter(|e| node_ids.iter().any(|&n| e.touches(n)))
            .map(|e| e.canvas_id)
            .collect();
        ids.sort();
        ids
    }

    /// Lowest bottom edge of any node, or `None` on an empty canvas.
    pub fn lowest_node_bottom(&self) -> Option<f64> {
        self.nodes.values().map(|n| n.y + n.h).reduce(f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Color, CurveType, EdgeArrows, EdgeOrigin, ShapeColor, ShapeKind};
    use kurbo::Point;
    use smallvec::smallvec;

    fn node(id: &str, y: f64) -> CanvasNode {
        CanvasNode {
            canvas_id: CanvasId::fresh(),
            node_id: ElementId::intern(id),
            shape: ShapeKind::Box,
            x: 0.0,
            y,
            w: 160.0,
            h: 70.0,
            label: id.to_string(),
            color: ShapeColor::Blue,
        }
    }

    #[test]
    fn snapshot_is_independent() {
        let mut state = CanvasState::new();
        let n = node("cs_a", 0.0);
        let nid = n.canvas_id;
        state.nodes.insert(nid, n);
        let e = CanvasEdge {
            canvas_id: CanvasId::fresh(),
            edge_id: ElementId::intern("cs_a->cs_b"),
            source: ElementId::intern("cs_a"),
            target: ElementId::intern("cs_b"),
            start: Point::ZERO,
            end: Point::new(0.0, 100.0),
            waypoints: smallvec![Point::new(0.0, 50.0)],
            curve_type: CurveType::Bezier,
            label: String::new(),
            color: Color::EDGE_DEFAULT,
            origin: EdgeOrigin::Structural,
            arrows: EdgeArrows::default(),
            raw_points: None,
            smoothing: None,
        };
        let eid = e.canvas_id;
        state.edges.insert(eid, e);

        let snap = state.snapshot();
        state.nodes.get_mut(&nid).unwrap().x = 999.0;
        state.edges.get_mut(&eid).unwrap().waypoints[0].x = 999.0;

        assert_eq!(snap.nodes[&nid].x, 0.0);
        assert_eq!(snap.edges[&eid].waypoints[0].x, 0.0);
    }

    #[test]
    fn lowest_bottom_of_empty_canvas_is_none() {
        let mut state = CanvasState::new();
        assert_eq!(state.lowest_node_bottom(), None);
        let a = node("cs_low", 200.0);
        let b = node("cs_high", 10.0);
        state.nodes.insert(a.canvas_id, a);
        state.nodes.insert(b.canvas_id, b);
        assert_eq!(state.lowest_node_bottom(), Some(270.0));
    }
}
