//! Edge endpoint tracking: keep connector ends on the outlines of the shapes
//! they are attached to.

use crate::anchor::anchor_point;
use crate::canvas::CanvasState;
use crate::id::{CanvasId, ElementId};
use crate::model::{CanvasEdge, CanvasNode, ShapeKind};
use kurbo::{Point, Rect};
use std::collections::HashMap;

/// The geometry of a node an edge end is attached to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attachment {
    pub shape: ShapeKind,
    pub bounds: Rect,
}

impl From<&CanvasNode> for Attachment {
    fn from(node: &CanvasNode) -> Self {
        Self {
            shape: node.shape,
            bounds: node.bounds(),
        }
    }
}

/// Compute `(start, end)` for `edge`.
///
/// An attached end anchors toward the nearest waypoint lying outside its own
/// shape, else toward the other end (its node center, or its free point).
/// Unattached ends keep their current position.
pub fn compute_endpoints(
    edge: &CanvasEdge,
    source: Option<Attachment>,
    target: Option<Attachment>,
) -> (Point, Point) {
    let source_aim = source.map(|s| s.bounds.center()).unwrap_or(edge.start);
    let target_aim = target.map(|t| t.bounds.center()).unwrap_or(edge.end);

    let start = match source {
        Some(s) => {
            let toward = edge
                .waypoints
                .iter()
                .copied()
                .find(|&p| !s.bounds.contains(p))
                .unwrap_or(target_aim);
            anchor_point(s.shape, s.bounds, toward)
        }
        None => edge.start,
    };
    let end = match target {
        Some(t) => {
            let toward = edge
                .waypoints
                .iter()
                .rev()
                .copied()
                .find(|&p| !t.bounds.contains(p))
                .unwrap_or(source_aim);
            anchor_point(t.shape, t.bounds, toward)
        }
        None => edge.end,
    };
    (start, end)
}

/// Recompute endpoints of every edge attached to one of `node_ids`.
/// Returns the number of edges touched.
pub fn retrack_edges(state: &mut CanvasState, node_ids: &[ElementId]) -> usize {
    let attachments = attachments(state);
    let mut touched = 0;
    for edge in state.edges.values_mut() {
        if !node_ids.iter().any(|&n| edge.touches(n)) {
            continue;
        }
        retrack(edge, &attachments);
        touched += 1;
    }
    touched
}

/// Recompute the endpoints of one edge. Returns `false` for an unknown id.
pub fn retrack_edge(state: &mut CanvasState, id: CanvasId) -> bool {
    let attachments = attachments(state);
    match state.edges.get_mut(&id) {
        Some(edge) => {
            retrack(edge, &attachments);
            true
        }
        None => false,
    }
}

/// Recompute endpoints of every edge on the canvas.
pub fn retrack_all(state: &mut CanvasState) {
    let attachments = attachments(state);
    for edge in state.edges.values_mut() {
        retrack(edge, &attachments);
    }
}

/// The node a stroke end at `point` snaps to: any node whose bounds,
/// inflated by `max_dist`, contain the point; the closest center wins.
pub fn nearest_node(state: &CanvasState, point: Point, max_dist: f64) -> Option<&CanvasNode> {
    state
        .nodes
        .values()
        .filter(|n| n.bounds().inflate(max_dist, max_dist).contains(point))
        .min_by(|a, b| {
            let da = (a.center() - point).hypot2();
            let db = (b.center() - point).hypot2();
            da.total_cmp(&db).then(a.canvas_id.cmp(&b.canvas_id))
        })
}

fn attachments(state: &CanvasState) -> HashMap<ElementId, Attachment> {
    state
        .nodes
        .values()
        .map(|n| (n.node_id, Attachment::from(n)))
        .collect()
}

fn retrack(edge: &mut CanvasEdge, attachments: &HashMap<ElementId, Attachment>) {
    let source = attachments.get(&edge.source).copied();
    let target = attachments.get(&edge.target).copied();
    let (start, end) = compute_endpoints(edge, source, target);
    log::trace!(
        "retrack {}: ({:.1},{:.1}) -> ({:.1},{:.1})",
        edge.edge_id,
        start.x,
        start.y,
        end.x,
        end.y
    );
    edge.start = start;
    edge.end = end;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Color, CurveType, EdgeArrows, EdgeOrigin, ShapeColor, Waypoints};
    use smallvec::smallvec;

    fn node(id: &str, x: f64, y: f64) -> CanvasNode {
        CanvasNode {
            canvas_id: CanvasId::fresh(),
            node_id: ElementId::intern(id),
            shape: ShapeKind::Box,
            x,
            y,
            w: 100.0,
            h: 60.0,
            label: String::new(),
            color: ShapeColor::Blue,
        }
    }

    fn assert_near(a: Point, b: Point) {
        assert!((a - b).hypot() < 1e-9, "{a:?} != {b:?}");
    }

    fn edge(source: &str, target: &str, waypoints: Waypoints) -> CanvasEdge {
        CanvasEdge {
            canvas_id: CanvasId::fresh(),
            edge_id: ElementId::intern(&format!("{source}->{target}")),
            source: ElementId::intern(source),
            target: ElementId::intern(target),
            start: Point::ZERO,
            end: Point::ZERO,
            waypoints,
            curve_type: CurveType::Bezier,
            label: String::new(),
            color: Color::EDGE_DEFAULT,
            origin: EdgeOrigin::Structural,
            arrows: EdgeArrows::default(),
            raw_points: None,
            smoothing: None,
        }
    }

    #[test]
    fn vertical_pair_anchors_bottom_to_top() {
        let a = node("tr_a", 0.0, 0.0);
        let b = node("tr_b", 0.0, 200.0);
        let e = edge("tr_a", "tr_b", Waypoints::new());
        let (start, end) = compute_endpoints(&e, Some((&a).into()), Some((&b).into()));
        assert_near(start, Point::new(50.0, 60.0));
        assert_near(end, Point::new(50.0, 200.0));
    }

    #[test]
    fn waypoints_steer_the_anchor() {
        let a = node("tr_c", 0.0, 0.0);
        let b = node("tr_d", 0.0, 200.0);
        let e = edge("tr_c", "tr_d", smallvec![Point::new(400.0, 30.0), Point::new(400.0, 230.0)]);
        let (start, end) = compute_endpoints(&e, Some((&a).into()), Some((&b).into()));
        assert_near(start, Point::new(100.0, 30.0));
        assert_near(end, Point::new(100.0, 230.0));
    }

    #[test]
    fn unattached_ends_stay_put() {
        let a = node("tr_e", 0.0, 0.0);
        let mut e = edge("tr_e", "", Waypoints::new());
        e.target = ElementId::none();
        e.end = Point::new(50.0, 400.0);
        let (start, end) = compute_endpoints(&e, Some((&a).into()), None);
        assert_near(start, Point::new(50.0, 60.0));
        assert_near(end, Point::new(50.0, 400.0));
    }

    #[test]
    fn retrack_follows_moved_node() {
        let mut state = CanvasState::new();
        let a = node("tr_f", 0.0, 0.0);
        let b = node("tr_g", 0.0, 200.0);
        let (a_id, e) = (a.canvas_id, edge("tr_f", "tr_g", Waypoints::new()));
        let e_id = e.canvas_id;
        state.nodes.insert(a.canvas_id, a);
        state.nodes.insert(b.canvas_id, b);
        state.edges.insert(e_id, e);

        state.nodes.get_mut(&a_id).unwrap().x = 300.0;
        let touched = retrack_edges(&mut state, &[ElementId::intern("tr_f")]);
        assert_eq!(touched, 1);
        let moved = &state.edges[&e_id];
        assert!(moved.start.x > 300.0 && moved.start.x < 400.0);
        assert!(moved.end.x >= 0.0 && moved.end.x <= 100.0);
    }

    #[test]
    fn nearest_node_snaps_within_margin() {
        let mut state = CanvasState::new();
        let a = node("tr_snap_a", 0.0, 0.0);
        let b = node("tr_snap_b", 300.0, 0.0);
        let a_id = a.node_id;
        state.nodes.insert(a.canvas_id, a);
        state.nodes.insert(b.canvas_id, b);

        let hit = nearest_node(&state, Point::new(110.0, 30.0), 20.0);
        assert_eq!(hit.map(|n| n.node_id), Some(a_id));
        assert!(nearest_node(&state, Point::new(200.0, 30.0), 20.0).is_none());
    }
}
