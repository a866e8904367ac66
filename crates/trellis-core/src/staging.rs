//! Staging tray: graph nodes with no known position, waiting for the user
//! to place them.

use crate::model::GraphNode;
use crate::overlay::{DEFAULT_NODE_H, DEFAULT_NODE_W};
use kurbo::{Point, Vec2};
use std::time::{SystemTime, UNIX_EPOCH};

/// Grid pitch of [`placement_positions`] when the caller has no preference:
/// one default node plus a 30 px gutter.
pub const DEFAULT_PITCH: Vec2 = Vec2::new(DEFAULT_NODE_W + 30.0, DEFAULT_NODE_H + 30.0);

#[derive(Debug, Clone, PartialEq)]
pub struct StagedNode {
    pub node: GraphNode,
    /// Milliseconds since the Unix epoch when the node first entered the tray.
    pub staged_at: u64,
}

/// Current time in milliseconds, for [`StagedNode::staged_at`].
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Replace the tray with `nodes`. Nodes already in `previous` keep their
/// first timestamp; new ones are stamped `now`. Order follows `nodes`.
pub fn restage(previous: &[StagedNode], nodes: Vec<GraphNode>, now: u64) -> Vec<StagedNode> {
    nodes
        .into_iter()
        .map(|node| {
            let staged_at = previous
                .iter()
                .find(|s| s.node.id == node.id)
                .map_or(now, |s| s.staged_at);
            StagedNode { node, staged_at }
        })
        .collect()
}

/// Row-major grid of `count` positions starting at `origin`.
pub fn placement_positions(count: usize, origin: Point, columns: usize, pitch: Vec2) -> Vec<Point> {
    let columns = columns.max(1);
    (0..count)
        .map(|i| {
            let col = (i % columns) as f64;
            let row = (i / columns) as f64;
            Point::new(origin.x + col * pitch.x, origin.y + row * pitch.y)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ElementId;
    use crate::model::ShapeKind;
    use pretty_assertions::assert_eq;

    fn graph_node(id: &str) -> GraphNode {
        GraphNode {
            id: ElementId::intern(id),
            label: id.to_string(),
            shape: ShapeKind::Box,
        }
    }

    #[test]
    fn grid_wraps_after_columns() {
        let pts = placement_positions(4, Point::new(50.0, 100.0), 3, DEFAULT_PITCH);
        assert_eq!(
            pts,
            vec![
                Point::new(50.0, 100.0),
                Point::new(240.0, 100.0),
                Point::new(430.0, 100.0),
                Point::new(50.0, 200.0),
            ]
        );
    }

    #[test]
    fn zero_columns_is_one_column() {
        let pts = placement_positions(2, Point::ZERO, 0, Vec2::new(10.0, 10.0));
        assert_eq!(pts, vec![Point::ZERO, Point::new(0.0, 10.0)]);
    }

    #[test]
    fn restage_keeps_first_timestamps() {
        let first = restage(&[], vec![graph_node("st_a")], 100);
        let second = restage(&first, vec![graph_node("st_a"), graph_node("st_b")], 200);
        assert_eq!(second[0].staged_at, 100);
        assert_eq!(second[1].staged_at, 200);
    }
}
