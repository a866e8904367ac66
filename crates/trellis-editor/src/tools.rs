//! Freehand drawing tool.
//!
//! Collects a raw pointer stroke and, on release, turns it into a manual
//! edge: smoothed waypoints, ends snapped onto the perimeter of the nearest
//! node within reach.

use crate::config::EditorConfig;
use crate::input::InputEvent;
use crate::sync::{CanvasMutation, stroke_waypoints};
use trellis_core::canvas::CanvasState;
use trellis_core::model::*;
use trellis_core::tracking::{Attachment, compute_endpoints, nearest_node};
use trellis_core::{CanvasId, ElementId, Point};

pub struct FreehandTool {
    points: Vec<Point>,
    drawing: bool,
    max_points: usize,
    smoothing: f64,
    snap_threshold: f64,
    color: Color,
}

impl Default for FreehandTool {
    fn default() -> Self {
        Self::new(&EditorConfig::default())
    }
}

impl FreehandTool {
    pub fn new(config: &EditorConfig) -> Self {
        Self {
            points: Vec::new(),
            drawing: false,
            max_points: config.max_stroke_points,
            smoothing: config.default_smoothing,
            snap_threshold: config.snap_threshold,
            color: config.edge_color,
        }
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    /// Raw points of the stroke in progress, for live preview.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Abandon the stroke in progress.
    pub fn cancel(&mut self) {
        if self.drawing {
            log::debug!("freehand stroke cancelled ({} points)", self.points.len());
        }
        self.points.clear();
        self.drawing = false;
    }

    /// Feed one input event. Returns a mutation when a stroke completes.
    /// `zoom` scales the snap threshold so it stays constant on screen.
    pub fn handle(
        &mut self,
        event: &InputEvent,
        canvas: &CanvasState,
        zoom: f64,
    ) -> Option<CanvasMutation> {
        if matches!(event, InputEvent::PointerLeave) {
            self.cancel();
            return None;
        }
        let at = event.position()?;
        match event {
            InputEvent::PointerDown { .. } => {
                self.points.clear();
                self.points.push(at);
                self.drawing = true;
                None
            }
            _ if !self.drawing => None,
            InputEvent::PointerMove { .. } => {
                self.record(at);
                None
            }
            InputEvent::PointerUp { .. } => {
                self.record(at);
                self.drawing = false;
                let raw = std::mem::take(&mut self.points);
                if raw.len() < 2 {
                    return None;
                }
                Some(self.finish(raw, canvas, zoom))
            }
            _ => None,
        }
    }

    fn record(&mut self, point: Point) {
        if self.points.len() >= self.max_points || self.points.last() == Some(&point) {
            return;
        }
        self.points.push(point);
    }

    fn finish(&self, raw: Vec<Point>, canvas: &CanvasState, zoom: f64) -> CanvasMutation {
        let zoom = if zoom.is_finite() && zoom > 0.0 { zoom } else { 1.0 };
        let reach = self.snap_threshold / zoom;
        let first = raw[0];
        let last = raw[raw.len() - 1];
        let source = nearest_node(canvas, first, reach);
        let target = nearest_node(canvas, last, reach);

        let mut edge = CanvasEdge {
            canvas_id: CanvasId::fresh(),
            edge_id: ElementId::with_prefix("freehand"),
            source: source.map_or_else(ElementId::none, |n| n.node_id),
            target: target.map_or_else(ElementId::none, |n| n.node_id),
            start: first,
            end: last,
            waypoints: stroke_waypoints(&raw, self.smoothing),
            curve_type: CurveType::Freehand,
            label: String::new(),
            color: self.color,
            origin: EdgeOrigin::Manual,
            arrows: EdgeArrows::default(),
            raw_points: None,
            smoothing: Some(self.smoothing),
        };
        let (start, end) = compute_endpoints(
            &edge,
            source.map(Attachment::from),
            target.map(Attachment::from),
        );
        edge.start = start;
        edge.end = end;

        log::debug!(
            "freehand stroke {}: {} raw points, {} waypoints",
            edge.edge_id,
            raw.len(),
            edge.waypoints.len()
        );
        edge.raw_points = Some(raw);
        CanvasMutation::AddManualEdge(Box::new(edge))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn canvas_with_box(x: f64, y: f64) -> (CanvasState, ElementId) {
        let mut canvas = CanvasState::new();
        let node_id = ElementId::intern("tool_box");
        let canvas_id = CanvasId::fresh();
        canvas.nodes.insert(
            canvas_id,
            CanvasNode {
                canvas_id,
                node_id,
                shape: ShapeKind::Box,
                x,
                y,
                w: 100.0,
                h: 60.0,
                label: "Box".into(),
                color: ShapeColor::Blue,
            },
        );
        (canvas, node_id)
    }

    fn stroke(tool: &mut FreehandTool, canvas: &CanvasState, pts: &[(f64, f64)]) -> Option<CanvasMutation> {
        let (first, rest) = pts.split_first()?;
        tool.handle(&InputEvent::pointer_down(first.0, first.1), canvas, 1.0);
        let (last, middle) = rest.split_last()?;
        for p in middle {
            tool.handle(&InputEvent::pointer_move(p.0, p.1), canvas, 1.0);
        }
        tool.handle(&InputEvent::pointer_up(last.0, last.1), canvas, 1.0)
    }

    #[test]
    fn stroke_becomes_manual_freehand_edge() {
        let canvas = CanvasState::new();
        let mut tool = FreehandTool::default();
        let m = stroke(&mut tool, &canvas, &[(0.0, 0.0), (40.0, 30.0), (80.0, 0.0)]).unwrap();
        let CanvasMutation::AddManualEdge(edge) = m else {
            panic!("expected AddManualEdge");
        };
        assert_eq!(edge.curve_type, CurveType::Freehand);
        assert_eq!(edge.origin, EdgeOrigin::Manual);
        assert_eq!(edge.arrows, EdgeArrows::default());
        assert!(edge.source.is_none());
        assert_eq!(edge.start, Point::new(0.0, 0.0));
        assert_eq!(edge.end, Point::new(80.0, 0.0));
        assert_eq!(edge.raw_points.as_ref().map(Vec::len), Some(3));
        assert_eq!(edge.smoothing, Some(0.5));
        assert!(edge.edge_id.as_str().starts_with("freehand::"));
    }

    #[test]
    fn stroke_end_snaps_to_nearby_node() {
        let (canvas, node_id) = canvas_with_box(200.0, 0.0);
        let mut tool = FreehandTool::default();
        // Ends 10px left of the box; box spans x 200..300, y 0..60.
        let m = stroke(&mut tool, &canvas, &[(0.0, 30.0), (100.0, 30.0), (190.0, 30.0)]).unwrap();
        let CanvasMutation::AddManualEdge(edge) = m else {
            panic!("expected AddManualEdge");
        };
        assert_eq!(edge.target, node_id);
        assert!(edge.source.is_none());
        assert!((edge.end.x - 200.0).abs() < 1e-9, "{:?}", edge.end);
        assert!((edge.end.y - 30.0).abs() < 1e-9, "{:?}", edge.end);
    }

    #[test]
    fn snap_reach_shrinks_when_zoomed_in() {
        let (canvas, _) = canvas_with_box(200.0, 0.0);
        let mut tool = FreehandTool::default();
        tool.handle(&InputEvent::pointer_down(0.0, 30.0), &canvas, 4.0);
        tool.handle(&InputEvent::pointer_move(100.0, 30.0), &canvas, 4.0);
        let m = tool
            .handle(&InputEvent::pointer_up(190.0, 30.0), &canvas, 4.0)
            .unwrap();
        let CanvasMutation::AddManualEdge(edge) = m else {
            panic!("expected AddManualEdge");
        };
        // 20px on screen is 5px on canvas at 4x; the 10px gap is out of reach.
        assert!(edge.target.is_none());
    }

    #[test]
    fn pointer_leave_discards_stroke() {
        let canvas = CanvasState::new();
        let mut tool = FreehandTool::default();
        tool.handle(&InputEvent::pointer_down(0.0, 0.0), &canvas, 1.0);
        tool.handle(&InputEvent::pointer_move(10.0, 10.0), &canvas, 1.0);
        assert!(tool.is_drawing());
        tool.handle(&InputEvent::PointerLeave, &canvas, 1.0);
        assert!(!tool.is_drawing());
        assert!(tool.points().is_empty());
        assert_eq!(
            tool.handle(&InputEvent::pointer_up(20.0, 20.0), &canvas, 1.0),
            None
        );
    }

    #[test]
    fn single_point_stroke_is_ignored() {
        let canvas = CanvasState::new();
        let mut tool = FreehandTool::default();
        tool.handle(&InputEvent::pointer_down(5.0, 5.0), &canvas, 1.0);
        assert_eq!(
            tool.handle(&InputEvent::pointer_up(5.0, 5.0), &canvas, 1.0),
            None
        );
    }

    #[test]
    fn raw_points_are_capped() {
        let config = EditorConfig {
            max_stroke_points: 10,
            ..EditorConfig::default()
        };
        let canvas = CanvasState::new();
        let mut tool = FreehandTool::new(&config);
        tool.handle(&InputEvent::pointer_down(0.0, 0.0), &canvas, 1.0);
        for i in 1..100 {
            tool.handle(&InputEvent::pointer_move(i as f64, 0.0), &canvas, 1.0);
        }
        assert_eq!(tool.points().len(), 10);
    }
}
