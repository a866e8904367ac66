//! Editor tuning knobs.

use serde::{Deserialize, Serialize};
use trellis_core::model::{Color, ShapeColor};
use trellis_core::{Point, Vec2};

/// Tunables for the editor. Missing fields in a serialized config fall back
/// to [`EditorConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub history_depth: usize,
    /// Smoothing level for new freehand strokes, `0.0..=1.0`.
    pub default_smoothing: f64,
    /// Snap distance for stroke ends, in screen pixels (divided by zoom).
    pub snap_threshold: f64,
    pub max_stroke_points: usize,
    pub default_node_size: (f64, f64),
    pub min_node_size: (f64, f64),
    pub staging_columns: usize,
    /// Left edge of the "place all" grid.
    pub staging_origin_x: f64,
    /// Gap between the lowest canvas node and the "place all" grid.
    pub staging_gap_y: f64,
    pub staging_pitch: (f64, f64),
    pub edge_color: Color,
    pub node_color: ShapeColor,
}

impl Default for EditorConfig {
    /// History 50 deep; smoothing 0.5; 20 px snap; 2000-point strokes;
    /// 160x70 nodes (min 60x40); 3-column staging grid at x 50, 60 px below
    /// the canvas, 200x100 pitch; `#374151` edges, blue nodes.
    fn default() -> Self {
        Self {
            history_depth: 50,
            default_smoothing: 0.5,
            snap_threshold: 20.0,
            max_stroke_points: 2000,
            default_node_size: (160.0, 70.0),
            min_node_size: (60.0, 40.0),
            staging_columns: 3,
            staging_origin_x: 50.0,
            staging_gap_y: 60.0,
            staging_pitch: (200.0, 100.0),
            edge_color: Color::EDGE_DEFAULT,
            node_color: ShapeColor::Blue,
        }
    }
}

impl EditorConfig {
    /// Top-left of the "place all" grid given the lowest node bottom.
    pub fn staging_origin(&self, lowest_bottom: Option<f64>) -> Point {
        Point::new(
            self.staging_origin_x,
            lowest_bottom.unwrap_or(0.0) + self.staging_gap_y,
        )
    }

    pub fn staging_pitch(&self) -> Vec2 {
        Vec2::new(self.staging_pitch.0, self.staging_pitch.1)
    }
}
