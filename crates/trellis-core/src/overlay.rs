//! The overlay: user-authoritative placement and styling, keyed by the stable
//! textual ids of graph nodes and edges.
//!
//! Auto-layout only fills in what the overlay does not know. Once a node is
//! dragged or an edge is re-routed, the overlay entry wins on every later
//! reconciliation until the element leaves the graph text.

use crate::id::ElementId;
use crate::model::{Color, CurveType, EdgeArrows, EdgeOrigin, ShapeColor, Waypoints};
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The only overlay format version this crate reads and writes.
pub const OVERLAY_VERSION: u32 = 1;

/// Default node size for entries created without a prior placement.
pub const DEFAULT_NODE_W: f64 = 160.0;
pub const DEFAULT_NODE_H: f64 = 70.0;

// ─── Entries ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOverlay {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<ShapeColor>,
}

impl Default for NodeOverlay {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            w: DEFAULT_NODE_W,
            h: DEFAULT_NODE_H,
            color: None,
        }
    }
}

impl NodeOverlay {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.w, self.y + self.h)
    }
}

/// Partial update of a [`NodeOverlay`]; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOverlayPatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub w: Option<f64>,
    pub h: Option<f64>,
    pub color: Option<ShapeColor>,
}

impl NodeOverlayPatch {
    pub fn position(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    pub fn rect(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            w: Some(w),
            h: Some(h),
            color: None,
        }
    }
}

/// Stored routing for one edge. Hand-drawn edges additionally carry their
/// attachment, arrowheads, raw stroke and smoothing level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeOverlay {
    #[serde(default)]
    pub waypoints: Waypoints,
    #[serde(default)]
    pub curve_type: CurveType,
    #[serde(default)]
    pub origin: EdgeOrigin,
    #[serde(default, rename = "sourceId", skip_serializing_if = "Option::is_none")]
    pub source: Option<ElementId>,
    #[serde(default, rename = "targetId", skip_serializing_if = "Option::is_none")]
    pub target: Option<ElementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrows: Option<EdgeArrows>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_points: Option<Vec<Point>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoothing: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

impl Default for EdgeOverlay {
    fn default() -> Self {
        Self {
            waypoints: Waypoints::new(),
            curve_type: CurveType::Bezier,
            origin: EdgeOrigin::Structural,
            source: None,
            target: None,
            arrows: None,
            raw_points: None,
            smoothing: None,
            color: None,
        }
    }
}

impl EdgeOverlay {
    pub fn is_manual(&self) -> bool {
        self.origin == EdgeOrigin::Manual
    }
}

/// Partial update of an [`EdgeOverlay`]; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeOverlayPatch {
    pub waypoints: Option<Waypoints>,
    pub curve_type: Option<CurveType>,
    pub source: Option<ElementId>,
    pub target: Option<ElementId>,
    pub arrows: Option<EdgeArrows>,
    pub raw_points: Option<Vec<Point>>,
    pub smoothing: Option<f64>,
    pub color: Option<Color>,
}

impl EdgeOverlayPatch {
    pub fn routing(waypoints: Waypoints, curve_type: CurveType) -> Self {
        Self {
            waypoints: Some(waypoints),
            curve_type: Some(curve_type),
            ..Self::default()
        }
    }
}

// ─── Overlay ─────────────────────────────────────────────────────────────

/// Versioned, serializable record of user placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    pub version: u32,
    #[serde(default)]
    pub nodes: HashMap<ElementId, NodeOverlay>,
    #[serde(default)]
    pub edges: HashMap<ElementId, EdgeOverlay>,
}

impl Default for Overlay {
    fn default() -> Self {
        Self::new()
    }
}

impl Overlay {
    pub fn new() -> Self {
        Self {
            version: OVERLAY_VERSION,
            nodes: HashMap::new(),
            edges: HashMap::new(),
        }
    }

    /// Merge `patch` into the node's entry, creating it from
    /// [`NodeOverlay::default`] when absent.
    pub fn update_node(&mut self, id: ElementId, patch: NodeOverlayPatch) -> &NodeOverlay {
        let entry = self.nodes.entry(id).or_default();
        if let Some(x) = patch.x {
            entry.x = x;
        }
        if let Some(y) = patch.y {
            entry.y = y;
        }
        if let Some(w) = patch.w {
            entry.w = w;
        }
        if let Some(h) = patch.h {
            entry.h = h;
        }
        if patch.color.is_some() {
            entry.color = patch.color;
        }
        entry
    }

    /// Merge `patch` into the edge's entry, creating it from
    /// [`EdgeOverlay::default`] when absent.
    pub fn update_edge(&mut self, id: ElementId, patch: EdgeOverlayPatch) -> &EdgeOverlay {
        let entry = self.edges.entry(id).or_default();
        if let Some(waypoints) = patch.waypoints {
            entry.waypoints = waypoints;
        }
        if let Some(curve_type) = patch.curve_type {
            entry.curve_type = curve_type;
        }
        if patch.source.is_some() {
            entry.source = patch.source;
        }
        if patch.target.is_some() {
            entry.target = patch.target;
        }
        if patch.arrows.is_some() {
            entry.arrows = patch.arrows;
        }
        if patch.raw_points.is_some() {
            entry.raw_points = patch.raw_points;
        }
        if patch.smoothing.is_some() {
            entry.smoothing = patch.smoothing;
        }
        if patch.color.is_some() {
            entry.color = patch.color;
        }
        entry
    }

    /// Record a hand-drawn edge. The entry is always stored as manual.
    pub fn add_manual_edge(&mut self, id: ElementId, mut entry: EdgeOverlay) {
        entry.origin = EdgeOrigin::Manual;
        self.edges.insert(id, entry);
    }

    /// Drop a hand-drawn edge. Structural entries are left alone.
    pub fn remove_manual_edge(&mut self, id: ElementId) -> Option<EdgeOverlay> {
        if self.edges.get(&id).is_some_and(EdgeOverlay::is_manual) {
            self.edges.remove(&id)
        } else {
            None
        }
    }

    /// Ids of hand-drawn edges.
    pub fn manual_edge_ids(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.edges
            .iter()
            .filter(|(_, e)| e.is_manual())
            .map(|(&id, _)| id)
    }

    /// Purge entries for nodes and edges that left the graph.
    pub fn cleanup(&mut self, removed_node_ids: &[ElementId], removed_edge_ids: &[ElementId]) {
        for id in removed_node_ids {
            self.nodes.remove(id);
        }
        for id in removed_edge_ids {
            self.edges.remove(id);
        }
    }

    /// Detach hand-drawn edges from a node that no longer exists.
    pub fn detach_manual_edges(&mut self, node: ElementId) {
        for entry in self.edges.values_mut().filter(|e| e.is_manual()) {
            if entry.source == Some(node) {
                entry.source = None;
            }
            if entry.target == Some(node) {
                entry.target = None;
            }
        }
    }

    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string_pretty(self).map_err(|e| format!("overlay serialization failed: {e}"))
    }

    /// Parse a persisted overlay, rejecting versions other than
    /// [`OVERLAY_VERSION`].
    pub fn from_json(json: &str) -> Result<Self, String> {
        let overlay: Overlay =
            serde_json::from_str(json).map_err(|e| format!("invalid overlay: {e}"))?;
        if overlay.version != OVERLAY_VERSION {
            return Err(format!(
                "unsupported overlay version {} (expected {OVERLAY_VERSION})",
                overlay.version
            ));
        }
        Ok(overlay)
    }
}
