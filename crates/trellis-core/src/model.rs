//! Core data model: the parsed graph, layout results, and canvas records.
//!
//! The graph and layout types are produced by external collaborators (the
//! text parser and the auto-layout engine) and are read-only here. Canvas
//! records are the ephemeral rendering state derived by reconciliation and
//! mutated by direct manipulation.

use crate::id::{CanvasId, ElementId};
use kurbo::{Point, Rect};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;
use std::collections::HashSet;

/// Interior bend points of a connector (start/end excluded).
pub type Waypoints = SmallVec<[Point; 4]>;

// ─── Colors ──────────────────────────────────────────────────────────────

/// RGBA color, 8 bits per channel. Serialized as a hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Helper to parse a single hex digit.
pub fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Default connector stroke (`#374151`).
    pub const EDGE_DEFAULT: Color = Color::rgb(0x37, 0x41, 0x51);

    /// Parse a hex color string: `#RGB`, `#RRGGBB`, `#RRGGBBAA`.
    /// The string may optionally start with `#`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        let bytes = hex.as_bytes();
        let pair = |i: usize| -> Option<u8> { Some(hex_val(bytes[i])? << 4 | hex_val(bytes[i + 1])?) };

        match bytes.len() {
            3 => Some(Self::rgb(
                hex_val(bytes[0])? * 17,
                hex_val(bytes[1])? * 17,
                hex_val(bytes[2])? * 17,
            )),
            6 => Some(Self::rgb(pair(0)?, pair(2)?, pair(4)?)),
            8 => Some(Self {
                r: pair(0)?,
                g: pair(2)?,
                b: pair(4)?,
                a: pair(6)?,
            }),
            _ => None,
        }
    }

    /// Emit as `#rrggbb`, or `#rrggbbaa` when not opaque.
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::EDGE_DEFAULT
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Color::from_hex(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid color: {s}")))
    }
}

/// Named node palette. Each entry maps to a fill/stroke/text triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeColor {
    #[default]
    Blue,
    Green,
    Red,
    Yellow,
    Purple,
    Orange,
    Gray,
    White,
}

/// Fill, stroke, and text colors of a palette entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swatch {
    pub fill: Color,
    pub stroke: Color,
    pub text: Color,
}

impl ShapeColor {
    pub const ALL: [ShapeColor; 8] = [
        ShapeColor::Blue,
        ShapeColor::Green,
        ShapeColor::Red,
        ShapeColor::Yellow,
        ShapeColor::Purple,
        ShapeColor::Orange,
        ShapeColor::Gray,
        ShapeColor::White,
    ];

    pub fn swatch(self) -> Swatch {
        let (fill, stroke, text) = match self {
            ShapeColor::Blue => ((0xdb, 0xea, 0xfe), (0x25, 0x63, 0xeb), (0x1e, 0x40, 0xaf)),
            ShapeColor::Green => ((0xdc, 0xfc, 0xe7), (0x16, 0xa3, 0x4a), (0x16, 0x65, 0x34)),
            ShapeColor::Red => ((0xfe, 0xca, 0xca), (0xdc, 0x26, 0x26), (0x99, 0x1b, 0x1b)),
            ShapeColor::Yellow => ((0xfe, 0xf9, 0xc3), (0xca, 0x8a, 0x04), (0x85, 0x4d, 0x0e)),
            ShapeColor::Purple => ((0xf3, 0xe8, 0xff), (0x93, 0x33, 0xea), (0x6b, 0x21, 0xa8)),
            ShapeColor::Orange => ((0xff, 0xed, 0xd5), (0xea, 0x58, 0x0c), (0x9a, 0x34, 0x12)),
            ShapeColor::Gray => ((0xf3, 0xf4, 0xf6), (0x6b, 0x72, 0x80), (0x37, 0x41, 0x51)),
            ShapeColor::White => ((0xff, 0xff, 0xff), (0x37, 0x41, 0x51), (0x11, 0x18, 0x27)),
        };
        let c = |(r, g, b): (u8, u8, u8)| Color::rgb(r, g, b);
        Swatch {
            fill: c(fill),
            stroke: c(stroke),
            text: c(text),
        }
    }
}

// ─── Shapes ──────────────────────────────────────────────────────────────

/// The outline a graph node is drawn with.
///
/// Parser bracket syntax maps onto these: `[a]` box, `(a)` rounded rect,
/// `([a])` stadium, `{a}` diamond, `[(a)]` cylinder, `((a))` circle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShapeKind {
    #[default]
    Box,
    #[serde(alias = "round")]
    RoundedRect,
    Stadium,
    Diamond,
    Cylinder,
    Circle,
}

// ─── Graph (parser output) ───────────────────────────────────────────────

/// Flow direction declared in the diagram header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    TD,
    TB,
    BT,
    LR,
    RL,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: ElementId,
    pub label: String,
    pub shape: ShapeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Composite `source->target` key (see [`ElementId::edge`]).
    pub id: ElementId,
    pub source: ElementId,
    pub target: ElementId,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubGraph {
    pub id: ElementId,
    pub label: String,
    pub node_ids: Vec<ElementId>,
}

/// A parsed diagram: nodes, edges, subgraphs, and layout direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub direction: Direction,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    #[serde(default)]
    pub subgraphs: Vec<SubGraph>,
}

impl Graph {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            ..Self::default()
        }
    }

    /// Append a node. Builder-style, for collaborators and tests.
    #[must_use]
    pub fn with_node(mut self, id: &str, label: &str, shape: ShapeKind) -> Self {
        self.nodes.push(GraphNode {
            id: ElementId::intern(id),
            label: label.to_string(),
            shape,
        });
        self
    }

    /// Append an edge, assigning the composite id (with a parallel-edge
    /// suffix when the pair is already connected).
    #[must_use]
    pub fn with_edge(mut self, source: &str, target: &str, label: &str) -> Self {
        let source = ElementId::intern(source);
        let target = ElementId::intern(target);
        let parallel = self
            .edges
            .iter()
            .filter(|e| e.source == source && e.target == target)
            .count();
        self.edges.push(GraphEdge {
            id: ElementId::edge(source, target, parallel),
            source,
            target,
            label: label.to_string(),
        });
        self
    }

    pub fn node(&self, id: ElementId) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_ids(&self) -> HashSet<ElementId> {
        self.nodes.iter().map(|n| n.id).collect()
    }

    pub fn edge_ids(&self) -> HashSet<ElementId> {
        self.edges.iter().map(|e| e.id).collect()
    }
}

// ─── Layout (layout engine output) ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutNode {
    pub id: ElementId,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl LayoutNode {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutEdge {
    pub id: ElementId,
    pub source: ElementId,
    pub target: ElementId,
    /// Ordered route, including the points where it meets both nodes.
    pub bend_points: Vec<Point>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutResult {
    pub nodes: Vec<LayoutNode>,
    pub edges: Vec<LayoutEdge>,
    pub width: f64,
    pub height: f64,
}

// ─── Edge styling ────────────────────────────────────────────────────────

/// How the connector path is drawn through its points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveType {
    Straight,
    #[default]
    Bezier,
    Orthogonal,
    Freehand,
}

/// Where a connector comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeOrigin {
    /// Derived from the diagram text. Only removable by editing the text.
    #[default]
    #[serde(rename = "mermaid")]
    Structural,
    /// Drawn by hand on the canvas.
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrowHead {
    #[default]
    None,
    Arrow,
}

/// Arrowheads at each end of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeArrows {
    pub start: ArrowHead,
    pub end: ArrowHead,
}

impl Default for EdgeArrows {
    fn default() -> Self {
        Self {
            start: ArrowHead::None,
            end: ArrowHead::Arrow,
        }
    }
}

// ─── Canvas records ──────────────────────────────────────────────────────

/// A rendered graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasNode {
    pub canvas_id: CanvasId,
    pub node_id: ElementId,
    pub shape: ShapeKind,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub label: String,
    pub color: ShapeColor,
}

impl CanvasNode {
    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.w, self.y + self.h)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }
}

/// A rendered connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasEdge {
    pub canvas_id: CanvasId,
    pub edge_id: ElementId,
    /// Attached source node, or [`ElementId::none`] (manual edges only).
    pub source: ElementId,
    pub target: ElementId,
    pub start: Point,
    pub end: Point,
    pub waypoints: Waypoints,
    pub curve_type: CurveType,
    pub label: String,
    pub color: Color,
    pub origin: EdgeOrigin,
    pub arrows: EdgeArrows,
    /// Unsmoothed stroke, kept so smoothing can be re-applied.
    pub raw_points: Option<Vec<Point>>,
    pub smoothing: Option<f64>,
}

impl CanvasEdge {
    /// `[start, ...waypoints, end]`.
    pub fn points(&self) -> Vec<Point> {
        let mut pts = Vec::with_capacity(self.waypoints.len() + 2);
        pts.push(self.start);
        pts.extend(self.waypoints.iter().copied());
        pts.push(self.end);
        pts
    }

    pub fn is_manual(&self) -> bool {
        self.origin == EdgeOrigin::Manual
    }

    pub fn touches(&self, node: ElementId) -> bool {
        !node.is_none() && (self.source == node || self.target == node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_hex_roundtrip() {
        let c = Color::from_hex("#374151").unwrap();
        assert_eq!(c, Color::EDGE_DEFAULT);
        assert_eq!(c.to_hex(), "#374151");
        assert_eq!(Color::from_hex("fff").unwrap(), Color::rgb(255, 255, 255));
        assert_eq!(Color::from_hex("#00000080").unwrap().a, 0x80);
        assert!(Color::from_hex("#12").is_none());
        assert!(Color::from_hex("#zzzzzz").is_none());
    }

    #[test]
    fn shape_kind_accepts_parser_names() {
        let k: ShapeKind = serde_json::from_str("\"round\"").unwrap();
        assert_eq!(k, ShapeKind::RoundedRect);
        let k: ShapeKind = serde_json::from_str("\"rounded-rect\"").unwrap();
        assert_eq!(k, ShapeKind::RoundedRect);
        assert_eq!(serde_json::to_string(&ShapeKind::Cylinder).unwrap(), "\"cylinder\"");
    }

    #[test]
    fn with_edge_suffixes_parallel_edges() {
        let g = Graph::new(Direction::TD)
            .with_node("A", "A", ShapeKind::Box)
            .with_node("B", "B", ShapeKind::Box)
            .with_edge("A", "B", "")
            .with_edge("A", "B", "again");
        assert_eq!(g.edges[0].id.as_str(), "A->B");
        assert_eq!(g.edges[1].id.as_str(), "A->B#1");
        assert_eq!(g.edge_ids().len(), 2);
    }

    #[test]
    fn structural_origin_serializes_as_mermaid() {
        assert_eq!(
            serde_json::to_string(&EdgeOrigin::Structural).unwrap(),
            "\"mermaid\""
        );
        assert_eq!(serde_json::to_string(&EdgeOrigin::Manual).unwrap(), "\"manual\"");
    }
}
