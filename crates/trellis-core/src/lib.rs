pub mod anchor;
pub mod canvas;
pub mod curve;
pub mod id;
pub mod layout;
pub mod merge;
pub mod model;
pub mod overlay;
pub mod shape;
pub mod smoothing;
pub mod staging;
pub mod tracking;

pub use anchor::anchor_point;
pub use canvas::CanvasState;
pub use curve::{arrow_direction, arrow_start_direction, arrowhead, build_path};
pub use id::{CanvasId, ElementId};
pub use layout::{LayeredLayout, LayeredLayoutConfig, LayoutEngine};
pub use merge::{MergeResult, MergedEdge, PlacementSource, PositionedNode, merge};
pub use model::*;
pub use overlay::{EdgeOverlay, EdgeOverlayPatch, NodeOverlay, NodeOverlayPatch, Overlay};
pub use shape::{Port, ShapeGeometry};
pub use smoothing::smooth;
pub use staging::StagedNode;

// Re-export kurbo geometry so downstream crates don't need a direct dependency
pub use kurbo::{BezPath, Point, Rect, Vec2};
