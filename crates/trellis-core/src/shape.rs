//! Per-shape geometry strategies.
//!
//! Each [`ShapeKind`] maps to a static [`ShapeGeometry`] record holding its
//! anchor and outline functions. Rendering layers draw the outline path;
//! connectors terminate at the anchor.

use crate::anchor::{
    cylinder_anchor, cylinder_cap_height, diamond_anchor, ellipse_anchor, rect_anchor,
    stadium_anchor,
};
use crate::model::ShapeKind;
use kurbo::{Arc, BezPath, Ellipse, Point, Rect, RoundedRect, Shape, Vec2};
use std::f64::consts::PI;

/// Corner radius of rounded rectangles.
pub const CORNER_RADIUS: f64 = 8.0;

const TOLERANCE: f64 = 0.1;

/// Geometry strategy for one shape kind.
pub struct ShapeGeometry {
    /// Outline point along direction `d` from the center of `bounds`.
    /// `d` is never zero; callers go through [`crate::anchor::anchor_point`].
    pub anchor: fn(Rect, Vec2) -> Point,
    /// Closed outline of the shape drawn in `bounds`.
    pub outline: fn(Rect) -> BezPath,
}

static BOX: ShapeGeometry = ShapeGeometry {
    anchor: rect_anchor,
    outline: box_outline,
};
static ROUNDED_RECT: ShapeGeometry = ShapeGeometry {
    anchor: rect_anchor,
    outline: rounded_rect_outline,
};
static STADIUM: ShapeGeometry = ShapeGeometry {
    anchor: stadium_anchor,
    outline: stadium_outline,
};
static DIAMOND: ShapeGeometry = ShapeGeometry {
    anchor: diamond_anchor,
    outline: diamond_outline,
};
static CYLINDER: ShapeGeometry = ShapeGeometry {
    anchor: cylinder_anchor,
    outline: cylinder_outline,
};
static CIRCLE: ShapeGeometry = ShapeGeometry {
    anchor: ellipse_anchor,
    outline: ellipse_outline,
};

impl ShapeKind {
    pub const ALL: [ShapeKind; 6] = [
        ShapeKind::Box,
        ShapeKind::RoundedRect,
        ShapeKind::Stadium,
        ShapeKind::Diamond,
        ShapeKind::Cylinder,
        ShapeKind::Circle,
    ];

    pub fn geometry(self) -> &'static ShapeGeometry {
        match self {
            ShapeKind::Box => &BOX,
            ShapeKind::RoundedRect => &ROUNDED_RECT,
            ShapeKind::Stadium => &STADIUM,
            ShapeKind::Diamond => &DIAMOND,
            ShapeKind::Cylinder => &CYLINDER,
            ShapeKind::Circle => &CIRCLE,
        }
    }

    pub fn outline(self, bounds: Rect) -> BezPath {
        (self.geometry().outline)(bounds.abs())
    }
}

fn box_outline(bounds: Rect) -> BezPath {
    bounds.to_path(TOLERANCE)
}

fn rounded_rect_outline(bounds: Rect) -> BezPath {
    RoundedRect::from_rect(bounds, CORNER_RADIUS).to_path(TOLERANCE)
}

fn stadium_outline(bounds: Rect) -> BezPath {
    let r = bounds.width().min(bounds.height()) / 2.0;
    RoundedRect::from_rect(bounds, r).to_path(TOLERANCE)
}

fn ellipse_outline(bounds: Rect) -> BezPath {
    Ellipse::from_rect(bounds).to_path(TOLERANCE)
}

fn diamond_outline(bounds: Rect) -> BezPath {
    let c = bounds.center();
    let mut path = BezPath::new();
    path.move_to((c.x, bounds.y0));
    path.line_to((bounds.x1, c.y));
    path.line_to((c.x, bounds.y1));
    path.line_to((bounds.x0, c.y));
    path.close_path();
    path
}

/// Body sides plus the front halves of both caps. The back half of the top
/// cap is drawn as a separate subpath so the lid reads as an ellipse.
fn cylinder_outline(bounds: Rect) -> BezPath {
    let cap = cylinder_cap_height(bounds.height());
    let rx = bounds.width() / 2.0;
    let cx = bounds.center().x;
    let top = bounds.y0 + cap;
    let bottom = bounds.y1 - cap;

    let mut path = BezPath::new();
    path.move_to((bounds.x0, top));
    path.line_to((bounds.x0, bottom));
    // Bottom front: left → right through the lowest point.
    let bottom_arc = lid_arc(Point::new(cx, bottom), Vec2::new(rx, cap), PI);
    path.extend(bottom_arc.append_iter(TOLERANCE));
    path.line_to((bounds.x1, top));
    // Top back: right → left through the highest point.
    let top_back = lid_arc(Point::new(cx, top), Vec2::new(rx, cap), 0.0);
    path.extend(top_back.append_iter(TOLERANCE));
    path.close_path();

    // Top front: left → right through the lower edge of the lid.
    path.move_to((bounds.x0, top));
    let top_front = lid_arc(Point::new(cx, top), Vec2::new(rx, cap), PI);
    path.extend(top_front.append_iter(TOLERANCE));
    path
}

/// Half-ellipse sweeping counter-clockwise by π from `start_angle`.
fn lid_arc(center: Point, radii: Vec2, start_angle: f64) -> Arc {
    Arc {
        center,
        radii,
        start_angle,
        sweep_angle: -PI,
        x_rotation: 0.0,
    }
}

/// Cardinal connection port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Port {
    Top,
    Right,
    Bottom,
    Left,
}

/// The four cardinal ports of a shape, in top/right/bottom/left order.
pub fn ports(bounds: Rect) -> [(Port, Point); 4] {
    let c = bounds.center();
    [
        (Port::Top, Point::new(c.x, bounds.y0)),
        (Port::Right, Point::new(bounds.x1, c.y)),
        (Port::Bottom, Point::new(c.x, bounds.y1)),
        (Port::Left, Point::new(bounds.x0, c.y)),
    ]
}

/// The port on the side of `bounds` that a ray from the center toward
/// `toward` leaves through.
pub fn port_toward(bounds: Rect, toward: Point) -> (Port, Point) {
    let d = toward - bounds.center();
    let [top, right, bottom, left] = ports(bounds);
    if d.x.abs() * bounds.height() >= d.y.abs() * bounds.width() {
        if d.x >= 0.0 { right } else { left }
    } else if d.y >= 0.0 {
        bottom
    } else {
        top
    }
}
