//! Perimeter anchoring: where a connector touches a shape's outline.
//!
//! Every function casts a ray from the shape's center toward a target point
//! and returns where that ray leaves the outline. All functions are total:
//! degenerate shapes (zero width/height) and degenerate directions fall back
//! to deterministic points, never NaN.

use crate::model::ShapeKind;
use kurbo::{Point, Rect, Vec2};

/// Point on `shape`'s outline (drawn in `bounds`) in the direction of `toward`.
///
/// When `toward` is exactly the center, returns the bottom-center point.
pub fn anchor_point(shape: ShapeKind, bounds: Rect, toward: Point) -> Point {
    let bounds = bounds.abs();
    let center = bounds.center();
    let d = toward - center;
    if (d.x == 0.0 && d.y == 0.0) || !d.is_finite() {
        return Point::new(center.x, bounds.y1);
    }
    (shape.geometry().anchor)(bounds, d)
}

/// Rectangle. Rounded corners are ignored for anchoring.
pub(crate) fn rect_anchor(bounds: Rect, d: Vec2) -> Point {
    let c = bounds.center();
    let hw = bounds.width() / 2.0;
    let hh = bounds.height() / 2.0;

    let mut t = f64::INFINITY;
    if d.x != 0.0 {
        t = t.min(hw / d.x.abs());
    }
    if d.y != 0.0 {
        t = t.min(hh / d.y.abs());
    }
    if !t.is_finite() {
        t = 1.0;
    }
    c + d * t
}

/// Ellipse with independent radii, parametric at `atan2(dy, dx)`.
pub(crate) fn ellipse_anchor(bounds: Rect, d: Vec2) -> Point {
    let c = bounds.center();
    let a = bounds.width() / 2.0;
    let b = bounds.height() / 2.0;
    let theta = d.y.atan2(d.x);
    Point::new(c.x + a * theta.cos(), c.y + b * theta.sin())
}

/// Rhombus: solve `|t·dx|/hw + |t·dy|/hh = 1`.
pub(crate) fn diamond_anchor(bounds: Rect, d: Vec2) -> Point {
    let c = bounds.center();
    let hw = bounds.width() / 2.0;
    let hh = bounds.height() / 2.0;
    if hw <= 0.0 || hh <= 0.0 {
        return rect_anchor(bounds, d);
    }
    let denom = d.x.abs() / hw + d.y.abs() / hh;
    let t = if denom > 0.0 { 1.0 / denom } else { 1.0 };
    c + d * t
}

/// Height of a cylinder's elliptical cap.
pub fn cylinder_cap_height(height: f64) -> f64 {
    (height * 0.15).min(20.0)
}

/// Cylinder: vertical body sides, then the nearer elliptical cap.
pub(crate) fn cylinder_anchor(bounds: Rect, d: Vec2) -> Point {
    let c = bounds.center();
    let hw = bounds.width() / 2.0;
    let cap = cylinder_cap_height(bounds.height());
    if hw <= 0.0 || cap <= 0.0 {
        return rect_anchor(bounds, d);
    }
    let body_top = bounds.y0 + cap;
    let body_bottom = bounds.y1 - cap;

    if d.x != 0.0 {
        let t = hw / d.x.abs();
        let hit = c + d * t;
        if hit.y >= body_top && hit.y <= body_bottom {
            return hit;
        }
    }

    // Ray vs. ellipse centered on the cap line: ((x-cx)/hw)² + ((y-cap_y)/cap)² = 1
    let cap_y = if d.y < 0.0 { body_top } else { body_bottom };
    let oy = c.y - cap_y;
    let a = (d.x / hw).powi(2) + (d.y / cap).powi(2);
    let b = 2.0 * oy * d.y / (cap * cap);
    let k = (oy / cap).powi(2) - 1.0;
    match far_root(a, b, k) {
        Some(t) => c + d * t,
        None => rect_anchor(bounds, d),
    }
}

/// Stadium (pill): semicircular caps on the longer axis.
pub(crate) fn stadium_anchor(bounds: Rect, d: Vec2) -> Point {
    let c = bounds.center();
    let hw = bounds.width() / 2.0;
    let hh = bounds.height() / 2.0;
    if hw <= 0.0 || hh <= 0.0 {
        return rect_anchor(bounds, d);
    }
    if hw >= hh {
        let local = pill_anchor(hw, hh, d);
        c + local
    } else {
        // Transpose, solve as a horizontal pill, transpose back.
        let local = pill_anchor(hh, hw, Vec2::new(d.y, d.x));
        c + Vec2::new(local.y, local.x)
    }
}

/// Horizontal pill centered on the origin, `long ≥ short`. Returns the offset
/// from the center.
fn pill_anchor(long: f64, short: f64, d: Vec2) -> Vec2 {
    let r = short;
    let body = long - r;

    if d.x.abs() * short > d.y.abs() * body {
        let cap_center = Vec2::new(body.copysign(d.x), 0.0);
        // |t·d - cap_center|² = r²
        let o = -cap_center;
        let a = d.hypot2();
        let b = 2.0 * o.dot(d);
        let k = o.hypot2() - r * r;
        if let Some(t) = far_root(a, b, k) {
            return d * t;
        }
    }
    if d.y != 0.0 {
        d * (short / d.y.abs())
    } else {
        d * (long / d.x.abs())
    }
}

/// Larger root of `a·t² + b·t + k = 0`, if real and positive.
fn far_root(a: f64, b: f64, k: f64) -> Option<f64> {
    if a <= 0.0 {
        return None;
    }
    let disc = b * b - 4.0 * a * k;
    if disc < 0.0 {
        return None;
    }
    let t = (-b + disc.sqrt()) / (2.0 * a);
    (t.is_finite() && t > 0.0).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Point, b: Point) -> bool {
        (a - b).hypot() < 1e-9
    }

    #[test]
    fn rect_below_center_hits_bottom_center() {
        let bounds = Rect::new(0.0, 0.0, 100.0, 60.0);
        let p = anchor_point(ShapeKind::Box, bounds, Point::new(50.0, 500.0));
        assert!(close(p, Point::new(50.0, 60.0)), "got {p:?}");
    }

    #[test]
    fn rect_right_hits_right_edge() {
        let bounds = Rect::new(0.0, 0.0, 100.0, 60.0);
        let p = anchor_point(ShapeKind::RoundedRect, bounds, Point::new(400.0, 30.0));
        assert!(close(p, Point::new(100.0, 30.0)), "got {p:?}");
    }

    #[test]
    fn center_target_falls_back_to_bottom_center() {
        let bounds = Rect::new(10.0, 20.0, 110.0, 80.0);
        for shape in [
            ShapeKind::Box,
            ShapeKind::RoundedRect,
            ShapeKind::Diamond,
            ShapeKind::Circle,
            ShapeKind::Cylinder,
            ShapeKind::Stadium,
        ] {
            let p = anchor_point(shape, bounds, Point::new(60.0, 50.0));
            assert_eq!(p, Point::new(60.0, 80.0), "{shape:?}");
        }
    }

    #[test]
    fn diamond_diagonal_hits_edge_midpoint() {
        let bounds = Rect::new(0.0, 0.0, 100.0, 100.0);
        let p = anchor_point(ShapeKind::Diamond, bounds, Point::new(100.0, 100.0));
        assert!(close(p, Point::new(75.0, 75.0)), "got {p:?}");
    }

    #[test]
    fn circle_on_axis_hits_radius() {
        let bounds = Rect::new(0.0, 0.0, 80.0, 40.0);
        let p = anchor_point(ShapeKind::Circle, bounds, Point::new(40.0, -100.0));
        assert!(close(p, Point::new(40.0, 0.0)), "got {p:?}");
    }

    #[test]
    fn cylinder_straight_up_hits_cap_apex() {
        let bounds = Rect::new(0.0, 0.0, 100.0, 100.0);
        let p = anchor_point(ShapeKind::Cylinder, bounds, Point::new(50.0, -50.0));
        // cap height 15, cap line at y=15, apex at y=0
        assert!(close(p, Point::new(50.0, 0.0)), "got {p:?}");
    }

    #[test]
    fn cylinder_sideways_hits_body() {
        let bounds = Rect::new(0.0, 0.0, 100.0, 100.0);
        let p = anchor_point(ShapeKind::Cylinder, bounds, Point::new(500.0, 60.0));
        assert!((p.x - 100.0).abs() < 1e-9);
        assert!(p.y > 15.0 && p.y < 85.0);
    }

    #[test]
    fn stadium_horizontal_caps_and_flat_sides() {
        let bounds = Rect::new(0.0, 0.0, 200.0, 60.0);
        let right = anchor_point(ShapeKind::Stadium, bounds, Point::new(1000.0, 30.0));
        assert!(close(right, Point::new(200.0, 30.0)), "got {right:?}");
        let top = anchor_point(ShapeKind::Stadium, bounds, Point::new(100.0, -100.0));
        assert!(close(top, Point::new(100.0, 0.0)), "got {top:?}");
    }

    #[test]
    fn stadium_vertical_caps() {
        let bounds = Rect::new(0.0, 0.0, 60.0, 200.0);
        let bottom = anchor_point(ShapeKind::Stadium, bounds, Point::new(30.0, 1000.0));
        assert!(close(bottom, Point::new(30.0, 200.0)), "got {bottom:?}");
        let left = anchor_point(ShapeKind::Stadium, bounds, Point::new(-100.0, 100.0));
        assert!(close(left, Point::new(0.0, 100.0)), "got {left:?}");
    }

    #[test]
    fn degenerate_shapes_stay_finite() {
        let flat = Rect::new(0.0, 0.0, 100.0, 0.0);
        for shape in [
            ShapeKind::Box,
            ShapeKind::Diamond,
            ShapeKind::Circle,
            ShapeKind::Cylinder,
            ShapeKind::Stadium,
        ] {
            let p = anchor_point(shape, flat, Point::new(30.0, 90.0));
            assert!(p.is_finite(), "{shape:?} -> {p:?}");
        }
    }

    #[test]
    fn anchoring_is_reproducible() {
        let bounds = Rect::new(3.0, 7.0, 163.0, 77.0);
        let target = Point::new(-41.5, 212.25);
        let a = anchor_point(ShapeKind::Stadium, bounds, target);
        let b = anchor_point(ShapeKind::Stadium, bounds, target);
        assert_eq!(a.x.to_bits(), b.x.to_bits());
        assert_eq!(a.y.to_bits(), b.y.to_bits());
    }
}
