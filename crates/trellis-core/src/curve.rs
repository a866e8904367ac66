//! Connector paths: curve construction and arrowhead orientation.
//!
//! Paths are built from `[start, ...waypoints, end]` and returned as
//! `kurbo::BezPath` so renderers can stroke them directly or emit SVG.

use crate::model::CurveType;
use kurbo::{BezPath, Point};
use std::f64::consts::PI;

/// Default arrowhead length in pixels.
pub const ARROW_SIZE: f64 = 10.0;

/// Build the connector path through `points` using `curve`.
///
/// Fewer than two points yields an empty path.
pub fn build_path(points: &[Point], curve: CurveType) -> BezPath {
    if points.len() < 2 {
        return BezPath::new();
    }
    match curve {
        CurveType::Straight => straight_path(points),
        CurveType::Bezier => bezier_path(points),
        CurveType::Orthogonal => orthogonal_path(points),
        CurveType::Freehand => freehand_path(points),
    }
}

fn straight_path(points: &[Point]) -> BezPath {
    let mut path = BezPath::new();
    path.move_to(points[0]);
    for &p in &points[1..] {
        path.line_to(p);
    }
    path
}

/// Smooth curve through the interior waypoints. Each waypoint gets its first
/// control point halfway from the previous point; the second is pulled back
/// by 15% of the neighbor span so the curve does not overshoot.
fn bezier_path(points: &[Point]) -> BezPath {
    if points.len() <= 3 {
        return straight_path(points);
    }

    let mut path = BezPath::new();
    path.move_to(points[0]);
    for i in 1..points.len() {
        let prev = points[i - 1];
        let curr = points[i];
        let cp1 = prev.lerp(curr, 0.5);
        match points.get(i + 1) {
            Some(&next) => {
                let cp2 = curr - (next - prev) * 0.15;
                path.curve_to(cp1, cp2, curr);
            }
            None => path.quad_to(cp1, curr),
        }
    }
    path
}

/// Horizontal-then-vertical routing: every pair is joined through
/// `(next.x, prev.y)`.
fn orthogonal_path(points: &[Point]) -> BezPath {
    straight_path(&orthogonal_route(points))
}

/// Catmull-Rom spline through every point, as cubic segments.
fn freehand_path(points: &[Point]) -> BezPath {
    if points.len() == 2 {
        return straight_path(points);
    }

    let last = points.len() - 1;
    let mut path = BezPath::new();
    path.move_to(points[0]);
    for i in 0..last {
        let p0 = points[i.saturating_sub(1)];
        let p1 = points[i];
        let p2 = points[i + 1];
        let p3 = points[(i + 2).min(last)];

        let cp1 = p1 + (p2 - p0) / 6.0;
        let cp2 = p2 - (p3 - p1) / 6.0;
        path.curve_to(cp1, cp2, p2);
    }
    path
}

/// Expand an orthogonal route into its actual straight segments, inserting
/// the implicit `(curr.x, prev.y)` bends. Zero-length segments are dropped,
/// so consecutive points in the result always differ.
pub fn orthogonal_route(points: &[Point]) -> Vec<Point> {
    let Some(&first) = points.first() else {
        return Vec::new();
    };
    let mut expanded = Vec::with_capacity(points.len() * 2);
    expanded.push(first);
    let mut prev = first;
    for &curr in &points[1..] {
        for p in [Point::new(curr.x, prev.y), curr] {
            if expanded.last() != Some(&p) {
                expanded.push(p);
            }
        }
        prev = curr;
    }
    expanded
}

/// The final segment `(from, to)` along which an end arrowhead points.
///
/// For orthogonal paths the last two stored points span the horizontal leg,
/// not the vertical approach, so the route is expanded first.
pub fn arrow_direction(points: &[Point], curve: CurveType) -> (Point, Point) {
    match points {
        [] => (Point::ZERO, Point::ZERO),
        [only] => (*only, *only),
        _ if curve == CurveType::Orthogonal => match orthogonal_route(points).as_slice() {
            [.., from, to] => (*from, *to),
            _ => (points[0], points[0]),
        },
        _ => (points[points.len() - 2], points[points.len() - 1]),
    }
}

/// The first segment, reversed: `(from, to)` with `to` at the path start,
/// for orienting a start arrowhead.
pub fn arrow_start_direction(points: &[Point], curve: CurveType) -> (Point, Point) {
    match points {
        [] => (Point::ZERO, Point::ZERO),
        [only] => (*only, *only),
        _ if curve == CurveType::Orthogonal => match orthogonal_route(points).as_slice() {
            [to, from, ..] => (*from, *to),
            _ => (points[0], points[0]),
        },
        _ => (points[1], points[0]),
    }
}

/// Closed triangular arrowhead with its tip at `to`, pointing along `from → to`.
pub fn arrowhead(from: Point, to: Point, size: f64) -> BezPath {
    let angle = (to.y - from.y).atan2(to.x - from.x);
    let wing = |a: f64| Point::new(to.x - size * a.cos(), to.y - size * a.sin());

    let mut path = BezPath::new();
    path.move_to(wing(angle - PI / 6.0));
    path.line_to(to);
    path.line_to(wing(angle + PI / 6.0));
    path.close_path();
    path
}
