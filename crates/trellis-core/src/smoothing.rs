//! Freehand stroke smoothing: Ramer–Douglas–Peucker simplification followed
//! by Chaikin corner-cutting.

use kurbo::Point;

/// RDP tolerance at smoothing level 0 and 1, in pixels.
const MIN_EPSILON: f64 = 0.5;
const MAX_EPSILON: f64 = 15.0;

/// Chaikin rounds at smoothing level 1.
const MAX_ITERATIONS: f64 = 4.0;

/// Smooth a recorded stroke. `level` is clamped into `[0, 1]`; NaN counts as 0.
///
/// Strokes shorter than three points are returned unchanged. The first and
/// last points are always preserved exactly.
pub fn smooth(raw: &[Point], level: f64) -> Vec<Point> {
    if raw.len() < 3 {
        return raw.to_vec();
    }
    let level = clamp_level(level);
    let simplified = rdp_simplify(raw, epsilon_for(level));
    chaikin_smooth(&simplified, iterations_for(level))
}

/// The simplification stage of [`smooth`] alone.
pub fn simplify_for_level(raw: &[Point], level: f64) -> Vec<Point> {
    if raw.len() < 3 {
        return raw.to_vec();
    }
    rdp_simplify(raw, epsilon_for(clamp_level(level)))
}

fn clamp_level(level: f64) -> f64 {
    if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) }
}

fn epsilon_for(level: f64) -> f64 {
    MIN_EPSILON + (MAX_EPSILON - MIN_EPSILON) * level
}

fn iterations_for(level: f64) -> usize {
    (level * MAX_ITERATIONS).round() as usize
}

/// Ramer–Douglas–Peucker: keep the point farthest from the chord when it
/// deviates by more than `epsilon`, recursing on both halves.
pub fn rdp_simplify(points: &[Point], epsilon: f64) -> Vec<Point> {
    if points.len() <= 2 {
        return points.to_vec();
    }
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;
    mark_kept(points, 0, points.len() - 1, epsilon, &mut keep);

    points
        .iter()
        .zip(keep)
        .filter_map(|(&p, k)| k.then_some(p))
        .collect()
}

fn mark_kept(points: &[Point], first: usize, last: usize, epsilon: f64, keep: &mut [bool]) {
    if last <= first + 1 {
        return;
    }
    let (start, end) = (points[first], points[last]);
    let mut max_dist = 0.0;
    let mut max_idx = first;
    for (i, &p) in points.iter().enumerate().take(last).skip(first + 1) {
        let d = perpendicular_distance(p, start, end);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }
    if max_dist > epsilon {
        keep[max_idx] = true;
        mark_kept(points, first, max_idx, epsilon, keep);
        mark_kept(points, max_idx, last, epsilon, keep);
    }
}

/// Distance from `p` to the infinite line through `a` and `b`, or to `a`
/// when the two coincide.
pub fn perpendicular_distance(p: Point, a: Point, b: Point) -> f64 {
    let chord = b - a;
    let len = chord.hypot();
    if len == 0.0 {
        return (p - a).hypot();
    }
    chord.cross(p - a).abs() / len
}

/// Chaikin corner-cutting: each round replaces every segment with points at
/// 25% and 75% along it. Endpoints are kept.
pub fn chaikin_smooth(points: &[Point], iterations: usize) -> Vec<Point> {
    if points.len() < 3 || iterations == 0 {
        return points.to_vec();
    }
    let mut current = points.to_vec();
    for _ in 0..iterations {
        let mut next = Vec::with_capacity(current.len() * 2);
        next.push(current[0]);
        for pair in current.windows(2) {
            next.push(pair[0].lerp(pair[1], 0.25));
            next.push(pair[0].lerp(pair[1], 0.75));
        }
        next.push(current[current.len() - 1]);
        current = next;
    }
    current
}
