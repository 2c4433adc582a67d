//! # Polygon utilities
//!
//! Polygon approximation of closed contours, point containment, and corner
//! ordering of detected quadrilaterals.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use imageproc::geometry::approximate_polygon_dp;
use imageproc::point::Point;
use nalgebra::Point2;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Approximate a closed contour by a polygon using the Douglas-Peucker
/// algorithm.
///
/// The open-curve simplification always keeps both ends of the curve, so the
/// contour is first split at two mutually distant points (which are vertices
/// of any convex outline) and each half simplified on its own. No dropped
/// point lies further than `epsilon` from the polygon edge replacing it.
/// Vertices are returned in contour order starting from the first split
/// point.
pub fn approx_closed_contour(points: &[Point<i32>], epsilon: f64) -> Vec<Point2<i32>> {
    let n = points.len();
    if n < 3 || epsilon <= 0.0 {
        return points.iter().map(to_point2).collect()
    }

    let a = furthest_from(points, points[0]);
    let b = furthest_from(points, points[a]);

    if a == b {
        return vec![to_point2(&points[a])]
    }

    let mut poly = Vec::new();

    for &(start, end) in [(a, b), (b, a)].iter() {
        let span = (end + n - start) % n;
        let half: Vec<Point<i32>> = (0..=span)
            .map(|k| points[(start + k) % n])
            .collect();

        let mut simplified = approximate_polygon_dp(&half, epsilon, false);

        // The end of each half is the start of the next
        simplified.pop();
        poly.extend(simplified.iter().map(to_point2));
    }

    poly.dedup();
    poly
}

/// Returns true if the point is inside the polygon or on its boundary.
pub fn point_in_polygon(polygon: &[Point2<i32>], point: &Point2<f64>) -> bool {
    let n = polygon.len();
    if n == 0 {
        return false
    }

    let as_f64 = |p: &Point2<i32>| Point2::new(p.x as f64, p.y as f64);

    let mut inside = false;

    for k in 0..n {
        let p0 = as_f64(&polygon[k]);
        let p1 = as_f64(&polygon[(k + 1) % n]);

        if on_segment(&p0, &p1, point) {
            return true
        }

        // Crossing test of a ray cast in the +x direction
        if (p0.y > point.y) != (p1.y > point.y) {
            let x_cross = p0.x + (point.y - p0.y) * (p1.x - p0.x) / (p1.y - p0.y);
            if point.x < x_cross {
                inside = !inside;
            }
        }
    }

    inside
}

/// Twice the signed area of the polygon. Positive when the vertices run
/// clockwise as displayed (y axis pointing down).
pub fn signed_area_2(polygon: &[Point2<f64>]) -> f64 {
    let n = polygon.len();

    (0..n)
        .map(|k| {
            let p0 = polygon[k];
            let p1 = polygon[(k + 1) % n];
            p0.x * p1.y - p1.x * p0.y
        })
        .sum()
}

/// Order the corners of a quadrilateral so that they run with positive
/// signed area, starting from the corner closest to the image origin (lowest
/// `x + y`).
pub fn normalise_corners(quad: &[Point2<i32>; 4]) -> [Point2<f64>; 4] {
    let mut corners: Vec<Point2<f64>> = quad
        .iter()
        .map(|p| Point2::new(p.x as f64, p.y as f64))
        .collect();

    if signed_area_2(&corners) < 0.0 {
        corners.reverse();
    }

    let mut first = 0;
    for k in 1..4 {
        if corners[k].x + corners[k].y < corners[first].x + corners[first].y {
            first = k;
        }
    }

    [
        corners[first],
        corners[(first + 1) % 4],
        corners[(first + 2) % 4],
        corners[(first + 3) % 4],
    ]
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn to_point2(p: &Point<i32>) -> Point2<i32> {
    Point2::new(p.x, p.y)
}

/// Index of the point furthest from `origin`, the first one on ties.
fn furthest_from(points: &[Point<i32>], origin: Point<i32>) -> usize {
    let mut best = 0;
    let mut best_dist = -1;

    for (i, p) in points.iter().enumerate() {
        let dx = (p.x - origin.x) as i64;
        let dy = (p.y - origin.y) as i64;
        let d = dx * dx + dy * dy;
        if d > best_dist {
            best = i;
            best_dist = d;
        }
    }

    best
}

fn on_segment(a: &Point2<f64>, b: &Point2<f64>, p: &Point2<f64>) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    if cross.abs() > 1e-9 {
        return false
    }

    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x)
        && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
