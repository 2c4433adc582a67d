//! # Corner refinement
//!
//! Polygon vertices taken from a traced contour sit on whole pixels of the
//! edge map, up to a couple of pixels away from the true corners of the
//! printed square. Each side of a quadrilateral is relocated on the image
//! gradient instead: the gradient magnitude is searched across the side at
//! evenly spaced stations, each peak is placed to subpixel precision with a
//! parabola, and a line is fitted through the peaks. The refined corners are
//! the intersections of adjacent side lines.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use image::GrayImage;
use imageproc::gradients::{horizontal_scharr, vertical_scharr};
use nalgebra::{Point2, Vector2};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Distance in pixels searched on either side of a polygon edge.
const SEARCH_HALF_WIDTH: i32 = 3;

/// Fraction of each side, at either end, left out of the line fit so that the
/// neighbouring sides do not pull the peaks.
const END_MARGIN: f64 = 0.15;

/// Largest distance in pixels a corner may move when refined.
const MAX_CORNER_SHIFT: f64 = 3.0;

/// Sides shorter than this many pixels are not refined.
const MIN_SIDE_LENGTH: f64 = 8.0;

/// Smallest gradient magnitude treated as an edge.
const MIN_EDGE_MAGNITUDE: f64 = 50.0;

const MIN_STATIONS: usize = 5;
const MAX_STATIONS: usize = 40;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Gradient magnitude of a frame.
pub struct EdgeGradients {
    width: usize,
    height: usize,
    magnitude: Vec<f64>,
}

/// Line through `point` along the unit vector `dir`.
#[derive(Debug, Clone, Copy)]
struct Line {
    point: Point2<f64>,
    dir: Vector2<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl EdgeGradients {
    pub fn new(image: &GrayImage) -> Self {
        let gx = horizontal_scharr(image);
        let gy = vertical_scharr(image);

        let magnitude = gx.as_raw()
            .iter()
            .zip(gy.as_raw().iter())
            .map(|(&x, &y)| (x as f64).hypot(y as f64))
            .collect();

        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            magnitude,
        }
    }

    /// Bilinearly interpolated magnitude, `None` outside the frame.
    pub fn magnitude_at(&self, x: f64, y: f64) -> Option<f64> {
        if self.width == 0 || self.height == 0 {
            return None
        }

        let x_max = (self.width - 1) as f64;
        let y_max = (self.height - 1) as f64;
        if !(x >= 0.0 && y >= 0.0 && x <= x_max && y <= y_max) {
            return None
        }

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f64;
        let fy = y - y0 as f64;

        let m = |xi: usize, yi: usize| self.magnitude[yi * self.width + xi];

        let top = m(x0, y0) * (1.0 - fx) + m(x1, y0) * fx;
        let bottom = m(x0, y1) * (1.0 - fx) + m(x1, y1) * fx;

        Some(top * (1.0 - fy) + bottom * fy)
    }
}

impl Line {
    fn intersect(&self, other: &Line) -> Option<Point2<f64>> {
        let det = cross(&self.dir, &other.dir);
        if det.abs() < 1e-9 {
            return None
        }

        let s = cross(&(other.point - self.point), &other.dir) / det;
        Some(self.point + self.dir * s)
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Move the corners of a quadrilateral onto the intersections of its edges
/// in the image.
///
/// A corner is left where it is if either side meeting at it cannot be
/// located, or if the refined position is more than a few pixels away.
pub fn refine_corners(gradients: &EdgeGradients, corners: &[Point2<f64>; 4]) -> [Point2<f64>; 4] {
    let sides: Vec<Option<Line>> = (0..4)
        .map(|k| locate_side(gradients, &corners[k], &corners[(k + 1) % 4]))
        .collect();

    let mut refined = *corners;

    for k in 0..4 {
        let before = &sides[(k + 3) % 4];
        let after = &sides[k];

        if let (Some(l0), Some(l1)) = (before, after) {
            if let Some(p) = l0.intersect(l1) {
                if (p - corners[k]).norm() <= MAX_CORNER_SHIFT {
                    refined[k] = p;
                }
            }
        }
    }

    refined
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn cross(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Fit a line to the image edge running close to the segment `a` to `b`.
fn locate_side(gradients: &EdgeGradients, a: &Point2<f64>, b: &Point2<f64>) -> Option<Line> {
    let along = b - a;
    let len = along.norm();
    if len < MIN_SIDE_LENGTH {
        return None
    }

    let dir = along / len;
    let normal = Vector2::new(-dir.y, dir.x);

    let stations = ((len / 2.0) as usize).max(MIN_STATIONS).min(MAX_STATIONS);
    let mut peaks = Vec::with_capacity(stations);

    for s in 0..stations {
        let t = END_MARGIN + (1.0 - 2.0 * END_MARGIN) * s as f64 / (stations - 1) as f64;
        let station = a + along * t;

        if let Some(offset) = edge_offset(gradients, &station, &normal) {
            peaks.push(station + normal * offset);
        }
    }

    if peaks.len() < MIN_STATIONS {
        return None
    }

    fit_line(&peaks)
}

/// Subpixel offset along `normal` of the strongest gradient near `station`.
fn edge_offset(gradients: &EdgeGradients, station: &Point2<f64>, normal: &Vector2<f64>) -> Option<f64> {
    let at = |d: f64| {
        let p = station + normal * d;
        gradients.magnitude_at(p.x, p.y)
    };

    let mut best: Option<(f64, f64)> = None;
    for step in -SEARCH_HALF_WIDTH..=SEARCH_HALF_WIDTH {
        let d = step as f64;
        if let Some(m) = at(d) {
            if best.map_or(true, |(_, bm)| m > bm) {
                best = Some((d, m));
            }
        }
    }

    let (d, m) = best?;
    if m < MIN_EDGE_MAGNITUDE {
        return None
    }

    // Vertex of the parabola through the peak and its two neighbours
    let sub = match (at(d - 1.0), at(d + 1.0)) {
        (Some(m0), Some(m2)) => {
            let den = 2.0 * (m0 + m2 - 2.0 * m);
            if den.abs() > 1e-9 {
                (-(m2 - m0) / den).max(-0.5).min(0.5)
            }
            else {
                0.0
            }
        },
        _ => 0.0
    };

    Some(d + sub)
}

/// Total least squares line through the points.
fn fit_line(points: &[Point2<f64>]) -> Option<Line> {
    let n = points.len() as f64;
    let centroid = points.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / n;

    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for p in points {
        let d = p.coords - centroid;
        sxx += d.x * d.x;
        sxy += d.x * d.y;
        syy += d.y * d.y;
    }

    if sxx + syy < 1e-12 {
        return None
    }

    // Major axis of the scatter
    let theta = 0.5 * (2.0 * sxy).atan2(sxx - syy);

    Some(Line {
        point: Point2::from(centroid),
        dir: Vector2::new(theta.cos(), theta.sin()),
    })
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
