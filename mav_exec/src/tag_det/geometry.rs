//! # Tag and camera geometry
//!
//! Physical layout of the printed tags and the pinhole camera model.
//!
//! A tag lies in the `z = 0` plane of its own frame with one corner of its
//! outer square at the origin and the square extending along `+x` and `+y`.
//! Inside the outer square sits an N×N grid of cell squares, offset from the
//! outer edge by the border and separated by the gap. Cell `(i, j)` of a
//! pattern sits at column `i` along `x` and row `j` along `y`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Matrix3, Point2, Vector3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Dimensions of the printed tags, all in the same length unit (cm on the
/// flight rig).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TagGeometry {
    /// Side length of a single grid cell
    pub square_side: f64,

    /// Gap between adjacent cells
    pub gap: f64,

    /// Distance from the outer square edge to the first cell
    pub border: f64,

    /// Number of cells along each side of the grid
    pub grid_size: usize,
}

/// Pinhole camera intrinsics with Brown-Conrady distortion coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,

    /// Distortion coefficients in the order `[k1, k2, p1, p2, k3]`
    pub dist_coeffs: [f64; 5],
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TagGeometry {
    /// Side length of the outer square.
    pub fn outer_side(&self) -> f64 {
        let n = self.grid_size as f64;
        2.0 * self.border + (n - 1.0) * self.gap + n * self.square_side
    }

    /// Corners of the outer square in the tag frame, running `+x` first.
    pub fn reference_square(&self) -> [Vector3<f64>; 4] {
        let l = self.outer_side();

        [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(l, 0.0, 0.0),
            Vector3::new(l, l, 0.0),
            Vector3::new(0.0, l, 0.0),
        ]
    }

    /// Offset of the near edge of cell `k` along either axis.
    pub fn cell_start(&self, k: usize) -> f64 {
        self.border + k as f64 * (self.gap + self.square_side)
    }

    /// Centre of every grid cell, with cell `(i, j)` at index `i * N + j`.
    pub fn sample_grid(&self) -> Vec<Vector3<f64>> {
        let n = self.grid_size;
        let mut points = Vec::with_capacity(n * n);

        for i in 0..n {
            for j in 0..n {
                points.push(Vector3::new(
                    self.cell_start(i) + 0.5 * self.square_side,
                    self.cell_start(j) + 0.5 * self.square_side,
                    0.0,
                ));
            }
        }

        points
    }

    /// Returns true if all dimensions are usable.
    pub fn is_valid(&self) -> bool {
        self.square_side > 0.0 && self.gap >= 0.0 && self.border >= 0.0 && self.grid_size > 0
    }
}

impl Default for TagGeometry {
    fn default() -> Self {
        Self {
            square_side: 2.9,
            gap: 0.75,
            border: 2.2,
            grid_size: 3,
        }
    }
}

impl CameraIntrinsics {
    /// Intrinsics with no lens distortion.
    pub fn pinhole(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            dist_coeffs: [0.0; 5],
        }
    }

    /// The camera matrix `K`.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx,
            0.0, self.fy, self.cy,
            0.0, 0.0, 1.0,
        )
    }

    /// Same camera with the distortion removed, describing undistorted
    /// images.
    pub fn undistorted(&self) -> Self {
        Self::pinhole(self.fx, self.fy, self.cx, self.cy)
    }

    pub fn has_distortion(&self) -> bool {
        self.dist_coeffs.iter().any(|c| *c != 0.0)
    }

    /// Project a camera frame point into the image, ignoring distortion.
    ///
    /// Returns `None` for points on or behind the image plane.
    pub fn project(&self, point: &Vector3<f64>) -> Option<Point2<f64>> {
        if point.z <= 0.0 {
            return None
        }

        Some(Point2::new(
            self.fx * point.x / point.z + self.cx,
            self.fy * point.y / point.z + self.cy,
        ))
    }

    /// Apply the lens distortion to a point on the normalised image plane.
    pub fn distort_normalised(&self, x: f64, y: f64) -> (f64, f64) {
        let [k1, k2, p1, p2, k3] = self.dist_coeffs;

        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (k1 + r2 * (k2 + r2 * k3));

        (
            x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x),
            y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y,
        )
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_outer_side() {
        let g = TagGeometry::default();
        assert!((g.outer_side() - 14.6).abs() < 1e-12);
        assert!(g.is_valid());

        let sq = g.reference_square();
        assert_eq!(sq[2], Vector3::new(g.outer_side(), g.outer_side(), 0.0));
    }

    #[test]
    fn test_sample_grid() {
        let g = TagGeometry::default();
        let grid = g.sample_grid();

        assert_eq!(grid.len(), 9);

        // Index i * N + j, with i along x
        assert!((grid[0] - Vector3::new(3.65, 3.65, 0.0)).norm() < 1e-12);
        assert!((grid[1] - Vector3::new(3.65, 7.3, 0.0)).norm() < 1e-12);
        assert!((grid[3] - Vector3::new(7.3, 3.65, 0.0)).norm() < 1e-12);

        // The grid is centred in the outer square
        let l = g.outer_side();
        assert!((grid[4] - Vector3::new(l / 2.0, l / 2.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_project() {
        let k = CameraIntrinsics::pinhole(500.0, 500.0, 320.0, 240.0);

        let p = k.project(&Vector3::new(1.0, -2.0, 10.0)).unwrap();
        assert!((p - Point2::new(370.0, 140.0)).norm() < 1e-12);
        assert!(k.project(&Vector3::new(1.0, 1.0, -1.0)).is_none());

        assert_eq!(k.distort_normalised(0.1, 0.2), (0.1, 0.2));
        assert!(!k.has_distortion());
    }
}
