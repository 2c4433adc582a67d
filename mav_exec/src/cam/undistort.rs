//! # Frame undistortion
//!
//! Removes lens distortion from incoming frames so the rest of the pipeline
//! can treat the camera as an ideal pinhole. The remapping table is computed
//! once for the configured intrinsics and frame size.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use image::{GrayImage, Luma};

use super::CamError;
use crate::tag_det::CameraIntrinsics;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Rounding slack, in pixels, allowed when sampling at the frame edge.
const EDGE_TOLERANCE: f32 = 1e-3;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Precomputed undistortion remap.
///
/// Each destination pixel stores the position it is sampled from in the
/// distorted source frame. Samples falling outside the source are black.
pub struct Undistorter {
    width: u32,
    height: u32,
    map: Vec<(f32, f32)>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Undistorter {
    /// Build the remap for frames of the given size. The undistorted frame
    /// keeps the same camera matrix.
    pub fn new(intrinsics: &CameraIntrinsics, width: u32, height: u32) -> Self {
        let mut map = Vec::with_capacity((width * height) as usize);

        for v in 0..height {
            for u in 0..width {
                let x = (u as f64 - intrinsics.cx) / intrinsics.fx;
                let y = (v as f64 - intrinsics.cy) / intrinsics.fy;

                let (xd, yd) = intrinsics.distort_normalised(x, y);

                map.push((
                    (intrinsics.fx * xd + intrinsics.cx) as f32,
                    (intrinsics.fy * yd + intrinsics.cy) as f32,
                ));
            }
        }

        Self { width, height, map }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Undistort a frame, which must match the size the remap was built for.
    pub fn apply(&self, frame: &GrayImage) -> Result<GrayImage, CamError> {
        if frame.dimensions() != self.dimensions() {
            return Err(CamError::FrameSizeMismatch {
                expected: self.dimensions(),
                found: frame.dimensions(),
            })
        }

        let mut out = GrayImage::new(self.width, self.height);

        for (idx, (sx, sy)) in self.map.iter().enumerate() {
            let u = idx as u32 % self.width;
            let v = idx as u32 / self.width;
            out.put_pixel(u, v, Luma([sample_bilinear(frame, *sx, *sy)]));
        }

        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn sample_bilinear(img: &GrayImage, x: f32, y: f32) -> u8 {
    let (w, h) = img.dimensions();

    let max_x = (w - 1) as f32;
    let max_y = (h - 1) as f32;

    if x < -EDGE_TOLERANCE || y < -EDGE_TOLERANCE
        || x > max_x + EDGE_TOLERANCE || y > max_y + EDGE_TOLERANCE
    {
        return 0
    }

    let x = x.max(0.0).min(max_x);
    let y = y.max(0.0).min(max_y);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p = |px: u32, py: u32| img.get_pixel(px, py)[0] as f32;

    let top = p(x0, y0) * (1.0 - fx) + p(x1, y0) * fx;
    let bottom = p(x0, y1) * (1.0 - fx) + p(x1, y1) * fx;

    (top * (1.0 - fy) + bottom * fy).round().min(255.0) as u8
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn gradient(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]))
    }

    #[test]
    fn test_identity_without_distortion() {
        let intrinsics = CameraIntrinsics::pinhole(50.0, 50.0, 15.5, 11.5);
        let und = Undistorter::new(&intrinsics, 32, 24);

        let frame = gradient(32, 24);
        assert_eq!(und.apply(&frame).unwrap(), frame);
    }

    #[test]
    fn test_barrel_distortion() {
        let mut intrinsics = CameraIntrinsics::pinhole(40.0, 40.0, 31.5, 23.5);
        intrinsics.dist_coeffs = [-0.3, 0.0, 0.0, 0.0, 0.0];
        let und = Undistorter::new(&intrinsics, 64, 48);

        let frame = GrayImage::from_pixel(64, 48, Luma([200]));
        let out = und.apply(&frame).unwrap();

        // Centre maps to itself
        assert_eq!(out.get_pixel(31, 23)[0], 200);

        // Barrel distortion pulls corners inwards, so the corner of the
        // output samples from inside the source frame
        assert_eq!(out.get_pixel(0, 0)[0], 200);
    }

    #[test]
    fn test_pincushion_leaves_black_border() {
        let mut intrinsics = CameraIntrinsics::pinhole(40.0, 40.0, 31.5, 23.5);
        intrinsics.dist_coeffs = [0.5, 0.0, 0.0, 0.0, 0.0];
        let und = Undistorter::new(&intrinsics, 64, 48);

        let frame = GrayImage::from_pixel(64, 48, Luma([200]));
        let out = und.apply(&frame).unwrap();

        assert_eq!(out.get_pixel(31, 23)[0], 200);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_size_mismatch() {
        let intrinsics = CameraIntrinsics::pinhole(50.0, 50.0, 15.5, 11.5);
        let und = Undistorter::new(&intrinsics, 32, 24);

        match und.apply(&gradient(16, 16)) {
            Err(CamError::FrameSizeMismatch { expected, found }) => {
                assert_eq!(expected, (32, 24));
                assert_eq!(found, (16, 16));
            },
            _ => panic!("Expected a size mismatch")
        }
    }
}
