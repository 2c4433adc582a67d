//! # Synthetic scene rendering
//!
//! Renders printed tags lying flat in front of a pinhole camera, for use in
//! tests and benchmarks. Each tag is drawn as a black frame around its outer
//! square with a black square for every filled cell, on white paper.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::collections::VecDeque;

use image::{GrayImage, Luma};
use nalgebra::Vector3;

use crate::cam::{CamError, ImageSource};
use crate::loc::transform::RigidTransform;
use crate::pattern::{Pattern, PatternCodec};
use crate::tag_det::{CameraIntrinsics, TagGeometry};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Seed pattern of the flight tag set.
pub const SEED: Pattern = 0x1a2;

/// The full flight tag set.
pub const PATTERNS: [Pattern; 3] = [0x1a2, 0x154, 0x1a4];

const INK: u8 = 0;
const PAPER: u8 = 255;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Renders tags into grayscale frames.
#[derive(Debug, Clone)]
pub struct SceneRenderer {
    pub geometry: TagGeometry,
    pub intrinsics: CameraIntrinsics,
    pub codec: PatternCodec,
    pub width: u32,
    pub height: u32,

    /// Width of the black frame printed around each tag's outer square
    pub frame_width: f64,
}

/// An image source replaying a fixed list of frames.
pub struct MemorySource {
    frames: VecDeque<Result<GrayImage, CamError>>,
    width: u32,
    height: u32,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for SceneRenderer {
    fn default() -> Self {
        Self {
            geometry: TagGeometry::default(),
            intrinsics: CameraIntrinsics::pinhole(
                579.51952713850142, 579.51952713850142, 319.5, 239.5
            ),
            codec: pattern_codec_3(),
            width: 640,
            height: 480,
            frame_width: 1.5,
        }
    }
}

impl SceneRenderer {
    /// Render the given tags, each placed by its tag to camera transform.
    pub fn render(&self, tags: &[(Pattern, RigidTransform)]) -> GrayImage {
        let cam_to_tags: Vec<(Pattern, RigidTransform)> = tags
            .iter()
            .map(|(p, t)| (*p, t.inverse()))
            .collect();

        let k = &self.intrinsics;

        GrayImage::from_fn(self.width, self.height, |u, v| {
            // Ray through the pixel centre in the camera frame
            let dir_cam = Vector3::new(
                (u as f64 - k.cx) / k.fx,
                (v as f64 - k.cy) / k.fy,
                1.0
            );

            // Nearest tag hit by the ray
            let mut nearest: Option<(f64, bool)> = None;

            for (pattern, cam_to_tag) in cam_to_tags.iter() {
                let origin = cam_to_tag.translation;
                let dir = cam_to_tag.rotation * dir_cam;

                if dir.z.abs() < 1e-12 {
                    continue;
                }
                let s = -origin.z / dir.z;
                if s <= 0.0 {
                    continue;
                }

                let hit = origin + dir * s;
                if let Some(ink) = self.ink_at(*pattern, hit.x, hit.y) {
                    if nearest.map_or(true, |(d, _)| s < d) {
                        nearest = Some((s, ink));
                    }
                }
            }

            match nearest {
                Some((_, true)) => Luma([INK]),
                _ => Luma([PAPER])
            }
        })
    }

    /// Colour of a tag at a point in its frame, `None` outside the printed
    /// area.
    fn ink_at(&self, pattern: Pattern, x: f64, y: f64) -> Option<bool> {
        let g = &self.geometry;
        let l = g.outer_side();
        let f = self.frame_width;

        if x < -f || y < -f || x > l + f || y > l + f {
            return None
        }

        // Black frame around the outer square
        if x < 0.0 || y < 0.0 || x > l || y > l {
            return Some(true)
        }

        for i in 0..g.grid_size {
            let x0 = g.cell_start(i);
            if x < x0 || x > x0 + g.square_side {
                continue;
            }
            for j in 0..g.grid_size {
                let y0 = g.cell_start(j);
                if y >= y0 && y <= y0 + g.square_side {
                    return Some(self.codec.get(pattern, i, j))
                }
            }
        }

        Some(false)
    }
}

impl MemorySource {
    pub fn new(frames: Vec<Result<GrayImage, CamError>>, width: u32, height: u32) -> Self {
        Self {
            frames: frames.into(),
            width,
            height,
        }
    }
}

impl ImageSource for MemorySource {
    fn open(&mut self) -> Result<(u32, u32), CamError> {
        Ok((self.width, self.height))
    }

    fn read_frame(&mut self) -> Result<GrayImage, CamError> {
        self.frames.pop_front().unwrap_or(Err(CamError::EndOfStream))
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Transform placing a tag flat beneath a downward looking camera, with the
/// tag's origin at `(x, y)` in the camera frame and `height` below it.
pub fn tag_below(x: f64, y: f64, height: f64) -> RigidTransform {
    RigidTransform::from_axis_angle(Vector3::zeros(), Vector3::new(x, y, height))
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn pattern_codec_3() -> PatternCodec {
    match PatternCodec::new(3) {
        Ok(c) => c,
        Err(e) => panic!("3x3 codec is always valid: {}", e)
    }
}
