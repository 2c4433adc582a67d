//! # Tag detector
//!
//! Finds fiducial tags in undistorted grayscale frames. Each frame is edge
//! detected and its contours traced, closed four sided contours with enough
//! inner blobs are treated as candidate tags, their corners are refined on
//! the image gradient, their pose is solved from the outer corners and the
//! grid cells are sampled to read the pattern. Tags
//! whose pattern resolves in the candidate dictionary are returned along
//! with the camera pose in the tag's canonical frame.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod corners;
pub mod geometry;
pub mod pnp;
pub mod polygon;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::convert::TryInto;
use std::f64::consts::FRAC_PI_2;

use image::GrayImage;
use imageproc::contours::{find_contours, Contour};
use imageproc::edges::canny;
use log::trace;
use nalgebra::{Point2, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::loc::transform::RigidTransform;
use crate::pattern::{Pattern, PatternDictionary, NULL_PATTERN};
use corners::EdgeGradients;
pub use geometry::{CameraIntrinsics, TagGeometry};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Tuning parameters of the detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorParams {
    /// Lower hysteresis threshold of the edge detector
    pub canny_low: f64,

    /// Upper hysteresis threshold of the edge detector
    pub canny_high: f64,

    /// Maximum distance in pixels between a contour and its approximating
    /// polygon
    pub poly_epsilon: f64,

    /// Maximum distance in pixels between the first and last points of a
    /// contour for it to count as closed
    pub closing_tolerance: f64,

    /// Minimum number of inner blobs for a quadrilateral to be sampled
    pub min_inner_blobs: usize,
}

/// A tag found in a single frame.
#[derive(Debug, Clone)]
pub struct CandidateTag {
    /// Outer corners in the image, ordered to match the reference square
    pub corners: [Point2<f64>; 4],

    /// Canonical pattern of the tag
    pub pattern: Pattern,

    /// Pattern as read from the image
    pub observed_pattern: Pattern,

    /// Number of quarter turns taking the canonical pattern to the observed
    /// one
    pub angle: u8,

    /// Transform from the reference square frame to the camera frame, as
    /// solved from the corners
    pub square_to_cam: RigidTransform,

    /// Transform from the camera frame into the tag's canonical frame
    pub cam_to_tag: RigidTransform,
}

/// Detector for a single tag geometry and camera.
#[derive(Debug, Clone)]
pub struct TagDetector {
    geometry: TagGeometry,
    intrinsics: CameraIntrinsics,
    params: DetectorParams,
    reference_square: [Vector3<f64>; 4],
    sample_grid: Vec<Vector3<f64>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 100.0,
            poly_epsilon: 10.0,
            closing_tolerance: 1000.0,
            min_inner_blobs: 2,
        }
    }
}

impl TagDetector {
    /// Create a new detector.
    ///
    /// Frames given to the detector must already be undistorted, so any
    /// distortion in `intrinsics` is ignored.
    pub fn new(geometry: TagGeometry, intrinsics: CameraIntrinsics, params: DetectorParams) -> Self {
        Self {
            reference_square: geometry.reference_square(),
            sample_grid: geometry.sample_grid(),
            geometry,
            intrinsics: intrinsics.undistorted(),
            params,
        }
    }

    pub fn geometry(&self) -> &TagGeometry {
        &self.geometry
    }

    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    /// Find all tags in the frame whose pattern is in `candidates`, in the
    /// order their contours are found.
    pub fn find_candidate_tags(
        &self,
        image: &GrayImage,
        candidates: &PatternDictionary
    ) -> Vec<CandidateTag> {
        let edge_map = canny(
            image,
            self.params.canny_low as f32,
            self.params.canny_high as f32
        );
        let contours: Vec<Contour<i32>> = find_contours(&edge_map);

        // Direct children of each border, in the order they were found
        let mut children = vec![Vec::new(); contours.len()];
        for (idx, contour) in contours.iter().enumerate() {
            if let Some(parent) = contour.parent {
                children[parent].push(idx);
            }
        }

        let gradients = EdgeGradients::new(image);
        let mut tags = Vec::new();

        for (idx, contour) in contours.iter().enumerate() {
            // Only closed contours
            let (first, last) = match (contour.points.first(), contour.points.last()) {
                (Some(f), Some(l)) => (f, l),
                _ => continue
            };
            let dx = (first.x - last.x) as f64;
            let dy = (first.y - last.y) as f64;
            if (dx * dx + dy * dy).sqrt() >= self.params.closing_tolerance {
                continue;
            }

            let quad: [Point2<i32>; 4] =
                match polygon::approx_closed_contour(&contour.points, self.params.poly_epsilon)
                    .as_slice()
                    .try_into()
                {
                    Ok(q) => q,
                    Err(_) => continue
                };

            // Direct children with at least four vertices are the filled cells
            let mut blobs: Vec<Vec<Point2<i32>>> = children[idx]
                .iter()
                .map(|&c| polygon::approx_closed_contour(&contours[c].points, self.params.poly_epsilon))
                .filter(|p| p.len() >= 4)
                .collect();

            if blobs.len() < self.params.min_inner_blobs {
                continue;
            }

            if let Some(tag) = self.resolve_candidate(&quad, &mut blobs, &gradients, candidates) {
                trace!(
                    "Contour {} is tag {:#x} at angle {} ({} blobs)",
                    idx, tag.pattern, tag.angle, children[idx].len()
                );
                tags.push(tag);
            }
        }

        tags
    }

    /// Solve the pose of a quadrilateral, read its pattern from the blobs and
    /// resolve it against the candidate dictionary.
    fn resolve_candidate(
        &self,
        quad: &[Point2<i32>; 4],
        blobs: &mut Vec<Vec<Point2<i32>>>,
        gradients: &EdgeGradients,
        candidates: &PatternDictionary
    ) -> Option<CandidateTag> {
        let codec = candidates.codec();
        let n = self.geometry.grid_size;
        let corners = corners::refine_corners(gradients, &polygon::normalise_corners(quad));

        let square_to_cam = match pnp::solve_planar_pose(
            &self.reference_square, &corners, &self.intrinsics
        ) {
            Ok(p) => p,
            Err(e) => {
                trace!("Could not solve quadrilateral pose: {}", e);
                return None
            }
        };

        // Each blob can fill at most one cell
        let samples = pnp::project_points(&self.sample_grid, &square_to_cam, &self.intrinsics);
        let mut observed = NULL_PATTERN;

        for (z, sample) in samples.iter().enumerate() {
            if let Some(hit) = blobs.iter().position(|b| polygon::point_in_polygon(b, sample)) {
                observed = codec.set(observed, z / n, z % n);
                blobs.remove(hit);
            }
        }

        let rot = candidates.find_matching_pattern(observed);
        if rot.is_null() {
            trace!("Unresolved pattern:\n{}", codec.format(observed));
            return None
        }

        let canonical_to_square = self.rotation_correction(rot.angle);
        let cam_to_tag = canonical_to_square.then(&square_to_cam).inverse();

        Some(CandidateTag {
            corners,
            pattern: rot.pattern,
            observed_pattern: observed,
            angle: rot.angle,
            square_to_cam,
            cam_to_tag,
        })
    }

    /// Transform from the canonical tag frame into the reference square frame
    /// for a tag seen rotated by `angle` quarter turns.
    ///
    /// The observed grid reads cell `(i, j)` from the canonical cell given by
    /// the pattern rotation, which amounts to a yaw of `angle` quarter turns
    /// about the square's corner followed by a shift that brings the square
    /// back onto itself.
    fn rotation_correction(&self, angle: u8) -> RigidTransform {
        let l = self.geometry.outer_side();

        let tx = if angle == 1 || angle == 2 { l } else { 0.0 };
        let ty = if angle == 2 || angle == 3 { l } else { 0.0 };

        RigidTransform::new(
            Rotation3::from_axis_angle(&Vector3::z_axis(), angle as f64 * FRAC_PI_2),
            Vector3::new(tx, ty, 0.0),
        )
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::pattern::PatternCodec;
    use crate::test_utils::{self, SceneRenderer};

    fn setup() -> (TagDetector, PatternDictionary, SceneRenderer) {
        let renderer = SceneRenderer::default();
        let detector = TagDetector::new(
            renderer.geometry,
            renderer.intrinsics,
            DetectorParams::default()
        );
        let dict = PatternDictionary::from_patterns(
            PatternCodec::new(3).unwrap(),
            &test_utils::PATTERNS
        );

        (detector, dict, renderer)
    }

    #[test]
    fn test_rotation_correction() {
        let (detector, dict, _) = setup();
        let codec = dict.codec();
        let geom = detector.geometry;
        let grid = geom.sample_grid();
        let n = geom.grid_size;

        // For each angle the correction must take the canonical centre of
        // the cell a reading comes from onto the sample point it is read at
        for angle in 0..4u8 {
            let corr = detector.rotation_correction(angle);

            for i in 0..n {
                for j in 0..n {
                    let src = codec.rotate(codec.set(0, i, j), -(angle as i32));
                    let (si, sj) = (0..n)
                        .flat_map(|a| (0..n).map(move |b| (a, b)))
                        .find(|&(a, b)| codec.get(src, a, b))
                        .unwrap();

                    let mapped = corr.transform_point(&grid[si * n + sj]);
                    assert!(
                        (mapped - grid[i * n + j]).norm() < 1e-9,
                        "angle {} cell ({}, {})", angle, i, j
                    );
                }
            }
        }
    }

    #[test]
    fn test_single_frontal_tag() {
        let (detector, dict, renderer) = setup();
        let l = renderer.geometry.outer_side();

        // Tag centred below a camera looking straight down at 45 cm
        let tag_to_cam = RigidTransform::new(
            Rotation3::identity(),
            Vector3::new(-l / 2.0, -l / 2.0, 45.0)
        );
        let image = renderer.render(&[(test_utils::SEED, tag_to_cam)]);

        let tags = detector.find_candidate_tags(&image, &dict);
        assert_eq!(tags.len(), 1);

        let tag = &tags[0];
        assert_eq!(tag.pattern, test_utils::SEED);
        assert_eq!(tag.angle, 0);
        assert!(
            tag.cam_to_tag.approx_eq(&tag_to_cam.inverse(), 0.05, 1.0),
            "cam_to_tag {:?}", tag.cam_to_tag
        );
    }

    #[test]
    fn test_rotated_tag_resolves_canonical_frame() {
        let (detector, dict, renderer) = setup();
        let l = renderer.geometry.outer_side();

        for &pattern in test_utils::PATTERNS.iter() {
            for quarter in 0..4 {
                let yaw = Rotation3::from_axis_angle(&Vector3::z_axis(), quarter as f64 * FRAC_PI_2);
                // Keep the tag centre under the camera
                let centre = yaw * Vector3::new(l / 2.0, l / 2.0, 0.0);
                let tag_to_cam = RigidTransform::new(yaw, Vector3::new(0.0, 0.0, 50.0) - centre);

                let image = renderer.render(&[(pattern, tag_to_cam)]);
                let tags = detector.find_candidate_tags(&image, &dict);

                assert_eq!(tags.len(), 1, "{:#x} quarter {}", pattern, quarter);
                assert_eq!(tags[0].pattern, pattern);
                assert!(
                    tags[0].cam_to_tag.approx_eq(&tag_to_cam.inverse(), 0.02, 0.5),
                    "{:#x} quarter {}: cam_to_tag {:?}", pattern, quarter, tags[0].cam_to_tag
                );
            }
        }
    }

    #[test]
    fn test_corners_subpixel() {
        let (detector, dict, renderer) = setup();

        // Slightly yawed and tilted so no side lies along a pixel row
        let tag_to_cam = RigidTransform::new(
            Rotation3::from_euler_angles(0.15, -0.1, 0.3),
            Vector3::new(-6.0, -8.0, 50.0)
        );
        let image = renderer.render(&[(test_utils::SEED, tag_to_cam)]);

        let tags = detector.find_candidate_tags(&image, &dict);
        assert_eq!(tags.len(), 1);

        let truth = pnp::project_points(
            &renderer.geometry.reference_square(),
            &tag_to_cam,
            &renderer.intrinsics
        );

        // Every true corner is matched within a pixel of a binary render
        for t in truth.iter() {
            let err = tags[0].corners
                .iter()
                .map(|c| (c - t).norm())
                .fold(f64::INFINITY, f64::min);
            assert!(err < 0.6, "corner {:?} off by {:.3} px", t, err);
        }
    }

    #[test]
    fn test_unknown_pattern_discarded() {
        let (detector, _, renderer) = setup();
        let dict = PatternDictionary::from_patterns(PatternCodec::new(3).unwrap(), &[0x1a4]);

        let tag_to_cam = RigidTransform::new(Rotation3::identity(), Vector3::new(-7.0, -7.0, 45.0));
        let image = renderer.render(&[(test_utils::SEED, tag_to_cam)]);

        assert!(detector.find_candidate_tags(&image, &dict).is_empty());
    }

    #[test]
    fn test_blank_frame() {
        let (detector, dict, renderer) = setup();
        let image = renderer.render(&[]);
        assert!(detector.find_candidate_tags(&image, &dict).is_empty());
    }
}
