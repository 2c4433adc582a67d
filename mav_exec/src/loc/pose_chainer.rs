//! # Pose chainer
//!
//! Splits the tags found in a frame into those already in the landmark map
//! and those that are not. Known tags give the camera pose in the world
//! frame, which is then used to place the unknown tags in the map.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{info, trace};

use super::{LandmarkMap, RigidTransform};
use crate::pattern::{Pattern, PatternCodec, PatternDictionary};
use crate::tag_det::CandidateTag;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A tag whose pattern is in the landmark map.
#[derive(Debug, Clone)]
pub struct KnownTag {
    pub tag: CandidateTag,

    /// Camera pose in the world frame as seen through this tag
    pub cam_to_world: RigidTransform,
}

/// The known patterns and their places in the world.
///
/// The dictionary and map always hold the same set of canonical patterns,
/// which is why they are only modified together through `add_landmark`.
#[derive(Debug, Clone)]
pub struct PoseChainer {
    known: PatternDictionary,
    landmarks: LandmarkMap,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PoseChainer {
    /// Create a chainer knowing only the seed pattern, which defines the
    /// world frame.
    pub fn new(codec: PatternCodec, seed: Pattern) -> Self {
        let mut chainer = Self {
            known: PatternDictionary::new(codec),
            landmarks: LandmarkMap::new(),
        };
        chainer.add_landmark(seed, RigidTransform::identity());

        chainer
    }

    /// Add (or move) a landmark.
    pub fn add_landmark(&mut self, pattern: Pattern, tag_to_world: RigidTransform) {
        self.known.add(pattern);
        self.landmarks.insert(pattern, tag_to_world);
    }

    pub fn is_known(&self, pattern: Pattern) -> bool {
        self.known.contains(pattern)
    }

    pub fn known(&self) -> &PatternDictionary {
        &self.known
    }

    pub fn landmarks(&self) -> &LandmarkMap {
        &self.landmarks
    }

    /// Split the candidates into known and unknown tags, keeping their
    /// detection order.
    pub fn filter_tags(&self, candidates: Vec<CandidateTag>) -> (Vec<KnownTag>, Vec<CandidateTag>) {
        let mut known = Vec::new();
        let mut unknown = Vec::new();

        for tag in candidates {
            // Landmarks are keyed by the candidate's own canonical pattern,
            // which can differ from the dictionary's if rotations collide
            let tag_to_world = if self.known.find_matching_pattern(tag.pattern).is_null() {
                None
            }
            else {
                self.landmarks.get(tag.pattern)
            };

            match tag_to_world {
                Some(tag_to_world) => {
                    let cam_to_world = tag.cam_to_tag.then(tag_to_world);
                    known.push(KnownTag { tag, cam_to_world });
                },
                None => unknown.push(tag)
            }
        }

        trace!("{} known and {} unknown tags", known.len(), unknown.len());

        (known, unknown)
    }

    /// Place the unknown tags in the world using the camera pose of the same
    /// frame, and add them as landmarks.
    ///
    /// If the same pattern appears more than once the last one wins.
    pub fn register_unknown_tags(&mut self, unknown: &[CandidateTag], cam_to_world: &RigidTransform) {
        for tag in unknown {
            let tag_to_world = tag.cam_to_tag.inverse().then(cam_to_world);

            info!(
                "Registered landmark {:#x} at [{:.2}, {:.2}, {:.2}]",
                tag.pattern,
                tag_to_world.translation.x,
                tag_to_world.translation.y,
                tag_to_world.translation.z
            );

            self.add_landmark(tag.pattern, tag_to_world);
        }
    }

    /// The camera pose for a frame, taken from the first known tag in
    /// detection order.
    pub fn frame_pose(known: &[KnownTag]) -> Option<RigidTransform> {
        known.first().map(|k| k.cam_to_world)
    }

    /// Chain a frame's candidates: returns the camera pose if any known tag
    /// was seen, registering the unknown tags against it.
    pub fn process(&mut self, candidates: Vec<CandidateTag>) -> Option<RigidTransform> {
        let (known, unknown) = self.filter_tags(candidates);

        let cam_to_world = Self::frame_pose(&known)?;
        self.register_unknown_tags(&unknown, &cam_to_world);

        Some(cam_to_world)
    }

    /// Consume the chainer, returning the landmark map.
    pub fn into_landmarks(self) -> LandmarkMap {
        self.landmarks
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::tag_det::{DetectorParams, TagDetector};
    use crate::test_utils::{self, SceneRenderer};
    use nalgebra::{Point2, Rotation3, Vector3};
    use std::f64::consts::FRAC_PI_2;

    fn codec() -> PatternCodec {
        PatternCodec::new(3).unwrap()
    }

    /// A candidate as the detector would report it for a tag at the given
    /// pose in the camera frame.
    fn candidate(pattern: Pattern, tag_to_cam: RigidTransform) -> CandidateTag {
        CandidateTag {
            corners: [Point2::origin(); 4],
            pattern,
            observed_pattern: pattern,
            angle: 0,
            square_to_cam: tag_to_cam,
            cam_to_tag: tag_to_cam.inverse(),
        }
    }

    #[test]
    fn test_filter_tags() {
        let chainer = PoseChainer::new(codec(), test_utils::SEED);

        let seed_to_cam = test_utils::tag_below(-5.0, -5.0, 40.0);
        let other_to_cam = test_utils::tag_below(10.0, -5.0, 40.0);

        let (known, unknown) = chainer.filter_tags(vec![
            candidate(test_utils::PATTERNS[1], other_to_cam),
            candidate(test_utils::SEED, seed_to_cam),
        ]);

        assert_eq!(known.len(), 1);
        assert_eq!(unknown.len(), 1);
        assert_eq!(known[0].tag.pattern, test_utils::SEED);
        assert_eq!(unknown[0].pattern, test_utils::PATTERNS[1]);

        // Seed is the world frame, so the camera pose is the inverse of the
        // seed's pose in the camera
        assert!(known[0].cam_to_world.approx_eq(&seed_to_cam.inverse(), 1e-9, 1e-9));
    }

    #[test]
    fn test_filter_uses_candidate_pattern() {
        let c = codec();
        let mut chainer = PoseChainer::new(c, test_utils::SEED);

        // A landmark whose pattern is a rotation of the seed's shadows every
        // seed key in the known dictionary
        let rotated = c.rotate(test_utils::SEED, 1);
        let far = RigidTransform::new(Rotation3::identity(), Vector3::new(100.0, 0.0, 0.0));
        chainer.add_landmark(rotated, far);
        assert_eq!(chainer.known().find_matching_pattern(test_utils::SEED).pattern, rotated);

        let seed_to_cam = test_utils::tag_below(-5.0, -5.0, 40.0);
        let (known, unknown) = chainer.filter_tags(vec![candidate(test_utils::SEED, seed_to_cam)]);

        assert!(unknown.is_empty());
        assert_eq!(known.len(), 1);
        assert!(known[0].cam_to_world.approx_eq(&seed_to_cam.inverse(), 1e-9, 1e-9));
        assert!(chainer.is_known(test_utils::SEED));
    }

    #[test]
    fn test_register_unknown_tags() {
        let mut chainer = PoseChainer::new(codec(), test_utils::SEED);

        let yaw = Rotation3::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);
        let seed_to_cam = test_utils::tag_below(-5.0, -5.0, 40.0);
        let other_to_cam = RigidTransform::new(yaw, Vector3::new(20.0, -5.0, 40.0));

        let pose = chainer.process(vec![
            candidate(test_utils::SEED, seed_to_cam),
            candidate(test_utils::PATTERNS[1], other_to_cam),
        ]);
        assert!(pose.is_some());

        assert!(chainer.is_known(test_utils::PATTERNS[1]));
        assert_eq!(chainer.landmarks().len(), 2);

        let expected = other_to_cam.then(&seed_to_cam.inverse());
        let registered = chainer.landmarks().get(test_utils::PATTERNS[1]).unwrap();
        assert!(registered.approx_eq(&expected, 1e-9, 1e-9));

        // Every rotation of the new pattern resolves in the known dictionary
        let c = codec();
        for k in 0..4 {
            let r = chainer.known().find_matching_pattern(c.rotate(test_utils::PATTERNS[1], k));
            assert_eq!(r.pattern, test_utils::PATTERNS[1]);
        }

        // Seeing only the new tag now gives the same camera pose
        let pose_from_new = chainer
            .process(vec![candidate(test_utils::PATTERNS[1], other_to_cam)])
            .unwrap();
        assert!(pose_from_new.approx_eq(&seed_to_cam.inverse(), 1e-9, 1e-9));
    }

    #[test]
    fn test_no_known_tags() {
        let mut chainer = PoseChainer::new(codec(), test_utils::SEED);

        let pose = chainer.process(vec![
            candidate(test_utils::PATTERNS[2], test_utils::tag_below(0.0, 0.0, 40.0))
        ]);

        assert!(pose.is_none());
        assert!(!chainer.is_known(test_utils::PATTERNS[2]));
        assert_eq!(chainer.landmarks().len(), 1);
    }

    #[test]
    fn test_first_known_tag_wins() {
        let mut chainer = PoseChainer::new(codec(), test_utils::SEED);
        let offset = RigidTransform::new(Rotation3::identity(), Vector3::new(100.0, 0.0, 0.0));
        chainer.add_landmark(test_utils::PATTERNS[1], offset);

        let to_cam = test_utils::tag_below(0.0, 0.0, 40.0);
        let (known, _) = chainer.filter_tags(vec![
            candidate(test_utils::PATTERNS[1], to_cam),
            candidate(test_utils::SEED, to_cam),
        ]);

        let pose = PoseChainer::frame_pose(&known).unwrap();
        assert!((pose.translation.x - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_registration_from_rendered_frame() {
        let renderer = SceneRenderer::default();
        let l = renderer.geometry.outer_side();
        let detector = TagDetector::new(
            renderer.geometry,
            renderer.intrinsics,
            DetectorParams::default()
        );
        let universe = PatternDictionary::from_patterns(codec(), &test_utils::PATTERNS);

        let yaw = Rotation3::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);
        let seed_to_cam = test_utils::tag_below(-(l + 2.5), -l / 2.0, 45.0);

        for other_to_cam in &[
            test_utils::tag_below(2.5, -l / 2.0, 45.0),
            RigidTransform::new(yaw, Vector3::new(2.5 + l, -l / 2.0, 45.0)),
        ] {
            let image = renderer.render(&[
                (test_utils::SEED, seed_to_cam),
                (test_utils::PATTERNS[2], *other_to_cam),
            ]);

            let mut chainer = PoseChainer::new(codec(), test_utils::SEED);
            let tags = detector.find_candidate_tags(&image, &universe);
            assert_eq!(tags.len(), 2);

            let pose = chainer.process(tags).unwrap();
            assert!(pose.approx_eq(&seed_to_cam.inverse(), 0.05, 1.0));

            let expected = other_to_cam.then(&seed_to_cam.inverse());
            let registered = chainer.landmarks().get(test_utils::PATTERNS[2]).unwrap();
            assert!(
                registered.approx_eq(&expected, 0.05, 1.5),
                "registered {:?}, expected {:?}", registered, expected
            );
        }
    }
}
