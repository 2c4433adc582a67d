//! # Localisation module
//!
//! This module provides localisation for the vehicle from fiducial tags.
//! Tags found by the detector are chained through the landmark map to give
//! the camera pose in the world frame, and tags seen alongside a known one
//! are added to the map as they are discovered.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod landmark_map;
pub mod pose_chainer;
pub mod pose_extractor;
pub mod transform;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use landmark_map::{LandmarkMap, LandmarkRecord};
pub use pose_chainer::{KnownTag, PoseChainer};
pub use pose_extractor::{find_3d_pose, Pose3D};
pub use transform::RigidTransform;
