//! # MAV library.
//!
//! This library allows other crates in the workspace, the executable and the
//! benchmarks to access items defined inside the MAV crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Camera module - image sources and frame undistortion
pub mod cam;

/// Pose estimator - the acquisition loop and the pose channel it publishes on
pub mod estimator;

/// Flight control module - holds position using the published poses
pub mod flight_ctrl;

/// Localisation module - landmark map, pose chaining and pose extraction
pub mod loc;

/// Executable parameters
pub mod params;

/// Pattern module - tag pattern encoding and the rotation dictionary
pub mod pattern;

/// Tag detector - finds tags and their poses in camera frames
pub mod tag_det;

/// Synthetic scenes for tests and benchmarks
pub mod test_utils;
