//! # Rigid transforms
//!
//! A `RigidTransform` maps points from a source frame into a target frame as
//! `X -> R X + t`. Frames are named in the order the transform maps them, so
//! `cam_to_world` takes camera frame points into the world frame.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Matrix3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    /// Rotation from the source into the target frame
    pub rotation: Rotation3<f64>,

    /// Position of the source frame origin in the target frame
    pub translation: Vector3<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self {
            rotation: Rotation3::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn new(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self { rotation, translation }
    }

    /// Build a transform from an axis-angle (rotation) vector, whose direction
    /// is the rotation axis and whose norm is the angle in radians.
    pub fn from_axis_angle(axis_angle: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation: Rotation3::new(axis_angle),
            translation,
        }
    }

    /// The rotation as an axis-angle vector.
    pub fn axis_angle(&self) -> Vector3<f64> {
        self.rotation.scaled_axis()
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        *self.rotation.matrix()
    }

    /// Apply `self` and then `other`.
    ///
    /// If `self` maps frame A into B and `other` maps B into C the result
    /// maps A into C: `X -> R2 (R1 X + t1) + t2`.
    pub fn then(&self, other: &RigidTransform) -> RigidTransform {
        RigidTransform {
            rotation: other.rotation * self.rotation,
            translation: other.rotation * self.translation + other.translation,
        }
    }

    /// The transform mapping the target frame back into the source frame.
    pub fn inverse(&self) -> RigidTransform {
        let rot_inv = self.rotation.inverse();

        RigidTransform {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    /// Map a point from the source into the target frame.
    pub fn transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * point + self.translation
    }

    /// Returns true if both the rotations and translations are within the
    /// given tolerances of each other (radians and translation units).
    pub fn approx_eq(&self, other: &RigidTransform, rot_tol: f64, trans_tol: f64) -> bool {
        self.rotation.angle_to(&other.rotation) <= rot_tol
            && (self.translation - other.translation).norm() <= trans_tol
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_then() {
        let a = RigidTransform::from_axis_angle(
            Vector3::new(0.0, 0.0, FRAC_PI_2),
            Vector3::new(1.0, 0.0, 0.0),
        );
        let b = RigidTransform::new(Rotation3::identity(), Vector3::new(0.0, 2.0, 0.0));

        // x axis rotates onto y, then both translations apply
        let p = a.then(&b).transform_point(&Vector3::new(1.0, 0.0, 0.0));
        assert!((p - Vector3::new(1.0, 3.0, 0.0)).norm() < 1e-12);

        // Order matters, b then a rotates b's translation too
        let q = b.then(&a).transform_point(&Vector3::new(1.0, 0.0, 0.0));
        assert!((q - Vector3::new(-1.0, 1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_inverse() {
        let t = RigidTransform::from_axis_angle(
            Vector3::new(0.3, -0.2, 1.1),
            Vector3::new(4.0, -1.0, 20.0),
        );

        assert!(t.then(&t.inverse()).approx_eq(&RigidTransform::identity(), 1e-12, 1e-12));
        assert!(t.inverse().then(&t).approx_eq(&RigidTransform::identity(), 1e-12, 1e-12));

        let p = Vector3::new(0.5, 0.25, -3.0);
        let back = t.inverse().transform_point(&t.transform_point(&p));
        assert!((back - p).norm() < 1e-12);
    }

    #[test]
    fn test_axis_angle() {
        let v = Vector3::new(0.1, 0.2, -0.3);
        let t = RigidTransform::from_axis_angle(v, Vector3::zeros());
        assert!((t.axis_angle() - v).norm() < 1e-12);
        assert_eq!(RigidTransform::identity().axis_angle(), Vector3::zeros());
    }
}
