//! # Pose extractor
//!
//! Decomposes a rotation matrix and translation into a 6-DOF pose.
//!
//! The rotation is assumed to be of the form `R = Rz(phi) Ry(-theta) Rx(psi)`,
//! which gives
//!
//! ```text
//!     | cos(t)cos(f)   -sin(p)sin(t)cos(f) - cos(p)sin(f)   -cos(p)sin(t)cos(f) + sin(p)sin(f) |
//! R = | cos(t)sin(f)   -sin(p)sin(t)sin(f) + cos(p)cos(f)   -cos(p)sin(t)sin(f) - sin(p)cos(f) |
//!     | sin(t)          sin(p)cos(t)                          cos(p)cos(t)                     |
//! ```
//!
//! where `p`, `t` and `f` are psi, theta and phi.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::f64::consts::FRAC_PI_2;
use std::fmt;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Tolerance used to detect the gimbal lock and zero denominators.
pub const EPSILON: f64 = 1e-10;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Position and attitude of the camera in the world frame.
///
/// Positions are in the units of the tag geometry, angles in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,

    /// Rotation about the x axis
    pub psi: f64,

    /// Rotation about the y axis
    pub theta: f64,

    /// Rotation about the z axis
    pub phi: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose3D {
    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }
}

impl fmt::Display for Pose3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.3}, {:.3}, {:.3}, {:.4}, {:.4}, {:.4}]",
            self.x, self.y, self.z, self.psi, self.theta, self.phi
        )
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Find the pose described by the given rotation matrix and translation.
pub fn find_3d_pose(r: &Matrix3<f64>, t: &Vector3<f64>) -> Pose3D {
    let mut pose = Pose3D {
        x: t.x,
        y: t.y,
        z: t.z,
        ..Default::default()
    };

    let sin_theta = r[(2, 0)];

    if (1.0 - sin_theta.abs()).abs() < EPSILON {
        // Gimbal lock, only psi + phi is observable so phi is fixed at zero
        pose.theta = FRAC_PI_2 * sign(sin_theta);
        pose.phi = 0.0;
        pose.psi = atan2_or_quarter(r[(0, 1)], r[(0, 2)]);
    }
    else {
        let mut theta_y = sin_theta.asin();
        if theta_y > FRAC_PI_2 {
            theta_y = std::f64::consts::PI - theta_y;
        }

        let s = sign(theta_y.cos());

        let theta_x = atan2_or_quarter(r[(2, 1)], r[(2, 2)]);
        let theta_z = atan2_or_quarter(r[(1, 0)], r[(0, 0)]);

        pose.psi = theta_x * s;
        pose.theta = theta_y;
        pose.phi = theta_z * s;
    }

    pose
}

/// Build the rotation matrix for the given Euler angles, the inverse of
/// `find_3d_pose` away from the gimbal lock.
pub fn rotation_from_euler(psi: f64, theta: f64, phi: f64) -> Matrix3<f64> {
    let (sp, cp) = psi.sin_cos();
    let (st, ct) = theta.sin_cos();
    let (sf, cf) = phi.sin_cos();

    Matrix3::new(
        ct * cf, -sp * st * cf - cp * sf, -cp * st * cf + sp * sf,
        ct * sf, -sp * st * sf + cp * cf, -cp * st * sf - sp * cf,
        st,      sp * ct,                 cp * ct,
    )
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn sign(value: f64) -> f64 {
    if value < 0.0 { -1.0 } else { 1.0 }
}

/// `atan2(y, x)`, or a quarter turn signed by `y` when `x` is zero.
fn atan2_or_quarter(y: f64, x: f64) -> f64 {
    if x.abs() < EPSILON {
        FRAC_PI_2 * sign(y)
    }
    else {
        y.atan2(x)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Rotation3;
    use proptest::prelude::*;

    #[test]
    fn test_identity() {
        let pose = find_3d_pose(&Matrix3::identity(), &Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(pose, Pose3D { x: 1.0, y: 2.0, z: 3.0, ..Default::default() });
        assert_eq!(format!("{}", pose), "[1.000, 2.000, 3.000, 0.0000, 0.0000, 0.0000]");
    }

    #[test]
    fn test_matches_axis_rotations() {
        // The decomposition matches Rz(phi) Ry(-theta) Rx(psi) built from
        // nalgebra's elementary rotations
        let (psi, theta, phi) = (0.3, -0.4, 1.2);
        let r = Rotation3::from_axis_angle(&Vector3::z_axis(), phi)
            * Rotation3::from_axis_angle(&Vector3::y_axis(), -theta)
            * Rotation3::from_axis_angle(&Vector3::x_axis(), psi);

        assert!((r.matrix() - rotation_from_euler(psi, theta, phi)).norm() < 1e-12);

        let pose = find_3d_pose(r.matrix(), &Vector3::zeros());
        assert!((pose.psi - psi).abs() < 1e-9);
        assert!((pose.theta - theta).abs() < 1e-9);
        assert!((pose.phi - phi).abs() < 1e-9);
    }

    #[test]
    fn test_gimbal_lock() {
        let psi = 0.7;
        let r = rotation_from_euler(psi, FRAC_PI_2, 0.0);
        assert!((r[(2, 0)] - 1.0).abs() < EPSILON);

        let pose = find_3d_pose(&r, &Vector3::zeros());
        assert_eq!(pose.theta, FRAC_PI_2);
        assert_eq!(pose.phi, 0.0);
        assert_eq!(pose.psi, r[(0, 1)].atan2(r[(0, 2)]));

        // Negative lock
        let r = rotation_from_euler(psi, -FRAC_PI_2, 0.0);
        let pose = find_3d_pose(&r, &Vector3::zeros());
        assert_eq!(pose.theta, -FRAC_PI_2);
        assert_eq!(pose.phi, 0.0);
    }

    #[test]
    fn test_gimbal_lock_quarter_fallback() {
        // R[0, 2] is exactly zero so psi takes the quarter turn signed by R[0, 1]
        let r = Matrix3::new(
            0.0, -1.0, 0.0,
            0.0,  0.0, -1.0,
            1.0,  0.0, 0.0,
        );
        let pose = find_3d_pose(&r, &Vector3::zeros());
        assert_eq!(pose.theta, FRAC_PI_2);
        assert_eq!(pose.psi, -FRAC_PI_2);
        assert_eq!(pose.phi, 0.0);
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            psi in -3.1f64..3.1,
            theta in -1.5f64..1.5,
            phi in -3.1f64..3.1,
            x in -100.0f64..100.0
        ) {
            let r = rotation_from_euler(psi, theta, phi);
            let pose = find_3d_pose(&r, &Vector3::new(x, -x, 2.0 * x));

            prop_assert!((pose.psi - psi).abs() < 1e-6);
            prop_assert!((pose.theta - theta).abs() < 1e-6);
            prop_assert!((pose.phi - phi).abs() < 1e-6);
            prop_assert_eq!(pose.position(), Vector3::new(x, -x, 2.0 * x));
        }
    }
}
