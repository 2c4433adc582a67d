//! # Planar pose solving
//!
//! Finds the pose of a planar target (lying on `z = 0` in its own frame)
//! from point correspondences in an undistorted image. The pose is
//! initialised from the plane to image homography and then refined by
//! Levenberg-Marquardt minimisation of the reprojection error.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;
use nalgebra::{
    DMatrix, DVector, Matrix3, Matrix6, Point2, Rotation3, Similarity2, Vector2, Vector3, Vector6
};
use thiserror::Error;

use super::geometry::CameraIntrinsics;
use crate::loc::transform::RigidTransform;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Maximum number of refinement iterations.
const MAX_ITERS: usize = 30;

/// Step size used to estimate the Jacobian numerically.
const JACOBIAN_STEP: f64 = 1e-7;

/// Refinement stops once the parameter update is smaller than this.
const STEP_TOLERANCE: f64 = 1e-10;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum PnpError {
    #[error("At least 4 point correspondences are needed, found {0}")]
    TooFewPoints(usize),

    #[error("The number of object points ({0}) does not match the number of image points ({1})")]
    CountMismatch(usize, usize),

    #[error("The correspondences do not define a homography")]
    DegenerateHomography,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Solve for the transform from the target frame into the camera frame.
///
/// `object_points` must lie in the `z = 0` plane.
pub fn solve_planar_pose(
    object_points: &[Vector3<f64>],
    image_points: &[Point2<f64>],
    intrinsics: &CameraIntrinsics,
) -> Result<RigidTransform, PnpError> {
    if object_points.len() != image_points.len() {
        return Err(PnpError::CountMismatch(object_points.len(), image_points.len()))
    }
    if object_points.len() < 4 {
        return Err(PnpError::TooFewPoints(object_points.len()))
    }

    let h = find_homography(object_points, image_points)?;
    let initial = pose_from_homography(&h, intrinsics)?;

    Ok(refine_pose(initial, object_points, image_points, intrinsics))
}

/// Project target frame points through a pose into the image.
///
/// Points behind the camera project to `NaN`.
pub fn project_points(
    object_points: &[Vector3<f64>],
    pose: &RigidTransform,
    intrinsics: &CameraIntrinsics,
) -> Vec<Point2<f64>> {
    object_points
        .iter()
        .map(|p| {
            intrinsics
                .project(&pose.transform_point(p))
                .unwrap_or_else(|| Point2::new(std::f64::NAN, std::f64::NAN))
        })
        .collect()
}

/// Root mean square reprojection error of a pose in pixels.
pub fn reprojection_rms(
    object_points: &[Vector3<f64>],
    image_points: &[Point2<f64>],
    pose: &RigidTransform,
    intrinsics: &CameraIntrinsics,
) -> f64 {
    let projected = project_points(object_points, pose, intrinsics);
    let sum_sq: f64 = projected
        .iter()
        .zip(image_points.iter())
        .map(|(p, q)| (p - q).norm_squared())
        .sum();

    (sum_sq / image_points.len().max(1) as f64).sqrt()
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Direct linear estimate of the homography taking `(x, y, 1)` target
/// coordinates to image coordinates.
///
/// Both point sets are normalised (centroid at the origin, mean distance
/// `sqrt(2)`) before solving with `h33` fixed at one.
fn find_homography(
    object_points: &[Vector3<f64>],
    image_points: &[Point2<f64>],
) -> Result<Matrix3<f64>, PnpError> {
    let obj: Vec<Point2<f64>> = object_points.iter().map(|p| Point2::new(p.x, p.y)).collect();

    let t_obj = normalising_transform(&obj).ok_or(PnpError::DegenerateHomography)?;
    let t_img = normalising_transform(image_points).ok_or(PnpError::DegenerateHomography)?;

    let n = obj.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 8);
    let mut b = DVector::<f64>::zeros(2 * n);

    for (k, (o, i)) in obj.iter().zip(image_points.iter()).enumerate() {
        let o = t_obj.transform_point(o);
        let i = t_img.transform_point(i);
        let (x, y) = (o.x, o.y);
        let (u, v) = (i.x, i.y);

        let r = 2 * k;
        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -u * x;
        a[(r, 7)] = -u * y;
        b[r] = u;

        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -v * x;
        a[(r + 1, 7)] = -v * y;
        b[r + 1] = v;
    }

    // Exact for 4 points, least squares through the normal equations
    // otherwise
    let h = if n == 4 {
        a.lu().solve(&b)
    }
    else {
        let at = a.transpose();
        (&at * &a).lu().solve(&(&at * &b))
    };
    let h = h.ok_or(PnpError::DegenerateHomography)?;

    if h.iter().any(|v| !v.is_finite()) {
        return Err(PnpError::DegenerateHomography)
    }

    let h_norm = Matrix3::new(
        h[0], h[1], h[2],
        h[3], h[4], h[5],
        h[6], h[7], 1.0,
    );

    let t_img_inv = t_img
        .to_homogeneous()
        .try_inverse()
        .ok_or(PnpError::DegenerateHomography)?;

    Ok(t_img_inv * h_norm * t_obj.to_homogeneous())
}

/// Similarity moving the points' centroid to the origin with a mean distance
/// of `sqrt(2)`, or `None` if the points all coincide.
fn normalising_transform(points: &[Point2<f64>]) -> Option<Similarity2<f64>> {
    let n = points.len() as f64;
    let centroid = points.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / n;
    let mean_dist = points.iter().map(|p| (p.coords - centroid).norm()).sum::<f64>() / n;

    if mean_dist < 1e-9 {
        return None
    }

    let scale = std::f64::consts::SQRT_2 / mean_dist;
    Some(Similarity2::new(-centroid * scale, 0.0, scale))
}

/// Decompose a plane induced homography `H ~ K [r1 r2 t]` into a pose.
fn pose_from_homography(
    h: &Matrix3<f64>,
    intrinsics: &CameraIntrinsics,
) -> Result<RigidTransform, PnpError> {
    let k_inv = intrinsics
        .matrix()
        .try_inverse()
        .ok_or(PnpError::DegenerateHomography)?;

    let m = k_inv * h;
    let m1: Vector3<f64> = m.column(0).into_owned();
    let m2: Vector3<f64> = m.column(1).into_owned();
    let m3: Vector3<f64> = m.column(2).into_owned();

    let norm = 0.5 * (m1.norm() + m2.norm());
    if norm <= 1e-12 {
        return Err(PnpError::DegenerateHomography)
    }

    // Scale so the rotation columns are unit length and the target is in
    // front of the camera
    let mut lambda = 1.0 / norm;
    if m3.z < 0.0 {
        lambda = -lambda;
    }

    let r1 = m1 * lambda;
    let r2 = m2 * lambda;
    let r3 = r1.cross(&r2);
    let t = m3 * lambda;

    // Columns of a true rotation are orthonormal, parallel columns mean the
    // image points were collinear
    if r3.norm() < 0.5 {
        return Err(PnpError::DegenerateHomography)
    }

    let mut r = Matrix3::zeros();
    r.set_column(0, &r1);
    r.set_column(1, &r2);
    r.set_column(2, &r3);

    // Nearest rotation matrix
    let svd = r.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(PnpError::DegenerateHomography)
    };

    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    Ok(RigidTransform::new(Rotation3::from_matrix_unchecked(r_orth), t))
}

/// Reprojection residuals `[du0, dv0, du1, dv1, ...]` for a parameter vector
/// `[axis-angle, translation]`.
fn residuals(
    params: &Vector6<f64>,
    object_points: &[Vector3<f64>],
    image_points: &[Point2<f64>],
    intrinsics: &CameraIntrinsics,
) -> Vec<f64> {
    let pose = params_to_pose(params);

    let mut res = Vec::with_capacity(2 * object_points.len());
    for (p, q) in project_points(object_points, &pose, intrinsics).iter().zip(image_points) {
        res.push(p.x - q.x);
        res.push(p.y - q.y);
    }
    res
}

fn params_to_pose(params: &Vector6<f64>) -> RigidTransform {
    RigidTransform::from_axis_angle(
        Vector3::new(params[0], params[1], params[2]),
        Vector3::new(params[3], params[4], params[5]),
    )
}

fn pose_to_params(pose: &RigidTransform) -> Vector6<f64> {
    let r = pose.axis_angle();
    let t = pose.translation;
    Vector6::new(r.x, r.y, r.z, t.x, t.y, t.z)
}

fn cost(res: &[f64]) -> f64 {
    res.iter().map(|r| r * r).sum()
}

/// Levenberg-Marquardt refinement of the reprojection error.
fn refine_pose(
    initial: RigidTransform,
    object_points: &[Vector3<f64>],
    image_points: &[Point2<f64>],
    intrinsics: &CameraIntrinsics,
) -> RigidTransform {
    let mut params = pose_to_params(&initial);
    let mut res = residuals(&params, object_points, image_points, intrinsics);
    let mut current_cost = cost(&res);

    if !current_cost.is_finite() {
        return initial
    }

    let mut lambda = 1e-3;

    for iter in 0..MAX_ITERS {
        // Numerical Jacobian, one column per parameter
        let mut jac: Vec<Vector6<f64>> = vec![Vector6::zeros(); res.len()];
        for p in 0..6 {
            let mut stepped = params;
            stepped[p] += JACOBIAN_STEP;
            let res_p = residuals(&stepped, object_points, image_points, intrinsics);

            for (row, (rp, r0)) in jac.iter_mut().zip(res_p.iter().zip(res.iter())) {
                row[p] = (rp - r0) / JACOBIAN_STEP;
            }
        }

        let mut jtj = Matrix6::<f64>::zeros();
        let mut jtr = Vector6::<f64>::zeros();
        for (row, r) in jac.iter().zip(res.iter()) {
            jtj += row * row.transpose();
            jtr += row * *r;
        }

        let mut improved = false;

        // Increase damping until a step reduces the cost
        while lambda < 1e10 {
            let mut damped = jtj;
            for d in 0..6 {
                damped[(d, d)] += lambda * jtj[(d, d)].max(1e-12);
            }

            let step = match damped.cholesky() {
                Some(c) => c.solve(&(-jtr)),
                None => {
                    lambda *= 10.0;
                    continue;
                }
            };

            let candidate = params + step;
            let cand_res = residuals(&candidate, object_points, image_points, intrinsics);
            let cand_cost = cost(&cand_res);

            if cand_cost.is_finite() && cand_cost < current_cost {
                params = candidate;
                res = cand_res;
                current_cost = cand_cost;
                lambda = (lambda / 10.0).max(1e-12);
                improved = step.norm() > STEP_TOLERANCE;
                break;
            }

            lambda *= 10.0;
        }

        if !improved {
            trace!("PnP refinement finished after {} iterations, cost {:.3e}", iter, current_cost);
            break;
        }
    }

    params_to_pose(&params)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
