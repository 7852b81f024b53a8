//! Pose of a single square marker from its four image corners.
//!
//! The solve is direct: the plane-to-image homography in normalized camera
//! coordinates is decomposed into `[r1 r2 t]` up to scale, the third rotation
//! column is completed by a cross product and the result is projected onto
//! SO(3). For four exact correspondences this reproduces the generating pose.

use fidpose_core::{homography_from_4pt, Intrinsics};
use nalgebra::{Matrix3, Point2, Point3, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Twice the smallest triangle area (px²) any three corners may span.
const MIN_TRIANGLE_AREA2: f64 = 1e-3;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    #[error("degenerate marker geometry: {0}")]
    Degenerate(&'static str),
    #[error("pose solve produced non-finite values")]
    NotFinite,
    #[error("marker length must be positive and finite (got {0})")]
    MarkerLength(f64),
}

/// Marker-to-camera transform: `X_cam = R(rvec) * X_marker + tvec`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseEstimate {
    /// Axis-angle rotation, radians.
    pub rvec: Vector3<f64>,
    /// Same unit as the marker length.
    pub tvec: Vector3<f64>,
    /// RMS corner reprojection error in pixels.
    pub reprojection_rmse: f64,
}

impl PoseEstimate {
    pub fn rotation(&self) -> Rotation3<f64> {
        rotation_from_rvec(&self.rvec)
    }

    pub fn to_camera(&self, p: &Point3<f64>) -> Vector3<f64> {
        self.rotation() * p.coords + self.tvec
    }
}

/// Axis-angle vector of `rotation`, angle in `[0, pi]`.
///
/// Goes through a unit quaternion: a camera-facing marker sits at a rotation
/// angle near pi, where reading the axis off the matrix is unstable.
pub fn rvec_from_rotation(rotation: &Rotation3<f64>) -> Vector3<f64> {
    UnitQuaternion::from_rotation_matrix(rotation).scaled_axis()
}

pub fn rotation_from_rvec(rvec: &Vector3<f64>) -> Rotation3<f64> {
    UnitQuaternion::from_scaled_axis(*rvec).to_rotation_matrix()
}

/// Marker corners in the marker frame, matching the decoded corner order:
/// top-left, top-right, bottom-right, bottom-left with `+y` up and `+z` out
/// of the printed face.
pub fn marker_object_points(marker_length: f64) -> [Point3<f64>; 4] {
    let h = marker_length / 2.0;
    [
        Point3::new(-h, h, 0.0),
        Point3::new(h, h, 0.0),
        Point3::new(h, -h, 0.0),
        Point3::new(-h, -h, 0.0),
    ]
}

/// Project marker-frame points through `pose` and a distortion-free camera.
/// Points at or behind the camera yield `None`.
pub fn project_points(
    pose: &PoseEstimate,
    points: &[Point3<f64>],
    intrinsics: &Intrinsics,
) -> Vec<Option<Point2<f64>>> {
    let r = pose.rotation();
    points
        .iter()
        .map(|p| intrinsics.project(&(r * p.coords + pose.tvec)))
        .collect()
}

fn check_spread(corners: &[Point2<f64>; 4]) -> Result<(), PoseError> {
    for skip in 0..4 {
        let mut tri = (0..4).filter(|&i| i != skip).map(|i| corners[i]);
        let (Some(a), Some(b), Some(c)) = (tri.next(), tri.next(), tri.next()) else {
            continue;
        };
        let area2 = (b - a).perp(&(c - a)).abs();
        if area2 < MIN_TRIANGLE_AREA2 {
            return Err(PoseError::Degenerate("three corners are collinear"));
        }
    }
    Ok(())
}

/// Split a plane-to-normalized-image homography into rotation and translation.
fn decompose(h: &Matrix3<f64>) -> Result<(Rotation3<f64>, Vector3<f64>), PoseError> {
    let h1 = h.column(0).into_owned();
    let h2 = h.column(1).into_owned();
    let h3 = h.column(2).into_owned();

    let (n1, n2) = (h1.norm(), h2.norm());
    if n1 <= 1e-12 || n2 <= 1e-12 {
        return Err(PoseError::Degenerate("homography has a null column"));
    }
    let lambda = 2.0 / (n1 + n2);
    let (mut r1, mut r2, mut t) = (h1 * lambda, h2 * lambda, h3 * lambda);
    // The marker must lie in front of the camera.
    if t.z < 0.0 {
        r1 = -r1;
        r2 = -r2;
        t = -t;
    }
    let r3 = r1.cross(&r2);
    if r3.norm() <= 1e-12 {
        return Err(PoseError::Degenerate("rotation columns are parallel"));
    }

    let svd = Matrix3::from_columns(&[r1, r2, r3]).svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(PoseError::Degenerate("rotation projection failed"));
    };
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u = u;
        u.column_mut(2).neg_mut();
        r = u * v_t;
    }
    Ok((Rotation3::from_matrix_unchecked(r), t))
}

/// Estimate the pose of a square marker of side `marker_length` from its
/// four corners (pixel coordinates in a distortion-free view with
/// `intrinsics`), ordered as [`marker_object_points`].
#[cfg_attr(
    feature = "tracing",
    instrument(level = "trace", skip(corners, intrinsics), err)
)]
pub fn estimate_pose(
    corners: &[Point2<f64>; 4],
    marker_length: f64,
    intrinsics: &Intrinsics,
) -> Result<PoseEstimate, PoseError> {
    if !marker_length.is_finite() || marker_length <= 0.0 {
        return Err(PoseError::MarkerLength(marker_length));
    }
    if corners.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(PoseError::NotFinite);
    }
    check_spread(corners)?;

    let object = marker_object_points(marker_length);
    let plane = object.map(|p| Point2::new(p.x, p.y));
    let image = corners.map(|p| intrinsics.pixel_to_normalized(p));
    let h = homography_from_4pt(&plane, &image)
        .ok_or(PoseError::Degenerate("singular plane-to-image homography"))?;
    let (rotation, tvec) = decompose(&h.h)?;

    let rvec = rvec_from_rotation(&rotation);
    if !rvec.iter().chain(tvec.iter()).all(|v| v.is_finite()) {
        return Err(PoseError::NotFinite);
    }
    let mut pose = PoseEstimate {
        rvec,
        tvec,
        reprojection_rmse: 0.0,
    };

    let mut sq = 0.0;
    for (proj, obs) in project_points(&pose, &object, intrinsics).iter().zip(corners) {
        let proj = proj.ok_or(PoseError::Degenerate("corner projects behind the camera"))?;
        sq += (proj - obs).norm_squared();
    }
    pose.reprojection_rmse = (sq / 4.0).sqrt();
    log::trace!(
        "pose t=({:.4}, {:.4}, {:.4}) rmse={:.3}px",
        tvec.x,
        tvec.y,
        tvec.z,
        pose.reprojection_rmse
    );
    Ok(pose)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn intrinsics() -> Intrinsics {
        Intrinsics::new(800.0, 780.0, 640.0, 360.0)
    }

    fn synthetic(rotation: Rotation3<f64>, t: Vector3<f64>, len: f64) -> [Point2<f64>; 4] {
        let pose = PoseEstimate {
            rvec: rvec_from_rotation(&rotation),
            tvec: t,
            reprojection_rmse: 0.0,
        };
        let pts = project_points(&pose, &marker_object_points(len), &intrinsics());
        [0, 1, 2, 3].map(|i| pts[i].expect("in front of the camera"))
    }

    fn rotation_angle_between(a: &Rotation3<f64>, b: &Rotation3<f64>) -> f64 {
        a.rotation_to(b).angle()
    }

    #[test]
    fn recovers_tilted_pose() {
        // Facing the camera, then tilted.
        let rot = Rotation3::from_euler_angles(0.1, -0.05, 0.2)
            * Rotation3::from_axis_angle(&Vector3::x_axis(), PI);
        let t = Vector3::new(0.1, -0.05, 1.0);
        let corners = synthetic(rot, t, 0.1);

        let pose = estimate_pose(&corners, 0.1, &intrinsics()).expect("pose");
        assert!((pose.tvec - t).norm() < 1e-3 * t.norm());
        assert!(rotation_angle_between(&pose.rotation(), &rot) < 1e-6);
        assert!(pose.reprojection_rmse < 1e-6);
    }

    #[test]
    fn frontal_marker_normal_points_at_camera() {
        let rot = Rotation3::from_axis_angle(&Vector3::x_axis(), PI);
        let corners = synthetic(rot, Vector3::new(-0.15, 0.0, 1.0), 0.1);
        // Corner 0 is the top-left in the image.
        assert!(corners[0].x < corners[1].x && corners[0].y < corners[3].y);

        let pose = estimate_pose(&corners, 0.1, &intrinsics()).expect("pose");
        assert_relative_eq!(pose.tvec.x, -0.15, epsilon = 1e-9);
        assert_relative_eq!(pose.tvec.z, 1.0, epsilon = 1e-9);
        let normal = pose.rotation() * Vector3::z();
        assert_relative_eq!(normal.z, -1.0, epsilon = 1e-9);
    }

    #[test]
    fn translation_scales_with_marker_length() {
        let rot = Rotation3::from_euler_angles(PI - 0.3, 0.2, 0.0);
        let t = Vector3::new(0.02, 0.03, 0.5);
        let corners = synthetic(rot, t, 0.05);
        let small = estimate_pose(&corners, 0.05, &intrinsics()).expect("pose");
        let big = estimate_pose(&corners, 0.10, &intrinsics()).expect("pose");
        assert_relative_eq!(big.tvec, small.tvec * 2.0, epsilon = 1e-9);
        assert!(rotation_angle_between(&big.rotation(), &small.rotation()) < 1e-9);
    }

    #[test]
    fn collinear_corners_are_refused() {
        let corners = [
            Point2::new(10.0, 10.0),
            Point2::new(20.0, 10.0),
            Point2::new(30.0, 10.0),
            Point2::new(10.0, 20.0),
        ];
        assert!(matches!(
            estimate_pose(&corners, 0.1, &intrinsics()),
            Err(PoseError::Degenerate(_))
        ));
    }

    #[test]
    fn bad_inputs_are_refused() {
        let corners = synthetic(
            Rotation3::from_axis_angle(&Vector3::x_axis(), PI),
            Vector3::new(0.0, 0.0, 1.0),
            0.1,
        );
        assert_eq!(
            estimate_pose(&corners, 0.0, &intrinsics()),
            Err(PoseError::MarkerLength(0.0))
        );
        let mut nan = corners;
        nan[2].x = f64::NAN;
        assert_eq!(estimate_pose(&nan, 0.1, &intrinsics()), Err(PoseError::NotFinite));
    }

    #[test]
    fn camera_facing_rotations_round_trip() {
        let facing = Rotation3::from_axis_angle(&Vector3::x_axis(), PI);
        let t = Vector3::new(-0.15, 0.0, 1.0);
        for theta in [0.0, 1e-3, 1e-2, 0.1, 0.5, 1.5, PI - 1e-3, PI] {
            for rot in [
                Rotation3::from_axis_angle(&Vector3::z_axis(), theta) * facing,
                Rotation3::from_axis_angle(&Vector3::y_axis(), theta.min(1.2)) * facing,
            ] {
                let corners = synthetic(rot, t, 0.1);
                let pose = estimate_pose(&corners, 0.1, &intrinsics()).expect("pose");
                let err = rotation_angle_between(&pose.rotation(), &rot);
                assert!(err < 1e-6, "theta {theta}: rotation error {err}");
                assert!((pose.tvec - t).norm() < 1e-6, "theta {theta}: tvec {:?}", pose.tvec);
                assert!(pose.rvec.norm() <= PI + 1e-12);
            }
        }
    }

    #[test]
    fn rvec_conversion_is_stable_at_half_turn() {
        for axis in [Vector3::x_axis(), Vector3::y_axis(), Vector3::z_axis()] {
            let rot = Rotation3::from_axis_angle(&axis, PI);
            let back = rotation_from_rvec(&rvec_from_rotation(&rot));
            assert!(rotation_angle_between(&back, &rot) < 1e-9);
        }
    }

    #[test]
    fn pose_serializes_as_plain_vectors() {
        let pose = PoseEstimate {
            rvec: Vector3::new(PI, 0.0, 0.0),
            tvec: Vector3::new(0.1, -0.2, 1.5),
            reprojection_rmse: 0.25,
        };
        let json = serde_json::to_value(pose).expect("serialize");
        assert_eq!(json["tvec"], serde_json::json!([0.1, -0.2, 1.5]));
        let back: PoseEstimate = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, pose);
    }
}
