//! Marker surface normals derived from rotation vectors.

use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::planar::rotation_from_rvec;

/// Direction of the printed face (`R * z`) in the camera frame.
pub fn marker_normal(rvec: &Vector3<f64>) -> Vector3<f64> {
    rotation_from_rvec(rvec) * Vector3::z()
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalStats {
    /// Unit-length mean direction.
    pub mean: Vector3<f64>,
    /// Per-axis sample variance of the individual normals (`n - 1`
    /// denominator); zero for a single pose.
    pub variance: Vector3<f64>,
    pub count: usize,
}

/// Average marker normal over a set of rotation vectors.
///
/// The mean is the sum of the normals scaled to unit length, not divided by
/// the Frobenius norm of the whole set, so its magnitude does not shrink with
/// spread or grow with count. `None` for an empty set or when the normals
/// cancel out.
pub fn average_normal(rvecs: &[Vector3<f64>]) -> Option<NormalStats> {
    let normals: Vec<Vector3<f64>> = rvecs.iter().map(marker_normal).collect();
    let count = normals.len();
    if count == 0 {
        return None;
    }
    let sum: Vector3<f64> = normals.iter().sum();
    let mean = sum.try_normalize(1e-12)?;

    let centroid = sum / count as f64;
    let variance = if count > 1 {
        normals
            .iter()
            .map(|n| (n - centroid).component_mul(&(n - centroid)))
            .sum::<Vector3<f64>>()
            / (count - 1) as f64
    } else {
        Vector3::zeros()
    };
    Some(NormalStats {
        mean,
        variance,
        count,
    })
}

/// Decomposition of a marker orientation relative to a camera-facing marker.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FacingAngles {
    /// In-plane rotation left after tilting the normal onto `-z`, radians
    /// in `[0, pi]`.
    pub around_z: f64,
    /// Tilt between the marker normal and `-z`, radians in `[0, pi]`.
    pub to_normal: f64,
}

/// Tilt the marker normal onto the camera-facing direction `-z` along the
/// shortest arc, then measure how far the marker's x axis is turned.
pub fn facing_angles(rvec: &Vector3<f64>) -> FacingAngles {
    let rotation = rotation_from_rvec(rvec);
    let normal = rotation * Vector3::z();
    let facing = -Vector3::z();
    let to_normal = normal.dot(&facing).clamp(-1.0, 1.0).acos();

    // Antiparallel normals have no unique shortest arc; any half turn about
    // an in-plane axis works.
    let tilt = Rotation3::rotation_between(&normal, &facing)
        .unwrap_or_else(|| Rotation3::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI));
    let x = tilt * rotation * Vector3::x();
    let around_z = x.dot(&Vector3::x()).clamp(-1.0, 1.0).acos();

    FacingAngles {
        around_z,
        to_normal,
    }
}
