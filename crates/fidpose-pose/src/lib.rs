//! Pose estimation for a single planar square marker.
//!
//! [`estimate_pose`] takes the four decoded corners of one marker in a
//! distortion-free image and returns the marker-to-camera transform as an
//! axis-angle rotation plus translation. [`normals`] turns rotation vectors
//! into surface-normal statistics.

pub mod normals;
mod planar;

pub use normals::{average_normal, facing_angles, marker_normal, FacingAngles, NormalStats};
pub use planar::{
    estimate_pose, marker_object_points, project_points, rotation_from_rvec, rvec_from_rotation,
    PoseError, PoseEstimate,
};
