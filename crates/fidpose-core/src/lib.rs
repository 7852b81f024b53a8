//! Geometry and raster primitives shared by the fidpose crates.
//!
//! Everything here is independent of the marker family: image buffers,
//! homographies, the calibrated camera model and the undistortion remap.

mod camera;
mod homography;
mod image;
mod logger;
mod undistort;

pub use camera::{CameraModel, CameraModelError, ImageSizeMismatch, Intrinsics, LensModel};
pub use homography::{homography_from_4pt, homography_from_points, warp_quad_to_square, Homography};
pub use image::{
    sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView, RgbImage, RgbImageView,
};
pub use undistort::{estimate_new_camera_matrix, RemapTable};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{current_frame, frame_scope, init_with_level, verbosity_level, FrameScope};
