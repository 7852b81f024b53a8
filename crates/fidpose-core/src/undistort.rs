//! Precomputed undistortion remap.
//!
//! [`RemapTable::build`] runs once per camera; [`RemapTable::apply_rgb`] and
//! [`RemapTable::apply_gray`] then resample every frame with bilinear
//! interpolation and a black border.

use nalgebra::Point2;

use crate::camera::{CameraModel, CameraModelError, ImageSizeMismatch, Intrinsics, LensModel};
use crate::image::{sample_bilinear_interleaved, GrayImage, GrayImageView, RgbImage, RgbImageView};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Source position for destination pixels that have no valid preimage.
/// Both bilinear taps fall outside any image, so they resample to black.
const NO_SOURCE: [f32; 2] = [-4.0, -4.0];

#[derive(Clone, Debug)]
pub struct RemapTable {
    width: usize,
    height: usize,
    /// Source `(x, y)` for every destination pixel, row-major.
    map: Vec<[f32; 2]>,
    rectified: Intrinsics,
}

/// Camera matrix for the undistorted fisheye view (OpenCV
/// `estimateNewCameraMatrixForUndistortRectify` with identity rotation and the
/// calibrated size). `balance = 1` keeps the whole field of view, `0` crops to
/// valid pixels only.
pub fn estimate_new_camera_matrix(
    camera: &CameraModel,
    balance: f64,
) -> Result<Intrinsics, CameraModelError> {
    let w = camera.image_width as f64;
    let h = camera.image_height as f64;
    let k = camera.intrinsics;
    let aspect = k.fx / k.fy;

    let edge_midpoints = [
        Point2::new(w / 2.0, 0.0),
        Point2::new(w, h / 2.0),
        Point2::new(w / 2.0, h),
        Point2::new(0.0, h / 2.0),
    ];
    let pts = edge_midpoints.map(|p| {
        let n = camera.undistort_pixel(p);
        Point2::new(n.x, n.y * aspect)
    });

    let cn = Point2::new(
        pts.iter().map(|p| p.x).sum::<f64>() / 4.0,
        pts.iter().map(|p| p.y).sum::<f64>() / 4.0,
    );
    let min_x = pts.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let max_x = pts.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    let min_y = pts.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let max_y = pts.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);

    let candidates = [
        w * 0.5 / (cn.x - min_x),
        w * 0.5 / (max_x - cn.x),
        h * 0.5 * aspect / (cn.y - min_y),
        h * 0.5 * aspect / (max_y - cn.y),
    ];
    let f_min = candidates.iter().copied().fold(f64::INFINITY, f64::min);
    let f_max = candidates.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let f = balance * f_min + (1.0 - balance) * f_max;
    if !f.is_finite() || f <= 0.0 {
        return Err(CameraModelError::DegenerateRectification);
    }

    let cx = -cn.x * f + w * 0.5;
    let cy = -cn.y * f + h * aspect * 0.5;
    Ok(Intrinsics::new(f, f / aspect, cx, cy / aspect))
}

impl RemapTable {
    /// Precompute the destination-to-source map for `camera`.
    ///
    /// Fisheye cameras get a balance-1 rectified camera matrix; pinhole
    /// cameras keep their calibrated matrix.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(camera)))]
    pub fn build(camera: &CameraModel) -> Result<Self, CameraModelError> {
        camera.validate()?;
        let rectified = match camera.lens {
            LensModel::Fisheye => estimate_new_camera_matrix(camera, 1.0)?,
            LensModel::Pinhole => camera.intrinsics,
        };

        let (width, height) = (camera.image_width, camera.image_height);
        let mut map = Vec::with_capacity(width * height);
        for v in 0..height {
            for u in 0..width {
                let ideal = rectified.pixel_to_normalized(Point2::new(u as f64, v as f64));
                let src = camera
                    .intrinsics
                    .normalized_to_pixel(camera.distort_normalized(ideal));
                map.push(if src.x.is_finite() && src.y.is_finite() {
                    [src.x as f32, src.y as f32]
                } else {
                    NO_SOURCE
                });
            }
        }
        log::debug!(
            "remap table {}x{} built, rectified fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
            width,
            height,
            rectified.fx,
            rectified.fy,
            rectified.cx,
            rectified.cy
        );

        Ok(Self {
            width,
            height,
            map,
            rectified,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Intrinsics of the undistorted view (distortion-free).
    pub fn rectified_intrinsics(&self) -> Intrinsics {
        self.rectified
    }

    /// Source pixel sampled for destination `(x, y)`.
    pub fn source_of(&self, x: usize, y: usize) -> Option<Point2<f32>> {
        let [sx, sy] = *self.map.get(y * self.width + x)?;
        Some(Point2::new(sx, sy))
    }

    fn check(&self, width: usize, height: usize) -> Result<(), ImageSizeMismatch> {
        if width == self.width && height == self.height {
            return Ok(());
        }
        Err(ImageSizeMismatch {
            expected_width: self.width,
            expected_height: self.height,
            actual_width: width,
            actual_height: height,
        })
    }

    fn resample(&self, data: &[u8], channels: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.map.len() * channels);
        for &[sx, sy] in &self.map {
            for c in 0..channels {
                let v = sample_bilinear_interleaved(
                    data,
                    self.width,
                    self.height,
                    channels,
                    c,
                    sx,
                    sy,
                );
                out.push((v + 0.5).clamp(0.0, 255.0) as u8);
            }
        }
        out
    }

    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn apply_rgb(&self, src: &RgbImageView<'_>) -> Result<RgbImage, ImageSizeMismatch> {
        self.check(src.width, src.height)?;
        Ok(RgbImage {
            width: self.width,
            height: self.height,
            data: self.resample(src.data, 3),
        })
    }

    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn apply_gray(&self, src: &GrayImageView<'_>) -> Result<GrayImage, ImageSizeMismatch> {
        self.check(src.width, src.height)?;
        Ok(GrayImage {
            width: self.width,
            height: self.height,
            data: self.resample(src.data, 1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fisheye() -> CameraModel {
        CameraModel {
            intrinsics: Intrinsics::new(300.0, 300.0, 320.0, 240.0),
            distortion: [0.05, -0.01, 0.002, -0.0003],
            image_width: 640,
            image_height: 480,
            lens: LensModel::Fisheye,
        }
    }

    #[test]
    fn ideal_pinhole_remap_is_identity() {
        let cam = CameraModel::ideal(Intrinsics::new(500.0, 500.0, 32.0, 24.0), 64, 48);
        let table = RemapTable::build(&cam).expect("build");
        let mut img = GrayImage::filled(64, 48, 0);
        for (i, v) in img.data.iter_mut().enumerate() {
            *v = (i * 7 % 251) as u8;
        }
        let out = table.apply_gray(&img.view()).expect("same size");
        assert_eq!(out, img);
        assert_eq!(table.rectified_intrinsics(), cam.intrinsics);
    }

    #[test]
    fn balance_one_keeps_edge_midpoints_inside() {
        let cam = fisheye();
        let k = estimate_new_camera_matrix(&cam, 1.0).expect("new K");
        for p in [
            Point2::new(320.0, 0.0),
            Point2::new(640.0, 240.0),
            Point2::new(320.0, 480.0),
            Point2::new(0.0, 240.0),
        ] {
            let q = k.normalized_to_pixel(cam.undistort_pixel(p));
            assert!(q.x >= -1e-6 && q.x <= 640.0 + 1e-6, "x out of view: {q:?}");
            assert!(q.y >= -1e-6 && q.y <= 480.0 + 1e-6, "y out of view: {q:?}");
        }
        // Symmetric camera keeps the principal point centred.
        assert_relative_eq!(k.cx, 320.0, epsilon = 1e-6);
        assert_relative_eq!(k.cy, 240.0, epsilon = 1e-6);
    }

    #[test]
    fn fisheye_remap_round_trips_through_distortion() {
        let cam = fisheye();
        let table = RemapTable::build(&cam).expect("build");
        let k = table.rectified_intrinsics();
        let src = table.source_of(400, 300).expect("in range");
        let back = k.normalized_to_pixel(
            cam.undistort_pixel(Point2::new(src.x as f64, src.y as f64)),
        );
        assert_relative_eq!(back.x, 400.0, epsilon = 1e-2);
        assert_relative_eq!(back.y, 300.0, epsilon = 1e-2);
    }

    #[test]
    fn mismatched_frame_is_rejected() {
        let table = RemapTable::build(&fisheye()).expect("build");
        let rgb = RgbImage {
            width: 320,
            height: 240,
            data: vec![0; 320 * 240 * 3],
        };
        let err = table.apply_rgb(&rgb.view()).unwrap_err();
        assert_eq!(err.actual_width, 320);
        assert_eq!(err.expected_width, 640);
    }
}
