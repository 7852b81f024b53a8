//! Image file I/O and diagnostic drawing on top of the `image` crate.

use std::path::Path;

use image::{ImageError, Rgb};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use nalgebra::{Point2, Point3};

use crate::aruco::RejectedCandidate;
use crate::core::{GrayImage, Intrinsics, RgbImage};
use crate::pose::project_points;
use crate::result::{FrameResult, MarkerPose};

const MARKER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const CORNER0_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const REJECTED_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
const AXIS_COLORS: [Rgb<u8>; 3] = [Rgb([255, 0, 0]), Rgb([0, 255, 0]), Rgb([0, 0, 255])];

/// Decode any supported image file to 8-bit RGB.
pub fn load_rgb(path: impl AsRef<Path>) -> Result<RgbImage, ImageError> {
    let img = image::open(path)?.to_rgb8();
    Ok(RgbImage {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.into_raw(),
    })
}

pub fn to_image_rgb(img: &RgbImage) -> Option<image::RgbImage> {
    image::RgbImage::from_raw(img.width as u32, img.height as u32, img.data.clone())
}

pub fn to_image_gray(img: &GrayImage) -> Option<image::GrayImage> {
    image::GrayImage::from_raw(img.width as u32, img.height as u32, img.data.clone())
}

fn draw_polyline(canvas: &mut image::RgbImage, pts: &[Point2<f32>; 4], color: Rgb<u8>) {
    for i in 0..4 {
        let (a, b) = (pts[i], pts[(i + 1) % 4]);
        draw_line_segment_mut(canvas, (a.x, a.y), (b.x, b.y), color);
    }
}

pub fn draw_rejected(canvas: &mut image::RgbImage, rejected: &[RejectedCandidate]) {
    for r in rejected {
        draw_polyline(canvas, &r.candidate.corners, REJECTED_COLOR);
    }
}

/// Outline with a dot on corner 0, plus the marker axes (x red, y green,
/// z blue) of length `marker_length / 2`.
pub fn draw_marker_pose(
    canvas: &mut image::RgbImage,
    marker: &MarkerPose,
    intrinsics: &Intrinsics,
    marker_length: f64,
) {
    let corners = &marker.marker.corners;
    draw_polyline(canvas, corners, MARKER_COLOR);
    draw_filled_circle_mut(
        canvas,
        (corners[0].x.round() as i32, corners[0].y.round() as i32),
        3,
        CORNER0_COLOR,
    );

    let a = marker_length / 2.0;
    let axes = [
        Point3::origin(),
        Point3::new(a, 0.0, 0.0),
        Point3::new(0.0, a, 0.0),
        Point3::new(0.0, 0.0, a),
    ];
    let projected = project_points(&marker.pose, &axes, intrinsics);
    let Some(origin) = projected[0] else {
        return;
    };
    for (end, color) in projected[1..].iter().zip(AXIS_COLORS) {
        if let Some(end) = end {
            draw_line_segment_mut(
                canvas,
                (origin.x as f32, origin.y as f32),
                (end.x as f32, end.y as f32),
                color,
            );
        }
    }
}

/// Draw a whole frame result onto the undistorted image it came from.
pub fn draw_frame(
    undistorted: &RgbImage,
    result: &FrameResult,
    intrinsics: &Intrinsics,
    marker_length: f64,
) -> Option<image::RgbImage> {
    let mut canvas = to_image_rgb(undistorted)?;
    draw_rejected(&mut canvas, &result.rejected);
    for m in &result.markers {
        draw_marker_pose(&mut canvas, m, intrinsics, marker_length);
    }
    Some(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aruco::DecodedMarker;
    use crate::pose::PoseEstimate;
    use nalgebra::Vector3;

    #[test]
    fn draws_outline_and_axes() {
        let intrinsics = Intrinsics::new(200.0, 200.0, 50.0, 50.0);
        let marker = MarkerPose {
            marker: DecodedMarker {
                id: 1,
                corners: [
                    Point2::new(40.0, 40.0),
                    Point2::new(60.0, 40.0),
                    Point2::new(60.0, 60.0),
                    Point2::new(40.0, 60.0),
                ],
                rotation: 0,
                hamming: 0,
                inverted: false,
            },
            pose: PoseEstimate {
                rvec: Vector3::new(std::f64::consts::PI, 0.0, 0.0),
                tvec: Vector3::new(0.0, 0.0, 1.0),
                reprojection_rmse: 0.0,
            },
        };
        let frame = FrameResult {
            frame: "f".into(),
            markers: vec![marker],
            dropped_poses: 0,
            rejected: Vec::new(),
        };
        let blank = RgbImage {
            width: 100,
            height: 100,
            data: vec![0; 100 * 100 * 3],
        };
        let canvas = draw_frame(&blank, &frame, &intrinsics, 0.1).expect("canvas");
        // Outline pixel on the bottom edge.
        assert_eq!(*canvas.get_pixel(50, 60), MARKER_COLOR);
        // Corner 0 highlight.
        assert_eq!(*canvas.get_pixel(40, 40), CORNER0_COLOR);
        // x axis runs right from the centre.
        assert_eq!(*canvas.get_pixel(55, 50), AXIS_COLORS[0]);
    }
}
