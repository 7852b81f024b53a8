//! Synthetic scenes: flat markers ray-cast through a calibrated camera.

#![allow(dead_code)]

use fidpose::aruco::Dictionary;
use fidpose::core::{CameraModel, Intrinsics, LensModel, RgbImage};
use nalgebra::{Point2, Rotation3, Vector3};

const SUPERSAMPLE: usize = 3;
const BACKGROUND: u8 = 215;

/// A square target in the camera frame.
#[derive(Clone, Debug)]
pub struct Placed {
    /// `None` draws a plain black square.
    pub id: Option<u32>,
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl Placed {
    /// Face-on marker (printed side towards the camera, top up).
    pub fn facing(id: u32, x: f64, y: f64, z: f64) -> Self {
        Self {
            id: Some(id),
            rotation: Rotation3::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI),
            translation: Vector3::new(x, y, z),
        }
    }

    pub fn blank(x: f64, y: f64, z: f64) -> Self {
        Self {
            id: None,
            ..Self::facing(0, x, y, z)
        }
    }
}

pub fn pinhole(width: usize, height: usize, f: f64) -> CameraModel {
    CameraModel::ideal(
        Intrinsics::new(f, f, width as f64 / 2.0, height as f64 / 2.0),
        width,
        height,
    )
}

pub fn fisheye(width: usize, height: usize, f: f64) -> CameraModel {
    CameraModel {
        intrinsics: Intrinsics::new(f, f, width as f64 / 2.0, height as f64 / 2.0),
        distortion: [0.04, -0.008, 0.001, -0.0002],
        image_width: width,
        image_height: height,
        lens: LensModel::Fisheye,
    }
}

/// Intensity seen along the normalized ray `(nx, ny, 1)`.
fn shade(ray: Vector3<f64>, dict: &Dictionary, length: f64, scene: &[Placed]) -> f64 {
    let half = length / 2.0;
    let cells = dict.marker_size + 2;
    let mut best: Option<(f64, f64)> = None;
    for target in scene {
        let normal = target.rotation * Vector3::z();
        let denom = normal.dot(&ray);
        if denom.abs() < 1e-12 {
            continue;
        }
        let s = normal.dot(&target.translation) / denom;
        if s <= 0.0 || best.is_some_and(|(d, _)| d <= s) {
            continue;
        }
        let local = target.rotation.inverse() * (ray * s - target.translation);
        if local.x.abs() > half || local.y.abs() > half {
            continue;
        }
        let cx = (((local.x + half) / length * cells as f64) as usize).min(cells - 1);
        let cy = (((half - local.y) / length * cells as f64) as usize).min(cells - 1);
        let inner = (1..=dict.marker_size).contains(&cx) && (1..=dict.marker_size).contains(&cy);
        let white = match target.id {
            Some(id) if inner => dict.bit(id, cx - 1, cy - 1).unwrap_or(false),
            _ => false,
        };
        best = Some((s, if white { 255.0 } else { 0.0 }));
    }
    best.map_or(BACKGROUND as f64, |(_, v)| v)
}

/// Render `scene` as the raw (distorted) image `camera` would record.
pub fn render_scene(
    camera: &CameraModel,
    dict: &Dictionary,
    length: f64,
    scene: &[Placed],
) -> RgbImage {
    let (w, h) = (camera.image_width, camera.image_height);
    let mut data = Vec::with_capacity(w * h * 3);
    for v in 0..h {
        for u in 0..w {
            let mut acc = 0.0;
            for sy in 0..SUPERSAMPLE {
                for sx in 0..SUPERSAMPLE {
                    let p = Point2::new(
                        u as f64 + (sx as f64 + 0.5) / SUPERSAMPLE as f64 - 0.5,
                        v as f64 + (sy as f64 + 0.5) / SUPERSAMPLE as f64 - 0.5,
                    );
                    let n = camera.undistort_pixel(p);
                    acc += shade(Vector3::new(n.x, n.y, 1.0), dict, length, scene);
                }
            }
            let value = (acc / (SUPERSAMPLE * SUPERSAMPLE) as f64).round() as u8;
            data.extend_from_slice(&[value, value, value]);
        }
    }
    RgbImage {
        width: w,
        height: h,
        data,
    }
}

pub fn blank_frame(width: usize, height: usize) -> RgbImage {
    RgbImage {
        width,
        height,
        data: vec![BACKGROUND; width * height * 3],
    }
}
