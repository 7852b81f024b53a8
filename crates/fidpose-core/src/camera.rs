//! Calibrated camera: pinhole intrinsics plus a lens distortion model.

use nalgebra::{Matrix3, Point2, Vector3};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CameraModelError {
    #[error("focal lengths must be positive (fx={fx}, fy={fy})")]
    NonPositiveFocal { fx: f64, fy: f64 },
    #[error("camera parameters contain non-finite values")]
    NotFinite,
    #[error("expected 4 distortion coefficients, got {0}")]
    DistortionCount(usize),
    #[error("camera matrix must have the form [[fx,0,cx],[0,fy,cy],[0,0,1]]")]
    MatrixLayout,
    #[error("calibrated image size must be non-zero (got {width}x{height})")]
    ZeroImageSize { width: usize, height: usize },
    #[error("lens model yields a degenerate rectified camera matrix")]
    DegenerateRectification,
}

/// Image dimensions disagree with the calibrated size.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error(
    "image is {actual_width}x{actual_height}, \
     camera is calibrated for {expected_width}x{expected_height}"
)]
pub struct ImageSizeMismatch {
    pub expected_width: usize,
    pub expected_height: usize,
    pub actual_width: usize,
    pub actual_height: usize,
}

/// Pinhole intrinsics `K = [[fx,0,cx],[0,fy,cy],[0,0,1]]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    pub fn k_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    #[inline]
    pub fn pixel_to_normalized(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::new((p.x - self.cx) / self.fx, (p.y - self.cy) / self.fy)
    }

    #[inline]
    pub fn normalized_to_pixel(&self, n: Point2<f64>) -> Point2<f64> {
        Point2::new(self.fx * n.x + self.cx, self.fy * n.y + self.cy)
    }

    /// Project a camera-frame point; `None` for points at or behind the camera.
    pub fn project(&self, p: &Vector3<f64>) -> Option<Point2<f64>> {
        if p.z <= f64::EPSILON {
            return None;
        }
        Some(self.normalized_to_pixel(Point2::new(p.x / p.z, p.y / p.z)))
    }

    fn is_finite(&self) -> bool {
        [self.fx, self.fy, self.cx, self.cy]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Lens distortion family; both take four coefficients.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LensModel {
    /// Equidistant Kannala-Brandt `(k1, k2, k3, k4)`.
    #[default]
    Fisheye,
    /// Brown-Conrady `(k1, k2, p1, p2)`.
    Pinhole,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CameraFile", into = "CameraFile")]
pub struct CameraModel {
    pub intrinsics: Intrinsics,
    pub distortion: [f64; 4],
    pub image_width: usize,
    pub image_height: usize,
    pub lens: LensModel,
}

/// On-disk layout of a calibration file.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct CameraFile {
    camera_matrix: [[f64; 3]; 3],
    distortion_coefficients: Vec<f64>,
    image_width: usize,
    image_height: usize,
    #[serde(default = "default_fisheye")]
    fisheye_model: bool,
}

fn default_fisheye() -> bool {
    true
}

impl TryFrom<CameraFile> for CameraModel {
    type Error = CameraModelError;

    fn try_from(file: CameraFile) -> Result<Self, Self::Error> {
        let k = file.camera_matrix;
        let off_diagonal = [k[0][1], k[1][0], k[2][0], k[2][1]];
        if off_diagonal.iter().any(|v| v.abs() > 1e-9) || (k[2][2] - 1.0).abs() > 1e-9 {
            return Err(CameraModelError::MatrixLayout);
        }
        let distortion: [f64; 4] = file
            .distortion_coefficients
            .as_slice()
            .try_into()
            .map_err(|_| CameraModelError::DistortionCount(file.distortion_coefficients.len()))?;
        let model = CameraModel {
            intrinsics: Intrinsics::new(k[0][0], k[1][1], k[0][2], k[1][2]),
            distortion,
            image_width: file.image_width,
            image_height: file.image_height,
            lens: if file.fisheye_model {
                LensModel::Fisheye
            } else {
                LensModel::Pinhole
            },
        };
        model.validate()?;
        Ok(model)
    }
}

impl From<CameraModel> for CameraFile {
    fn from(m: CameraModel) -> Self {
        let i = m.intrinsics;
        CameraFile {
            camera_matrix: [[i.fx, 0.0, i.cx], [0.0, i.fy, i.cy], [0.0, 0.0, 1.0]],
            distortion_coefficients: m.distortion.to_vec(),
            image_width: m.image_width,
            image_height: m.image_height,
            fisheye_model: m.lens == LensModel::Fisheye,
        }
    }
}

impl CameraModel {
    /// Distortion-free pinhole camera.
    pub fn ideal(intrinsics: Intrinsics, image_width: usize, image_height: usize) -> Self {
        Self {
            intrinsics,
            distortion: [0.0; 4],
            image_width,
            image_height,
            lens: LensModel::Pinhole,
        }
    }

    pub fn validate(&self) -> Result<(), CameraModelError> {
        if !self.intrinsics.is_finite() || !self.distortion.iter().all(|v| v.is_finite()) {
            return Err(CameraModelError::NotFinite);
        }
        let Intrinsics { fx, fy, .. } = self.intrinsics;
        if fx <= 0.0 || fy <= 0.0 {
            return Err(CameraModelError::NonPositiveFocal { fx, fy });
        }
        if self.image_width == 0 || self.image_height == 0 {
            return Err(CameraModelError::ZeroImageSize {
                width: self.image_width,
                height: self.image_height,
            });
        }
        Ok(())
    }

    pub fn check_image_size(&self, width: usize, height: usize) -> Result<(), ImageSizeMismatch> {
        if width == self.image_width && height == self.image_height {
            return Ok(());
        }
        Err(ImageSizeMismatch {
            expected_width: self.image_width,
            expected_height: self.image_height,
            actual_width: width,
            actual_height: height,
        })
    }

    /// Apply lens distortion to an ideal normalized point.
    pub fn distort_normalized(&self, p: Point2<f64>) -> Point2<f64> {
        let [a, b, c, d] = self.distortion;
        match self.lens {
            LensModel::Fisheye => {
                let r = p.x.hypot(p.y);
                if r < 1e-12 {
                    return p;
                }
                let theta = r.atan();
                let t2 = theta * theta;
                let theta_d = theta * (1.0 + t2 * (a + t2 * (b + t2 * (c + t2 * d))));
                let s = theta_d / r;
                Point2::new(p.x * s, p.y * s)
            }
            LensModel::Pinhole => {
                let (x, y) = (p.x, p.y);
                let r2 = x * x + y * y;
                let radial = 1.0 + r2 * (a + r2 * b);
                Point2::new(
                    x * radial + 2.0 * c * x * y + d * (r2 + 2.0 * x * x),
                    y * radial + c * (r2 + 2.0 * y * y) + 2.0 * d * x * y,
                )
            }
        }
    }

    /// Invert [`Self::distort_normalized`] numerically.
    pub fn undistort_normalized(&self, p: Point2<f64>) -> Point2<f64> {
        let [a, b, c, d] = self.distortion;
        match self.lens {
            LensModel::Fisheye => {
                let theta_d = p.x.hypot(p.y).min(std::f64::consts::FRAC_PI_2);
                if theta_d < 1e-12 {
                    return p;
                }
                let mut theta = theta_d;
                for _ in 0..10 {
                    let t2 = theta * theta;
                    let f = theta * (1.0 + t2 * (a + t2 * (b + t2 * (c + t2 * d)))) - theta_d;
                    let df = 1.0 + t2 * (3.0 * a + t2 * (5.0 * b + t2 * (7.0 * c + t2 * 9.0 * d)));
                    if df.abs() < 1e-12 {
                        break;
                    }
                    theta -= f / df;
                }
                let s = theta.tan() / p.x.hypot(p.y);
                Point2::new(p.x * s, p.y * s)
            }
            LensModel::Pinhole => {
                let (mut x, mut y) = (p.x, p.y);
                for _ in 0..20 {
                    let r2 = x * x + y * y;
                    let inv = 1.0 / (1.0 + r2 * (a + r2 * b));
                    let dx = 2.0 * c * x * y + d * (r2 + 2.0 * x * x);
                    let dy = c * (r2 + 2.0 * y * y) + 2.0 * d * x * y;
                    x = (p.x - dx) * inv;
                    y = (p.y - dy) * inv;
                }
                Point2::new(x, y)
            }
        }
    }

    /// Pixel in the raw image to the ideal normalized image plane.
    pub fn undistort_pixel(&self, p: Point2<f64>) -> Point2<f64> {
        self.undistort_normalized(self.intrinsics.pixel_to_normalized(p))
    }
}
