//! Undistort, detect, decode and pose every frame.

use std::sync::Arc;

use nalgebra::Point2;

use crate::aruco::{Dictionary, MarkerDetector};
use crate::config::{ConfigError, PipelineConfig};
use crate::core::{CameraModel, ImageSizeMismatch, Intrinsics, RemapTable, RgbImage, RgbImageView};
use crate::pose::estimate_pose;
use crate::result::{FrameResult, MarkerPose, RunReport};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Per-frame failures. The run continues with the next frame.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error(transparent)]
    SizeMismatch(#[from] ImageSizeMismatch),
    #[error("RGB buffer of {width}x{height} needs {expected} bytes, got {actual}")]
    BufferLength {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },
}

/// Read-only state shared by every frame.
#[derive(Debug)]
struct Shared {
    camera: CameraModel,
    remap: RemapTable,
    detector: MarkerDetector,
    marker_length: f64,
    keep_rejected: bool,
}

/// Marker pose pipeline for one calibrated camera.
///
/// Cloning is cheap; clones share the remap table and detector.
#[derive(Clone, Debug)]
pub struct MarkerPipeline {
    shared: Arc<Shared>,
}

impl MarkerPipeline {
    /// Validate everything and precompute the undistortion remap.
    pub fn new(camera: CameraModel, config: &PipelineConfig) -> Result<Self, ConfigError> {
        let dictionary = config.validate()?.dictionary();
        Self::with_dictionary(camera, dictionary, config)
    }

    /// Like [`Self::new`] with an explicit dictionary; `config.dictionary`
    /// is ignored.
    pub fn with_dictionary(
        camera: CameraModel,
        dictionary: Dictionary,
        config: &PipelineConfig,
    ) -> Result<Self, ConfigError> {
        if !config.marker_length.is_finite() || config.marker_length <= 0.0 {
            return Err(ConfigError::MarkerLength(config.marker_length));
        }
        let remap = RemapTable::build(&camera)?;
        let detector = MarkerDetector::new(dictionary, config.detector.clone())?;
        log::info!(
            "pipeline ready: {} markers of {} at {}x{}",
            dictionary.name,
            config.marker_length,
            camera.image_width,
            camera.image_height
        );
        Ok(Self {
            shared: Arc::new(Shared {
                camera,
                remap,
                detector,
                marker_length: config.marker_length,
                keep_rejected: config.keep_rejected,
            }),
        })
    }

    pub fn camera(&self) -> &CameraModel {
        &self.shared.camera
    }

    pub fn detector(&self) -> &MarkerDetector {
        &self.shared.detector
    }

    pub fn marker_length(&self) -> f64 {
        self.shared.marker_length
    }

    /// Intrinsics of the undistorted view, which has no distortion left.
    pub fn rectified_intrinsics(&self) -> Intrinsics {
        self.shared.remap.rectified_intrinsics()
    }

    /// Remove lens distortion from a raw frame.
    pub fn undistort(&self, image: &RgbImageView<'_>) -> Result<RgbImage, FrameError> {
        if !image.is_consistent() {
            return Err(FrameError::BufferLength {
                width: image.width,
                height: image.height,
                expected: image.width * image.height * 3,
                actual: image.data.len(),
            });
        }
        self.shared
            .camera
            .check_image_size(image.width, image.height)?;
        Ok(self.shared.remap.apply_rgb(image)?)
    }

    /// Detect and pose markers in an already undistorted frame.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self, undistorted)))]
    pub fn process_undistorted(&self, frame: &str, undistorted: &RgbImageView<'_>) -> FrameResult {
        let _scope = crate::core::frame_scope(frame);
        let shared = &self.shared;
        let gray = undistorted.to_gray();
        let detection = shared.detector.detect(&gray.view());
        let intrinsics = shared.remap.rectified_intrinsics();

        let mut markers = Vec::with_capacity(detection.markers.len());
        let mut dropped_poses = 0;
        for marker in detection.markers {
            let corners = marker.corners.map(|c| Point2::new(c.x as f64, c.y as f64));
            match estimate_pose(&corners, shared.marker_length, &intrinsics) {
                Ok(pose) => markers.push(MarkerPose { marker, pose }),
                Err(err) => {
                    log::warn!("dropping marker {}: {err}", marker.id);
                    dropped_poses += 1;
                }
            }
        }
        log::info!(
            "{} markers posed, {} dropped, {} candidates rejected",
            markers.len(),
            dropped_poses,
            detection.rejected.len()
        );

        FrameResult {
            frame: frame.to_string(),
            markers,
            dropped_poses,
            rejected: if shared.keep_rejected {
                detection.rejected
            } else {
                Vec::new()
            },
        }
    }

    /// Full pipeline for one raw frame.
    pub fn process_frame(
        &self,
        frame: &str,
        image: &RgbImageView<'_>,
    ) -> Result<FrameResult, FrameError> {
        let undistorted = self.undistort(image)?;
        Ok(self.process_undistorted(frame, &undistorted.view()))
    }

    /// Process frames in order. Failed frames are reported and skipped.
    pub fn run<I, S>(&self, frames: I) -> RunReport
    where
        I: IntoIterator<Item = (S, RgbImage)>,
        S: AsRef<str>,
    {
        let mut report = RunReport::default();
        for (name, image) in frames {
            let name = name.as_ref();
            let _scope = crate::core::frame_scope(name);
            let outcome = self.process_frame(name, &image.view());
            if let Err(err) = &outcome {
                log::warn!("skipped: {err}");
            }
            report.record(name, outcome);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LensModel;

    fn camera(width: usize, height: usize) -> CameraModel {
        CameraModel {
            intrinsics: Intrinsics::new(500.0, 500.0, width as f64 / 2.0, height as f64 / 2.0),
            distortion: [0.01, 0.0, 0.0, 0.0],
            image_width: width,
            image_height: height,
            lens: LensModel::Fisheye,
        }
    }

    #[test]
    fn blank_frame_has_no_markers() {
        let pipeline = MarkerPipeline::new(camera(160, 120), &PipelineConfig::default())
            .expect("pipeline");
        let frame = RgbImage {
            width: 160,
            height: 120,
            data: vec![200; 160 * 120 * 3],
        };
        let result = pipeline.process_frame("blank", &frame.view()).expect("frame");
        assert!(result.markers.is_empty());
        assert_eq!(result.dropped_poses, 0);
        assert_eq!(crate::core::current_frame(), None);
    }

    #[test]
    fn short_buffer_is_a_frame_error() {
        let pipeline = MarkerPipeline::new(camera(160, 120), &PipelineConfig::default())
            .expect("pipeline");
        let view = RgbImageView {
            width: 160,
            height: 120,
            data: &[0; 10],
        };
        assert!(matches!(
            pipeline.process_frame("short", &view),
            Err(FrameError::BufferLength { actual: 10, .. })
        ));
    }

    #[test]
    fn invalid_camera_is_a_config_error() {
        let mut cam = camera(160, 120);
        cam.intrinsics.fx = 0.0;
        assert!(matches!(
            MarkerPipeline::new(cam, &PipelineConfig::default()),
            Err(ConfigError::Camera(_))
        ));
    }
}
