//! Fiducial marker pose estimation through a fisheye lens.
//!
//! This crate provides:
//! - re-exports of the underlying crates (`core`, `aruco`, `pose`),
//! - [`MarkerPipeline`], which undistorts each frame with a precomputed
//!   remap, detects and decodes markers and solves one pose per marker,
//! - JSON loaders for camera calibration and pipeline settings,
//! - CSV and JSON result sinks,
//! - (feature `image`) image file loading and diagnostic overlays.
//!
//! ## Quickstart
//!
//! ```no_run
//! use fidpose::{load_camera, MarkerPipeline, PipelineConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let camera = load_camera("camera.json")?;
//! let pipeline = MarkerPipeline::new(camera, &PipelineConfig::default())?;
//! # #[cfg(feature = "image")]
//! # {
//! let frame = fidpose::overlay::load_rgb("frame.png")?;
//! let result = pipeline.process_frame("frame.png", &frame.view())?;
//! for r in result.records() {
//!     println!("{} {:?} {:?}", r.id, r.tvec, r.rvec);
//! }
//! # }
//! # Ok(())
//! # }
//! ```

pub use fidpose_aruco as aruco;
pub use fidpose_core as core;
pub use fidpose_pose as pose;

mod config;
mod pipeline;
mod result;
pub mod sink;

#[cfg(feature = "image")]
pub mod overlay;

pub use config::{
    load_camera, load_detector_params, load_pipeline_config, ConfigError, DictionaryRef,
    PipelineConfig,
};
pub use pipeline::{FrameError, MarkerPipeline};
pub use result::{FrameFailure, FrameResult, MarkerPose, PoseRecord, RunReport};
