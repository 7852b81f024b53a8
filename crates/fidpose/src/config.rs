//! JSON configuration: camera calibration, detector parameters and the
//! pipeline settings that tie them together.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::aruco::{DetectorParams, ParamsError, PredefinedDictionary, UnknownDictionary};
use crate::core::{CameraModel, CameraModelError};

/// Fatal setup errors; nothing is processed once one of these occurs.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Dictionary(#[from] UnknownDictionary),
    #[error(transparent)]
    Params(#[from] ParamsError),
    #[error(transparent)]
    Camera(#[from] CameraModelError),
    #[error("marker length must be positive and finite (got {0})")]
    MarkerLength(f64),
}

/// A dictionary named by string (`"DICT_4X4_50"`, `"4x4_100"`) or by
/// OpenCV numeric id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DictionaryRef {
    Id(u32),
    Name(String),
}

impl Default for DictionaryRef {
    fn default() -> Self {
        Self::Name(PredefinedDictionary::default().name().to_string())
    }
}

impl DictionaryRef {
    pub fn resolve(&self) -> Result<PredefinedDictionary, UnknownDictionary> {
        match self {
            Self::Id(id) => PredefinedDictionary::from_opencv_id(*id),
            Self::Name(name) => name.parse(),
        }
    }
}

impl From<PredefinedDictionary> for DictionaryRef {
    fn from(d: PredefinedDictionary) -> Self {
        Self::Name(d.name().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dictionary: DictionaryRef,
    /// Printed marker side, in the unit translations are reported in.
    pub marker_length: f64,
    pub detector: DetectorParams,
    /// Keep rejected candidates in each frame result.
    pub keep_rejected: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dictionary: DictionaryRef::default(),
            marker_length: 0.1,
            detector: DetectorParams::default(),
            keep_rejected: false,
        }
    }
}

impl PipelineConfig {
    /// Check every field and resolve the dictionary.
    pub fn validate(&self) -> Result<PredefinedDictionary, ConfigError> {
        if !self.marker_length.is_finite() || self.marker_length <= 0.0 {
            return Err(ConfigError::MarkerLength(self.marker_length));
        }
        self.detector.validate()?;
        Ok(self.dictionary.resolve()?)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a calibration file (`camera_matrix`, `distortion_coefficients`,
/// `image_width`, `image_height`, optional `fisheye_model`).
pub fn load_camera(path: impl AsRef<Path>) -> Result<CameraModel, ConfigError> {
    let camera: CameraModel = read_json(path.as_ref())?;
    camera.validate()?;
    log::debug!(
        "camera {}x{} ({:?}) from {}",
        camera.image_width,
        camera.image_height,
        camera.lens,
        path.as_ref().display()
    );
    Ok(camera)
}

/// Load detector parameters; keys missing from the file keep their defaults.
pub fn load_detector_params(path: impl AsRef<Path>) -> Result<DetectorParams, ConfigError> {
    let params: DetectorParams = read_json(path.as_ref())?;
    params.validate()?;
    Ok(params)
}

pub fn load_pipeline_config(path: impl AsRef<Path>) -> Result<PipelineConfig, ConfigError> {
    let config: PipelineConfig = read_json(path.as_ref())?;
    config.validate()?;
    Ok(config)
}
