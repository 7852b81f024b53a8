//! Marker dictionaries and predefined-dictionary selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::builtins;

/// A fixed ArUco/AprilTag-style dictionary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dictionary {
    /// Human-readable name, e.g. `DICT_4X4_50`.
    pub name: &'static str,
    /// Number of inner bits per marker side.
    pub marker_size: usize,
    /// Error-correcting capacity (in bits) of the code set.
    pub max_correction_bits: u8,
    /// One code per marker id, row-major, white = 1.
    pub codes: &'static [u64],
}

impl Dictionary {
    #[inline]
    pub fn bit_count(&self) -> usize {
        self.marker_size * self.marker_size
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Cell `(x, y)` of marker `id`: `Some(true)` for white.
    pub fn bit(&self, id: u32, x: usize, y: usize) -> Option<bool> {
        if x >= self.marker_size || y >= self.marker_size {
            return None;
        }
        let code = *self.codes.get(id as usize)?;
        Some((code >> (y * self.marker_size + x)) & 1 == 1)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown or unsupported dictionary `{0}`")]
pub struct UnknownDictionary(pub String);

/// Dictionaries selectable by name or by OpenCV's `PREDEFINED_DICTIONARY_NAME` id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredefinedDictionary {
    #[default]
    #[serde(rename = "DICT_4X4_50")]
    Dict4x4_50,
    #[serde(rename = "DICT_4X4_100")]
    Dict4x4_100,
    #[serde(rename = "DICT_APRILTAG_16h5")]
    AprilTag16h5,
}

impl PredefinedDictionary {
    pub const ALL: [PredefinedDictionary; 3] =
        [Self::Dict4x4_50, Self::Dict4x4_100, Self::AprilTag16h5];

    pub fn dictionary(self) -> Dictionary {
        match self {
            Self::Dict4x4_50 => builtins::DICT_4X4_50,
            Self::Dict4x4_100 => builtins::DICT_4X4_100,
            Self::AprilTag16h5 => builtins::DICT_APRILTAG_16H5,
        }
    }

    pub fn name(self) -> &'static str {
        self.dictionary().name
    }

    pub fn opencv_id(self) -> u32 {
        match self {
            Self::Dict4x4_50 => 0,
            Self::Dict4x4_100 => 1,
            Self::AprilTag16h5 => 17,
        }
    }

    pub fn from_opencv_id(id: u32) -> Result<Self, UnknownDictionary> {
        Self::ALL
            .into_iter()
            .find(|d| d.opencv_id() == id)
            .ok_or_else(|| UnknownDictionary(id.to_string()))
    }
}

impl FromStr for PredefinedDictionary {
    type Err = UnknownDictionary;

    /// Accepts `DICT_4X4_50`, `4x4_50` or the numeric OpenCV id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<u32>() {
            return Self::from_opencv_id(id);
        }
        Self::ALL
            .into_iter()
            .find(|d| {
                let name = d.name();
                name.eq_ignore_ascii_case(s)
                    || name
                        .strip_prefix("DICT_")
                        .is_some_and(|short| short.eq_ignore_ascii_case(s))
            })
            .ok_or_else(|| UnknownDictionary(s.to_string()))
    }
}

impl fmt::Display for PredefinedDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
