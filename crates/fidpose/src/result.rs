//! Per-frame and per-run results.

use serde::{Deserialize, Serialize};

use crate::aruco::{DecodedMarker, RejectedCandidate};
use crate::pipeline::FrameError;
use crate::pose::PoseEstimate;

/// One decoded marker with its pose.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerPose {
    pub marker: DecodedMarker,
    pub pose: PoseEstimate,
}

/// The externally visible row: `id,tx,ty,tz,rx,ry,rz`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    pub id: u32,
    pub tvec: [f64; 3],
    pub rvec: [f64; 3],
}

impl From<&MarkerPose> for PoseRecord {
    fn from(m: &MarkerPose) -> Self {
        let (t, r) = (m.pose.tvec, m.pose.rvec);
        Self {
            id: m.marker.id,
            tvec: [t.x, t.y, t.z],
            rvec: [r.x, r.y, r.z],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    /// Caller-supplied frame identifier, usually the file name.
    pub frame: String,
    /// Decoded and posed markers in decode order.
    pub markers: Vec<MarkerPose>,
    /// Markers that decoded but whose pose solve failed.
    pub dropped_poses: usize,
    /// Empty unless rejected candidates were requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<RejectedCandidate>,
}

impl FrameResult {
    pub fn records(&self) -> impl Iterator<Item = PoseRecord> + '_ {
        self.markers.iter().map(PoseRecord::from)
    }
}

/// A frame that could not be processed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameFailure {
    pub frame: String,
    pub error: String,
}

/// Results of a multi-frame run, in input order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub frames: Vec<FrameResult>,
    pub failures: Vec<FrameFailure>,
}

impl RunReport {
    /// Append one frame's outcome; failures are kept as messages.
    pub fn record(&mut self, frame: &str, outcome: Result<FrameResult, FrameError>) {
        match outcome {
            Ok(result) => self.frames.push(result),
            Err(err) => self.failures.push(FrameFailure {
                frame: frame.to_string(),
                error: err.to_string(),
            }),
        }
    }

    pub fn records(&self) -> impl Iterator<Item = PoseRecord> + '_ {
        self.frames.iter().flat_map(FrameResult::records)
    }
}
