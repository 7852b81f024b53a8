//! ArUco/AprilTag marker detection.
//!
//! The crate covers the image-side half of the pipeline:
//! - embedded dictionaries and nearest-code matching with error budgets,
//! - quad candidate extraction (adaptive threshold, border following,
//!   polygon approximation, geometric screening),
//! - bit-grid decoding with optional inverted-marker support,
//! - sub-pixel corner refinement,
//! - marker rendering for printing and tests.
//!
//! Pose estimation lives in `fidpose-pose`.

pub mod builtins;
mod candidates;
mod contours;
mod decode;
mod detector;
mod dictionary;
mod matcher;
mod params;
mod polygon;
mod refine;
mod render;
mod threshold;

pub use candidates::{extract_candidates, Candidate, CandidateSet, RejectReason, RejectedCandidate};
pub use contours::{find_contours, Contour};
pub use decode::{decode_candidate, read_bits, BitGrid, DecodedMarker};
pub use detector::{MarkerDetectionResult, MarkerDetector};
pub use dictionary::{Dictionary, PredefinedDictionary, UnknownDictionary};
pub use matcher::{error_budget, rotate_code_u64, Match, Matcher};
pub use params::{CornerRefinement, DetectorParams, ParamsError};
pub use refine::{refine_corner, refine_quad, SubpixCriteria};
pub use render::{render_marker, RenderError};
pub use threshold::{adaptive_threshold_inv, otsu_threshold};
