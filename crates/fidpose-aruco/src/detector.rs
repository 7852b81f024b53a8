//! Single-image marker detection: candidate extraction followed by decoding.

use fidpose_core::GrayImageView;
use nalgebra::Point2;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::candidates::{extract_candidates, RejectReason, RejectedCandidate};
use crate::decode::{decode_candidate, DecodedMarker};
use crate::polygon::contains_point;
use crate::{error_budget, Dictionary, DetectorParams, Matcher, ParamsError};

/// Markers found in one image plus the quads that were not markers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarkerDetectionResult {
    /// In candidate order.
    pub markers: Vec<DecodedMarker>,
    pub rejected: Vec<RejectedCandidate>,
}

/// Read-only detector; share it between threads freely.
#[derive(Clone, Debug)]
pub struct MarkerDetector {
    params: DetectorParams,
    matcher: Matcher,
}

impl MarkerDetector {
    pub fn new(dictionary: Dictionary, params: DetectorParams) -> Result<Self, ParamsError> {
        params.validate()?;
        let budget = error_budget(&dictionary, params.error_correction_rate);
        Ok(Self {
            matcher: Matcher::new(dictionary, budget),
            params,
        })
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    pub fn dictionary(&self) -> Dictionary {
        self.matcher.dictionary()
    }

    /// Detect markers in a gray image.
    ///
    /// Candidates decode independently; output order follows candidate order
    /// regardless of the `rayon` feature.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn detect(&self, image: &GrayImageView<'_>) -> MarkerDetectionResult {
        let set = extract_candidates(image, &self.params);

        #[cfg(feature = "rayon")]
        let decoded: Vec<Option<DecodedMarker>> = set
            .accepted
            .par_iter()
            .map(|c| decode_candidate(image, c, &self.matcher, &self.params))
            .collect();
        #[cfg(not(feature = "rayon"))]
        let decoded: Vec<Option<DecodedMarker>> = set
            .accepted
            .iter()
            .map(|c| decode_candidate(image, c, &self.matcher, &self.params))
            .collect();

        let mut markers = Vec::new();
        let mut rejected = set.rejected;
        for (candidate, result) in set.accepted.into_iter().zip(decoded) {
            match result {
                Some(m) => markers.push(m),
                None => rejected.push(RejectedCandidate {
                    candidate,
                    reason: RejectReason::NotDecoded,
                }),
            }
        }
        let markers = drop_enclosed(markers);
        log::debug!(
            "{}: {} markers, {} rejected",
            self.matcher.dictionary().name,
            markers.len(),
            rejected.len()
        );

        MarkerDetectionResult { markers, rejected }
    }
}

/// Remove markers lying entirely inside another decoded marker; these are
/// the inner edge of a thick border decoded a second time.
fn drop_enclosed(markers: Vec<DecodedMarker>) -> Vec<DecodedMarker> {
    let inside = |inner: &DecodedMarker, outer: &DecodedMarker| {
        inner
            .corners
            .iter()
            .all(|&c: &Point2<f32>| contains_point(&outer.corners, c))
    };
    let keep: Vec<bool> = markers
        .iter()
        .enumerate()
        .map(|(i, m)| {
            !markers
                .iter()
                .enumerate()
                .any(|(j, other)| i != j && inside(m, other))
        })
        .collect();
    markers
        .into_iter()
        .zip(keep)
        .filter_map(|(m, k)| k.then_some(m))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builtins, render_marker, CornerRefinement};
    use fidpose_core::GrayImage;

    fn scene() -> GrayImage {
        let dict = builtins::DICT_4X4_50;
        let mut img = GrayImage::filled(320, 200, 240);
        for (id, x0, y0) in [(4u32, 40usize, 50usize), (17, 190, 60)] {
            let marker = render_marker(&dict, id, 84, 1).expect("render");
            for y in 0..84 {
                for x in 0..84 {
                    img.set(x0 + x, y0 + y, marker.view().get(x, y));
                }
            }
        }
        img
    }

    #[test]
    fn detects_two_axis_aligned_markers() {
        let detector =
            MarkerDetector::new(builtins::DICT_4X4_50, DetectorParams::default()).expect("params");
        let result = detector.detect(&scene().view());
        let mut ids: Vec<u32> = result.markers.iter().map(|m| m.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![4, 17]);

        let m4 = result.markers.iter().find(|m| m.id == 4).expect("id 4");
        // Top-left corner of the first marker, within a pixel.
        assert!((m4.corners[0].x - 40.0).abs() < 1.0 && (m4.corners[0].y - 50.0).abs() < 1.0);
    }

    #[test]
    fn detection_is_repeatable() {
        let detector = MarkerDetector::new(
            builtins::DICT_4X4_50,
            DetectorParams {
                corner_refinement: CornerRefinement::None,
                ..DetectorParams::default()
            },
        )
        .expect("params");
        let img = scene();
        assert_eq!(detector.detect(&img.view()), detector.detect(&img.view()));
    }

    #[test]
    fn invalid_params_are_refused() {
        let params = DetectorParams {
            adaptive_thresh_win_size_step: 0,
            ..DetectorParams::default()
        };
        assert!(MarkerDetector::new(builtins::DICT_4X4_50, params).is_err());
    }
}
