//! Quadrilateral candidate extraction.
//!
//! For every adaptive-threshold window size the binarized image is traced
//! for borders; borders whose polygon approximation is a convex quad of
//! plausible size become candidates. Near-duplicates found at several window
//! sizes are then merged.

use fidpose_core::GrayImageView;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::contours::{find_contours, Contour};
use crate::polygon::{
    approx_polygon_closed, canonical_clockwise, is_convex, perimeter, quad_distance_sq,
};
use crate::threshold::adaptive_threshold_inv;
use crate::DetectorParams;

/// Why a quad did not make it into the accepted set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    CornersTooClose,
    TooCloseToBorder,
    /// Geometry was fine but the interior did not decode.
    NotDecoded,
}

/// A convex quad that may be a marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Clockwise on screen, starting at the corner with the smallest `x + y`.
    pub corners: [Point2<f32>; 4],
    /// Adaptive-threshold window that produced the contour.
    pub window: usize,
    /// Number of pixels on the source contour.
    pub contour_len: usize,
    /// Contour traced a hole (white quad on dark surroundings).
    pub from_hole: bool,
}

impl Candidate {
    pub fn perimeter(&self) -> f32 {
        perimeter(&self.corners)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RejectedCandidate {
    pub candidate: Candidate,
    pub reason: RejectReason,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CandidateSet {
    pub accepted: Vec<Candidate>,
    pub rejected: Vec<RejectedCandidate>,
}

enum Screened {
    Accept(Candidate),
    Reject(RejectedCandidate),
}

fn screen_contour(
    contour: &Contour,
    window: usize,
    width: usize,
    height: usize,
    params: &DetectorParams,
) -> Option<Screened> {
    let len = contour.points.len();
    let max_side = width.max(height) as f64;
    let min_len = params.min_marker_perimeter_rate * max_side;
    let max_len = params.max_marker_perimeter_rate * max_side;
    if (len as f64) < min_len || (len as f64) > max_len {
        return None;
    }

    let epsilon = len as f64 * params.polygonal_approx_accuracy_rate;
    let poly = approx_polygon_closed(&contour.points, epsilon);
    if poly.len() != 4 || !is_convex(&poly) {
        return None;
    }

    let candidate = Candidate {
        corners: canonical_clockwise(
            [0, 1, 2, 3].map(|i| Point2::new(poly[i].x as f32, poly[i].y as f32)),
        ),
        window,
        contour_len: len,
        from_hole: contour.hole,
    };
    let reject = |reason| {
        Some(Screened::Reject(RejectedCandidate {
            candidate: candidate.clone(),
            reason,
        }))
    };

    let min_corner_dist = len as f64 * params.min_corner_distance_rate;
    let closest_sq = (0..4)
        .flat_map(|i| (i + 1..4).map(move |j| (i, j)))
        .map(|(i, j)| {
            let dx = (poly[i].x - poly[j].x) as f64;
            let dy = (poly[i].y - poly[j].y) as f64;
            dx * dx + dy * dy
        })
        .fold(f64::INFINITY, f64::min);
    if closest_sq < min_corner_dist * min_corner_dist {
        return reject(RejectReason::CornersTooClose);
    }

    let margin = params.min_distance_to_border as i64;
    let (w, h) = (width as i64, height as i64);
    let near_border = poly.iter().any(|p| {
        let (x, y) = (p.x as i64, p.y as i64);
        x < margin || y < margin || x > w - 1 - margin || y > h - 1 - margin
    });
    if near_border {
        return reject(RejectReason::TooCloseToBorder);
    }

    Some(Screened::Accept(candidate))
}

fn candidates_for_window(
    image: &GrayImageView<'_>,
    window: usize,
    params: &DetectorParams,
) -> Vec<Screened> {
    let binary = adaptive_threshold_inv(image, window, params.adaptive_thresh_constant);
    find_contours(&binary.view())
        .iter()
        .filter(|c| !c.hole || params.detect_inverted_marker)
        .filter_map(|c| screen_contour(c, window, image.width, image.height, params))
        .collect()
}

/// Merge candidates whose corners nearly coincide, keeping the larger one.
///
/// Two quads are duplicates when their mean squared corner distance (best
/// cyclic alignment) is below `(min_marker_distance_rate * p)^2`, where `p`
/// is the smaller of the two perimeters. Output keeps first-seen order.
fn merge_duplicates(candidates: Vec<Candidate>, rate: f64) -> Vec<Candidate> {
    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    'next: for cand in candidates {
        for slot in kept.iter_mut() {
            let p = cand.perimeter().min(slot.perimeter()) as f64 * rate;
            if (quad_distance_sq(&cand.corners, &slot.corners) as f64) < p * p {
                if cand.perimeter() > slot.perimeter() {
                    *slot = cand;
                }
                continue 'next;
            }
        }
        kept.push(cand);
    }
    kept
}

/// Extract marker-shaped quads from a gray image.
///
/// Results are deterministic: windows are processed smallest first and
/// contours in raster order, with or without the `rayon` feature.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(w = image.width, h = image.height))
)]
pub fn extract_candidates(image: &GrayImageView<'_>, params: &DetectorParams) -> CandidateSet {
    if image.width < 3 || image.height < 3 || !image.is_consistent() {
        return CandidateSet::default();
    }
    let windows = params.threshold_windows();

    #[cfg(feature = "rayon")]
    let per_window: Vec<Vec<Screened>> = windows
        .par_iter()
        .map(|&w| candidates_for_window(image, w, params))
        .collect();
    #[cfg(not(feature = "rayon"))]
    let per_window: Vec<Vec<Screened>> = windows
        .iter()
        .map(|&w| candidates_for_window(image, w, params))
        .collect();

    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for screened in per_window.into_iter().flatten() {
        match screened {
            Screened::Accept(c) => accepted.push(c),
            Screened::Reject(r) => rejected.push(r),
        }
    }
    let raw = accepted.len();
    let accepted = merge_duplicates(accepted, params.min_marker_distance_rate);
    log::debug!(
        "candidates: {} windows, {} quads, {} after merge, {} rejected",
        windows.len(),
        raw,
        accepted.len(),
        rejected.len()
    );

    CandidateSet { accepted, rejected }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fidpose_core::GrayImage;

    fn dark_square(size: usize, x0: usize, y0: usize, side: usize) -> GrayImage {
        let mut img = GrayImage::filled(size, size, 230);
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                img.set(x, y, 20);
            }
        }
        img
    }

    #[test]
    fn blank_image_has_no_candidates() {
        let img = GrayImage::filled(160, 120, 200);
        let set = extract_candidates(&img.view(), &DetectorParams::default());
        assert!(set.accepted.is_empty());
        assert!(set.rejected.is_empty());
    }

    #[test]
    fn dark_square_yields_one_merged_candidate() {
        let img = dark_square(120, 30, 40, 50);
        let set = extract_candidates(&img.view(), &DetectorParams::default());
        assert_eq!(set.accepted.len(), 1, "{:?}", set.accepted);
        let c = &set.accepted[0];
        let expected = [(30.0, 40.0), (79.0, 40.0), (79.0, 89.0), (30.0, 89.0)];
        for (corner, (ex, ey)) in c.corners.iter().zip(expected) {
            assert!(
                (corner.x - ex).abs() <= 1.0 && (corner.y - ey).abs() <= 1.0,
                "{corner:?}"
            );
        }
    }

    #[test]
    fn square_touching_border_is_rejected() {
        let img = dark_square(100, 1, 30, 40);
        let set = extract_candidates(&img.view(), &DetectorParams::default());
        assert!(set.accepted.is_empty());
        assert!(set
            .rejected
            .iter()
            .all(|r| r.reason == RejectReason::TooCloseToBorder));
        assert!(!set.rejected.is_empty());
    }

    #[test]
    fn tiny_blobs_are_ignored() {
        let img = dark_square(200, 50, 50, 2);
        let set = extract_candidates(&img.view(), &DetectorParams::default());
        assert!(set.accepted.is_empty());
    }
}
