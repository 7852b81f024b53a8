//! Reading and identifying the bit grid inside a candidate quad.

use fidpose_core::{warp_quad_to_square, GrayImageView};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::candidates::Candidate;
use crate::refine::{refine_quad, SubpixCriteria};
use crate::threshold::{mean_std_dev, otsu_threshold};
use crate::{CornerRefinement, DetectorParams, Matcher};

/// A candidate whose interior matched a dictionary entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecodedMarker {
    pub id: u32,
    /// Corner 0 is the marker's top-left in its canonical orientation;
    /// the rest follow clockwise.
    pub corners: [Point2<f32>; 4],
    /// Quarter turns between the canonical marker and the candidate's
    /// corner order.
    pub rotation: u8,
    /// Corrected bit errors.
    pub hamming: u8,
    /// Decoded with inverted polarity (white border).
    pub inverted: bool,
}

/// Thresholded cell grid including the border ring; `true` is white.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitGrid {
    pub cells: usize,
    pub bits: Vec<bool>,
}

impl BitGrid {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.bits[y * self.cells + x]
    }

    fn invert(&mut self) {
        self.bits.iter_mut().for_each(|b| *b = !*b);
    }

    /// White cells in the `border`-wide outer ring.
    fn border_errors(&self, border: usize) -> usize {
        let n = self.cells;
        (0..n)
            .flat_map(|y| (0..n).map(move |x| (x, y)))
            .filter(|&(x, y)| x < border || y < border || x >= n - border || y >= n - border)
            .filter(|&(x, y)| self.get(x, y))
            .count()
    }

    /// Pack the inner `n x n` cells, row-major, white = 1.
    fn inner_code(&self, border: usize) -> u64 {
        let n = self.cells - 2 * border;
        let mut code = 0u64;
        for y in 0..n {
            for x in 0..n {
                if self.get(border + x, border + y) {
                    code |= 1 << (y * n + x);
                }
            }
        }
        code
    }
}

/// Rectify the quad and threshold each cell.
///
/// Returns `None` when the quad cannot be rectified or the patch is too
/// flat to binarize reliably.
pub fn read_bits(
    image: &GrayImageView<'_>,
    corners: &[Point2<f32>; 4],
    marker_size: usize,
    params: &DetectorParams,
) -> Option<BitGrid> {
    let cells = marker_size + 2 * params.marker_border_bits;
    let ppc = params.perspective_remove_pixel_per_cell;
    let side = cells * ppc;
    let patch = warp_quad_to_square(image, corners, side)?;

    let inset = ppc / 2;
    let (_, std) = mean_std_dev(&patch.view(), inset, inset, side - inset, side - inset);
    if std < params.min_otsu_std_dev {
        return None;
    }
    let t = otsu_threshold(&patch.data);

    let margin = (params.perspective_remove_ignored_margin_per_cell * ppc as f64) as usize;
    let span = ppc - 2 * margin;
    let area = span * span;
    let mut bits = Vec::with_capacity(cells * cells);
    for cy in 0..cells {
        for cx in 0..cells {
            let (x0, y0) = (cx * ppc + margin, cy * ppc + margin);
            let white = (y0..y0 + span)
                .flat_map(|y| patch.data[y * side + x0..y * side + x0 + span].iter())
                .filter(|&&v| v > t)
                .count();
            bits.push(white > area / 2);
        }
    }
    Some(BitGrid { cells, bits })
}

/// Identify a candidate against `matcher`'s dictionary.
///
/// Rejections (flat patch, border errors, no entry within budget) return
/// `None`; they are expected and not errors.
pub fn decode_candidate(
    image: &GrayImageView<'_>,
    candidate: &Candidate,
    matcher: &Matcher,
    params: &DetectorParams,
) -> Option<DecodedMarker> {
    let dict = matcher.dictionary();
    let border = params.marker_border_bits;
    let mut grid = read_bits(image, &candidate.corners, dict.marker_size, params)?;

    let ring = grid.cells * grid.cells - dict.bit_count();
    let max_border_errors = (ring as f64 * params.max_erroneous_bits_in_border_rate) as usize;
    let mut inverted = false;
    if grid.border_errors(border) > max_border_errors {
        if !params.detect_inverted_marker {
            return None;
        }
        grid.invert();
        if grid.border_errors(border) > max_border_errors {
            return None;
        }
        inverted = true;
    }

    let m = matcher.match_code(grid.inner_code(border))?;
    let r = m.rotation as usize;
    let oriented = [0, 1, 2, 3].map(|i| candidate.corners[(i + r) % 4]);

    let corners = match params.corner_refinement {
        CornerRefinement::None => oriented,
        CornerRefinement::Subpix => refine_quad(
            image,
            &oriented,
            &SubpixCriteria {
                half_window: params.corner_refinement_win_size,
                max_iterations: params.corner_refinement_max_iterations,
                epsilon: params.corner_refinement_min_accuracy,
                zero_zone: params.corner_refinement_zero_zone,
            },
        ),
    };

    Some(DecodedMarker {
        id: m.id,
        corners,
        rotation: m.rotation,
        hamming: m.hamming,
        inverted,
    })
}
