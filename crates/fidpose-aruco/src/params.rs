//! Detector tunables.

use serde::{Deserialize, Serialize};

/// Post-decode corner refinement strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CornerRefinement {
    /// Keep the polygon-approximation corners.
    None,
    /// Gradient-based sub-pixel refinement in a square window.
    #[default]
    Subpix,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParamsError {
    #[error("{name} must lie in [0, {max}] (got {value})")]
    RateOutOfRange {
        name: &'static str,
        value: f64,
        max: f64,
    },
    #[error("{name} must be finite and non-negative (got {value})")]
    Negative { name: &'static str, value: f64 },
    #[error("adaptive threshold window range {min}..={max} is invalid (min >= 3, min <= max)")]
    WindowRange { min: usize, max: usize },
    #[error("{0} must be at least 1")]
    Zero(&'static str),
    #[error("min_marker_perimeter_rate {min} exceeds max_marker_perimeter_rate {max}")]
    PerimeterRange { min: f64, max: f64 },
    #[error("corner refinement zero zone {zone} must be smaller than the window {window}")]
    ZeroZone { zone: usize, window: usize },
}

/// Candidate extraction and decoding parameters.
///
/// Defaults follow OpenCV's `DetectorParameters`. Missing JSON keys keep
/// their default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    pub adaptive_thresh_win_size_min: usize,
    pub adaptive_thresh_win_size_max: usize,
    pub adaptive_thresh_win_size_step: usize,
    /// Subtracted from the local mean before thresholding.
    pub adaptive_thresh_constant: f64,
    /// Contour length bounds relative to the larger image side.
    pub min_marker_perimeter_rate: f64,
    pub max_marker_perimeter_rate: f64,
    /// Douglas-Peucker tolerance relative to the contour length.
    pub polygonal_approx_accuracy_rate: f64,
    pub min_corner_distance_rate: f64,
    pub min_distance_to_border: usize,
    /// Candidates closer than this (relative to perimeter) are merged.
    pub min_marker_distance_rate: f64,
    pub corner_refinement: CornerRefinement,
    /// Half-size of the refinement window in pixels.
    pub corner_refinement_win_size: usize,
    pub corner_refinement_max_iterations: usize,
    pub corner_refinement_min_accuracy: f64,
    /// Half-size of the central dead zone left out of the refinement sums;
    /// must be smaller than the window. `None` uses the whole window.
    pub corner_refinement_zero_zone: Option<usize>,
    pub marker_border_bits: usize,
    pub perspective_remove_pixel_per_cell: usize,
    pub perspective_remove_ignored_margin_per_cell: f64,
    pub max_erroneous_bits_in_border_rate: f64,
    /// Patches whose intensity std-dev is below this are not binarized.
    pub min_otsu_std_dev: f64,
    pub error_correction_rate: f64,
    /// Also try white-bordered markers on a dark background.
    pub detect_inverted_marker: bool,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            adaptive_thresh_win_size_min: 3,
            adaptive_thresh_win_size_max: 23,
            adaptive_thresh_win_size_step: 10,
            adaptive_thresh_constant: 7.0,
            min_marker_perimeter_rate: 0.03,
            max_marker_perimeter_rate: 4.0,
            polygonal_approx_accuracy_rate: 0.03,
            min_corner_distance_rate: 0.05,
            min_distance_to_border: 3,
            min_marker_distance_rate: 0.05,
            corner_refinement: CornerRefinement::Subpix,
            corner_refinement_win_size: 5,
            corner_refinement_max_iterations: 30,
            corner_refinement_min_accuracy: 0.1,
            corner_refinement_zero_zone: Some(2),
            marker_border_bits: 1,
            perspective_remove_pixel_per_cell: 4,
            perspective_remove_ignored_margin_per_cell: 0.13,
            max_erroneous_bits_in_border_rate: 0.35,
            min_otsu_std_dev: 5.0,
            error_correction_rate: 0.6,
            detect_inverted_marker: false,
        }
    }
}

/// Largest allowed `max_marker_perimeter_rate`: a contour that runs along the
/// whole image border has length `2 * (w + h) <= 4 * max(w, h)`.
const MAX_PERIMETER_RATE: f64 = 4.0;

fn check_rate(name: &'static str, value: f64, max: f64) -> Result<(), ParamsError> {
    if !(0.0..=max).contains(&value) {
        return Err(ParamsError::RateOutOfRange { name, value, max });
    }
    Ok(())
}

impl DetectorParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        for (name, value) in [
            ("min_marker_perimeter_rate", self.min_marker_perimeter_rate),
            (
                "polygonal_approx_accuracy_rate",
                self.polygonal_approx_accuracy_rate,
            ),
            ("min_corner_distance_rate", self.min_corner_distance_rate),
            ("min_marker_distance_rate", self.min_marker_distance_rate),
            (
                "perspective_remove_ignored_margin_per_cell",
                self.perspective_remove_ignored_margin_per_cell,
            ),
            (
                "max_erroneous_bits_in_border_rate",
                self.max_erroneous_bits_in_border_rate,
            ),
            ("error_correction_rate", self.error_correction_rate),
        ] {
            check_rate(name, value, 1.0)?;
        }
        check_rate(
            "max_marker_perimeter_rate",
            self.max_marker_perimeter_rate,
            MAX_PERIMETER_RATE,
        )?;
        if self.min_marker_perimeter_rate > self.max_marker_perimeter_rate {
            return Err(ParamsError::PerimeterRange {
                min: self.min_marker_perimeter_rate,
                max: self.max_marker_perimeter_rate,
            });
        }
        // A margin of half a cell or more leaves nothing to sample.
        if self.perspective_remove_ignored_margin_per_cell >= 0.5 {
            return Err(ParamsError::RateOutOfRange {
                name: "perspective_remove_ignored_margin_per_cell",
                value: self.perspective_remove_ignored_margin_per_cell,
                max: 0.5,
            });
        }

        for (name, value) in [
            ("adaptive_thresh_constant", self.adaptive_thresh_constant),
            (
                "corner_refinement_min_accuracy",
                self.corner_refinement_min_accuracy,
            ),
            ("min_otsu_std_dev", self.min_otsu_std_dev),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ParamsError::Negative { name, value });
            }
        }

        let (min, max) = (
            self.adaptive_thresh_win_size_min,
            self.adaptive_thresh_win_size_max,
        );
        if min < 3 || min > max {
            return Err(ParamsError::WindowRange { min, max });
        }
        for (name, value) in [
            (
                "adaptive_thresh_win_size_step",
                self.adaptive_thresh_win_size_step,
            ),
            ("marker_border_bits", self.marker_border_bits),
            (
                "perspective_remove_pixel_per_cell",
                self.perspective_remove_pixel_per_cell,
            ),
            (
                "corner_refinement_max_iterations",
                self.corner_refinement_max_iterations,
            ),
            ("corner_refinement_win_size", self.corner_refinement_win_size),
        ] {
            if value == 0 {
                return Err(ParamsError::Zero(name));
            }
        }
        if let Some(zone) = self.corner_refinement_zero_zone {
            let window = self.corner_refinement_win_size;
            if zone >= window {
                return Err(ParamsError::ZeroZone { zone, window });
            }
        }
        Ok(())
    }

    /// Odd adaptive-threshold window sizes, smallest first.
    ///
    /// Even sizes in the `min..=max` progression are bumped to the next odd
    /// value; duplicates are removed.
    pub fn threshold_windows(&self) -> Vec<usize> {
        let step = self.adaptive_thresh_win_size_step.max(1);
        let mut out: Vec<usize> = (self.adaptive_thresh_win_size_min
            ..=self.adaptive_thresh_win_size_max)
            .step_by(step)
            .map(|w| w | 1)
            .collect();
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        DetectorParams::default().validate().expect("defaults are valid");
        assert_eq!(DetectorParams::default().threshold_windows(), vec![3, 13, 23]);
    }

    #[test]
    fn even_windows_become_odd() {
        let p = DetectorParams {
            adaptive_thresh_win_size_min: 4,
            adaptive_thresh_win_size_max: 10,
            adaptive_thresh_win_size_step: 3,
            ..DetectorParams::default()
        };
        assert_eq!(p.threshold_windows(), vec![5, 7, 11]);
    }

    #[test]
    fn invalid_values_are_reported() {
        let p = DetectorParams {
            error_correction_rate: 1.5,
            ..DetectorParams::default()
        };
        assert!(matches!(
            p.validate(),
            Err(ParamsError::RateOutOfRange {
                name: "error_correction_rate",
                ..
            })
        ));

        let p = DetectorParams {
            adaptive_thresh_win_size_min: 25,
            ..DetectorParams::default()
        };
        assert_eq!(
            p.validate(),
            Err(ParamsError::WindowRange { min: 25, max: 23 })
        );

        let p = DetectorParams {
            perspective_remove_pixel_per_cell: 0,
            ..DetectorParams::default()
        };
        assert_eq!(
            p.validate(),
            Err(ParamsError::Zero("perspective_remove_pixel_per_cell"))
        );

        let p = DetectorParams {
            corner_refinement_win_size: 2,
            ..DetectorParams::default()
        };
        assert_eq!(
            p.validate(),
            Err(ParamsError::ZeroZone { zone: 2, window: 2 })
        );
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let p: DetectorParams = serde_json::from_str(
            r#"{"adaptive_thresh_constant": 9.0, "corner_refinement": "none"}"#,
        )
        .expect("parse");
        assert_eq!(p.adaptive_thresh_constant, 9.0);
        assert_eq!(p.corner_refinement, CornerRefinement::None);
        assert_eq!(p.marker_border_bits, 1);
        assert_eq!(p.corner_refinement_zero_zone, Some(2));

        let p: DetectorParams =
            serde_json::from_str(r#"{"corner_refinement_zero_zone": null}"#).expect("parse");
        assert_eq!(p.corner_refinement_zero_zone, None);
        p.validate().expect("whole window is valid");
    }
}
