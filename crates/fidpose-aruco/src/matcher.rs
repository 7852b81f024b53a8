//! Nearest-code search over all ids and rotations.

use crate::Dictionary;

/// Best dictionary entry for an observed code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    pub id: u32,
    /// `observed == rotate_code_u64(dict_code, n, rotation)`.
    pub rotation: u8,
    pub hamming: u8,
}

/// Bits of error a match may carry: `floor(max_correction_bits * rate)`.
pub fn error_budget(dict: &Dictionary, error_correction_rate: f64) -> u8 {
    let rate = error_correction_rate.clamp(0.0, 1.0);
    (dict.max_correction_bits as f64 * rate).floor() as u8
}

/// Exhaustive matcher with the four rotations of every code precomputed.
#[derive(Clone, Debug)]
pub struct Matcher {
    dict: Dictionary,
    max_hamming: u8,
    rotated: Vec<[u64; 4]>,
}

impl Matcher {
    /// Codes wider than 64 bits are not representable and yield an empty matcher.
    pub fn new(dict: Dictionary, max_hamming: u8) -> Self {
        let n = dict.marker_size;
        let rotated = if dict.bit_count() <= 64 {
            dict.codes
                .iter()
                .map(|&c| [0u8, 1, 2, 3].map(|r| rotate_code_u64(c, n, r)))
                .collect()
        } else {
            log::warn!("{}: {} bits per code is unsupported", dict.name, dict.bit_count());
            Vec::new()
        };
        Self {
            dict,
            max_hamming,
            rotated,
        }
    }

    #[inline]
    pub fn dictionary(&self) -> Dictionary {
        self.dict
    }

    #[inline]
    pub fn max_hamming(&self) -> u8 {
        self.max_hamming
    }

    /// Closest `(id, rotation)` when its distance is within `max_hamming`.
    ///
    /// Ties keep the lowest id, then the lowest rotation.
    pub fn match_code(&self, observed: u64) -> Option<Match> {
        let mut best: Option<Match> = None;
        for (id, rots) in self.rotated.iter().enumerate() {
            for (rot, &code) in rots.iter().enumerate() {
                let hamming = (observed ^ code).count_ones() as u8;
                if hamming > self.max_hamming || best.is_some_and(|b| b.hamming <= hamming) {
                    continue;
                }
                best = Some(Match {
                    id: id as u32,
                    rotation: rot as u8,
                    hamming,
                });
                if hamming == 0 {
                    return best;
                }
            }
        }
        best
    }

    /// Smallest Hamming distance from `observed` to any entry and rotation.
    pub fn min_distance(&self, observed: u64) -> Option<u32> {
        self.rotated
            .iter()
            .flat_map(|rots| rots.iter())
            .map(|&c| (observed ^ c).count_ones())
            .min()
    }
}

/// Rotate an `n x n` row-major code by `rot` quarter turns clockwise.
pub fn rotate_code_u64(code: u64, n: usize, rot: u8) -> u64 {
    let rot = rot & 3;
    if rot == 0 {
        return code;
    }
    let mut out = 0u64;
    for y in 0..n {
        for x in 0..n {
            let (sx, sy) = match rot {
                1 => (y, n - 1 - x),
                2 => (n - 1 - x, n - 1 - y),
                _ => (n - 1 - y, x),
            };
            out |= ((code >> (sy * n + sx)) & 1) << (y * n + x);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins;

    #[test]
    fn four_quarter_turns_are_identity() {
        let code = 0xdead_beef_u64 & 0xffff;
        let r = (0..4).fold(code, |c, _| rotate_code_u64(c, 4, 1));
        assert_eq!(r, code);
        assert_eq!(
            rotate_code_u64(rotate_code_u64(code, 4, 1), 4, 1),
            rotate_code_u64(code, 4, 2)
        );
    }

    #[test]
    fn rotation_moves_top_left_clockwise() {
        // Only cell (0,0) set; one clockwise turn moves it to (n-1, 0).
        assert_eq!(rotate_code_u64(1, 4, 1), 1 << 3);
        assert_eq!(rotate_code_u64(1, 4, 2), 1 << 15);
        assert_eq!(rotate_code_u64(1, 4, 3), 1 << 12);
    }

    #[test]
    fn finds_every_rotation_exactly() {
        let dict = builtins::DICT_4X4_50;
        let matcher = Matcher::new(dict, 0);
        for (id, &code) in dict.codes.iter().enumerate() {
            for rot in 0..4u8 {
                let m = matcher
                    .match_code(rotate_code_u64(code, 4, rot))
                    .expect("exact match");
                assert_eq!((m.id, m.rotation, m.hamming), (id as u32, rot, 0));
            }
        }
    }

    #[test]
    fn budget_floors_scaled_capacity() {
        let dict = builtins::DICT_4X4_50;
        assert_eq!(error_budget(&dict, 0.6), 0);
        assert_eq!(error_budget(&dict, 1.0), 1);
        assert_eq!(error_budget(&builtins::DICT_APRILTAG_16H5, 1.0), 0);
    }
}
