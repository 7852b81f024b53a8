//! Border following on binary images (Suzuki & Abe, 1985).

use fidpose_core::GrayImageView;
use nalgebra::Point2;

/// 8-neighbourhood, counter-clockwise on screen starting east.
const DIRS: [(isize, isize); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];
const EAST: usize = 0;
const WEST: usize = 4;

/// One traced border, in tracing order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contour {
    pub points: Vec<Point2<i32>>,
    /// Border between a foreground region and a hole it encloses.
    pub hole: bool,
}

/// Zero-padded label image; the one-pixel frame removes bounds checks.
struct Labels {
    stride: usize,
    px: Vec<i32>,
}

impl Labels {
    fn new(bin: &GrayImageView<'_>) -> Self {
        let stride = bin.width + 2;
        let mut px = vec![0i32; stride * (bin.height + 2)];
        for y in 0..bin.height {
            for x in 0..bin.width {
                if bin.data[y * bin.width + x] != 0 {
                    px[(y + 1) * stride + x + 1] = 1;
                }
            }
        }
        Self { stride, px }
    }

    #[inline]
    fn step(&self, idx: usize, dir: usize) -> usize {
        let (dx, dy) = DIRS[dir & 7];
        (idx as isize + dx + dy * self.stride as isize) as usize
    }

    fn point(&self, idx: usize) -> Point2<i32> {
        Point2::new(
            (idx % self.stride) as i32 - 1,
            (idx / self.stride) as i32 - 1,
        )
    }

    /// Trace the border starting at `start`, entered from direction `from`.
    fn follow(&mut self, start: usize, from: usize, nbd: i32) -> Vec<Point2<i32>> {
        // Clockwise scan for the first non-zero neighbour.
        let Some(d1) = (0..8)
            .map(|k| (from + 8 - k) & 7)
            .find(|&d| self.px[self.step(start, d)] != 0)
        else {
            self.px[start] = -nbd;
            return vec![self.point(start)];
        };
        let first = self.step(start, d1);

        let mut points = Vec::new();
        let (mut prev, mut cur) = (first, start);
        let mut prev_dir = d1;
        loop {
            // Counter-clockwise scan around `cur`, starting after `prev`.
            let mut east_is_zero = false;
            let mut next_dir = prev_dir;
            for k in 1..=8 {
                let d = (prev_dir + k) & 7;
                if self.px[self.step(cur, d)] != 0 {
                    next_dir = d;
                    break;
                }
                if d == EAST {
                    east_is_zero = true;
                }
            }
            let next = self.step(cur, next_dir);

            if east_is_zero {
                self.px[cur] = -nbd;
            } else if self.px[cur] == 1 {
                self.px[cur] = nbd;
            }
            points.push(self.point(cur));

            if next == start && cur == first {
                break;
            }
            // Direction from `next` back to `cur`.
            prev_dir = (next_dir + 4) & 7;
            prev = cur;
            cur = next;
            debug_assert_eq!(self.step(cur, prev_dir), prev);
        }
        points
    }
}

/// All outer and hole borders of the non-zero pixels of `bin`, in raster
/// order of their starting pixel.
pub fn find_contours(bin: &GrayImageView<'_>) -> Vec<Contour> {
    let mut labels = Labels::new(bin);
    let stride = labels.stride;
    let mut contours = Vec::new();
    let mut nbd = 1i32;

    for y in 1..=bin.height {
        for x in 1..=bin.width {
            let idx = y * stride + x;
            let v = labels.px[idx];
            if v == 0 {
                continue;
            }
            let (hole, from) = if v == 1 && labels.px[idx - 1] == 0 {
                (false, WEST)
            } else if v >= 1 && labels.px[idx + 1] == 0 {
                (true, EAST)
            } else {
                continue;
            };
            nbd = nbd.saturating_add(1);
            let points = labels.follow(idx, from, nbd);
            contours.push(Contour { points, hole });
        }
    }
    contours
}
