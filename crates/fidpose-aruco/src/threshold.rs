//! Global and local thresholding.

use fidpose_core::{GrayImage, GrayImageView};

/// Summed-area table with a zero top row and left column.
struct Integral {
    stride: usize,
    sums: Vec<u64>,
}

impl Integral {
    fn new(img: &GrayImageView<'_>) -> Self {
        let stride = img.width + 1;
        let mut sums = vec![0u64; stride * (img.height + 1)];
        for y in 0..img.height {
            let mut row = 0u64;
            for x in 0..img.width {
                row += img.data[y * img.width + x] as u64;
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self { stride, sums }
    }

    /// Sum over `[x0, x1) x [y0, y1)`.
    #[inline]
    fn rect(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> u64 {
        let s = self.stride;
        self.sums[y1 * s + x1] + self.sums[y0 * s + x0]
            - self.sums[y0 * s + x1]
            - self.sums[y1 * s + x0]
    }
}

/// Inverted adaptive mean threshold.
///
/// A pixel becomes foreground (255) when it is at least `constant` darker
/// than the mean of its `window x window` neighbourhood; windows are clipped
/// at the image border.
pub fn adaptive_threshold_inv(img: &GrayImageView<'_>, window: usize, constant: f64) -> GrayImage {
    let (w, h) = (img.width, img.height);
    let half = window / 2;
    let integral = Integral::new(img);
    let delta = constant.floor() as i32;

    let mut out = GrayImage::filled(w, h, 0);
    for y in 0..h {
        let (y0, y1) = (y.saturating_sub(half), (y + half + 1).min(h));
        for x in 0..w {
            let (x0, x1) = (x.saturating_sub(half), (x + half + 1).min(w));
            let count = ((x1 - x0) * (y1 - y0)) as u64;
            let mean = ((integral.rect(x0, y0, x1, y1) + count / 2) / count) as i32;
            if img.data[y * w + x] as i32 - mean <= -delta {
                out.data[y * w + x] = 255;
            }
        }
    }
    out
}

/// Otsu threshold of a sample set; values strictly above it are "white".
pub fn otsu_threshold(samples: &[u8]) -> u8 {
    let Some((&first, rest)) = samples.split_first() else {
        return 127;
    };
    let (lo, hi) = rest
        .iter()
        .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if lo == hi {
        return lo;
    }

    let mut hist = [0u32; 256];
    for &v in samples {
        hist[v as usize] += 1;
    }
    if hist.iter().filter(|&&c| c > 0).count() <= 2 {
        return ((lo as u16 + hi as u16) / 2) as u8;
    }

    let total = samples.len() as f64;
    let sum_all: f64 = hist
        .iter()
        .enumerate()
        .map(|(v, &c)| v as f64 * c as f64)
        .sum();

    let (mut w_b, mut sum_b) = (0.0f64, 0.0f64);
    let (mut best, mut best_t) = (-1.0f64, 127u8);
    for (t, &c) in hist.iter().enumerate() {
        w_b += c as f64;
        if w_b == 0.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f == 0.0 {
            break;
        }
        sum_b += t as f64 * c as f64;
        let diff = sum_b / w_b - (sum_all - sum_b) / w_f;
        let between = w_b * w_f * diff * diff;
        if between > best {
            best = between;
            best_t = t as u8;
        }
    }
    best_t
}

/// Mean and population standard deviation of the `[x0, x1) x [y0, y1)` window.
pub fn mean_std_dev(
    img: &GrayImageView<'_>,
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
) -> (f64, f64) {
    let (x1, y1) = (x1.min(img.width), y1.min(img.height));
    if x0 >= x1 || y0 >= y1 {
        return (0.0, 0.0);
    }
    let (mut sum, mut sum_sq) = (0.0f64, 0.0f64);
    for y in y0..y1 {
        for &v in &img.data[y * img.width + x0..y * img.width + x1] {
            let v = v as f64;
            sum += v;
            sum_sq += v * v;
        }
    }
    let n = ((x1 - x0) * (y1 - y0)) as f64;
    let mean = sum / n;
    (mean, (sum_sq / n - mean * mean).max(0.0).sqrt())
}
