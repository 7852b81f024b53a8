//! Minimal owned/borrowed raster types.
//!
//! Pixel `(x, y)` has its center at integer coordinates `(x, y)`; all
//! sampling helpers follow that convention.

#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    /// Image filled with a constant value.
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    #[inline]
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: u8) {
        if x < self.width && y < self.height {
            self.data[y * self.width + x] = v;
        }
    }
}

impl GrayImageView<'_> {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    /// `true` when the buffer length agrees with the declared dimensions.
    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.width * self.height
    }
}

/// Interleaved 8-bit RGB view (3 bytes per pixel).
#[derive(Clone, Copy, Debug)]
pub struct RgbImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h*3
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl RgbImage {
    #[inline]
    pub fn view(&self) -> RgbImageView<'_> {
        RgbImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    /// Replicate a gray image into three identical channels.
    pub fn from_gray(gray: &GrayImageView<'_>) -> Self {
        let mut data = Vec::with_capacity(gray.data.len() * 3);
        for &v in gray.data {
            data.extend_from_slice(&[v, v, v]);
        }
        Self {
            width: gray.width,
            height: gray.height,
            data,
        }
    }
}

impl RgbImageView<'_> {
    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.width * self.height * 3
    }

    /// Luma conversion with the BT.601 weights.
    pub fn to_gray(&self) -> GrayImage {
        let data = self
            .data
            .chunks_exact(3)
            .map(|px| {
                let v = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                (v + 0.5).min(255.0) as u8
            })
            .collect();
        GrayImage {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

#[inline]
fn get_gray(src: &GrayImageView<'_>, x: i32, y: i32) -> u8 {
    if x < 0 || y < 0 || x >= src.width as i32 || y >= src.height as i32 {
        return 0;
    }
    src.data[y as usize * src.width + x as usize]
}

/// Bilinear sample; pixels outside the image read as black.
#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f32, y: f32) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_gray(src, x0, y0) as f32;
    let p10 = get_gray(src, x0 + 1, y0) as f32;
    let p01 = get_gray(src, x0, y0 + 1) as f32;
    let p11 = get_gray(src, x0 + 1, y0 + 1) as f32;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

#[inline]
pub fn sample_bilinear_u8(src: &GrayImageView<'_>, x: f32, y: f32) -> u8 {
    (sample_bilinear(src, x, y) + 0.5).clamp(0.0, 255.0) as u8
}

/// Bilinear sample of one channel of an interleaved image with `channels`
/// bytes per pixel. Out-of-bounds taps read as zero.
#[inline]
pub(crate) fn sample_bilinear_interleaved(
    data: &[u8],
    width: usize,
    height: usize,
    channels: usize,
    channel: usize,
    x: f32,
    y: f32,
) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let tap = |xx: i32, yy: i32| -> f32 {
        if xx < 0 || yy < 0 || xx >= width as i32 || yy >= height as i32 {
            return 0.0;
        }
        data[(yy as usize * width + xx as usize) * channels + channel] as f32
    };

    let a = tap(x0, y0) + fx * (tap(x0 + 1, y0) - tap(x0, y0));
    let b = tap(x0, y0 + 1) + fx * (tap(x0 + 1, y0 + 1) - tap(x0, y0 + 1));
    a + fy * (b - a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bilinear_interpolates_between_pixels() {
        let img = GrayImage {
            width: 2,
            height: 1,
            data: vec![0, 200],
        };
        let v = sample_bilinear(&img.view(), 0.25, 0.0);
        assert!((v - 50.0).abs() < 1e-4);
    }

    #[test]
    fn out_of_bounds_reads_black() {
        let img = GrayImage::filled(4, 4, 255);
        assert_eq!(sample_bilinear_u8(&img.view(), -5.0, 1.0), 0);
        assert_eq!(sample_bilinear_u8(&img.view(), 1.0, 1.0), 255);
    }

    #[test]
    fn gray_conversion_uses_luma_weights() {
        let rgb = RgbImage {
            width: 2,
            height: 1,
            data: vec![255, 255, 255, 255, 0, 0],
        };
        let gray = rgb.view().to_gray();
        assert_eq!(gray.data[0], 255);
        assert_eq!(gray.data[1], 76);
    }
}
