use crate::{sample_bilinear_u8, GrayImage, GrayImageView};
use nalgebra::{DMatrix, Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

/// Projective map `dst ~ H * src` between two planes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v[0] / v[2], v[1] / v[2])
    }

    #[inline]
    pub fn apply_f32(&self, p: Point2<f32>) -> Point2<f32> {
        let q = self.apply(Point2::new(p.x as f64, p.y as f64));
        Point2::new(q.x as f32, q.y as f32)
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }
}

/// Similarity moving the centroid to the origin with mean distance sqrt(2).
fn conditioning<'a>(pts: impl ExactSizeIterator<Item = &'a Point2<f64>> + Clone) -> Matrix3<f64> {
    let n = pts.len().max(1) as f64;
    let (sx, sy) = pts.clone().fold((0.0, 0.0), |(ax, ay), p| (ax + p.x, ay + p.y));
    let (cx, cy) = (sx / n, sy / n);
    let spread = pts.map(|p| (p.x - cx).hypot(p.y - cy)).sum::<f64>() / n;
    let s = if spread > 1e-12 {
        std::f64::consts::SQRT_2 / spread
    } else {
        1.0
    };
    Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

#[inline]
fn transform(t: &Matrix3<f64>, p: &Point2<f64>) -> Point2<f64> {
    let v = t * Vector3::new(p.x, p.y, 1.0);
    Point2::new(v[0], v[1])
}

fn finish(hn: Matrix3<f64>, t_src: Matrix3<f64>, t_dst: Matrix3<f64>) -> Option<Homography> {
    let h = t_dst.try_inverse()? * hn * t_src;
    let s = h[(2, 2)];
    if s.abs() < 1e-12 || !h.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(Homography::new(h / s))
}

/// Exact homography from four correspondences (`h33 = 1`, 8x8 linear solve).
///
/// Returns `None` when three of the points are collinear.
pub fn homography_from_4pt(src: &[Point2<f64>; 4], dst: &[Point2<f64>; 4]) -> Option<Homography> {
    let t_src = conditioning(src.iter());
    let t_dst = conditioning(dst.iter());

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for k in 0..4 {
        let s = transform(&t_src, &src[k]);
        let d = transform(&t_dst, &dst[k]);
        let (r0, r1) = (2 * k, 2 * k + 1);

        a[(r0, 0)] = s.x;
        a[(r0, 1)] = s.y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -d.x * s.x;
        a[(r0, 7)] = -d.x * s.y;
        b[r0] = d.x;

        a[(r1, 3)] = s.x;
        a[(r1, 4)] = s.y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -d.y * s.x;
        a[(r1, 7)] = -d.y * s.y;
        b[r1] = d.y;
    }

    let x = a.lu().solve(&b)?;
    let hn = Matrix3::new(x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7], 1.0);
    finish(hn, t_src, t_dst)
}

/// Least-squares homography (normalized DLT) from `n >= 4` correspondences.
pub fn homography_from_points(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }
    if let (Ok(s4), Ok(d4)) = (
        <&[Point2<f64>; 4]>::try_from(src),
        <&[Point2<f64>; 4]>::try_from(dst),
    ) {
        return homography_from_4pt(s4, d4);
    }

    let t_src = conditioning(src.iter());
    let t_dst = conditioning(dst.iter());

    let mut a = DMatrix::<f64>::zeros(2 * src.len(), 9);
    for (k, (ps, pd)) in src.iter().zip(dst).enumerate() {
        let s = transform(&t_src, ps);
        let d = transform(&t_dst, pd);
        let row = [s.x, s.y, 1.0];
        for j in 0..3 {
            a[(2 * k, j)] = -row[j];
            a[(2 * k, 6 + j)] = d.x * row[j];
            a[(2 * k + 1, 3 + j)] = -row[j];
            a[(2 * k + 1, 6 + j)] = d.y * row[j];
        }
    }

    let vt = a.svd(false, true).v_t?;
    let last = vt.nrows().checked_sub(1)?;
    let h = vt.row(last);
    let hn = Matrix3::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);
    finish(hn, t_src, t_dst)
}

/// Sample a `size x size` square patch out of `src`.
///
/// The four `quad` corners land on the patch pixels `(0,0)`, `(size-1,0)`,
/// `(size-1,size-1)` and `(0,size-1)` respectively.
pub fn warp_quad_to_square(
    src: &GrayImageView<'_>,
    quad: &[Point2<f32>; 4],
    size: usize,
) -> Option<GrayImage> {
    if size < 2 {
        return None;
    }
    let m = (size - 1) as f64;
    let patch = [
        Point2::new(0.0, 0.0),
        Point2::new(m, 0.0),
        Point2::new(m, m),
        Point2::new(0.0, m),
    ];
    let img = quad.map(|p| Point2::new(p.x as f64, p.y as f64));
    let img_from_patch = homography_from_4pt(&patch, &img)?;

    let mut out = GrayImage::filled(size, size, 0);
    for y in 0..size {
        for x in 0..size {
            let p = img_from_patch.apply(Point2::new(x as f64, y as f64));
            out.data[y * size + x] = sample_bilinear_u8(src, p.x as f32, p.y as f32);
        }
    }
    Some(out)
}
