//! Iterative sub-pixel corner refinement.
//!
//! At the true corner `q`, every image gradient `g(p)` in the window is
//! orthogonal to `p - q`. Each iteration solves the Gaussian-weighted least
//! squares system `sum(g g^T) q = sum(g g^T p)` and re-centres the window.

use fidpose_core::GrayImageView;
use nalgebra::{Matrix2, Point2, Vector2};

/// Window half-size plus stopping criteria.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubpixCriteria {
    pub half_window: usize,
    pub max_iterations: usize,
    /// Stop once a step moves the corner less than this (pixels).
    pub epsilon: f64,
    /// Half-size of the dead zone around the current estimate that is left
    /// out of the sums. Near the tip of an L-shaped corner the gradients are
    /// not orthogonal to `p - q` and drag the estimate into the dark
    /// quadrant. `None` uses the whole window.
    pub zero_zone: Option<usize>,
}

/// Bilinear sample with edge pixels replicated outwards.
fn sample_clamped(img: &GrayImageView<'_>, x: f64, y: f64) -> f64 {
    let max_x = (img.width - 1) as f64;
    let max_y = (img.height - 1) as f64;
    let (x, y) = (x.clamp(0.0, max_x), y.clamp(0.0, max_y));
    let (x0, y0) = (x.floor() as usize, y.floor() as usize);
    let (x1, y1) = ((x0 + 1).min(img.width - 1), (y0 + 1).min(img.height - 1));
    let (fx, fy) = (x - x0 as f64, y - y0 as f64);
    let px = |xx: usize, yy: usize| img.data[yy * img.width + xx] as f64;
    let top = px(x0, y0) + fx * (px(x1, y0) - px(x0, y0));
    let bottom = px(x0, y1) + fx * (px(x1, y1) - px(x0, y1));
    top + fy * (bottom - top)
}

/// Refine one corner. Returns the start point unchanged when the solve is
/// singular, leaves the image, or wanders outside the window.
pub fn refine_corner(
    img: &GrayImageView<'_>,
    start: Point2<f32>,
    crit: &SubpixCriteria,
) -> Point2<f32> {
    if img.width < 2 || img.height < 2 || crit.half_window == 0 {
        return start;
    }
    let half = crit.half_window as isize;
    let side = 2 * crit.half_window + 1;
    let inv_w2 = 1.0 / (half * half) as f64;
    let weights: Vec<f64> = (-half..=half).map(|i| (-(i * i) as f64 * inv_w2).exp()).collect();

    // Patch with a one-pixel apron for central differences.
    let apron = side + 2;
    let mut patch = vec![0.0f64; apron * apron];

    let origin = Vector2::new(start.x as f64, start.y as f64);
    let mut q = origin;
    let eps_sq = crit.epsilon * crit.epsilon;
    let dead = crit.zero_zone.map(|z| z as f64);

    for _ in 0..crit.max_iterations {
        for (r, row) in patch.chunks_exact_mut(apron).enumerate() {
            let y = q.y + r as f64 - (half + 1) as f64;
            for (c, v) in row.iter_mut().enumerate() {
                *v = sample_clamped(img, q.x + c as f64 - (half + 1) as f64, y);
            }
        }

        let mut a = Matrix2::<f64>::zeros();
        let mut b = Vector2::<f64>::zeros();
        for i in 0..side {
            let py = i as f64 - half as f64;
            for j in 0..side {
                let px = j as f64 - half as f64;
                if dead.is_some_and(|z| px.abs() <= z && py.abs() <= z) {
                    continue;
                }
                let (r, c) = (i + 1, j + 1);
                let gx = patch[r * apron + c + 1] - patch[r * apron + c - 1];
                let gy = patch[(r + 1) * apron + c] - patch[(r - 1) * apron + c];
                let m = weights[i] * weights[j];
                let (gxx, gxy, gyy) = (gx * gx * m, gx * gy * m, gy * gy * m);
                a[(0, 0)] += gxx;
                a[(0, 1)] += gxy;
                a[(1, 1)] += gyy;
                b.x += gxx * px + gxy * py;
                b.y += gxy * px + gyy * py;
            }
        }
        a[(1, 0)] = a[(0, 1)];

        if a.determinant().abs() <= f64::EPSILON * f64::EPSILON {
            break;
        }
        let Some(step) = a.try_inverse().map(|inv| inv * b) else {
            break;
        };
        q += step;
        if q.x < 0.0 || q.y < 0.0 || q.x >= img.width as f64 || q.y >= img.height as f64 {
            break;
        }
        if step.norm_squared() <= eps_sq {
            break;
        }
    }

    let moved = q - origin;
    if !q.iter().all(|v| v.is_finite())
        || moved.x.abs() > crit.half_window as f64
        || moved.y.abs() > crit.half_window as f64
    {
        return start;
    }
    Point2::new(q.x as f32, q.y as f32)
}

pub fn refine_quad(
    img: &GrayImageView<'_>,
    quad: &[Point2<f32>; 4],
    crit: &SubpixCriteria,
) -> [Point2<f32>; 4] {
    quad.map(|c| refine_corner(img, c, crit))
}
