//! Polygon approximation and quad geometry helpers.

use nalgebra::Point2;

#[inline]
fn dist_sq(a: Point2<i32>, b: Point2<i32>) -> i64 {
    let (dx, dy) = ((a.x - b.x) as i64, (a.y - b.y) as i64);
    dx * dx + dy * dy
}

/// Douglas-Peucker simplification of a closed contour.
///
/// Vertices are returned in contour order. The initial split uses a pair of
/// mutually distant points so the result does not depend on where the
/// contour trace happened to start.
pub fn approx_polygon_closed(contour: &[Point2<i32>], epsilon: f64) -> Vec<Point2<i32>> {
    let n = contour.len();
    if n < 3 {
        return contour.to_vec();
    }
    let farthest_from = |i: usize| -> (usize, i64) {
        (0..n)
            .map(|j| (j, dist_sq(contour[i], contour[j])))
            .fold((i, 0), |best, cur| if cur.1 > best.1 { cur } else { best })
    };

    let mut a = 0;
    let (mut b, mut d) = farthest_from(a);
    for _ in 0..2 {
        let (c, dc) = farthest_from(b);
        a = b;
        b = c;
        d = dc;
    }
    if (d as f64) <= epsilon * epsilon {
        return vec![contour[a]];
    }

    // Walk indices are unwrapped: `a..=b` and `b..=a + n`.
    let b = if b > a { b } else { b + n };
    let at = |i: usize| contour[i % n];

    let mut out = Vec::new();
    let mut stack = vec![(b, a + n), (a, b)];
    while let Some((s, e)) = stack.pop() {
        let (ps, pe) = (at(s), at(e));
        let (dx, dy) = ((pe.x - ps.x) as f64, (pe.y - ps.y) as f64);
        let len = dx.hypot(dy);

        let mut split = None;
        let mut worst = epsilon;
        for i in s + 1..e {
            let p = at(i);
            let (px, py) = ((p.x - ps.x) as f64, (p.y - ps.y) as f64);
            let d = if len > 0.0 {
                (px * dy - py * dx).abs() / len
            } else {
                px.hypot(py)
            };
            if d > worst {
                worst = d;
                split = Some(i);
            }
        }
        match split {
            Some(m) => {
                stack.push((m, e));
                stack.push((s, m));
            }
            None => out.push(ps),
        }
    }
    out
}

/// Signed twice-area; positive when the vertices run clockwise on screen.
pub fn signed_area2(poly: &[Point2<f32>]) -> f64 {
    let n = poly.len();
    (0..n)
        .map(|i| {
            let (p, q) = (poly[i], poly[(i + 1) % n]);
            p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64
        })
        .sum()
}

/// Strictly convex polygon test (no collinear vertices).
pub fn is_convex(poly: &[Point2<i32>]) -> bool {
    let n = poly.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0i64;
    for i in 0..n {
        let (a, b, c) = (poly[i], poly[(i + 1) % n], poly[(i + 2) % n]);
        let (ux, uy) = ((b.x - a.x) as i64, (b.y - a.y) as i64);
        let (vx, vy) = ((c.x - b.x) as i64, (c.y - b.y) as i64);
        let cross = ux * vy - uy * vx;
        if cross == 0 || (sign != 0 && cross.signum() != sign) {
            return false;
        }
        sign = cross.signum();
    }
    true
}

pub fn perimeter(quad: &[Point2<f32>; 4]) -> f32 {
    (0..4).map(|i| (quad[(i + 1) % 4] - quad[i]).norm()).sum()
}

/// Reorder corners clockwise on screen starting from the corner with the
/// smallest `x + y`.
pub fn canonical_clockwise(mut quad: [Point2<f32>; 4]) -> [Point2<f32>; 4] {
    if signed_area2(&quad) < 0.0 {
        quad.swap(1, 3);
    }
    let start = (0..4)
        .min_by(|&i, &j| {
            (quad[i].x + quad[i].y)
                .partial_cmp(&(quad[j].x + quad[j].y))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(0);
    quad.rotate_left(start);
    quad
}

/// Mean squared corner distance under the best cyclic alignment.
pub fn quad_distance_sq(a: &[Point2<f32>; 4], b: &[Point2<f32>; 4]) -> f32 {
    (0..4)
        .map(|shift| {
            (0..4)
                .map(|i| (a[i] - b[(i + shift) % 4]).norm_squared())
                .sum::<f32>()
                / 4.0
        })
        .fold(f32::INFINITY, f32::min)
}

/// Even-odd point-in-polygon test.
pub fn contains_point(poly: &[Point2<f32>; 4], p: Point2<f32>) -> bool {
    let mut inside = false;
    let mut j = 3;
    for i in 0..4 {
        let (a, b) = (poly[i], poly[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_contour(x0: i32, y0: i32, side: i32) -> Vec<Point2<i32>> {
        let mut pts = Vec::new();
        for x in x0..x0 + side {
            pts.push(Point2::new(x, y0));
        }
        for y in y0..y0 + side {
            pts.push(Point2::new(x0 + side, y));
        }
        for x in (x0 + 1..=x0 + side).rev() {
            pts.push(Point2::new(x, y0 + side));
        }
        for y in (y0 + 1..=y0 + side).rev() {
            pts.push(Point2::new(x0, y));
        }
        pts
    }

    #[test]
    fn square_contour_reduces_to_four_corners() {
        let contour = square_contour(10, 20, 30);
        let poly = approx_polygon_closed(&contour, contour.len() as f64 * 0.03);
        assert_eq!(poly.len(), 4);
        for corner in [
            Point2::new(10, 20),
            Point2::new(40, 20),
            Point2::new(40, 50),
            Point2::new(10, 50),
        ] {
            assert!(poly.contains(&corner), "missing {corner:?} in {poly:?}");
        }
        assert!(is_convex(&poly));
    }

    #[test]
    fn concave_polygon_is_rejected() {
        let poly = [
            Point2::new(0, 0),
            Point2::new(10, 0),
            Point2::new(5, 3),
            Point2::new(5, 10),
        ];
        assert!(!is_convex(&poly));
    }

    #[test]
    fn canonical_order_is_clockwise_from_top_left() {
        let ccw = [
            Point2::new(10.0f32, 20.0),
            Point2::new(10.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 20.0),
        ];
        let q = canonical_clockwise(ccw);
        assert_eq!(q[0], Point2::new(1.0, 1.0));
        assert_eq!(q[1], Point2::new(10.0, 1.0));
        assert_eq!(q[2], Point2::new(10.0, 20.0));
        assert!(signed_area2(&q) > 0.0);
    }

    #[test]
    fn shifted_copies_are_close() {
        let a = [
            Point2::new(0.0f32, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ];
        let mut b = a;
        b.rotate_left(2);
        assert_eq!(quad_distance_sq(&a, &b), 0.0);
        assert!(contains_point(&a, Point2::new(5.0, 5.0)));
        assert!(!contains_point(&a, Point2::new(15.0, 5.0)));
    }
}
