//! Planar polygon helpers: boxes, hulls, oriented rectangles, simplification.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Axis-aligned box in continuous pixel coordinates, `min` inclusive, `max` exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min: Point2<f32>,
    pub max: Point2<f32>,
}

impl BBox {
    pub fn new(min: Point2<f32>, max: Point2<f32>) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: &[Point2<f32>]) -> Option<Self> {
        let first = points.first()?;
        let mut min = *first;
        let mut max = *first;
        for p in points {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        Some(Self { min, max })
    }

    #[inline]
    pub fn width(&self) -> f32 {
        (self.max.x - self.min.x).max(0.0)
    }

    #[inline]
    pub fn height(&self) -> f32 {
        (self.max.y - self.min.y).max(0.0)
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Point2<f32> {
        Point2::new(0.5 * (self.min.x + self.max.x), 0.5 * (self.min.y + self.max.y))
    }

    pub fn intersection_area(&self, other: &BBox) -> f32 {
        let w = self.max.x.min(other.max.x) - self.min.x.max(other.min.x);
        let h = self.max.y.min(other.max.y) - self.min.y.max(other.min.y);
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }

    /// Intersection area as a fraction of the smaller box.
    pub fn overlap_fraction(&self, other: &BBox) -> f32 {
        let smaller = self.area().min(other.area());
        if smaller <= 0.0 {
            return 0.0;
        }
        self.intersection_area(other) / smaller
    }

    pub fn contains(&self, p: Point2<f32>) -> bool {
        p.x >= self.min.x && p.x < self.max.x && p.y >= self.min.y && p.y < self.max.y
    }
}

/// Oriented rectangle. `angle` is the direction of the `width` side in radians.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RotatedRect {
    pub center: Point2<f32>,
    pub width: f32,
    pub height: f32,
    pub angle: f32,
}

impl RotatedRect {
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn long_side(&self) -> f32 {
        self.width.max(self.height)
    }

    pub fn short_side(&self) -> f32 {
        self.width.min(self.height)
    }

    /// Long/short side ratio (`>= 1`).
    pub fn aspect(&self) -> f32 {
        let s = self.short_side();
        if s <= f32::EPSILON {
            return f32::INFINITY;
        }
        self.long_side() / s
    }

    /// Corners in clockwise order (image coordinates, y down).
    pub fn corners(&self) -> [Point2<f32>; 4] {
        let (s, c) = self.angle.sin_cos();
        let u = (c * 0.5 * self.width, s * 0.5 * self.width);
        let v = (-s * 0.5 * self.height, c * 0.5 * self.height);
        let p = |a: f32, b: f32| {
            Point2::new(
                self.center.x + a * u.0 + b * v.0,
                self.center.y + a * u.1 + b * v.1,
            )
        };
        let pts = [p(-1.0, -1.0), p(1.0, -1.0), p(1.0, 1.0), p(-1.0, 1.0)];
        if signed_area(&pts) < 0.0 {
            [pts[0], pts[3], pts[2], pts[1]]
        } else {
            pts
        }
    }
}

#[inline]
fn cross(o: Point2<f32>, a: Point2<f32>, b: Point2<f32>) -> f32 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Shoelace area; positive for clockwise order in image coordinates (y down).
pub fn signed_area(poly: &[Point2<f32>]) -> f32 {
    if poly.len() < 3 {
        return 0.0;
    }
    let mut acc = 0.0f64;
    for i in 0..poly.len() {
        let a = poly[i];
        let b = poly[(i + 1) % poly.len()];
        acc += a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64;
    }
    (0.5 * acc) as f32
}

pub fn polygon_area(poly: &[Point2<f32>]) -> f32 {
    signed_area(poly).abs()
}

/// Length of the closed polyline.
pub fn closed_perimeter(poly: &[Point2<f32>]) -> f32 {
    if poly.len() < 2 {
        return 0.0;
    }
    (0..poly.len())
        .map(|i| {
            let a = poly[i];
            let b = poly[(i + 1) % poly.len()];
            (b - a).norm()
        })
        .sum()
}

pub fn centroid(points: &[Point2<f32>]) -> Option<Point2<f32>> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f32;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Point2::new(sx / n, sy / n))
}

/// Convex hull (Andrew's monotone chain), clockwise in image coordinates.
pub fn convex_hull(points: &[Point2<f32>]) -> Vec<Point2<f32>> {
    let mut pts: Vec<Point2<f32>> = points.to_vec();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut lower: Vec<Point2<f32>> = Vec::with_capacity(pts.len());
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }
    let mut upper: Vec<Point2<f32>> = Vec::with_capacity(pts.len());
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Minimum-area enclosing rectangle of a point set (rotating edges of the hull).
pub fn min_area_rect(points: &[Point2<f32>]) -> Option<RotatedRect> {
    let hull = convex_hull(points);
    if hull.is_empty() {
        return None;
    }
    if hull.len() < 3 {
        let bb = BBox::from_points(&hull)?;
        return Some(RotatedRect {
            center: bb.center(),
            width: bb.width(),
            height: bb.height(),
            angle: 0.0,
        });
    }

    let mut best: Option<(f32, RotatedRect)> = None;
    for i in 0..hull.len() {
        let a = hull[i];
        let b = hull[(i + 1) % hull.len()];
        let edge = b - a;
        let len = edge.norm();
        if len <= f32::EPSILON {
            continue;
        }
        let u = edge / len;
        let v = nalgebra::Vector2::new(-u.y, u.x);

        let (mut min_u, mut max_u) = (f32::INFINITY, f32::NEG_INFINITY);
        let (mut min_v, mut max_v) = (f32::INFINITY, f32::NEG_INFINITY);
        for p in &hull {
            let d = *p - a;
            let pu = d.dot(&u);
            let pv = d.dot(&v);
            min_u = min_u.min(pu);
            max_u = max_u.max(pu);
            min_v = min_v.min(pv);
            max_v = max_v.max(pv);
        }
        let area = (max_u - min_u) * (max_v - min_v);
        if best.as_ref().map(|(ba, _)| area < *ba - 1e-3).unwrap_or(true) {
            let cu = 0.5 * (min_u + max_u);
            let cv = 0.5 * (min_v + max_v);
            let center = a + u * cu + v * cv;
            best = Some((
                area,
                RotatedRect {
                    center,
                    width: max_u - min_u,
                    height: max_v - min_v,
                    angle: u.y.atan2(u.x),
                },
            ));
        }
    }
    best.map(|(_, r)| r)
}

fn perpendicular_distance(p: Point2<f32>, a: Point2<f32>, b: Point2<f32>) -> f32 {
    let ab = b - a;
    let len = ab.norm();
    if len <= f32::EPSILON {
        return (p - a).norm();
    }
    cross(a, b, p).abs() / len
}

fn douglas_peucker(points: &[Point2<f32>], eps: f32, out: &mut Vec<Point2<f32>>) {
    // `points` is an open chain; pushes all kept points except the last.
    if points.len() < 3 {
        out.push(points[0]);
        return;
    }
    let first = points[0];
    let last = points[points.len() - 1];
    let (idx, dist) = points[1..points.len() - 1]
        .iter()
        .enumerate()
        .map(|(i, &p)| (i + 1, perpendicular_distance(p, first, last)))
        .fold((0, -1.0f32), |best, cur| if cur.1 > best.1 { cur } else { best });

    if dist > eps {
        douglas_peucker(&points[..=idx], eps, out);
        douglas_peucker(&points[idx..], eps, out);
    } else {
        out.push(first);
    }
}

fn farthest_from(points: &[Point2<f32>], from: Point2<f32>) -> usize {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| (i, (*p - from).norm_squared()))
        .fold((0, -1.0f32), |best, cur| if cur.1 > best.1 { cur } else { best })
        .0
}

/// Douglas–Peucker simplification of a closed polygon.
///
/// The outline is split at its two mutually farthest points, which are always
/// kept; the input's starting point carries no special weight.
pub fn approx_polygon_closed(points: &[Point2<f32>], eps: f32) -> Vec<Point2<f32>> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let n = points.len();
    let a = farthest_from(points, points[0]);
    let b = farthest_from(points, points[a]);
    if a == b {
        return vec![points[a]];
    }

    let ring: Vec<Point2<f32>> = points[a..].iter().chain(&points[..a]).copied().collect();
    let split = (b + n - a) % n;
    let mut out = Vec::new();
    douglas_peucker(&ring[..=split], eps, &mut out);
    let mut tail: Vec<Point2<f32>> = ring[split..].to_vec();
    tail.push(ring[0]);
    douglas_peucker(&tail, eps, &mut out);
    out
}

/// Total least squares line through `points`: a point on it and its unit
/// direction. `None` for fewer than two distinct points.
pub fn fit_line(points: &[Point2<f32>]) -> Option<(Point2<f32>, Vector2<f32>)> {
    let m = centroid(points)?;
    let (mut sxx, mut sxy, mut syy) = (0.0f32, 0.0f32, 0.0f32);
    for p in points {
        let d = p - m;
        sxx += d.x * d.x;
        sxy += d.x * d.y;
        syy += d.y * d.y;
    }
    if sxx + syy <= f32::EPSILON {
        return None;
    }
    let theta = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    Some((m, Vector2::new(theta.cos(), theta.sin())))
}

/// Intersection of two lines given as point and direction; `None` when they
/// are (nearly) parallel.
pub fn intersect_lines(
    (p, d): (Point2<f32>, Vector2<f32>),
    (q, e): (Point2<f32>, Vector2<f32>),
) -> Option<Point2<f32>> {
    let denom = d.x * e.y - d.y * e.x;
    if denom.abs() < 1e-6 {
        return None;
    }
    let w = q - p;
    let t = (w.x * e.y - w.y * e.x) / denom;
    Some(p + d * t)
}

pub fn is_convex(poly: &[Point2<f32>]) -> bool {
    if poly.len() < 3 {
        return false;
    }
    let mut sign = 0.0f32;
    for i in 0..poly.len() {
        let c = cross(poly[i], poly[(i + 1) % poly.len()], poly[(i + 2) % poly.len()]);
        if c.abs() <= f32::EPSILON {
            continue;
        }
        if sign == 0.0 {
            sign = c.signum();
        } else if c.signum() != sign {
            return false;
        }
    }
    sign != 0.0
}

pub fn triangle_area(a: Point2<f32>, b: Point2<f32>, c: Point2<f32>) -> f32 {
    0.5 * cross(a, b, c).abs()
}

/// Even-odd point-in-polygon test.
pub fn point_in_polygon(p: Point2<f32>, poly: &[Point2<f32>]) -> bool {
    let mut inside = false;
    let n = poly.len();
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let (a, b) = (poly[i], poly[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}
