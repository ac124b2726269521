use crate::{sample_bilinear_rgb, sample_bilinear_u8, GrayImage, GrayImageView, RgbImage, RgbImageView};
use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector2};
use serde::{Deserialize, Serialize};

/// Planar projective transform acting on homogeneous 2D points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    /// Build from row-major entries.
    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_fn(|r, c| rows[r][c]))
    }

    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        let q = self.h * p.to_homogeneous().cast::<f64>();
        Point2::new((q.x / q.z) as f32, (q.y / q.z) as f32)
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }

    /// Composition `self ∘ other` (apply `other` first).
    pub fn compose(&self, other: &Homography) -> Self {
        Self::new(self.h * other.h)
    }
}

/// Similarity moving the points' centroid to the origin with unit mean radius.
///
/// `None` when any three of the points are (nearly) collinear.
fn conditioning(pts: &[Point2<f32>; 4]) -> Option<Matrix3<f64>> {
    let coords = pts.map(|p| p.coords.cast::<f64>());
    let c = coords.iter().sum::<Vector2<f64>>() / 4.0;
    let radius = coords.iter().map(|v| (v - c).norm()).sum::<f64>() / 4.0;
    if radius < 1e-9 {
        return None;
    }
    let s = 1.0 / radius;
    let unit = coords.map(|v| (v - c) * s);
    for (i, j, k) in [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)] {
        let (a, b) = (unit[j] - unit[i], unit[k] - unit[i]);
        if (a.x * b.y - a.y * b.x).abs() < 1e-6 {
            return None;
        }
    }
    Some(Matrix3::new(s, 0.0, -s * c.x, 0.0, s, -s * c.y, 0.0, 0.0, 1.0))
}

/// Compute H such that `dst ~ H * src` from exactly four correspondences.
///
/// Corner order must be consistent between `src` and `dst`. Returns `None`
/// when three of the points are collinear or coincide.
pub fn homography_from_4pt(src: &[Point2<f32>; 4], dst: &[Point2<f32>; 4]) -> Option<Homography> {
    let (t_src, t_dst) = (conditioning(src)?, conditioning(dst)?);

    // h33 = 1; the other eight entries solve one 8x8 linear system
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for (k, (p, q)) in src.iter().zip(dst).enumerate() {
        let p = t_src * p.to_homogeneous().cast::<f64>();
        let q = t_dst * q.to_homogeneous().cast::<f64>();
        let (x, y, u, v) = (p.x, p.y, q.x, q.y);
        let rows = [
            [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y],
            [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y],
        ];
        for (j, row) in rows.iter().enumerate() {
            for (col, &value) in row.iter().enumerate() {
                a[(2 * k + j, col)] = value;
            }
        }
        b[2 * k] = u;
        b[2 * k + 1] = v;
    }

    let sol = a.lu().solve(&b)?;
    let conditioned = Matrix3::from_fn(|r, c| if (r, c) == (2, 2) { 1.0 } else { sol[3 * r + c] });
    let h = t_dst.try_inverse()? * conditioned * t_src;
    let scale = h[(2, 2)];
    if scale.abs() < 1e-12 || !h.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(Homography::new(h / scale))
}

/// Resample `src` onto an `out_w × out_h` grid; every output pixel center is
/// mapped through `h_src_from_dst` and sampled bilinearly.
pub fn warp_perspective_gray(
    src: &GrayImageView<'_>,
    h_src_from_dst: Homography,
    out_w: usize,
    out_h: usize,
) -> GrayImage {
    let mut out = vec![0u8; out_w * out_h];

    for y in 0..out_h {
        for x in 0..out_w {
            let pd = Point2::new(x as f32 + 0.5, y as f32 + 0.5);
            let ps = h_src_from_dst.apply(pd);
            out[y * out_w + x] = sample_bilinear_u8(src, ps.x, ps.y);
        }
    }

    GrayImage {
        width: out_w,
        height: out_h,
        data: out,
    }
}

/// Color counterpart of [`warp_perspective_gray`].
pub fn warp_perspective_rgb(
    src: &RgbImageView<'_>,
    h_src_from_dst: Homography,
    out_w: usize,
    out_h: usize,
) -> RgbImage {
    let mut out = RgbImage::new(out_w, out_h);

    for y in 0..out_h {
        for x in 0..out_w {
            let pd = Point2::new(x as f32 + 0.5, y as f32 + 0.5);
            let ps = h_src_from_dst.apply(pd);
            out.put(x, y, sample_bilinear_rgb(src, ps.x, ps.y));
        }
    }

    out
}
