use crate::SurfaceParams;
use blackjack_vision_core::{
    approx_polygon_closed, binarize_otsu, closed_perimeter, convex_hull, find_components,
    fit_line, intersect_lines, is_convex, polygon_area, triangle_area, GrayImageView,
};
use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Blobs smaller than this cannot be a table at any sensible resolution.
const MIN_BLOB_PIXELS: usize = 64;

/// Boundary samples farther than this from a coarse edge are not fitted.
const EDGE_BAND_PX: f32 = 3.0;

/// A refined corner may not wander farther than this from its coarse estimate.
const MAX_CORNER_SHIFT_PX: f32 = 4.0;

/// A table candidate: four corners clockwise from the top-left.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableQuad {
    pub corners: [Point2<f32>; 4],
    pub area: f32,
}

/// Order four points clockwise (image coordinates, y down), starting at the
/// corner with the smallest `x + y`.
pub fn order_corners_clockwise(pts: [Point2<f32>; 4]) -> [Point2<f32>; 4] {
    let cx = pts.iter().map(|p| p.x).sum::<f32>() / 4.0;
    let cy = pts.iter().map(|p| p.y).sum::<f32>() / 4.0;
    let mut sorted = pts;
    // with y down, increasing atan2 sweeps clockwise on screen
    sorted.sort_by(|a, b| {
        let ta = (a.y - cy).atan2(a.x - cx);
        let tb = (b.y - cy).atan2(b.x - cx);
        ta.total_cmp(&tb)
    });
    let start = (0..4)
        .min_by(|&i, &j| {
            let si = sorted[i].x + sorted[i].y;
            let sj = sorted[j].x + sorted[j].y;
            si.total_cmp(&sj)
        })
        .unwrap_or(0);
    [
        sorted[start],
        sorted[(start + 1) % 4],
        sorted[(start + 2) % 4],
        sorted[(start + 3) % 4],
    ]
}

pub(crate) fn corners_well_separated(
    corners: &[Point2<f32>; 4],
    area: f32,
    params: &SurfaceParams,
) -> bool {
    for i in 0..4 {
        for j in (i + 1)..4 {
            if (corners[i] - corners[j]).norm() < params.min_corner_separation_px {
                return false;
            }
        }
    }
    let min_tri = params.min_corner_triangle_frac * area;
    (0..4).all(|skip| {
        let t: Vec<Point2<f32>> = (0..4).filter(|&k| k != skip).map(|k| corners[k]).collect();
        triangle_area(t[0], t[1], t[2]) >= min_tri
    })
}

/// Points every pixel or so along the closed polygon `poly`.
fn densify(poly: &[Point2<f32>]) -> Vec<Point2<f32>> {
    let mut out = Vec::new();
    for (i, &a) in poly.iter().enumerate() {
        let b = poly[(i + 1) % poly.len()];
        let steps = (b - a).norm().ceil().max(1.0) as usize;
        out.extend((0..steps).map(|k| a + (b - a) * (k as f32 / steps as f32)));
    }
    out
}

/// Snap each coarse corner to the intersection of lines fitted to the
/// boundary samples along its two edges.
///
/// Only the middle of every edge is sampled, so pixels rounded off at the
/// corners do not bend the fit.
pub(crate) fn refine_corners(coarse: &[Point2<f32>; 4], boundary: &[Point2<f32>]) -> [Point2<f32>; 4] {
    let edges: Vec<Option<_>> = (0..4)
        .map(|i| {
            let (a, b) = (coarse[i], coarse[(i + 1) % 4]);
            let ab = b - a;
            let len2 = ab.norm_squared();
            if len2 <= f32::EPSILON {
                return None;
            }
            let len = len2.sqrt();
            let band: Vec<Point2<f32>> = boundary
                .iter()
                .copied()
                .filter(|p| {
                    let ap = p - a;
                    let t = ap.dot(&ab) / len2;
                    let off = (ab.x * ap.y - ab.y * ap.x).abs() / len;
                    (0.15..=0.85).contains(&t) && off <= EDGE_BAND_PX
                })
                .collect();
            if band.len() < 2 {
                return None;
            }
            fit_line(&band)
        })
        .collect();

    let mut refined = *coarse;
    for (i, corner) in refined.iter_mut().enumerate() {
        // corner i joins edge i-1 (incoming) and edge i (outgoing)
        let (Some(incoming), Some(outgoing)) = (edges[(i + 3) % 4], edges[i]) else {
            continue;
        };
        if let Some(p) = intersect_lines(incoming, outgoing) {
            if (p - *corner).norm() <= MAX_CORNER_SHIFT_PX {
                *corner = p;
            }
        }
    }
    refined
}

/// Largest plausible table quadrilateral in a single gray frame.
pub fn find_table_quad(gray: &GrayImageView<'_>, params: &SurfaceParams) -> Option<TableQuad> {
    let frame_area = (gray.width * gray.height) as f32;
    if frame_area <= 0.0 {
        return None;
    }
    let mut best: Option<TableQuad> = None;

    for dark_foreground in [false, true] {
        let (mask, threshold) = binarize_otsu(gray, dark_foreground);
        for comp in find_components(&mask.view(), MIN_BLOB_PIXELS) {
            let outline = convex_hull(&comp.boundary_pixel_corners());
            let eps = params.approx_epsilon_frac * closed_perimeter(&outline);
            let approx = approx_polygon_closed(&outline, eps);
            if approx.len() != 4 || !is_convex(&approx) {
                continue;
            }
            let area = polygon_area(&approx);
            let frac = area / frame_area;
            if frac < params.min_area_frac || frac > params.max_area_frac {
                continue;
            }
            let coarse = order_corners_clockwise([approx[0], approx[1], approx[2], approx[3]]);
            let corners = refine_corners(&coarse, &densify(&outline));
            if !corners_well_separated(&corners, area, params) {
                continue;
            }
            debug!(
                "quad candidate: area {:.1}% (otsu {}, dark={})",
                frac * 100.0,
                threshold,
                dark_foreground
            );
            if best.as_ref().is_none_or(|b| area > b.area) {
                best = Some(TableQuad { corners, area });
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use blackjack_vision_core::{fill_polygon, fill_rect, RgbImage};

    #[test]
    fn orders_shuffled_corners() {
        let tl = Point2::new(10.0, 12.0);
        let tr = Point2::new(200.0, 5.0);
        let br = Point2::new(210.0, 150.0);
        let bl = Point2::new(3.0, 140.0);
        assert_eq!(order_corners_clockwise([br, tl, bl, tr]), [tl, tr, br, bl]);
        assert_eq!(order_corners_clockwise([bl, br, tr, tl]), [tl, tr, br, bl]);
    }

    #[test]
    fn nearly_collinear_corners_are_rejected() {
        let params = SurfaceParams::default();
        let good = [
            Point2::new(0.0, 0.0),
            Point2::new(100.0, 0.0),
            Point2::new(100.0, 80.0),
            Point2::new(0.0, 80.0),
        ];
        assert!(corners_well_separated(&good, 8000.0, &params));

        // third corner barely off the line through its neighbours
        let sliver = [
            Point2::new(0.0, 0.0),
            Point2::new(100.0, 0.0),
            Point2::new(200.0, 4.0),
            Point2::new(0.0, 80.0),
        ];
        let area = polygon_area(&sliver);
        assert!(!corners_well_separated(&sliver, area, &params));

        let close = [
            Point2::new(0.0, 0.0),
            Point2::new(100.0, 0.0),
            Point2::new(100.0, 80.0),
            Point2::new(95.0, 78.0),
        ];
        assert!(!corners_well_separated(&close, 4000.0, &params));
    }

    #[test]
    fn finds_table_on_dark_and_bright_surroundings() {
        let corners = [
            Point2::new(60.0, 50.0),
            Point2::new(330.0, 40.0),
            Point2::new(350.0, 260.0),
            Point2::new(40.0, 250.0),
        ];
        for (surround, felt) in [([40, 30, 20], [30, 120, 60]), ([220, 220, 210], [20, 90, 40])] {
            let mut img = RgbImage::filled(400, 300, surround);
            fill_polygon(&mut img, &corners, felt);
            let gray = img.view().to_gray();
            let quad = find_table_quad(&gray.view(), &SurfaceParams::default()).expect("quad");
            for (found, expected) in quad.corners.iter().zip(corners.iter()) {
                assert!((*found - *expected).norm() < 2.0, "{found:?} vs {expected:?}");
            }
        }
    }

    #[test]
    fn refinement_pulls_a_clipped_corner_back_onto_the_edges() {
        let truth = [
            Point2::new(0.0, 0.0),
            Point2::new(100.0, 0.0),
            Point2::new(100.0, 80.0),
            Point2::new(0.0, 80.0),
        ];
        let mut boundary = Vec::new();
        for i in 0..=100 {
            boundary.push(Point2::new(i as f32, 0.0));
            boundary.push(Point2::new(i as f32, 80.0));
        }
        for i in 0..=80 {
            boundary.push(Point2::new(0.0, i as f32));
            boundary.push(Point2::new(100.0, i as f32));
        }
        // bottom-left estimate landed on the left edge, 3 px above the corner
        let mut coarse = truth;
        coarse[3] = Point2::new(0.0, 77.0);
        let refined = refine_corners(&coarse, &boundary);
        for (found, expected) in refined.iter().zip(truth.iter()) {
            assert!((*found - *expected).norm() < 0.5, "{found:?} vs {expected:?}");
        }
    }

    #[test]
    fn axis_aligned_table_keeps_exact_corners() {
        let mut img = RgbImage::filled(400, 300, [40, 30, 20]);
        fill_rect(&mut img, 50, 40, 300, 220, [30, 120, 60]);
        let gray = img.view().to_gray();
        let quad = find_table_quad(&gray.view(), &SurfaceParams::default()).expect("quad");
        let expected = [(50.0, 40.0), (350.0, 40.0), (350.0, 260.0), (50.0, 260.0)];
        for (found, (x, y)) in quad.corners.iter().zip(expected) {
            assert!((found.x - x).abs() < 1e-3 && (found.y - y).abs() < 1e-3, "{found:?}");
        }
    }

    #[test]
    fn small_quad_is_not_a_table() {
        let mut img = RgbImage::filled(400, 300, [40, 30, 20]);
        let corners = [
            Point2::new(100.0, 100.0),
            Point2::new(160.0, 100.0),
            Point2::new(160.0, 150.0),
            Point2::new(100.0, 150.0),
        ];
        fill_polygon(&mut img, &corners, [30, 120, 60]);
        let gray = img.view().to_gray();
        assert!(find_table_quad(&gray.view(), &SurfaceParams::default()).is_none());
    }
}
