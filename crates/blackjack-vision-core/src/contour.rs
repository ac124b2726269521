//! Connected components and outer boundary tracing on binary masks.

use crate::{BBox, GrayImageView};
use nalgebra::Point2;

/// Clockwise neighbor offsets in image coordinates, starting East.
const DIRS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Index of the West neighbor in [`DIRS`].
const WEST: usize = 4;

/// One 8-connected foreground component with its traced outer boundary.
#[derive(Clone, Debug)]
pub struct Component {
    /// Boundary pixel centers, clockwise, closed implicitly.
    pub contour: Vec<Point2<f32>>,
    pub pixel_count: usize,
    /// Mean of the pixel centers.
    pub centroid: Point2<f32>,
    /// Pixel-corner extents.
    pub bbox: BBox,
}

impl Component {
    /// The four corners of every boundary pixel; its hull is the exact
    /// continuous outline of the component.
    pub fn boundary_pixel_corners(&self) -> Vec<Point2<f32>> {
        let mut out = Vec::with_capacity(self.contour.len() * 4);
        for c in &self.contour {
            for (dx, dy) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                out.push(Point2::new(c.x + dx, c.y + dy));
            }
        }
        out
    }
}

struct Accum {
    count: usize,
    sum_x: f64,
    sum_y: f64,
    min: (i32, i32),
    max: (i32, i32),
}

/// Label 8-connected foreground (`!= 0`) components and trace the outer
/// boundary of each one holding at least `min_pixels` pixels.
///
/// Components are returned in raster order of their top-left pixel.
pub fn find_components(mask: &GrayImageView<'_>, min_pixels: usize) -> Vec<Component> {
    let (w, h) = (mask.width, mask.height);
    let mut labels = vec![0u32; w * h];
    let mut next_label = 1u32;
    let mut stack: Vec<(i32, i32)> = Vec::new();
    let mut out = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            if mask.data[idx] == 0 || labels[idx] != 0 {
                continue;
            }
            let label = next_label;
            next_label += 1;

            let mut acc = Accum {
                count: 0,
                sum_x: 0.0,
                sum_y: 0.0,
                min: (x as i32, y as i32),
                max: (x as i32, y as i32),
            };
            labels[idx] = label;
            stack.push((x as i32, y as i32));
            while let Some((px, py)) = stack.pop() {
                acc.count += 1;
                acc.sum_x += px as f64 + 0.5;
                acc.sum_y += py as f64 + 0.5;
                acc.min = (acc.min.0.min(px), acc.min.1.min(py));
                acc.max = (acc.max.0.max(px), acc.max.1.max(py));
                for (dx, dy) in DIRS {
                    let (nx, ny) = (px + dx, py + dy);
                    if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                        continue;
                    }
                    let nidx = ny as usize * w + nx as usize;
                    if mask.data[nidx] != 0 && labels[nidx] == 0 {
                        labels[nidx] = label;
                        stack.push((nx, ny));
                    }
                }
            }

            if acc.count < min_pixels.max(1) {
                continue;
            }

            let max_steps = 4 * acc.count + 16;
            let contour = trace_boundary(&labels, w, h, label, (x as i32, y as i32), max_steps)
                .into_iter()
                .map(|(cx, cy)| Point2::new(cx as f32 + 0.5, cy as f32 + 0.5))
                .collect();
            let n = acc.count as f64;
            out.push(Component {
                contour,
                pixel_count: acc.count,
                centroid: Point2::new((acc.sum_x / n) as f32, (acc.sum_y / n) as f32),
                bbox: BBox::new(
                    Point2::new(acc.min.0 as f32, acc.min.1 as f32),
                    Point2::new(acc.max.0 as f32 + 1.0, acc.max.1 as f32 + 1.0),
                ),
            });
        }
    }

    out
}

/// Moore-neighbor tracing with Jacob's stopping criterion.
///
/// `start` must be the first pixel of the component in raster order, so
/// its West, North-West, North and North-East neighbors are background.
fn trace_boundary(
    labels: &[u32],
    w: usize,
    h: usize,
    label: u32,
    start: (i32, i32),
    max_steps: usize,
) -> Vec<(i32, i32)> {
    let inside = |x: i32, y: i32| {
        x >= 0 && y >= 0 && x < w as i32 && y < h as i32 && labels[y as usize * w + x as usize] == label
    };
    let step = |cur: (i32, i32), from: usize| {
        (0..8).map(|k| (from + k) % 8).find_map(|d| {
            let n = (cur.0 + DIRS[d].0, cur.1 + DIRS[d].1);
            inside(n.0, n.1).then_some((d, n))
        })
    };

    let mut contour = vec![start];
    let Some((mut dir, second)) = step(start, WEST) else {
        return contour;
    };
    let mut cur = second;
    for _ in 0..max_steps {
        // the pixel we came from is a neighbor, so a step always exists
        let Some((next_dir, next)) = step(cur, (dir + 6) % 8) else {
            break;
        };
        if cur == start && next == second {
            break;
        }
        contour.push(cur);
        cur = next;
        dir = next_dir;
    }
    contour
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GrayImage;

    fn mask_with(w: usize, h: usize, f: impl Fn(usize, usize) -> bool) -> GrayImage {
        let mut img = GrayImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                if f(x, y) {
                    img.data[y * w + x] = 255;
                }
            }
        }
        img
    }

    #[test]
    fn rectangle_boundary_is_traced_clockwise() {
        let mask = mask_with(20, 20, |x, y| (3..13).contains(&x) && (5..9).contains(&y));
        let comps = find_components(&mask.view(), 1);
        assert_eq!(comps.len(), 1);
        let c = &comps[0];
        assert_eq!(c.pixel_count, 40);
        // perimeter pixels of a 10x4 block
        assert_eq!(c.contour.len(), 2 * 10 + 2 * 2);
        assert_eq!(c.contour[0], Point2::new(3.5, 5.5));
        assert_eq!(c.contour[1], Point2::new(4.5, 5.5));
        assert_eq!(c.bbox.min, Point2::new(3.0, 5.0));
        assert_eq!(c.bbox.max, Point2::new(13.0, 9.0));
        assert!(crate::signed_area(&c.contour) > 0.0);
    }

    #[test]
    fn separate_blobs_and_noise_filter() {
        let mask = mask_with(30, 10, |x, y| {
            (x < 5 && y < 5) || ((10..20).contains(&x) && (2..8).contains(&y)) || (x == 28 && y == 8)
        });
        let comps = find_components(&mask.view(), 4);
        assert_eq!(comps.len(), 2);
        assert_eq!(comps[0].pixel_count, 25);
        assert_eq!(comps[1].pixel_count, 60);
        let all = find_components(&mask.view(), 1);
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].contour.len(), 1);
    }

    #[test]
    fn ring_yields_outer_boundary_only() {
        let mask = mask_with(12, 12, |x, y| {
            let inside_outer = (1..11).contains(&x) && (1..11).contains(&y);
            let inside_hole = (4..8).contains(&x) && (4..8).contains(&y);
            inside_outer && !inside_hole
        });
        let comps = find_components(&mask.view(), 1);
        assert_eq!(comps.len(), 1);
        assert_eq!(comps[0].contour.len(), 36);
        let hull = crate::convex_hull(&comps[0].boundary_pixel_corners());
        assert_eq!(crate::polygon_area(&hull), 100.0);
    }
}
