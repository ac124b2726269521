//! Raster drawing on [`RgbImage`]: filled shapes for synthetic scenes and
//! outlines for debug overlays. Everything is clipped to the image.

use crate::{point_in_polygon, BBox, RgbImage};
use nalgebra::Point2;

/// Fill the pixels whose centers lie in `[x0, x0+w) × [y0, y0+h)`.
pub fn fill_rect(img: &mut RgbImage, x0: i32, y0: i32, w: u32, h: u32, color: [u8; 3]) {
    let xs = x0.max(0)..(x0 + w as i32).min(img.width as i32);
    let ys = y0.max(0)..(y0 + h as i32).min(img.height as i32);
    for y in ys {
        for x in xs.clone() {
            img.put(x as usize, y as usize, color);
        }
    }
}

/// Fill every pixel whose center falls inside `poly`.
pub fn fill_polygon(img: &mut RgbImage, poly: &[Point2<f32>], color: [u8; 3]) {
    let Some(bb) = BBox::from_points(poly) else {
        return;
    };
    let (x0, x1) = clip_span(bb.min.x, bb.max.x, img.width);
    let (y0, y1) = clip_span(bb.min.y, bb.max.y, img.height);
    for y in y0..y1 {
        for x in x0..x1 {
            let c = Point2::new(x as f32 + 0.5, y as f32 + 0.5);
            if point_in_polygon(c, poly) {
                img.put(x, y, color);
            }
        }
    }
}

/// Fill an axis-aligned ellipse.
pub fn fill_ellipse(img: &mut RgbImage, center: Point2<f32>, rx: f32, ry: f32, color: [u8; 3]) {
    if rx <= 0.0 || ry <= 0.0 {
        return;
    }
    let (x0, x1) = clip_span(center.x - rx, center.x + rx, img.width);
    let (y0, y1) = clip_span(center.y - ry, center.y + ry, img.height);
    for y in y0..y1 {
        let dy = (y as f32 + 0.5 - center.y) / ry;
        for x in x0..x1 {
            let dx = (x as f32 + 0.5 - center.x) / rx;
            if dx * dx + dy * dy <= 1.0 {
                img.put(x, y, color);
            }
        }
    }
}

/// One-pixel line between two points (DDA).
pub fn draw_line(img: &mut RgbImage, a: Point2<f32>, b: Point2<f32>, color: [u8; 3]) {
    let d = b - a;
    let steps = d.x.abs().max(d.y.abs()).ceil().max(1.0) as usize;
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        let p = a + d * t;
        let (x, y) = (p.x.floor(), p.y.floor());
        if x >= 0.0 && y >= 0.0 && (x as usize) < img.width && (y as usize) < img.height {
            img.put(x as usize, y as usize, color);
        }
    }
}

/// Closed polyline through `poly`.
pub fn draw_polygon_outline(img: &mut RgbImage, poly: &[Point2<f32>], color: [u8; 3]) {
    for (i, &a) in poly.iter().enumerate() {
        let b = poly[(i + 1) % poly.len()];
        draw_line(img, a, b, color);
    }
}

pub fn draw_rect_outline(img: &mut RgbImage, bbox: &BBox, color: [u8; 3]) {
    let corners = [
        bbox.min,
        Point2::new(bbox.max.x - 1.0, bbox.min.y),
        Point2::new(bbox.max.x - 1.0, bbox.max.y - 1.0),
        Point2::new(bbox.min.x, bbox.max.y - 1.0),
    ];
    draw_polygon_outline(img, &corners, color);
}

fn clip_span(lo: f32, hi: f32, len: usize) -> (usize, usize) {
    let a = lo.floor().max(0.0) as usize;
    let b = (hi.ceil().max(0.0) as usize).min(len);
    (a.min(b), b)
}
