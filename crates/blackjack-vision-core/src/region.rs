use crate::{
    centroid, closed_perimeter, convex_hull, min_area_rect, polygon_area, BBox, Component,
    RotatedRect,
};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// A candidate blob in canvas coordinates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Region {
    /// Boundary polygon, clockwise.
    pub contour: Vec<Point2<f32>>,
    /// Convex outline of the blob (pixel-corner hull for traced regions).
    pub outline: Vec<Point2<f32>>,
    pub bbox: BBox,
    /// Minimum-area oriented rectangle around `outline`.
    pub rect: RotatedRect,
    /// Area in square canvas pixels (pixel count for traced regions).
    pub area: f32,
    pub perimeter: f32,
    pub centroid: Point2<f32>,
}

impl Region {
    /// Build a region from a traced component.
    ///
    /// Perimeter is taken on the pixel-corner outline, not on the chain of
    /// boundary pixel centers.
    pub fn from_component(component: Component) -> Option<Self> {
        let outline = convex_hull(&component.boundary_pixel_corners());
        let rect = min_area_rect(&outline)?;
        Some(Self {
            perimeter: closed_perimeter(&outline),
            area: component.pixel_count as f32,
            centroid: component.centroid,
            bbox: component.bbox,
            contour: component.contour,
            outline,
            rect,
        })
    }

    /// Build a region directly from a polygon outline.
    pub fn from_polygon(poly: &[Point2<f32>]) -> Option<Self> {
        if poly.len() < 3 {
            return None;
        }
        let outline = convex_hull(poly);
        Some(Self {
            contour: poly.to_vec(),
            bbox: BBox::from_points(poly)?,
            rect: min_area_rect(&outline)?,
            area: polygon_area(poly),
            perimeter: closed_perimeter(poly),
            centroid: centroid(poly)?,
            outline,
        })
    }

    /// `4π·area / perimeter²`; 1 for a disc.
    pub fn circularity(&self) -> f32 {
        if self.perimeter <= f32::EPSILON {
            return 0.0;
        }
        4.0 * PI * self.area / (self.perimeter * self.perimeter)
    }

    /// Area relative to the oriented bounding rectangle.
    pub fn fill_ratio(&self) -> f32 {
        let r = self.rect.area();
        if r <= f32::EPSILON {
            return 0.0;
        }
        self.area / r
    }

    /// Area relative to the convex outline; 1 for convex blobs.
    pub fn solidity(&self) -> f32 {
        let hull = polygon_area(&self.outline);
        if hull <= f32::EPSILON {
            return 0.0;
        }
        self.area / hull
    }

    /// True when the region lies inside `[0, width] × [0, height]`.
    pub fn within(&self, width: usize, height: usize) -> bool {
        self.bbox.min.x >= 0.0
            && self.bbox.min.y >= 0.0
            && self.bbox.max.x <= width as f32
            && self.bbox.max.y <= height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{find_components, GrayImage};
    use approx::assert_relative_eq;

    fn disc_mask(size: usize, r: f32) -> GrayImage {
        let mut m = GrayImage::new(size, size);
        let c = size as f32 / 2.0;
        for y in 0..size {
            for x in 0..size {
                let (dx, dy) = (x as f32 + 0.5 - c, y as f32 + 0.5 - c);
                if dx * dx + dy * dy <= r * r {
                    m.data[y * size + x] = 255;
                }
            }
        }
        m
    }

    #[test]
    fn disc_is_circular_and_block_is_not() {
        let disc = disc_mask(60, 20.0);
        let comp = find_components(&disc.view(), 1).remove(0);
        let region = Region::from_component(comp).expect("region");
        assert!(region.circularity() > 0.9, "{}", region.circularity());
        assert!(region.solidity() > 0.9);
        assert_relative_eq!(region.rect.long_side(), 40.0, epsilon = 1.5);

        let mut block = GrayImage::new(60, 60);
        for y in 5..45 {
            for x in 10..38 {
                block.data[y * 60 + x] = 255;
            }
        }
        let comp = find_components(&block.view(), 1).remove(0);
        let region = Region::from_component(comp).expect("region");
        assert_relative_eq!(region.perimeter, 136.0, epsilon = 1e-3);
        assert!(region.circularity() < 0.8);
        assert_relative_eq!(region.rect.long_side(), 40.0, epsilon = 1e-3);
        assert_relative_eq!(region.rect.short_side(), 28.0, epsilon = 1e-3);
        assert_relative_eq!(region.fill_ratio(), 1.0, epsilon = 1e-3);
        assert_eq!(region.bbox.min, Point2::new(10.0, 5.0));
        assert!(region.within(60, 60));
    }

    #[test]
    fn polygon_region_measures_exactly() {
        let poly = [
            Point2::new(0.0, 0.0),
            Point2::new(4.0, 0.0),
            Point2::new(4.0, 3.0),
            Point2::new(0.0, 3.0),
        ];
        let r = Region::from_polygon(&poly).expect("region");
        assert_relative_eq!(r.area, 12.0);
        assert_relative_eq!(r.perimeter, 14.0);
        assert_relative_eq!(r.centroid.x, 2.0);
        assert!(Region::from_polygon(&poly[..2]).is_none());
    }
}
