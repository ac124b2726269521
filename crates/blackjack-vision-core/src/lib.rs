//! Core types and utilities for blackjack table perception.
//!
//! Owned and borrowed frame buffers, projective geometry, contour tracing
//! and the [`Region`] blob model shared by the segmenter and both
//! classifiers. Nothing in here knows about cards or chips.

mod contour;
mod draw;
mod geometry;
mod homography;
mod image;
mod logger;
mod region;
mod threshold;

pub use contour::{find_components, Component};
pub use draw::{
    draw_line, draw_polygon_outline, draw_rect_outline, fill_ellipse, fill_polygon, fill_rect,
};
pub use geometry::{
    approx_polygon_closed, centroid, closed_perimeter, convex_hull, fit_line, intersect_lines,
    is_convex, min_area_rect, point_in_polygon, polygon_area, signed_area, triangle_area, BBox, RotatedRect,
};
pub use homography::{homography_from_4pt, warp_perspective_gray, warp_perspective_rgb, Homography};
pub use image::{
    luma, sample_bilinear, sample_bilinear_rgb, sample_bilinear_u8, GrayImage, GrayImageView,
    RgbImage, RgbImageView,
};
pub use region::Region;
pub use threshold::{
    background_distance_map, binarize_otsu, otsu_threshold, threshold_at_least,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
