//! Foreground blob segmentation for a rectified table canvas.
//!
//! 1. Estimate the local background color on a coarse grid of cell medians.
//! 2. Mark pixels whose color is far from that background.
//! 3. Label 8-connected components and trace their outer boundaries.
//! 4. Keep components within the area bounds, largest first.

mod params;
mod segmenter;

pub use params::SegmentParams;
pub use segmenter::{RegionSegmenter, Regions, Segmentation};
