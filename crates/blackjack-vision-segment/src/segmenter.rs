use crate::SegmentParams;
use blackjack_vision_core::{
    background_distance_map, find_components, threshold_at_least, Component, Region, RgbImageView,
};
use log::debug;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Splits a rectified frame into candidate blobs.
///
/// Purely geometric: nothing here depends on what a card or a chip looks like.
#[derive(Clone, Debug, Default)]
pub struct RegionSegmenter {
    params: SegmentParams,
}

impl RegionSegmenter {
    pub fn new(params: SegmentParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &SegmentParams {
        &self.params
    }

    /// Segment one rectified frame.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, frame), fields(width = frame.width, height = frame.height))
    )]
    pub fn segment(&self, frame: &RgbImageView<'_>) -> Segmentation {
        let p = &self.params;
        let distance = background_distance_map(frame, p.background_cell);
        let mask = threshold_at_least(&distance.view(), p.contrast_threshold.max(1));

        let max_area = p.max_area_for(frame.width, frame.height);
        let mut components: Vec<Component> = find_components(&mask.view(), p.min_area)
            .into_iter()
            .filter(|c| c.pixel_count <= max_area)
            .collect();
        components.sort_by(|a, b| b.pixel_count.cmp(&a.pixel_count));

        debug!(
            "segmented {}x{} frame into {} blobs (area {}..={})",
            frame.width,
            frame.height,
            components.len(),
            p.min_area,
            max_area
        );

        Segmentation {
            width: frame.width,
            height: frame.height,
            components,
        }
    }
}

/// Blobs of one frame, largest first.
///
/// Boundaries are traced eagerly; the derived [`Region`] geometry (outline,
/// oriented rectangle) is computed on iteration, and every call to
/// [`Segmentation::iter`] starts over.
#[derive(Clone, Debug)]
pub struct Segmentation {
    width: usize,
    height: usize,
    components: Vec<Component>,
}

impl Segmentation {
    pub fn iter(&self) -> Regions<'_> {
        Regions {
            inner: self.components.iter(),
        }
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Canvas size the regions live in.
    pub fn canvas_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

impl<'a> IntoIterator for &'a Segmentation {
    type Item = Region;
    type IntoIter = Regions<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the regions of a [`Segmentation`].
#[derive(Clone, Debug)]
pub struct Regions<'a> {
    inner: std::slice::Iter<'a, Component>,
}

impl Iterator for Regions<'_> {
    type Item = Region;

    fn next(&mut self) -> Option<Region> {
        self.inner
            .by_ref()
            .find_map(|c| Region::from_component(c.clone()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.inner.size_hint().1)
    }
}
