use serde::{Deserialize, Serialize};

/// Parameters of the foreground blob segmenter.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentParams {
    /// Side of the square cells used to estimate the local background color.
    ///
    /// An object must cover less than half of a cell to be segmented
    /// reliably; the default fits a canonical card on an 800×600 canvas.
    pub background_cell: usize,
    /// Minimum color distance to the background for a foreground pixel.
    pub contrast_threshold: u8,
    /// Blobs with fewer pixels are noise.
    pub min_area: usize,
    /// Blobs with more pixels are table artifacts.
    pub max_area: usize,
    /// Upper area bound relative to the canvas, applied together with `max_area`.
    pub max_area_frac: f32,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            background_cell: 200,
            contrast_threshold: 50,
            min_area: 150,
            max_area: 60_000,
            max_area_frac: 0.25,
        }
    }
}

impl SegmentParams {
    /// Effective upper area bound for a canvas of the given size.
    pub fn max_area_for(&self, width: usize, height: usize) -> usize {
        let frac = (self.max_area_frac.max(0.0) as f64 * (width * height) as f64) as usize;
        self.max_area.min(frac)
    }
}
