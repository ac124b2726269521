use serde::{Deserialize, Serialize};

/// How near-equal template scores are resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Prefer the face of the stable card previously seen at this position,
    /// then the lowest template index.
    #[default]
    PreferPrevious,
    /// Always take the lowest template index.
    LowestIndex,
}

/// Rank/suit index area in canonical card pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlyphRoi {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// Card classifier parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CardParams {
    /// Long/short side ratio of a physical card (63×88 mm).
    pub card_aspect: f32,
    /// Accepted deviation from `card_aspect`.
    pub aspect_tolerance: f32,
    /// Short side bounds of a card on the canvas, in pixels.
    pub min_card_width_px: f32,
    pub max_card_width_px: f32,
    /// Canonical upright card size the glyph ROI is expressed in.
    pub card_width: usize,
    pub card_height: usize,
    pub glyph_roi: GlyphRoi,
    /// Minimum gray range inside the ROI; flatter corners are blank.
    pub min_glyph_contrast: u8,
    /// Largest accepted fraction of disagreeing template pixels.
    pub max_distance: f32,
    /// Scores within this distance of the best one count as a tie.
    pub tie_delta: f32,
    pub tie_break: TieBreak,
}

impl Default for CardParams {
    fn default() -> Self {
        Self {
            card_aspect: 1.4,
            aspect_tolerance: 0.15,
            min_card_width_px: 40.0,
            max_card_width_px: 220.0,
            card_width: 100,
            card_height: 140,
            glyph_roi: GlyphRoi {
                x: 4,
                y: 4,
                width: 24,
                height: 48,
            },
            min_glyph_contrast: 40,
            max_distance: 0.25,
            tie_delta: 0.02,
            tie_break: TieBreak::PreferPrevious,
        }
    }
}

impl CardParams {
    /// Template resolution: glyph ROIs are compared one canonical pixel per
    /// template pixel.
    pub fn template_size(&self) -> (usize, usize) {
        (self.glyph_roi.width, self.glyph_roi.height)
    }
}
