use serde::{Deserialize, Serialize};

/// One entry of the denomination color table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Denomination {
    pub name: String,
    pub value: u32,
    /// Reference chip color as seen on the rectified canvas.
    pub color: [u8; 3],
}

impl Denomination {
    pub fn new(name: &str, value: u32, color: [u8; 3]) -> Self {
        Self {
            name: name.to_string(),
            value,
            color,
        }
    }
}

/// Chip classifier parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChipParams {
    /// Minimum `4π·area/perimeter²` of a single chip.
    pub min_circularity: f32,
    /// Minimum area over convex-outline area of a single chip.
    pub min_solidity: f32,
    /// Chip diameter range on the canvas, in pixels.
    pub min_diameter_px: f32,
    pub max_diameter_px: f32,
    /// Canvas height of one chip in a stack; a single chip seen from above
    /// spans one full unit.
    pub chip_thickness_px: f32,
    /// Maximum height/width of a stack blob.
    pub max_stack_aspect: f32,
    /// Minimum area over oriented-rectangle area of a stack blob.
    pub min_stack_fill: f32,
    /// Largest distance of the height ratio to an integer that still counts
    /// as exact.
    pub residue_tolerance: f32,
    /// Confidence of a stack whose height is between two counts.
    pub ambiguous_confidence: f32,
    /// Confidence of a chip whose color matches no denomination.
    pub unmatched_confidence: f32,
    /// Color is averaged inside an ellipse of this fraction of the box.
    pub color_sample_frac: f32,
    /// Largest RGB distance to a denomination color.
    pub max_color_distance: f32,
    pub denominations: Vec<Denomination>,
}

impl Default for ChipParams {
    fn default() -> Self {
        Self {
            min_circularity: 0.85,
            min_solidity: 0.9,
            min_diameter_px: 30.0,
            max_diameter_px: 56.0,
            chip_thickness_px: 40.0,
            max_stack_aspect: 6.0,
            min_stack_fill: 0.8,
            residue_tolerance: 0.25,
            ambiguous_confidence: 0.1,
            unmatched_confidence: 0.2,
            color_sample_frac: 0.6,
            max_color_distance: 80.0,
            denominations: vec![
                Denomination::new("white", 1, [235, 235, 230]),
                Denomination::new("red", 5, [190, 30, 35]),
                Denomination::new("blue", 10, [35, 60, 170]),
                Denomination::new("green", 25, [60, 170, 80]),
                Denomination::new("black", 100, [25, 25, 25]),
                Denomination::new("purple", 500, [110, 40, 130]),
            ],
        }
    }
}
