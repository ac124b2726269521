use serde::{Deserialize, Serialize};

/// Parameters of table calibration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceParams {
    /// Rectified canvas width in pixels.
    pub canvas_width: usize,
    /// Rectified canvas height in pixels.
    pub canvas_height: usize,
    /// Douglas–Peucker tolerance relative to the outline perimeter.
    pub approx_epsilon_frac: f32,
    /// Minimum quad area relative to the frame.
    pub min_area_frac: f32,
    /// Maximum quad area relative to the frame; rejects the frame border blob.
    pub max_area_frac: f32,
    /// Every triangle spanned by three corners must cover at least this
    /// fraction of the quad area (no three corners nearly collinear).
    pub min_corner_triangle_frac: f32,
    /// Minimum distance between any two corners, in camera pixels.
    pub min_corner_separation_px: f32,
    /// Number of successful frames averaged into one calibration.
    pub consensus_frames: usize,
    /// Quads with a corner farther than this from the per-corner median are
    /// left out of the average, in camera pixels.
    pub max_consensus_deviation_px: f32,
}

impl Default for SurfaceParams {
    fn default() -> Self {
        Self {
            canvas_width: 800,
            canvas_height: 600,
            approx_epsilon_frac: 0.02,
            min_area_frac: 0.2,
            max_area_frac: 0.95,
            min_corner_triangle_frac: 0.15,
            min_corner_separation_px: 20.0,
            consensus_frames: 5,
            max_consensus_deviation_px: 8.0,
        }
    }
}
