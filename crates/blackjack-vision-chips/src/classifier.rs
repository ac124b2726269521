use crate::{ChipParams, Denomination};
use blackjack_vision_core::{BBox, Region, RgbImageView};
use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Shape class of an accepted chip blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChipShape {
    /// A single chip seen face-on.
    Disc,
    /// An upright pile, one chip wide.
    Stack,
}

/// One chip stack on the canvas.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChipObservation {
    pub centroid: Point2<f32>,
    pub bbox: BBox,
    pub count: u32,
    /// Name of the matched denomination, `None` for an unknown color.
    pub denomination: Option<String>,
    pub value_per_chip: u32,
    pub total_value: u32,
    pub confidence: f32,
    /// Height was not close to a whole number of chips.
    pub ambiguous: bool,
    pub mean_color: [u8; 3],
}

#[derive(Clone, Debug, Default)]
pub struct ChipClassifier {
    params: ChipParams,
}

impl ChipClassifier {
    pub fn new(params: ChipParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &ChipParams {
        &self.params
    }

    /// Shape pre-filter shared with the orchestrator's routing.
    pub fn chip_shape(&self, region: &Region) -> Option<ChipShape> {
        let p = &self.params;
        let width = region.bbox.width();
        let height = region.bbox.height();
        if width < p.min_diameter_px || width > p.max_diameter_px {
            return None;
        }
        if region.solidity() < p.min_solidity {
            return None;
        }
        if region.circularity() >= p.min_circularity {
            return Some(ChipShape::Disc);
        }
        let aspect = height / width;
        if aspect > 1.0 && aspect <= p.max_stack_aspect && region.fill_ratio() >= p.min_stack_fill {
            return Some(ChipShape::Stack);
        }
        None
    }

    /// Count and value one region, or `None` when it is not a chip stack.
    ///
    /// A disc is a single chip seen face-on, whatever its diameter. A stack
    /// whose height falls between two counts is still reported, rounded down
    /// and flagged `ambiguous` with low confidence.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, region, frame), fields(area = region.area))
    )]
    pub fn classify(&self, region: &Region, frame: &RgbImageView<'_>) -> Option<ChipObservation> {
        let p = &self.params;
        let shape = self.chip_shape(region)?;

        let (count, ambiguous) = match shape {
            ChipShape::Disc => (1, false),
            ChipShape::Stack => stack_count(region.bbox.height(), p)?,
        };
        let mean_color = mean_color_in_ellipse(frame, &region.bbox, p.color_sample_frac)?;
        let matched = nearest_denomination(mean_color, &p.denominations)
            .filter(|(_, dist)| *dist <= p.max_color_distance);

        let (denomination, value_per_chip, color_confidence) = match matched {
            Some((d, dist)) => (
                Some(d.name.clone()),
                d.value,
                1.0 - 0.5 * dist / p.max_color_distance.max(f32::EPSILON),
            ),
            None => (None, 0, p.unmatched_confidence),
        };
        let confidence = if ambiguous {
            p.ambiguous_confidence
        } else {
            color_confidence
        };

        debug!(
            "chip {:?} at ({:.0}, {:.0}): count {count}{} color {:?} -> {}",
            shape,
            region.centroid.x,
            region.centroid.y,
            if ambiguous { "?" } else { "" },
            mean_color,
            denomination.as_deref().unwrap_or("unmatched"),
        );

        Some(ChipObservation {
            centroid: region.centroid,
            bbox: region.bbox,
            count,
            denomination,
            value_per_chip,
            total_value: count * value_per_chip,
            confidence,
            ambiguous,
            mean_color,
        })
    }
}

/// Chip count for a blob height, and whether the height was ambiguous.
fn stack_count(height: f32, p: &ChipParams) -> Option<(u32, bool)> {
    if p.chip_thickness_px <= 0.0 {
        return None;
    }
    let count_f = height / p.chip_thickness_px;
    if count_f < 0.5 {
        return None;
    }
    let nearest = count_f.round();
    if (count_f - nearest).abs() <= p.residue_tolerance {
        return Some((nearest as u32, false));
    }
    // never round an uncertain stack up
    let floor = count_f.floor() as u32;
    (floor > 0).then_some((floor, true))
}

/// Mean color of the pixels whose centers fall inside the ellipse
/// inscribed in `bbox`, scaled by `frac`.
fn mean_color_in_ellipse(frame: &RgbImageView<'_>, bbox: &BBox, frac: f32) -> Option<[u8; 3]> {
    let c = bbox.center();
    let rx = 0.5 * bbox.width() * frac;
    let ry = 0.5 * bbox.height() * frac;
    if rx <= 0.0 || ry <= 0.0 {
        return None;
    }
    let x0 = (c.x - rx).floor().max(0.0) as usize;
    let y0 = (c.y - ry).floor().max(0.0) as usize;
    let x1 = ((c.x + rx).ceil().max(0.0) as usize).min(frame.width);
    let y1 = ((c.y + ry).ceil().max(0.0) as usize).min(frame.height);

    let mut sum = [0u64; 3];
    let mut n = 0u64;
    for y in y0..y1 {
        let dy = (y as f32 + 0.5 - c.y) / ry;
        for x in x0..x1 {
            let dx = (x as f32 + 0.5 - c.x) / rx;
            if dx * dx + dy * dy > 1.0 {
                continue;
            }
            let px = frame.get(x, y);
            for (s, v) in sum.iter_mut().zip(px) {
                *s += v as u64;
            }
            n += 1;
        }
    }
    if n == 0 {
        return None;
    }
    Some(sum.map(|s| ((s + n / 2) / n) as u8))
}

fn nearest_denomination(color: [u8; 3], table: &[Denomination]) -> Option<(&Denomination, f32)> {
    table
        .iter()
        .map(|d| (d, color_distance(color, d.color)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

fn color_distance(a: [u8; 3], b: [u8; 3]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(&x, y)| {
            let d = x as f32 - y as f32;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}
