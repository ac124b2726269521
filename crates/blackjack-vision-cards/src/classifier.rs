use crate::{CardFace, CardParams, TemplateLibrary, TieBreak};
use blackjack_vision_core::{
    binarize_otsu, homography_from_4pt, warp_perspective_gray, BBox, GrayImage, GrayImageView,
    Homography, Region,
};
use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// An identified card on the canvas.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CardObservation {
    pub face: CardFace,
    pub centroid: Point2<f32>,
    pub bbox: BBox,
    /// Card corners on the canvas, clockwise from the glyph corner.
    pub corners: [Point2<f32>; 4],
    /// `1 - distance` of the chosen template, in `[0, 1]`.
    pub confidence: f32,
}

/// Outcome of classifying one region.
#[derive(Clone, Debug, PartialEq)]
pub enum CardVerdict {
    /// Not card-shaped; no pixels were sampled.
    RejectedShape,
    /// Card-shaped but no template is close enough. `best_distance` is
    /// `None` when nothing was compared (blank corner or empty library).
    Unidentified { best_distance: Option<f32> },
    Identified(CardObservation),
}

/// Template-matching card classifier.
#[derive(Clone, Debug, Default)]
pub struct CardClassifier {
    params: CardParams,
}

impl CardClassifier {
    pub fn new(params: CardParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &CardParams {
        &self.params
    }

    /// Aspect and size test on the oriented rectangle of `region`.
    pub fn is_card_shaped(&self, region: &Region) -> bool {
        let p = &self.params;
        let short = region.rect.short_side();
        (region.rect.aspect() - p.card_aspect).abs() <= p.aspect_tolerance
            && short >= p.min_card_width_px
            && short <= p.max_card_width_px
    }

    /// Identify `region` on the gray canvas, or `None`.
    pub fn classify(
        &self,
        region: &Region,
        gray: &GrayImageView<'_>,
        library: &TemplateLibrary,
        hint: Option<CardFace>,
    ) -> Option<CardObservation> {
        match self.evaluate(region, gray, library, hint) {
            CardVerdict::Identified(obs) => Some(obs),
            _ => None,
        }
    }

    /// Full classification outcome for `region`.
    ///
    /// `hint` is the face of the stable card nearest to this region in the
    /// previous frame; it only matters for near-tied templates.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, region, gray, library), fields(area = region.area))
    )]
    pub fn evaluate(
        &self,
        region: &Region,
        gray: &GrayImageView<'_>,
        library: &TemplateLibrary,
        hint: Option<CardFace>,
    ) -> CardVerdict {
        if !self.is_card_shaped(region) {
            return CardVerdict::RejectedShape;
        }
        let corners = portrait_corners(region.rect.corners());
        let Some(patch) = self.glyph_patch(&corners, gray, library.template_size()) else {
            return CardVerdict::Unidentified { best_distance: None };
        };

        let (lo, hi) = patch
            .data
            .iter()
            .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if hi.saturating_sub(lo) < self.params.min_glyph_contrast {
            debug!("card at {:?}: blank glyph corner", region.centroid);
            return CardVerdict::Unidentified { best_distance: None };
        }
        let (glyph, _) = binarize_otsu(&patch.view(), true);

        let distances: Vec<f32> = library
            .templates()
            .iter()
            .map(|t| mismatch_fraction(&glyph, &t.glyph))
            .collect();
        let Some(best) = distances.iter().copied().min_by(f32::total_cmp) else {
            return CardVerdict::Unidentified { best_distance: None };
        };

        let tied = |i: usize| distances[i] <= best + self.params.tie_delta;
        let from_hint = match self.params.tie_break {
            TieBreak::PreferPrevious => hint.and_then(|face| {
                library
                    .templates()
                    .iter()
                    .position(|t| t.face == face)
                    .filter(|&i| tied(i))
            }),
            TieBreak::LowestIndex => None,
        };
        let Some(chosen) = from_hint.or_else(|| (0..distances.len()).find(|&i| tied(i))) else {
            return CardVerdict::Unidentified {
                best_distance: Some(best),
            };
        };

        let distance = distances[chosen];
        let face = library.templates()[chosen].face;
        if distance > self.params.max_distance {
            debug!(
                "card at {:?}: best {face} at distance {distance:.3} exceeds {:.3}",
                region.centroid, self.params.max_distance
            );
            return CardVerdict::Unidentified {
                best_distance: Some(best),
            };
        }

        debug!(
            "card at {:?}: {face} (distance {distance:.3}, hint {hint:?})",
            region.centroid
        );
        CardVerdict::Identified(CardObservation {
            face,
            centroid: region.centroid,
            bbox: region.bbox,
            corners,
            confidence: (1.0 - distance).clamp(0.0, 1.0),
        })
    }

    /// Resample the glyph ROI of the card with the given canvas corners
    /// directly at template resolution.
    fn glyph_patch(
        &self,
        corners: &[Point2<f32>; 4],
        gray: &GrayImageView<'_>,
        (tw, th): (usize, usize),
    ) -> Option<GrayImage> {
        let p = &self.params;
        let (cw, ch) = (p.card_width as f32, p.card_height as f32);
        let card = [
            Point2::new(0.0, 0.0),
            Point2::new(cw, 0.0),
            Point2::new(cw, ch),
            Point2::new(0.0, ch),
        ];
        let canvas_from_card = homography_from_4pt(&card, corners)?;
        let roi = p.glyph_roi;
        let card_from_template = Homography::from_array([
            [roi.width as f64 / tw as f64, 0.0, roi.x as f64],
            [0.0, roi.height as f64 / th as f64, roi.y as f64],
            [0.0, 0.0, 1.0],
        ]);
        Some(warp_perspective_gray(
            gray,
            canvas_from_card.compose(&card_from_template),
            tw,
            th,
        ))
    }
}

/// Reorder clockwise rectangle corners so the first edge is a short side and
/// the first corner is the one nearest the canvas origin among the two
/// candidates, giving an upright (portrait) card frame.
fn portrait_corners(c: [Point2<f32>; 4]) -> [Point2<f32>; 4] {
    let first_short = (c[1] - c[0]).norm() <= (c[2] - c[1]).norm();
    let (a, b) = if first_short { (0, 2) } else { (1, 3) };
    let start = if c[a].x + c[a].y <= c[b].x + c[b].y { a } else { b };
    [c[start], c[(start + 1) % 4], c[(start + 2) % 4], c[(start + 3) % 4]]
}

/// Fraction of pixels where two same-sized binary images disagree.
fn mismatch_fraction(a: &GrayImage, b: &GrayImage) -> f32 {
    if a.data.is_empty() || a.data.len() != b.data.len() {
        return 1.0;
    }
    let diff = a
        .data
        .iter()
        .zip(&b.data)
        .filter(|(x, y)| (**x > 127) != (**y > 127))
        .count();
    diff as f32 / a.data.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Rank, Suit};
    use approx::assert_relative_eq;
    use blackjack_vision_core::{fill_rect, RgbImage};

    const INK: [u8; 3] = [200, 20, 30];
    const PAPER: [u8; 3] = [250, 250, 250];

    /// 24x48 glyph patterns standing in for printed indices.
    fn pattern(face: CardFace) -> impl Fn(usize, usize) -> bool {
        move |x, y| match (face.rank, face.suit) {
            (Rank::Ten, Suit::Hearts) => (y < 20 && (x < 4 || (10..18).contains(&x))) || (y > 28 && x > 6 && x < 18),
            (Rank::Nine, Suit::Hearts) => (y < 20 && (6..14).contains(&x)) || (y > 28 && x > 6 && x < 18),
            _ => (y > 10 && y < 40) && x > 3 && x < 20,
        }
    }

    fn glyph_image(face: CardFace) -> GrayImage {
        let ink = pattern(face);
        let mut g = GrayImage::new(24, 48);
        for y in 0..48 {
            for x in 0..24 {
                g.data[y * 24 + x] = if ink(x, y) { 40 } else { 250 };
            }
        }
        g
    }

    fn library(faces: &[CardFace]) -> TemplateLibrary {
        TemplateLibrary::from_templates(24, 48, faces.iter().map(|&f| (f, glyph_image(f))))
            .expect("library")
    }

    /// Canvas with upright canonical cards at integer positions.
    fn canvas_with_cards(cards: &[(i32, i32, CardFace)]) -> RgbImage {
        let mut img = RgbImage::filled(600, 400, [30, 100, 50]);
        for &(x0, y0, face) in cards {
            fill_rect(&mut img, x0, y0, 100, 140, PAPER);
            let ink = pattern(face);
            for y in 0..48 {
                for x in 0..24 {
                    if ink(x, y) {
                        img.put(x0 as usize + 4 + x, y0 as usize + 4 + y, INK);
                    }
                }
            }
        }
        img
    }

    fn card_region(x0: f32, y0: f32, w: f32, h: f32) -> Region {
        Region::from_polygon(&[
            Point2::new(x0, y0),
            Point2::new(x0 + w, y0),
            Point2::new(x0 + w, y0 + h),
            Point2::new(x0, y0 + h),
        ])
        .expect("region")
    }

    const TEN_H: CardFace = CardFace {
        rank: Rank::Ten,
        suit: Suit::Hearts,
    };
    const NINE_H: CardFace = CardFace {
        rank: Rank::Nine,
        suit: Suit::Hearts,
    };

    #[test]
    fn identical_cards_match_exactly() {
        let lib = library(&[NINE_H, TEN_H, CardFace::new(Rank::King, Suit::Spades)]);
        let positions = [(20, 30), (200, 60), (420, 220)];
        let cards: Vec<_> = positions.iter().map(|&(x, y)| (x, y, TEN_H)).collect();
        let gray = canvas_with_cards(&cards).view().to_gray();
        let classifier = CardClassifier::default();

        for &(x, y) in &positions {
            let region = card_region(x as f32, y as f32, 100.0, 140.0);
            let obs = classifier
                .classify(&region, &gray.view(), &lib, None)
                .expect("identified");
            assert_eq!(obs.face, TEN_H);
            assert_relative_eq!(obs.confidence, 1.0);
            assert_relative_eq!(obs.corners[0].x, x as f32, epsilon = 1e-3);
            assert_relative_eq!(obs.corners[0].y, y as f32, epsilon = 1e-3);
        }
    }

    #[test]
    fn landscape_card_is_read_through_its_upright_frame() {
        let lib = library(&[NINE_H, TEN_H]);
        let mut img = RgbImage::filled(400, 300, [30, 100, 50]);
        fill_rect(&mut img, 50, 60, 140, 100, PAPER);
        // upright frame of this rectangle starts at the bottom-left corner:
        // card (u, v) sits at canvas (50 + v, 160 - u)
        let ink = pattern(TEN_H);
        for y in 0..48 {
            for x in 0..24 {
                if ink(x, y) {
                    img.put(54 + y, 155 - x, INK);
                }
            }
        }
        let gray = img.view().to_gray();
        let region = card_region(50.0, 60.0, 140.0, 100.0);
        let obs = CardClassifier::default()
            .classify(&region, &gray.view(), &lib, None)
            .expect("identified");
        assert_eq!(obs.face, TEN_H);
        assert_relative_eq!(obs.confidence, 1.0);
    }

    #[test]
    fn wrong_aspect_is_rejected_without_sampling() {
        let lib = library(&[TEN_H]);
        let empty = GrayImageView {
            width: 0,
            height: 0,
            data: &[],
        };
        let classifier = CardClassifier::default();
        let square = card_region(10.0, 10.0, 100.0, 100.0);
        assert_eq!(
            classifier.evaluate(&square, &empty, &lib, None),
            CardVerdict::RejectedShape
        );
        let tiny = card_region(10.0, 10.0, 10.0, 14.0);
        assert_eq!(
            classifier.evaluate(&tiny, &empty, &lib, None),
            CardVerdict::RejectedShape
        );
    }

    #[test]
    fn blank_card_and_unknown_glyph_are_unidentified() {
        let lib = library(&[TEN_H]);
        let mut img = RgbImage::filled(300, 300, [30, 100, 50]);
        fill_rect(&mut img, 20, 20, 100, 140, PAPER);
        let gray = img.view().to_gray();
        let region = card_region(20.0, 20.0, 100.0, 140.0);
        assert_eq!(
            CardClassifier::default().evaluate(&region, &gray.view(), &lib, None),
            CardVerdict::Unidentified { best_distance: None }
        );

        let king = CardFace::new(Rank::King, Suit::Spades);
        let gray = canvas_with_cards(&[(20, 20, king)]).view().to_gray();
        match CardClassifier::default().evaluate(&region, &gray.view(), &lib, None) {
            CardVerdict::Unidentified {
                best_distance: Some(d),
            } => assert!(d > 0.25),
            other => panic!("unexpected verdict {other:?}"),
        }
    }

    #[test]
    fn ties_prefer_previous_face_then_lowest_index() {
        // two faces share one glyph image
        let ten_d = CardFace::new(Rank::Ten, Suit::Diamonds);
        let lib = TemplateLibrary::from_templates(
            24,
            48,
            [(TEN_H, glyph_image(TEN_H)), (ten_d, glyph_image(TEN_H))],
        )
        .expect("library");
        let gray = canvas_with_cards(&[(40, 40, TEN_H)]).view().to_gray();
        let region = card_region(40.0, 40.0, 100.0, 140.0);

        let classifier = CardClassifier::default();
        let plain = classifier.classify(&region, &gray.view(), &lib, None).expect("card");
        assert_eq!(plain.face, ten_d);
        let hinted = classifier
            .classify(&region, &gray.view(), &lib, Some(TEN_H))
            .expect("card");
        assert_eq!(hinted.face, TEN_H);

        let strict = CardClassifier::new(CardParams {
            tie_break: TieBreak::LowestIndex,
            ..CardParams::default()
        });
        let ignored = strict
            .classify(&region, &gray.view(), &lib, Some(TEN_H))
            .expect("card");
        assert_eq!(ignored.face, ten_d);
    }

    #[test]
    fn portrait_ordering_starts_on_short_edge() {
        let landscape = [
            Point2::new(0.0, 0.0),
            Point2::new(140.0, 0.0),
            Point2::new(140.0, 100.0),
            Point2::new(0.0, 100.0),
        ];
        let p = portrait_corners(landscape);
        assert_eq!(p[0], Point2::new(0.0, 100.0));
        assert_eq!(p[1], Point2::new(0.0, 0.0));

        let portrait = [
            Point2::new(10.0, 10.0),
            Point2::new(110.0, 10.0),
            Point2::new(110.0, 150.0),
            Point2::new(10.0, 150.0),
        ];
        assert_eq!(portrait_corners(portrait), portrait);
    }
}
