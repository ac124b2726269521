//! Frame loop: rectify, segment, classify, stabilise.

use crate::{StableState, Stabilizer, TrackerConfig};
use blackjack_vision_cards::{
    CardClassifier, CardObservation, TemplateLibrary, TemplateLibraryError,
};
use blackjack_vision_chips::{ChipClassifier, ChipObservation, ChipShape};
use blackjack_vision_core::{GrayImageView, Region, RgbImage, RgbImageView};
use blackjack_vision_segment::RegionSegmenter;
use blackjack_vision_surface::{CalibrationError, SurfaceEstimator, TableHomography};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::sync::Arc;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// What the pipeline does with each frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Detect cards and chips.
    #[default]
    Detection,
    /// Hand the rectified frame to gesture recognition; the stable state is
    /// frozen meanwhile.
    Gesture,
}

impl Mode {
    pub fn toggled(self) -> Self {
        match self {
            Mode::Detection => Mode::Gesture,
            Mode::Gesture => Mode::Detection,
        }
    }
}

/// Reply of the frame sink in [`TableTracker::run`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Continue,
    /// Re-run calibration on the next frames of the source.
    Recalibrate,
    ToggleMode,
    Stop,
}

/// Supplier of camera frames.
pub trait FrameSource {
    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Option<RgbImage>;
}

impl<I> FrameSource for I
where
    I: Iterator<Item = RgbImage>,
{
    fn next_frame(&mut self) -> Option<RgbImage> {
        self.next()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TrackError {
    #[error("no table calibration available")]
    NotCalibrated,
    #[error("tracker has been stopped")]
    Stopped,
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Templates(#[from] TemplateLibraryError),
}

/// Result of one processed frame.
#[derive(Clone, Debug)]
pub struct FrameOutput {
    /// Zero-based count of processed frames.
    pub index: u64,
    pub mode: Mode,
    pub rectified: RgbImage,
    pub state: StableState,
    /// Outcome of the recalibration the sink requested after the previous
    /// frame, if any. A failure left the previous mapping in place.
    pub recalibrated: Option<Result<(), CalibrationError>>,
}

enum Detection {
    Card(CardObservation),
    Chip(ChipObservation),
}

/// The detection orchestrator.
///
/// Owns the table mapping, the classifiers and the stabiliser; every frame
/// goes through [`TableTracker::process`] in order.
pub struct TableTracker {
    surface: SurfaceEstimator,
    segmenter: RegionSegmenter,
    cards: CardClassifier,
    chips: ChipClassifier,
    library: Arc<TemplateLibrary>,
    stabilizer: Stabilizer,
    table: Option<TableHomography>,
    mode: Mode,
    running: bool,
    frames: u64,
    calibration_attempts: usize,
    recalibration_attempts: usize,
}

impl TableTracker {
    pub fn new(config: &TrackerConfig, library: Arc<TemplateLibrary>) -> Self {
        Self {
            surface: SurfaceEstimator::new(config.surface.clone()),
            segmenter: RegionSegmenter::new(config.segment.clone()),
            cards: CardClassifier::new(config.cards.clone()),
            chips: ChipClassifier::new(config.chips.clone()),
            library,
            stabilizer: Stabilizer::new(config.stabilizer.clone()),
            table: None,
            mode: Mode::Detection,
            running: true,
            frames: 0,
            calibration_attempts: config.calibration_attempts,
            recalibration_attempts: config.recalibration_attempts,
        }
    }

    /// Build a tracker, loading templates from `config.template_dir`.
    ///
    /// Without a template directory no card can be identified, but chips
    /// are still counted.
    pub fn from_config(config: &TrackerConfig) -> Result<Self, TrackError> {
        let (w, h) = config.cards.template_size();
        let library = match &config.template_dir {
            Some(dir) => TemplateLibrary::load_dir(dir, w, h)?,
            None => {
                warn!("no template directory configured; cards will not be identified");
                TemplateLibrary::from_templates(w, h, [])?
            }
        };
        Ok(Self::new(config, Arc::new(library)))
    }

    pub fn homography(&self) -> Option<&TableHomography> {
        self.table.as_ref()
    }

    /// Install a known table mapping, as a successful calibration would.
    pub fn set_homography(&mut self, table: TableHomography) {
        self.table = Some(table);
        self.stabilizer.reset();
    }

    pub fn library(&self) -> &Arc<TemplateLibrary> {
        &self.library
    }

    pub fn state(&self) -> &StableState {
        self.stabilizer.state()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        if mode != self.mode {
            info!("mode {:?} -> {:?}", self.mode, mode);
        }
        self.mode = mode;
    }

    pub fn toggle_mode(&mut self) -> Mode {
        self.set_mode(self.mode.toggled());
        self.mode
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Calibrate on up to `max_attempts` frames.
    ///
    /// Success replaces the table mapping and clears the stabiliser, since
    /// canvas positions are no longer comparable. On failure the previous
    /// mapping, if any, stays in use.
    pub fn calibrate<I>(&mut self, frames: I, max_attempts: usize) -> Result<&TableHomography, TrackError>
    where
        I: IntoIterator,
        I::Item: Borrow<RgbImage>,
    {
        if !self.running {
            return Err(TrackError::Stopped);
        }
        match self.surface.calibrate(frames, max_attempts) {
            Ok(table) => {
                self.stabilizer.reset();
                Ok(self.table.insert(table))
            }
            Err(err) => {
                if self.table.is_some() {
                    warn!("recalibration failed ({err}); keeping the previous table mapping");
                }
                Err(err.into())
            }
        }
    }

    /// Run one camera frame through the pipeline.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, frame), fields(frame = self.frames, mode = ?self.mode))
    )]
    pub fn process(&mut self, frame: &RgbImageView<'_>) -> Result<FrameOutput, TrackError> {
        if !self.running {
            return Err(TrackError::Stopped);
        }
        let table = self.table.as_ref().ok_or(TrackError::NotCalibrated)?;
        let rectified = table.rectify(frame);
        let index = self.frames;
        self.frames += 1;

        let state = match self.mode {
            Mode::Gesture => self.stabilizer.state().clone(),
            Mode::Detection => {
                let (cards, chips) = self.detect(&rectified);
                debug!(
                    "frame {index}: {} card(s), {} chip stack(s) observed",
                    cards.len(),
                    chips.len()
                );
                self.stabilizer.update(cards, chips).clone()
            }
        };

        Ok(FrameOutput {
            index,
            mode: self.mode,
            rectified,
            state,
            recalibrated: None,
        })
    }

    /// Per-frame observations on a rectified canvas, before stabilisation.
    pub fn detect(&self, rectified: &RgbImage) -> (Vec<CardObservation>, Vec<ChipObservation>) {
        let view = rectified.view();
        let gray = view.to_gray();
        let gray = gray.view();
        let segmentation = self.segmenter.segment(&view);
        let regions: Vec<Region> = segmentation.iter().collect();

        #[cfg(feature = "rayon")]
        let detections: Vec<Detection> = regions
            .par_iter()
            .filter_map(|r| self.classify_region(r, &view, &gray))
            .collect();
        #[cfg(not(feature = "rayon"))]
        let detections: Vec<Detection> = regions
            .iter()
            .filter_map(|r| self.classify_region(r, &view, &gray))
            .collect();

        let mut cards = Vec::new();
        let mut chips = Vec::new();
        for d in detections {
            match d {
                Detection::Card(c) => cards.push(c),
                Detection::Chip(c) => chips.push(c),
            }
        }
        (cards, chips)
    }

    /// Route a region by shape: discs are chips, card-shaped regions are
    /// tried as cards first, then as chip stacks.
    fn classify_region(
        &self,
        region: &Region,
        rgb: &RgbImageView<'_>,
        gray: &GrayImageView<'_>,
    ) -> Option<Detection> {
        let chip_shape = self.chips.chip_shape(region);
        if chip_shape == Some(ChipShape::Disc) {
            return self.chips.classify(region, rgb).map(Detection::Chip);
        }
        if self.cards.is_card_shaped(region) {
            let hint = self.stabilizer.card_hint(region.centroid);
            if let Some(card) = self.cards.classify(region, gray, &self.library, hint) {
                return Some(Detection::Card(card));
            }
        }
        if chip_shape.is_none() {
            return None;
        }
        self.chips.classify(region, rgb).map(Detection::Chip)
    }

    /// Drive the pipeline from `source` until it runs dry or the sink stops it.
    ///
    /// Calibrates on the first frames when no mapping exists yet; that
    /// calibration failing is the only error. A [`Control::Recalibrate`]
    /// reply consumes up to `recalibration_attempts` frames of the source and
    /// its outcome is reported in the next [`FrameOutput::recalibrated`].
    /// Returns the number of frames handed to the sink.
    pub fn run<S, F>(&mut self, source: &mut S, mut sink: F) -> Result<usize, TrackError>
    where
        S: FrameSource + ?Sized,
        F: FnMut(&FrameOutput) -> Control,
    {
        if self.table.is_none() {
            let attempts = self.calibration_attempts;
            self.calibrate(std::iter::from_fn(|| source.next_frame()), attempts)?;
        }

        let mut emitted = 0usize;
        let mut recalibrated = None;
        while self.running {
            let Some(frame) = source.next_frame() else {
                break;
            };
            let mut output = self.process(&frame.view())?;
            output.recalibrated = recalibrated.take();
            emitted += 1;
            match sink(&output) {
                Control::Continue => {}
                Control::ToggleMode => {
                    self.toggle_mode();
                }
                Control::Recalibrate => {
                    let attempts = self.recalibration_attempts;
                    recalibrated = Some(
                        match self.calibrate(std::iter::from_fn(|| source.next_frame()), attempts) {
                            Ok(_) => Ok(()),
                            Err(TrackError::Calibration(err)) => Err(err),
                            Err(err) => return Err(err),
                        },
                    );
                }
                Control::Stop => self.stop(),
            }
        }
        info!("stopped after {emitted} frame(s)");
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blackjack_vision_core::{fill_polygon, fill_rect};
    use nalgebra::Point2;

    fn table_frame() -> RgbImage {
        let mut img = RgbImage::filled(640, 480, [45, 35, 25]);
        let corners = [(80.0, 60.0), (560.0, 60.0), (560.0, 420.0), (80.0, 420.0)]
            .map(|(x, y)| Point2::new(x, y));
        fill_polygon(&mut img, &corners, [25, 110, 55]);
        img
    }

    fn tracker() -> TableTracker {
        TableTracker::from_config(&TrackerConfig::default()).expect("tracker")
    }

    #[test]
    fn processing_requires_calibration() {
        let mut t = tracker();
        let frame = table_frame();
        assert!(matches!(
            t.process(&frame.view()),
            Err(TrackError::NotCalibrated)
        ));
        t.stop();
        assert!(!t.is_running());
        assert!(matches!(t.process(&frame.view()), Err(TrackError::Stopped)));
        assert!(matches!(t.calibrate([&frame], 1), Err(TrackError::Stopped)));
    }

    #[test]
    fn failed_recalibration_keeps_previous_mapping() {
        let mut t = tracker();
        let frame = table_frame();
        let before = *t.calibrate([&frame], 1).expect("calibrated");
        let blank = RgbImage::filled(640, 480, [0, 0, 0]);
        let err = t.calibrate([&blank, &blank], 2).unwrap_err();
        assert!(matches!(
            err,
            TrackError::Calibration(CalibrationError::NoQuadrilateral { attempts: 2 })
        ));
        assert_eq!(t.homography(), Some(&before));
        assert!(t.process(&frame.view()).is_ok());
    }

    #[test]
    fn gesture_mode_freezes_state() {
        let mut t = tracker();
        let frame = table_frame();
        t.calibrate([&frame], 1).expect("calibrated");
        let out = t.process(&frame.view()).expect("frame");
        assert_eq!((out.index, out.mode), (0, Mode::Detection));
        assert_eq!(t.toggle_mode(), Mode::Gesture);
        let out = t.process(&frame.view()).expect("frame");
        assert_eq!((out.index, out.mode), (1, Mode::Gesture));
        assert_eq!((out.rectified.width, out.rectified.height), (800, 600));
        assert!(out.state.is_empty());
    }

    #[test]
    fn run_calibrates_first_and_obeys_the_sink() {
        let mut t = tracker();
        let mut frames = std::iter::repeat_with(table_frame).take(20);
        let mut replies = vec![Control::ToggleMode, Control::Continue, Control::Stop].into_iter();
        let mut modes = Vec::new();
        let n = t
            .run(&mut frames, |out| {
                modes.push(out.mode);
                replies.next().unwrap_or(Control::Continue)
            })
            .expect("run");
        assert_eq!(n, 3);
        assert_eq!(modes, vec![Mode::Detection, Mode::Gesture, Mode::Gesture]);
        assert!(!t.is_running());
    }

    #[test]
    fn run_without_a_table_reports_calibration_failure() {
        let mut t = tracker();
        let mut frames = std::iter::repeat_with(|| RgbImage::filled(320, 240, [90, 90, 90])).take(5);
        let err = t.run(&mut frames, |_| Control::Continue).unwrap_err();
        assert!(matches!(
            err,
            TrackError::Calibration(CalibrationError::NoQuadrilateral { attempts: 5 })
        ));
        assert!(t.homography().is_none());
    }

    #[test]
    fn recalibration_outcome_reaches_the_sink() {
        let config = TrackerConfig {
            recalibration_attempts: 2,
            ..TrackerConfig::default()
        };
        let mut t = TableTracker::from_config(&config).expect("tracker");
        let table = table_frame();
        let before = *t.calibrate([&table], 1).expect("calibrated");

        let blank = RgbImage::filled(640, 480, [0, 0, 0]);
        // frame, two blanks eaten by a failed recalibration, frame, two tables
        // eaten by a successful one, frame
        let mut frames = vec![
            table.clone(),
            blank.clone(),
            blank,
            table.clone(),
            table.clone(),
            table.clone(),
            table,
        ]
        .into_iter();
        let mut seen = Vec::new();
        let n = t
            .run(&mut frames, |out| {
                seen.push(out.recalibrated.clone());
                if out.index < 2 {
                    Control::Recalibrate
                } else {
                    Control::Continue
                }
            })
            .expect("run");
        assert_eq!(n, 3);
        assert_eq!(
            seen,
            vec![
                None,
                Some(Err(CalibrationError::NoQuadrilateral { attempts: 2 })),
                Some(Ok(())),
            ]
        );
        assert_eq!(t.homography(), Some(&before));
    }

    #[test]
    fn stack_shaped_regions_fall_back_to_chips() {
        let t = tracker();
        let mut canvas = RgbImage::filled(800, 600, [25, 110, 55]);
        // a 40x120 red stack and a lone white chip
        fill_rect(&mut canvas, 200, 200, 40, 120, [190, 30, 35]);
        blackjack_vision_core::fill_ellipse(
            &mut canvas,
            Point2::new(500.0, 300.0),
            20.0,
            20.0,
            [235, 235, 230],
        );
        let (cards, mut chips) = t.detect(&canvas);
        assert!(cards.is_empty());
        chips.sort_by(|a, b| a.centroid.x.total_cmp(&b.centroid.x));
        let summary: Vec<(u32, u32)> = chips.iter().map(|c| (c.count, c.total_value)).collect();
        assert_eq!(summary, vec![(3, 15), (1, 1)]);
    }
}
