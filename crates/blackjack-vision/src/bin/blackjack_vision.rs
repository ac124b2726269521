//! blackjack-vision CLI: run the table pipeline over a directory of frames.

use blackjack_vision::cards::CardObservation;
use blackjack_vision::chips::ChipObservation;
use blackjack_vision::core::{draw_polygon_outline, draw_rect_outline, init_with_level, RgbImage};
use blackjack_vision::interop::{to_image, ImageDirSource};
use blackjack_vision::surface::TableHomography;
use blackjack_vision::{
    Control, FrameOutput, FrameSource, Mode, TableLayout, TableSummary, TableTracker,
    TrackerConfig,
};
use clap::Parser;
use log::{info, warn, LevelFilter};
use nalgebra::Point2;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

const CARD_COLOR: [u8; 3] = [255, 220, 0];
const CHIP_COLOR: [u8; 3] = [0, 200, 255];
const ZONE_COLOR: [u8; 3] = [255, 255, 255];

#[derive(Parser)]
#[command(name = "blackjack-vision")]
#[command(about = "Identify cards and chip stacks on an overhead blackjack table")]
#[command(version)]
struct Cli {
    /// Pipeline configuration (JSON); built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory of camera frames, processed in file name order.
    #[arg(long)]
    input: PathBuf,

    /// Rank/suit template directory, overriding the config.
    #[arg(long)]
    templates: Option<PathBuf>,

    /// Path to write the per-frame JSON report.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Directory to write annotated rectified frames to.
    #[arg(long)]
    rectified_dir: Option<PathBuf>,

    /// Write the effective configuration as JSON and exit.
    #[arg(long)]
    dump_config: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,

    /// Log through `tracing` as JSON lines instead of plain text.
    #[cfg(feature = "tracing")]
    #[arg(long)]
    log_json: bool,
}

#[derive(Serialize)]
struct FrameReport {
    index: u64,
    mode: Mode,
    cards: Vec<CardObservation>,
    chips: Vec<ChipObservation>,
    summary: TableSummary,
}

#[derive(Serialize)]
struct RunReport {
    input: PathBuf,
    table: Option<TableHomography>,
    frames: Vec<FrameReport>,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let mut config = match &cli.config {
        Some(path) => TrackerConfig::load_json(path)?,
        None => TrackerConfig::default(),
    };
    if let Some(dir) = &cli.templates {
        config.template_dir = Some(dir.clone());
    }
    if let Some(path) = &cli.dump_config {
        config.write_json(path)?;
        info!("configuration written to {}", path.display());
        return Ok(());
    }

    let mut tracker = TableTracker::from_config(&config)?;
    info!(
        "{} template(s) loaded, {} face(s) missing",
        tracker.library().len(),
        tracker.library().missing_faces().len()
    );

    // calibration reads its own pass over the first frames
    let mut calibration_frames = ImageDirSource::open(&cli.input)?;
    let attempts = config.calibration_attempts;
    tracker.calibrate(
        std::iter::from_fn(|| calibration_frames.next_frame()),
        attempts,
    )?;

    if let Some(dir) = &cli.rectified_dir {
        fs::create_dir_all(dir)?;
    }

    let mut frames = ImageDirSource::open(&cli.input)?;
    let (width, height) = (config.surface.canvas_width, config.surface.canvas_height);
    let mut reports = Vec::new();
    tracker.run(&mut frames, |out| {
        let summary = TableSummary::from_state(&out.state, &config.layout, width, height);
        if let Some(dir) = &cli.rectified_dir {
            let path = dir.join(format!("frame_{:05}.png", out.index));
            let overlay = annotate(out, &config.layout);
            match to_image(&overlay).map(|img| img.save(&path)) {
                Some(Ok(())) => {}
                Some(Err(err)) => warn!("cannot write {}: {err}", path.display()),
                None => warn!("frame {} has an inconsistent buffer", out.index),
            }
        }
        info!(
            "frame {}: dealer {:?} ({}), player {:?} ({}), bet {}",
            out.index,
            summary.dealer.cards.iter().map(|f| f.to_string()).collect::<Vec<_>>(),
            summary.dealer.value.total,
            summary.player.cards.iter().map(|f| f.to_string()).collect::<Vec<_>>(),
            summary.player.value.total,
            summary.bet
        );
        reports.push(FrameReport {
            index: out.index,
            mode: out.mode,
            cards: out.state.cards.iter().map(|t| t.observation.clone()).collect(),
            chips: out.state.chips.iter().map(|t| t.observation.clone()).collect(),
            summary,
        });
        Control::Continue
    })?;

    if let Some(path) = &cli.report {
        let report = RunReport {
            input: cli.input.clone(),
            table: tracker.homography().copied(),
            frames: reports,
        };
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json)?;
        info!("report written to {}", path.display());
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> CliResult<()> {
    #[cfg(feature = "tracing")]
    {
        if cli.log_json {
            blackjack_vision::init_tracing(true);
            return Ok(());
        }
    }
    init_with_level(cli.log_level)?;
    Ok(())
}

/// Rectified frame with zone boundaries, card outlines and chip boxes.
fn annotate(out: &FrameOutput, layout: &TableLayout) -> RgbImage {
    let mut img = out.rectified.clone();
    let (w, h) = (img.width as f32, img.height as f32);
    for zone in [layout.dealer, layout.player] {
        let corners = [
            Point2::new(zone.x0 * w, zone.y0 * h),
            Point2::new(zone.x1 * w - 1.0, zone.y0 * h),
            Point2::new(zone.x1 * w - 1.0, zone.y1 * h - 1.0),
            Point2::new(zone.x0 * w, zone.y1 * h - 1.0),
        ];
        draw_polygon_outline(&mut img, &corners, ZONE_COLOR);
    }
    for track in &out.state.cards {
        draw_polygon_outline(&mut img, &track.observation.corners, CARD_COLOR);
    }
    for track in &out.state.chips {
        draw_rect_outline(&mut img, &track.observation.bbox, CHIP_COLOR);
    }
    img
}
