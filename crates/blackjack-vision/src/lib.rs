//! High-level facade for the `blackjack-vision-*` workspace.
//!
//! This crate provides:
//! - re-exports of the component crates
//! - the temporal [`Stabilizer`] that turns per-frame detections into a
//!   flicker-free table state
//! - the [`TableTracker`] orchestrator driving calibration and the per-frame
//!   pipeline
//! - [`TableSummary`] with hand values and the bet for an overlay
//! - JSON configuration ([`TrackerConfig`])
//! - (feature `image`) conversions from `image` buffers and a directory
//!   frame source
//!
//! ## Quickstart
//!
//! ```no_run
//! use blackjack_vision::{interop::ImageDirSource, Control, TableTracker, TrackerConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TrackerConfig::load_json("table.json")?;
//! let mut tracker = TableTracker::from_config(&config)?;
//! let mut frames = ImageDirSource::open("frames")?;
//! tracker.run(&mut frames, |out| {
//!     println!("frame {}: {} stable card(s)", out.index, out.state.cards.len());
//!     Control::Continue
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `blackjack_vision::core`: frames, regions, homographies, drawing, logging.
//! - `blackjack_vision::surface`: table calibration and rectification.
//! - `blackjack_vision::segment`: foreground blob extraction.
//! - `blackjack_vision::cards`: template library and card classifier.
//! - `blackjack_vision::chips`: chip stack classifier.

pub use blackjack_vision_cards as cards;
pub use blackjack_vision_chips as chips;
pub use blackjack_vision_core as core;
pub use blackjack_vision_segment as segment;
pub use blackjack_vision_surface as surface;

mod config;
mod stabilizer;
mod summary;
mod tracker;

#[cfg(feature = "image")]
pub mod interop;

pub use config::{ConfigError, TrackerConfig};
pub use stabilizer::{
    nearest, StableState, Stabilizer, StabilizerParams, Track, TrackParams, TrackStatus,
    Trackable, Tracker,
};
pub use summary::{Hand, HandValue, TableLayout, TableSummary, Zone};
pub use tracker::{Control, FrameOutput, FrameSource, Mode, TableTracker, TrackError};

/// Install a `tracing` subscriber on stderr that also receives `log` records.
///
/// `RUST_LOG` overrides the default `info` filter.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let _ = tracing_log::LogTracer::init();
    blackjack_vision_core::init_tracing(json);
}
