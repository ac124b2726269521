//! JSON configuration of the whole pipeline.

use crate::{StabilizerParams, TableLayout};
use blackjack_vision_cards::CardParams;
use blackjack_vision_chips::ChipParams;
use blackjack_vision_segment::SegmentParams;
use blackjack_vision_surface::SurfaceParams;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn default_calibration_attempts() -> usize {
    100
}

fn default_recalibration_attempts() -> usize {
    10
}

/// Parameters of every pipeline stage. Missing sections fall back to their
/// defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Directory of `<rank>_<suit>.png` glyph templates.
    #[serde(default)]
    pub template_dir: Option<PathBuf>,
    /// Frame budget of the initial calibration.
    #[serde(default = "default_calibration_attempts")]
    pub calibration_attempts: usize,
    /// Frame budget of a calibration requested while running.
    #[serde(default = "default_recalibration_attempts")]
    pub recalibration_attempts: usize,
    #[serde(default)]
    pub surface: SurfaceParams,
    #[serde(default)]
    pub segment: SegmentParams,
    #[serde(default)]
    pub cards: CardParams,
    #[serde(default)]
    pub chips: ChipParams,
    #[serde(default)]
    pub stabilizer: StabilizerParams,
    #[serde(default)]
    pub layout: TableLayout,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            template_dir: None,
            calibration_attempts: default_calibration_attempts(),
            recalibration_attempts: default_recalibration_attempts(),
            surface: SurfaceParams::default(),
            segment: SegmentParams::default(),
            cards: CardParams::default(),
            chips: ChipParams::default(),
            stabilizer: StabilizerParams::default(),
            layout: TableLayout::default(),
        }
    }
}

impl TrackerConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: TrackerConfig = serde_json::from_str(
            r#"{
                "template_dir": "ranks",
                "surface": { "canvas_width": 640 },
                "cards": { "tie_break": "lowest_index" },
                "stabilizer": { "cards": { "confirm_frames": 3 } }
            }"#,
        )
        .expect("config");
        assert_eq!(cfg.template_dir, Some(PathBuf::from("ranks")));
        assert_eq!(cfg.calibration_attempts, 100);
        assert_eq!(cfg.surface.canvas_width, 640);
        assert_eq!(cfg.surface.canvas_height, 600);
        assert_eq!(cfg.stabilizer.cards.confirm_frames, 3);
        assert_eq!(cfg.stabilizer.cards.max_missing_frames, 2);
        assert_eq!(
            cfg.cards.tie_break,
            blackjack_vision_cards::TieBreak::LowestIndex
        );
        assert_eq!(cfg.chips.denominations.len(), 6);
    }

    #[test]
    fn write_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let mut cfg = TrackerConfig::default();
        cfg.recalibration_attempts = 7;
        cfg.write_json(&path).expect("write");
        let back = TrackerConfig::load_json(&path).expect("load");
        assert_eq!(back.recalibration_attempts, 7);
        assert_eq!(back.stabilizer, cfg.stabilizer);

        assert!(matches!(
            TrackerConfig::load_json(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
        fs::write(&path, "{ not json").expect("write");
        assert!(matches!(
            TrackerConfig::load_json(&path),
            Err(ConfigError::Json(_))
        ));
    }
}
