//! Hand values and bet for the overlay.

use crate::StableState;
use blackjack_vision_cards::CardFace;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Axis-aligned zone as fractions of the canvas size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Zone {
    pub fn contains(&self, p: Point2<f32>, width: usize, height: usize) -> bool {
        let (u, v) = (p.x / width as f32, p.y / height as f32);
        u >= self.x0 && u < self.x1 && v >= self.y0 && v < self.y1
    }
}

/// Dealer and player areas of the canvas.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableLayout {
    pub dealer: Zone,
    pub player: Zone,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            dealer: Zone {
                x0: 0.0,
                y0: 0.0,
                x1: 1.0,
                y1: 0.5,
            },
            player: Zone {
                x0: 0.0,
                y0: 0.5,
                x1: 1.0,
                y1: 1.0,
            },
        }
    }
}

/// Blackjack value of a set of cards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandValue {
    /// Best total: an ace counts 11 when that does not bust.
    pub total: u32,
    /// `total` uses an ace as 11.
    pub soft: bool,
    pub bust: bool,
    /// Two cards worth 21.
    pub blackjack: bool,
}

impl HandValue {
    pub fn of(faces: &[CardFace]) -> Self {
        let hard: u32 = faces.iter().map(|f| f.rank.points()).sum();
        let has_ace = faces.iter().any(|f| f.rank.points() == 1);
        let soft = has_ace && hard + 10 <= 21;
        let total = if soft { hard + 10 } else { hard };
        Self {
            total,
            soft,
            bust: total > 21,
            blackjack: faces.len() == 2 && total == 21,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Hand {
    pub cards: Vec<CardFace>,
    pub value: HandValue,
}

impl Hand {
    fn new(cards: Vec<CardFace>) -> Self {
        let value = HandValue::of(&cards);
        Self { cards, value }
    }
}

/// What the overlay shows for one frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSummary {
    pub dealer: Hand,
    pub player: Hand,
    /// Total chip value in the player zone.
    pub bet: u32,
    /// Player-zone stacks whose count or color was uncertain.
    pub uncertain_stacks: usize,
}

impl TableSummary {
    pub fn from_state(state: &StableState, layout: &TableLayout, width: usize, height: usize) -> Self {
        let faces_in = |zone: &Zone| -> Vec<CardFace> {
            state
                .cards
                .iter()
                .filter(|t| zone.contains(t.observation.centroid, width, height))
                .map(|t| t.observation.face)
                .collect()
        };
        let player_chips = state
            .chips
            .iter()
            .map(|t| &t.observation)
            .filter(|c| layout.player.contains(c.centroid, width, height));

        let (bet, uncertain_stacks) = player_chips.fold((0, 0), |(bet, n), c| {
            let uncertain = c.ambiguous || c.denomination.is_none();
            (bet + c.total_value, n + usize::from(uncertain))
        });

        Self {
            dealer: Hand::new(faces_in(&layout.dealer)),
            player: Hand::new(faces_in(&layout.player)),
            bet,
            uncertain_stacks,
        }
    }
}
