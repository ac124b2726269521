//! Chip stack classification.
//!
//! Single chips are near-circular blobs; short stacks seen from the camera
//! are upright, well-filled boxes one chip wide. The chip count comes from
//! the stack height in units of one chip, the denomination from the mean
//! color inside the blob matched against a fixed color table.

mod classifier;
mod params;

pub use classifier::{ChipClassifier, ChipObservation, ChipShape};
pub use params::{ChipParams, Denomination};
