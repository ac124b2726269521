//! Card identification for blobs on the rectified table.
//!
//! A blob is accepted as a card when its oriented rectangle has the card
//! aspect ratio. The rectangle is mapped onto a canonical upright card, the
//! rank/suit index in the top-left corner is resampled at template
//! resolution, binarised, and compared against every template of an
//! immutable [`TemplateLibrary`] by the fraction of disagreeing pixels.

mod classifier;
mod face;
mod library;
mod params;

pub use classifier::{CardClassifier, CardObservation, CardVerdict};
pub use face::{CardFace, ParseFaceError, Rank, Suit};
pub use library::{Template, TemplateLibrary, TemplateLibraryError};
pub use params::{CardParams, GlyphRoi, TieBreak};
