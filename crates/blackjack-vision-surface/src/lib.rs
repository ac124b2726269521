//! Playing-surface calibration.
//!
//! Finds the table outline in raw camera frames and maps it onto a fixed
//! top-down canvas:
//! 1. Otsu-binarise the gray frame in both polarities.
//! 2. Trace external boundaries and take the convex outline of each blob.
//! 3. Simplify the outline; keep convex quadrilaterals of plausible size
//!    with well-separated corners, largest first.
//! 4. Average the ordered corners over several frames and solve the
//!    4-point homography onto the canvas rectangle.

mod estimator;
mod params;
mod quad;

pub use estimator::{apply, CalibrationError, SurfaceEstimator, TableHomography};
pub use params::SurfaceParams;
pub use quad::{find_table_quad, order_corners_clockwise, TableQuad};
