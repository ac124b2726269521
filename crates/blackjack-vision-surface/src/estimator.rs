use crate::{find_table_quad, SurfaceParams};
use blackjack_vision_core::{
    homography_from_4pt, warp_perspective_rgb, Homography, RgbImage, RgbImageView,
};
use log::{debug, info, warn};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("no table quadrilateral found in {attempts} frame(s)")]
    NoQuadrilateral { attempts: usize },
    #[error("table corners do not define an invertible homography")]
    DegenerateHomography,
}

/// Mapping between camera pixels and the rectified table canvas.
///
/// Always constructed whole; there is no partially valid state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableHomography {
    pub canvas_from_camera: Homography,
    pub camera_from_canvas: Homography,
    pub width: usize,
    pub height: usize,
    /// Table corners in the camera frame, clockwise from the top-left.
    pub camera_corners: [Point2<f32>; 4],
}

impl TableHomography {
    /// Build the mapping that sends `camera_corners` onto the canvas corners.
    pub fn from_corners(
        camera_corners: [Point2<f32>; 4],
        width: usize,
        height: usize,
    ) -> Result<Self, CalibrationError> {
        let (w, h) = (width as f32, height as f32);
        let canvas = [
            Point2::new(0.0, 0.0),
            Point2::new(w, 0.0),
            Point2::new(w, h),
            Point2::new(0.0, h),
        ];
        let canvas_from_camera = homography_from_4pt(&camera_corners, &canvas)
            .ok_or(CalibrationError::DegenerateHomography)?;
        let camera_from_canvas = canvas_from_camera
            .inverse()
            .ok_or(CalibrationError::DegenerateHomography)?;
        Ok(Self {
            canvas_from_camera,
            camera_from_canvas,
            width,
            height,
            camera_corners,
        })
    }

    /// Rectify one camera frame onto the canvas.
    pub fn rectify(&self, frame: &RgbImageView<'_>) -> RgbImage {
        apply(frame, self)
    }
}

/// Remap a camera frame onto the table canvas.
///
/// Pure function of its inputs: the same frame and mapping always give
/// the same pixels.
pub fn apply(frame: &RgbImageView<'_>, table: &TableHomography) -> RgbImage {
    warp_perspective_rgb(frame, table.camera_from_canvas, table.width, table.height)
}

/// Table calibration over a bounded frame sequence.
#[derive(Clone, Debug, Default)]
pub struct SurfaceEstimator {
    params: SurfaceParams,
}

impl SurfaceEstimator {
    pub fn new(params: SurfaceParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &SurfaceParams {
        &self.params
    }

    /// Examine at most `max_attempts` frames and average the table corners
    /// of up to `consensus_frames` successful ones.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self, frames)))]
    pub fn calibrate<I>(&self, frames: I, max_attempts: usize) -> Result<TableHomography, CalibrationError>
    where
        I: IntoIterator,
        I::Item: Borrow<RgbImage>,
    {
        let want = self.params.consensus_frames.max(1);
        let mut found: Vec<[Point2<f32>; 4]> = Vec::with_capacity(want);
        let mut attempts = 0usize;

        for frame in frames.into_iter().take(max_attempts) {
            attempts += 1;
            let gray = frame.borrow().view().to_gray();
            if let Some(quad) = find_table_quad(&gray.view(), &self.params) {
                found.push(quad.corners);
                if found.len() >= want {
                    break;
                }
            }
        }

        if found.is_empty() {
            warn!("calibration failed: no table quadrilateral in {attempts} frame(s)");
            return Err(CalibrationError::NoQuadrilateral { attempts });
        }

        let (mean, used) = consensus_corners(&found, self.params.max_consensus_deviation_px);
        if used < found.len() {
            debug!("{} of {} table quad(s) disagree with the median", found.len() - used, found.len());
        }

        let table = TableHomography::from_corners(
            mean,
            self.params.canvas_width,
            self.params.canvas_height,
        )?;
        info!(
            "calibrated on {} of {} frame(s): corners {:?}",
            used,
            attempts,
            mean.map(|p| (p.x.round(), p.y.round()))
        );
        Ok(table)
    }
}

fn median(mut values: Vec<f32>) -> f32 {
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}

/// Corner-wise mean of the quads agreeing with the per-corner median, and
/// how many quads that was. `found` must not be empty.
fn consensus_corners(found: &[[Point2<f32>; 4]], max_deviation: f32) -> ([Point2<f32>; 4], usize) {
    let center: [Point2<f32>; 4] = std::array::from_fn(|k| {
        Point2::new(
            median(found.iter().map(|q| q[k].x).collect()),
            median(found.iter().map(|q| q[k].y).collect()),
        )
    });
    let deviation = |q: &[Point2<f32>; 4]| {
        q.iter()
            .zip(&center)
            .map(|(p, c)| (p - c).norm())
            .fold(0.0f32, f32::max)
    };
    let mut inliers: Vec<&[Point2<f32>; 4]> =
        found.iter().filter(|q| deviation(*q) <= max_deviation).collect();
    if inliers.is_empty() {
        // no agreement at all: trust the quad nearest to the median
        inliers.extend(found.iter().min_by(|a, b| deviation(*a).total_cmp(&deviation(*b))));
    }

    let n = inliers.len() as f32;
    let mean = std::array::from_fn(|k| {
        let (sx, sy) = inliers
            .iter()
            .fold((0.0f32, 0.0f32), |(sx, sy), q| (sx + q[k].x, sy + q[k].y));
        Point2::new(sx / n, sy / n)
    });
    (mean, inliers.len())
}
