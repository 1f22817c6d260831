//! Image plane to playing surface projection.
//!
//! A single homography is derived from the four image-space corners of the
//! field and held for the rest of the clip. The surface is assumed planar and
//! the framing fixed, so there is no re-calibration mid-stream.

use nalgebra as na;
use tracing::debug;

use crate::error::{Error, Result};
use crate::math::{apply_homography, perspective_transform};

/// Width in pixels of the canonical top-down rectangle.
const CANONICAL_WIDTH: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Homography {
    pub matrix: na::Matrix3<f64>,
    pub inverse: na::Matrix3<f64>,
    pub pixels_per_meter: f64,
}

#[derive(Debug, Clone, Default)]
pub struct FieldProjector {
    homography: Option<Homography>,
}

impl FieldProjector {
    pub fn new() -> Self {
        Self { homography: None }
    }

    /// Corners in image pixels, ordered top-left, top-right, bottom-left,
    /// bottom-right. Replaces any previous configuration.
    pub fn configure(
        &mut self,
        corners: [na::Point2<f32>; 4],
        field_width: f32,
        field_height: f32,
    ) -> Result<()> {
        if !(field_width.is_finite() && field_width > 0.0)
            || !(field_height.is_finite() && field_height > 0.0)
        {
            return Err(Error::InvalidConfig(format!(
                "field size must be positive, got {}x{}",
                field_width, field_height
            )));
        }

        let dst_w = CANONICAL_WIDTH;
        let dst_h = CANONICAL_WIDTH * field_height as f64 / field_width as f64;

        let src = corners.map(|p| na::Point2::new(p.x as f64, p.y as f64));
        let dst = [
            na::Point2::new(0.0, 0.0),
            na::Point2::new(dst_w, 0.0),
            na::Point2::new(0.0, dst_h),
            na::Point2::new(dst_w, dst_h),
        ];

        let matrix = perspective_transform(&src, &dst).ok_or(Error::DegenerateCorners)?;
        let inverse = perspective_transform(&dst, &src).ok_or(Error::DegenerateCorners)?;
        let pixels_per_meter = dst_w / field_width as f64;

        debug!(field_width, field_height, pixels_per_meter, "field projector configured");

        self.homography = Some(Homography {
            matrix,
            inverse,
            pixels_per_meter,
        });

        Ok(())
    }

    #[inline]
    pub fn is_configured(&self) -> bool {
        self.homography.is_some()
    }

    #[inline]
    pub fn homography(&self) -> Option<&Homography> {
        self.homography.as_ref()
    }

    /// Maps an image point to field coordinates in meters.
    pub fn project(&self, point: na::Point2<f32>) -> Result<na::Point2<f32>> {
        let h = self.homography.as_ref().ok_or(Error::NotConfigured)?;
        let p = apply_homography(&h.matrix, &na::Point2::new(point.x as f64, point.y as f64));

        Ok(na::Point2::new(
            (p.x / h.pixels_per_meter) as f32,
            (p.y / h.pixels_per_meter) as f32,
        ))
    }

    /// Maps field coordinates in meters back to an image point.
    pub fn unproject(&self, meters: na::Point2<f32>) -> Result<na::Point2<f32>> {
        let h = self.homography.as_ref().ok_or(Error::NotConfigured)?;
        let canonical = na::Point2::new(
            meters.x as f64 * h.pixels_per_meter,
            meters.y as f64 * h.pixels_per_meter,
        );
        let p = apply_homography(&h.inverse, &canonical);

        Ok(na::Point2::new(p.x as f32, p.y as f32))
    }
}

/// Fallback field quadrilateral for footage without calibrated corners:
/// 10%..90% of the width and 20%..90% of the height.
pub fn default_corners(width: u32, height: u32) -> [na::Point2<f32>; 4] {
    let (w, h) = (width as f32, height as f32);

    [
        na::Point2::new(w * 0.1, h * 0.2),
        na::Point2::new(w * 0.9, h * 0.2),
        na::Point2::new(w * 0.1, h * 0.9),
        na::Point2::new(w * 0.9, h * 0.9),
    ]
}
