use ndarray::{s, Array3, ArrayView3};

use crate::bbox::{BBox, Ltwh};
use crate::error::{Error, Result};
use crate::Color;

/// Interleaved 8-bit BGR image of shape (height, width, 3).
#[derive(Debug, Clone)]
pub struct Frame {
    pixels: Array3<u8>,
}

impl Frame {
    pub fn new(pixels: Array3<u8>) -> Result<Self> {
        let (h, w, c) = pixels.dim();
        if c != 3 {
            return Err(Error::InvalidFrame(format!("expected 3 channels, got {}", c)));
        }

        if h == 0 || w == 0 {
            return Err(Error::InvalidFrame(format!("empty frame {}x{}", w, h)));
        }

        Ok(Self { pixels })
    }

    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let pixels = Array3::from_shape_vec((height as usize, width as usize, 3), data)?;
        Self::new(pixels)
    }

    /// Builds a frame from a per-pixel `(x, y) -> [b, g, r]` function.
    /// Unlike [`Frame::new`] the size is not checked, a zero width or height
    /// yields an empty frame that [`crate::Pipeline`] rejects.
    pub fn from_fn<F>(width: u32, height: u32, f: F) -> Self
    where
        F: Fn(u32, u32) -> [u8; 3],
    {
        let pixels = Array3::from_shape_fn((height as usize, width as usize, 3), |(y, x, c)| {
            f(x as u32, y as u32)[c]
        });

        Self { pixels }
    }

    #[inline]
    pub fn dims(&self) -> (u32, u32) {
        let (h, w, _) = self.pixels.dim();
        (w as u32, h as u32)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.dims().0
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.dims().1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    #[inline]
    pub fn pixels(&self) -> ArrayView3<'_, u8> {
        self.pixels.view()
    }

    /// Mean color of `region` after clamping it to the frame, `None` when
    /// nothing of it is left.
    pub fn mean_color(&self, region: &BBox<Ltwh>) -> Option<Color> {
        let (fw, fh) = self.dims();
        let clamp = |v: f32, max: u32| v.max(0.0).min(max as f32) as usize;

        let x1 = clamp(region.left(), fw);
        let y1 = clamp(region.top(), fh);
        let x2 = clamp(region.left() + region.width(), fw);
        let y2 = clamp(region.top() + region.height(), fh);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        let crop = self.pixels.slice(s![y1..y2, x1..x2, ..]);
        let count = ((x2 - x1) * (y2 - y1)) as f32;
        let mut sum = Color::zeros();

        for px in crop.rows() {
            sum.x += px[0] as f32;
            sum.y += px[1] as f32;
            sum.z += px[2] as f32;
        }

        Some(sum / count)
    }
}
