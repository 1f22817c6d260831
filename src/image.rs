use ndarray::{Array2, Axis};

use crate::Frame;

/// Single channel f32 image used by the flow stage, indexed as (row, col).
#[derive(Debug, Clone)]
pub struct GrayImage {
    data: Array2<f32>,
}

impl GrayImage {
    pub fn new(data: Array2<f32>) -> Self {
        Self { data }
    }

    pub fn from_fn<F: Fn(usize, usize) -> f32>(width: usize, height: usize, f: F) -> Self {
        Self {
            data: Array2::from_shape_fn((height, width), |(y, x)| f(x, y)),
        }
    }

    /// BT.601 luma of a BGR frame.
    pub fn from_frame(frame: &Frame) -> Self {
        let pixels = frame.pixels();
        let data = pixels.map_axis(Axis(2), |px| {
            0.114 * px[0] as f32 + 0.587 * px[1] as f32 + 0.299 * px[2] as f32
        });

        Self { data }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    #[inline(always)]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[[y, x]]
    }

    /// Pixel at integer coordinates with border replication.
    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> f32 {
        let x = x.clamp(0, self.width() as isize - 1) as usize;
        let y = y.clamp(0, self.height() as isize - 1) as usize;

        self.data[[y, x]]
    }

    pub fn bilinear(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let ax = x - x0;
        let ay = y - y0;
        let (xi, yi) = (x0 as isize, y0 as isize);

        let p00 = self.get_clamped(xi, yi);
        let p10 = self.get_clamped(xi + 1, yi);
        let p01 = self.get_clamped(xi, yi + 1);
        let p11 = self.get_clamped(xi + 1, yi + 1);

        (p00 * (1.0 - ax) + p10 * ax) * (1.0 - ay) + (p01 * (1.0 - ax) + p11 * ax) * ay
    }

    /// Sobel derivatives at an integer pixel.
    pub fn sobel(&self, x: usize, y: usize) -> (f32, f32) {
        let (x, y) = (x as isize, y as isize);
        let p = |dx: isize, dy: isize| self.get_clamped(x + dx, y + dy);

        let gx = (p(1, -1) + 2.0 * p(1, 0) + p(1, 1)) - (p(-1, -1) + 2.0 * p(-1, 0) + p(-1, 1));
        let gy = (p(-1, 1) + 2.0 * p(0, 1) + p(1, 1)) - (p(-1, -1) + 2.0 * p(0, -1) + p(1, -1));

        (gx, gy)
    }

    /// Gaussian 5-tap blur followed by 2x decimation.
    pub fn pyr_down(&self) -> GrayImage {
        const K: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

        let (w, h) = (self.width(), self.height());
        let rows = Array2::from_shape_fn((h, w), |(y, x)| {
            K.iter()
                .enumerate()
                .map(|(i, k)| k * self.get_clamped(x as isize + i as isize - 2, y as isize))
                .sum::<f32>()
        });
        let rows = GrayImage::new(rows);

        let (nw, nh) = ((w + 1) / 2, (h + 1) / 2);
        let data = Array2::from_shape_fn((nh, nw), |(y, x)| {
            K.iter()
                .enumerate()
                .map(|(i, k)| k * rows.get_clamped(2 * x as isize, 2 * y as isize + i as isize - 2))
                .sum::<f32>()
        });

        GrayImage::new(data)
    }
}

/// Coarse-to-fine image pyramid, level 0 is the full resolution image.
#[derive(Debug, Clone)]
pub struct Pyramid {
    pub levels: Vec<GrayImage>,
}

impl Pyramid {
    /// Builds up to `max_levels` levels, stopping before a level gets
    /// narrower than `min_size` pixels.
    pub fn build(base: GrayImage, max_levels: usize, min_size: usize) -> Self {
        let mut levels = vec![base];

        while levels.len() < max_levels.max(1) {
            let top = &levels[levels.len() - 1];
            if top.width() / 2 < min_size || top.height() / 2 < min_size {
                break;
            }

            let next = top.pyr_down();
            levels.push(next);
        }

        Self { levels }
    }

    #[inline]
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    #[inline]
    pub fn base(&self) -> &GrayImage {
        &self.levels[0]
    }
}
