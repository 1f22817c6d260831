//! Shi-Tomasi "good features to track" detector.

use nalgebra as na;
use ndarray::Array2;

use crate::image::GrayImage;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corner {
    pub pos: na::Point2<f32>,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct CornerDetector {
    pub max_corners: usize,
    /// Fraction of the strongest response a corner has to reach.
    pub quality_level: f32,
    pub min_distance: f32,
    /// Side of the structure tensor window, odd.
    pub block_size: usize,
    /// Corners closer than this to the image border are ignored.
    pub border: usize,
}

impl CornerDetector {
    pub fn detect(&self, img: &GrayImage) -> Vec<Corner> {
        let (w, h) = (img.width(), img.height());
        let half = (self.block_size / 2).max(1);
        let border = self.border.max(half + 1);

        if self.max_corners == 0 || w <= 2 * border || h <= 2 * border {
            return Vec::new();
        }

        let mut grad = Array2::<(f32, f32)>::from_elem((h, w), (0.0, 0.0));
        for y in 0..h {
            for x in 0..w {
                grad[[y, x]] = img.sobel(x, y);
            }
        }

        let mut response = Array2::<f32>::zeros((h, w));
        let mut max_response = 0.0f32;

        for y in border..h - border {
            for x in border..w - border {
                let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);

                for wy in y - half..=y + half {
                    for wx in x - half..=x + half {
                        let (gx, gy) = grad[[wy, wx]];
                        a += gx * gx;
                        b += gx * gy;
                        c += gy * gy;
                    }
                }

                // smaller eigenvalue of [[a, b], [b, c]]
                let lambda = (a + c) / 2.0 - (((a - c) / 2.0).powi(2) + b * b).sqrt();
                response[[y, x]] = lambda;
                max_response = max_response.max(lambda);
            }
        }

        if max_response <= 0.0 {
            return Vec::new();
        }

        let threshold = max_response * self.quality_level;
        let mut candidates = Vec::new();

        for y in border..h - border {
            for x in border..w - border {
                let r = response[[y, x]];
                if r <= threshold {
                    continue;
                }

                let is_peak = (y - 1..=y + 1)
                    .flat_map(|ny| (x - 1..=x + 1).map(move |nx| (nx, ny)))
                    .all(|(nx, ny)| response[[ny, nx]] <= r);

                if is_peak {
                    candidates.push(Corner {
                        pos: na::Point2::new(x as f32, y as f32),
                        score: r,
                    });
                }
            }
        }

        // strongest first, position breaks ties so the output is stable
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.pos.y.total_cmp(&b.pos.y))
                .then(a.pos.x.total_cmp(&b.pos.x))
        });

        let min_dist2 = self.min_distance * self.min_distance;
        let mut accepted: Vec<Corner> = Vec::with_capacity(self.max_corners);

        for cand in candidates {
            if accepted
                .iter()
                .all(|c| na::distance_squared(&c.pos, &cand.pos) >= min_dist2)
            {
                accepted.push(cand);

                if accepted.len() == self.max_corners {
                    break;
                }
            }
        }

        accepted
    }
}
