//! Pyramidal Lucas-Kanade point tracker.

use nalgebra as na;

use crate::image::{GrayImage, Pyramid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    Tracked,
    /// The normal matrix was singular or the solution diverged.
    Lost,
    OutOfBounds,
}

#[derive(Debug, Clone, Copy)]
pub struct TrackedPoint {
    pub from: na::Point2<f32>,
    pub to: na::Point2<f32>,
    pub status: TrackStatus,
}

impl TrackedPoint {
    #[inline]
    pub fn displacement(&self) -> na::Vector2<f32> {
        self.to - self.from
    }
}

#[derive(Debug, Clone)]
pub struct LucasKanade {
    /// Patch half-size, the patch is (2 * r + 1)^2 pixels.
    pub window_radius: usize,
    pub max_iterations: usize,
    pub epsilon: f32,
    /// Minimum eigenvalue of the per-pixel averaged normal matrix.
    pub min_eigen: f32,
}

impl LucasKanade {
    pub fn track(
        &self,
        prev: &Pyramid,
        next: &Pyramid,
        points: &[na::Point2<f32>],
    ) -> Vec<TrackedPoint> {
        let levels = prev.num_levels().min(next.num_levels());

        points
            .iter()
            .map(|&p| self.track_point(prev, next, p, levels))
            .collect()
    }

    fn track_point(
        &self,
        prev: &Pyramid,
        next: &Pyramid,
        from: na::Point2<f32>,
        levels: usize,
    ) -> TrackedPoint {
        let mut guess = na::Vector2::zeros();

        for level in (0..levels).rev() {
            let scale = 1.0 / (1u32 << level) as f32;
            let pt = from * scale;

            match self.refine(&prev.levels[level], &next.levels[level], pt, guess) {
                Some(d) => guess = d,
                None => {
                    return TrackedPoint {
                        from,
                        to: from + guess / scale,
                        status: TrackStatus::Lost,
                    }
                }
            }

            if level > 0 {
                guess *= 2.0;
            }
        }

        let to = from + guess;
        let base = next.base();
        let status = if to.x >= 0.0
            && to.y >= 0.0
            && to.x < base.width() as f32
            && to.y < base.height() as f32
        {
            TrackStatus::Tracked
        } else {
            TrackStatus::OutOfBounds
        };

        TrackedPoint { from, to, status }
    }

    /// Iterative LK at one level. Template gradients are taken once from the
    /// previous image, so the normal matrix is constant over iterations.
    fn refine(
        &self,
        prev: &GrayImage,
        next: &GrayImage,
        pt: na::Point2<f32>,
        guess: na::Vector2<f32>,
    ) -> Option<na::Vector2<f32>> {
        let r = self.window_radius as isize;
        let side = (2 * r + 1) as usize;
        let mut patch = Vec::with_capacity(side * side);
        let mut g = na::Matrix2::<f32>::zeros();

        for dy in -r..=r {
            for dx in -r..=r {
                let (x, y) = (pt.x + dx as f32, pt.y + dy as f32);
                let ix = 0.5 * (prev.bilinear(x + 1.0, y) - prev.bilinear(x - 1.0, y));
                let iy = 0.5 * (prev.bilinear(x, y + 1.0) - prev.bilinear(x, y - 1.0));

                g[(0, 0)] += ix * ix;
                g[(0, 1)] += ix * iy;
                g[(1, 1)] += iy * iy;
                patch.push((dx as f32, dy as f32, prev.bilinear(x, y), ix, iy));
            }
        }
        g[(1, 0)] = g[(0, 1)];

        let (gxx, gxy, gyy) = (g[(0, 0)], g[(0, 1)], g[(1, 1)]);
        let min_eig = ((gxx + gyy) / 2.0 - (((gxx - gyy) / 2.0).powi(2) + gxy * gxy).sqrt())
            / (side * side) as f32;

        if min_eig.is_nan() || min_eig < self.min_eigen {
            return None;
        }

        let g_inv = g.try_inverse()?;
        let mut d = guess;

        for _ in 0..self.max_iterations {
            let mut b = na::Vector2::<f32>::zeros();

            for &(dx, dy, t, ix, iy) in &patch {
                let e = t - next.bilinear(pt.x + d.x + dx, pt.y + d.y + dy);
                b.x += ix * e;
                b.y += iy * e;
            }

            let delta = g_inv * b;
            d += delta;

            if !d.x.is_finite() || !d.y.is_finite() {
                return None;
            }

            if delta.norm() < self.epsilon {
                break;
            }
        }

        Some(d)
    }
}
