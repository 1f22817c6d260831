//! Camera ego-motion from sparse optical flow.
//!
//! The background is assumed to dominate the sampled features, so the mean
//! displacement of all tracked corners approximates the camera translation.
//! Sparse or absent features degrade to a zero-motion assumption.

use nalgebra as na;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::FlowConfig;
use crate::corners::CornerDetector;
use crate::image::{GrayImage, Pyramid};
use crate::math;
use crate::optical_flow::{LucasKanade, TrackStatus};
use crate::Frame;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowSample {
    pub point: na::Point2<f32>,
    pub displacement: na::Vector2<f32>,
}

/// Displacement samples of one frame pair, bounded by the frame size.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    pub dims: (u32, u32),
    pub samples: Vec<FlowSample>,
}

impl FlowField {
    pub fn new(dims: (u32, u32), samples: Vec<FlowSample>) -> Self {
        Self { dims, samples }
    }

    pub fn empty(dims: (u32, u32)) -> Self {
        Self {
            dims,
            samples: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn contains(&self, p: na::Point2<f32>) -> bool {
        p.x >= 0.0 && p.y >= 0.0 && p.x < self.dims.0 as f32 && p.y < self.dims.1 as f32
    }

    /// Displacement at `p`: a Gaussian-weighted mean of the samples within
    /// `radius`, zero when none is that close. `None` when `p` lies outside
    /// the field.
    pub fn sample_at(&self, p: na::Point2<f32>, radius: f32) -> Option<na::Vector2<f32>> {
        if !self.contains(p) {
            return None;
        }

        let sigma = (radius / 2.0).max(f32::EPSILON);
        let mut acc = na::Vector2::zeros();
        let mut wsum = 0.0f32;

        for s in &self.samples {
            let d = na::distance(&s.point, &p);
            if d <= radius {
                let w = math::gauss(d, sigma);
                acc += s.displacement * w;
                wsum += w;
            }
        }

        if wsum > 0.0 {
            Some(acc / wsum)
        } else {
            Some(na::Vector2::zeros())
        }
    }
}

/// Mean displacement of all samples, (0, 0) for an empty field.
pub fn estimate_global_motion(flow: &FlowField) -> na::Vector2<f32> {
    if flow.is_empty() {
        return na::Vector2::zeros();
    }

    let sum = flow
        .samples
        .iter()
        .fold(na::Vector2::zeros(), |acc, s| acc + s.displacement);

    sum / flow.len() as f32
}

/// Removes `motion` from every sample.
pub fn compensate(mut flow: FlowField, motion: na::Vector2<f32>) -> FlowField {
    for s in &mut flow.samples {
        s.displacement -= motion;
    }

    flow
}

#[derive(Debug, Clone)]
pub struct MotionEstimator {
    detector: CornerDetector,
    tracker: LucasKanade,
    pyramid_levels: usize,
    frame_skip: usize,
}

impl MotionEstimator {
    pub fn new(config: &FlowConfig, frame_skip: usize) -> Self {
        Self {
            detector: CornerDetector {
                max_corners: config.max_corners,
                quality_level: config.quality_level,
                min_distance: config.min_distance,
                block_size: config.block_size,
                border: config.window_radius,
            },
            tracker: LucasKanade {
                window_radius: config.window_radius,
                max_iterations: config.max_iterations,
                epsilon: config.epsilon,
                min_eigen: config.min_eigen,
            },
            pyramid_levels: config.pyramid_levels,
            frame_skip: frame_skip.max(1),
        }
    }

    #[inline]
    pub fn frame_skip(&self) -> usize {
        self.frame_skip
    }

    pub fn compute_flow(&self, frame_a: &Frame, frame_b: &Frame) -> FlowField {
        if frame_a.dims() != frame_b.dims() {
            warn!(
                a = ?frame_a.dims(),
                b = ?frame_b.dims(),
                "frame sizes differ, assuming no motion"
            );
            return FlowField::empty(frame_a.dims());
        }

        self.flow_between(
            GrayImage::from_frame(frame_a),
            GrayImage::from_frame(frame_b),
            frame_a.dims(),
        )
    }

    fn flow_between(&self, a: GrayImage, b: GrayImage, dims: (u32, u32)) -> FlowField {
        let corners = self.detector.detect(&a);
        if corners.is_empty() {
            return FlowField::empty(dims);
        }

        let min_size = 2 * self.tracker.window_radius + 1;
        let prev = Pyramid::build(a, self.pyramid_levels, min_size);
        let next = Pyramid::build(b, self.pyramid_levels, min_size);

        let points: Vec<_> = corners.iter().map(|c| c.pos).collect();
        let samples: Vec<_> = self
            .tracker
            .track(&prev, &next, &points)
            .into_iter()
            .filter(|t| t.status == TrackStatus::Tracked)
            .map(|t| FlowSample {
                point: t.from,
                displacement: t.displacement(),
            })
            .collect();

        debug!(corners = points.len(), tracked = samples.len(), "flow computed");

        FlowField::new(dims, samples)
    }

    /// Flow for every frame of a clip. Entry `i` holds the flow of pair
    /// `(i, i + 1)` when `i` is a multiple of the frame skip, the last entry
    /// is always `None`. Pairs are evaluated in parallel.
    pub fn compute_sequence(&self, frames: &[Frame]) -> Vec<Option<FlowField>> {
        if frames.is_empty() {
            return Vec::new();
        }

        let gray: Vec<Option<GrayImage>> = frames
            .par_iter()
            .enumerate()
            .map(|(i, f)| {
                let wanted = i % self.frame_skip == 0 || (i > 0 && (i - 1) % self.frame_skip == 0);
                wanted.then(|| GrayImage::from_frame(f))
            })
            .collect();

        let mut flows: Vec<Option<FlowField>> = (0..frames.len() - 1)
            .into_par_iter()
            .map(|i| {
                if i % self.frame_skip != 0 {
                    return None;
                }

                let (a, b) = (&frames[i], &frames[i + 1]);
                let flow = match (&gray[i], &gray[i + 1]) {
                    (Some(ga), Some(gb)) if a.dims() == b.dims() => {
                        self.flow_between(ga.clone(), gb.clone(), a.dims())
                    }
                    _ => self.compute_flow(a, b),
                };

                Some(flow)
            })
            .collect();

        flows.push(None);
        flows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample(x: f32, y: f32, dx: f32, dy: f32) -> FlowSample {
        FlowSample {
            point: na::Point2::new(x, y),
            displacement: na::Vector2::new(dx, dy),
        }
    }

    fn texture(x: f32, y: f32) -> u8 {
        let v = 128.0 + 60.0 * (x / 5.0).sin() * (y / 7.0).cos() + 40.0 * ((x + y) / 11.0).sin();
        v.round().clamp(0.0, 255.0) as u8
    }

    fn textured_frame(shift_x: f32, shift_y: f32) -> Frame {
        Frame::from_fn(160, 120, |x, y| {
            let v = texture(x as f32 - shift_x, y as f32 - shift_y);
            [v, v, v]
        })
    }

    #[test]
    fn global_motion_of_empty_field_is_zero() {
        let flow = FlowField::empty((10, 10));
        assert_eq!(estimate_global_motion(&flow), na::Vector2::zeros());
    }

    #[test]
    fn compensate_empty_field_is_identity() {
        let flow = FlowField::empty((10, 10));
        let out = compensate(flow.clone(), na::Vector2::new(3.0, -1.0));
        assert_eq!(out, flow);
    }

    #[test]
    fn global_motion_is_mean_displacement() {
        let flow = FlowField::new(
            (100, 100),
            vec![sample(1.0, 1.0, 2.0, 0.0), sample(50.0, 50.0, 4.0, 2.0)],
        );
        let motion = estimate_global_motion(&flow);
        assert_relative_eq!(motion.x, 3.0);
        assert_relative_eq!(motion.y, 1.0);

        let out = compensate(flow, motion);
        assert_eq!(out.samples[0].displacement, na::Vector2::new(-1.0, -1.0));
        assert_eq!(out.samples[1].displacement, na::Vector2::new(1.0, 1.0));
        assert_eq!(estimate_global_motion(&out), na::Vector2::zeros());
    }

    #[test]
    fn sample_at_respects_bounds_and_radius() {
        let flow = FlowField::new(
            (100, 50),
            vec![sample(10.0, 10.0, 2.0, 0.0), sample(12.0, 10.0, 4.0, 0.0)],
        );

        assert_eq!(flow.sample_at(na::Point2::new(100.0, 10.0), 5.0), None);
        assert_eq!(flow.sample_at(na::Point2::new(10.0, -1.0), 5.0), None);
        assert_eq!(
            flow.sample_at(na::Point2::new(80.0, 40.0), 5.0),
            Some(na::Vector2::zeros())
        );

        // equidistant samples weigh the same
        let mid = flow.sample_at(na::Point2::new(11.0, 10.0), 5.0).unwrap();
        assert_relative_eq!(mid.x, 3.0, epsilon = 1e-5);

        // a sample outside the radius does not contribute
        let near = flow.sample_at(na::Point2::new(7.0, 10.0), 4.0).unwrap();
        assert_relative_eq!(near.x, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn still_frames_have_no_motion() {
        let estimator = MotionEstimator::new(&FlowConfig::default(), 1);
        let frame = textured_frame(0.0, 0.0);

        let flow = estimator.compute_flow(&frame, &frame);
        assert!(!flow.is_empty());

        let motion = estimate_global_motion(&flow);
        assert!(motion.norm() < 0.05, "motion = {:?}", motion);
    }

    #[test]
    fn panning_camera_is_recovered() {
        let estimator = MotionEstimator::new(&FlowConfig::default(), 1);
        let flow = estimator.compute_flow(&textured_frame(0.0, 0.0), &textured_frame(3.0, 2.0));
        assert!(flow.len() >= 10, "only {} samples", flow.len());

        let motion = estimate_global_motion(&flow);
        assert!((motion.x - 3.0).abs() < 0.5, "motion = {:?}", motion);
        assert!((motion.y - 2.0).abs() < 0.5, "motion = {:?}", motion);
    }

    #[test]
    fn featureless_frames_give_empty_field() {
        let estimator = MotionEstimator::new(&FlowConfig::default(), 1);
        let flat = Frame::from_fn(64, 48, |_, _| [90, 90, 90]);

        let flow = estimator.compute_flow(&flat, &flat);
        assert!(flow.is_empty());
        assert_eq!(flow.dims, (64, 48));
        assert_eq!(estimate_global_motion(&flow), na::Vector2::zeros());
    }

    #[test]
    fn mismatched_frames_give_empty_field() {
        let estimator = MotionEstimator::new(&FlowConfig::default(), 1);
        let flow = estimator.compute_flow(&textured_frame(0.0, 0.0), &Frame::from_fn(10, 10, |_, _| [0; 3]));
        assert!(flow.is_empty());
    }

    #[test]
    fn sequence_honours_frame_skip() {
        let frames: Vec<_> = (0..5).map(|i| textured_frame(i as f32, 0.0)).collect();

        let every = MotionEstimator::new(&FlowConfig::default(), 1).compute_sequence(&frames);
        assert_eq!(every.len(), 5);
        assert!(every[..4].iter().all(Option::is_some));
        assert!(every[4].is_none());

        let skipped = MotionEstimator::new(&FlowConfig::default(), 2).compute_sequence(&frames);
        let present: Vec<bool> = skipped.iter().map(Option::is_some).collect();
        assert_eq!(present, vec![true, false, true, false, false]);

        assert!(MotionEstimator::new(&FlowConfig::default(), 1)
            .compute_sequence(&[])
            .is_empty());
    }

    #[test]
    fn sequence_keeps_frame_order() {
        // pair i moves by i + 1 px
        let frames: Vec<_> = [0.0, 1.0, 3.0, 6.0, 10.0]
            .iter()
            .map(|&shift| textured_frame(shift, 0.0))
            .collect();

        let flows = MotionEstimator::new(&FlowConfig::default(), 1).compute_sequence(&frames);
        assert_eq!(flows.len(), 5);

        for (i, flow) in flows[..4].iter().enumerate() {
            let motion = estimate_global_motion(flow.as_ref().unwrap());
            let expected = (i + 1) as f32;
            assert!((motion.x - expected).abs() < 0.5, "pair {}: motion = {:?}", i, motion);
            assert!(motion.y.abs() < 0.5, "pair {}: motion = {:?}", i, motion);
        }
        assert!(flows[4].is_none());
    }
}
