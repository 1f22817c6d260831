//! Per-track velocity and the accumulated distance ledger.
//!
//! A track moves from unseen to seen (distance 0) on its first appearance.
//! On every later frame where it is present, its distance grows by the
//! measured velocity times the frame period. A track that is absent simply
//! stops updating.

use nalgebra as na;
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::error::Result;
use crate::motion::{compensate, estimate_global_motion, FlowField};
use crate::projector::FieldProjector;
use crate::track::{TrackId, TrackMap};

/// Which prior distance a track resumes from.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Resume only from the immediately preceding frame. A track missing
    /// for one frame or more starts again from 0.
    #[default]
    ResetAfterGap,
    /// Resume from the last known distance whatever the gap.
    CarryForward,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct LedgerEntry {
    distance: f32,
    last_frame: usize,
}

#[derive(Debug, Clone)]
pub struct KinematicTracker {
    frame_rate: f32,
    sample_radius: f32,
    gap_policy: GapPolicy,
    ledger: HashMap<TrackId, LedgerEntry>,
}

impl KinematicTracker {
    pub fn new(frame_rate: f32, sample_radius: f32, gap_policy: GapPolicy) -> Self {
        Self {
            frame_rate,
            sample_radius,
            gap_policy,
            ledger: HashMap::new(),
        }
    }

    #[inline]
    pub fn frame_rate(&self) -> f32 {
        self.frame_rate
    }

    #[inline]
    pub fn gap_policy(&self) -> GapPolicy {
        self.gap_policy
    }

    /// Last recorded distance of a track.
    pub fn distance(&self, id: TrackId) -> Option<f32> {
        self.ledger.get(&id).map(|e| e.distance)
    }

    pub fn reset(&mut self) {
        self.ledger.clear();
    }

    /// Speed in m/s of every present track whose foot point lies inside the
    /// flow field. Camera motion is removed from `flow` first.
    pub fn velocity_for_frame(
        &self,
        records: &TrackMap,
        flow: &FlowField,
        projector: &FieldProjector,
    ) -> Result<HashMap<TrackId, f32>> {
        let motion = estimate_global_motion(flow);
        let residual = compensate(flow.clone(), motion);

        records
            .par_iter()
            .filter_map(|(&id, record)| {
                let foot = record.bbox.foot_point();
                let d = residual.sample_at(foot, self.sample_radius)?;

                Some(self.speed(projector, foot, d).map(|v| (id, v)))
            })
            .collect()
    }

    fn speed(
        &self,
        projector: &FieldProjector,
        foot: na::Point2<f32>,
        d: na::Vector2<f32>,
    ) -> Result<f32> {
        let p1 = projector.project(foot)?;
        let p2 = projector.project(foot + d)?;

        Ok(na::distance(&p1, &p2) * self.frame_rate)
    }

    /// Accumulates distances of the tracks present at `frame_index`. A track
    /// seen for the first time starts at 0, a known track adds
    /// `velocity / frame_rate` to the prior distance chosen by the gap policy.
    pub fn update_distances(
        &mut self,
        records: &mut TrackMap,
        velocities: &HashMap<TrackId, f32>,
        frame_index: usize,
    ) {
        let dt = 1.0 / self.frame_rate;

        for (&id, record) in records.iter_mut() {
            let distance = if frame_index == 0 || !self.ledger.contains_key(&id) {
                0.0
            } else {
                let prev = self.prior_distance(id, frame_index);
                let added = velocities.get(&id).map_or(0.0, |v| v * dt);

                prev + added
            };

            record.distance = distance;
            self.ledger.insert(
                id,
                LedgerEntry {
                    distance,
                    last_frame: frame_index,
                },
            );
        }
    }

    fn prior_distance(&self, id: TrackId, frame_index: usize) -> f32 {
        match (self.ledger.get(&id), self.gap_policy) {
            (Some(e), GapPolicy::ResetAfterGap) if e.last_frame + 1 == frame_index => e.distance,
            (Some(_), GapPolicy::ResetAfterGap) => 0.0,
            (Some(e), GapPolicy::CarryForward) => e.distance,
            (None, _) => 0.0,
        }
    }

    /// One frame of kinematics: velocity when flow is available, then the
    /// distance update. Velocities that could not be measured are `None`.
    pub fn step(
        &mut self,
        records: &mut TrackMap,
        flow: Option<&FlowField>,
        projector: &FieldProjector,
        frame_index: usize,
    ) -> Result<()> {
        let velocities = match flow {
            Some(flow) => self.velocity_for_frame(records, flow, projector)?,
            None => HashMap::new(),
        };

        for (id, record) in records.iter_mut() {
            record.velocity = velocities.get(id).copied();
        }

        self.update_distances(records, &velocities, frame_index);

        debug!(
            frame_index,
            tracks = records.len(),
            measured = velocities.len(),
            "kinematics updated"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BBox;
    use crate::error::Error;
    use crate::motion::FlowSample;
    use crate::track::TrackRecord;
    use approx::assert_relative_eq;

    fn identity_projector() -> FieldProjector {
        let mut projector = FieldProjector::new();
        projector
            .configure(
                [
                    na::Point2::new(0.0, 0.0),
                    na::Point2::new(100.0, 0.0),
                    na::Point2::new(0.0, 100.0),
                    na::Point2::new(100.0, 100.0),
                ],
                100.0,
                100.0,
            )
            .unwrap();
        projector
    }

    fn records(entries: &[(TrackId, [f32; 4])]) -> TrackMap {
        entries
            .iter()
            .map(|(id, b)| (*id, TrackRecord::new(BBox::ltrb(b[0], b[1], b[2], b[3]))))
            .collect()
    }

    fn sample(x: f32, y: f32, dx: f32, dy: f32) -> FlowSample {
        FlowSample {
            point: na::Point2::new(x, y),
            displacement: na::Vector2::new(dx, dy),
        }
    }

    #[test]
    fn velocity_uses_compensated_flow() {
        // camera pans by (1, 0): foot sample moves (4, 0), background (-2, 0)
        let flow = FlowField::new(
            (100, 100),
            vec![sample(5.0, 20.0, 4.0, 0.0), sample(80.0, 80.0, -2.0, 0.0)],
        );
        let tracker = KinematicTracker::new(2.0, 5.0, GapPolicy::ResetAfterGap);
        let recs = records(&[(1, [0.0, 0.0, 10.0, 20.0])]);

        let v = tracker
            .velocity_for_frame(&recs, &flow, &identity_projector())
            .unwrap();
        assert_relative_eq!(v[&1], 6.0, epsilon = 1e-3);
    }

    #[test]
    fn out_of_bounds_foot_is_omitted() {
        let flow = FlowField::new((50, 50), vec![sample(5.0, 20.0, 2.0, 0.0)]);
        let tracker = KinematicTracker::new(1.0, 5.0, GapPolicy::ResetAfterGap);
        let recs = records(&[(1, [0.0, 0.0, 10.0, 20.0]), (2, [40.0, 30.0, 60.0, 70.0])]);

        let v = tracker
            .velocity_for_frame(&recs, &flow, &identity_projector())
            .unwrap();
        assert!(v.contains_key(&1));
        assert!(!v.contains_key(&2));
    }

    #[test]
    fn velocity_needs_configured_projector() {
        let flow = FlowField::new((50, 50), vec![]);
        let tracker = KinematicTracker::new(1.0, 5.0, GapPolicy::ResetAfterGap);
        let recs = records(&[(1, [0.0, 0.0, 10.0, 20.0])]);

        assert!(matches!(
            tracker.velocity_for_frame(&recs, &flow, &FieldProjector::new()),
            Err(Error::NotConfigured)
        ));
    }

    #[test]
    fn empty_flow_means_standing_still() {
        let flow = FlowField::empty((50, 50));
        let tracker = KinematicTracker::new(30.0, 5.0, GapPolicy::ResetAfterGap);
        let recs = records(&[(1, [0.0, 0.0, 10.0, 20.0])]);

        let v = tracker
            .velocity_for_frame(&recs, &flow, &identity_projector())
            .unwrap();
        assert_eq!(v[&1], 0.0);
    }

    #[test]
    fn first_frame_starts_at_zero() {
        let mut tracker = KinematicTracker::new(1.0, 5.0, GapPolicy::ResetAfterGap);
        let mut recs = records(&[(1, [0.0, 0.0, 10.0, 20.0]), (2, [20.0, 0.0, 30.0, 20.0])]);
        let velocities = HashMap::from([(1, 5.0)]);

        tracker.update_distances(&mut recs, &velocities, 0);
        assert_eq!(recs[&1].distance, 0.0);
        assert_eq!(recs[&2].distance, 0.0);
        assert_eq!(tracker.distance(1), Some(0.0));
    }

    #[test]
    fn distance_accumulates_velocity_times_period() {
        let mut tracker = KinematicTracker::new(10.0, 5.0, GapPolicy::ResetAfterGap);
        let mut recs = records(&[(1, [0.0, 0.0, 10.0, 20.0])]);

        tracker.update_distances(&mut recs, &HashMap::new(), 0);
        tracker.update_distances(&mut recs, &HashMap::from([(1, 5.0)]), 1);
        assert_relative_eq!(recs[&1].distance, 0.5);

        // no velocity adds nothing
        tracker.update_distances(&mut recs, &HashMap::new(), 2);
        assert_relative_eq!(recs[&1].distance, 0.5);

        tracker.update_distances(&mut recs, &HashMap::from([(1, 10.0)]), 3);
        assert_relative_eq!(recs[&1].distance, 1.5);
    }

    #[test]
    fn late_arrival_starts_at_zero() {
        for policy in [GapPolicy::ResetAfterGap, GapPolicy::CarryForward] {
            let mut tracker = KinematicTracker::new(1.0, 5.0, policy);
            let mut recs = records(&[(7, [0.0, 0.0, 10.0, 20.0])]);

            tracker.update_distances(&mut recs, &HashMap::from([(7, 3.0)]), 4);
            assert_eq!(recs[&7].distance, 0.0);
            assert_eq!(tracker.distance(7), Some(0.0));

            tracker.update_distances(&mut recs, &HashMap::from([(7, 3.0)]), 5);
            assert_relative_eq!(recs[&7].distance, 3.0);
        }
    }

    #[test]
    fn newcomer_starts_at_zero_beside_known_track() {
        let mut tracker = KinematicTracker::new(1.0, 5.0, GapPolicy::ResetAfterGap);
        let mut first = records(&[(1, [0.0, 0.0, 10.0, 20.0])]);
        tracker.update_distances(&mut first, &HashMap::new(), 0);

        let mut second = records(&[(1, [2.0, 0.0, 12.0, 20.0]), (2, [40.0, 0.0, 50.0, 20.0])]);
        tracker.update_distances(&mut second, &HashMap::from([(1, 2.0), (2, 2.0)]), 1);
        assert_relative_eq!(second[&1].distance, 2.0);
        assert_eq!(second[&2].distance, 0.0);
    }

    #[test]
    fn one_frame_gap_resets_distance() {
        let mut tracker = KinematicTracker::new(1.0, 5.0, GapPolicy::ResetAfterGap);
        let mut recs = records(&[(1, [0.0, 0.0, 10.0, 20.0])]);

        tracker.update_distances(&mut recs, &HashMap::new(), 0);
        tracker.update_distances(&mut recs, &HashMap::from([(1, 4.0)]), 1);
        assert_relative_eq!(recs[&1].distance, 4.0);

        // absent at frame 2, back at frame 3
        tracker.update_distances(&mut recs, &HashMap::from([(1, 1.0)]), 3);
        assert_relative_eq!(recs[&1].distance, 1.0);
    }

    #[test]
    fn carry_forward_bridges_gaps() {
        let mut tracker = KinematicTracker::new(1.0, 5.0, GapPolicy::CarryForward);
        let mut recs = records(&[(1, [0.0, 0.0, 10.0, 20.0])]);

        tracker.update_distances(&mut recs, &HashMap::new(), 0);
        tracker.update_distances(&mut recs, &HashMap::from([(1, 4.0)]), 1);
        tracker.update_distances(&mut recs, &HashMap::from([(1, 1.0)]), 3);
        assert_relative_eq!(recs[&1].distance, 5.0);
    }

    #[test]
    fn step_writes_velocity_and_distance() {
        let mut tracker = KinematicTracker::new(1.0, 5.0, GapPolicy::ResetAfterGap);
        let projector = identity_projector();
        let mut recs = records(&[(1, [0.0, 0.0, 10.0, 20.0])]);
        let flow = FlowField::new(
            (100, 100),
            vec![sample(5.0, 20.0, 3.0, 4.0), sample(90.0, 90.0, -3.0, -4.0)],
        );

        tracker.step(&mut recs, Some(&flow), &projector, 0).unwrap();
        assert_relative_eq!(recs[&1].velocity.unwrap(), 5.0, epsilon = 1e-3);
        assert_eq!(recs[&1].distance, 0.0);

        tracker.step(&mut recs, Some(&flow), &projector, 1).unwrap();
        assert_relative_eq!(recs[&1].distance, 5.0, epsilon = 1e-3);

        tracker.step(&mut recs, None, &projector, 2).unwrap();
        assert_eq!(recs[&1].velocity, None);
        assert_relative_eq!(recs[&1].distance, 5.0, epsilon = 1e-3);
    }
}
