pub mod bbox;
pub mod config;
pub mod corners;
pub mod error;
pub mod frame;
pub mod image;
pub mod kinematics;
pub mod math;
pub mod motion;
pub mod optical_flow;
pub mod projector;
pub mod stats;
pub mod team;
pub mod track;

#[cfg(feature = "opencv")]
mod cv;

pub use config::{FlowConfig, PipelineConfig};
pub use error::{Error, Result};
pub use frame::Frame;
pub use kinematics::{GapPolicy, KinematicTracker};
pub use motion::{FlowField, MotionEstimator};
pub use projector::FieldProjector;
pub use team::{TeamAssigner, TeamColorModel};
pub use track::{FrameTracks, ObjectClass, TrackId, TrackRecord};

use nalgebra as na;
use tracing::{debug, info};

/// Mean B, G, R intensities.
pub type Color = na::Vector3<f32>;

/// Augments the player tracks of one video with team, velocity and
/// distance. Referees pass through untouched.
pub struct Pipeline {
    config: PipelineConfig,
    estimator: MotionEstimator,
    projector: FieldProjector,
    teams: TeamAssigner,
    kinematics: KinematicTracker,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            estimator: MotionEstimator::new(&config.flow, config.frame_skip),
            projector: FieldProjector::new(),
            teams: TeamAssigner::new(config.num_teams, config.kmeans_iterations, config.seed),
            kinematics: KinematicTracker::new(
                config.frame_rate,
                config.sample_radius,
                config.gap_policy,
            ),
            config,
        })
    }

    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[inline]
    pub fn projector(&self) -> &FieldProjector {
        &self.projector
    }

    #[inline]
    pub fn teams(&self) -> &TeamAssigner {
        &self.teams
    }

    #[inline]
    pub fn kinematics(&self) -> &KinematicTracker {
        &self.kinematics
    }

    pub fn process(&mut self, frames: &[Frame], tracks: &mut [FrameTracks]) -> Result<()> {
        check_lengths(frames.len(), tracks.len())?;
        check_frames(frames)?;
        if frames.is_empty() {
            return Ok(());
        }

        info!(frames = frames.len(), skip = self.estimator.frame_skip(), "computing optical flow");
        let flows = self.estimator.compute_sequence(frames);

        self.process_with_flows(frames, tracks, &flows)
    }

    /// Same as [`Pipeline::process`] with externally computed flow, one
    /// entry per frame holding the flow of the pair starting at it.
    pub fn process_with_flows(
        &mut self,
        frames: &[Frame],
        tracks: &mut [FrameTracks],
        flows: &[Option<FlowField>],
    ) -> Result<()> {
        check_lengths(frames.len(), tracks.len())?;
        check_frames(frames)?;
        if flows.len() != frames.len() {
            return Err(Error::InvalidFrame(format!(
                "expected {} flow entries, got {}",
                frames.len(),
                flows.len()
            )));
        }

        if frames.is_empty() {
            return Ok(());
        }

        let (width, height) = frames[0].dims();
        let corners = self
            .config
            .corners()
            .unwrap_or_else(|| projector::default_corners(width, height));

        self.projector
            .configure(corners, self.config.field_width, self.config.field_height)?;

        let mid = frames.len() / 2;
        let model = self.teams.fit(&frames[mid], &tracks[mid].players);
        info!(
            frame = mid,
            teams = model.centroids.len(),
            clustered = model.clustered.len(),
            "team colors fitted"
        );

        self.kinematics.reset();

        for (idx, (frame, frame_tracks)) in frames.iter().zip(tracks.iter_mut()).enumerate() {
            let players = &mut frame_tracks.players;

            self.teams.assign_frame(frame, players);
            self.kinematics
                .step(players, flows[idx].as_ref(), &self.projector, idx)?;
        }

        debug!(frames = frames.len(), "tracks augmented");

        Ok(())
    }
}

fn check_lengths(frames: usize, tracks: usize) -> Result<()> {
    if frames != tracks {
        return Err(Error::LengthMismatch { frames, tracks });
    }

    Ok(())
}

fn check_frames(frames: &[Frame]) -> Result<()> {
    if let Some((idx, frame)) = frames.iter().enumerate().find(|(_, f)| f.is_empty()) {
        let (w, h) = frame.dims();
        return Err(Error::InvalidFrame(format!("frame {} is empty ({}x{})", idx, w, h)));
    }

    Ok(())
}
