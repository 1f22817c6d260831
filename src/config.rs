use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::kinematics::GapPolicy;

/// Sparse optical flow parameters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FlowConfig {
    pub max_corners: usize,
    pub quality_level: f32,
    pub min_distance: f32,
    pub block_size: usize,
    pub window_radius: usize,
    pub pyramid_levels: usize,
    pub max_iterations: usize,
    pub epsilon: f32,
    pub min_eigen: f32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_corners: 200,
            quality_level: 0.01,
            min_distance: 10.0,
            block_size: 3,
            window_radius: 7,
            pyramid_levels: 3,
            max_iterations: 20,
            epsilon: 0.03,
            min_eigen: 1e-4,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frames per second of the clip.
    pub frame_rate: f32,
    /// Only every n-th consecutive frame pair gets optical flow.
    pub frame_skip: usize,
    /// Field size in meters.
    pub field_width: f32,
    pub field_height: f32,
    /// Image-space field corners: top-left, top-right, bottom-left,
    /// bottom-right. A default quadrilateral is derived from the frame size
    /// when absent.
    pub field_corners: Option<[[f32; 2]; 4]>,
    pub num_teams: usize,
    pub gap_policy: GapPolicy,
    /// Radius in pixels around a foot point within which flow samples count.
    pub sample_radius: f32,
    pub kmeans_iterations: usize,
    pub seed: u64,
    pub flow: FlowConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_rate: 30.0,
            frame_skip: 1,
            field_width: 105.0,
            field_height: 68.0,
            field_corners: None,
            num_teams: 2,
            gap_policy: GapPolicy::default(),
            sample_radius: 15.0,
            kmeans_iterations: 100,
            seed: 42,
            flow: FlowConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;

        Ok(config)
    }

    pub fn corners(&self) -> Option<[na::Point2<f32>; 4]> {
        self.field_corners.map(|c| c.map(|[x, y]| na::Point2::new(x, y)))
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |v: f32| v.is_finite() && v > 0.0;

        if !positive(self.frame_rate) {
            return Err(Error::InvalidConfig(format!(
                "frame_rate must be positive, got {}",
                self.frame_rate
            )));
        }

        if self.frame_skip == 0 {
            return Err(Error::InvalidConfig("frame_skip must be at least 1".into()));
        }

        if !positive(self.field_width) || !positive(self.field_height) {
            return Err(Error::InvalidConfig(format!(
                "field size must be positive, got {}x{}",
                self.field_width, self.field_height
            )));
        }

        if self.num_teams == 0 {
            return Err(Error::InvalidConfig("num_teams must be at least 1".into()));
        }

        if !positive(self.sample_radius) {
            return Err(Error::InvalidConfig(format!(
                "sample_radius must be positive, got {}",
                self.sample_radius
            )));
        }

        if self.flow.block_size == 0 || self.flow.pyramid_levels == 0 {
            return Err(Error::InvalidConfig(
                "flow block_size and pyramid_levels must be at least 1".into(),
            ));
        }

        Ok(())
    }
}
