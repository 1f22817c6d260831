//! Team labels from jersey colors.
//!
//! Colors of one representative frame are clustered once. Tracks that were
//! part of that clustering keep their cluster, the others get the nearest
//! cluster centroid of their color in the frame at hand, and a track with no
//! color sample keeps whatever it had before.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::math;
use crate::track::{TrackId, TrackMap};
use crate::{Color, Frame};

pub type TeamId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TeamState {
    #[default]
    Unassigned,
    /// Label from the initial clustering.
    Clustered(TeamId),
    /// Label from the nearest centroid of a later color sample.
    Propagated(TeamId),
}

impl TeamState {
    #[inline]
    pub fn team(&self) -> Option<TeamId> {
        match *self {
            TeamState::Unassigned => None,
            TeamState::Clustered(id) | TeamState::Propagated(id) => Some(id),
        }
    }

    /// Clustered label first, then the color fallback, else unchanged.
    pub fn resolve(self, clustered: Option<TeamId>, observed: Option<TeamId>) -> TeamState {
        match (clustered, observed) {
            (Some(id), _) => TeamState::Clustered(id),
            (None, Some(id)) => TeamState::Propagated(id),
            (None, None) => self,
        }
    }
}

/// Centroids and the per-track labels of the initial clustering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamColorModel {
    pub centroids: BTreeMap<TeamId, Color>,
    pub clustered: BTreeMap<TrackId, TeamId>,
}

impl TeamColorModel {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }
}

/// Mean jersey color per track, tracks with an empty crop are left out.
pub fn sample_colors(frame: &Frame, records: &TrackMap) -> BTreeMap<TrackId, Color> {
    records
        .iter()
        .filter_map(|(&id, r)| Some((id, frame.mean_color(&r.bbox.jersey_region())?)))
        .collect()
}

/// k-means over the color samples. Fewer than `k` samples yield an empty
/// mapping, otherwise every sampled track gets a label in `0..k`.
pub fn cluster_teams(
    samples: &BTreeMap<TrackId, Color>,
    k: usize,
    iterations: usize,
    seed: u64,
) -> BTreeMap<TrackId, TeamId> {
    if k == 0 || samples.len() < k {
        return BTreeMap::new();
    }

    let ids: Vec<TrackId> = samples.keys().copied().collect();
    let colors: Vec<Color> = samples.values().copied().collect();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..colors.len()).collect();
    order.shuffle(&mut rng);

    let mut centroids: Vec<Color> = order.iter().take(k).map(|&i| colors[i]).collect();
    let mut labels = vec![0usize; colors.len()];

    for iter in 0..iterations.max(1) {
        let mut changed = false;

        for (label, color) in labels.iter_mut().zip(&colors) {
            let nearest = nearest_centroid(color, centroids.iter().copied().enumerate())
                .unwrap_or(0);

            if *label != nearest {
                changed = true;
                *label = nearest;
            }
        }

        if !changed && iter > 0 {
            break;
        }

        for (c, centroid) in centroids.iter_mut().enumerate() {
            let members = labels
                .iter()
                .zip(&colors)
                .filter(|(l, _)| **l == c)
                .map(|(_, color)| color);

            // an emptied cluster keeps its previous centroid
            if let Some(m) = math::mean(members) {
                *centroid = m;
            }
        }
    }

    ids.into_iter().zip(labels).collect()
}

/// Mean color of every non-empty cluster.
pub fn team_centroids(
    samples: &BTreeMap<TrackId, Color>,
    assignment: &BTreeMap<TrackId, TeamId>,
) -> BTreeMap<TeamId, Color> {
    let mut members: BTreeMap<TeamId, Vec<Color>> = BTreeMap::new();

    for (id, &team) in assignment {
        if let Some(color) = samples.get(id) {
            members.entry(team).or_default().push(*color);
        }
    }

    members
        .into_iter()
        .filter_map(|(team, colors)| Some((team, math::mean(colors.iter())?)))
        .collect()
}

/// Team whose centroid is nearest to `color`. Ties go to the lowest team id,
/// `None` without centroids.
pub fn assign_fallback(color: &Color, centroids: &BTreeMap<TeamId, Color>) -> Option<TeamId> {
    nearest_centroid(color, centroids.iter().map(|(&id, c)| (id, *c)))
}

fn nearest_centroid<I>(color: &Color, centroids: I) -> Option<TeamId>
where
    I: IntoIterator<Item = (TeamId, Color)>,
{
    let mut best: Option<(TeamId, f32)> = None;

    for (id, centroid) in centroids {
        let dist = (color - centroid).norm();

        best = match best {
            Some((best_id, best_dist))
                if dist > best_dist || (dist == best_dist && best_id < id) =>
            {
                Some((best_id, best_dist))
            }
            _ => Some((id, dist)),
        };
    }

    best.map(|(id, _)| id)
}

#[derive(Debug, Clone)]
pub struct TeamAssigner {
    num_teams: usize,
    iterations: usize,
    seed: u64,
    model: TeamColorModel,
    states: HashMap<TrackId, TeamState>,
}

impl TeamAssigner {
    pub fn new(num_teams: usize, iterations: usize, seed: u64) -> Self {
        Self {
            num_teams,
            iterations,
            seed,
            model: TeamColorModel::default(),
            states: HashMap::new(),
        }
    }

    #[inline]
    pub fn model(&self) -> &TeamColorModel {
        &self.model
    }

    #[inline]
    pub fn state(&self, id: TrackId) -> TeamState {
        self.states.get(&id).copied().unwrap_or_default()
    }

    /// Builds the color model from one representative frame, replacing any
    /// previous model and forgetting all per-track states.
    pub fn fit(&mut self, frame: &Frame, records: &TrackMap) -> &TeamColorModel {
        let samples = sample_colors(frame, records);
        let clustered = cluster_teams(&samples, self.num_teams, self.iterations, self.seed);
        let centroids = team_centroids(&samples, &clustered);

        if clustered.is_empty() {
            warn!(
                samples = samples.len(),
                teams = self.num_teams,
                "not enough jersey samples to cluster teams"
            );
        } else {
            debug!(samples = samples.len(), teams = centroids.len(), "teams clustered");
        }

        self.model = TeamColorModel {
            centroids,
            clustered,
        };
        self.states.clear();

        &self.model
    }

    /// Resolves and writes the team of every track in `records`. A frame
    /// without tracks changes nothing.
    pub fn assign_frame(&mut self, frame: &Frame, records: &mut TrackMap) {
        for (&id, record) in records.iter_mut() {
            let clustered = self.model.clustered.get(&id).copied();
            let observed = if clustered.is_none() && !self.model.is_empty() {
                frame
                    .mean_color(&record.bbox.jersey_region())
                    .and_then(|color| assign_fallback(&color, &self.model.centroids))
            } else {
                None
            };

            let state = self.state(id).resolve(clustered, observed);
            self.states.insert(id, state);
            record.team = state.team();
        }
    }
}
