//! Per-player summaries over an augmented track sequence.

use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::track::{FrameTracks, TrackId};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlayerStats {
    pub track_id: TrackId,
    /// Longest run of consecutive frames the player was tracked in.
    pub longest_streak: usize,
    /// Highest accumulated distance in meters.
    pub max_distance: f32,
}

/// Distance of the player in the last frame it appears in.
pub fn final_distance(tracks: &[FrameTracks], id: TrackId) -> Option<f32> {
    tracks
        .iter()
        .rev()
        .find_map(|frame| frame.players.get(&id))
        .map(|r| r.distance)
}

#[derive(Default)]
struct Streak {
    current: usize,
    longest: usize,
    last_frame: Option<usize>,
    max_distance: f32,
}

/// Players present for at least `min_seconds` of consecutive frames at
/// `fps`, ordered by track id.
pub fn consecutive_player_stats(
    tracks: &[FrameTracks],
    min_seconds: f32,
    fps: f32,
) -> Vec<PlayerStats> {
    let min_frames = (min_seconds * fps).max(0.0).ceil() as usize;
    let mut streaks: BTreeMap<TrackId, Streak> = BTreeMap::new();

    for (idx, frame) in tracks.iter().enumerate() {
        for (&id, record) in &frame.players {
            let s = streaks.entry(id).or_default();

            s.current = match s.last_frame {
                Some(prev) if prev + 1 == idx => s.current + 1,
                _ => 1,
            };
            s.last_frame = Some(idx);
            s.longest = s.longest.max(s.current);
            s.max_distance = s.max_distance.max(record.distance);
        }
    }

    streaks
        .into_iter()
        .filter(|(_, s)| s.longest >= min_frames.max(1))
        .map(|(track_id, s)| PlayerStats {
            track_id,
            longest_streak: s.longest,
            max_distance: s.max_distance,
        })
        .collect()
}
