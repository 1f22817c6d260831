use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::bbox::{BBox, Ltrb};

pub type TrackId = i32;

pub type TrackMap = HashMap<TrackId, TrackRecord>;

/// One tracked object in one frame. The bbox comes from the upstream
/// tracker, the remaining fields are filled in by this crate.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrackRecord {
    pub bbox: BBox<Ltrb>,
    pub team: Option<usize>,
    /// in m/s, `None` when it could not be measured for this frame
    pub velocity: Option<f32>,
    /// in meters
    pub distance: f32,
}

impl TrackRecord {
    pub fn new(bbox: BBox<Ltrb>) -> Self {
        Self {
            bbox,
            team: None,
            velocity: None,
            distance: 0.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    Player,
    Referee,
}

/// Tracks of a single frame partitioned by object class.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct FrameTracks {
    pub players: TrackMap,
    pub referees: TrackMap,
}

impl FrameTracks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class: ObjectClass, id: TrackId, bbox: BBox<Ltrb>) {
        self.class_mut(class).insert(id, TrackRecord::new(bbox));
    }

    #[inline]
    pub fn class(&self, class: ObjectClass) -> &TrackMap {
        match class {
            ObjectClass::Player => &self.players,
            ObjectClass::Referee => &self.referees,
        }
    }

    #[inline]
    pub fn class_mut(&mut self, class: ObjectClass) -> &mut TrackMap {
        match class {
            ObjectClass::Player => &mut self.players,
            ObjectClass::Referee => &mut self.referees,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.players.len() + self.referees.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty() && self.referees.is_empty()
    }
}
