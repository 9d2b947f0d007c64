use crate::bbox::{BBox, Ltrb};
use nalgebra as na;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type TrackId = u32;
pub type TeamId = u8;

/// The ball is a single entity for the whole video.
pub const BALL_ID: TrackId = 0;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectClass {
    Player,
    Referee,
    Ball,
}

/// Snapshot of one tracked entity in one frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Track {
    pub track_id: TrackId,
    pub class: ObjectClass,
    pub bbox: BBox<Ltrb>,

    // in px
    pub position: Option<na::Point2<f32>>,
    pub position_adjusted: Option<na::Point2<f32>>,

    // in meters, absent outside the reference region
    pub position_transformed: Option<na::Point2<f32>>,

    pub team: Option<TeamId>,
    pub team_color: Option<[u8; 3]>,
    pub has_ball: bool,

    // km/h and meters
    pub speed: Option<f32>,
    pub distance: Option<f32>,

    pub interpolated: bool,
}

impl Track {
    pub fn new(track_id: TrackId, class: ObjectClass, bbox: BBox<Ltrb>) -> Self {
        Self {
            track_id,
            class,
            bbox,
            position: None,
            position_adjusted: None,
            position_transformed: None,
            team: None,
            team_color: None,
            has_ball: false,
            speed: None,
            distance: None,
            interpolated: false,
        }
    }

    /// Pixel anchor: ball center, feet for everybody else.
    #[inline]
    pub fn anchor(&self) -> na::Point2<f32> {
        match self.class {
            ObjectClass::Ball => self.bbox.center(),
            _ => self.bbox.bottom_center(),
        }
    }
}

/// Identity arena plus a frame-indexed index of snapshots.
///
/// Every frame keeps its snapshots sorted by id, so existence checks are a
/// binary search and iteration order is deterministic.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TrackTable {
    identities: BTreeMap<TrackId, ObjectClass>,
    frames: Vec<Vec<Track>>,
}

impl TrackTable {
    pub fn with_frames(n: usize) -> Self {
        Self {
            identities: BTreeMap::new(),
            frames: vec![Vec::new(); n],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn class_of(&self, id: TrackId) -> Option<ObjectClass> {
        self.identities.get(&id).copied()
    }

    pub fn ids(&self, class: ObjectClass) -> impl Iterator<Item = TrackId> + '_ {
        self.identities
            .iter()
            .filter(move |(_, c)| **c == class)
            .map(|(id, _)| *id)
    }

    /// Inserts or replaces the snapshot of `track.track_id` in `frame`.
    ///
    /// # Panics
    /// If the id was registered before with another class.
    pub fn insert(&mut self, frame: usize, track: Track) {
        let class = *self
            .identities
            .entry(track.track_id)
            .or_insert(track.class);

        assert_eq!(class, track.class, "track {} changed class", track.track_id);

        let entries = &mut self.frames[frame];
        match entries.binary_search_by_key(&track.track_id, |t| t.track_id) {
            Ok(pos) => entries[pos] = track,
            Err(pos) => entries.insert(pos, track),
        }
    }

    #[inline]
    pub fn frame(&self, frame: usize) -> &[Track] {
        &self.frames[frame]
    }

    #[inline]
    pub fn frame_mut(&mut self, frame: usize) -> &mut [Track] {
        &mut self.frames[frame]
    }

    pub fn get(&self, frame: usize, id: TrackId) -> Option<&Track> {
        let entries = self.frames.get(frame)?;
        let pos = entries.binary_search_by_key(&id, |t| t.track_id).ok()?;

        Some(&entries[pos])
    }

    pub fn get_mut(&mut self, frame: usize, id: TrackId) -> Option<&mut Track> {
        let entries = self.frames.get_mut(frame)?;
        let pos = entries.binary_search_by_key(&id, |t| t.track_id).ok()?;

        Some(&mut entries[pos])
    }

    #[inline]
    pub fn contains(&self, frame: usize, id: TrackId) -> bool {
        self.get(frame, id).is_some()
    }

    pub fn of_class(&self, frame: usize, class: ObjectClass) -> impl Iterator<Item = &Track> {
        self.frames[frame].iter().filter(move |t| t.class == class)
    }

    #[inline]
    pub fn players(&self, frame: usize) -> impl Iterator<Item = &Track> {
        self.of_class(frame, ObjectClass::Player)
    }

    #[inline]
    pub fn referees(&self, frame: usize) -> impl Iterator<Item = &Track> {
        self.of_class(frame, ObjectClass::Referee)
    }

    #[inline]
    pub fn ball(&self, frame: usize) -> Option<&Track> {
        self.get(frame, BALL_ID)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut Track)> {
        self.frames
            .iter_mut()
            .enumerate()
            .flat_map(|(i, entries)| entries.iter_mut().map(move |t| (i, t)))
    }
}
